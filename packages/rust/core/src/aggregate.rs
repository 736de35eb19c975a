//! Confidence aggregation across methods.
//!
//! Candidates are grouped by code. Within one method a code keeps its best
//! confidence; across methods the per-method values are combined as
//! independent evidence, `1 - prod(1 - c)`. Crosswalk-derived confidences
//! are discounted first.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use bizclass_shared::{
    AggregationConfig, ClassificationStatus, MethodKind, MethodResult, Scenario, ScoredCode,
    Taxonomy, TaxonomyCode, specificity_order,
};
use bizclass_taxonomy::ReferenceData;

use crate::crosswalk;

/// Outcome of aggregating a set of method results.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub status: ClassificationStatus,
    /// At most one per taxonomy, in NAICS, SIC, MCC order.
    pub primary: Vec<ScoredCode>,
    pub overall_confidence: f64,
    pub alternates: Vec<ScoredCode>,
}

/// Combine independent confidences: `1 - prod(1 - c)`, capped at 1.
pub fn combine(confidences: impl IntoIterator<Item = f64>) -> f64 {
    let miss: f64 = confidences
        .into_iter()
        .map(|c| 1.0 - c.clamp(0.0, 1.0))
        .product();
    (1.0 - miss).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    crosswalk_discount: f64,
    max_alternates: usize,
}

impl Aggregator {
    pub fn new(config: &AggregationConfig) -> Self {
        Self {
            crosswalk_discount: config.crosswalk_discount.clamp(0.0, 1.0),
            max_alternates: config.max_alternates,
        }
    }

    /// Confidence a result contributes after the crosswalk discount.
    pub fn effective_confidence(&self, result: &MethodResult) -> f64 {
        if result.is_crosswalk_derived() {
            result.confidence * (1.0 - self.crosswalk_discount)
        } else {
            result.confidence
        }
    }

    pub fn aggregate(&self, results: &[MethodResult]) -> Aggregate {
        struct Acc {
            per_method: BTreeMap<MethodKind, f64>,
            any_direct: bool,
        }

        let mut by_code: HashMap<&TaxonomyCode, Acc> = HashMap::new();
        for result in results {
            let acc = by_code.entry(&result.code).or_insert_with(|| Acc {
                per_method: BTreeMap::new(),
                any_direct: false,
            });
            let c = self.effective_confidence(result);
            let best = acc.per_method.entry(result.method).or_insert(0.0);
            *best = best.max(c);
            acc.any_direct |= !result.is_crosswalk_derived();
        }

        let mut scored: Vec<ScoredCode> = by_code
            .into_iter()
            .map(|(code, acc)| ScoredCode {
                code: code.clone(),
                confidence: combine(acc.per_method.values().copied()),
                crosswalk_derived: !acc.any_direct,
                methods: acc.per_method.keys().copied().collect(),
            })
            .collect();

        if scored.is_empty() {
            return Aggregate {
                status: ClassificationStatus::Unclassified,
                primary: Vec::new(),
                overall_confidence: 0.0,
                alternates: Vec::new(),
            };
        }

        scored.sort_by(rank);

        let mut primary = Vec::new();
        let mut alternates = Vec::new();
        for taxonomy in Taxonomy::ALL {
            let mut in_taxonomy = scored.iter().filter(|s| s.code.taxonomy == taxonomy);
            if let Some(best) = in_taxonomy.next() {
                primary.push(best.clone());
                alternates.extend(in_taxonomy.cloned());
            }
        }
        alternates.sort_by(rank);
        alternates.truncate(self.max_alternates);

        let overall_confidence =
            primary.iter().map(|s| s.confidence).sum::<f64>() / primary.len() as f64;

        Aggregate {
            status: ClassificationStatus::Classified,
            primary,
            overall_confidence,
            alternates,
        }
    }

    /// What each method would have produced alone, with its own backfill.
    pub fn scenarios(&self, reference: &ReferenceData, direct: &[MethodResult]) -> Vec<Scenario> {
        let mut by_method: BTreeMap<MethodKind, Vec<MethodResult>> = BTreeMap::new();
        for result in direct.iter().filter(|r| !r.is_crosswalk_derived()) {
            by_method.entry(result.method).or_default().push(result.clone());
        }

        by_method
            .into_iter()
            .map(|(method, mut results)| {
                let derived = crosswalk::backfill(reference, &results);
                results.extend(derived);
                let aggregate = self.aggregate(&results);
                Scenario {
                    method,
                    primary: aggregate.primary,
                    overall_confidence: aggregate.overall_confidence,
                }
            })
            .collect()
    }
}

/// Score descending, then taxonomy, then longer code, then lexicographic.
fn rank(a: &ScoredCode, b: &ScoredCode) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.code.taxonomy.cmp(&b.code.taxonomy))
        .then_with(|| specificity_order(&a.code, &b.code))
}
