//! Keyword/taxonomy classifier.
//!
//! Matches dictionary phrases against the stemmed input text and scores
//! each code by the summed weight of the distinct keywords pointing at it,
//! normalized per taxonomy against the sum of that taxonomy's top-N keyword
//! weights.

use std::collections::HashMap;

use bizclass_shared::{
    Evidence, KeywordConfig, MethodKind, MethodResult, Taxonomy, TaxonomyCode, specificity_order,
};
use bizclass_taxonomy::ReferenceData;

/// Stateless keyword scorer. Cheap to copy into blocking tasks.
#[derive(Debug, Clone, Copy)]
pub struct KeywordClassifier {
    normalization_top_n: usize,
    max_candidates_per_taxonomy: usize,
    low_content_penalty: f64,
}

impl KeywordClassifier {
    pub fn new(config: &KeywordConfig) -> Self {
        Self {
            normalization_top_n: config.normalization_top_n.max(1),
            max_candidates_per_taxonomy: config.max_candidates_per_taxonomy,
            low_content_penalty: config.low_content_penalty.clamp(0.0, 1.0),
        }
    }

    /// Score `segments` against the dictionary. Each segment (the business
    /// name, one line of page text) is matched on its own, so a phrase is
    /// only found when all of its words sit in the same segment.
    ///
    /// Results come grouped by taxonomy (NAICS, SIC, MCC), best first. When
    /// `low_confidence_input` is set every confidence is multiplied by the
    /// low-content penalty and the results are flagged.
    pub fn classify<S: AsRef<str>>(
        &self,
        reference: &ReferenceData,
        segments: &[S],
        low_confidence_input: bool,
    ) -> Vec<MethodResult> {
        let dictionary = reference.dictionary();
        let matches = dictionary.match_segments(segments);
        if matches.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<&TaxonomyCode, (f64, Vec<&str>)> = HashMap::new();
        for keyword in &matches {
            for code in &keyword.codes {
                let entry = scores.entry(code).or_insert((0.0, Vec::new()));
                entry.0 += keyword.weight;
                entry.1.push(keyword.phrase.as_str());
            }
        }

        let mut results = Vec::new();
        for taxonomy in Taxonomy::ALL {
            let max = dictionary.normalization_max(taxonomy, self.normalization_top_n);
            if max <= 0.0 {
                continue;
            }

            let mut ranked: Vec<_> = scores
                .iter()
                .filter(|(code, _)| code.taxonomy == taxonomy)
                .collect();
            ranked.sort_by(|(a, (wa, _)), (b, (wb, _))| {
                wb.total_cmp(wa).then_with(|| specificity_order(a, b))
            });

            for (code, (weight, phrases)) in ranked.into_iter().take(self.max_candidates_per_taxonomy) {
                let mut confidence = (weight / max).min(1.0);
                if low_confidence_input {
                    confidence *= self.low_content_penalty;
                }
                let mut result = MethodResult::direct(
                    MethodKind::Keyword,
                    (*code).clone(),
                    confidence,
                    Evidence::Keywords {
                        matched: phrases.iter().map(|p| p.to_string()).collect(),
                    },
                );
                result.low_confidence_input = low_confidence_input;
                results.push(result);
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ReferenceData {
        ReferenceData::builder()
            .code(Taxonomy::Mcc, "5812", "Eating places, restaurants")
            .code(Taxonomy::Mcc, "5814", "Fast food restaurants")
            .code(Taxonomy::Sic, "5812", "Eating places")
            .code(Taxonomy::Naics, "722511", "Full-service restaurants")
            .keyword("pizza", 3.0, &[(Taxonomy::Mcc, "5812")])
            .keyword("restaurant", 2.0, &[(Taxonomy::Mcc, "5812"), (Taxonomy::Sic, "5812"), (Taxonomy::Naics, "722511")])
            .keyword("fast food", 2.0, &[(Taxonomy::Mcc, "5814")])
            .keyword("delivery", 1.0, &[(Taxonomy::Mcc, "5814")])
            .build()
            .unwrap()
    }

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new(&KeywordConfig::default())
    }

    fn confidence_of(results: &[MethodResult], taxonomy: Taxonomy, code: &str) -> Option<f64> {
        results
            .iter()
            .find(|r| r.code.taxonomy == taxonomy && r.code.code == code)
            .map(|r| r.confidence)
    }

    #[test]
    fn joes_pizza_matches_mcc_only() {
        let results = classifier().classify(&reference(), &["Joe's Pizza"], false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code.key(), (Taxonomy::Mcc, "5812"));
        // MCC top-3 weights: 3.0 + 2.0 + 2.0
        assert!((results[0].confidence - 3.0 / 7.0).abs() < 1e-9);
        assert_eq!(
            results[0].evidence,
            Evidence::Keywords {
                matched: vec!["pizza".into()]
            }
        );
    }

    #[test]
    fn repeated_keyword_counts_once() {
        let reference = reference();
        let once = classifier().classify(&reference, &["pizza"], false);
        let thrice = classifier().classify(&reference, &["pizza pizza pizzas"], false);
        assert_eq!(once[0].confidence, thrice[0].confidence);
    }

    #[test]
    fn confidence_is_monotonic_in_matched_keywords() {
        let reference = reference();
        let inputs = ["pizza", "pizza restaurant", "pizza restaurant fast food", "pizza restaurant fast food delivery"];
        let mut last = 0.0;
        for input in inputs {
            let results = classifier().classify(&reference, &[input], false);
            let c = confidence_of(&results, Taxonomy::Mcc, "5812").unwrap();
            assert!((0.0..=1.0).contains(&c));
            assert!(c >= last, "{input}: {c} < {last}");
            last = c;
        }
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let reference = ReferenceData::builder()
            .code(Taxonomy::Sic, "5812", "")
            .keyword("pizza", 3.0, &[(Taxonomy::Sic, "5812")])
            .keyword("restaurant", 3.0, &[(Taxonomy::Sic, "5812")])
            .build()
            .unwrap();
        let config = KeywordConfig {
            normalization_top_n: 1,
            ..KeywordConfig::default()
        };
        let results = KeywordClassifier::new(&config).classify(&reference, &["pizza restaurant"], false);
        assert_eq!(results[0].confidence, 1.0);
    }

    #[test]
    fn results_grouped_by_taxonomy_and_ranked() {
        let results = classifier().classify(&reference(), &["restaurant with fast food and pizza"], false);
        let keys: Vec<_> = results.iter().map(|r| r.code.key()).collect();
        assert_eq!(
            keys,
            [
                (Taxonomy::Naics, "722511"),
                (Taxonomy::Sic, "5812"),
                (Taxonomy::Mcc, "5812"),
                (Taxonomy::Mcc, "5814"),
            ]
        );
    }

    #[test]
    fn candidates_limited_per_taxonomy() {
        let config = KeywordConfig {
            max_candidates_per_taxonomy: 1,
            ..KeywordConfig::default()
        };
        let results = KeywordClassifier::new(&config).classify(&reference(), &["pizza fast food"], false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code.key(), (Taxonomy::Mcc, "5812"));
    }

    #[test]
    fn equal_weights_prefer_longer_then_lexicographic_code() {
        let reference = ReferenceData::builder()
            .code(Taxonomy::Naics, "7225", "Restaurants")
            .code(Taxonomy::Naics, "722511", "Full-service restaurants")
            .code(Taxonomy::Naics, "722513", "Limited-service restaurants")
            .keyword("eatery", 1.0, &[(Taxonomy::Naics, "7225"), (Taxonomy::Naics, "722513"), (Taxonomy::Naics, "722511")])
            .build()
            .unwrap();
        let results = classifier().classify(&reference, &["eatery"], false);
        let codes: Vec<_> = results.iter().map(|r| r.code.code.as_str()).collect();
        assert_eq!(codes, ["722511", "722513", "7225"]);
    }

    #[test]
    fn low_confidence_input_is_penalized_and_flagged() {
        let reference = reference();
        let normal = classifier().classify(&reference, &["pizza"], false);
        let weak = classifier().classify(&reference, &["pizza"], true);
        assert!(weak[0].low_confidence_input);
        assert!(!normal[0].low_confidence_input);
        assert!((weak[0].confidence - normal[0].confidence * 0.75).abs() < 1e-9);
    }

    #[test]
    fn phrase_split_across_segments_is_not_matched() {
        let reference = reference();
        let split = classifier().classify(&reference, &["Joe's Fast", "Food and drinks"], false);
        assert!(split.is_empty());

        let joined = classifier().classify(&reference, &["Joe's", "Fast food and drinks"], false);
        assert_eq!(joined[0].code.key(), (Taxonomy::Mcc, "5814"));
    }

    #[test]
    fn no_match_no_results() {
        assert!(classifier().classify(&reference(), &["Acme Widgets"], false).is_empty());
    }
}
