//! Crosswalk backfill for taxonomies no method resolved directly.

use std::collections::HashSet;

use bizclass_shared::{CandidateSource, MethodResult, Taxonomy};
use bizclass_taxonomy::ReferenceData;

/// Derive candidates for every taxonomy that has no direct candidate.
///
/// Each direct result contributes every crosswalk target in a missing
/// taxonomy, keeping its method, confidence and evidence and recording the
/// source code. Returns only the derived results; the caller's input is
/// untouched. Discounting happens during aggregation.
pub fn backfill(reference: &ReferenceData, results: &[MethodResult]) -> Vec<MethodResult> {
    let direct: Vec<&MethodResult> = results.iter().filter(|r| !r.is_crosswalk_derived()).collect();
    let covered: HashSet<Taxonomy> = direct.iter().map(|r| r.code.taxonomy).collect();
    if covered.len() == Taxonomy::ALL.len() {
        return Vec::new();
    }

    let mut derived = Vec::new();
    for result in direct {
        for target in reference.crosswalk().resolve(&result.code) {
            if covered.contains(&target.taxonomy) {
                continue;
            }
            derived.push(MethodResult {
                method: result.method,
                code: target,
                confidence: result.confidence,
                evidence: result.evidence.clone(),
                source: CandidateSource::Crosswalk {
                    from: result.code.clone(),
                },
                low_confidence_input: result.low_confidence_input,
            });
        }
    }
    derived
}
