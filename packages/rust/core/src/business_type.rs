//! Business-type heuristic: professional and organizational descriptors in
//! the business name ("Smith DDS", "Acme Realty", "Grace Church").

use std::collections::HashSet;

use bizclass_shared::{Evidence, MethodKind, MethodResult, Taxonomy};
use bizclass_taxonomy::ReferenceData;
use bizclass_taxonomy::text;

/// Confidence attached to every business-type match.
pub const BUSINESS_TYPE_CONFIDENCE: f64 = 0.6;

struct BusinessType {
    tokens: &'static [&'static str],
    codes: &'static [(Taxonomy, &'static str)],
}

const BUSINESS_TYPES: &[BusinessType] = &[
    BusinessType {
        tokens: &["dds", "dmd", "dentist", "dentistry", "dental"],
        codes: &[(Taxonomy::Naics, "621210"), (Taxonomy::Sic, "8021"), (Taxonomy::Mcc, "8021")],
    },
    BusinessType {
        tokens: &["md", "physician", "pediatrics", "family medicine"],
        codes: &[(Taxonomy::Naics, "621111"), (Taxonomy::Sic, "8011"), (Taxonomy::Mcc, "8011")],
    },
    BusinessType {
        tokens: &["cpa", "cpas", "accountant", "accounting", "bookkeeping"],
        codes: &[(Taxonomy::Naics, "541211"), (Taxonomy::Sic, "8721"), (Taxonomy::Mcc, "8931")],
    },
    BusinessType {
        tokens: &["esq", "attorney", "attorneys", "lawyer", "law firm", "law office", "llp"],
        codes: &[(Taxonomy::Naics, "541110"), (Taxonomy::Sic, "8111"), (Taxonomy::Mcc, "8111")],
    },
    BusinessType {
        tokens: &["church", "parish", "ministry", "ministries", "chapel", "synagogue", "mosque"],
        codes: &[(Taxonomy::Naics, "813110"), (Taxonomy::Sic, "8661"), (Taxonomy::Mcc, "8661")],
    },
    BusinessType {
        tokens: &["pharmacy", "drugstore", "apothecary", "rx"],
        codes: &[(Taxonomy::Naics, "456110"), (Taxonomy::Sic, "5912"), (Taxonomy::Mcc, "5912")],
    },
    BusinessType {
        tokens: &["realty", "realtor", "realtors", "real estate"],
        codes: &[(Taxonomy::Naics, "531210"), (Taxonomy::Sic, "6531"), (Taxonomy::Mcc, "6513")],
    },
    BusinessType {
        tokens: &["insurance", "insurer", "underwriters"],
        codes: &[(Taxonomy::Naics, "524210"), (Taxonomy::Sic, "6411"), (Taxonomy::Mcc, "6300")],
    },
];

/// Name-only classifier backed by a fixed descriptor table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessTypeClassifier;

impl BusinessTypeClassifier {
    /// Codes implied by descriptors in `name`. Codes missing from the
    /// reference data are never emitted.
    pub fn classify(&self, reference: &ReferenceData, name: &str) -> Vec<MethodResult> {
        let name_stems = text::stems(name);
        if name_stems.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for business_type in BUSINESS_TYPES {
            let Some(token) = business_type
                .tokens
                .iter()
                .find(|t| contains_sequence(&name_stems, &text::stems(t)))
            else {
                continue;
            };

            for (taxonomy, code) in business_type.codes {
                let Some(code) = reference.lookup(*taxonomy, code) else {
                    continue;
                };
                if seen.insert(code.clone()) {
                    results.push(MethodResult::direct(
                        MethodKind::BusinessType,
                        code.clone(),
                        BUSINESS_TYPE_CONFIDENCE,
                        Evidence::BusinessType {
                            token: (*token).to_string(),
                        },
                    ));
                }
            }
        }
        results
    }
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
