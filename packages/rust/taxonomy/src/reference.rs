//! Reference data: code catalogue, keyword dictionary and crosswalk table.
//!
//! Loaded once at process start (from JSON or the libSQL store) and shared
//! read-only as `Arc<ReferenceData>` by every request.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use bizclass_shared::{BizclassError, Result, Taxonomy, TaxonomyCode};

use crate::crosswalk::CrosswalkTable;
use crate::dictionary::{Keyword, KeywordDictionary};
use crate::text;

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

/// `(taxonomy, code)` reference as written in data files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRef {
    pub taxonomy: Taxonomy,
    pub code: String,
}

/// A keyword row in the reference file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub phrase: String,
    pub weight: f64,
    pub codes: Vec<CodeRef>,
}

/// A crosswalk row in the reference file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrosswalkRecord {
    pub from: CodeRef,
    pub to: CodeRef,
}

/// Serialized reference data (`fixtures/reference/*.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceFile {
    #[serde(default)]
    pub codes: Vec<TaxonomyCode>,
    #[serde(default)]
    pub keywords: Vec<KeywordRecord>,
    #[serde(default)]
    pub crosswalk: Vec<CrosswalkRecord>,
}

impl ReferenceFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| BizclassError::parse(format!("invalid reference data: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BizclassError::io(path, e))?;
        Self::from_json(&content)
    }
}

// ---------------------------------------------------------------------------
// ReferenceData
// ---------------------------------------------------------------------------

/// Validated, indexed reference data.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    codes: HashMap<(Taxonomy, String), TaxonomyCode>,
    dictionary: KeywordDictionary,
    crosswalk: CrosswalkTable,
}

impl ReferenceData {
    pub fn builder() -> ReferenceDataBuilder {
        ReferenceDataBuilder::default()
    }

    /// Validate and index a parsed reference file.
    pub fn from_file(file: ReferenceFile) -> Result<Self> {
        let mut builder = Self::builder();
        for code in file.codes {
            builder = builder.code(code.taxonomy, &code.code, &code.description);
        }
        for kw in file.keywords {
            let codes: Vec<(Taxonomy, &str)> =
                kw.codes.iter().map(|c| (c.taxonomy, c.code.as_str())).collect();
            builder = builder.keyword(&kw.phrase, kw.weight, &codes);
        }
        for edge in file.crosswalk {
            builder = builder.crosswalk(
                (edge.from.taxonomy, edge.from.code.as_str()),
                (edge.to.taxonomy, edge.to.code.as_str()),
            );
        }
        builder.build()
    }

    /// Parse, validate and index JSON reference data.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_file(ReferenceFile::from_json(json)?)
    }

    /// Load reference data from a JSON file on disk.
    pub fn load_json(path: &Path) -> Result<Self> {
        let data = Self::from_file(ReferenceFile::load(path)?)?;
        info!(
            path = %path.display(),
            codes = data.code_count(),
            keywords = data.dictionary.len(),
            crosswalk_edges = data.crosswalk.edge_count(),
            "reference data loaded"
        );
        Ok(data)
    }

    /// Catalogue lookup; returns the code with its description.
    pub fn lookup(&self, taxonomy: Taxonomy, code: &str) -> Option<&TaxonomyCode> {
        self.codes.get(&(taxonomy, code.to_string()))
    }

    pub fn dictionary(&self) -> &KeywordDictionary {
        &self.dictionary
    }

    pub fn crosswalk(&self) -> &CrosswalkTable {
        &self.crosswalk
    }

    pub fn code_count(&self) -> usize {
        self.codes.len()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates raw rows; [`build`](Self::build) validates every reference.
#[derive(Debug, Default)]
pub struct ReferenceDataBuilder {
    codes: Vec<TaxonomyCode>,
    keywords: Vec<(String, f64, Vec<(Taxonomy, String)>)>,
    edges: Vec<((Taxonomy, String), (Taxonomy, String))>,
}

impl ReferenceDataBuilder {
    pub fn code(mut self, taxonomy: Taxonomy, code: &str, description: &str) -> Self {
        self.codes.push(TaxonomyCode::new(taxonomy, code.trim(), description));
        self
    }

    pub fn keyword(mut self, phrase: &str, weight: f64, codes: &[(Taxonomy, &str)]) -> Self {
        self.keywords.push((
            phrase.to_string(),
            weight,
            codes.iter().map(|(t, c)| (*t, c.trim().to_string())).collect(),
        ));
        self
    }

    pub fn crosswalk(mut self, from: (Taxonomy, &str), to: (Taxonomy, &str)) -> Self {
        self.edges.push((
            (from.0, from.1.trim().to_string()),
            (to.0, to.1.trim().to_string()),
        ));
        self
    }

    pub fn build(self) -> Result<ReferenceData> {
        let mut codes = HashMap::new();
        for code in self.codes {
            if code.code.is_empty() {
                return Err(BizclassError::validation(format!(
                    "empty {} code in catalogue",
                    code.taxonomy
                )));
            }
            codes.insert((code.taxonomy, code.code.clone()), code);
        }

        let resolve = |taxonomy: Taxonomy, code: &str, context: &str| {
            codes
                .get(&(taxonomy, code.to_string()))
                .cloned()
                .ok_or_else(|| {
                    BizclassError::validation(format!(
                        "{context} references unknown code {taxonomy} {code}"
                    ))
                })
        };

        let mut keywords = Vec::with_capacity(self.keywords.len());
        for (phrase, weight, refs) in self.keywords {
            let context = format!("keyword {phrase:?}");
            if !weight.is_finite() || weight <= 0.0 {
                return Err(BizclassError::validation(format!(
                    "{context} has invalid weight {weight}"
                )));
            }
            let stems = text::stems(&phrase);
            if stems.is_empty() {
                return Err(BizclassError::validation(format!("{context} has no tokens")));
            }
            let mut mapped = Vec::with_capacity(refs.len());
            for (taxonomy, code) in &refs {
                mapped.push(resolve(*taxonomy, code, &context)?);
            }
            mapped.sort();
            mapped.dedup();
            keywords.push(Keyword {
                phrase,
                stems,
                weight,
                codes: mapped,
            });
        }

        let mut crosswalk = CrosswalkTable::default();
        for ((ft, fc), (tt, tc)) in self.edges {
            let context = format!("crosswalk {ft} {fc} -> {tt} {tc}");
            if ft == tt {
                return Err(BizclassError::validation(format!(
                    "{context} stays within one taxonomy"
                )));
            }
            crosswalk.insert(resolve(ft, &fc, &context)?, resolve(tt, &tc, &context)?);
        }

        Ok(ReferenceData {
            codes,
            dictionary: KeywordDictionary::from_keywords(keywords),
            crosswalk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_unknown_codes() {
        let err = ReferenceData::builder()
            .code(Taxonomy::Mcc, "5812", "Eating places, restaurants")
            .keyword("pizza", 3.0, &[(Taxonomy::Mcc, "9999")])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown code MCC 9999"));
    }

    #[test]
    fn builder_rejects_bad_weights() {
        let err = ReferenceData::builder()
            .code(Taxonomy::Mcc, "5812", "")
            .keyword("pizza", 0.0, &[(Taxonomy::Mcc, "5812")])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("invalid weight"));
    }

    #[test]
    fn crosswalk_codes_carry_catalogue_descriptions() {
        let data = ReferenceData::builder()
            .code(Taxonomy::Mcc, "5812", "Eating places, restaurants")
            .code(Taxonomy::Sic, "5812", "Eating places")
            .crosswalk((Taxonomy::Mcc, "5812"), (Taxonomy::Sic, "5812"))
            .build()
            .unwrap();

        let mcc = data.lookup(Taxonomy::Mcc, "5812").unwrap().clone();
        let targets = data.crosswalk().resolve(&mcc);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].description, "Eating places");
    }

    #[test]
    fn fixture_file_validates() {
        let data = ReferenceData::load_json(Path::new("../../../fixtures/reference/sample.json"))
            .expect("load reference fixture");
        assert!(data.code_count() > 0);
        assert!(!data.dictionary().is_empty());
        assert!(data.lookup(Taxonomy::Mcc, "5812").is_some());
        assert!(data.crosswalk().edge_count() > 0);
    }
}
