//! Weighted keyword dictionary: phrase → weight → taxonomy codes.

use std::collections::HashMap;

use bizclass_shared::{Taxonomy, TaxonomyCode};

use crate::text;

/// One dictionary entry. A keyword may map to many codes, in any taxonomies.
#[derive(Debug, Clone)]
pub struct Keyword {
    /// Phrase as written in the reference data.
    pub phrase: String,
    /// Stemmed token sequence the phrase matches against.
    pub stems: Vec<String>,
    pub weight: f64,
    pub codes: Vec<TaxonomyCode>,
}

/// Immutable keyword index, built once per process.
#[derive(Debug, Clone, Default)]
pub struct KeywordDictionary {
    keywords: Vec<Keyword>,
    /// First stem → indices into `keywords`.
    by_first_stem: HashMap<String, Vec<usize>>,
    /// Per taxonomy, the weights of every keyword mapping into it, descending.
    weights_by_taxonomy: HashMap<Taxonomy, Vec<f64>>,
}

impl KeywordDictionary {
    pub(crate) fn from_keywords(keywords: Vec<Keyword>) -> Self {
        let mut by_first_stem: HashMap<String, Vec<usize>> = HashMap::new();
        let mut weights_by_taxonomy: HashMap<Taxonomy, Vec<f64>> = HashMap::new();

        for (idx, kw) in keywords.iter().enumerate() {
            if let Some(first) = kw.stems.first() {
                by_first_stem.entry(first.clone()).or_default().push(idx);
            }

            let mut taxonomies: Vec<Taxonomy> = kw.codes.iter().map(|c| c.taxonomy).collect();
            taxonomies.sort();
            taxonomies.dedup();
            for taxonomy in taxonomies {
                weights_by_taxonomy.entry(taxonomy).or_default().push(kw.weight);
            }
        }

        for weights in weights_by_taxonomy.values_mut() {
            weights.sort_by(|a, b| b.total_cmp(a));
        }

        Self {
            keywords,
            by_first_stem,
            weights_by_taxonomy,
        }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Distinct keywords whose stem sequence occurs contiguously in `stems`,
    /// in order of first occurrence.
    pub fn find_matches(&self, stems: &[String]) -> Vec<&Keyword> {
        let mut seen = vec![false; self.keywords.len()];
        let mut matched = Vec::new();
        self.collect_matches(stems, &mut seen, &mut matched);
        matched
    }

    /// Match each segment on its own and union the results. A phrase never
    /// spans two segments.
    pub fn match_segments<I, S>(&self, segments: I) -> Vec<&Keyword>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = vec![false; self.keywords.len()];
        let mut matched = Vec::new();
        for segment in segments {
            self.collect_matches(&text::stems(segment.as_ref()), &mut seen, &mut matched);
        }
        matched
    }

    /// Stem `text` and match it, one line at a time.
    pub fn match_text(&self, text_input: &str) -> Vec<&Keyword> {
        self.match_segments(text_input.lines())
    }

    fn collect_matches<'a>(&'a self, stems: &[String], seen: &mut [bool], matched: &mut Vec<&'a Keyword>) {
        for start in 0..stems.len() {
            let Some(candidates) = self.by_first_stem.get(&stems[start]) else {
                continue;
            };
            for &idx in candidates {
                if seen[idx] {
                    continue;
                }
                let kw = &self.keywords[idx];
                let end = start + kw.stems.len();
                if end <= stems.len() && stems[start..end] == kw.stems[..] {
                    seen[idx] = true;
                    matched.push(kw);
                }
            }
        }
    }

    /// Theoretical maximum accumulated weight for one taxonomy: the sum of
    /// the `top_n` heaviest keywords mapping into it. Zero when the
    /// dictionary has no keyword for that taxonomy.
    pub fn normalization_max(&self, taxonomy: Taxonomy, top_n: usize) -> f64 {
        self.weights_by_taxonomy
            .get(&taxonomy)
            .map(|w| w.iter().take(top_n.max(1)).sum())
            .unwrap_or(0.0)
    }
}
