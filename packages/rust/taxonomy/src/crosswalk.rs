//! Many-to-many crosswalk between taxonomies.
//!
//! Edges are stored in both directions on insert, so resolution is symmetric
//! by construction: if A resolves to B, B resolves to A.

use std::collections::{BTreeSet, HashMap};

use bizclass_shared::TaxonomyCode;

/// Precomputed crosswalk, read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct CrosswalkTable {
    edges: HashMap<TaxonomyCode, BTreeSet<TaxonomyCode>>,
}

impl CrosswalkTable {
    /// Record a bidirectional edge. Same-taxonomy pairs are ignored.
    pub(crate) fn insert(&mut self, a: TaxonomyCode, b: TaxonomyCode) {
        if a.taxonomy == b.taxonomy {
            return;
        }
        self.edges.entry(a.clone()).or_default().insert(b.clone());
        self.edges.entry(b).or_default().insert(a);
    }

    /// Codes in other taxonomies related to `code`, ordered by
    /// `(taxonomy, code)`. Unknown codes resolve to an empty list.
    pub fn resolve(&self, code: &TaxonomyCode) -> Vec<TaxonomyCode> {
        self.edges
            .get(code)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum::<usize>() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizclass_shared::Taxonomy;

    fn code(t: Taxonomy, c: &str) -> TaxonomyCode {
        TaxonomyCode::new(t, c, "")
    }

    fn sample() -> CrosswalkTable {
        let mut table = CrosswalkTable::default();
        table.insert(code(Taxonomy::Mcc, "5812"), code(Taxonomy::Sic, "5812"));
        table.insert(code(Taxonomy::Mcc, "5812"), code(Taxonomy::Naics, "722511"));
        table.insert(code(Taxonomy::Mcc, "5812"), code(Taxonomy::Naics, "722513"));
        table.insert(code(Taxonomy::Sic, "5812"), code(Taxonomy::Naics, "722511"));
        table
    }

    #[test]
    fn resolution_is_symmetric() {
        let table = sample();
        for source in [
            code(Taxonomy::Mcc, "5812"),
            code(Taxonomy::Sic, "5812"),
            code(Taxonomy::Naics, "722511"),
            code(Taxonomy::Naics, "722513"),
        ] {
            for target in table.resolve(&source) {
                assert!(
                    table.resolve(&target).contains(&source),
                    "{target} does not resolve back to {source}"
                );
            }
        }
    }

    #[test]
    fn resolve_is_ordered() {
        let table = sample();
        let all = table.resolve(&code(Taxonomy::Mcc, "5812"));
        let keys: Vec<_> = all.iter().map(|c| c.to_string()).collect();
        assert_eq!(keys, ["NAICS 722511", "NAICS 722513", "SIC 5812"]);
    }

    #[test]
    fn missing_mapping_is_empty_not_an_error() {
        let table = sample();
        assert!(table.resolve(&code(Taxonomy::Mcc, "0000")).is_empty());
    }

    #[test]
    fn same_taxonomy_edges_are_ignored() {
        let mut table = CrosswalkTable::default();
        table.insert(code(Taxonomy::Naics, "722511"), code(Taxonomy::Naics, "722513"));
        assert_eq!(table.edge_count(), 0);
        assert_eq!(sample().edge_count(), 4);
    }
}
