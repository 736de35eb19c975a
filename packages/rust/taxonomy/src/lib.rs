//! Industry taxonomies: keyword dictionary, crosswalk table and the
//! reference-data format they are loaded from.
//!
//! This crate provides:
//! - [`ReferenceData`]: validated, indexed reference data (shared read-only)
//! - [`KeywordDictionary`]: phrase matching over stemmed text
//! - [`CrosswalkTable`]: symmetric many-to-many code mapping
//! - [`text`]: tokenization and stemming

pub mod crosswalk;
pub mod dictionary;
pub mod reference;
pub mod text;

pub use crosswalk::CrosswalkTable;
pub use dictionary::{Keyword, KeywordDictionary};
pub use reference::{
    CodeRef, CrosswalkRecord, KeywordRecord, ReferenceData, ReferenceDataBuilder, ReferenceFile,
};
