//! Classification engine and methods for bizclass.
//!
//! This crate ties together budgeting, website acquisition, crawling, the
//! classification methods, crosswalk backfill and aggregation into
//! [`ClassificationEngine::classify`].

pub mod aggregate;
pub mod budget;
pub mod business_type;
pub mod crosswalk;
pub mod engine;
pub mod keyword;
pub mod ml;

pub use aggregate::{Aggregate, Aggregator, combine};
pub use budget::BudgetPlanner;
pub use business_type::{BUSINESS_TYPE_CONFIDENCE, BusinessTypeClassifier};
pub use engine::{ClassificationEngine, EngineConfig, ProgressReporter, SilentProgress};
pub use keyword::KeywordClassifier;
pub use ml::{HttpMlClassifier, MlClassifier, MlInput, MlOutput, MlPrediction, to_method_results};
