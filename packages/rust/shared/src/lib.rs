//! Shared types, error model, configuration and request deadlines for bizclass.
//!
//! This crate is the foundation depended on by all other bizclass crates.
//! It provides:
//! - [`BizclassError`]: the unified error type
//! - Domain types ([`ClassificationRequest`], [`TaxonomyCode`], [`MethodResult`],
//!   [`ClassificationResult`], ...)
//! - Configuration ([`AppConfig`], [`BudgetPolicy`], config loading)
//! - [`Deadline`]: the per-request deadline + cancellation token

pub mod config;
pub mod deadline;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AcquisitionConfig, AggregationConfig, AppConfig, BudgetPolicy, BudgetSharesConfig,
    CrawlerConfig, KeywordConfig, MlConfig, ReferenceConfig, SufficiencyConfig, TimeoutsConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    ml_api_key,
};
pub use deadline::{Deadline, Interrupted};
pub use error::{BizclassError, Result};
pub use types::{
    AcquiredContent, AcquisitionOutcome, AttemptOutcome, AttemptRecord, CandidateSource,
    ClassificationRequest, ClassificationResult, ClassificationStatus, CrawlStats, Degradation,
    Diagnostics, Evidence, MethodKind, MethodReport, MethodResult, MethodStatus, PageContent,
    RequestFlags, Scenario, ScoredCode, SufficiencyVerdict, Taxonomy, TaxonomyCode, TimeoutBudget,
    specificity_order,
};
