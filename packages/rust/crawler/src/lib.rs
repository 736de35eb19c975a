//! Website content acquisition.
//!
//! This crate provides:
//! - [`StrategyChain`]: ordered fetch strategies for the home page
//! - [`Crawler`]: bounded, deadline-aware parallel fetch of candidate pages
//! - [`SufficiencyGate`]: decides whether acquired content is enough
//! - [`extract`]: visible-text extraction from HTML

pub mod engine;
pub mod extract;
pub mod gate;
pub mod strategy;

pub use engine::{CrawlSummary, Crawler};
pub use gate::SufficiencyGate;
pub use strategy::{
    Acquired, AcquisitionFailure, FetchedDocument, PageFetcher, Strategy, StrategyChain,
    is_ssrf_target,
};
