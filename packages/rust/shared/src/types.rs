//! Core domain types for business classification.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BizclassError, Result};

// ---------------------------------------------------------------------------
// Taxonomy / TaxonomyCode
// ---------------------------------------------------------------------------

/// A standardized industry classification system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Taxonomy {
    Naics,
    Sic,
    Mcc,
}

impl Taxonomy {
    /// All taxonomies, in output order.
    pub const ALL: [Taxonomy; 3] = [Taxonomy::Naics, Taxonomy::Sic, Taxonomy::Mcc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naics => "NAICS",
            Self::Sic => "SIC",
            Self::Mcc => "MCC",
        }
    }
}

impl fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Taxonomy {
    type Err = BizclassError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NAICS" => Ok(Self::Naics),
            "SIC" => Ok(Self::Sic),
            "MCC" => Ok(Self::Mcc),
            other => Err(BizclassError::parse(format!("unknown taxonomy: {other}"))),
        }
    }
}

/// A code in one taxonomy. Identity is `(taxonomy, code)`; the description
/// does not take part in equality, hashing or ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyCode {
    pub taxonomy: Taxonomy,
    pub code: String,
    #[serde(default)]
    pub description: String,
}

impl TaxonomyCode {
    pub fn new(taxonomy: Taxonomy, code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            taxonomy,
            code: code.into(),
            description: description.into(),
        }
    }

    /// Identity key.
    pub fn key(&self) -> (Taxonomy, &str) {
        (self.taxonomy, self.code.as_str())
    }

    /// Longer codes sit deeper in their hierarchy.
    pub fn specificity(&self) -> usize {
        self.code.len()
    }
}

impl PartialEq for TaxonomyCode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TaxonomyCode {}

impl Hash for TaxonomyCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.taxonomy.hash(state);
        self.code.hash(state);
    }
}

impl PartialOrd for TaxonomyCode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaxonomyCode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for TaxonomyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.taxonomy, self.code)
    }
}

/// Ranking used wherever equal-score codes must be ordered deterministically:
/// more specific (longer) codes first, then lexicographic by code.
pub fn specificity_order(a: &TaxonomyCode, b: &TaxonomyCode) -> std::cmp::Ordering {
    b.specificity()
        .cmp(&a.specificity())
        .then_with(|| a.code.cmp(&b.code))
}

// ---------------------------------------------------------------------------
// ClassificationRequest
// ---------------------------------------------------------------------------

/// Optional behaviour switches carried by a request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RequestFlags {
    /// Run the ML-assisted method (when a classifier is configured).
    #[serde(default)]
    pub enable_ml: bool,
    /// Attach a per-method scenario breakdown to the result.
    #[serde(default)]
    pub include_scenarios: bool,
}

/// A request to classify one business.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Explicit timeout override (clamped by the budget planner).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub flags: RequestFlags,
}

impl ClassificationRequest {
    /// Trimmed, non-empty business name.
    pub fn name(&self) -> Option<&str> {
        self.business_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Parse the website into an http(s) URL, defaulting to `https://` when
    /// no scheme was given. `Ok(None)` when no website was supplied.
    pub fn website_url(&self) -> Result<Option<Url>> {
        let Some(raw) = self.website.as_deref().map(str::trim).filter(|w| !w.is_empty()) else {
            return Ok(None);
        };

        let with_scheme = if has_scheme(raw) {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| BizclassError::invalid_request(format!("invalid website {raw:?}: {e}")))?;

        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(Some(url)),
            _ => Err(BizclassError::invalid_request(format!(
                "website must be an http(s) URL with a host: {raw:?}"
            ))),
        }
    }

    /// Reject requests that cannot be classified at all.
    pub fn validate(&self) -> Result<()> {
        let website = self.website_url()?;
        if self.name().is_none() && website.is_none() {
            return Err(BizclassError::invalid_request(
                "a business name or website is required",
            ));
        }
        Ok(())
    }
}

/// `scheme://` appears before any path, query or fragment.
fn has_scheme(raw: &str) -> bool {
    raw.find("://")
        .is_some_and(|idx| idx > 0 && !raw[..idx].contains(['/', '?', '#']))
}

// ---------------------------------------------------------------------------
// TimeoutBudget
// ---------------------------------------------------------------------------

/// Total deadline and per-stage sub-budgets for one request.
///
/// `acquisition + ml + keyword + overhead <= total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutBudget {
    pub total: Duration,
    pub acquisition: Duration,
    pub ml: Duration,
    pub keyword: Duration,
    pub overhead: Duration,
    /// Budget too short for expensive acquisition strategies.
    pub fast_path: bool,
}

impl TimeoutBudget {
    /// Sum of all sub-budgets.
    pub fn allocated(&self) -> Duration {
        self.acquisition + self.ml + self.keyword + self.overhead
    }
}

// ---------------------------------------------------------------------------
// Acquired content
// ---------------------------------------------------------------------------

/// One fetched (or failed) page.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub url: String,
    /// Extracted visible text; empty when the fetch failed.
    pub text: String,
    pub latency: Duration,
    /// Name of the acquisition strategy that fetched the page.
    pub strategy: String,
    /// Failure reason for pages that produced no content.
    pub error: Option<String>,
}

impl PageContent {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

/// Every page acquired for a request, in completion order.
#[derive(Debug, Clone, Default)]
pub struct AcquiredContent {
    pub pages: Vec<PageContent>,
}

impl AcquiredContent {
    pub fn push(&mut self, page: PageContent) {
        self.pages.push(page);
    }

    /// Pages that produced non-empty text.
    pub fn successful(&self) -> impl Iterator<Item = &PageContent> {
        self.pages.iter().filter(|p| p.is_success())
    }

    pub fn successful_count(&self) -> usize {
        self.successful().count()
    }

    pub fn failed_count(&self) -> usize {
        self.pages.len() - self.successful_count()
    }

    /// Aggregate length of non-empty page text, in characters.
    pub fn text_chars(&self) -> usize {
        self.successful().map(|p| p.text.trim().chars().count()).sum()
    }

    /// Non-empty lines of successful page text. Extracted text keeps one
    /// part (title, meta description, body) per line.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.successful()
            .flat_map(|p| p.text.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// All successful page text joined with blank lines.
    pub fn combined_text(&self) -> String {
        self.successful()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Outcome of the content sufficiency gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SufficiencyVerdict {
    pub sufficient: bool,
    pub page_count: usize,
    pub min_pages: usize,
    pub text_chars: usize,
    pub min_text_chars: usize,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Method results
// ---------------------------------------------------------------------------

/// The independent classification methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Keyword,
    BusinessType,
    Ml,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::BusinessType => "business_type",
            Self::Ml => "ml",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a method proposed a code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// Dictionary keywords that matched, in match order.
    Keywords { matched: Vec<String> },
    /// Descriptor token found in the business name.
    BusinessType { token: String },
    /// Model-assisted prediction.
    Model { model: String },
}

/// Whether a candidate was matched directly or inferred via crosswalk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateSource {
    Direct,
    Crosswalk { from: TaxonomyCode },
}

/// One method's candidate code with its raw confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: MethodKind,
    pub code: TaxonomyCode,
    /// Raw confidence in `[0, 1]`.
    pub confidence: f64,
    pub evidence: Evidence,
    pub source: CandidateSource,
    /// Derived from content that failed the sufficiency gate.
    #[serde(default)]
    pub low_confidence_input: bool,
}

impl MethodResult {
    pub fn direct(method: MethodKind, code: TaxonomyCode, confidence: f64, evidence: Evidence) -> Self {
        Self {
            method,
            code,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            source: CandidateSource::Direct,
            low_confidence_input: false,
        }
    }

    pub fn is_crosswalk_derived(&self) -> bool {
        matches!(self.source, CandidateSource::Crosswalk { .. })
    }
}

// ---------------------------------------------------------------------------
// ClassificationResult
// ---------------------------------------------------------------------------

/// A code with its combined confidence after aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCode {
    pub code: TaxonomyCode,
    pub confidence: f64,
    /// Every contribution came through the crosswalk.
    pub crosswalk_derived: bool,
    /// Methods that contributed, sorted.
    pub methods: Vec<MethodKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    Classified,
    Unclassified,
}

/// How a single method run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MethodStatus {
    Completed,
    TimedOut,
    Failed { message: String },
    Skipped { reason: String },
}

/// Per-method breakdown included in every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodReport {
    pub method: MethodKind,
    pub status: MethodStatus,
    pub elapsed_ms: u64,
    pub results: Vec<MethodResult>,
}

/// What a single method would have produced on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub method: MethodKind,
    pub primary: Vec<ScoredCode>,
    pub overall_confidence: f64,
}

/// One acquisition strategy attempt, as reported in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: String,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { message: String },
    /// Not attempted: no time remained or the fast path excluded it.
    Skipped { reason: String },
}

/// How content acquisition went for the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AcquisitionOutcome {
    /// No website was supplied.
    NotAttempted,
    Acquired {
        strategy: String,
        url: String,
        attempts: Vec<AttemptRecord>,
    },
    Exhausted {
        attempts: Vec<AttemptRecord>,
    },
}

/// Graceful-degradation signals. None of these fail the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    AcquisitionExhausted,
    InsufficientContent,
    MethodTimeout { method: MethodKind },
    Unclassifiable,
}

/// Everything a caller needs to understand how a result was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub request_id: String,
    pub budget: TimeoutBudget,
    pub acquisition: AcquisitionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sufficiency: Option<SufficiencyVerdict>,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    /// Counters from the candidate-page crawl; absent when no crawl ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl: Option<CrawlStats>,
    pub degradations: Vec<Degradation>,
    pub elapsed_ms: u64,
}

/// What the candidate-page crawl did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub requested: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Pages dropped because their text duplicated an earlier page.
    pub duplicates: usize,
    /// Fetches aborted at the deadline.
    pub aborted: usize,
    /// The gate was satisfied before every candidate was fetched.
    pub stopped_early: bool,
    pub duration_ms: u64,
}

impl Diagnostics {
    pub fn has(&self, degradation: &Degradation) -> bool {
        self.degradations.contains(degradation)
    }
}

/// The engine's sole externally visible output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub status: ClassificationStatus,
    /// At most one code per taxonomy, in NAICS, SIC, MCC order.
    pub primary: Vec<ScoredCode>,
    /// Mean of the primaries' combined confidence; zero when unclassified.
    pub overall_confidence: f64,
    pub alternates: Vec<ScoredCode>,
    pub methods: Vec<MethodReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Vec<Scenario>>,
    pub diagnostics: Diagnostics,
    pub generated_at: DateTime<Utc>,
}

impl ClassificationResult {
    /// Primary code for one taxonomy, if resolved.
    pub fn primary_for(&self, taxonomy: Taxonomy) -> Option<&ScoredCode> {
        self.primary.iter().find(|s| s.code.taxonomy == taxonomy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_code_identity_ignores_description() {
        let a = TaxonomyCode::new(Taxonomy::Mcc, "5812", "Eating places");
        let b = TaxonomyCode::new(Taxonomy::Mcc, "5812", "");
        assert_eq!(a, b);

        let c = TaxonomyCode::new(Taxonomy::Sic, "5812", "Eating places");
        assert_ne!(a, c);
    }

    #[test]
    fn taxonomy_parses_case_insensitively() {
        assert_eq!("naics".parse::<Taxonomy>().unwrap(), Taxonomy::Naics);
        assert_eq!(" MCC ".parse::<Taxonomy>().unwrap(), Taxonomy::Mcc);
        assert!("isic".parse::<Taxonomy>().is_err());
    }

    #[test]
    fn specificity_prefers_longer_then_lexicographic() {
        let mut codes = vec![
            TaxonomyCode::new(Taxonomy::Naics, "7225", ""),
            TaxonomyCode::new(Taxonomy::Naics, "722513", ""),
            TaxonomyCode::new(Taxonomy::Naics, "722511", ""),
        ];
        codes.sort_by(specificity_order);
        let order: Vec<_> = codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(order, ["722511", "722513", "7225"]);
    }

    #[test]
    fn request_requires_name_or_website() {
        let empty = ClassificationRequest {
            business_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(
            empty.validate(),
            Err(BizclassError::InvalidRequest { .. })
        ));

        let name_only = ClassificationRequest {
            business_name: Some("Joe's Pizza".into()),
            ..Default::default()
        };
        assert!(name_only.validate().is_ok());
    }

    #[test]
    fn website_defaults_to_https() {
        let req = ClassificationRequest {
            website: Some("joespizza.example".into()),
            ..Default::default()
        };
        let url = req.website_url().unwrap().unwrap();
        assert_eq!(url.as_str(), "https://joespizza.example/");
    }

    #[test]
    fn website_with_url_in_query_gets_https() {
        let req = ClassificationRequest {
            website: Some("joespizza.example/order?return=https://joespizza.example/".into()),
            ..Default::default()
        };
        let url = req.website_url().unwrap().unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("joespizza.example"));
        assert_eq!(url.path(), "/order");
        assert_eq!(url.query(), Some("return=https://joespizza.example/"));

        let req = ClassificationRequest {
            website: Some("http://joespizza.example/menu".into()),
            ..Default::default()
        };
        assert_eq!(req.website_url().unwrap().unwrap().scheme(), "http");
    }

    #[test]
    fn website_rejects_non_http_schemes() {
        let req = ClassificationRequest {
            website: Some("ftp://files.example.com".into()),
            ..Default::default()
        };
        assert!(req.website_url().is_err());
    }

    #[test]
    fn acquired_content_counts_only_non_empty_pages() {
        let mut content = AcquiredContent::default();
        content.push(PageContent {
            url: "https://a.example/".into(),
            text: "wood fired pizza".into(),
            latency: Duration::from_millis(10),
            strategy: "plain_http".into(),
            error: None,
        });
        content.push(PageContent {
            url: "https://a.example/menu".into(),
            text: String::new(),
            latency: Duration::from_millis(10),
            strategy: "plain_http".into(),
            error: Some("HTTP 500".into()),
        });

        assert_eq!(content.successful_count(), 1);
        assert_eq!(content.failed_count(), 1);
        assert_eq!(content.text_chars(), "wood fired pizza".len());
    }

    #[test]
    fn segments_split_pages_into_lines() {
        let mut content = AcquiredContent::default();
        for (url, text) in [
            ("https://a.example/", "Joe's Pizza\nWood fired since 1987"),
            ("https://a.example/gone", ""),
            ("https://a.example/menu", "Menu\n\n  Margherita  "),
        ] {
            content.push(PageContent {
                url: url.into(),
                text: text.into(),
                latency: Duration::from_millis(10),
                strategy: "plain_http".into(),
                error: None,
            });
        }

        let segments: Vec<_> = content.segments().collect();
        assert_eq!(segments, ["Joe's Pizza", "Wood fired since 1987", "Menu", "Margherita"]);
    }

    #[test]
    fn method_result_clamps_confidence() {
        let r = MethodResult::direct(
            MethodKind::Ml,
            TaxonomyCode::new(Taxonomy::Mcc, "5812", ""),
            1.7,
            Evidence::Model { model: "test".into() },
        );
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn degradations_serialize_as_tagged_objects() {
        let json = serde_json::to_value([
            Degradation::AcquisitionExhausted,
            Degradation::MethodTimeout {
                method: MethodKind::Ml,
            },
        ])
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                { "kind": "acquisition_exhausted" },
                { "kind": "method_timeout", "method": "ml" }
            ])
        );

        let code = serde_json::to_value(TaxonomyCode::new(Taxonomy::Naics, "722511", "")).unwrap();
        assert_eq!(code["taxonomy"], "NAICS");
    }
}
