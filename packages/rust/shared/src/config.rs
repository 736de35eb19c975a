//! Application configuration for bizclass.
//!
//! User config lives at `~/.bizclass/bizclass.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BizclassError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bizclass.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bizclass";

// ---------------------------------------------------------------------------
// Config structs (matching bizclass.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub budget: BudgetSharesConfig,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub sufficiency: SufficiencyConfig,

    #[serde(default)]
    pub keyword: KeywordConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub ml: MlConfig,

    #[serde(default)]
    pub reference: ReferenceConfig,
}

/// `[timeouts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Total request budget when the request carries no override.
    #[serde(default = "default_timeout_secs")]
    pub default_secs: u64,

    /// Lower clamp for request overrides.
    #[serde(default = "default_min_secs")]
    pub min_secs: u64,

    /// Upper clamp for request overrides.
    #[serde(default = "default_max_secs")]
    pub max_secs: u64,

    /// Budgets at or below this skip expensive acquisition strategies.
    #[serde(default = "default_fast_path_secs")]
    pub fast_path_secs: u64,

    /// Fixed reserve kept back for aggregation and serialization.
    #[serde(default = "default_overhead_ms")]
    pub overhead_ms: u64,

    /// Per-request HTTP read timeout (further capped by the remaining budget).
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Floor for the local (no I/O) methods' budget.
    #[serde(default = "default_min_local_budget_ms")]
    pub min_local_budget_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            default_secs: default_timeout_secs(),
            min_secs: default_min_secs(),
            max_secs: default_max_secs(),
            fast_path_secs: default_fast_path_secs(),
            overhead_ms: default_overhead_ms(),
            read_timeout_secs: default_read_timeout_secs(),
            min_local_budget_ms: default_min_local_budget_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    45
}
fn default_min_secs() -> u64 {
    5
}
fn default_max_secs() -> u64 {
    120
}
fn default_fast_path_secs() -> u64 {
    15
}
fn default_overhead_ms() -> u64 {
    500
}
fn default_read_timeout_secs() -> u64 {
    60
}
fn default_min_local_budget_ms() -> u64 {
    250
}

/// `[budget]` section: fractions of the total deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSharesConfig {
    #[serde(default = "default_acquisition_share")]
    pub acquisition_share: f64,

    #[serde(default = "default_ml_share")]
    pub ml_share: f64,
}

impl Default for BudgetSharesConfig {
    fn default() -> Self {
        Self {
            acquisition_share: default_acquisition_share(),
            ml_share: default_ml_share(),
        }
    }
}

fn default_acquisition_share() -> f64 {
    0.55
}
fn default_ml_share() -> f64 {
    0.22
}

/// `[acquisition]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Rendering service queried as `<endpoint>?url=<target>`; enables the
    /// headless-render strategy when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_endpoint: Option<String>,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Allow fetching loopback/private hosts (integration tests, intranets).
    #[serde(default)]
    pub allow_private_hosts: bool,

    /// Read timeout in seconds; copied from `[timeouts]` when merged.
    #[serde(skip, default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            render_endpoint: None,
            max_redirects: default_max_redirects(),
            allow_private_hosts: false,
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

fn default_max_redirects() -> usize {
    5
}

/// `[crawler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum concurrent page fetches.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Maximum pages per request, home page included.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Consult `sitemap.xml` when the home page links to too few pages.
    #[serde(default = "default_use_sitemap")]
    pub use_sitemap: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_pages: default_max_pages(),
            use_sitemap: default_use_sitemap(),
        }
    }
}

fn default_max_workers() -> usize {
    4
}
fn default_max_pages() -> usize {
    6
}
fn default_use_sitemap() -> bool {
    true
}

/// `[sufficiency]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SufficiencyConfig {
    #[serde(default = "default_min_pages")]
    pub min_pages: usize,

    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for SufficiencyConfig {
    fn default() -> Self {
        Self {
            min_pages: default_min_pages(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

fn default_min_pages() -> usize {
    2
}
fn default_min_text_chars() -> usize {
    200
}

/// `[keyword]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Number of top keyword weights summed into a taxonomy's normalization max.
    #[serde(default = "default_normalization_top_n")]
    pub normalization_top_n: usize,

    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_taxonomy: usize,

    /// Multiplier applied when the input failed the sufficiency gate.
    #[serde(default = "default_low_content_penalty")]
    pub low_content_penalty: f64,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            normalization_top_n: default_normalization_top_n(),
            max_candidates_per_taxonomy: default_max_candidates(),
            low_content_penalty: default_low_content_penalty(),
        }
    }
}

fn default_normalization_top_n() -> usize {
    3
}
fn default_max_candidates() -> usize {
    3
}
fn default_low_content_penalty() -> f64 {
    0.75
}

/// `[aggregation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Fraction removed from crosswalk-derived confidence before combination.
    #[serde(default = "default_crosswalk_discount")]
    pub crosswalk_discount: f64,

    #[serde(default = "default_max_alternates")]
    pub max_alternates: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            crosswalk_discount: default_crosswalk_discount(),
            max_alternates: default_max_alternates(),
        }
    }
}

fn default_crosswalk_discount() -> f64 {
    0.3
}
fn default_max_alternates() -> usize {
    10
}

/// `[ml]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlConfig {
    /// Classifier endpoint accepting a JSON POST; ML is unavailable without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_ml_api_key_env")]
    pub api_key_env: String,

    /// Maximum characters of page text sent to the classifier.
    #[serde(default = "default_ml_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_ml_api_key_env(),
            max_text_chars: default_ml_max_text_chars(),
        }
    }
}

fn default_ml_api_key_env() -> String {
    "BIZCLASS_ML_API_KEY".into()
}
fn default_ml_max_text_chars() -> usize {
    8_000
}

/// `[reference]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// libSQL database holding codes, keywords and crosswalk edges.
    #[serde(default = "default_reference_db")]
    pub database: String,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            database: default_reference_db(),
        }
    }
}

fn default_reference_db() -> String {
    "~/.bizclass/reference.db".into()
}

// ---------------------------------------------------------------------------
// Budget policy (runtime, derived from config)
// ---------------------------------------------------------------------------

/// Runtime timeout policy consumed by the budget planner.
#[derive(Debug, Clone)]
pub struct BudgetPolicy {
    pub default_timeout: Duration,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub fast_path_threshold: Duration,
    pub overhead_reserve: Duration,
    pub acquisition_share: f64,
    pub ml_share: f64,
    pub min_local_budget: Duration,
}

impl From<&AppConfig> for BudgetPolicy {
    fn from(config: &AppConfig) -> Self {
        let t = &config.timeouts;
        Self {
            default_timeout: Duration::from_secs(t.default_secs),
            min_timeout: Duration::from_secs(t.min_secs),
            max_timeout: Duration::from_secs(t.max_secs),
            fast_path_threshold: Duration::from_secs(t.fast_path_secs),
            overhead_reserve: Duration::from_millis(t.overhead_ms),
            acquisition_share: config.budget.acquisition_share,
            ml_share: config.budget.ml_share,
            min_local_budget: Duration::from_millis(t.min_local_budget_ms),
        }
    }
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl BudgetPolicy {
    /// Reject policies the planner cannot apply: an inverted clamp range, a
    /// default outside it, or shares that are not finite fractions summing
    /// to at most 1.
    pub fn validate(&self) -> Result<()> {
        if self.min_timeout.is_zero() || self.min_timeout > self.max_timeout {
            return Err(BizclassError::config(format!(
                "budget policy: need 0 < min_timeout ({:?}) <= max_timeout ({:?})",
                self.min_timeout, self.max_timeout
            )));
        }
        if self.default_timeout < self.min_timeout || self.default_timeout > self.max_timeout {
            return Err(BizclassError::config(format!(
                "budget policy: default_timeout ({:?}) must lie within [{:?}, {:?}]",
                self.default_timeout, self.min_timeout, self.max_timeout
            )));
        }
        for (name, share) in [
            ("acquisition_share", self.acquisition_share),
            ("ml_share", self.ml_share),
        ] {
            if !(0.0..=1.0).contains(&share) {
                return Err(BizclassError::config(format!(
                    "budget policy: {name} must be within [0, 1], got {share}"
                )));
            }
        }
        if self.acquisition_share + self.ml_share > 1.0 {
            return Err(BizclassError::config(
                "budget policy: acquisition_share + ml_share must not exceed 1",
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Acquisition settings with the shared read timeout folded in.
    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            read_timeout_secs: self.timeouts.read_timeout_secs,
            ..self.acquisition.clone()
        }
    }

    /// Reject configurations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        if t.min_secs == 0 || t.min_secs > t.max_secs {
            return Err(BizclassError::config(format!(
                "timeouts: need 0 < min_secs ({}) <= max_secs ({})",
                t.min_secs, t.max_secs
            )));
        }
        if t.default_secs < t.min_secs || t.default_secs > t.max_secs {
            return Err(BizclassError::config(format!(
                "timeouts: default_secs ({}) must lie within [{}, {}]",
                t.default_secs, t.min_secs, t.max_secs
            )));
        }

        let b = &self.budget;
        for (name, share) in [("acquisition_share", b.acquisition_share), ("ml_share", b.ml_share)] {
            if !(0.0..=1.0).contains(&share) {
                return Err(BizclassError::config(format!(
                    "budget: {name} must be within [0, 1], got {share}"
                )));
            }
        }
        if b.acquisition_share + b.ml_share > 1.0 {
            return Err(BizclassError::config(
                "budget: acquisition_share + ml_share must not exceed 1",
            ));
        }

        if self.crawler.max_workers == 0 || self.crawler.max_pages == 0 {
            return Err(BizclassError::config(
                "crawler: max_workers and max_pages must be at least 1",
            ));
        }
        if self.keyword.normalization_top_n == 0 {
            return Err(BizclassError::config(
                "keyword: normalization_top_n must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.keyword.low_content_penalty) {
            return Err(BizclassError::config(
                "keyword: low_content_penalty must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.aggregation.crosswalk_discount) {
            return Err(BizclassError::config(
                "aggregation: crosswalk_discount must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bizclass/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BizclassError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bizclass/bizclass.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BizclassError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        BizclassError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BizclassError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BizclassError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BizclassError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| BizclassError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the ML bearer token from the configured env var, if present.
pub fn ml_api_key(config: &MlConfig) -> Option<String> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|v| !v.is_empty())
}
