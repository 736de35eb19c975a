//! End-to-end classification: request → budget → acquisition → crawl →
//! sufficiency gate → methods → crosswalk backfill → aggregation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use bizclass_crawler::{CrawlSummary, Crawler, StrategyChain, SufficiencyGate};
use bizclass_discovery::DiscoveryOptions;
use bizclass_shared::{
    AcquiredContent, AcquisitionConfig, AcquisitionOutcome, AggregationConfig, AppConfig,
    BizclassError, BudgetPolicy, ClassificationRequest, ClassificationResult,
    ClassificationStatus, CrawlStats, CrawlerConfig, Deadline, Degradation, Diagnostics, KeywordConfig,
    MethodKind, MethodReport, MethodResult, MethodStatus, MlConfig, PageContent, Result,
    SufficiencyConfig, TimeoutBudget,
};
use bizclass_taxonomy::ReferenceData;

use crate::aggregate::Aggregator;
use crate::budget::BudgetPlanner;
use crate::business_type::BusinessTypeClassifier;
use crate::crosswalk;
use crate::keyword::KeywordClassifier;
use crate::ml::{HttpMlClassifier, MlClassifier, MlInput, to_method_results};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime engine settings, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub budget: BudgetPolicy,
    pub acquisition: AcquisitionConfig,
    pub crawler: CrawlerConfig,
    pub sufficiency: SufficiencyConfig,
    pub keyword: KeywordConfig,
    pub aggregation: AggregationConfig,
    pub ml: MlConfig,
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            budget: BudgetPolicy::from(config),
            acquisition: config.acquisition(),
            crawler: config.crawler.clone(),
            sufficiency: config.sufficiency.clone(),
            keyword: config.keyword.clone(),
            aggregation: config.aggregation.clone(),
            ml: config.ml.clone(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the request completes.
    fn done(&self, result: &ClassificationResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &ClassificationResult) {}
}

// ---------------------------------------------------------------------------
// ClassificationEngine
// ---------------------------------------------------------------------------

/// Classifies businesses into NAICS, SIC and MCC codes.
///
/// Holds only immutable state; one engine serves any number of concurrent
/// requests.
pub struct ClassificationEngine {
    reference: Arc<ReferenceData>,
    planner: BudgetPlanner,
    chain: StrategyChain,
    crawler: Crawler,
    gate: SufficiencyGate,
    use_sitemap: bool,
    keyword: KeywordClassifier,
    business_type: BusinessTypeClassifier,
    aggregator: Aggregator,
    ml: Option<Arc<dyn MlClassifier>>,
}

impl ClassificationEngine {
    /// Build an engine. The HTTP ML classifier is wired in when
    /// `config.ml.endpoint` is set. Fails on a budget policy the planner
    /// cannot apply.
    pub fn new(config: &EngineConfig, reference: Arc<ReferenceData>) -> Result<Self> {
        let chain = StrategyChain::from_config(&config.acquisition)?;
        let crawler = Crawler::new(chain.fetcher().clone(), &config.crawler);
        let ml = HttpMlClassifier::from_config(&config.ml)?
            .map(|classifier| Arc::new(classifier) as Arc<dyn MlClassifier>);

        Ok(Self {
            reference,
            planner: BudgetPlanner::new(config.budget.clone(), ml.is_some())?,
            chain,
            crawler,
            gate: SufficiencyGate::from(&config.sufficiency),
            use_sitemap: config.crawler.use_sitemap,
            keyword: KeywordClassifier::new(&config.keyword),
            business_type: BusinessTypeClassifier,
            aggregator: Aggregator::new(&config.aggregation),
            ml,
        })
    }

    /// Replace the ML backend.
    pub fn with_ml_classifier(mut self, classifier: Arc<dyn MlClassifier>) -> Self {
        self.planner = self.planner.with_ml_available(true);
        self.ml = Some(classifier);
        self
    }

    pub fn reference(&self) -> &Arc<ReferenceData> {
        &self.reference
    }

    /// The budget a request would be given.
    pub fn plan(&self, request: &ClassificationRequest) -> TimeoutBudget {
        self.planner.plan(request)
    }

    /// Classify under a fresh root deadline.
    pub async fn classify(&self, request: ClassificationRequest) -> Result<ClassificationResult> {
        let root = Deadline::after(self.planner.policy().max_timeout);
        self.classify_within(request, &root).await
    }

    /// Classify under a caller-supplied deadline. The request's own budget
    /// can only shorten it; cancelling its token aborts the request with
    /// [`BizclassError::DeadlineExceeded`].
    pub async fn classify_within(
        &self,
        request: ClassificationRequest,
        parent: &Deadline,
    ) -> Result<ClassificationResult> {
        self.run(request, parent, &SilentProgress).await
    }

    /// [`classify_within`](Self::classify_within) with progress callbacks.
    #[instrument(skip_all, fields(request_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        request: ClassificationRequest,
        parent: &Deadline,
        progress: &dyn ProgressReporter,
    ) -> Result<ClassificationResult> {
        let started = Instant::now();
        request.validate()?;
        ensure_not_cancelled(parent, started)?;

        let website = request.website_url()?;
        let name = request.name().map(str::to_string);
        let request_id = Uuid::now_v7().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());

        let budget = self.planner.plan(&request);
        let deadline = parent.child(budget.total);
        info!(
            name = name.as_deref().unwrap_or(""),
            website = website.as_ref().map(Url::as_str).unwrap_or(""),
            total_ms = budget.total.as_millis() as u64,
            fast_path = budget.fast_path,
            "classification started"
        );

        // --- Acquisition ---
        let mut content = AcquiredContent::default();
        let mut degradations = Vec::new();
        let mut crawl = None;
        let (acquisition, sufficiency) = match &website {
            None => (AcquisitionOutcome::NotAttempted, None),
            Some(url) => {
                let acquisition_deadline = deadline.child(budget.acquisition);
                let (outcome, summary) = self
                    .acquire(url, &acquisition_deadline, budget.fast_path, &mut content, progress)
                    .await;
                crawl = summary.as_ref().map(CrawlStats::from);
                let verdict = self.gate.evaluate(&content);
                match &outcome {
                    AcquisitionOutcome::Exhausted { .. } => {
                        degradations.push(Degradation::AcquisitionExhausted);
                    }
                    _ if !verdict.sufficient => {
                        degradations.push(Degradation::InsufficientContent);
                    }
                    _ => {}
                }
                debug!(sufficient = verdict.sufficient, reason = %verdict.reason, "sufficiency verdict");
                (outcome, Some(verdict))
            }
        };
        ensure_not_cancelled(parent, started)?;

        // --- Methods ---
        progress.phase("Classifying");
        // Only acquired but thin content is penalized. After exhaustion the
        // keyword method sees the name alone.
        let low_confidence_input = matches!(acquisition, AcquisitionOutcome::Acquired { .. })
            && sufficiency.as_ref().is_some_and(|v| !v.sufficient);
        let ml_input = MlInput {
            business_name: name.clone(),
            website: website.as_ref().map(Url::to_string),
            text: content.combined_text(),
        };
        let keyword_segments: Vec<String> = name
            .iter()
            .cloned()
            .chain(content.segments().map(str::to_string))
            .collect();

        let local_budget = budget.keyword.max(self.planner.policy().min_local_budget);
        let keyword = {
            let reference = Arc::clone(&self.reference);
            let classifier = self.keyword;
            run_local(MethodKind::Keyword, local_budget, move || {
                classifier.classify(&reference, &keyword_segments, low_confidence_input)
            })
        };
        let business_type = async {
            match name.clone() {
                Some(name) => {
                    let reference = Arc::clone(&self.reference);
                    let classifier = self.business_type;
                    run_local(MethodKind::BusinessType, local_budget, move || {
                        classifier.classify(&reference, &name)
                    })
                    .await
                }
                None => skipped(MethodKind::BusinessType, "no business name"),
            }
        };
        let ml = async {
            if request.flags.enable_ml {
                Some(self.run_ml(&ml_input, &deadline, budget.ml).await)
            } else {
                None
            }
        };
        let (keyword, business_type, ml) = tokio::join!(keyword, business_type, ml);

        let mut methods: Vec<MethodReport> = [Some(keyword), Some(business_type), ml]
            .into_iter()
            .flatten()
            .collect();
        for report in &methods {
            if report.status == MethodStatus::TimedOut {
                degradations.push(Degradation::MethodTimeout {
                    method: report.method,
                });
            }
        }
        ensure_not_cancelled(parent, started)?;

        // --- Backfill & aggregation ---
        let direct: Vec<MethodResult> = methods
            .iter()
            .flat_map(|m| m.results.iter().cloned())
            .collect();
        let derived = crosswalk::backfill(&self.reference, &direct);
        for result in &derived {
            if let Some(report) = methods.iter_mut().find(|m| m.method == result.method) {
                report.results.push(result.clone());
            }
        }
        let mut all = direct.clone();
        all.extend(derived);

        let aggregate = self.aggregator.aggregate(&all);
        if aggregate.status == ClassificationStatus::Unclassified {
            degradations.push(Degradation::Unclassifiable);
        }
        let scenarios = request
            .flags
            .include_scenarios
            .then(|| self.aggregator.scenarios(&self.reference, &direct));

        let result = ClassificationResult {
            status: aggregate.status,
            primary: aggregate.primary,
            overall_confidence: aggregate.overall_confidence,
            alternates: aggregate.alternates,
            methods,
            scenarios,
            diagnostics: Diagnostics {
                request_id,
                budget,
                acquisition,
                sufficiency,
                pages_fetched: content.successful_count(),
                pages_failed: content.failed_count(),
                crawl,
                degradations,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
            generated_at: Utc::now(),
        };

        info!(
            status = ?result.status,
            primary = result.primary.len(),
            overall_confidence = result.overall_confidence,
            degradations = result.diagnostics.degradations.len(),
            elapsed_ms = result.diagnostics.elapsed_ms,
            "classification completed"
        );
        progress.done(&result);
        Ok(result)
    }

    /// Acquire the home page, then crawl candidate pages until the gate is
    /// satisfied or the acquisition budget runs out. The summary is `None`
    /// when no crawl ran.
    async fn acquire(
        &self,
        url: &Url,
        deadline: &Deadline,
        fast_path: bool,
        content: &mut AcquiredContent,
        progress: &dyn ProgressReporter,
    ) -> (AcquisitionOutcome, Option<CrawlSummary>) {
        progress.phase("Acquiring website");
        let acquired = match self.chain.acquire(url, deadline, fast_path).await {
            Ok(acquired) => acquired,
            Err(failure) => {
                let outcome = AcquisitionOutcome::Exhausted {
                    attempts: failure.attempts,
                };
                return (outcome, None);
            }
        };

        content.push(PageContent {
            url: acquired.url.to_string(),
            text: acquired.text.clone(),
            latency: acquired.latency,
            strategy: acquired.strategy.name().to_string(),
            error: None,
        });

        let mut summary = None;
        let max_candidates = self.crawler.max_pages().saturating_sub(1);
        if max_candidates > 0 && !self.gate.is_satisfied(content) && !deadline.is_expired() {
            progress.phase("Crawling candidate pages");
            let options = DiscoveryOptions {
                max_candidates,
                use_sitemap: self.use_sitemap && self.chain.fetcher().permits(&acquired.url),
            };
            let seeds = bizclass_discovery::discover(
                self.chain.fetcher().client(),
                &acquired.url,
                &acquired.html,
                deadline,
                &options,
            )
            .await;
            summary = Some(
                self.crawler
                    .crawl(seeds, &acquired.strategy, deadline, &self.gate, content)
                    .await,
            );
        }

        let outcome = AcquisitionOutcome::Acquired {
            strategy: acquired.strategy.name().to_string(),
            url: acquired.url.to_string(),
            attempts: acquired.attempts,
        };
        (outcome, summary)
    }

    async fn run_ml(&self, input: &MlInput, deadline: &Deadline, budget: Duration) -> MethodReport {
        let Some(classifier) = &self.ml else {
            return skipped(MethodKind::Ml, "no ML classifier configured");
        };

        let start = Instant::now();
        let ml_deadline = deadline.child(budget);
        let (status, results) = match ml_deadline.run(classifier.predict(input)).await {
            Ok(Ok(output)) => (MethodStatus::Completed, to_method_results(&self.reference, &output)),
            Ok(Err(e)) => {
                warn!(classifier = classifier.name(), error = %e, "ml classifier failed");
                (
                    MethodStatus::Failed {
                        message: e.to_string(),
                    },
                    Vec::new(),
                )
            }
            Err(interrupted) => {
                warn!(
                    classifier = classifier.name(),
                    budget_ms = budget.as_millis() as u64,
                    %interrupted,
                    "ml classifier omitted"
                );
                (MethodStatus::TimedOut, Vec::new())
            }
        };

        MethodReport {
            method: MethodKind::Ml,
            status,
            elapsed_ms: start.elapsed().as_millis() as u64,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run a CPU-only method on the blocking pool, bounded by `budget`.
async fn run_local<F>(method: MethodKind, budget: Duration, f: F) -> MethodReport
where
    F: FnOnce() -> Vec<MethodResult> + Send + 'static,
{
    let start = Instant::now();
    let (status, results) = match tokio::time::timeout(budget, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(results)) => (MethodStatus::Completed, results),
        Ok(Err(e)) => {
            warn!(%method, error = %e, "method task failed");
            (
                MethodStatus::Failed {
                    message: e.to_string(),
                },
                Vec::new(),
            )
        }
        Err(_) => {
            warn!(%method, budget_ms = budget.as_millis() as u64, "method timed out");
            (MethodStatus::TimedOut, Vec::new())
        }
    };

    MethodReport {
        method,
        status,
        elapsed_ms: start.elapsed().as_millis() as u64,
        results,
    }
}

fn skipped(method: MethodKind, reason: &str) -> MethodReport {
    MethodReport {
        method,
        status: MethodStatus::Skipped {
            reason: reason.to_string(),
        },
        elapsed_ms: 0,
        results: Vec::new(),
    }
}

fn ensure_not_cancelled(parent: &Deadline, started: Instant) -> Result<()> {
    if parent.token().is_cancelled() {
        return Err(BizclassError::DeadlineExceeded {
            elapsed_ms: started.elapsed().as_millis(),
        });
    }
    Ok(())
}
