//! Bounded parallel crawler for candidate pages.
//!
//! After the home page is acquired, candidate pages are fetched concurrently
//! (at most `max_workers` in flight, at most `max_pages` in total including
//! the home page). Results are appended to [`AcquiredContent`] at a single
//! point, in completion order. Once the sufficiency gate is satisfied no new
//! fetches start; fetches already in flight drain. When the deadline passes,
//! outstanding fetches are aborted and whatever was collected is kept.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use bizclass_shared::{AcquiredContent, CrawlStats, CrawlerConfig, Deadline, PageContent};

use crate::extract;
use crate::gate::SufficiencyGate;
use crate::strategy::{PageFetcher, Strategy};

// ---------------------------------------------------------------------------
// CrawlSummary
// ---------------------------------------------------------------------------

/// Summary of one crawl pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Fetches issued.
    pub requested: usize,
    /// Pages that produced text.
    pub fetched: usize,
    /// Pages recorded with an error.
    pub failed: usize,
    /// Pages dropped because their text duplicated an earlier page.
    pub duplicates: usize,
    /// Fetches aborted at the deadline.
    pub aborted: usize,
    /// `true` if the gate was satisfied before every candidate was fetched.
    pub stopped_early: bool,
    pub duration: Duration,
}

impl From<&CrawlSummary> for CrawlStats {
    fn from(summary: &CrawlSummary) -> Self {
        Self {
            requested: summary.requested,
            fetched: summary.fetched,
            failed: summary.failed,
            duplicates: summary.duplicates,
            aborted: summary.aborted,
            stopped_early: summary.stopped_early,
            duration_ms: summary.duration.as_millis() as u64,
        }
    }
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Concurrent page crawler.
#[derive(Debug, Clone)]
pub struct Crawler {
    fetcher: PageFetcher,
    max_workers: usize,
    max_pages: usize,
}

impl Crawler {
    pub fn new(fetcher: PageFetcher, config: &CrawlerConfig) -> Self {
        Self {
            fetcher,
            max_workers: config.max_workers.max(1),
            max_pages: config.max_pages,
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Fetch `seeds` with `strategy` and append the pages to `content`.
    ///
    /// Pages already in `content` (the home page) count against `max_pages`
    /// and seed the duplicate-text filter.
    #[instrument(skip_all, fields(seeds = seeds.len(), strategy = %strategy))]
    pub async fn crawl(
        &self,
        seeds: Vec<Url>,
        strategy: &Strategy,
        deadline: &Deadline,
        gate: &SufficiencyGate,
        content: &mut AcquiredContent,
    ) -> CrawlSummary {
        let start_time = Instant::now();
        let mut summary = CrawlSummary::default();

        let slots = self.max_pages.saturating_sub(content.pages.len());
        let mut queue: VecDeque<Url> = seeds.into_iter().take(slots).collect();
        let mut seen_text: HashSet<String> = content
            .successful()
            .map(|p| compute_hash(&p.text))
            .collect();
        let mut tasks: JoinSet<PageContent> = JoinSet::new();

        info!(
            queued = queue.len(),
            max_workers = self.max_workers,
            remaining_ms = deadline.remaining().as_millis() as u64,
            "starting crawl"
        );

        loop {
            // Issue fetches while there is capacity, work and a reason to continue
            while tasks.len() < self.max_workers && !deadline.is_expired() {
                if gate.is_satisfied(content) {
                    summary.stopped_early |= !queue.is_empty();
                    break;
                }
                let Some(url) = queue.pop_front() else {
                    break;
                };
                summary.requested += 1;

                let fetcher = self.fetcher.clone();
                let strategy = strategy.clone();
                let deadline = deadline.clone();
                tasks.spawn(async move { fetch_page(&fetcher, &strategy, url, &deadline).await });
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    Some(Ok(page)) => {
                        if page.is_success() && !seen_text.insert(compute_hash(&page.text)) {
                            debug!(url = %page.url, "duplicate page text, skipping");
                            summary.duplicates += 1;
                            continue;
                        }
                        if page.is_success() {
                            summary.fetched += 1;
                        } else {
                            summary.failed += 1;
                        }
                        content.push(page);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "crawl task failed");
                        summary.failed += 1;
                    }
                    None => break,
                },
                _ = deadline.expired() => {
                    summary.aborted = tasks.len();
                    warn!(aborted = summary.aborted, "deadline reached, aborting outstanding fetches");
                    tasks.abort_all();
                    break;
                }
            }
        }

        summary.duration = start_time.elapsed();
        info!(
            requested = summary.requested,
            fetched = summary.fetched,
            failed = summary.failed,
            duplicates = summary.duplicates,
            aborted = summary.aborted,
            stopped_early = summary.stopped_early,
            duration_ms = summary.duration.as_millis() as u64,
            "crawl completed"
        );
        summary
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetch a single page; failures become a `PageContent` carrying the error.
async fn fetch_page(
    fetcher: &PageFetcher,
    strategy: &Strategy,
    url: Url,
    deadline: &Deadline,
) -> PageContent {
    debug!(%url, "fetching page");
    let start = Instant::now();

    let (text, error) = match fetcher.fetch(strategy, &url, deadline).await {
        Ok(doc) => {
            let text = extract::extract_text(&doc.html);
            if text.is_empty() {
                (String::new(), Some("no visible text".to_string()))
            } else {
                (text, None)
            }
        }
        Err(e) => (String::new(), Some(e.to_string())),
    };

    PageContent {
        url: url.to_string(),
        text,
        latency: start.elapsed(),
        strategy: strategy.name().to_string(),
        error,
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
