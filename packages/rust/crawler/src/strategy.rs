//! Acquisition strategy chain.
//!
//! A website is fetched by trying strategies in a fixed priority order until
//! one yields a page with visible text: a plain HTTP GET, a GET dressed up
//! with desktop-browser headers, and (when a rendering service is configured)
//! a headless render. Every attempt is bounded by the request's [`Deadline`];
//! once it expires the remaining strategies are recorded as skipped.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT as USER_AGENT_HEADER};
use tracing::{debug, info, instrument, warn};
use url::Url;

use bizclass_shared::{AcquisitionConfig, AttemptOutcome, AttemptRecord, BizclassError, Deadline, Result};

use crate::extract;

/// User-Agent string for plain requests.
const USER_AGENT: &str = concat!("bizclass/", env!("CARGO_PKG_VERSION"));

/// Desktop browser identity for the browser-headers strategy.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// One way of fetching a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    PlainHttp,
    BrowserHeaders,
    /// `GET <endpoint>?url=<target>` against a rendering service that
    /// returns the page's DOM after scripts ran.
    HeadlessRender { endpoint: Url },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlainHttp => "plain_http",
            Self::BrowserHeaders => "browser_headers",
            Self::HeadlessRender { .. } => "headless_render",
        }
    }

    /// Expensive strategies are skipped on the fast path.
    pub fn is_expensive(&self) -> bool {
        matches!(self, Self::HeadlessRender { .. })
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

/// A fetched HTML document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects (the target URL for rendered pages).
    pub url: Url,
    pub html: String,
}

/// Executes a single strategy against a single URL. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    read_timeout: Duration,
    allow_private_hosts: bool,
}

impl PageFetcher {
    pub fn new(config: &AcquisitionConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| BizclassError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// `true` if `url` may be fetched under this fetcher's host policy.
    pub fn permits(&self, url: &Url) -> bool {
        self.allow_private_hosts || !is_ssrf_target(url)
    }

    /// Fetch `url` with `strategy`, bounded by `deadline`.
    ///
    /// The request timeout is the smaller of the read timeout and the time
    /// left; cancelling the deadline's token drops the in-flight request.
    pub async fn fetch(
        &self,
        strategy: &Strategy,
        url: &Url,
        deadline: &Deadline,
    ) -> Result<FetchedDocument> {
        if !self.permits(url) {
            return Err(BizclassError::validation(format!(
                "{url}: private, loopback or non-http target blocked"
            )));
        }

        let timeout = self.read_timeout.min(deadline.remaining());
        let request = match strategy {
            Strategy::PlainHttp => self.client.get(url.as_str()),
            Strategy::BrowserHeaders => self
                .client
                .get(url.as_str())
                .header(USER_AGENT_HEADER, BROWSER_USER_AGENT)
                .header(ACCEPT, BROWSER_ACCEPT)
                .header(ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE),
            Strategy::HeadlessRender { endpoint } => {
                let mut render_url = endpoint.clone();
                render_url.query_pairs_mut().append_pair("url", url.as_str());
                self.client.get(render_url)
            }
        }
        .timeout(timeout);

        let fetch = async {
            let response = request
                .send()
                .await
                .map_err(|e| BizclassError::Network(format!("{url}: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(BizclassError::Network(format!("{url}: HTTP {status}")));
            }

            let final_url = match strategy {
                Strategy::HeadlessRender { .. } => url.clone(),
                _ => response.url().clone(),
            };

            let html = response
                .text()
                .await
                .map_err(|e| BizclassError::Network(format!("{url}: body read failed: {e}")))?;

            if html.trim().is_empty() {
                return Err(BizclassError::Network(format!("{url}: empty body")));
            }

            Ok(FetchedDocument {
                url: final_url,
                html,
            })
        };

        deadline
            .run(fetch)
            .await
            .map_err(|e| BizclassError::Network(format!("{url}: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// StrategyChain
// ---------------------------------------------------------------------------

/// Successful acquisition of the home page.
#[derive(Debug, Clone)]
pub struct Acquired {
    /// Final URL, after redirects.
    pub url: Url,
    pub html: String,
    /// Extracted visible text.
    pub text: String,
    pub strategy: Strategy,
    pub latency: Duration,
    pub attempts: Vec<AttemptRecord>,
}

/// Every strategy failed or was skipped.
#[derive(Debug, Clone, thiserror::Error)]
#[error("all acquisition strategies failed ({} attempts)", .attempts.len())]
pub struct AcquisitionFailure {
    pub attempts: Vec<AttemptRecord>,
}

/// Ordered strategies plus the fetcher that executes them.
#[derive(Debug, Clone)]
pub struct StrategyChain {
    fetcher: PageFetcher,
    strategies: Vec<Strategy>,
}

impl StrategyChain {
    /// Build the default chain: plain HTTP, browser headers, then headless
    /// render if `render_endpoint` is configured.
    pub fn from_config(config: &AcquisitionConfig) -> Result<Self> {
        let mut strategies = vec![Strategy::PlainHttp, Strategy::BrowserHeaders];
        if let Some(endpoint) = &config.render_endpoint {
            let endpoint = Url::parse(endpoint).map_err(|e| {
                BizclassError::config(format!("invalid render_endpoint {endpoint:?}: {e}"))
            })?;
            strategies.push(Strategy::HeadlessRender { endpoint });
        }
        Ok(Self::new(PageFetcher::new(config)?, strategies))
    }

    pub fn new(fetcher: PageFetcher, strategies: Vec<Strategy>) -> Self {
        Self {
            fetcher,
            strategies,
        }
    }

    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Try each strategy in order until one yields visible text.
    #[instrument(skip_all, fields(url = %url, fast_path = fast_path))]
    pub async fn acquire(
        &self,
        url: &Url,
        deadline: &Deadline,
        fast_path: bool,
    ) -> std::result::Result<Acquired, AcquisitionFailure> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        if !self.fetcher.permits(url) {
            warn!(%url, "SSRF protection: blocked");
            for strategy in &self.strategies {
                attempts.push(skipped(strategy, "target host not allowed"));
            }
            return Err(AcquisitionFailure { attempts });
        }

        for (i, strategy) in self.strategies.iter().enumerate() {
            if deadline.is_expired() {
                debug!(remaining = self.strategies.len() - i, "deadline expired, skipping remaining strategies");
                for rest in &self.strategies[i..] {
                    attempts.push(skipped(rest, "deadline expired"));
                }
                break;
            }
            if fast_path && strategy.is_expensive() {
                attempts.push(skipped(strategy, "fast path"));
                continue;
            }

            let start = Instant::now();
            let outcome = match self.fetcher.fetch(strategy, url, deadline).await {
                Ok(doc) => {
                    let text = extract::extract_text(&doc.html);
                    if text.is_empty() {
                        Err("no visible text".to_string())
                    } else {
                        Ok((doc, text))
                    }
                }
                Err(e) => Err(e.to_string()),
            };
            let latency = start.elapsed();

            match outcome {
                Ok((doc, text)) => {
                    attempts.push(AttemptRecord {
                        strategy: strategy.name().to_string(),
                        outcome: AttemptOutcome::Succeeded,
                        elapsed_ms: latency.as_millis() as u64,
                    });
                    info!(
                        strategy = strategy.name(),
                        final_url = %doc.url,
                        text_chars = text.chars().count(),
                        latency_ms = latency.as_millis() as u64,
                        "home page acquired"
                    );
                    return Ok(Acquired {
                        url: doc.url,
                        html: doc.html,
                        text,
                        strategy: strategy.clone(),
                        latency,
                        attempts,
                    });
                }
                Err(message) => {
                    debug!(strategy = strategy.name(), error = %message, "strategy failed");
                    attempts.push(AttemptRecord {
                        strategy: strategy.name().to_string(),
                        outcome: AttemptOutcome::Failed { message },
                        elapsed_ms: latency.as_millis() as u64,
                    });
                }
            }
        }

        warn!(attempts = attempts.len(), "acquisition exhausted");
        Err(AcquisitionFailure { attempts })
    }
}

fn skipped(strategy: &Strategy, reason: &str) -> AttemptRecord {
    AttemptRecord {
        strategy: strategy.name().to_string(),
        outcome: AttemptOutcome::Skipped {
            reason: reason.to_string(),
        },
        elapsed_ms: 0,
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOME: &str = "<html><head><title>Joe's Pizza</title></head>\
        <body><main><p>Brick oven pizza and calzones.</p></main></body></html>";

    fn local_config() -> AcquisitionConfig {
        AcquisitionConfig {
            allow_private_hosts: true,
            ..AcquisitionConfig::default()
        }
    }

    fn chain(render: Option<&str>) -> StrategyChain {
        let config = AcquisitionConfig {
            render_endpoint: render.map(str::to_string),
            ..local_config()
        };
        StrategyChain::from_config(&config).unwrap()
    }

    fn outcomes(attempts: &[AttemptRecord]) -> Vec<(&str, &AttemptOutcome)> {
        attempts.iter().map(|a| (a.strategy.as_str(), &a.outcome)).collect()
    }

    #[test]
    fn test_ssrf_protection_blocks_file() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn test_ssrf_protection_blocks_private_ip() {
        for target in ["http://192.168.1.1/admin", "http://10.0.0.1/", "http://127.0.0.1:8080/", "http://[::1]/"] {
            assert!(is_ssrf_target(&Url::parse(target).unwrap()), "{target}");
        }
    }

    #[test]
    fn test_ssrf_protection_allows_public() {
        let url = Url::parse("https://joespizza.example/menu").unwrap();
        assert!(!is_ssrf_target(&url));
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/").unwrap()));
    }

    #[test]
    fn test_chain_order_with_render_endpoint() {
        let chain = chain(Some("http://render.internal/render"));
        let names: Vec<_> = chain.strategies().iter().map(Strategy::name).collect();
        assert_eq!(names, ["plain_http", "browser_headers", "headless_render"]);
        assert!(chain.strategies()[2].is_expensive());
    }

    #[test]
    fn test_invalid_render_endpoint_is_config_error() {
        let config = AcquisitionConfig {
            render_endpoint: Some("not a url".into()),
            ..local_config()
        };
        let err = StrategyChain::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("render_endpoint"));
    }

    #[tokio::test]
    async fn test_first_strategy_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOME))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let acquired = chain(None)
            .acquire(&url, &Deadline::after(Duration::from_secs(5)), false)
            .await
            .unwrap();

        assert_eq!(acquired.strategy, Strategy::PlainHttp);
        assert_eq!(acquired.attempts.len(), 1);
        assert!(acquired.text.contains("Brick oven pizza"));
    }

    #[tokio::test]
    async fn test_falls_back_to_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_exists("accept-language"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOME))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let acquired = chain(None)
            .acquire(&url, &Deadline::after(Duration::from_secs(5)), false)
            .await
            .unwrap();

        assert_eq!(acquired.strategy, Strategy::BrowserHeaders);
        let outcomes = outcomes(&acquired.attempts);
        assert_eq!(outcomes[0].0, "plain_http");
        assert!(matches!(outcomes[0].1, AttemptOutcome::Failed { message } if message.contains("403")));
        assert_eq!(outcomes[1], ("browser_headers", &AttemptOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_render_used_when_page_has_no_text() {
        let server = MockServer::start().await;
        let target = format!("{}/", server.uri());
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body><div id=\"app\"></div></body></html>"),
            )
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/render"))
            .and(query_param("url", target.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOME))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&target).unwrap();
        let acquired = chain(Some(&format!("{}/render", server.uri())))
            .acquire(&url, &Deadline::after(Duration::from_secs(5)), false)
            .await
            .unwrap();

        assert!(matches!(acquired.strategy, Strategy::HeadlessRender { .. }));
        assert_eq!(acquired.url, url);
        assert_eq!(acquired.attempts.len(), 3);
    }

    #[tokio::test]
    async fn test_fast_path_skips_render() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(path("/render"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOME))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let failure = chain(Some(&format!("{}/render", server.uri())))
            .acquire(&url, &Deadline::after(Duration::from_secs(5)), true)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts.len(), 3);
        assert!(matches!(
            &failure.attempts[2].outcome,
            AttemptOutcome::Skipped { reason } if reason == "fast path"
        ));
    }

    #[tokio::test]
    async fn test_expired_deadline_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOME))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let failure = chain(None)
            .acquire(&url, &Deadline::after(Duration::ZERO), false)
            .await
            .unwrap_err();

        assert_eq!(failure.attempts.len(), 2);
        assert!(failure
            .attempts
            .iter()
            .all(|a| matches!(a.outcome, AttemptOutcome::Skipped { .. })));
    }

    #[tokio::test]
    async fn test_slow_server_bounded_by_deadline() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(HOME)
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let start = Instant::now();
        let failure = chain(None)
            .acquire(&url, &Deadline::after(Duration::from_millis(300)), false)
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(matches!(failure.attempts[0].outcome, AttemptOutcome::Failed { .. }));
        assert!(matches!(failure.attempts[1].outcome, AttemptOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_private_target_blocked_by_default() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOME))
            .expect(0)
            .mount(&server)
            .await;

        let chain = StrategyChain::from_config(&AcquisitionConfig::default()).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let failure = chain
            .acquire(&url, &Deadline::after(Duration::from_secs(5)), false)
            .await
            .unwrap_err();

        assert!(failure
            .attempts
            .iter()
            .all(|a| matches!(a.outcome, AttemptOutcome::Skipped { .. })));
    }
}
