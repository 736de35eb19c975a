//! Candidate-page discovery for a business website.
//!
//! After the home page is acquired, links on it are ranked by how much the
//! target page is likely to say about the business (about, services, menu,
//! ...). When the home page links to too few pages, `<origin>/sitemap.xml`
//! is consulted as a fallback, within whatever time the request has left.

mod parser;

use bizclass_shared::{BizclassError, Deadline, Result};
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

pub use parser::{extract_links, normalize_url, parse_sitemap, rank_candidates, score_path};

/// Maximum sitemap size we are willing to scan (2 MB).
const MAX_SITEMAP_SIZE: u64 = 2 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Configuration for the discovery process.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Maximum number of candidate URLs to return (home page excluded).
    pub max_candidates: usize,
    /// Fetch `sitemap.xml` when the home page yields fewer candidates.
    pub use_sitemap: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_candidates: 5,
            use_sitemap: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Rank crawl candidates from the home page's links, topping up from the
/// sitemap when needed. Never fails: sitemap problems only reduce the list.
#[instrument(skip_all, fields(home = %home))]
pub async fn discover(
    client: &Client,
    home: &Url,
    html: &str,
    deadline: &Deadline,
    opts: &DiscoveryOptions,
) -> Vec<Url> {
    if opts.max_candidates == 0 {
        return Vec::new();
    }

    let mut candidates = rank_candidates(home, extract_links(html, home));
    debug!(from_links = candidates.len(), "ranked home page links");

    if candidates.len() < opts.max_candidates && opts.use_sitemap && !deadline.is_expired() {
        match fetch_sitemap(client, home, deadline).await {
            Ok(urls) => {
                let mut combined = candidates.clone();
                combined.extend(urls);
                candidates = rank_candidates(home, combined);
            }
            Err(e) => debug!(error = %e, "sitemap unavailable"),
        }
    }

    candidates.truncate(opts.max_candidates);
    info!(candidates = candidates.len(), "candidate pages discovered");
    candidates
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the origin (scheme + host + port) from a URL.
fn origin_url(url: &Url) -> Result<String> {
    let scheme = url.scheme();
    let host = url
        .host_str()
        .ok_or_else(|| BizclassError::validation(format!("URL has no host: {url}")))?;

    match url.port() {
        Some(port) => Ok(format!("{scheme}://{host}:{port}")),
        None => Ok(format!("{scheme}://{host}")),
    }
}

/// Fetch and parse `<origin>/sitemap.xml`, bounded by `deadline`.
async fn fetch_sitemap(client: &Client, home: &Url, deadline: &Deadline) -> Result<Vec<Url>> {
    let sitemap_url = format!("{}/sitemap.xml", origin_url(home)?);

    let fetch = async {
        let response = client
            .get(&sitemap_url)
            .timeout(deadline.remaining())
            .send()
            .await
            .map_err(|e| BizclassError::Network(format!("{sitemap_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BizclassError::Network(format!("{sitemap_url}: HTTP {status}")));
        }
        if let Some(len) = response.content_length() {
            if len > MAX_SITEMAP_SIZE {
                return Err(BizclassError::validation(format!(
                    "{sitemap_url}: sitemap too large ({len} bytes, max {MAX_SITEMAP_SIZE})"
                )));
            }
        }

        response
            .text()
            .await
            .map_err(|e| BizclassError::Network(format!("{sitemap_url}: failed to read body: {e}")))
    };

    let body = deadline
        .run(fetch)
        .await
        .map_err(|e| BizclassError::Network(format!("{sitemap_url}: {e}")))??;

    Ok(parse_sitemap(&body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const HOME_HTML: &str = r#"<html><body>
        <nav><a href="/">Home</a><a href="/menu">Menu</a></nav>
        <a href="/about-us">About us</a>
        <a href="/login">Log in</a>
    </body></html>"#;

    #[test]
    fn test_origin_url_simple() {
        let url = Url::parse("https://joespizza.example/foo/bar").unwrap();
        assert_eq!(origin_url(&url).unwrap(), "https://joespizza.example");
    }

    #[test]
    fn test_origin_url_with_port() {
        let url = Url::parse("http://localhost:3000/menu").unwrap();
        assert_eq!(origin_url(&url).unwrap(), "http://localhost:3000");
    }

    #[tokio::test]
    async fn test_discover_from_links_only() {
        let home = Url::parse("https://joespizza.example/").unwrap();
        let opts = DiscoveryOptions {
            max_candidates: 5,
            use_sitemap: false,
        };
        let found = discover(
            &Client::new(),
            &home,
            HOME_HTML,
            &Deadline::after(Duration::from_secs(5)),
            &opts,
        )
        .await;

        let paths: Vec<_> = found.iter().map(|u| u.path().to_string()).collect();
        assert_eq!(paths, ["/about-us", "/menu"]);
    }

    #[tokio::test]
    async fn test_discover_tops_up_from_sitemap() {
        let server = wiremock::MockServer::start().await;
        let base = server.uri();

        let sitemap = format!(
            "<urlset><url><loc>{base}/services</loc></url><url><loc>{base}/menu</loc></url></urlset>"
        );
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(sitemap))
            .expect(1)
            .mount(&server)
            .await;

        let home = Url::parse(&format!("{base}/")).unwrap();
        let found = discover(
            &Client::new(),
            &home,
            HOME_HTML,
            &Deadline::after(Duration::from_secs(5)),
            &DiscoveryOptions::default(),
        )
        .await;

        let paths: Vec<_> = found.iter().map(|u| u.path().to_string()).collect();
        assert_eq!(paths, ["/about-us", "/services", "/menu"]);
    }

    #[tokio::test]
    async fn test_discover_truncates_without_sitemap_fetch() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let home = Url::parse(&format!("{}/", server.uri())).unwrap();
        let opts = DiscoveryOptions {
            max_candidates: 1,
            use_sitemap: true,
        };
        let found = discover(
            &Client::new(),
            &home,
            HOME_HTML,
            &Deadline::after(Duration::from_secs(5)),
            &opts,
        )
        .await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path(), "/about-us");
    }

    #[tokio::test]
    async fn test_discover_missing_sitemap_is_not_an_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let home = Url::parse(&format!("{}/", server.uri())).unwrap();
        let found = discover(
            &Client::new(),
            &home,
            HOME_HTML,
            &Deadline::after(Duration::from_secs(5)),
            &DiscoveryOptions::default(),
        )
        .await;

        assert_eq!(found.len(), 2);
    }
}
