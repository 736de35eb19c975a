//! Link extraction, sitemap parsing and candidate ranking.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches `<loc>...</loc>` entries in a sitemap or sitemap index.
static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<loc>\s*([^<\s]+)\s*</loc>").expect("loc regex")
});

/// File extensions that never carry descriptive page text.
static ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(pdf|jpe?g|png|gif|svg|webp|ico|css|js|json|xml|zip|gz|mp3|mp4|mov|avi|woff2?|ttf)$")
        .expect("asset regex")
});

/// Path segments ranked by how much they tend to say about the business.
const INFORMATIVE_SEGMENTS: &[(&str, u32)] = &[
    ("about", 5),
    ("about-us", 5),
    ("who-we-are", 5),
    ("company", 4),
    ("services", 5),
    ("our-services", 5),
    ("what-we-do", 5),
    ("solutions", 4),
    ("products", 4),
    ("menu", 4),
    ("shop", 3),
    ("store", 3),
    ("practice-areas", 4),
    ("locations", 1),
    ("contact", 1),
];

/// Path segments whose pages are boilerplate or session-bound.
const SKIPPED_SEGMENTS: &[&str] = &[
    "login", "logout", "signin", "sign-in", "register", "cart", "checkout", "account",
    "privacy", "privacy-policy", "terms", "cookie-policy", "wp-admin", "feed",
];

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// All `<a href>` targets in `html`, resolved against `base`, fragments stripped.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let Ok(link_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }
        if let Ok(mut resolved) = base.join(href) {
            resolved.set_fragment(None);
            links.push(resolved);
        }
    }
    links
}

/// `<loc>` URLs listed in a sitemap document. Invalid entries are skipped.
pub fn parse_sitemap(xml: &str) -> Vec<Url> {
    LOC_RE
        .captures_iter(xml)
        .filter_map(|caps| Url::parse(caps[1].trim()).ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Normalize a URL for deduplication (no fragment, no trailing slash).
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    if s.ends_with('/') && normalized.path() != "/" {
        s.pop();
    }
    s
}

/// Score a candidate path; `None` means the URL should not be crawled.
pub fn score_path(url: &Url) -> Option<u32> {
    let path = url.path().to_ascii_lowercase();
    if ASSET_RE.is_match(&path) {
        return None;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| SKIPPED_SEGMENTS.contains(s)) {
        return None;
    }

    let score = segments
        .iter()
        .filter_map(|seg| {
            let seg = seg.trim_end_matches(".html").trim_end_matches(".htm");
            INFORMATIVE_SEGMENTS
                .iter()
                .find(|(name, _)| *name == seg)
                .map(|(_, s)| *s)
        })
        .max()
        .unwrap_or(0);

    Some(score)
}

/// Filter `links` to same-host, crawlable pages other than `home`, dedupe
/// them, and order by score (desc), path depth (asc), then URL.
pub fn rank_candidates(home: &Url, links: impl IntoIterator<Item = Url>) -> Vec<Url> {
    let host = home.host_str().unwrap_or_default().trim_start_matches("www.");
    let mut seen: HashSet<String> = HashSet::from([normalize_url(home)]);
    let mut scored: Vec<(u32, usize, String, Url)> = Vec::new();

    for link in links {
        if link.scheme() != "http" && link.scheme() != "https" {
            continue;
        }
        let link_host = link.host_str().unwrap_or_default().trim_start_matches("www.");
        if link_host != host {
            continue;
        }
        let Some(score) = score_path(&link) else {
            continue;
        };
        let key = normalize_url(&link);
        if !seen.insert(key.clone()) {
            continue;
        }
        let depth = link.path_segments().map(|s| s.filter(|p| !p.is_empty()).count()).unwrap_or(0);
        scored.push((score, depth, key, link));
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then_with(|| a.2.cmp(&b.2)));
    scored.into_iter().map(|(_, _, _, url)| url).collect()
}
