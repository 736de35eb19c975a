//! Visible-text extraction from fetched HTML.
//!
//! Picks the main content area using readability heuristics (`<main>`,
//! `<article>`, `[role=main]`, then `<body>`), drops page chrome, and
//! prefixes the `<title>` and descriptive `<meta>` tags, which on small
//! business sites often say more than the body does.

use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector"));

static META_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="description"], meta[name="keywords"], meta[property="og:description"]"#)
        .expect("meta selector")
});

static CONTENT_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["main", "article", r#"[role="main"]"#, "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("content selector"))
        .collect()
});

/// Elements whose text never counts as page content.
const CHROME_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "svg", "template", "iframe",
];

/// Text pulled out of one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub title: Option<String>,
    /// Meta description/keywords, whitespace-collapsed.
    pub meta: Vec<String>,
    /// Visible body text, whitespace-collapsed.
    pub body: String,
}

impl ExtractedText {
    /// Title, meta and body joined into a single classification input.
    pub fn combined(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(title) = &self.title {
            parts.push(title);
        }
        parts.extend(self.meta.iter().map(String::as_str));
        if !self.body.is_empty() {
            parts.push(&self.body);
        }
        parts.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.meta.is_empty() && self.body.is_empty()
    }
}

/// Extract title, meta text and visible body text from an HTML document.
pub fn extract(html: &str) -> ExtractedText {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE_SEL)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let meta = doc
        .select(&META_SEL)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|m| !m.is_empty())
        .collect();

    let body = CONTENT_SELS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .map(visible_text)
        .unwrap_or_default();

    ExtractedText { title, meta, body }
}

/// Convenience wrapper returning [`ExtractedText::combined`].
pub fn extract_text(html: &str) -> String {
    extract(html).combined()
}

/// Text nodes under `root` that are not inside page chrome.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .any(|a| matches!(a.value(), Node::Element(e) if CHROME_TAGS.contains(&e.name())));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s, " ").trim().to_string()
}
