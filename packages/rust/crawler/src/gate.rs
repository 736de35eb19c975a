//! Content sufficiency gate.

use bizclass_shared::{AcquiredContent, SufficiencyConfig, SufficiencyVerdict};

/// Decides whether acquired content is enough to classify on with confidence.
///
/// The gate never aborts anything. The crawler consults it to stop issuing
/// fetches early; the engine consults it to flag keyword input as weak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SufficiencyGate {
    pub min_pages: usize,
    pub min_text_chars: usize,
}

impl SufficiencyGate {
    pub fn new(min_pages: usize, min_text_chars: usize) -> Self {
        Self {
            min_pages,
            min_text_chars,
        }
    }

    /// Sufficient when successful pages >= `min_pages` and the aggregate
    /// text is longer than `min_text_chars`.
    pub fn evaluate(&self, content: &AcquiredContent) -> SufficiencyVerdict {
        let page_count = content.successful_count();
        let text_chars = content.text_chars();
        let enough_pages = page_count >= self.min_pages;
        let enough_text = text_chars > self.min_text_chars;

        let reason = match (enough_pages, enough_text) {
            (true, true) => "sufficient".to_string(),
            (false, true) => format!("{page_count} of {} required pages", self.min_pages),
            (true, false) => format!("{text_chars} chars, need more than {}", self.min_text_chars),
            (false, false) => format!(
                "{page_count} of {} required pages, {text_chars} chars (need more than {})",
                self.min_pages, self.min_text_chars
            ),
        };

        SufficiencyVerdict {
            sufficient: enough_pages && enough_text,
            page_count,
            min_pages: self.min_pages,
            text_chars,
            min_text_chars: self.min_text_chars,
            reason,
        }
    }

    pub fn is_satisfied(&self, content: &AcquiredContent) -> bool {
        self.evaluate(content).sufficient
    }
}

impl From<&SufficiencyConfig> for SufficiencyGate {
    fn from(config: &SufficiencyConfig) -> Self {
        Self::new(config.min_pages, config.min_text_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizclass_shared::PageContent;
    use std::time::Duration;

    fn page(text: &str) -> PageContent {
        PageContent {
            url: "https://joespizza.example/".into(),
            text: text.into(),
            latency: Duration::from_millis(10),
            strategy: "plain_http".into(),
            error: None,
        }
    }

    #[test]
    fn single_page_is_insufficient_with_min_two() {
        let mut content = AcquiredContent::default();
        content.push(page(&"pizza ".repeat(100)));

        let verdict = SufficiencyGate::new(2, 200).evaluate(&content);
        assert!(!verdict.sufficient);
        assert_eq!(verdict.page_count, 1);
        assert_eq!(verdict.reason, "1 of 2 required pages");
    }

    #[test]
    fn text_threshold_is_strict() {
        let mut content = AcquiredContent::default();
        content.push(page(&"a".repeat(100)));
        content.push(page(&"b".repeat(100)));

        let gate = SufficiencyGate::new(2, 200);
        assert!(!gate.is_satisfied(&content));

        content.push(page("c"));
        assert!(gate.is_satisfied(&content));
    }

    #[test]
    fn failed_pages_do_not_count() {
        let mut content = AcquiredContent::default();
        content.push(page(&"pizza ".repeat(100)));
        content.push(PageContent {
            error: Some("HTTP 404".into()),
            ..page("")
        });

        let verdict = SufficiencyGate::new(2, 10).evaluate(&content);
        assert!(!verdict.sufficient);
        assert_eq!(verdict.page_count, 1);
    }

    #[test]
    fn from_config_defaults() {
        let gate = SufficiencyGate::from(&SufficiencyConfig::default());
        assert_eq!(gate, SufficiencyGate::new(2, 200));
    }
}
