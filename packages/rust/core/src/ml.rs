//! Model-assisted classification.
//!
//! [`MlClassifier`] is the seam for alternate model backends. The bundled
//! [`HttpMlClassifier`] POSTs the business name, website and page text as
//! JSON to a configured endpoint and reads back scored codes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use bizclass_shared::{
    BizclassError, Evidence, MethodKind, MethodResult, MlConfig, Result, Taxonomy, TaxonomyCode,
    ml_api_key,
};
use bizclass_taxonomy::ReferenceData;

/// User-Agent string for classifier requests.
const USER_AGENT: &str = concat!("bizclass/", env!("CARGO_PKG_VERSION"));

/// Upper bound on a single classifier call; the request budget is usually tighter.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Classifier input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub text: String,
}

/// One scored code returned by a classifier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MlPrediction {
    pub taxonomy: Taxonomy,
    pub code: String,
    pub confidence: f64,
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MlOutput {
    /// Model identifier, reported as evidence.
    #[serde(default = "default_model_name")]
    pub model: String,
    pub predictions: Vec<MlPrediction>,
}

fn default_model_name() -> String {
    "unknown".into()
}

// ---------------------------------------------------------------------------
// MlClassifier
// ---------------------------------------------------------------------------

/// A model that scores taxonomy codes for a business.
#[async_trait]
pub trait MlClassifier: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn predict(&self, input: &MlInput) -> Result<MlOutput>;
}

/// Turn raw predictions into method results.
///
/// Codes absent from the reference data are dropped, confidences are
/// clamped to `[0, 1]`, and a code predicted twice keeps its best score.
pub fn to_method_results(reference: &ReferenceData, output: &MlOutput) -> Vec<MethodResult> {
    let mut best: HashMap<&TaxonomyCode, f64> = HashMap::new();
    let mut order: Vec<&TaxonomyCode> = Vec::new();

    for prediction in &output.predictions {
        let Some(code) = reference.lookup(prediction.taxonomy, prediction.code.trim()) else {
            debug!(
                taxonomy = %prediction.taxonomy,
                code = %prediction.code,
                "dropping prediction for unknown code"
            );
            continue;
        };
        let confidence = if prediction.confidence.is_finite() {
            prediction.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        match best.get_mut(code) {
            Some(existing) => *existing = existing.max(confidence),
            None => {
                best.insert(code, confidence);
                order.push(code);
            }
        }
    }

    order
        .into_iter()
        .map(|code| {
            MethodResult::direct(
                MethodKind::Ml,
                code.clone(),
                best[code],
                Evidence::Model {
                    model: output.model.clone(),
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HttpMlClassifier
// ---------------------------------------------------------------------------

/// JSON-over-HTTP classifier backend.
#[derive(Debug, Clone)]
pub struct HttpMlClassifier {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    max_text_chars: usize,
}

impl HttpMlClassifier {
    pub fn new(endpoint: Url, api_key: Option<String>, max_text_chars: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(MAX_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| BizclassError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            max_text_chars,
        })
    }

    /// `Ok(None)` when no endpoint is configured.
    pub fn from_config(config: &MlConfig) -> Result<Option<Self>> {
        let Some(endpoint) = &config.endpoint else {
            return Ok(None);
        };
        let endpoint = Url::parse(endpoint)
            .map_err(|e| BizclassError::config(format!("invalid ml endpoint {endpoint:?}: {e}")))?;
        Self::new(endpoint, ml_api_key(config), config.max_text_chars).map(Some)
    }
}

#[async_trait]
impl MlClassifier for HttpMlClassifier {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn predict(&self, input: &MlInput) -> Result<MlOutput> {
        let body = MlInput {
            text: truncate_content(&input.text, self.max_text_chars),
            ..input.clone()
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BizclassError::Ml(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BizclassError::Ml(format!("{}: HTTP {status}", self.endpoint)));
        }

        response
            .json::<MlOutput>()
            .await
            .map_err(|e| BizclassError::Ml(format!("{}: invalid response: {e}", self.endpoint)))
    }
}

/// Truncate content to at most `max_chars` characters.
fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => content[..idx].to_string(),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reference() -> ReferenceData {
        ReferenceData::builder()
            .code(Taxonomy::Mcc, "5812", "Eating places, restaurants")
            .code(Taxonomy::Naics, "722511", "Full-service restaurants")
            .build()
            .unwrap()
    }

    fn input() -> MlInput {
        MlInput {
            business_name: Some("Joe's Pizza".into()),
            website: None,
            text: "Brick oven pizza".into(),
        }
    }

    #[test]
    fn truncate_short_content() {
        assert_eq!(truncate_content("hello", 10), "hello");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_content("café crème", 4), "café");
    }

    #[test]
    fn unknown_codes_dropped_and_confidence_clamped() {
        let output = MlOutput {
            model: "test-model".into(),
            predictions: vec![
                MlPrediction { taxonomy: Taxonomy::Mcc, code: "5812".into(), confidence: 1.7 },
                MlPrediction { taxonomy: Taxonomy::Mcc, code: "9999".into(), confidence: 0.9 },
                MlPrediction { taxonomy: Taxonomy::Naics, code: "722511".into(), confidence: -0.2 },
                MlPrediction { taxonomy: Taxonomy::Mcc, code: "5812".into(), confidence: 0.4 },
            ],
        };
        let results = to_method_results(&reference(), &output);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].code.key(), (Taxonomy::Mcc, "5812"));
        assert_eq!(results[0].confidence, 1.0);
        assert_eq!(results[1].confidence, 0.0);
        assert_eq!(results[0].code.description, "Eating places, restaurants");
        assert!(results.iter().all(|r| r.method == MethodKind::Ml));
    }

    #[tokio::test]
    async fn http_classifier_posts_json_and_parses_predictions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "business_name": "Joe's Pizza",
                "text": "Brick oven pizza"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "naics-bert-v2",
                "predictions": [{ "taxonomy": "MCC", "code": "5812", "confidence": 0.8 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/classify", server.uri())).unwrap();
        let classifier = HttpMlClassifier::new(endpoint, Some("secret".into()), 8_000).unwrap();
        let output = classifier.predict(&input()).await.unwrap();

        assert_eq!(output.model, "naics-bert-v2");
        assert_eq!(output.predictions.len(), 1);
        assert_eq!(output.predictions[0].taxonomy, Taxonomy::Mcc);
    }

    #[tokio::test]
    async fn http_classifier_reports_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let endpoint = Url::parse(&server.uri()).unwrap();
        let classifier = HttpMlClassifier::new(endpoint, None, 8_000).unwrap();
        let err = classifier.predict(&input()).await.unwrap_err();
        assert!(matches!(err, BizclassError::Ml(msg) if msg.contains("503")));
    }

    #[test]
    fn from_config_without_endpoint_is_none() {
        assert!(HttpMlClassifier::from_config(&MlConfig::default()).unwrap().is_none());
    }
}
