//! OpenAI-compatible embeddings client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use paperflow_shared::{EmbeddingConfig, PaperflowError, Result, require_env};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedder;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// [`Embedder`] backed by a `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = require_env(&config.api_key_env, "Embedding")?;
        Self::new(config, api_key)
    }

    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimension: config.dimensions,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimension,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaperflowError::Enrichment(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperflowError::Enrichment(format!(
                "embedding endpoint returned HTTP {status}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| PaperflowError::Enrichment(format!("invalid embedding response: {e}")))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| PaperflowError::Enrichment("embedding response has no data".into()))?;

        debug!(
            model = %self.model,
            dims = vector.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "embedding finished"
        );
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(base_url: &str) -> HttpEmbedder {
        let config = EmbeddingConfig {
            base_url: format!("{base_url}/v1/"),
            model: "embed-small".into(),
            dimensions: 3,
            ..EmbeddingConfig::default()
        };
        HttpEmbedder::new(&config, "sk-embed".into()).unwrap()
    }

    #[tokio::test]
    async fn embeds_text() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/embeddings"))
            .and(wiremock::matchers::body_json(serde_json::json!({
                "model": "embed-small",
                "input": "hello",
                "dimensions": 3
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let embedder = embedder(&server.uri());
        assert_eq!(embedder.dimension(), 3);
        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn empty_data_is_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let err = embedder(&server.uri()).embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("no data"));
    }

    #[tokio::test]
    async fn http_failure_is_enrichment_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = embedder(&server.uri()).embed("hello").await.unwrap_err();
        assert!(matches!(err, PaperflowError::Enrichment(_)));
    }
}
