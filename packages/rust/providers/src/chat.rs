//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use paperflow_shared::{LlmConfig, PaperSummary, PaperflowError, Result, require_env};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::Summarizer;
use crate::parse::{parse_summary, parse_topics};

const SUMMARY_PROMPT: &str = r#"You are analyzing an academic research paper. Return a JSON object with exactly these fields:
{
  "research_question": "What problem does this paper address?",
  "methodology": "How did they approach it?",
  "key_findings": ["Finding 1", "Finding 2", "Finding 3"],
  "contributions": "What is novel about this work?",
  "limitations": "What are the weaknesses or limitations?"
}
Use the paper's own terminology. Return only valid JSON."#;

const TOPIC_PROMPT: &str = r#"Extract 3-8 topic keywords or phrases from this academic paper.
Return a JSON array of strings, e.g. ["machine learning", "NLP", "transformers"].
Return only a valid JSON array."#;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// ChatSummarizer
// ---------------------------------------------------------------------------

/// [`Summarizer`] backed by a chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatSummarizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_text_length: usize,
}

impl ChatSummarizer {
    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = require_env(&config.api_key_env, "LLM")?;
        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_text_length: config.max_text_length,
        })
    }

    /// Send one system + user exchange and return the reply text.
    async fn complete(&self, system: &str, user: &str, json_object: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: json_object.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaperflowError::Enrichment(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(PaperflowError::Enrichment(format!(
                "chat endpoint returned HTTP {status}: {preview}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PaperflowError::Enrichment(format!("invalid chat response: {e}")))?;

        let (tokens_in, tokens_out) = parsed
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        debug!(
            model = %self.model,
            tokens_in,
            tokens_out,
            latency_ms = started.elapsed().as_millis() as u64,
            "chat completion finished"
        );

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PaperflowError::Enrichment("chat response has no content".into()))
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        truncate_chars(text, self.max_text_length)
    }
}

/// Prefix of `text` holding at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    fn model_id(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
    async fn summarize(&self, text: &str) -> Result<PaperSummary> {
        let user = format!("Summarize this paper:\n\n{}", self.truncate(text));
        let reply = self.complete(SUMMARY_PROMPT, &user, true).await?;
        parse_summary(&reply)
    }

    #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
    async fn extract_topics(&self, text: &str) -> Result<Vec<String>> {
        let user = format!("Extract topics from:\n\n{}", self.truncate(text));
        let reply = self.complete(TOPIC_PROMPT, &user, false).await?;
        Ok(parse_topics(&reply))
    }
}
