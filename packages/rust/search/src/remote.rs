//! Azure AI Search REST client.
//!
//! Used both as the hybrid query backend and as the write path after
//! enrichment. Document keys are sanitized paper ids; the original id is
//! kept in `source_id` so results report the store's own id.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use paperflow_shared::{
    EnrichedPaper, PaperSearchResult, PaperSummary, PaperflowError, RemoteCredentials, Result,
    SearchConfig,
};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Text body is truncated to this many characters when indexed.
pub const MAX_INDEXED_TEXT: usize = 32_000;

const SELECT_FIELDS: &str = "paper_id,source_id,title,authors,abstract,topics,\
research_question,methodology,key_findings,contributions,limitations";

static KEY_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-=]").expect("valid regex"));

/// Map a paper id onto the document key alphabet.
pub fn sanitize_key(paper_id: &str) -> String {
    KEY_CHARS.replace_all(paper_id, "-").into_owned()
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// One document in the remote index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Sanitized key.
    pub paper_id: String,
    pub source_id: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub clean_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub research_question: String,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub contributions: String,
    #[serde(default)]
    pub limitations: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl SearchDocument {
    pub fn from_paper(paper: &EnrichedPaper) -> Self {
        let clean_text = match paper.clean_text.char_indices().nth(MAX_INDEXED_TEXT) {
            Some((idx, _)) => paper.clean_text[..idx].to_string(),
            None => paper.clean_text.clone(),
        };
        let summary = &paper.summary;
        Self {
            paper_id: sanitize_key(&paper.paper_id),
            source_id: paper.paper_id.clone(),
            title: paper.title.clone(),
            abstract_text: paper.abstract_text.clone(),
            clean_text,
            authors: paper.authors.clone(),
            topics: paper.topics.clone(),
            research_question: summary.research_question.clone(),
            methodology: summary.methodology.clone(),
            contributions: summary.contributions.clone(),
            limitations: summary.limitations.clone(),
            key_findings: summary.key_findings.clone(),
            enriched_at: Some(paper.enriched_at.to_rfc3339()),
            embedding: paper.embedding.clone().filter(|e| !e.is_empty()),
        }
    }
}

/// Outcome of a batch upsert. Partial failure is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub submitted: usize,
    pub succeeded: usize,
    /// `(key, message)` for every rejected document.
    pub failures: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct IndexingResponse {
    #[serde(default)]
    value: Vec<IndexingResult>,
}

#[derive(Debug, Deserialize)]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "@search.score", default)]
    score: f32,
    #[serde(flatten)]
    fields: serde_json::Map<String, Value>,
}

fn field_str(fields: &serde_json::Map<String, Value>, name: &str) -> String {
    fields
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn field_list(fields: &serde_json::Map<String, Value>, name: &str) -> Vec<String> {
    fields
        .get(name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl Hit {
    fn into_result(self) -> PaperSearchResult {
        let f = &self.fields;
        let source_id = field_str(f, "source_id");
        let paper_id = if source_id.is_empty() {
            field_str(f, "paper_id")
        } else {
            source_id
        };

        let research_question = field_str(f, "research_question");
        let summary = (!research_question.is_empty()).then(|| PaperSummary {
            research_question,
            methodology: field_str(f, "methodology"),
            key_findings: field_list(f, "key_findings"),
            contributions: field_str(f, "contributions"),
            limitations: field_str(f, "limitations"),
        });

        PaperSearchResult {
            paper_id,
            title: field_str(f, "title"),
            authors: field_list(f, "authors"),
            abstract_text: f.get("abstract").and_then(Value::as_str).map(str::to_string),
            summary,
            topics: field_list(f, "topics"),
            score: self.score,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for one index on one search service.
#[derive(Debug, Clone)]
pub struct RemoteSearch {
    client: Client,
    endpoint: Url,
    api_key: String,
    index_name: String,
    api_version: String,
    dimension: usize,
}

impl RemoteSearch {
    /// `dimension` is the length of the embedding vector field, which must
    /// match the embedder producing stored and query vectors.
    pub fn new(
        config: &SearchConfig,
        dimension: usize,
        credentials: RemoteCredentials,
    ) -> Result<Self> {
        let endpoint = Url::parse(&credentials.endpoint).map_err(|e| {
            PaperflowError::config(format!("invalid search endpoint {}: {e}", credentials.endpoint))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: credentials.api_key,
            index_name: config.index_name.clone(),
            api_version: config.api_version.clone(),
            dimension,
        })
    }

    /// Build from config when both credential env vars are set.
    pub fn from_env(config: &SearchConfig, dimension: usize) -> Result<Option<Self>> {
        config
            .remote_credentials()
            .map(|credentials| Self::new(config, dimension, credentials))
            .transpose()
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn url(&self, path: &str) -> Result<Url> {
        let mut url = self
            .endpoint
            .join(&format!("indexes/{}{path}", self.index_name))
            .map_err(|e| PaperflowError::config(format!("invalid search URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("api-key", &self.api_key)
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| PaperflowError::Search(format!("{what} request failed: {e}")))
    }

    async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(200).collect();
        Err(PaperflowError::Search(format!(
            "{what} returned HTTP {status}: {preview}"
        )))
    }

    /// Create the index with its schema if it does not exist yet. An
    /// existing index whose vector field has another dimension is a
    /// configuration error.
    #[instrument(skip_all, fields(index = %self.index_name, dims = self.dimension))]
    pub async fn ensure_index(&self) -> Result<()> {
        let response = self
            .send(self.request(reqwest::Method::GET, self.url("")?), "get index")
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            let response = Self::expect_success(response, "get index").await?;
            let schema: Value = response
                .json()
                .await
                .map_err(|e| PaperflowError::Search(format!("invalid index definition: {e}")))?;
            return match vector_dimensions(&schema) {
                Some(dims) if dims != self.dimension => Err(PaperflowError::config(format!(
                    "index {} stores {dims}-dimensional vectors, but the embedder produces {}",
                    self.index_name, self.dimension
                ))),
                _ => {
                    debug!("search index exists");
                    Ok(())
                }
            };
        }

        let response = self
            .send(
                self.request(reqwest::Method::PUT, self.url("")?)
                    .json(&index_schema(&self.index_name, self.dimension)),
                "create index",
            )
            .await?;
        Self::expect_success(response, "create index").await?;
        info!("created search index");
        Ok(())
    }

    /// Merge-or-upload `documents`. Per-document rejections are reported in
    /// the returned [`UpsertReport`].
    #[instrument(skip_all, fields(index = %self.index_name, documents = documents.len()))]
    pub async fn upsert_documents(&self, documents: &[SearchDocument]) -> Result<UpsertReport> {
        if documents.is_empty() {
            return Ok(UpsertReport::default());
        }

        let actions: Vec<Value> = documents
            .iter()
            .map(|doc| {
                let mut value = serde_json::to_value(doc).unwrap_or_else(|_| json!({}));
                if let Value::Object(map) = &mut value {
                    map.insert("@search.action".into(), json!("mergeOrUpload"));
                }
                value
            })
            .collect();

        let response = self
            .send(
                self.request(reqwest::Method::POST, self.url("/docs/index")?)
                    .json(&json!({ "value": actions })),
                "index documents",
            )
            .await?;

        // 207 carries per-document results; `is_success` covers it.
        let response = Self::expect_success(response, "index documents").await?;
        let parsed: IndexingResponse = response
            .json()
            .await
            .map_err(|e| PaperflowError::Search(format!("invalid indexing response: {e}")))?;

        let mut report = UpsertReport {
            submitted: documents.len(),
            ..UpsertReport::default()
        };
        for result in parsed.value {
            if result.status {
                report.succeeded += 1;
            } else {
                let message = result.error_message.unwrap_or_else(|| "rejected".into());
                warn!(key = %result.key, %message, "document rejected by index");
                report.failures.push((result.key, message));
            }
        }

        info!(
            succeeded = report.succeeded,
            submitted = report.submitted,
            "indexed documents"
        );
        Ok(report)
    }

    /// Full-text plus vector query in one call.
    #[instrument(skip_all, fields(index = %self.index_name, top_k = top_k))]
    pub async fn hybrid_search(
        &self,
        query: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<PaperSearchResult>> {
        if embedding.len() != self.dimension {
            return Err(PaperflowError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        let body = json!({
            "search": query,
            "vectorQueries": [{
                "kind": "vector",
                "vector": embedding,
                "k": top_k,
                "fields": "embedding",
            }],
            "select": SELECT_FIELDS,
            "top": top_k,
        });

        let started = Instant::now();
        let response = self
            .send(
                self.request(reqwest::Method::POST, self.url("/docs/search")?)
                    .json(&body),
                "search",
            )
            .await?;
        let response = Self::expect_success(response, "search").await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| PaperflowError::Search(format!("invalid search response: {e}")))?;

        debug!(
            hits = parsed.value.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "hybrid search"
        );
        Ok(parsed.value.into_iter().map(Hit::into_result).collect())
    }

    /// Fetch one document by paper id. `None` when absent.
    pub async fn get_document(&self, paper_id: &str) -> Result<Option<SearchDocument>> {
        let path = format!("/docs/{}", sanitize_key(paper_id));
        let response = self
            .send(self.request(reqwest::Method::GET, self.url(&path)?), "get document")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, "get document").await?;
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| PaperflowError::Search(format!("invalid document: {e}")))
    }

    pub async fn delete_document(&self, paper_id: &str) -> Result<()> {
        let body = json!({
            "value": [{ "@search.action": "delete", "paper_id": sanitize_key(paper_id) }]
        });
        let response = self
            .send(
                self.request(reqwest::Method::POST, self.url("/docs/index")?)
                    .json(&body),
                "delete document",
            )
            .await?;
        Self::expect_success(response, "delete document").await?;
        info!(%paper_id, "deleted document from index");
        Ok(())
    }

    pub async fn document_count(&self) -> Result<u64> {
        let response = self
            .send(
                self.request(reqwest::Method::GET, self.url("/docs/$count")?),
                "count documents",
            )
            .await?;
        let response = Self::expect_success(response, "count documents").await?;
        let text = response
            .text()
            .await
            .map_err(|e| PaperflowError::Search(format!("invalid count response: {e}")))?;
        // The service may prefix a UTF-8 BOM.
        text.trim_start_matches('\u{feff}')
            .trim()
            .parse()
            .map_err(|e| PaperflowError::Search(format!("invalid document count {text:?}: {e}")))
    }
}

/// Dimension declared on the `embedding` field of an index definition.
fn vector_dimensions(schema: &Value) -> Option<usize> {
    schema["fields"]
        .as_array()?
        .iter()
        .find(|field| field["name"] == "embedding")?["dimensions"]
        .as_u64()
        .and_then(|d| usize::try_from(d).ok())
}

fn index_schema(name: &str, dimension: usize) -> Value {
    let searchable = |field: &str| {
        json!({"name": field, "type": "Edm.String", "searchable": true, "analyzer": "en.lucene"})
    };
    let collection = |field: &str| {
        json!({"name": field, "type": "Collection(Edm.String)", "filterable": true, "facetable": true})
    };

    json!({
        "name": name,
        "fields": [
            {"name": "paper_id", "type": "Edm.String", "key": true, "filterable": true},
            {"name": "source_id", "type": "Edm.String", "filterable": true},
            searchable("title"),
            searchable("abstract"),
            searchable("clean_text"),
            collection("authors"),
            collection("topics"),
            searchable("research_question"),
            searchable("methodology"),
            searchable("contributions"),
            searchable("limitations"),
            {"name": "key_findings", "type": "Collection(Edm.String)"},
            {"name": "enriched_at", "type": "Edm.DateTimeOffset", "sortable": true},
            {
                "name": "embedding",
                "type": "Collection(Edm.Single)",
                "searchable": true,
                "dimensions": dimension,
                "vectorSearchProfile": "default-profile"
            }
        ],
        "vectorSearch": {
            "algorithms": [{"name": "default-algorithm", "kind": "hnsw"}],
            "profiles": [{"name": "default-profile", "algorithm": "default-algorithm"}]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::paper;

    fn client(uri: &str) -> RemoteSearch {
        RemoteSearch::new(
            &SearchConfig::default(),
            2,
            RemoteCredentials {
                endpoint: format!("{uri}/"),
                api_key: "search-key".into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn keys_are_sanitized() {
        assert_eq!(sanitize_key("2401.12345v2"), "2401-12345v2");
        assert_eq!(sanitize_key("hep-th/9901001"), "hep-th-9901001");
        assert_eq!(sanitize_key("ok_key=1"), "ok_key=1");
    }

    #[test]
    fn document_keeps_source_id_and_truncates_text() {
        let mut p = paper("2401.00001", Some(vec![0.1, 0.2]));
        p.clean_text = "é".repeat(MAX_INDEXED_TEXT + 10);
        let doc = SearchDocument::from_paper(&p);
        assert_eq!(doc.paper_id, "2401-00001");
        assert_eq!(doc.source_id, "2401.00001");
        assert_eq!(doc.clean_text.chars().count(), MAX_INDEXED_TEXT);
        assert_eq!(doc.embedding, Some(vec![0.1, 0.2]));
    }

    #[tokio::test]
    async fn creates_missing_index() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/indexes/papers"))
            .and(wiremock::matchers::header("api-key", "search-key"))
            .and(wiremock::matchers::query_param("api-version", "2024-07-01"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .and(wiremock::matchers::path("/indexes/papers"))
            .and(wiremock::matchers::body_partial_json(json!({
                "name": "papers",
                "fields": [{"name": "paper_id", "key": true}]
            })))
            .respond_with(wiremock::ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri()).ensure_index().await.unwrap();
    }

    #[tokio::test]
    async fn existing_index_is_left_alone() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "name": "papers",
                "fields": [{"name": "embedding", "dimensions": 2}]
            })))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .respond_with(wiremock::ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        client(&server.uri()).ensure_index().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_reports_partial_failure() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/indexes/papers/docs/index"))
            .respond_with(wiremock::ResponseTemplate::new(207).set_body_json(json!({
                "value": [
                    {"key": "a", "status": true, "statusCode": 200},
                    {"key": "b", "status": false, "statusCode": 400, "errorMessage": "bad vector"}
                ]
            })))
            .mount(&server)
            .await;

        let docs = vec![
            SearchDocument::from_paper(&paper("a", None)),
            SearchDocument::from_paper(&paper("b", None)),
        ];
        let report = client(&server.uri()).upsert_documents(&docs).await.unwrap();
        assert_eq!(report.submitted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures, vec![("b".to_string(), "bad vector".to_string())]);
    }

    #[tokio::test]
    async fn hybrid_search_passes_results_through() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/indexes/papers/docs/search"))
            .and(wiremock::matchers::body_partial_json(json!({
                "search": "graph neural networks",
                "top": 2,
                "vectorQueries": [{"kind": "vector", "k": 2, "fields": "embedding"}]
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {
                        "@search.score": 0.03,
                        "paper_id": "2401-00001",
                        "source_id": "2401.00001",
                        "title": "GNNs",
                        "authors": ["A"],
                        "topics": ["graphs"],
                        "research_question": "Do GNNs scale?",
                        "key_findings": ["yes"]
                    },
                    {"@search.score": 0.01, "paper_id": "legacy", "title": "Old"}
                ]
            })))
            .mount(&server)
            .await;

        let results = client(&server.uri())
            .hybrid_search("graph neural networks", &[0.1, 0.2], 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].paper_id, "2401.00001");
        assert_eq!(results[0].score, 0.03);
        let summary = results[0].summary.as_ref().unwrap();
        assert_eq!(summary.key_findings, vec!["yes"]);
        assert_eq!(results[1].paper_id, "legacy");
        assert!(results[1].summary.is_none());
    }

    #[tokio::test]
    async fn get_count_and_delete() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/indexes/papers/docs/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/indexes/papers/docs/$count"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("\u{feff}42"))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/indexes/papers/docs/index"))
            .and(wiremock::matchers::body_partial_json(json!({
                "value": [{"@search.action": "delete", "paper_id": "2401-1"}]
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        assert!(client.get_document("missing").await.unwrap().is_none());
        assert_eq!(client.document_count().await.unwrap(), 42);
        client.delete_document("2401.1").await.unwrap();
    }

    #[tokio::test]
    async fn server_errors_are_search_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .hybrid_search("q", &[0.0, 1.0], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PaperflowError::Search(_)));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn schema_uses_configured_dimension() {
        let schema = index_schema("papers", 768);
        assert_eq!(vector_dimensions(&schema), Some(768));
        assert_eq!(vector_dimensions(&json!({"fields": []})), None);
    }

    #[tokio::test]
    async fn existing_index_with_other_dimension_is_rejected() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "name": "papers",
                "fields": [
                    {"name": "paper_id", "key": true},
                    {"name": "embedding", "dimensions": 384}
                ]
            })))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .respond_with(wiremock::ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server.uri()).ensure_index().await.unwrap_err();
        assert!(matches!(err, PaperflowError::Config { .. }));
        assert!(err.to_string().contains("384"));
    }

    #[tokio::test]
    async fn query_vector_of_wrong_length_is_rejected_locally() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .hybrid_search("q", &[0.1, 0.2, 0.3], 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaperflowError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn rejected_batch_is_a_search_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/indexes/papers/docs/index"))
            .respond_with(wiremock::ResponseTemplate::new(400).set_body_string("bad batch"))
            .mount(&server)
            .await;

        let docs = vec![SearchDocument::from_paper(&paper("a", None))];
        let err = client(&server.uri()).upsert_documents(&docs).await.unwrap_err();
        assert!(matches!(err, PaperflowError::Search(_)));
        assert!(err.to_string().contains("bad batch"));
    }
}
