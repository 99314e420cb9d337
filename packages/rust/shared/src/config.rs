//! Application configuration for Paperflow.
//!
//! User config lives at `~/.paperflow/paperflow.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file; sections name the env vars that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PaperflowError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "paperflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".paperflow";

// ---------------------------------------------------------------------------
// Config structs (matching paperflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Quality gate thresholds.
    #[serde(default)]
    pub validation: QualityThresholds,

    /// Chat completion provider used for summaries and topics.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Remote hybrid search service.
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[paths]` section. Stage directories live under `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl PathsConfig {
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }
    pub fn extracted_dir(&self) -> PathBuf {
        self.data_dir.join("extracted")
    }
    pub fn validated_dir(&self) -> PathBuf {
        self.data_dir.join("validated")
    }
    pub fn enriched_dir(&self) -> PathBuf {
        self.data_dir.join("enriched")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// arXiv Atom query endpoint.
    #[serde(default = "default_arxiv_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Timeout for feed queries, in seconds.
    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,

    /// Timeout for a single document download, in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Documents larger than this are skipped.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            endpoint: default_arxiv_endpoint(),
            category: default_category(),
            max_results: default_max_results(),
            timeout_secs: default_query_timeout(),
            download_timeout_secs: default_download_timeout(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_arxiv_endpoint() -> String {
    "http://export.arxiv.org/api/query".into()
}
fn default_category() -> String {
    "cs.AI".into()
}
fn default_max_results() -> usize {
    10
}
fn default_query_timeout() -> u64 {
    10
}
fn default_download_timeout() -> u64 {
    60
}
fn default_max_file_size_mb() -> u64 {
    50
}

/// `[extraction]` section.
///
/// Extractors are external commands that read the document on stdin and
/// write text on stdout. Pages are separated by form feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_native_command")]
    pub native_command: Vec<String>,

    /// OCR fallback command. Empty disables OCR.
    #[serde(default)]
    pub ocr_command: Vec<String>,

    /// Native output below this alphabetic ratio is retried with OCR.
    #[serde(default = "default_ocr_threshold")]
    pub ocr_fallback_threshold: f64,

    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            native_command: default_native_command(),
            ocr_command: Vec::new(),
            ocr_fallback_threshold: default_ocr_threshold(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

fn default_native_command() -> Vec<String> {
    vec!["pdftotext".into(), "-layout".into(), "-".into(), "-".into()]
}
fn default_ocr_threshold() -> f64 {
    0.3
}
fn default_extraction_timeout() -> u64 {
    120
}

/// `[validation]` section: thresholds for the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_min_alpha_ratio")]
    pub min_alpha_ratio: f64,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_max_repeat_ratio")]
    pub max_repeat_ratio: f64,
    /// Shortest run of one character that counts as repetition.
    #[serde(default = "default_repeat_run")]
    pub repeat_run_len: usize,
    #[serde(default = "default_min_sentences")]
    pub min_sentences: usize,
    #[serde(default = "default_min_sentence_words")]
    pub min_sentence_words: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            min_alpha_ratio: default_min_alpha_ratio(),
            min_words: default_min_words(),
            max_repeat_ratio: default_max_repeat_ratio(),
            repeat_run_len: default_repeat_run(),
            min_sentences: default_min_sentences(),
            min_sentence_words: default_min_sentence_words(),
        }
    }
}

fn default_min_chars() -> usize {
    500
}
fn default_max_chars() -> usize {
    5_000_000
}
fn default_min_alpha_ratio() -> f64 {
    0.5
}
fn default_min_words() -> usize {
    100
}
fn default_max_repeat_ratio() -> f64 {
    0.05
}
fn default_repeat_run() -> usize {
    5
}
fn default_min_sentences() -> usize {
    3
}
fn default_min_sentence_words() -> usize {
    5
}

/// `[llm]` section (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Paper text is truncated to this many characters before prompting.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_llm_key_env(),
            model: default_llm_model(),
            max_text_length: default_max_text_length(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_llm_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_llm_model() -> String {
    "openai/gpt-4.1-mini".into()
}
fn default_max_text_length() -> usize {
    100_000
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[embedding]` section (OpenAI-compatible embeddings endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Requested vector length; the remote index schema uses the same value.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Text is truncated to this many characters before embedding.
    #[serde(default = "default_max_embed_chars")]
    pub max_chars: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            api_key_env: default_embedding_key_env(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            max_chars: default_max_embed_chars(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimensions() -> usize {
    384
}
fn default_max_embed_chars() -> usize {
    10_000
}
fn default_embedding_timeout() -> u64 {
    30
}

/// `[search]` section. The remote backend is used when both env vars are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint_env")]
    pub endpoint_env: String,

    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_index_name")]
    pub index_name: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint_env: default_search_endpoint_env(),
            api_key_env: default_search_key_env(),
            index_name: default_index_name(),
            api_version: default_api_version(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_endpoint_env() -> String {
    "AZURE_SEARCH_ENDPOINT".into()
}
fn default_search_key_env() -> String {
    "AZURE_SEARCH_API_KEY".into()
}
fn default_index_name() -> String {
    "papers".into()
}
fn default_api_version() -> String {
    "2024-07-01".into()
}
fn default_search_timeout() -> u64 {
    30
}

/// Resolved remote search credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub endpoint: String,
    pub api_key: String,
}

impl SearchConfig {
    /// Read the remote credentials from the environment, if both are present.
    pub fn remote_credentials(&self) -> Option<RemoteCredentials> {
        let endpoint = non_empty_env(&self.endpoint_env)?;
        let api_key = non_empty_env(&self.api_key_env)?;
        Some(RemoteCredentials { endpoint, api_key })
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum records processed at once within a stage.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}

/// `[cache]` section: enrichment response cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database path. Relative paths resolve against `paths.data_dir`.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("enrichment_cache.db")
}

impl AppConfig {
    /// Cache database location, resolved against the data directory.
    pub fn cache_path(&self) -> PathBuf {
        if self.cache.path.is_absolute() {
            self.cache.path.clone()
        } else {
            self.paths.data_dir.join(&self.cache.path)
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.paperflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| PaperflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.paperflow/paperflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperflowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PaperflowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| PaperflowError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PaperflowError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| PaperflowError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_at(&config_file_path()?)
}

/// Read a secret from the env var `var_name`, failing with a config error.
pub fn require_env(var_name: &str, service: &str) -> Result<String> {
    non_empty_env(var_name).ok_or_else(|| {
        PaperflowError::config(format!(
            "{service} API key not found. Set the {var_name} environment variable."
        ))
    })
}

/// Check that the chat provider API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    require_env(&config.llm.api_key_env, "LLM").map(|_| ())
}

fn non_empty_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}
