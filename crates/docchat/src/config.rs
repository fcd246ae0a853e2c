//! TOML configuration parsing and validation.
//!
//! DocChat is configured via a TOML file (default: `config/docchat.toml`).
//! Secrets are never stored in the file itself: API keys and the token
//! signing secret are read from the environment variables named here.
//!
//! ```toml
//! [db]
//! path = "./data/docchat.sqlite"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-oss-20b"
//!
//! [server]
//! bind = "127.0.0.1:8001"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docchat_core::chunk::{ChunkParams, DEFAULT_OVERLAP, DEFAULT_WINDOW};
use docchat_core::chat::{DEFAULT_HISTORY_WINDOW, DEFAULT_TOP_K};

const DEFAULT_OPENAI_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    /// Maximum characters of chunk text stored as index metadata.
    #[serde(default = "default_metadata_text_cap")]
    pub metadata_text_cap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: DEFAULT_WINDOW,
            overlap_chars: DEFAULT_OVERLAP,
            metadata_text_cap: default_metadata_text_cap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkParams> {
        Ok(ChunkParams::new(self.window_chars, self.overlap_chars)?)
    }
}

fn default_window_chars() -> usize {
    DEFAULT_WINDOW
}
fn default_overlap_chars() -> usize {
    DEFAULT_OVERLAP
}
fn default_metadata_text_cap() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL; defaults depend on the provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn base_url(&self) -> &str {
        match (self.url.as_deref(), self.provider.as_str()) {
            (Some(url), _) => url,
            (None, "ollama") => "http://localhost:11434",
            (None, _) => DEFAULT_OPENAI_URL,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_openai_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Retries for the initial request only; nothing is retried mid-stream.
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    /// Connect and idle-read timeout. A stream that keeps producing tokens
    /// is never cut off.
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_generation_model(),
            url: default_openai_url(),
            api_key_env: default_api_key_env(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `sqlite` (local, default) or `pinecone`.
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    /// Pinecone index host, e.g. `https://docs-abc123.svc.us-east-1.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_pinecone_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            host: None,
            api_key_env: default_pinecone_key_env(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Environment variable holding the token signing secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// Inline secret; only meant for tests and local development.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_expiration_minutes")]
    pub expiration_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            secret: None,
            expiration_minutes: default_expiration_minutes(),
        }
    }
}

impl AuthConfig {
    /// Resolve the signing secret: inline value first, then the environment.
    pub fn resolve_secret(&self) -> Result<String> {
        if let Some(secret) = &self.secret {
            return Ok(secret.clone());
        }
        std::env::var(&self.secret_env)
            .with_context(|| format!("{} environment variable not set", self.secret_env))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}
fn default_embedding_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_generation_model() -> String {
    "gpt-oss-20b".to_string()
}
fn default_openai_url() -> String {
    DEFAULT_OPENAI_URL.to_string()
}
fn default_generation_retries() -> u32 {
    2
}
fn default_generation_timeout_secs() -> u64 {
    120
}
fn default_vector_provider() -> String {
    "sqlite".to_string()
}
fn default_pinecone_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}
fn default_secret_env() -> String {
    "JWT_SECRET_KEY".to_string()
}
fn default_expiration_minutes() -> i64 {
    1440
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    config
        .chunking
        .params()
        .context("invalid [chunking] settings")?;
    if config.chunking.metadata_text_cap == 0 {
        bail!("chunking.metadata_text_cap must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" => {}
        "openai" => {
            if config.embedding.dims.is_none() {
                config.embedding.dims = Some(1536);
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate vector index
    match config.vector.provider.as_str() {
        "sqlite" => {}
        "pinecone" => {
            if config.vector.host.is_none() {
                bail!("vector.host must be set when provider is 'pinecone'");
            }
        }
        other => bail!(
            "Unknown vector provider: '{}'. Must be sqlite or pinecone.",
            other
        ),
    }

    if config.auth.expiration_minutes <= 0 {
        bail!("auth.expiration_minutes must be > 0");
    }

    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => bail!("Unknown logging format: '{}'. Must be pretty or json.", other),
    }

    Ok(config)
}
