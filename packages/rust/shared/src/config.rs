//! Application configuration for Deskbot.
//!
//! User config lives at `~/.deskbot/deskbot.toml`. Environment variables
//! override config file values, which override defaults. The resolved
//! [`AppConfig`] is immutable and passed into each component's constructor —
//! no ambient global lookup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeskbotError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "deskbot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".deskbot";

// ---------------------------------------------------------------------------
// Config structs (matching deskbot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ollama model settings.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Crawl settings.
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Document chunking settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding index settings.
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// `[models]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Completion model used by the answer agents.
    #[serde(default = "default_router_model")]
    pub router_model: String,

    /// Embedding model used at ingestion and query time. The index records
    /// which model produced its vectors; a mismatch is a config error.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// Base URL of the Ollama server.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            router_model: default_router_model(),
            embed_model: default_embed_model(),
            ollama_url: default_ollama_url(),
        }
    }
}

fn default_router_model() -> String {
    "llama3.2".into()
}
fn default_embed_model() -> String {
    "mxbai-embed-large".into()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Seed URL where the crawl starts.
    #[serde(default = "default_seed")]
    pub seed: String,

    /// Base URL prefix that crawled pages must stay under.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent header sent with crawl requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum crawl depth from the seed URL.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent HTTP requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Minimum ms between requests to the host.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            max_depth: default_max_depth(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            rate_limit_ms: default_rate_limit(),
        }
    }
}

fn default_seed() -> String {
    "https://ajuda.infinitepay.io/pt-BR/".into()
}
fn default_base_url() -> String {
    "https://ajuda.infinitepay.io".into()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36"
        .into()
}
fn default_max_depth() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_concurrency() -> u32 {
    4
}
fn default_rate_limit() -> u64 {
    200
}

/// `[chunking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters repeated between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    120
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the embedding index database.
    #[serde(default = "default_index_dir")]
    pub dir: String,

    /// Collection name entries are stored under.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            collection: default_collection(),
        }
    }
}

fn default_index_dir() -> String {
    "./var/index".into()
}
fn default_collection() -> String {
    "helpcenter".into()
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per knowledge query.
    #[serde(default = "default_retrieval_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_retrieval_k(),
        }
    }
}

fn default_retrieval_k() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.deskbot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DeskbotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.deskbot/deskbot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk, apply environment overrides, and
/// validate. Returns defaults (plus overrides) if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Load the application config from a specific file path (no env overrides).
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DeskbotError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DeskbotError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DeskbotError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DeskbotError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DeskbotError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

impl AppConfig {
    /// Apply environment variable overrides on top of file/default values.
    pub fn apply_env_overrides(&mut self) {
        override_str("ROUTER_MODEL", &mut self.models.router_model);
        override_str("EMBED_MODEL", &mut self.models.embed_model);
        override_str("OLLAMA_URL", &mut self.models.ollama_url);
        override_str("DEFAULT_SEED", &mut self.crawl.seed);
        override_str("BASE_URL", &mut self.crawl.base_url);
        override_str("USER_AGENT", &mut self.crawl.user_agent);
        override_str("DESKBOT_INDEX_DIR", &mut self.index.dir);
        override_str("COLLECTION_NAME", &mut self.index.collection);
        override_parsed("DEFAULT_CHUNK_SIZE", &mut self.chunking.chunk_size);
        override_parsed("DEFAULT_CHUNK_OVERLAP", &mut self.chunking.chunk_overlap);
        override_parsed("DEFAULT_MAX_DEPTH", &mut self.crawl.max_depth);
        override_parsed("DEFAULT_TIMEOUT", &mut self.crawl.timeout_secs);
        override_parsed("DEFAULT_RETRIEVAL_K", &mut self.retrieval.k);
    }

    /// Validate cross-field invariants. Called once at startup so violating
    /// configurations fail fast instead of misbehaving mid-ingest.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(DeskbotError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.chunking.chunk_size == 0 {
            return Err(DeskbotError::config("chunk_size must be non-zero"));
        }
        if self.crawl.concurrency == 0 {
            return Err(DeskbotError::config("crawl concurrency must be at least 1"));
        }
        if self.retrieval.k == 0 {
            return Err(DeskbotError::config("retrieval k must be at least 1"));
        }
        url::Url::parse(&self.crawl.seed)
            .map_err(|e| DeskbotError::config(format!("invalid seed URL: {e}")))?;
        url::Url::parse(&self.models.ollama_url)
            .map_err(|e| DeskbotError::config(format!("invalid ollama_url: {e}")))?;
        Ok(())
    }
}

fn override_str(var: &str, target: &mut String) {
    if let Ok(val) = std::env::var(var) {
        if !val.is_empty() {
            *target = val;
        }
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(val) = std::env::var(var) {
        if let Ok(parsed) = val.parse::<T>() {
            *target = parsed;
        } else {
            tracing::warn!(var, value = %val, "ignoring unparseable env override");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("embed_model"));
        assert!(toml_str.contains("chunk_overlap"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.crawl.max_depth, 3);
        assert_eq!(parsed.chunking.chunk_size, 800);
        assert_eq!(parsed.retrieval.k, 5);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[chunking]
chunk_size = 400

[index]
collection = "docs"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.chunking.chunk_overlap, 120);
        assert_eq!(config.index.collection, "docs");
        assert_eq!(config.models.embed_model, "mxbai-embed-large");
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let mut config = AppConfig::default();
        config.chunking.chunk_size = 100;
        config.chunking.chunk_overlap = 100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));

        config.chunking.chunk_overlap = 99;
        config.validate().expect("99/100 is valid");
    }

    #[test]
    fn rejects_invalid_seed_url() {
        let mut config = AppConfig::default();
        config.crawl.seed = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_wins() {
        unsafe {
            std::env::set_var("DEFAULT_RETRIEVAL_K", "9");
        }
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("DEFAULT_RETRIEVAL_K");
        }
        assert_eq!(config.retrieval.k, 9);
    }
}
