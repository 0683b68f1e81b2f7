//! Configuration loading and validation.
//!
//! Configuration is resolved with the following precedence (highest wins):
//!
//! 1. CLI flags
//! 2. Environment variables (`MU_*`)
//! 3. Project config (`<repo>/.murc.toml`)
//! 4. User config (`dirs::config_dir()/mu/config.toml`)
//! 5. Compiled-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MuError, MuResult};

/// Top-level configuration for the kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Repository root path to index.
    pub repo_path: PathBuf,

    /// Indexing configuration.
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Indexing-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File patterns to exclude from indexing (glob syntax).
    #[serde(default = "IndexingConfig::default_excludes")]
    pub exclude_patterns: Vec<String>,

    /// Maximum file size to index (in bytes). Files larger than this are skipped.
    #[serde(default = "IndexingConfig::default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum number of concurrent parse tasks.
    #[serde(default = "IndexingConfig::default_parse_concurrency")]
    pub parse_concurrency: usize,

    /// Whether to follow symbolic links.
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Self::default_excludes(),
            max_file_size: Self::default_max_file_size(),
            parse_concurrency: Self::default_parse_concurrency(),
            follow_symlinks: false,
        }
    }
}

impl IndexingConfig {
    fn default_excludes() -> Vec<String> {
        vec![
            ".git".into(),
            "node_modules".into(),
            "target".into(),
            "__pycache__".into(),
            ".venv".into(),
            "venv".into(),
            "dist".into(),
            "build".into(),
            ".next".into(),
            "*.lock".into(),
            "*.min.js".into(),
            "*.min.css".into(),
            "*.map".into(),
        ]
    }

    fn default_max_file_size() -> u64 {
        5 * 1024 * 1024 // 5MB
    }

    fn default_parse_concurrency() -> usize {
        2
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local ONNX inference, no network calls.
    Local,
    /// OpenAI-compatible HTTP embeddings endpoint.
    Openai,
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which provider to construct.
    #[serde(default = "EmbeddingConfig::default_provider")]
    pub provider: EmbeddingProviderKind,

    /// Path to the ONNX model file (`provider = "local"`).
    #[serde(default = "EmbeddingConfig::default_model_path")]
    pub model_path: PathBuf,

    /// Output embedding dimensions.
    #[serde(default = "EmbeddingConfig::default_dimensions")]
    pub dimensions: usize,

    /// Batch size for embedding inference.
    #[serde(default = "EmbeddingConfig::default_batch_size")]
    pub batch_size: usize,

    /// Maximum sequence length for the tokenizer.
    #[serde(default = "EmbeddingConfig::default_max_seq_length")]
    pub max_seq_length: usize,

    /// Base URL for the OpenAI-compatible embeddings endpoint
    /// (`provider = "openai"`).
    #[serde(default = "EmbeddingConfig::default_api_base")]
    pub api_base: String,

    /// Model name passed to the remote endpoint.
    #[serde(default = "EmbeddingConfig::default_remote_model")]
    pub remote_model: String,

    /// Name of the environment variable holding the API key. The key
    /// itself is never stored in config.
    #[serde(default = "EmbeddingConfig::default_api_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            model_path: Self::default_model_path(),
            dimensions: Self::default_dimensions(),
            batch_size: Self::default_batch_size(),
            max_seq_length: Self::default_max_seq_length(),
            api_base: Self::default_api_base(),
            remote_model: Self::default_remote_model(),
            api_key_env: Self::default_api_key_env(),
        }
    }
}

impl EmbeddingConfig {
    fn default_provider() -> EmbeddingProviderKind {
        EmbeddingProviderKind::Local
    }
    fn default_model_path() -> PathBuf {
        // Default: auto-download cache location for jina-embeddings-v2-base-code.
        // If the model isn't here yet, the embedder will auto-download it.
        // Users can override via config or MU_MODEL_PATH env var.
        crate::embedder::model_manager::model_path(&crate::embedder::model_manager::DEFAULT_MODEL)
    }
    fn default_dimensions() -> usize { 768 } // jina-code v2 output dimensions
    fn default_batch_size() -> usize { 32 }
    fn default_max_seq_length() -> usize { 512 } // practical limit for code chunks
    fn default_api_base() -> String { "https://api.openai.com/v1/embeddings".into() }
    fn default_remote_model() -> String { "text-embedding-3-small".into() }
    fn default_api_key_env() -> String { "OPENAI_API_KEY".into() }
}

/// File watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Debounce interval in milliseconds.
    #[serde(default = "WatcherConfig::default_debounce_ms")]
    pub debounce_ms: u64,

    /// Interval between full scans (in seconds) for catching missed events.
    #[serde(default = "WatcherConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce_ms(),
            poll_interval_secs: Self::default_poll_interval_secs(),
        }
    }
}

impl WatcherConfig {
    fn default_debounce_ms() -> u64 { 100 }
    fn default_poll_interval_secs() -> u64 { 300 }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Whether to output logs as JSON.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
}

impl Config {
    /// Load configuration from defaults, then overlay user config, then project config.
    pub fn load(repo_path: &Path) -> MuResult<Self> {
        let mut config = Self::defaults(repo_path);

        // User config: dirs::config_dir()/mu/config.toml
        if let Some(user_config_dir) = dirs::config_dir() {
            let user_config_path = user_config_dir.join("mu").join("config.toml");
            if user_config_path.exists() {
                config.merge_from_file(&user_config_path)?;
            }
        }

        // Project config: <repo>/.murc.toml
        let project_config_path = repo_path.join(".murc.toml");
        if project_config_path.exists() {
            config.merge_from_file(&project_config_path)?;
        }

        // Environment overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Create a default configuration for the given repo path.
    pub fn defaults(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            indexing: IndexingConfig::default(),
            embedding: EmbeddingConfig::default(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Returns the directory holding this repo's mubase and auxiliary index
    /// files. Kept project-local (`<repo>/.mu/`) rather than under a
    /// hashed path in the user's data directory, so the mubase travels
    /// with the repo and survives a clone to a new machine.
    pub fn data_dir(&self) -> PathBuf {
        self.repo_path.join(".mu")
    }

    /// Merge values from a TOML config file (non-destructive overlay).
    fn merge_from_file(&mut self, path: &Path) -> MuResult<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content)
            .map_err(|e| MuError::Config { details: format!("invalid TOML in {}: {e}", path.display()) })?;

        // Override individual sections if present
        if let Some(indexing) = overlay.get("indexing") {
            if let Ok(parsed) = indexing.clone().try_into::<IndexingConfig>() {
                self.indexing = parsed;
            }
        }
        if let Some(embedding) = overlay.get("embedding") {
            if let Ok(parsed) = embedding.clone().try_into::<EmbeddingConfig>() {
                self.embedding = parsed;
            }
        }
        if let Some(watcher) = overlay.get("watcher") {
            if let Ok(parsed) = watcher.clone().try_into::<WatcherConfig>() {
                self.watcher = parsed;
            }
        }
        if let Some(logging) = overlay.get("logging") {
            if let Ok(parsed) = logging.clone().try_into::<LoggingConfig>() {
                self.logging = parsed;
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides (`MU_*` prefix).
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("MU_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(model) = std::env::var("MU_MODEL_PATH") {
            self.embedding.model_path = PathBuf::from(model);
        }
        if let Ok(provider) = std::env::var("MU_EMBEDDING_PROVIDER") {
            self.embedding.provider = match provider.to_ascii_lowercase().as_str() {
                "openai" => EmbeddingProviderKind::Openai,
                _ => EmbeddingProviderKind::Local,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.indexing.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.watcher.debounce_ms, 100);
    }

    #[test]
    fn test_language_from_extension() {
        use crate::types::Language;
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("ts"), Language::TypeScript);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("go"), Language::Go);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
    }

    #[test]
    fn test_data_dir_is_project_local() {
        let config = Config::defaults(Path::new("/tmp/some-repo"));
        assert_eq!(config.data_dir(), Path::new("/tmp/some-repo/.mu"));
    }

    #[test]
    fn test_merge_from_project_murc_overlays_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(".murc.toml"), "[embedding]\nprovider = \"openai\"\n")
            .expect("write .murc.toml");

        let config = Config::load(dir.path()).expect("load config");
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Openai);
        // Untouched sections keep their compiled defaults.
        assert_eq!(config.watcher.debounce_ms, 100);
    }
}
