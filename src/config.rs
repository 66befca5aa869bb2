use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_DB_PATH: &str = "./vector_db/docqa.sqlite";
const DEFAULT_COLLECTION: &str = "docs";
const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_SUMMARIZATION_MODEL: &str = "llama3.1";
const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docqa server and CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file backing the vector store.
    pub db_path: PathBuf,
    /// Name of the collection ensured at startup.
    pub collection_name: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime, shared by embedding and summarization.
    pub ollama_url: String,
    /// Summarizer used by the theme endpoint.
    pub summarization_provider: SummarizationProvider,
    /// Model name handed to the abstractive summarizer.
    pub summarization_model: String,
    /// Optional token budget for a single chunk; `None` keeps whole paragraphs.
    pub chunk_max_tokens: Option<usize>,
    /// Result count used when a query does not specify `k`.
    pub search_default_limit: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Deterministic in-process byte hashing encoder.
    Hash,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported summarization backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummarizationProvider {
    /// Leading-sentence extraction, no model required.
    Extractive,
    /// Abstractive summaries generated by an Ollama model.
    Ollama,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            collection_name: DEFAULT_COLLECTION.to_string(),
            embedding_provider: EmbeddingProvider::Hash,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            summarization_provider: SummarizationProvider::Extractive,
            summarization_model: DEFAULT_SUMMARIZATION_MODEL.to_string(),
            chunk_max_tokens: None,
            search_default_limit: DEFAULT_SEARCH_LIMIT,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    ///
    /// Every variable is optional; unset or blank values fall back to [`Config::default`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            db_path: load_env_optional("DOCQA_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            collection_name: load_env_optional("DOCQA_COLLECTION")
                .unwrap_or(defaults.collection_name),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            summarization_provider: load_env_optional("SUMMARIZATION_PROVIDER")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("SUMMARIZATION_PROVIDER".into())
                    })
                })
                .transpose()?
                .unwrap_or(defaults.summarization_provider),
            summarization_model: load_env_optional("SUMMARIZATION_MODEL")
                .unwrap_or(defaults.summarization_model),
            chunk_max_tokens: parse_optional("CHUNK_MAX_TOKENS")?,
            search_default_limit: parse_optional("SEARCH_DEFAULT_LIMIT")?
                .unwrap_or(defaults.search_default_limit),
            server_port: parse_optional("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Log the effective settings; call once a subscriber is installed.
    pub fn trace_loaded(&self) {
        tracing::debug!(
            db_path = %self.db_path.display(),
            collection = %self.collection_name,
            server_port = ?self.server_port,
            embedding_provider = ?self.embedding_provider,
            summarization_provider = ?self.summarization_provider,
            chunk_max_tokens = ?self.chunk_max_tokens,
            "Loaded configuration"
        );
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.chunk_max_tokens == Some(0) {
            return Err(ConfigError::InvalidValue("CHUNK_MAX_TOKENS".into()));
        }
        if self.collection_name.trim().is_empty() {
            return Err(ConfigError::MissingVariable("DOCQA_COLLECTION".into()));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for SummarizationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extractive" | "none" => Ok(Self::Extractive),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}
