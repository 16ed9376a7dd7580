//! finkg Configuration Management
//!
//! Handles configuration from TOML files and environment variables with
//! sensible defaults for development. `${VAR}` string values in a config
//! file are substituted from the environment before deserialization.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Graph database connection
    pub database: DatabaseConfig,

    /// Graph import behavior
    pub graph: GraphConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Extraction vocabulary and strategy
    pub extraction: ExtractionConfig,

    /// Pipeline thresholds and limits
    pub pipeline: PipelineConfig,

    /// Question translation
    pub query: QueryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // SurrealDB
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            config.database.surrealdb_url = url;
        }
        if let Ok(user) = std::env::var("SURREALDB_USER") {
            config.database.surrealdb_user = user;
        }
        if let Ok(pass) = std::env::var("SURREALDB_PASS") {
            config.database.surrealdb_pass = pass;
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError { path, message },
            other => other,
        })
    }

    /// Parse TOML text, substituting `${VAR}` values from the environment
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut value: toml::Value =
            toml::from_str(content).map_err(|e| ConfigError::ParseError {
                path: PathBuf::new(),
                message: e.to_string(),
            })?;

        substitute_env_vars(&mut value);

        value.try_into().map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: PathBuf::new(),
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env_config = Self::from_env()?;

        // Only override if env values differ from defaults
        if env_config.database.surrealdb_url != defaults.database.surrealdb_url {
            self.database.surrealdb_url = env_config.database.surrealdb_url;
        }
        if env_config.database.surrealdb_user != defaults.database.surrealdb_user {
            self.database.surrealdb_user = env_config.database.surrealdb_user;
        }
        if env_config.database.surrealdb_pass != defaults.database.surrealdb_pass {
            self.database.surrealdb_pass = env_config.database.surrealdb_pass;
        }
        if env_config.llm.provider != defaults.llm.provider {
            self.llm.provider = env_config.llm.provider;
        }
        if env_config.llm.model != defaults.llm.model {
            self.llm.model = env_config.llm.model;
        }
        if env_config.logging.level != defaults.logging.level {
            self.logging.level = env_config.logging.level;
        }

        // Always use env for sensitive values
        if env_config.llm.openai_api_key.is_some() {
            self.llm.openai_api_key = env_config.llm.openai_api_key;
        }

        Ok(self)
    }
}

/// Replace `${VAR}` strings with the variable's value; unset variables keep the literal
fn substitute_env_vars(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => {
            if let Some(name) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
                if let Ok(resolved) = std::env::var(name) {
                    *s = resolved;
                }
            }
        }
        toml::Value::Array(items) => items.iter_mut().for_each(substitute_env_vars),
        toml::Value::Table(table) => table
            .iter_mut()
            .for_each(|(_, v)| substitute_env_vars(v)),
        _ => {}
    }
}

/// Graph database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SurrealDB endpoint (`ws://host:port` or `mem://`)
    pub surrealdb_url: String,

    /// SurrealDB username (empty to skip sign-in)
    pub surrealdb_user: String,

    /// SurrealDB password
    pub surrealdb_pass: String,

    /// SurrealDB namespace
    pub surrealdb_namespace: String,

    /// SurrealDB database name
    pub surrealdb_database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            surrealdb_url: "ws://localhost:8000".to_string(),
            surrealdb_user: "root".to_string(),
            surrealdb_pass: "root".to_string(),
            surrealdb_namespace: "finkg".to_string(),
            surrealdb_database: "news".to_string(),
        }
    }
}

/// Graph import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Records per import batch
    pub import_batch_size: usize,

    /// How a re-imported edge treats its stored confidence
    pub edge_policy: EdgeConflictPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            import_batch_size: 100,
            edge_policy: EdgeConflictPolicy::LastWriteWins,
        }
    }
}

/// Confidence policy for an edge that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeConflictPolicy {
    /// The incoming confidence overwrites the stored one
    #[default]
    LastWriteWins,
    /// The edge keeps the larger of stored and incoming confidence
    KeepHighestConfidence,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 500,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Which extractor implementation to construct
    pub mode: ExtractionMode,

    /// Use the few-shot prompt instead of the zero-shot one
    pub few_shot: bool,

    /// Entity types named in extraction prompts
    pub entity_types: Vec<String>,

    /// Relation types accepted after standardization
    pub relation_types: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Pattern,
            few_shot: false,
            entity_types: ["COMPANY", "PERSON", "PRODUCT", "DATE", "CURRENCY", "ENTITY"]
                .into_iter()
                .map(String::from)
                .collect(),
            relation_types: [
                "ACQUIRED",
                "INVESTED_IN",
                "LAUNCHED",
                "PARTNERED_WITH",
                "CEO_OF",
                "FOUNDED",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Extractor implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Regex rules, no external services
    #[default]
    Pattern,
    /// Prompted language model through the configured provider
    Llm,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum confidence kept by the normalizer (inclusive)
    pub confidence_threshold: f64,

    /// Sentences per extraction batch
    pub batch_size: usize,

    /// Maximum sentences taken from one input
    pub max_sentences: usize,

    /// Sentences at or below this length are discarded
    pub min_sentence_length: usize,

    /// Where the canonical table is written between Clean and Build
    pub export_path: PathBuf,

    /// Questions run after a successful build
    pub sample_questions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            batch_size: 10,
            max_sentences: 100,
            min_sentence_length: 20,
            export_path: PathBuf::from("data/cleaned_triplets.csv"),
            sample_questions: vec![
                "What companies were acquired?".to_string(),
                "Who invested in AI companies?".to_string(),
                "What products were launched recently?".to_string(),
            ],
        }
    }
}

/// Question translation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Let the extractor translate questions no template or rule covers
    pub use_llm: bool,

    /// Row limit of the substring fallback query
    pub fallback_limit: usize,

    /// Row limit of template queries
    pub template_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            use_llm: false,
            fallback_limit: 10,
            template_limit: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
