//! finkg Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout finkg:
//! - Triplet models (raw extractor output and canonical form)
//! - Entity type tags and graph statistics
//! - Graph queries produced by question translation
//! - Common error types
//! - Collaborator traits (extractors, LLM clients)
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, EdgeConflictPolicy, ExtractionConfig, ExtractionMode,
    GraphConfig, LlmConfig, LlmProvider, LoggingConfig, PipelineConfig, QueryConfig,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Confidence assigned to a triplet whose source did not emit one
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Provenance tag written on every extracted edge
pub const EXTRACTED_SOURCE: &str = "extracted";

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for finkg operations
#[derive(Error, Debug)]
pub enum FinkgError {
    /// Missing or unreadable input, or an empty sentence set
    #[error("Input error: {0}")]
    Input(String),

    /// Malformed model or API response
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A single record failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection failure, malformed query, constraint violation
    #[error("Store error: {0}")]
    Store(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No valid triplets after cleaning")]
    NoValidTriplets,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FinkgError>;

// ============================================================================
// Triplets
// ============================================================================

/// A candidate fact as emitted by an [`Extractor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTriplet {
    pub head: String,
    pub relation: String,
    pub tail: String,

    /// Extraction confidence in `[0, 1]`, if the source emits one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail_type: Option<String>,
}

impl RawTriplet {
    /// Create a triplet without confidence or type tags
    pub fn new(
        head: impl Into<String>,
        relation: impl Into<String>,
        tail: impl Into<String>,
    ) -> Self {
        Self {
            head: head.into(),
            relation: relation.into(),
            tail: tail.into(),
            confidence: None,
            head_type: None,
            tail_type: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_types(mut self, head_type: impl Into<String>, tail_type: impl Into<String>) -> Self {
        self.head_type = Some(head_type.into());
        self.tail_type = Some(tail_type.into());
        self
    }
}

/// A triplet after standardization, cleaning and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTriplet {
    pub head: String,
    pub relation: String,
    pub tail: String,
    pub confidence: Option<f64>,
    pub head_type: String,
    pub tail_type: String,
}

impl CanonicalTriplet {
    /// Confidence to materialize, falling back to [`DEFAULT_CONFIDENCE`]
    pub fn effective_confidence(&self) -> f64 {
        self.confidence.unwrap_or(DEFAULT_CONFIDENCE)
    }
}

// ============================================================================
// Entity Types
// ============================================================================

/// Categorical tags assigned to entity nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Company,
    Person,
    Product,
    Date,
    Currency,
    Entity,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "COMPANY",
            Self::Person => "PERSON",
            Self::Product => "PRODUCT",
            Self::Date => "DATE",
            Self::Currency => "CURRENCY",
            Self::Entity => "ENTITY",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Graph Results
// ============================================================================

/// One result row: field name to value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Named query parameters
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Aggregate counts computed from the live graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: u64,
    pub unique_labels: u64,
    pub total_relationships: u64,
    pub unique_relationship_types: u64,
}

/// Which translation strategy produced a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "name", rename_all = "snake_case")]
pub enum QueryStrategy {
    /// Fixed query keyed by a phrase
    Template(String),
    /// Regex rule with a captured entity
    Rule(String),
    /// Free-form translation by an external model
    Model,
    /// Substring search over all edges
    Fallback,
}

/// A graph query ready for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQuery {
    pub text: String,
    pub params: Params,
    pub strategy: QueryStrategy,
}

impl GraphQuery {
    pub fn new(text: impl Into<String>, strategy: QueryStrategy) -> Self {
        Self {
            text: text.into(),
            params: Params::new(),
            strategy,
        }
    }

    /// Bind a named parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Source of candidate triplets
///
/// Implementations may use patterns, local models or remote APIs; callers
/// only rely on this contract.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    /// Extract candidate triplets from one unit of text
    async fn extract(&self, text: &str) -> Result<Vec<RawTriplet>>;

    /// Translate a question into a graph query, if this extractor can
    async fn translate_question(&self, _question: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Extractor name for logging
    fn name(&self) -> &str;
}

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response to a single user prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate a response with a system instruction
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate(&format!("{system}\n\n{prompt}")).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait::async_trait]
    impl LlmClient for Echo {
        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    struct Silent;

    #[async_trait::async_trait]
    impl Extractor for Silent {
        async fn extract(&self, _text: &str) -> Result<Vec<RawTriplet>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    #[test]
    fn test_raw_triplet_builder() {
        let t = RawTriplet::new("Apple", "acquired", "DarwinAI")
            .with_confidence(0.95)
            .with_types("COMPANY", "ENTITY");

        assert_eq!(t.head, "Apple");
        assert_eq!(t.confidence, Some(0.95));
        assert_eq!(t.tail_type.as_deref(), Some("ENTITY"));
    }

    #[test]
    fn test_raw_triplet_deserialize_without_confidence() {
        let t: RawTriplet =
            serde_json::from_str(r#"{"head": "Tesla", "relation": "LAUNCHED", "tail": "Model Y"}"#)
                .unwrap();
        assert_eq!(t.confidence, None);
        assert_eq!(t.head_type, None);
    }

    #[test]
    fn test_effective_confidence_default() {
        let t = CanonicalTriplet {
            head: "Tesla".into(),
            relation: "LAUNCHED".into(),
            tail: "Model Y".into(),
            confidence: None,
            head_type: "ENTITY".into(),
            tail_type: "ENTITY".into(),
        };
        assert_eq!(t.effective_confidence(), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_entity_type_display() {
        assert_eq!(EntityType::Company.to_string(), "COMPANY");
        assert_eq!(
            serde_json::to_value(EntityType::Currency).unwrap(),
            serde_json::json!("CURRENCY")
        );
    }

    #[test]
    fn test_graph_query_params() {
        let q = GraphQuery::new("SELECT * FROM relates", QueryStrategy::Fallback)
            .with_param("term", "apple");
        assert_eq!(q.params.get("term"), Some(&serde_json::json!("apple")));
    }

    #[test]
    fn test_default_trait_methods() {
        let answer = tokio_test::block_on(Silent.translate_question("who?")).unwrap();
        assert!(answer.is_none());

        let text = tokio_test::block_on(Echo.generate_with_system("sys", "user")).unwrap();
        assert_eq!(text, "sys\n\nuser");
    }
}
