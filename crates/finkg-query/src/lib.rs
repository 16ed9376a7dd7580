//! finkg Query - Question answering over the knowledge graph
//!
//! Questions are translated by strategies tried in a fixed order, first
//! success wins:
//! 1. template: a known phrase maps to a fixed query
//! 2. rule: a regex captures one entity bound as `$entity`
//! 3. model: an extractor's question translation, when enabled
//! 4. fallback: substring search over edge endpoints
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use finkg_core::{Extractor, GraphQuery, QueryConfig, QueryStrategy, Row};
use finkg_extractor::{clean_entity_name, strip_code_fences};
use finkg_graph::GraphStore;

// ============================================================================
// Templates and Rules
// ============================================================================

/// Fixed query keyed by a phrase
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    pub key: String,
    pub query: String,
}

/// Regex with one entity capture and a query skeleton using `$entity`
#[derive(Debug, Clone)]
pub struct QueryRule {
    pub name: String,
    pub regex: Regex,
    pub query: String,
}

fn default_templates(limit: usize) -> Vec<QueryTemplate> {
    [
        ("company acquisitions", "head AS acquirer, tail AS acquired_company", "ACQUIRED"),
        ("company investments", "head AS investor, tail AS investment", "INVESTED_IN"),
        ("person companies", "head AS person, tail AS company", "CEO_OF"),
        ("product launches", "head AS company, tail AS product", "LAUNCHED"),
    ]
    .into_iter()
    .map(|(key, fields, kind)| QueryTemplate {
        key: key.to_string(),
        query: format!(
            "SELECT {fields}, confidence FROM relates WHERE kind = '{kind}' ORDER BY confidence DESC LIMIT {limit}"
        ),
    })
    .collect()
}

fn default_rules(limit: usize) -> Vec<QueryRule> {
    let matches = |field: &str| format!("string::lowercase({field}) = string::lowercase($entity)");

    [
        (
            "acquisitions_by",
            r"(?i)what companies did (.+?) acquire",
            format!(
                "SELECT tail AS company, confidence FROM relates WHERE kind = 'ACQUIRED' AND {} ORDER BY confidence DESC LIMIT {limit}",
                matches("head")
            ),
        ),
        (
            "investors_in",
            r"(?i)who invested in (.+?)\s*\??$",
            format!(
                "SELECT head AS investor, confidence FROM relates WHERE kind = 'INVESTED_IN' AND {} ORDER BY confidence DESC LIMIT {limit}",
                matches("tail")
            ),
        ),
        (
            "launches_by",
            r"(?i)what products did (.+?) launch",
            format!(
                "SELECT tail AS product, confidence FROM relates WHERE kind = 'LAUNCHED' AND {} ORDER BY confidence DESC LIMIT {limit}",
                matches("head")
            ),
        ),
        (
            "ceo_of",
            r"(?i)who is the ceo of (.+?)\s*\??$",
            format!(
                "SELECT head AS ceo, confidence FROM relates WHERE kind = 'CEO_OF' AND {} ORDER BY confidence DESC LIMIT {limit}",
                matches("tail")
            ),
        ),
        (
            "partners_of",
            r"(?i)what companies partnered with (.+?)\s*\??$",
            format!(
                "SELECT head, tail, confidence FROM relates WHERE kind = 'PARTNERED_WITH' AND ({} OR {}) ORDER BY confidence DESC LIMIT {limit}",
                matches("head"),
                matches("tail")
            ),
        ),
    ]
    .into_iter()
    .filter_map(|(name, pattern, query)| {
        Regex::new(pattern).ok().map(|regex| QueryRule {
            name: name.to_string(),
            regex,
            query,
        })
    })
    .collect()
}

// ============================================================================
// Query Translator
// ============================================================================

/// Maps natural-language questions to graph queries
pub struct QueryTranslator {
    templates: Vec<QueryTemplate>,
    rules: Vec<QueryRule>,
    model: Option<Arc<dyn Extractor>>,
    use_model: bool,
    fallback_limit: usize,
}

impl QueryTranslator {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            templates: default_templates(config.template_limit),
            rules: default_rules(config.template_limit),
            model: None,
            use_model: config.use_llm,
            fallback_limit: config.fallback_limit,
        }
    }

    /// Attach a model-backed translator
    pub fn with_model(mut self, model: Arc<dyn Extractor>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn templates(&self) -> &[QueryTemplate] {
        &self.templates
    }

    /// Translate with the configured model setting
    pub async fn translate(&self, question: &str) -> Option<GraphQuery> {
        self.translate_with(question, self.use_model).await
    }

    /// Translate, choosing whether the model strategy may run
    pub async fn translate_with(&self, question: &str, use_model: bool) -> Option<GraphQuery> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }

        if let Some(query) = self.match_template(question) {
            return Some(query);
        }
        if let Some(query) = self.match_rule(question) {
            return Some(query);
        }
        if use_model {
            if let Some(query) = self.model_translation(question).await {
                return Some(query);
            }
        }

        debug!(question, "Using fallback query");
        Some(self.fallback(question))
    }

    /// Containment of a template key in the lower-cased question
    pub fn match_template(&self, question: &str) -> Option<GraphQuery> {
        let lowered = question.trim().to_lowercase();
        self.templates
            .iter()
            .find(|t| lowered.contains(t.key.as_str()))
            .map(|t| {
                info!(template = %t.key, "Using predefined template");
                GraphQuery::new(t.query.clone(), QueryStrategy::Template(t.key.clone()))
            })
    }

    /// First rule whose pattern matches; the captured entity becomes `$entity`
    pub fn match_rule(&self, question: &str) -> Option<GraphQuery> {
        self.rules.iter().find_map(|rule| {
            let captured = rule.regex.captures(question)?.get(1)?.as_str();
            let entity = clean_entity_name(captured.trim_end_matches('?'));
            if entity.is_empty() {
                return None;
            }

            info!(rule = %rule.name, entity = %entity, "Matched question rule");
            Some(
                GraphQuery::new(rule.query.clone(), QueryStrategy::Rule(rule.name.clone()))
                    .with_param("entity", entity),
            )
        })
    }

    async fn model_translation(&self, question: &str) -> Option<GraphQuery> {
        let model = self.model.as_ref()?;
        match model.translate_question(question).await {
            Ok(Some(text)) => {
                let text = strip_code_fences(&text);
                if text.is_empty() {
                    return None;
                }
                info!(model = model.name(), "Using model translation");
                Some(GraphQuery::new(text, QueryStrategy::Model))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Model translation failed");
                None
            }
        }
    }

    fn fallback(&self, question: &str) -> GraphQuery {
        GraphQuery::new(
            format!(
                "SELECT head AS source, kind AS relationship, tail AS target FROM relates \
                 WHERE string::contains(string::lowercase(head), $term) \
                 OR string::contains(string::lowercase(tail), $term) LIMIT {}",
                self.fallback_limit
            ),
            QueryStrategy::Fallback,
        )
        .with_param("term", question.trim().to_lowercase())
    }
}

// ============================================================================
// Query Engine
// ============================================================================

/// Translates and executes questions against a graph store
pub struct QueryEngine {
    translator: QueryTranslator,
    store: Arc<dyn GraphStore>,
}

impl QueryEngine {
    pub fn new(translator: QueryTranslator, store: Arc<dyn GraphStore>) -> Self {
        Self { translator, store }
    }

    pub fn translator(&self) -> &QueryTranslator {
        &self.translator
    }

    /// Answer a question; no translation or a failed query yields no rows
    pub async fn ask(&self, question: &str) -> Vec<Row> {
        match self.translator.translate(question).await {
            Some(query) => self.store.run(&query).await,
            None => Vec::new(),
        }
    }

    /// Answer a question, choosing whether the model strategy may run
    pub async fn ask_with(&self, question: &str, use_model: bool) -> Vec<Row> {
        match self.translator.translate_with(question, use_model).await {
            Some(query) => self.store.run(&query).await,
            None => Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
