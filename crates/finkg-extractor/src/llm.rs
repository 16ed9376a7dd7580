//! LLM-based triplet extraction
//!
//! Prompts a language model for a JSON array of triplets and validates each
//! element. The same extractor answers question translation requests with
//! the NL-to-query prompt.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use finkg_core::{
    ExtractionConfig, Extractor, FinkgError, LlmClient, RawTriplet, Result, DEFAULT_CONFIDENCE,
};

const SYSTEM_PROMPT: &str = "You are a financial knowledge graph extraction assistant.";

/// LLM extractor configuration
#[derive(Debug, Clone)]
pub struct LlmExtractorConfig {
    pub system_prompt: String,
    pub zero_shot_prompt: String,
    pub few_shot_prompt: String,
    pub query_prompt: String,
    /// Use worked examples instead of the type listing
    pub few_shot: bool,
    pub entity_types: Vec<String>,
    pub relation_types: Vec<String>,
}

impl Default for LlmExtractorConfig {
    fn default() -> Self {
        Self::from_extraction(&ExtractionConfig::default())
    }
}

impl LlmExtractorConfig {
    pub fn from_extraction(config: &ExtractionConfig) -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
            zero_shot_prompt: include_str!("prompts/extraction_zero_shot.txt").to_string(),
            few_shot_prompt: include_str!("prompts/extraction_few_shot.txt").to_string(),
            query_prompt: include_str!("prompts/nl_to_query.txt").to_string(),
            few_shot: config.few_shot,
            entity_types: config.entity_types.clone(),
            relation_types: config.relation_types.clone(),
        }
    }
}

/// Extractor backed by an [`LlmClient`]
pub struct LlmExtractor {
    client: Box<dyn LlmClient>,
    pub config: LlmExtractorConfig,
    json_array: Option<Regex>,
}

impl LlmExtractor {
    pub fn new(client: Box<dyn LlmClient>) -> Self {
        Self::with_config(client, LlmExtractorConfig::default())
    }

    pub fn with_config(client: Box<dyn LlmClient>, config: LlmExtractorConfig) -> Self {
        Self {
            client,
            config,
            json_array: Regex::new(r"(?s)\[.*\]").ok(),
        }
    }

    /// Build the extraction prompt for one unit of text
    pub fn build_prompt(&self, text: &str) -> String {
        let template = if self.config.few_shot {
            &self.config.few_shot_prompt
        } else {
            &self.config.zero_shot_prompt
        };

        template
            .replace("{entity_types}", &self.config.entity_types.join(", "))
            .replace("{relation_types}", &self.config.relation_types.join(", "))
            .replace("{text}", text)
    }

    pub fn build_query_prompt(&self, question: &str) -> String {
        self.config
            .query_prompt
            .replace("{relation_types}", &self.config.relation_types.join(", "))
            .replace("{question}", question)
    }

    /// Parse a model response into triplets
    ///
    /// A response without a JSON array is an extraction error. Elements that
    /// fail validation are dropped individually.
    pub fn parse_response(&self, response: &str) -> Result<Vec<RawTriplet>> {
        let json = self
            .json_array
            .as_ref()
            .and_then(|regex| regex.find(response))
            .ok_or_else(|| FinkgError::Extraction("No JSON array in response".to_string()))?;

        let elements: Vec<Value> = serde_json::from_str(json.as_str())
            .map_err(|e| FinkgError::Extraction(format!("Invalid JSON array: {e}")))?;

        let total = elements.len();
        let triplets: Vec<RawTriplet> = elements
            .into_iter()
            .filter_map(|element| match parse_triplet(&element) {
                Ok(triplet) => Some(triplet),
                Err(e) => {
                    debug!(error = %e, "Dropping triplet");
                    None
                }
            })
            .collect();

        info!(valid = triplets.len(), total, "Parsed model triplets");
        Ok(triplets)
    }
}

/// Validate one element of the model's JSON array
fn parse_triplet(element: &Value) -> Result<RawTriplet> {
    let field = |name: &str| {
        element
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FinkgError::Validation(format!("Missing string field '{name}'")))
    };

    let confidence = match element.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| FinkgError::Validation(format!("Confidence {n} is not a float")))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FinkgError::Validation(format!("Non-numeric confidence '{s}'")))?,
        Some(other) => {
            return Err(FinkgError::Validation(format!(
                "Non-numeric confidence {other}"
            )))
        }
    };

    let mut triplet = RawTriplet::new(field("head")?, field("relation")?, field("tail")?)
        .with_confidence(confidence);
    triplet.head_type = field("head_type").ok();
    triplet.tail_type = field("tail_type").ok();
    Ok(triplet)
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<RawTriplet>> {
        let prompt = self.build_prompt(text);
        let response = self
            .client
            .generate_with_system(&self.config.system_prompt, &prompt)
            .await?;

        match self.parse_response(&response) {
            Ok(triplets) => Ok(triplets),
            Err(e) => {
                warn!(error = %e, "Malformed model response, no triplets extracted");
                Ok(Vec::new())
            }
        }
    }

    async fn translate_question(&self, question: &str) -> Result<Option<String>> {
        let response = self.client.generate(&self.build_query_prompt(question)).await?;
        let query = strip_code_fences(&response);
        Ok((!query.is_empty()).then_some(query))
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Query languages a model may name on an opening fence
const FENCE_LANGUAGES: &[&str] = &["sql", "surql", "surrealql", "cypher"];

/// Remove surrounding Markdown code-fence markers
pub fn strip_code_fences(text: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = strip_fence_info(rest);
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim().to_string()
}

/// Drop the info string of an opening fence: a lone word on the fence line,
/// or a known language name followed by the query on the same line
fn strip_fence_info(rest: &str) -> &str {
    if let Some((first_line, body)) = rest.split_once('\n') {
        if !first_line.trim().contains(char::is_whitespace) {
            return body;
        }
    }

    let trimmed = rest.trim_start();
    let word_end = trimmed
        .find(char::is_whitespace)
        .unwrap_or(trimmed.len());
    let word = &trimmed[..word_end];
    if FENCE_LANGUAGES.iter().any(|lang| word.eq_ignore_ascii_case(lang)) {
        &trimmed[word_end..]
    } else {
        rest
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns a canned response and records the prompts it saw
    struct Canned {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn boxed(response: &str) -> Box<Self> {
            Box::new(Self {
                response: response.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for Canned {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    #[test]
    fn test_parse_response_embedded_in_prose() {
        let extractor = LlmExtractor::new(Canned::boxed(""));
        let triplets = extractor
            .parse_response(
                r#"Here you go:
[{"head": "Apple", "relation": "ACQUIRED", "tail": "DarwinAI", "confidence": 0.95},
 {"head": "Tesla", "relation": "LAUNCHED", "tail": "Model Y"}]
Done."#,
            )
            .unwrap();

        assert_eq!(triplets.len(), 2);
        assert_eq!(triplets[0].confidence, Some(0.95));
        assert_eq!(triplets[1].confidence, Some(DEFAULT_CONFIDENCE));
    }

    #[test]
    fn test_invalid_elements_dropped_individually() {
        let extractor = LlmExtractor::new(Canned::boxed(""));
        let triplets = extractor
            .parse_response(
                r#"[
  {"head": "Apple", "relation": "ACQUIRED"},
  {"head": "Microsoft", "relation": "INVESTED_IN", "tail": "OpenAI", "confidence": "high"},
  {"head": "Amazon", "relation": "PARTNERED_WITH", "tail": "NVIDIA", "confidence": "0.75",
   "head_type": "COMPANY"}
]"#,
            )
            .unwrap();

        assert_eq!(triplets.len(), 1);
        assert_eq!(triplets[0].head, "Amazon");
        assert_eq!(triplets[0].confidence, Some(0.75));
        assert_eq!(triplets[0].head_type.as_deref(), Some("COMPANY"));
        assert_eq!(triplets[0].tail_type, None);
    }

    #[test]
    fn test_malformed_response_is_error() {
        let extractor = LlmExtractor::new(Canned::boxed(""));
        assert!(matches!(
            extractor.parse_response("I could not find any relationships."),
            Err(FinkgError::Extraction(_))
        ));
        assert!(matches!(
            extractor.parse_response("[not json]"),
            Err(FinkgError::Extraction(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_recovers_from_malformed_response() {
        let extractor = LlmExtractor::new(Canned::boxed("no array here"));
        let triplets = extractor.extract("Apple acquired DarwinAI.").await.unwrap();
        assert!(triplets.is_empty());
    }

    #[test]
    fn test_prompts_fill_placeholders() {
        let extractor = LlmExtractor::new(Canned::boxed(""));
        let prompt = extractor.build_prompt("Apple acquired DarwinAI.");
        assert!(prompt.contains("Apple acquired DarwinAI."));
        assert!(prompt.contains("ACQUIRED, INVESTED_IN"));
        assert!(!prompt.contains("{text}"));

        let mut config = LlmExtractorConfig::default();
        config.few_shot = true;
        let extractor = LlmExtractor::with_config(Canned::boxed(""), config);
        let prompt = extractor.build_prompt("Tesla launched Model Y.");
        assert!(prompt.contains("Salesforce bought Slack"));
        assert!(!prompt.contains("{relation_types}"));
    }

    #[tokio::test]
    async fn test_translate_question_strips_fences() {
        let extractor = LlmExtractor::new(Canned::boxed(
            "```surql\nSELECT head, tail FROM relates WHERE kind = 'ACQUIRED' LIMIT 10\n```",
        ));
        let query = extractor
            .translate_question("Who bought what?")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            query,
            "SELECT head, tail FROM relates WHERE kind = 'ACQUIRED' LIMIT 10"
        );
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```\nRETURN 1\n```"), "RETURN 1");
        assert_eq!(strip_code_fences("  RETURN 1  "), "RETURN 1");
        assert_eq!(strip_code_fences("```RETURN 1```"), "RETURN 1");
        assert_eq!(strip_code_fences("```sql\nRETURN 1\n```"), "RETURN 1");
    }

    #[test]
    fn test_strip_code_fences_inline_language() {
        assert_eq!(
            strip_code_fences("```surql SELECT head FROM relates```"),
            "SELECT head FROM relates"
        );
        assert_eq!(
            strip_code_fences("```cypher MATCH (n) RETURN n\n```"),
            "MATCH (n) RETURN n"
        );
        assert_eq!(
            strip_code_fences("```SELECT head\nFROM relates```"),
            "SELECT head\nFROM relates"
        );
    }
}
