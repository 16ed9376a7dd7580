//! Rule-based relation extraction
//!
//! Regex rules per relation type. Each rule captures a `head` and a `tail`
//! group; a rule may be marked as swapped when the sentence names the tail
//! first ("Google's CEO Sundar Pichai").

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use finkg_core::{Extractor, FinkgError, RawTriplet, Result};

/// One or more capitalized words
const NAME: &str = r"[A-Z][\w&.-]*(?:\s+[A-Z][\w&.-]*)*";

/// Two or more capitalized words, as in a person's name
const PERSON: &str = r"[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+";

/// Free-text span ending at a preposition, clause punctuation or end of text
const TAIL: &str = r"(?P<tail>[\w$&.-]+(?:\s+[\w$&.-]+)*?)(?:\s+(?i:for|in|to|with|by|at|on|from|as|and)\b|[,;!?]|\.(?:\s|$)|$)";

// ============================================================================
// Pattern Rules
// ============================================================================

/// A single extraction rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub relation: String,
    pub regex: Regex,
    pub confidence: f64,
    /// The `head` group names the relation's tail and vice versa
    pub swapped: bool,
}

impl PatternRule {
    /// Compile a rule; the pattern must define `head` and `tail` groups
    pub fn new(pattern: &str, relation: impl Into<String>, confidence: f64) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| FinkgError::Extraction(format!("Invalid pattern {pattern:?}: {e}")))?;

        let names: Vec<&str> = regex.capture_names().flatten().collect();
        if !names.contains(&"head") || !names.contains(&"tail") {
            return Err(FinkgError::Extraction(format!(
                "Pattern {pattern:?} needs head and tail groups"
            )));
        }

        Ok(Self {
            relation: relation.into(),
            regex,
            confidence,
            swapped: false,
        })
    }

    pub fn swapped(mut self) -> Self {
        self.swapped = true;
        self
    }
}

// ============================================================================
// Pattern Extractor
// ============================================================================

/// Extracts financial relations with regular expressions
pub struct PatternExtractor {
    rules: Vec<PatternRule>,
    /// Trailing clauses removed from a captured tail
    tail_cleanup: Vec<Regex>,
    leading_determiner: Option<Regex>,
}

impl PatternExtractor {
    /// Create an extractor with the default financial news rules
    pub fn new() -> Self {
        let mut extractor = Self {
            rules: Vec::new(),
            tail_cleanup: [
                r"(?i)\s+(?:in|for|by|with|at)\s+\d{4}.*",
                r"\s+\$[\d.]+\s*\w*.*",
            ]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
            leading_determiner: Regex::new(r"(?i)^(?:(?:the|a|an|its|their)\s+)?(?:new\s+)?")
                .ok(),
        };

        extractor.init_financial_rules();
        extractor
    }

    /// Create an extractor with no rules
    pub fn empty() -> Self {
        let mut extractor = Self::new();
        extractor.rules.clear();
        extractor
    }

    /// Append a rule
    pub fn with_rule(mut self, rule: PatternRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    fn init_financial_rules(&mut self) {
        self.add_rule(
            &format!(r"(?P<head>{NAME})\s+(?i:acquired|bought|purchased)\s+{TAIL}"),
            "ACQUIRED",
            0.9,
            false,
        );
        self.add_rule(
            &format!(
                r"(?P<head>{NAME})\s+(?i:invested)\s+(?:\$?[\d.,]+\s*(?i:million|billion|trillion)?\s+)?(?i:in)\s+{TAIL}"
            ),
            "INVESTED_IN",
            0.85,
            false,
        );
        self.add_rule(
            &format!(r"(?P<head>{NAME})\s+(?i:launched|released|introduced|unveiled)\s+{TAIL}"),
            "LAUNCHED",
            0.85,
            false,
        );
        self.add_rule(
            &format!(r"(?P<head>{NAME})\s+(?i:founded|established|co-founded)\s+{TAIL}"),
            "FOUNDED",
            0.8,
            false,
        );
        self.add_rule(
            &format!(r"(?P<head>{PERSON})\s+(?i:is|was|became)\s+(?:(?i:the)\s+)?(?i:ceo|chief executive officer)\s+(?i:of)\s+{TAIL}"),
            "CEO_OF",
            0.9,
            false,
        );
        // "Google's CEO Sundar Pichai"; the preprocessor turns the apostrophe into a space
        self.add_rule(
            &format!(r"(?P<head>{NAME})(?:'s|\s+s)?\s+(?i:ceo)\s+(?P<tail>{PERSON})"),
            "CEO_OF",
            0.85,
            true,
        );
        self.add_rule(
            &format!(r"(?P<head>{NAME})\s+(?i:partnered|collaborated|teamed\s+up)\s+(?i:with)\s+{TAIL}"),
            "PARTNERED_WITH",
            0.8,
            false,
        );
    }

    fn add_rule(&mut self, pattern: &str, relation: &str, confidence: f64, swapped: bool) {
        if let Ok(rule) = PatternRule::new(pattern, relation, confidence) {
            self.rules
                .push(if swapped { rule.swapped() } else { rule });
        }
    }

    fn clean_tail(&self, tail: &str) -> String {
        let mut tail = tail.to_string();
        for regex in &self.tail_cleanup {
            tail = regex.replace(&tail, "").into_owned();
        }
        if let Some(regex) = &self.leading_determiner {
            tail = regex.replace(&tail, "").into_owned();
        }
        tail.trim_matches(|c: char| c == '.' || c == ',' || c.is_whitespace())
            .to_string()
    }

    /// Run every rule over the text
    pub fn extract_sync(&self, text: &str) -> Vec<RawTriplet> {
        let mut triplets = Vec::new();

        for rule in &self.rules {
            for caps in rule.regex.captures_iter(text) {
                let (Some(head), Some(tail)) = (caps.name("head"), caps.name("tail")) else {
                    continue;
                };

                let head = head.as_str().trim().to_string();
                let tail = self.clean_tail(tail.as_str());
                if head.is_empty() || tail.is_empty() || head == tail {
                    continue;
                }

                let (head, tail) = if rule.swapped { (tail, head) } else { (head, tail) };
                triplets.push(
                    RawTriplet::new(head, rule.relation.clone(), tail)
                        .with_confidence(rule.confidence),
                );
            }
        }

        debug!(count = triplets.len(), "Pattern extraction complete");
        triplets
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PatternExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<RawTriplet>> {
        Ok(self.extract_sync(text))
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

// ============================================================================
// Tests
// ============================================================================
