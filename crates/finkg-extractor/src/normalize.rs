//! Triplet normalization
//!
//! Turns raw extractor output into canonical triplets. The steps run in a
//! fixed order:
//!
//! 1. exact `(head, relation, tail)` deduplication, first occurrence wins
//! 2. confidence filter (inclusive; triplets without confidence pass)
//! 3. relation standardization through an ordered synonym table
//! 4. entity name cleaning
//! 5. relation whitelist
//! 6. self-loop removal
//! 7. entity type inference where no type was supplied
//! 8. stable sort by descending confidence
//!
//! Duplicates that only appear after standardization are kept; the graph
//! merge collapses them onto one edge.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use finkg_core::{CanonicalTriplet, EntityType, ExtractionConfig, PipelineConfig, RawTriplet};

// ============================================================================
// Relation Mapping
// ============================================================================

/// A relation synonym and its canonical name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMapping {
    pub synonym: String,
    pub canonical: String,
}

impl RelationMapping {
    pub fn new(synonym: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            synonym: synonym.into().trim().to_lowercase(),
            canonical: canonical.into(),
        }
    }

    /// Built-in financial relation vocabulary
    pub fn defaults() -> Vec<Self> {
        [
            ("acquired", "ACQUIRED"),
            ("acquisition", "ACQUIRED"),
            ("bought", "ACQUIRED"),
            ("purchased", "ACQUIRED"),
            ("invested in", "INVESTED_IN"),
            ("investment in", "INVESTED_IN"),
            ("funded", "INVESTED_IN"),
            ("launched", "LAUNCHED"),
            ("released", "LAUNCHED"),
            ("introduced", "LAUNCHED"),
            ("partnered with", "PARTNERED_WITH"),
            ("collaborated with", "PARTNERED_WITH"),
            ("ceo of", "CEO_OF"),
            ("chief executive officer of", "CEO_OF"),
            ("founded", "FOUNDED"),
            ("established", "FOUNDED"),
            ("created", "FOUNDED"),
        ]
        .into_iter()
        .map(|(synonym, canonical)| Self::new(synonym, canonical))
        .collect()
    }
}

/// Most specific first: longer synonyms, then alphabetical
fn sort_mappings(mappings: &mut [RelationMapping]) {
    mappings.sort_by(|a, b| {
        b.synonym
            .len()
            .cmp(&a.synonym.len())
            .then_with(|| a.synonym.cmp(&b.synonym))
    });
}

// ============================================================================
// Normalizer
// ============================================================================

/// Cleans raw triplets into the canonical table
#[derive(Debug, Clone)]
pub struct Normalizer {
    confidence_threshold: f64,
    valid_relations: HashSet<String>,
    mappings: Vec<RelationMapping>,
}

impl Normalizer {
    pub fn new<I, S>(confidence_threshold: f64, valid_relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut mappings = RelationMapping::defaults();
        sort_mappings(&mut mappings);

        Self {
            confidence_threshold,
            valid_relations: valid_relations.into_iter().map(Into::into).collect(),
            mappings,
        }
    }

    /// Create from config
    pub fn from_config(pipeline: &PipelineConfig, extraction: &ExtractionConfig) -> Self {
        Self::new(
            pipeline.confidence_threshold,
            extraction.relation_types.iter().cloned(),
        )
    }

    /// Add a synonym; the lookup order is re-derived
    pub fn with_mapping(mut self, mapping: RelationMapping) -> Self {
        self.mappings.retain(|m| m.synonym != mapping.synonym);
        self.mappings.push(mapping);
        sort_mappings(&mut self.mappings);
        self
    }

    pub fn mappings(&self) -> &[RelationMapping] {
        &self.mappings
    }

    /// Normalize a batch of raw triplets
    pub fn clean(&self, triplets: &[RawTriplet]) -> Vec<CanonicalTriplet> {
        let total = triplets.len();

        let mut seen = HashSet::new();
        let mut unique: Vec<&RawTriplet> = Vec::with_capacity(total);
        for t in triplets {
            if seen.insert((t.head.as_str(), t.relation.as_str(), t.tail.as_str())) {
                unique.push(t);
            }
        }
        let after_dedup = unique.len();

        let confident: Vec<&RawTriplet> = unique
            .into_iter()
            .filter(|t| t.confidence.map_or(true, |c| c >= self.confidence_threshold))
            .collect();
        let after_confidence = confident.len();

        let mut canonical: Vec<CanonicalTriplet> = confident
            .into_iter()
            .filter_map(|t| {
                let relation = self.standardize_relation(&t.relation);
                let head = clean_entity_name(&t.head);
                let tail = clean_entity_name(&t.tail);

                if head.is_empty() || tail.is_empty() {
                    return None;
                }
                if !self.valid_relations.contains(&relation) {
                    debug!(relation = %relation, "Dropping unknown relation");
                    return None;
                }
                if head == tail {
                    return None;
                }

                let head_type = supplied_type(t.head_type.as_deref())
                    .unwrap_or_else(|| infer_entity_type(&head).to_string());
                let tail_type = supplied_type(t.tail_type.as_deref())
                    .unwrap_or_else(|| infer_entity_type(&tail).to_string());

                Some(CanonicalTriplet {
                    head,
                    relation,
                    tail,
                    confidence: t.confidence,
                    head_type,
                    tail_type,
                })
            })
            .collect();

        canonical.sort_by(|a, b| compare_confidence_desc(a.confidence, b.confidence));

        info!(
            total,
            after_dedup,
            after_confidence,
            canonical = canonical.len(),
            "Normalized triplets"
        );
        canonical
    }

    /// Map a relation string onto the canonical vocabulary
    pub fn standardize_relation(&self, relation: &str) -> String {
        let lowered = relation.trim().to_lowercase();

        if let Some(mapping) = self.mappings.iter().find(|m| m.synonym == lowered) {
            return mapping.canonical.clone();
        }
        if let Some(mapping) = self
            .mappings
            .iter()
            .find(|m| lowered.contains(m.synonym.as_str()))
        {
            return mapping.canonical.clone();
        }

        relation.trim().to_uppercase()
    }
}

fn supplied_type(tag: Option<&str>) -> Option<String> {
    tag.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_uppercase)
}

/// Descending, `None` after every present value
fn compare_confidence_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ============================================================================
// Entity Names
// ============================================================================

/// Canonical form of an entity name
///
/// Whitespace runs collapse to one space and wrapping quotes are removed.
/// Names that are entirely upper- or lower-case are title-cased; mixed-case
/// names are kept as written.
pub fn clean_entity_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let unquoted = collapsed.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());

    if is_single_case(unquoted) {
        title_case(unquoted)
    } else {
        unquoted.to_string()
    }
}

fn is_single_case(s: &str) -> bool {
    let has_upper = s.chars().any(char::is_uppercase);
    let has_lower = s.chars().any(char::is_lowercase);
    has_upper != has_lower
}

/// Upper-case the first letter of each letter run, lower-case the rest
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;

    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }

    out
}

// ============================================================================
// Type Inference
// ============================================================================

const COMPANY_SUFFIXES: &[&str] = &["Inc", "Corp", "Ltd", "LLC", "Co", "Company", "Group"];

struct TypePatterns {
    date: Vec<Regex>,
    currency: Vec<Regex>,
}

fn type_patterns() -> &'static TypePatterns {
    static PATTERNS: OnceLock<TypePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
        };
        TypePatterns {
            date: compile(&[
                r"\b(?:19|20)\d{2}\b",
                r"\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+\d{4}\b",
            ]),
            currency: compile(&[
                r"\$\d+",
                r"(?i)\d+\s*(?:million|billion|trillion)",
                r"(?i)\b(?:USD|EUR)\b",
            ]),
        }
    })
}

fn is_person_name(name: &str) -> bool {
    let word = |w: &str| {
        let mut chars = w.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
            && w.len() > 1
            && chars.all(|c| c.is_ascii_lowercase())
    };

    let parts: Vec<&str> = name.split(' ').collect();
    parts.len() == 2 && parts.iter().all(|p| word(p))
}

/// Classify a cleaned entity name; the first matching category wins
pub fn infer_entity_type(name: &str) -> EntityType {
    let is_company = name
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '.' || c == ','))
        .any(|token| COMPANY_SUFFIXES.contains(&token));
    if is_company {
        return EntityType::Company;
    }

    if is_person_name(name) {
        return EntityType::Person;
    }

    let patterns = type_patterns();
    if patterns.date.iter().any(|r| r.is_match(name)) {
        return EntityType::Date;
    }
    if patterns.currency.iter().any(|r| r.is_match(name)) {
        return EntityType::Currency;
    }

    EntityType::Entity
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn normalizer() -> Normalizer {
        Normalizer::from_config(&PipelineConfig::default(), &ExtractionConfig::default())
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let triplets = vec![
            RawTriplet::new("Apple", "ACQUIRED", "DarwinAI").with_confidence(0.9),
            RawTriplet::new("Apple", "ACQUIRED", "DarwinAI").with_confidence(0.5),
        ];
        let cleaned = normalizer().clean(&triplets);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].confidence, Some(0.9));
    }

    #[test]
    fn test_dedup_runs_before_confidence_filter() {
        // The low-confidence copy is a duplicate, so the first copy must survive alone
        let triplets = vec![
            RawTriplet::new("Apple", "ACQUIRED", "DarwinAI").with_confidence(0.5),
            RawTriplet::new("Apple", "ACQUIRED", "DarwinAI").with_confidence(0.9),
        ];
        assert!(normalizer().clean(&triplets).is_empty());
    }

    #[test]
    fn test_confidence_threshold_inclusive() {
        let triplets = vec![
            RawTriplet::new("Apple", "ACQUIRED", "DarwinAI").with_confidence(0.6),
            RawTriplet::new("Microsoft", "INVESTED_IN", "OpenAI").with_confidence(0.7),
            RawTriplet::new("Tesla", "LAUNCHED", "Model Y"),
        ];
        let cleaned = normalizer().clean(&triplets);
        let heads: Vec<&str> = cleaned.iter().map(|t| t.head.as_str()).collect();
        assert_eq!(heads, vec!["Microsoft", "Tesla"]);
    }

    #[test]
    fn test_relation_standardization() {
        let n = normalizer();
        assert_eq!(n.standardize_relation("acquired"), "ACQUIRED");
        assert_eq!(n.standardize_relation("bought"), "ACQUIRED");
        assert_eq!(n.standardize_relation("ACQUISITION"), "ACQUIRED");
        assert_eq!(n.standardize_relation("  has invested in  "), "INVESTED_IN");
        assert_eq!(n.standardize_relation("is the chief executive officer of"), "CEO_OF");
        assert_eq!(n.standardize_relation("merged with"), "MERGED WITH");
    }

    #[test]
    fn test_mapping_order_is_most_specific_first() {
        let n = normalizer();
        let first = &n.mappings()[0];
        assert_eq!(first.synonym, "chief executive officer of");

        let n = n.with_mapping(RelationMapping::new("co-founded", "FOUNDED"));
        let pos_long = n.mappings().iter().position(|m| m.synonym == "co-founded");
        let pos_short = n.mappings().iter().position(|m| m.synonym == "founded");
        assert!(pos_long < pos_short);
    }

    #[test]
    fn test_unknown_relation_dropped() {
        let triplets = vec![RawTriplet::new("Exxon", "merged with", "Mobil").with_confidence(0.9)];
        assert!(normalizer().clean(&triplets).is_empty());
    }

    #[test]
    fn test_self_loop_removed() {
        let triplets = vec![
            RawTriplet::new("Apple", "FOUNDED", "Apple").with_confidence(1.0),
            RawTriplet::new("apple", "FOUNDED", "APPLE").with_confidence(1.0),
        ];
        assert!(normalizer().clean(&triplets).is_empty());
    }

    #[test]
    fn test_entity_cleaning() {
        assert_eq!(clean_entity_name("  \"Model   Y\" "), "Model Y");
        assert_eq!(clean_entity_name("DARWINAI"), "Darwinai");
        assert_eq!(clean_entity_name("tim cook"), "Tim Cook");
        assert_eq!(clean_entity_name("DarwinAI"), "DarwinAI");
        assert_eq!(clean_entity_name("'OpenAI'"), "OpenAI");
        assert_eq!(clean_entity_name("\"\""), "");
    }

    #[test]
    fn test_type_inference() {
        assert_eq!(infer_entity_type("Tim Cook"), EntityType::Person);
        assert_eq!(infer_entity_type("Apple Inc"), EntityType::Company);
        assert_eq!(infer_entity_type("Berkshire Hathaway Group"), EntityType::Company);
        assert_eq!(infer_entity_type("$100 million"), EntityType::Currency);
        assert_eq!(infer_entity_type("January 2024"), EntityType::Date);
        assert_eq!(infer_entity_type("DarwinAI"), EntityType::Entity);
        assert_eq!(infer_entity_type("Corpus"), EntityType::Entity);
    }

    #[test]
    fn test_supplied_types_kept() {
        let triplets = vec![RawTriplet::new("Apple", "LAUNCHED", "Vision Pro")
            .with_confidence(0.9)
            .with_types(" company ", "product")];
        let cleaned = normalizer().clean(&triplets);
        assert_eq!(cleaned[0].head_type, "COMPANY");
        assert_eq!(cleaned[0].tail_type, "PRODUCT");
    }

    #[test]
    fn test_sorted_by_confidence_missing_last() {
        let triplets = vec![
            RawTriplet::new("Tesla", "LAUNCHED", "Model Y"),
            RawTriplet::new("Apple", "ACQUIRED", "DarwinAI").with_confidence(0.8),
            RawTriplet::new("Microsoft", "INVESTED_IN", "OpenAI").with_confidence(0.95),
            RawTriplet::new("Amazon", "PARTNERED_WITH", "NVIDIA").with_confidence(0.8),
        ];
        let cleaned = normalizer().clean(&triplets);
        let heads: Vec<&str> = cleaned.iter().map(|t| t.head.as_str()).collect();
        assert_eq!(heads, vec!["Microsoft", "Apple", "Amazon", "Tesla"]);
    }

    #[test]
    fn test_canonical_duplicates_kept() {
        let triplets = vec![
            RawTriplet::new("Apple", "acquired", "DarwinAI").with_confidence(0.9),
            RawTriplet::new("Apple", "bought", "DarwinAI").with_confidence(0.85),
        ];
        assert_eq!(normalizer().clean(&triplets).len(), 2);
    }

    fn relation_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("acquired".to_string()),
            Just("BOUGHT".to_string()),
            Just("invested in".to_string()),
            Just("LAUNCHED".to_string()),
            Just("merged with".to_string()),
            Just("ceo of".to_string()),
        ]
    }

    fn triplet_strategy() -> impl Strategy<Value = RawTriplet> {
        (
            "[A-Za-z ]{0,12}",
            relation_strategy(),
            "[A-Za-z ]{0,12}",
            proptest::option::of(0.0f64..=1.0),
        )
            .prop_map(|(head, relation, tail, confidence)| RawTriplet {
                head,
                relation,
                tail,
                confidence,
                head_type: None,
                tail_type: None,
            })
    }

    proptest! {
        #[test]
        fn prop_output_satisfies_invariants(triplets in proptest::collection::vec(triplet_strategy(), 0..40)) {
            let n = normalizer();
            let cleaned = n.clean(&triplets);

            prop_assert!(cleaned.len() <= triplets.len());
            for t in &cleaned {
                prop_assert!(!t.head.is_empty() && !t.tail.is_empty());
                prop_assert_ne!(&t.head, &t.tail);
                prop_assert!(ExtractionConfig::default().relation_types.contains(&t.relation));
                prop_assert!(t.confidence.map_or(true, |c| c >= 0.7));
            }
        }

        #[test]
        fn prop_output_sorted_by_confidence(triplets in proptest::collection::vec(triplet_strategy(), 0..40)) {
            let cleaned = normalizer().clean(&triplets);
            for pair in cleaned.windows(2) {
                prop_assert_ne!(
                    compare_confidence_desc(pair[0].confidence, pair[1].confidence),
                    Ordering::Greater
                );
            }
        }

        #[test]
        fn prop_entity_cleaning_is_idempotent(name in "[A-Za-z\"' ]{0,20}") {
            let once = clean_entity_name(&name);
            prop_assert_eq!(clean_entity_name(&once), once.clone());
        }
    }
}
