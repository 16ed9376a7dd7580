//! finkg Extractor - Knowledge extraction pipeline
//!
//! Turns raw news text into canonical triplets:
//! - Preprocessing: text cleanup and sentence splitting
//! - Extraction: regex patterns or a prompted language model
//! - Normalization: dedup, confidence filtering, relation and entity
//!   standardization, type inference
//! - Export: the canonical table as CSV for audit between stages

pub mod export;
pub mod llm;
pub mod normalize;
pub mod pattern;
pub mod preprocess;

pub use export::{read_triplets_csv, write_triplets_csv};
pub use llm::{strip_code_fences, LlmExtractor, LlmExtractorConfig};
pub use normalize::{clean_entity_name, infer_entity_type, title_case, Normalizer, RelationMapping};
pub use pattern::{PatternExtractor, PatternRule};
pub use preprocess::Preprocessor;
