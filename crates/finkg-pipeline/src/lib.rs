//! finkg Pipeline - Orchestration from news text to a queryable graph
//!
//! Stages run in order and each must produce a non-empty result before the
//! next starts: Preprocess → Extract → Clean → Build → Query-ready.
//!
//! Author: hephaex@gmail.com

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use finkg_core::{
    AppConfig, CanonicalTriplet, ExtractionMode, Extractor, FinkgError, GraphStats, RawTriplet,
    Result, Row,
};
use finkg_extractor::{
    read_triplets_csv, write_triplets_csv, LlmExtractor, LlmExtractorConfig, Normalizer, PatternExtractor,
    Preprocessor,
};
use finkg_graph::{BuildReport, GraphStore, SurrealGraphStore};
use finkg_llm::create_llm_client;
use finkg_query::{QueryEngine, QueryTranslator};

// ============================================================================
// Stages and Reports
// ============================================================================

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Extract,
    Clean,
    Build,
    QueryReady,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Preprocess => "preprocess",
            Self::Extract => "extract",
            Self::Clean => "clean",
            Self::Build => "build",
            Self::QueryReady => "query_ready",
        };
        f.write_str(name)
    }
}

/// Row count for one smoke-test question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleResult {
    pub question: String,
    pub rows: usize,
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sentences: usize,
    pub raw_triplets: usize,
    pub canonical_triplets: usize,
    pub build: BuildReport,
    pub stats: GraphStats,
    pub sample_results: Vec<SampleResult>,
}

// ============================================================================
// Component Factories
// ============================================================================

/// Construct the extractor selected by `extraction.mode`
pub fn build_extractor(config: &AppConfig) -> Result<Arc<dyn Extractor>> {
    match config.extraction.mode {
        ExtractionMode::Pattern => Ok(Arc::new(PatternExtractor::new())),
        ExtractionMode::Llm => Ok(Arc::new(llm_extractor(config)?)),
    }
}

fn llm_extractor(config: &AppConfig) -> Result<LlmExtractor> {
    let client = create_llm_client(&config.llm)?;
    Ok(LlmExtractor::with_config(
        client,
        LlmExtractorConfig::from_extraction(&config.extraction),
    ))
}

// ============================================================================
// Pipeline
// ============================================================================

/// Knowledge graph pipeline
pub struct Pipeline {
    config: AppConfig,
    preprocessor: Preprocessor,
    extractor: Arc<dyn Extractor>,
    normalizer: Normalizer,
    store: Arc<dyn GraphStore>,
    engine: QueryEngine,
}

impl Pipeline {
    /// Build every component from config and connect to the graph store
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let extractor = build_extractor(&config)?;
        let store = SurrealGraphStore::connect(&config.database, &config.graph).await?;

        let query_model = if !config.query.use_llm {
            None
        } else if config.extraction.mode == ExtractionMode::Llm {
            Some(extractor.clone())
        } else {
            match llm_extractor(&config) {
                Ok(model) => Some(Arc::new(model) as Arc<dyn Extractor>),
                Err(e) => {
                    warn!(error = %e, "Model query translation unavailable");
                    None
                }
            }
        };

        let pipeline = Self::with_components(config, extractor, Arc::new(store));
        Ok(match query_model {
            Some(model) => pipeline.with_query_model(model),
            None => pipeline,
        })
    }

    /// Assemble a pipeline from existing components
    pub fn with_components(
        config: AppConfig,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn GraphStore>,
    ) -> Self {
        let engine = QueryEngine::new(QueryTranslator::new(&config.query), store.clone());
        Self {
            preprocessor: Preprocessor::new(&config.pipeline),
            normalizer: Normalizer::from_config(&config.pipeline, &config.extraction),
            config,
            extractor,
            store,
            engine,
        }
    }

    /// Allow model-backed question translation
    pub fn with_query_model(mut self, model: Arc<dyn Extractor>) -> Self {
        let translator = QueryTranslator::new(&self.config.query).with_model(model);
        self.engine = QueryEngine::new(translator, self.store.clone());
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Run every stage on a text file
    pub async fn run(&self, input: &Path, clear_existing: bool) -> Result<RunReport> {
        info!(stage = %Stage::Preprocess, input = %input.display(), "Starting pipeline");
        let sentences = self.preprocessor.preprocess_file(input)?;
        self.run_sentences(sentences, clear_existing).await
    }

    /// Run every stage on in-memory text
    pub async fn run_text(&self, text: &str, clear_existing: bool) -> Result<RunReport> {
        info!(stage = %Stage::Preprocess, "Starting pipeline");
        let sentences = self.preprocessor.preprocess_text(text);
        self.run_sentences(sentences, clear_existing).await
    }

    async fn run_sentences(&self, sentences: Vec<String>, clear_existing: bool) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        if sentences.is_empty() {
            return Err(FinkgError::Input("No sentences found in input".to_string()));
        }

        info!(stage = %Stage::Extract, %run_id, sentences = sentences.len(), "Extracting triplets");
        let raw = self.extract_all(&sentences).await;

        info!(stage = %Stage::Clean, %run_id, raw = raw.len(), "Cleaning triplets");
        let canonical = self.normalizer.clean(&raw);
        if canonical.is_empty() {
            return Err(FinkgError::NoValidTriplets);
        }

        let export_path = &self.config.pipeline.export_path;
        if let Err(e) = write_triplets_csv(export_path, &canonical) {
            warn!(path = %export_path.display(), error = %e, "Triplet export failed");
        }

        let (sentences, raw) = (sentences.len(), raw.len());
        self.build_and_verify(run_id, started_at, sentences, raw, &canonical, clear_existing)
            .await
    }

    /// Build from a previously exported canonical table, skipping extraction
    pub async fn run_table(&self, table: &Path, clear_existing: bool) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(stage = %Stage::Clean, %run_id, table = %table.display(), "Loading canonical table");
        let canonical = read_triplets_csv(table)?;
        if canonical.is_empty() {
            return Err(FinkgError::NoValidTriplets);
        }

        self.build_and_verify(run_id, started_at, 0, 0, &canonical, clear_existing)
            .await
    }

    async fn build_and_verify(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        sentences: usize,
        raw_triplets: usize,
        canonical: &[CanonicalTriplet],
        clear_existing: bool,
    ) -> Result<RunReport> {
        info!(stage = %Stage::Build, %run_id, triplets = canonical.len(), "Building graph");
        let build = self.store.build(canonical, clear_existing).await?;

        let stats = match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Graph statistics unavailable");
                GraphStats::default()
            }
        };
        info!(
            stage = %Stage::QueryReady,
            %run_id,
            nodes = stats.total_nodes,
            relationships = stats.total_relationships,
            "Graph ready"
        );

        let mut sample_results = Vec::with_capacity(self.config.pipeline.sample_questions.len());
        for question in &self.config.pipeline.sample_questions {
            let rows = self.engine.ask(question).await;
            info!(question = %question, rows = rows.len(), "Sample query");
            sample_results.push(SampleResult {
                question: question.clone(),
                rows: rows.len(),
            });
        }

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sentences,
            raw_triplets,
            canonical_triplets: canonical.len(),
            build,
            stats,
            sample_results,
        })
    }

    /// Extract sentence by sentence; a failing sentence contributes nothing
    async fn extract_all(&self, sentences: &[String]) -> Vec<RawTriplet> {
        let mut triplets = Vec::new();
        let batches = self.preprocessor.batch_sentences(sentences, None);
        let total = batches.len();

        for (index, batch) in batches.iter().enumerate() {
            for sentence in batch {
                match self.extractor.extract(sentence).await {
                    Ok(found) => triplets.extend(found),
                    Err(e) => warn!(extractor = self.extractor.name(), error = %e, "Extraction failed"),
                }
            }
            info!(batch = index + 1, total, triplets = triplets.len(), "Extracted batch");
        }

        triplets
    }

    /// Answer a question with the configured translation settings
    pub async fn ask(&self, question: &str) -> Vec<Row> {
        self.engine.ask(question).await
    }

    /// Answer a question, choosing whether model translation may run
    pub async fn ask_with(&self, question: &str, use_model: bool) -> Vec<Row> {
        self.engine.ask_with(question, use_model).await
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::QueryReady.to_string(), "query_ready");
        assert_eq!(Stage::Preprocess.to_string(), "preprocess");
    }

    #[test]
    fn test_build_extractor_by_mode() {
        let config = AppConfig::default();
        assert_eq!(build_extractor(&config).unwrap().name(), "pattern");

        let mut config = AppConfig::default();
        config.extraction.mode = ExtractionMode::Llm;
        config.llm.openai_api_key = None;
        assert!(build_extractor(&config).is_err());

        config.llm.openai_api_key = Some("sk-test".to_string());
        assert_eq!(build_extractor(&config).unwrap().name(), "llm");
    }
}
