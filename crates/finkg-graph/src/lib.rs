//! finkg Graph - Knowledge graph store
//!
//! Idempotent materialization of canonical triplets into a labeled property
//! graph, plus aggregate statistics and row-returning query execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use finkg_core::{CanonicalTriplet, GraphQuery, GraphStats, Params, Result, Row};

pub mod surrealdb_store;

pub use surrealdb_store::SurrealGraphStore;

/// Outcome of a [`GraphStore::build`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub batches_total: usize,
    pub batches_failed: usize,
    pub triplets_imported: usize,
}

/// Trait for graph database operations
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create constraints and indexes; safe to call repeatedly
    async fn ensure_schema(&self) -> Result<()>;

    /// Delete every node and edge
    async fn clear(&self) -> Result<()>;

    /// Upsert one batch of triplets atomically
    async fn import_batch(&self, batch: &[CanonicalTriplet]) -> Result<()>;

    /// Aggregate counts computed from the live graph
    async fn stats(&self) -> Result<GraphStats>;

    /// Run a query and return the rows of its last statement
    async fn query(&self, query: &str, params: &Params) -> Result<Vec<Row>>;

    /// Records per import batch
    fn import_batch_size(&self) -> usize {
        100
    }

    /// Materialize a canonical table
    ///
    /// A failed batch is logged and skipped; the remaining batches still run.
    async fn build(&self, triplets: &[CanonicalTriplet], clear_existing: bool) -> Result<BuildReport> {
        if triplets.is_empty() {
            warn!("No triplets to import");
            return Ok(BuildReport::default());
        }

        if clear_existing {
            self.clear().await?;
        }
        self.ensure_schema().await?;

        let mut report = BuildReport::default();
        for (index, batch) in triplets.chunks(self.import_batch_size().max(1)).enumerate() {
            report.batches_total += 1;
            match self.import_batch(batch).await {
                Ok(()) => {
                    report.triplets_imported += batch.len();
                    info!(batch = index + 1, size = batch.len(), "Imported batch");
                }
                Err(e) => {
                    report.batches_failed += 1;
                    warn!(batch = index + 1, error = %e, "Batch import failed, continuing");
                }
            }
        }

        info!(
            imported = report.triplets_imported,
            failed_batches = report.batches_failed,
            "Graph build complete"
        );
        Ok(report)
    }

    /// Like [`GraphStore::query`], but a failure is logged and yields no rows
    async fn execute(&self, query: &str, params: &Params) -> Vec<Row> {
        match self.query(query, params).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Query failed");
                Vec::new()
            }
        }
    }

    /// Execute a translated question
    async fn run(&self, query: &GraphQuery) -> Vec<Row> {
        self.execute(&query.text, &query.params).await
    }
}
