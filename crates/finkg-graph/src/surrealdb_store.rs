//! SurrealDB implementation for graph storage
//!
//! Entities are records in `entity` keyed by canonical name; relationships
//! are `relates` edges with the endpoint names copied onto the edge so they
//! can be filtered without a join.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{debug, info};

use finkg_core::{
    CanonicalTriplet, DatabaseConfig, EdgeConflictPolicy, FinkgError, GraphConfig, GraphStats,
    Params, Result, Row, EXTRACTED_SOURCE,
};

use crate::GraphStore;

const SCHEMA: &[&str] = &[
    "DEFINE TABLE IF NOT EXISTS entity SCHEMALESS",
    "DEFINE INDEX IF NOT EXISTS entity_name ON TABLE entity FIELDS name UNIQUE",
    "DEFINE INDEX IF NOT EXISTS entity_labels ON TABLE entity FIELDS labels",
    "DEFINE INDEX IF NOT EXISTS entity_kind ON TABLE entity FIELDS kind",
    "DEFINE TABLE IF NOT EXISTS relates SCHEMALESS",
    "DEFINE INDEX IF NOT EXISTS relates_identity ON TABLE relates FIELDS head, kind, tail UNIQUE",
];

/// Upserts both endpoints, unions their labels, then updates or creates the edge.
/// `{confidence}` is replaced by the edge policy's confidence expression.
const IMPORT_BATCH: &str = r#"
BEGIN TRANSACTION;
FOR $row IN $rows {
    LET $h = type::thing('entity', $row.head);
    LET $t = type::thing('entity', $row.tail);
    UPSERT $h SET name = $row.head, kind = $row.head_type, labels = array::union(labels ?? [], [$row.head_type]);
    UPSERT $t SET name = $row.tail, kind = $row.tail_type, labels = array::union(labels ?? [], [$row.tail_type]);
    LET $existing = (SELECT VALUE id FROM relates WHERE head = $row.head AND kind = $row.relation AND tail = $row.tail);
    IF array::len($existing) > 0 {
        UPDATE $existing SET confidence = {confidence}, source = $row.source, created = time::now();
    } ELSE {
        RELATE $h->relates->$t SET head = $row.head, tail = $row.tail, kind = $row.relation, confidence = $row.confidence, source = $row.source, created = time::now();
    };
};
COMMIT TRANSACTION;
"#;

const STATS: &str = r#"
RETURN array::len((SELECT VALUE id FROM entity));
RETURN array::len(array::distinct(array::flatten((SELECT VALUE labels FROM entity))));
RETURN array::len((SELECT VALUE id FROM relates));
RETURN array::len(array::distinct((SELECT VALUE kind FROM relates)));
"#;

/// One triplet as bound into the import transaction
#[derive(Debug, Clone, Serialize)]
struct ImportRow {
    head: String,
    relation: String,
    tail: String,
    confidence: f64,
    head_type: String,
    tail_type: String,
    source: &'static str,
}

impl From<&CanonicalTriplet> for ImportRow {
    fn from(t: &CanonicalTriplet) -> Self {
        Self {
            head: t.head.clone(),
            relation: t.relation.clone(),
            tail: t.tail.clone(),
            confidence: t.effective_confidence(),
            head_type: t.head_type.clone(),
            tail_type: t.tail_type.clone(),
            source: EXTRACTED_SOURCE,
        }
    }
}

fn store_error(context: &str) -> impl Fn(surrealdb::Error) -> FinkgError + '_ {
    move |e| FinkgError::Store(format!("{context}: {e}"))
}

/// SurrealDB graph store implementation
pub struct SurrealGraphStore {
    client: Surreal<Any>,
    import_batch_size: usize,
    edge_policy: EdgeConflictPolicy,
}

impl SurrealGraphStore {
    /// Connect to the configured endpoint (`ws://`, `wss://`, `http://` or `mem://`)
    ///
    /// Fails fast when the server is unreachable; there are no retries.
    pub async fn connect(database: &DatabaseConfig, graph: &GraphConfig) -> Result<Self> {
        let client = connect(database.surrealdb_url.as_str())
            .await
            .map_err(store_error("SurrealDB connection failed"))?;

        // The embedded engine has no users to authenticate against
        let embedded = database.surrealdb_url.starts_with("mem://");
        if !embedded && !database.surrealdb_user.is_empty() {
            client
                .signin(Root {
                    username: &database.surrealdb_user,
                    password: &database.surrealdb_pass,
                })
                .await
                .map_err(store_error("SurrealDB auth failed"))?;
        }

        client
            .use_ns(&database.surrealdb_namespace)
            .use_db(&database.surrealdb_database)
            .await
            .map_err(store_error("SurrealDB namespace error"))?;

        let store = Self {
            client,
            import_batch_size: graph.import_batch_size.max(1),
            edge_policy: graph.edge_policy,
        };
        store.verify_connectivity().await?;

        info!(url = %database.surrealdb_url, "Connected to SurrealDB");
        Ok(store)
    }

    /// Fresh embedded in-memory graph
    pub async fn in_memory(graph: &GraphConfig) -> Result<Self> {
        let database = DatabaseConfig {
            surrealdb_url: "mem://".to_string(),
            ..DatabaseConfig::default()
        };
        Self::connect(&database, graph).await
    }

    async fn verify_connectivity(&self) -> Result<()> {
        let mut response = self
            .client
            .query("RETURN 1")
            .await
            .map_err(store_error("Connectivity check failed"))?;

        let answer: Option<i64> = response
            .take(0)
            .map_err(store_error("Connectivity check failed"))?;

        match answer {
            Some(1) => Ok(()),
            other => Err(FinkgError::Store(format!(
                "Connectivity check returned {other:?}"
            ))),
        }
    }

    fn import_query(&self) -> String {
        let confidence = match self.edge_policy {
            EdgeConflictPolicy::LastWriteWins => "$row.confidence",
            EdgeConflictPolicy::KeepHighestConfidence => {
                "math::max([confidence ?? 0, $row.confidence])"
            }
        };
        IMPORT_BATCH.replace("{confidence}", confidence)
    }
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            let result = match self.client.query(*statement).await {
                Ok(response) => response.check().map(|_| ()),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {}
                Err(e) if e.to_string().contains("already exists") => {
                    debug!(statement, "Schema element already exists");
                }
                Err(e) => return Err(FinkgError::Store(format!("Schema init failed: {e}"))),
            }
        }

        info!("Graph schema ensured");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.client
            .query("DELETE relates; DELETE entity;")
            .await
            .and_then(|response| response.check())
            .map_err(store_error("Clear failed"))?;

        info!("Cleared graph");
        Ok(())
    }

    async fn import_batch(&self, batch: &[CanonicalTriplet]) -> Result<()> {
        let rows: Vec<ImportRow> = batch.iter().map(ImportRow::from).collect();

        self.client
            .query(self.import_query())
            .bind(("rows", rows))
            .await
            .and_then(|response| response.check())
            .map_err(store_error("Batch import failed"))?;

        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let mut response = self
            .client
            .query(STATS)
            .await
            .and_then(|response| response.check())
            .map_err(store_error("Stats query failed"))?;

        let mut counts = [0u64; 4];
        for (index, count) in counts.iter_mut().enumerate() {
            let value: Option<i64> = response
                .take(index)
                .map_err(store_error("Stats extraction failed"))?;
            *count = value.unwrap_or(0).max(0) as u64;
        }

        Ok(GraphStats {
            total_nodes: counts[0],
            unique_labels: counts[1],
            total_relationships: counts[2],
            unique_relationship_types: counts[3],
        })
    }

    async fn query(&self, query: &str, params: &Params) -> Result<Vec<Row>> {
        let mut request = self.client.query(query);
        for (key, value) in params {
            request = request.bind((key.clone(), value.clone()));
        }

        let mut response = request
            .await
            .and_then(|response| response.check())
            .map_err(store_error("Query failed"))?;

        let statements = response.num_statements();
        if statements == 0 {
            return Ok(Vec::new());
        }

        // Record ids have no serde_json form; the core value renders them as strings
        let result: surrealdb::Value = response
            .take(statements - 1)
            .map_err(store_error("Result extraction failed"))?;
        let values = match result.into_inner().into_json() {
            Value::Array(values) => values,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        Ok(values
            .into_iter()
            .map(|value| match value {
                Value::Object(row) => row,
                other => {
                    let mut row = Row::new();
                    row.insert("value".to_string(), other);
                    row
                }
            })
            .collect())
    }

    fn import_batch_size(&self) -> usize {
        self.import_batch_size
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn triplet(head: &str, relation: &str, tail: &str, confidence: Option<f64>) -> CanonicalTriplet {
        CanonicalTriplet {
            head: head.to_string(),
            relation: relation.to_string(),
            tail: tail.to_string(),
            confidence,
            head_type: "ENTITY".to_string(),
            tail_type: "ENTITY".to_string(),
        }
    }

    fn sample() -> Vec<CanonicalTriplet> {
        vec![
            triplet("Apple", "ACQUIRED", "DarwinAI", Some(0.9)),
            triplet("Microsoft", "INVESTED_IN", "OpenAI", Some(0.85)),
            triplet("Tesla", "LAUNCHED", "Model Y", None),
        ]
    }

    async fn store() -> SurrealGraphStore {
        SurrealGraphStore::in_memory(&GraphConfig::default())
            .await
            .unwrap()
    }

    async fn edge_confidence(store: &SurrealGraphStore, head: &str) -> f64 {
        let params: Params = [("head".to_string(), json!(head))].into_iter().collect();
        let rows = store
            .query("SELECT confidence FROM relates WHERE head = $head", &params)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        rows[0]["confidence"].as_f64().unwrap()
    }

    #[tokio::test]
    async fn test_build_and_stats() {
        let store = store().await;
        let report = store.build(&sample(), false).await.unwrap();
        assert_eq!(report.triplets_imported, 3);
        assert_eq!(report.batches_failed, 0);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_nodes, 6);
        assert_eq!(stats.unique_labels, 1);
        assert_eq!(stats.total_relationships, 3);
        assert_eq!(stats.unique_relationship_types, 3);
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let store = store().await;
        store.build(&sample(), false).await.unwrap();
        let first = store.stats().await.unwrap();

        store.build(&sample(), false).await.unwrap();
        assert_eq!(store.stats().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_small_batches() {
        let graph = GraphConfig {
            import_batch_size: 2,
            ..GraphConfig::default()
        };
        let store = SurrealGraphStore::in_memory(&graph).await.unwrap();
        let report = store.build(&sample(), false).await.unwrap();
        assert_eq!(report.batches_total, 2);
        assert_eq!(report.triplets_imported, 3);
    }

    #[tokio::test]
    async fn test_labels_only_grow() {
        let store = store().await;
        store
            .build(&[triplet("Apple", "ACQUIRED", "DarwinAI", Some(0.9))], false)
            .await
            .unwrap();

        let mut typed = triplet("Apple", "LAUNCHED", "Vision Pro", Some(0.9));
        typed.head_type = "COMPANY".to_string();
        store.build(&[typed], false).await.unwrap();

        let params: Params = [("name".to_string(), json!("Apple"))].into_iter().collect();
        let rows = store
            .query("SELECT labels, kind FROM entity WHERE name = $name", &params)
            .await
            .unwrap();
        assert_eq!(rows[0]["labels"], json!(["ENTITY", "COMPANY"]));
        assert_eq!(rows[0]["kind"], json!("COMPANY"));
        assert_eq!(store.stats().await.unwrap().unique_labels, 2);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = store().await;
        store
            .build(&[triplet("Apple", "ACQUIRED", "DarwinAI", Some(0.95))], false)
            .await
            .unwrap();
        store
            .build(&[triplet("Apple", "ACQUIRED", "DarwinAI", Some(0.75))], false)
            .await
            .unwrap();

        assert_eq!(edge_confidence(&store, "Apple").await, 0.75);
        assert_eq!(store.stats().await.unwrap().total_relationships, 1);
    }

    #[tokio::test]
    async fn test_keep_highest_confidence() {
        let graph = GraphConfig {
            edge_policy: EdgeConflictPolicy::KeepHighestConfidence,
            ..GraphConfig::default()
        };
        let store = SurrealGraphStore::in_memory(&graph).await.unwrap();
        store
            .build(&[triplet("Apple", "ACQUIRED", "DarwinAI", Some(0.95))], false)
            .await
            .unwrap();
        store
            .build(&[triplet("Apple", "ACQUIRED", "DarwinAI", Some(0.75))], false)
            .await
            .unwrap();

        assert_eq!(edge_confidence(&store, "Apple").await, 0.95);
    }

    #[tokio::test]
    async fn test_missing_confidence_defaults() {
        let store = store().await;
        store.build(&sample(), false).await.unwrap();
        assert_eq!(edge_confidence(&store, "Tesla").await, 0.8);
    }

    #[tokio::test]
    async fn test_clear_and_rebuild() {
        let store = store().await;
        store.build(&sample(), false).await.unwrap();
        store
            .build(&[triplet("Amazon", "PARTNERED_WITH", "NVIDIA", Some(0.8))], true)
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.total_relationships, 1);
    }

    #[tokio::test]
    async fn test_empty_build_is_noop() {
        let store = store().await;
        let report = store.build(&[], true).await.unwrap();
        assert_eq!(report, crate::BuildReport::default());
    }

    #[tokio::test]
    async fn test_ensure_schema_twice() {
        let store = store().await;
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_swallows_malformed_queries() {
        let store = store().await;
        assert!(store.query("SELEC nonsense FROM", &Params::new()).await.is_err());
        assert!(store.execute("SELEC nonsense FROM", &Params::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let store = store().await;
        store.build(&sample(), false).await.unwrap();
        let rows = store
            .query(
                "SELECT head FROM relates WHERE kind = 'FOUNDED'",
                &Params::new(),
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_select_all_returns_record_ids() {
        let store = store().await;
        store
            .build(&[triplet("Apple", "ACQUIRED", "DarwinAI", Some(0.9))], false)
            .await
            .unwrap();

        let rows = store.query("SELECT * FROM relates", &Params::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["head"], json!("Apple"));
        assert_eq!(rows[0]["kind"], json!("ACQUIRED"));
        assert!(rows[0]["id"].as_str().unwrap().starts_with("relates:"));
        assert!(rows[0]["in"].as_str().unwrap().starts_with("entity:"));

        let rows = store
            .query("SELECT id, name FROM entity", &Params::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row["id"].is_string()));
    }

    #[tokio::test]
    async fn test_non_object_rows_are_wrapped() {
        let store = store().await;
        store.build(&sample(), false).await.unwrap();
        let rows = store
            .query("SELECT VALUE head FROM relates", &Params::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().any(|row| row["value"] == json!("Apple")));
    }
}
