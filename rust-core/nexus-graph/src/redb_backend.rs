// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed persistent graph store.
//
// This module is only compiled when the `redb-backend` feature is enabled.
// Every `GraphStore` method runs as one redb transaction on the blocking
// thread pool, so each statement is atomic and durable on commit.
//
// # Storage Design
//
// All values are JSON-serialised records.
//
// 1. **`entities`**: Key: entity id. Value: `Entity`.
// 2. **`relationships`**: Key: relationship id. Value: `Relationship`.
// 3. **`outgoing_idx`**: Key: `"{source_entity_id}\0{relationship_id}"`.
//    Value: empty. Prefix-scanned for outgoing edge lookups.
// 4. **`conflict_logs`**: Key: conflict id. Value: `ConflictLogRecord`.
// 5. **`metrics`**: Key: `"{timestamp}\0{uuid}"` with a fixed-width UTC
//    timestamp, so key order is time order. Value: `MetricsSnapshot`.
// 6. **`schema`**: Key: schema item name. Value: empty.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{Entity, EntityId, EntityUpsert, Relationship, RelationshipId};
use crate::records::{
    ConflictLogRecord, ConflictLogWrite, MetricsSnapshot, SchemaReport, SCHEMA_ITEMS,
};
use crate::{GraphError, GraphStore};

type JsonTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

const ENTITIES: JsonTable = TableDefinition::new("entities");
const RELATIONSHIPS: JsonTable = TableDefinition::new("relationships");
const OUTGOING_IDX: JsonTable = TableDefinition::new("outgoing_idx");
const CONFLICT_LOGS: JsonTable = TableDefinition::new("conflict_logs");
const METRICS: JsonTable = TableDefinition::new("metrics");
const SCHEMA: JsonTable = TableDefinition::new("schema");

/// Separator byte for composite keys.
const SEP: u8 = 0x00;

/// Fixed-width timestamp format for lexicographically ordered metric keys.
const METRICS_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

fn unavailable(context: &str, e: impl std::fmt::Display) -> GraphError {
    GraphError::StoreUnavailable(format!("{context}: {e}"))
}

fn load<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    key: &[u8],
) -> Result<Option<T>, GraphError> {
    match table.get(key).map_err(|e| unavailable("lookup", e))? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
) -> Result<Vec<T>, GraphError> {
    let mut out = Vec::new();
    for entry in table.iter().map_err(|e| unavailable("scan", e))? {
        let (_, value) = entry.map_err(|e| unavailable("scan entry", e))?;
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

fn save<T: Serialize>(
    table: &mut redb::Table<'_, &'static [u8], &'static [u8]>,
    key: &[u8],
    value: &T,
) -> Result<(), GraphError> {
    let bytes = serde_json::to_vec(value)?;
    table
        .insert(key, bytes.as_slice())
        .map_err(|e| unavailable("insert", e))?;
    Ok(())
}

fn open<'txn>(
    txn: &'txn WriteTransaction,
    def: JsonTable,
) -> Result<redb::Table<'txn, &'static [u8], &'static [u8]>, GraphError> {
    txn.open_table(def).map_err(|e| unavailable("open table", e))
}

/// Run `f` inside a write transaction. The transaction aborts if `f` fails.
fn write_txn<T>(
    db: &Database,
    f: impl FnOnce(&WriteTransaction) -> Result<T, GraphError>,
) -> Result<T, GraphError> {
    let txn = db.begin_write().map_err(|e| unavailable("write txn", e))?;
    let out = f(&txn)?;
    txn.commit().map_err(|e| unavailable("commit", e))?;
    Ok(out)
}

fn read_one<T: DeserializeOwned>(
    db: &Database,
    def: JsonTable,
    key: &[u8],
) -> Result<Option<T>, GraphError> {
    let txn = db.begin_read().map_err(|e| unavailable("read txn", e))?;
    let table = match txn.open_table(def) {
        Ok(t) => t,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(e) => return Err(unavailable("open table", e)),
    };
    load(&table, key)
}

fn read_all<T: DeserializeOwned>(db: &Database, def: JsonTable) -> Result<Vec<T>, GraphError> {
    let txn = db.begin_read().map_err(|e| unavailable("read txn", e))?;
    let table = match txn.open_table(def) {
        Ok(t) => t,
        Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(unavailable("open table", e)),
    };
    scan(&table)
}

fn outgoing_key(source: &EntityId, rel: &RelationshipId) -> Vec<u8> {
    let mut key = outgoing_prefix(source);
    key.extend_from_slice(rel.as_str().as_bytes());
    key
}

fn outgoing_prefix(source: &EntityId) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(source.as_str().len() + 1);
    prefix.extend_from_slice(source.as_str().as_bytes());
    prefix.push(SEP);
    prefix
}

fn metrics_key(timestamp: DateTime<Utc>) -> Vec<u8> {
    let mut key = timestamp.format(METRICS_KEY_FORMAT).to_string().into_bytes();
    key.push(SEP);
    key.extend_from_slice(uuid::Uuid::new_v4().to_string().as_bytes());
    key
}

/// A persistent graph store backed by redb.
///
/// Provides the same `GraphStore` interface as `InMemoryGraphStore` with
/// durable on-disk storage via a pure-Rust B-tree database.
///
/// Thread-safe: `Database` is `Send + Sync` with internal locking.
pub struct RedbGraphStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbGraphStore {
    /// Open or create a persistent graph store at the given path.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| unavailable("create dirs", e))?;
        }

        let db = Database::create(&path).map_err(|e| unavailable("open redb", e))?;
        tracing::debug!(path = %path.display(), "Opened redb graph store");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<T, F>(&self, f: F) -> Result<T, GraphError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, GraphError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| unavailable("task join", e))?
    }
}

#[async_trait]
impl GraphStore for RedbGraphStore {
    fn name(&self) -> &str {
        "redb"
    }

    async fn setup_schema(&self) -> Result<SchemaReport, GraphError> {
        self.run(|db| {
            write_txn(db, |txn| {
                let mut table = open(txn, SCHEMA)?;
                let mut report = SchemaReport::default();
                for item in SCHEMA_ITEMS {
                    let exists = table
                        .get(item.as_bytes())
                        .map_err(|e| unavailable("schema lookup", e))?
                        .is_some();
                    if exists {
                        report.existing.push(item.to_string());
                    } else {
                        table
                            .insert(item.as_bytes(), &[] as &[u8])
                            .map_err(|e| unavailable("schema insert", e))?;
                        report.created.push(item.to_string());
                    }
                }
                Ok(report)
            })
        })
        .await
    }

    async fn upsert_entity(&self, upsert: EntityUpsert) -> Result<Entity, GraphError> {
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, ENTITIES)?;
                let key = upsert.id.as_str().as_bytes().to_vec();
                let entity = match load::<Entity>(&table, &key)? {
                    Some(mut existing) => {
                        existing.apply_upsert(upsert);
                        existing
                    }
                    None => Entity::from_upsert(upsert),
                };
                save(&mut table, &key, &entity)?;
                Ok(entity)
            })
        })
        .await
    }

    async fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>, GraphError> {
        let key = id.as_str().as_bytes().to_vec();
        self.run(move |db| read_one(db, ENTITIES, &key)).await
    }

    async fn list_entities(&self) -> Result<Vec<Entity>, GraphError> {
        self.run(|db| read_all(db, ENTITIES)).await
    }

    async fn flag_conflict(
        &self,
        entity_id: &EntityId,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        let key = entity_id.as_str().as_bytes().to_vec();
        let description = description.to_string();
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, ENTITIES)?;
                match load::<Entity>(&table, &key)? {
                    Some(mut entity) => {
                        entity.flag_conflict(&description, at);
                        save(&mut table, &key, &entity)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            })
        })
        .await
    }

    async fn clear_conflict(
        &self,
        entity_id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, GraphError> {
        let key = entity_id.as_str().as_bytes().to_vec();
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, ENTITIES)?;
                match load::<Entity>(&table, &key)? {
                    Some(mut entity) => {
                        let count = entity.record_healing(at);
                        save(&mut table, &key, &entity)?;
                        Ok(Some(count))
                    }
                    None => Ok(None),
                }
            })
        })
        .await
    }

    async fn mark_unstable(&self, threshold: u64, at: DateTime<Utc>) -> Result<usize, GraphError> {
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, ENTITIES)?;
                let entities: Vec<Entity> = scan(&table)?;
                let mut flipped = 0;
                for mut entity in entities {
                    if entity.mark_unstable_if(threshold, at) {
                        save(&mut table, entity.id.as_str().as_bytes(), &entity)?;
                        flipped += 1;
                    }
                }
                Ok(flipped)
            })
        })
        .await
    }

    async fn create_relationship(&self, rel: Relationship) -> Result<RelationshipId, GraphError> {
        self.run(move |db| {
            write_txn(db, |txn| {
                let key = rel.id.as_str().as_bytes().to_vec();
                {
                    let entities = open(txn, ENTITIES)?;
                    for endpoint in [&rel.source_entity_id, &rel.target_entity_id] {
                        let present = entities
                            .get(endpoint.as_str().as_bytes())
                            .map_err(|e| unavailable("entity lookup", e))?
                            .is_some();
                        if !present {
                            return Err(GraphError::ConstraintViolation(format!(
                                "relationship {} references missing entity {}",
                                rel.id, endpoint
                            )));
                        }
                    }
                }

                let mut relationships = open(txn, RELATIONSHIPS)?;
                let duplicate = relationships
                    .get(key.as_slice())
                    .map_err(|e| unavailable("relationship lookup", e))?
                    .is_some();
                if duplicate {
                    return Err(GraphError::ConstraintViolation(format!(
                        "relationship {} already exists",
                        rel.id
                    )));
                }
                save(&mut relationships, &key, &rel)?;

                let mut idx = open(txn, OUTGOING_IDX)?;
                let idx_key = outgoing_key(&rel.source_entity_id, &rel.id);
                idx.insert(idx_key.as_slice(), &[] as &[u8])
                    .map_err(|e| unavailable("insert outgoing_idx", e))?;

                Ok(rel.id.clone())
            })
        })
        .await
    }

    async fn get_relationship(
        &self,
        id: &RelationshipId,
    ) -> Result<Option<Relationship>, GraphError> {
        let key = id.as_str().as_bytes().to_vec();
        self.run(move |db| read_one(db, RELATIONSHIPS, &key)).await
    }

    async fn outgoing(&self, entity_id: &EntityId) -> Result<Vec<Relationship>, GraphError> {
        let prefix = outgoing_prefix(entity_id);
        self.run(move |db| {
            let txn = db.begin_read().map_err(|e| unavailable("read txn", e))?;
            let idx = match txn.open_table(OUTGOING_IDX) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(unavailable("open outgoing_idx", e)),
            };
            let relationships = match txn.open_table(RELATIONSHIPS) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(unavailable("open relationships", e)),
            };

            let mut edges: Vec<Relationship> = Vec::new();
            let iter = idx
                .range(prefix.as_slice()..)
                .map_err(|e| unavailable("index scan", e))?;
            for entry in iter {
                let entry = entry.map_err(|e| unavailable("index entry", e))?;
                let idx_key = entry.0.value();

                // Stop when keys no longer match the entity prefix
                if !idx_key.starts_with(&prefix) {
                    break;
                }

                if let Some(rel) = load(&relationships, &idx_key[prefix.len()..])? {
                    edges.push(rel);
                }
            }

            edges.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
            Ok(edges)
        })
        .await
    }

    async fn list_relationships(&self) -> Result<Vec<Relationship>, GraphError> {
        self.run(|db| {
            let mut edges: Vec<Relationship> = read_all(db, RELATIONSHIPS)?;
            edges.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
            Ok(edges)
        })
        .await
    }

    async fn verify_relationship(
        &self,
        id: &RelationshipId,
        confidence: f64,
        reasoning: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        let key = id.as_str().as_bytes().to_vec();
        let reasoning = reasoning.to_string();
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, RELATIONSHIPS)?;
                match load::<Relationship>(&table, &key)? {
                    Some(mut rel) => {
                        rel.verify(confidence, &reasoning, at);
                        save(&mut table, &key, &rel)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            })
        })
        .await
    }

    async fn mark_outdated(
        &self,
        ids: &[RelationshipId],
        reasoning: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, GraphError> {
        let ids = ids.to_vec();
        let reasoning = reasoning.to_string();
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, RELATIONSHIPS)?;
                let mut updated = 0;
                for id in &ids {
                    let key = id.as_str().as_bytes();
                    if let Some(mut rel) = load::<Relationship>(&table, key)? {
                        rel.mark_outdated(&reasoning, at);
                        save(&mut table, key, &rel)?;
                        updated += 1;
                    }
                }
                Ok(updated)
            })
        })
        .await
    }

    async fn upsert_conflict_log(
        &self,
        record: ConflictLogRecord,
    ) -> Result<ConflictLogWrite, GraphError> {
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, CONFLICT_LOGS)?;
                let key = record.id.as_bytes().to_vec();
                let existing: Option<ConflictLogRecord> = load(&table, &key)?;
                let (to_write, outcome) = ConflictLogRecord::merge(existing.as_ref(), record);
                if let Some(record) = to_write {
                    save(&mut table, &key, &record)?;
                }
                Ok(outcome)
            })
        })
        .await
    }

    async fn resolve_conflict_log(
        &self,
        id: &str,
        decision: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        let key = id.as_bytes().to_vec();
        let decision = decision.to_string();
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, CONFLICT_LOGS)?;
                match load::<ConflictLogRecord>(&table, &key)? {
                    Some(mut record) => {
                        record.resolve(&decision, at);
                        save(&mut table, &key, &record)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            })
        })
        .await
    }

    async fn get_conflict_log(&self, id: &str) -> Result<Option<ConflictLogRecord>, GraphError> {
        let key = id.as_bytes().to_vec();
        self.run(move |db| read_one(db, CONFLICT_LOGS, &key)).await
    }

    async fn list_conflict_logs(&self) -> Result<Vec<ConflictLogRecord>, GraphError> {
        self.run(|db| read_all(db, CONFLICT_LOGS)).await
    }

    async fn store_metrics_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), GraphError> {
        let snapshot = snapshot.clone();
        self.run(move |db| {
            write_txn(db, |txn| {
                let mut table = open(txn, METRICS)?;
                save(&mut table, &metrics_key(snapshot.timestamp), &snapshot)
            })
        })
        .await
    }

    async fn metrics_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MetricsSnapshot>, GraphError> {
        let start = cutoff.format(METRICS_KEY_FORMAT).to_string().into_bytes();
        self.run(move |db| {
            let txn = db.begin_read().map_err(|e| unavailable("read txn", e))?;
            let table = match txn.open_table(METRICS) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(unavailable("open metrics", e)),
            };

            let mut snapshots = Vec::new();
            for entry in table
                .range(start.as_slice()..)
                .map_err(|e| unavailable("metrics scan", e))?
            {
                let (_, value) = entry.map_err(|e| unavailable("metrics entry", e))?;
                snapshots.push(serde_json::from_slice(value.value())?);
            }
            Ok(snapshots)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn temp_store() -> (RedbGraphStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph-test.redb");
        let store = RedbGraphStore::persistent(&path).unwrap();
        (store, dir)
    }

    async fn seed_pair(store: &RedbGraphStore) -> (EntityId, EntityId) {
        let a = store
            .upsert_entity(EntityUpsert::new("Alice", "Person").with_id(EntityId::new("alice")))
            .await
            .unwrap();
        let b = store
            .upsert_entity(EntityUpsert::new("Acme", "Organization").with_id(EntityId::new("acme")))
            .await
            .unwrap();
        (a.id, b.id)
    }

    #[tokio::test]
    async fn test_schema_setup_idempotent() {
        let (store, _dir) = temp_store();
        let first = store.setup_schema().await.unwrap();
        assert_eq!(first.created.len(), SCHEMA_ITEMS.len());
        let second = store.setup_schema().await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing.len(), SCHEMA_ITEMS.len());
    }

    #[tokio::test]
    async fn test_empty_store_reads() {
        let (store, _dir) = temp_store();
        assert!(store.list_entities().await.unwrap().is_empty());
        assert!(store.outgoing(&EntityId::new("x")).await.unwrap().is_empty());
        assert!(store.get_conflict_log("nope").await.unwrap().is_none());
        assert!(store.metrics_since(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relationships_and_outgoing() {
        let (store, _dir) = temp_store();
        let (a, b) = seed_pair(&store).await;
        let now = Utc::now();

        let newer = Relationship::new(a.clone(), b.clone(), "WORKS_AT").at(now);
        let older = Relationship::new(a.clone(), b.clone(), "WORKS_AT").at(now - Duration::days(3));
        let reverse = Relationship::new(b.clone(), a.clone(), "EMPLOYS").at(now);
        store.create_relationship(newer.clone()).await.unwrap();
        store.create_relationship(older.clone()).await.unwrap();
        store.create_relationship(reverse).await.unwrap();

        let edges = store.outgoing(&a).await.unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].id, older.id);

        let dup = store.create_relationship(newer).await;
        assert!(matches!(dup, Err(GraphError::ConstraintViolation(_))));

        let dangling = Relationship::new(a, EntityId::new("ghost"), "WORKS_AT");
        assert!(matches!(
            store.create_relationship(dangling).await,
            Err(GraphError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_correction_statements_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph.redb");
        let now = Utc::now();

        let (winner, loser) = {
            let store = RedbGraphStore::persistent(&path).unwrap();
            let (a, b) = seed_pair(&store).await;
            let winner = Relationship::new(a.clone(), b.clone(), "WORKS_AT");
            let loser = Relationship::new(a.clone(), b, "WORKS_AT");
            store.create_relationship(winner.clone()).await.unwrap();
            store.create_relationship(loser.clone()).await.unwrap();

            store.flag_conflict(&a, "two employers", now).await.unwrap();
            store
                .verify_relationship(&winner.id, 0.95, "latest filing", now)
                .await
                .unwrap();
            assert_eq!(
                store.mark_outdated(&[loser.id.clone()], "superseded", now).await.unwrap(),
                1
            );
            assert_eq!(store.clear_conflict(&a, now).await.unwrap(), Some(1));
            (winner.id, loser.id)
        };

        let store = RedbGraphStore::persistent(&path).unwrap();
        let w = store.get_relationship(&winner).await.unwrap().unwrap();
        let l = store.get_relationship(&loser).await.unwrap().unwrap();
        assert!(w.is_current);
        assert!(!l.is_current);
        let alice = store.get_entity(&EntityId::new("alice")).await.unwrap().unwrap();
        assert!(!alice.has_conflict);
        assert_eq!(alice.healing_count, 1);
    }

    #[tokio::test]
    async fn test_conflict_log_and_unstable() {
        let (store, _dir) = temp_store();
        let (a, _) = seed_pair(&store).await;
        store
            .upsert_entity(EntityUpsert::new("Alice", "Person").with_id(a.clone()))
            .await
            .unwrap();

        let record = ConflictLogRecord {
            id: "dup_alice_WORKS_AT".to_string(),
            entity_id: a.clone(),
            entity_name: "Alice".to_string(),
            relationship_type: "WORKS_AT".to_string(),
            detection_method: "duplicate_relationship".to_string(),
            severity: crate::Severity::High,
            description: "Entity 'Alice' has 2 relationships of type 'WORKS_AT'".to_string(),
            detected_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolution_decision: None,
            conflicting_relationships: Vec::new(),
            previous_resolutions: Vec::new(),
        };
        assert_eq!(
            store.upsert_conflict_log(record.clone()).await.unwrap(),
            ConflictLogWrite::Inserted
        );
        assert!(store
            .resolve_conflict_log(&record.id, r#"{"confidence":0.9}"#, Utc::now())
            .await
            .unwrap());
        assert_eq!(
            store.upsert_conflict_log(record).await.unwrap(),
            ConflictLogWrite::AlreadyResolved
        );

        assert_eq!(store.mark_unstable(2, Utc::now()).await.unwrap(), 1);
        assert_eq!(store.mark_unstable(2, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_metrics_since_uses_time_order() {
        let (store, _dir) = temp_store();
        let now = Utc::now();
        for days in [9i64, 2, 1] {
            let snapshot = MetricsSnapshot {
                timestamp: now - Duration::days(days),
                total_entities: days as u64,
                total_relationships: 0,
                entities_with_conflicts: 0,
                resolved_conflicts: 0,
                unresolved_conflicts: 0,
                unstable_nodes: 0,
                total_tokens_used: 0,
                total_healing_cost: 0.0,
                average_confidence: 0.0,
                data_accuracy_score: 1.0,
            };
            store.store_metrics_snapshot(&snapshot).await.unwrap();
        }

        let recent = store.metrics_since(now - Duration::days(7)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].total_entities, 2);
        assert_eq!(recent[1].total_entities, 1);
    }
}
