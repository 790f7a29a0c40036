// SPDX-License-Identifier: PMPL-1.0-or-later

// ═══════════════════════════════════════════════════════════════════════════
// InMemoryGraphStore: pure Rust in-memory graph store
// ═══════════════════════════════════════════════════════════════════════════

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Entity, EntityId, EntityUpsert, Relationship, RelationshipId};
use crate::records::{
    ConflictLogRecord, ConflictLogWrite, MetricsSnapshot, SchemaReport, SCHEMA_ITEMS,
};
use crate::{GraphError, GraphStore};

#[derive(Default)]
struct GraphState {
    entities: HashMap<EntityId, Entity>,
    relationships: HashMap<RelationshipId, Relationship>,
    /// Source entity → outgoing edge ids, in insertion order
    outgoing_idx: HashMap<EntityId, Vec<RelationshipId>>,
    conflict_logs: BTreeMap<String, ConflictLogRecord>,
    metrics: Vec<MetricsSnapshot>,
    schema: HashSet<String>,
}

/// Pure Rust in-memory graph store.
///
/// All state lives behind one `RwLock`, so every trait method observes and
/// mutates a consistent view. Concurrent reads, exclusive writes.
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
    offline: AtomicBool,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: while offline every call fails with
    /// `GraphError::StoreUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), GraphError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GraphError::StoreUnavailable(
                "in-memory store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, GraphState>, GraphError> {
        self.check_online()?;
        self.state.read().map_err(|_| GraphError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, GraphState>, GraphError> {
        self.check_online()?;
        self.state.write().map_err(|_| GraphError::LockPoisoned)
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn setup_schema(&self) -> Result<SchemaReport, GraphError> {
        let mut state = self.write()?;
        let mut report = SchemaReport::default();
        for item in SCHEMA_ITEMS {
            if state.schema.insert(item.to_string()) {
                report.created.push(item.to_string());
            } else {
                report.existing.push(item.to_string());
            }
        }
        Ok(report)
    }

    async fn upsert_entity(&self, upsert: EntityUpsert) -> Result<Entity, GraphError> {
        let mut state = self.write()?;
        let entity = match state.entities.get_mut(&upsert.id) {
            Some(existing) => {
                existing.apply_upsert(upsert);
                existing.clone()
            }
            None => {
                let entity = Entity::from_upsert(upsert);
                state.entities.insert(entity.id.clone(), entity.clone());
                entity
            }
        };
        Ok(entity)
    }

    async fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>, GraphError> {
        Ok(self.read()?.entities.get(id).cloned())
    }

    async fn list_entities(&self) -> Result<Vec<Entity>, GraphError> {
        let state = self.read()?;
        let mut entities: Vec<Entity> = state.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entities)
    }

    async fn flag_conflict(
        &self,
        entity_id: &EntityId,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        let mut state = self.write()?;
        match state.entities.get_mut(entity_id) {
            Some(entity) => {
                entity.flag_conflict(description, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_conflict(
        &self,
        entity_id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, GraphError> {
        let mut state = self.write()?;
        Ok(state
            .entities
            .get_mut(entity_id)
            .map(|entity| entity.record_healing(at)))
    }

    async fn mark_unstable(&self, threshold: u64, at: DateTime<Utc>) -> Result<usize, GraphError> {
        let mut state = self.write()?;
        let flipped = state
            .entities
            .values_mut()
            .map(|entity| entity.mark_unstable_if(threshold, at))
            .filter(|flipped| *flipped)
            .count();
        Ok(flipped)
    }

    async fn create_relationship(&self, rel: Relationship) -> Result<RelationshipId, GraphError> {
        let mut state = self.write()?;
        if state.relationships.contains_key(&rel.id) {
            return Err(GraphError::ConstraintViolation(format!(
                "relationship {} already exists",
                rel.id
            )));
        }
        for endpoint in [&rel.source_entity_id, &rel.target_entity_id] {
            if !state.entities.contains_key(endpoint) {
                return Err(GraphError::ConstraintViolation(format!(
                    "relationship {} references missing entity {}",
                    rel.id, endpoint
                )));
            }
        }

        let id = rel.id.clone();
        state
            .outgoing_idx
            .entry(rel.source_entity_id.clone())
            .or_default()
            .push(id.clone());
        state.relationships.insert(id.clone(), rel);
        Ok(id)
    }

    async fn get_relationship(
        &self,
        id: &RelationshipId,
    ) -> Result<Option<Relationship>, GraphError> {
        Ok(self.read()?.relationships.get(id).cloned())
    }

    async fn outgoing(&self, entity_id: &EntityId) -> Result<Vec<Relationship>, GraphError> {
        let state = self.read()?;
        let mut edges: Vec<Relationship> = match state.outgoing_idx.get(entity_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| state.relationships.get(id).cloned())
                .collect(),
            None => Vec::new(),
        };
        edges.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(edges)
    }

    async fn list_relationships(&self) -> Result<Vec<Relationship>, GraphError> {
        let state = self.read()?;
        let mut edges: Vec<Relationship> = state.relationships.values().cloned().collect();
        edges.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(edges)
    }

    async fn verify_relationship(
        &self,
        id: &RelationshipId,
        confidence: f64,
        reasoning: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        let mut state = self.write()?;
        match state.relationships.get_mut(id) {
            Some(rel) => {
                rel.verify(confidence, reasoning, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_outdated(
        &self,
        ids: &[RelationshipId],
        reasoning: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, GraphError> {
        let mut state = self.write()?;
        let mut updated = 0;
        for id in ids {
            if let Some(rel) = state.relationships.get_mut(id) {
                rel.mark_outdated(reasoning, at);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn upsert_conflict_log(
        &self,
        record: ConflictLogRecord,
    ) -> Result<ConflictLogWrite, GraphError> {
        let mut state = self.write()?;
        let (to_write, outcome) =
            ConflictLogRecord::merge(state.conflict_logs.get(&record.id), record);
        if let Some(record) = to_write {
            state.conflict_logs.insert(record.id.clone(), record);
        }
        Ok(outcome)
    }

    async fn resolve_conflict_log(
        &self,
        id: &str,
        decision: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        let mut state = self.write()?;
        match state.conflict_logs.get_mut(id) {
            Some(record) => {
                record.resolve(decision, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_conflict_log(&self, id: &str) -> Result<Option<ConflictLogRecord>, GraphError> {
        Ok(self.read()?.conflict_logs.get(id).cloned())
    }

    async fn list_conflict_logs(&self) -> Result<Vec<ConflictLogRecord>, GraphError> {
        Ok(self.read()?.conflict_logs.values().cloned().collect())
    }

    async fn store_metrics_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), GraphError> {
        let mut state = self.write()?;
        state.metrics.push(snapshot.clone());
        Ok(())
    }

    async fn metrics_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MetricsSnapshot>, GraphError> {
        let state = self.read()?;
        let mut snapshots: Vec<MetricsSnapshot> = state
            .metrics
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(snapshots)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Severity;
    use crate::RelationshipSnapshot;
    use chrono::Duration;

    async fn seed_pair(store: &InMemoryGraphStore) -> (EntityId, EntityId) {
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

    fn log_record(id: &str, entity_id: &EntityId) -> ConflictLogRecord {
        ConflictLogRecord {
            id: id.to_string(),
            entity_id: entity_id.clone(),
            entity_name: "Alice".to_string(),
            relationship_type: "WORKS_AT".to_string(),
            detection_method: "duplicate_relationship".to_string(),
            severity: Severity::Low,
            description: "test".to_string(),
            detected_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolution_decision: None,
            conflicting_relationships: Vec::<RelationshipSnapshot>::new(),
            previous_resolutions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_setup_schema_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let first = store.setup_schema().await.unwrap();
        assert_eq!(first.created.len(), SCHEMA_ITEMS.len());
        assert!(first.existing.is_empty());

        let second = store.setup_schema().await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing.len(), SCHEMA_ITEMS.len());
    }

    #[tokio::test]
    async fn test_upsert_increments_change_count() {
        let store = InMemoryGraphStore::new();
        let id = EntityId::new("alice");
        for _ in 0..3 {
            store
                .upsert_entity(EntityUpsert::new("Alice", "Person").with_id(id.clone()))
                .await
                .unwrap();
        }
        let entity = store.get_entity(&id).await.unwrap().unwrap();
        assert_eq!(entity.change_count, 3);
        assert!(!entity.has_conflict);
        assert!(!entity.is_unstable);
    }

    #[tokio::test]
    async fn test_create_relationship_constraints() {
        let store = InMemoryGraphStore::new();
        let (a, b) = seed_pair(&store).await;

        let rel = Relationship::new(a.clone(), b.clone(), "WORKS_AT");
        let id = store.create_relationship(rel.clone()).await.unwrap();
        assert_eq!(id, rel.id);

        let dup = store.create_relationship(rel).await;
        assert!(matches!(dup, Err(GraphError::ConstraintViolation(_))));

        let dangling = Relationship::new(a, EntityId::new("ghost"), "WORKS_AT");
        let err = store.create_relationship(dangling).await;
        assert!(matches!(err, Err(GraphError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_outgoing_sorted_by_timestamp() {
        let store = InMemoryGraphStore::new();
        let (a, b) = seed_pair(&store).await;
        let now = Utc::now();

        let newer = Relationship::new(a.clone(), b.clone(), "WORKS_AT").at(now);
        let older = Relationship::new(a.clone(), b, "WORKS_AT").at(now - Duration::days(10));
        store.create_relationship(newer.clone()).await.unwrap();
        store.create_relationship(older.clone()).await.unwrap();

        let edges = store.outgoing(&a).await.unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].id, older.id);
        assert_eq!(edges[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_verify_and_outdate() {
        let store = InMemoryGraphStore::new();
        let (a, b) = seed_pair(&store).await;
        let winner = Relationship::new(a.clone(), b.clone(), "WORKS_AT").with_confidence(0.5);
        let loser = Relationship::new(a, b, "WORKS_AT");
        store.create_relationship(winner.clone()).await.unwrap();
        store.create_relationship(loser.clone()).await.unwrap();

        let now = Utc::now();
        assert!(store
            .verify_relationship(&winner.id, 0.9, "newer source", now)
            .await
            .unwrap());
        let updated = store
            .mark_outdated(&[loser.id.clone(), RelationshipId::new("missing")], "stale", now)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let w = store.get_relationship(&winner.id).await.unwrap().unwrap();
        assert!(w.is_current);
        assert!((w.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(w.verification_reasoning.as_deref(), Some("newer source"));

        let l = store.get_relationship(&loser.id).await.unwrap().unwrap();
        assert!(!l.is_current);
        assert_eq!(l.outdated_at, Some(now));
    }

    #[tokio::test]
    async fn test_conflict_flag_and_healing() {
        let store = InMemoryGraphStore::new();
        let (a, _) = seed_pair(&store).await;
        let now = Utc::now();

        assert!(store.flag_conflict(&a, "two employers", now).await.unwrap());
        assert!(store.get_entity(&a).await.unwrap().unwrap().has_conflict);

        assert_eq!(store.clear_conflict(&a, now).await.unwrap(), Some(1));
        let entity = store.get_entity(&a).await.unwrap().unwrap();
        assert!(!entity.has_conflict);
        assert_eq!(entity.healing_count, 1);
        assert_eq!(entity.last_healed_at, Some(now));

        let missing = EntityId::new("ghost");
        assert!(!store.flag_conflict(&missing, "x", now).await.unwrap());
        assert_eq!(store.clear_conflict(&missing, now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mark_unstable_counts_only_new_flips() {
        let store = InMemoryGraphStore::new();
        let id = EntityId::new("busy");
        for _ in 0..3 {
            store
                .upsert_entity(EntityUpsert::new("Busy", "Entity").with_id(id.clone()))
                .await
                .unwrap();
        }
        seed_pair(&store).await;

        assert_eq!(store.mark_unstable(3, Utc::now()).await.unwrap(), 1);
        assert_eq!(store.mark_unstable(3, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conflict_log_lifecycle() {
        let store = InMemoryGraphStore::new();
        let (a, _) = seed_pair(&store).await;

        let first = store.upsert_conflict_log(log_record("dup_alice_WORKS_AT", &a)).await.unwrap();
        assert_eq!(first, ConflictLogWrite::Inserted);
        let second = store.upsert_conflict_log(log_record("dup_alice_WORKS_AT", &a)).await.unwrap();
        assert_eq!(second, ConflictLogWrite::Refreshed);
        assert_eq!(store.list_conflict_logs().await.unwrap().len(), 1);

        assert!(store
            .resolve_conflict_log("dup_alice_WORKS_AT", "{}", Utc::now())
            .await
            .unwrap());
        let third = store.upsert_conflict_log(log_record("dup_alice_WORKS_AT", &a)).await.unwrap();
        assert_eq!(third, ConflictLogWrite::AlreadyResolved);

        let record = store.get_conflict_log("dup_alice_WORKS_AT").await.unwrap().unwrap();
        assert!(record.resolved);
        assert_eq!(record.resolution_decision.as_deref(), Some("{}"));

        let (_, b) = seed_pair(&store).await;
        let mut newer = log_record("dup_alice_WORKS_AT", &a);
        let edge = Relationship::new(a.clone(), b, "WORKS_AT");
        newer.conflicting_relationships.push(RelationshipSnapshot::capture(&edge, "Acme"));
        let fourth = store.upsert_conflict_log(newer).await.unwrap();
        assert_eq!(fourth, ConflictLogWrite::Reopened);

        let record = store.get_conflict_log("dup_alice_WORKS_AT").await.unwrap().unwrap();
        assert!(!record.resolved);
        assert_eq!(record.previous_resolutions.len(), 1);
        assert_eq!(record.previous_resolutions[0].decision.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_metrics_since_filters_and_orders() {
        let store = InMemoryGraphStore::new();
        let now = Utc::now();
        for days in [10, 1, 3] {
            let snapshot = MetricsSnapshot {
                timestamp: now - Duration::days(days),
                total_entities: 0,
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
        assert!(recent[0].timestamp < recent[1].timestamp);
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let store = InMemoryGraphStore::new();
        store.set_offline(true);
        let err = store.list_entities().await.unwrap_err();
        assert!(matches!(err, GraphError::StoreUnavailable(_)));
        store.set_offline(false);
        assert!(store.list_entities().await.unwrap().is_empty());
    }
}
