// SPDX-License-Identifier: PMPL-1.0-or-later
//! Nexus Graph
//!
//! Graph access port for the self-healing temporal knowledge graph. Provides
//! the data model (entities, fact edges, conflict logs, metrics snapshots) and
//! two backends:
//!
//! - **`InMemoryGraphStore`** (default) - Pure Rust, in-memory HashMap store
//!   behind a single `RwLock`. Every trait method is one atomic statement.
//!
//! - **`RedbGraphStore`** (feature: `redb-backend`) - Persistent store on redb,
//!   one ACID write transaction per statement.
//!
//! The port offers atomic single-statement writes only. Multi-statement
//! sequences (such as applying a correction) are not isolated from each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod memory;
pub mod model;
pub mod records;

#[cfg(feature = "redb-backend")]
mod redb_backend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbGraphStore;

pub use memory::InMemoryGraphStore;
pub use model::{
    Entity, EntityId, EntityUpsert, Properties, PropertyValue, Relationship, RelationshipId,
    RelationshipSnapshot,
};
pub use records::{
    ConflictLogRecord, ConflictLogWrite, MetricsSnapshot, ResolutionAudit, SchemaReport, Severity,
    SCHEMA_ITEMS,
};

/// Graph store errors
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

/// Graph access port.
///
/// All graph backends implement this trait, so ingestion, detection, healing
/// and observability are generic over the concrete store. Each method is a
/// single atomic statement; lookups of missing records return `Ok(None)` or
/// `false`/`0` rather than an error.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Ensure uniqueness constraints and indexes exist. Idempotent.
    async fn setup_schema(&self) -> Result<SchemaReport, GraphError>;

    // ── Entities ──────────────────────────────────────────────────────────

    /// Create or merge an entity keyed by id, incrementing `change_count`.
    async fn upsert_entity(&self, upsert: EntityUpsert) -> Result<Entity, GraphError>;

    async fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>, GraphError>;

    async fn list_entities(&self) -> Result<Vec<Entity>, GraphError>;

    /// Set `has_conflict` with a description. Returns false if the entity is missing.
    async fn flag_conflict(
        &self,
        entity_id: &EntityId,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError>;

    /// Clear `has_conflict`, stamp `last_healed_at` and increment
    /// `healing_count`. Returns the new healing count, or `None` if the
    /// entity is missing.
    async fn clear_conflict(
        &self,
        entity_id: &EntityId,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, GraphError>;

    /// Flag every entity with `change_count >= threshold` as unstable.
    /// Returns the number of entities flipped by this call.
    async fn mark_unstable(&self, threshold: u64, at: DateTime<Utc>) -> Result<usize, GraphError>;

    // ── Relationships ─────────────────────────────────────────────────────

    /// Insert a new edge. Fails with `ConstraintViolation` on a duplicate id
    /// or when an endpoint entity does not exist.
    async fn create_relationship(&self, rel: Relationship) -> Result<RelationshipId, GraphError>;

    async fn get_relationship(&self, id: &RelationshipId)
        -> Result<Option<Relationship>, GraphError>;

    /// Outgoing edges of an entity, oldest first.
    async fn outgoing(&self, entity_id: &EntityId) -> Result<Vec<Relationship>, GraphError>;

    async fn list_relationships(&self) -> Result<Vec<Relationship>, GraphError>;

    /// Mark an edge current with a new confidence and verification note.
    /// Returns false if the edge is missing.
    async fn verify_relationship(
        &self,
        id: &RelationshipId,
        confidence: f64,
        reasoning: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError>;

    /// Demote edges to `is_current = false`. Returns how many existed.
    async fn mark_outdated(
        &self,
        ids: &[RelationshipId],
        reasoning: &str,
        at: DateTime<Utc>,
    ) -> Result<usize, GraphError>;

    // ── Conflict log ──────────────────────────────────────────────────────

    /// Insert or refresh a conflict log record. Resolved records are left untouched.
    async fn upsert_conflict_log(
        &self,
        record: ConflictLogRecord,
    ) -> Result<ConflictLogWrite, GraphError>;

    /// Mark a conflict log record resolved with the decision payload attached.
    /// Returns false if no record exists.
    async fn resolve_conflict_log(
        &self,
        id: &str,
        decision: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, GraphError>;

    async fn get_conflict_log(&self, id: &str) -> Result<Option<ConflictLogRecord>, GraphError>;

    async fn list_conflict_logs(&self) -> Result<Vec<ConflictLogRecord>, GraphError>;

    // ── Metrics ───────────────────────────────────────────────────────────

    async fn store_metrics_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), GraphError>;

    /// Snapshots taken at or after `cutoff`, oldest first.
    async fn metrics_since(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<MetricsSnapshot>, GraphError>;
}
