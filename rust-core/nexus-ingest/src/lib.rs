// SPDX-License-Identifier: PMPL-1.0-or-later
//! Nexus Temporal Ingestion
//!
//! Writes entities and directed, typed, time-stamped fact edges into the
//! graph. Every entity write increments the entity's `change_count`; every
//! new edge is a fresh record that starts as the current truth. Existing
//! edges are never merged or overwritten here.

pub mod fact;

use std::sync::Arc;

use chrono::Utc;
use nexus_graph::{
    EntityId, EntityUpsert, GraphError, GraphStore, Relationship, RelationshipId,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use fact::{Fact, FactIngested, FactInput};

/// Ingestion errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Missing endpoint: relationship {source_id} -> {target_id} references a nonexistent entity")]
    MissingEndpoint {
        source_id: EntityId,
        target_id: EntityId,
    },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid confidence {0}: must be within [0, 1]")]
    InvalidConfidence(f64),

    #[error("Store error: {0}")]
    Store(#[from] GraphError),
}

/// Temporal ingestion over a shared graph store.
pub struct TemporalIngestion {
    store: Arc<dyn GraphStore>,
}

impl TemporalIngestion {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Upsert an entity keyed by its id. Returns the id.
    #[instrument(skip(self, upsert), fields(entity_id = %upsert.id, name = %upsert.name))]
    pub async fn ingest_entity(&self, upsert: EntityUpsert) -> Result<EntityId, IngestError> {
        let entity = self.store.upsert_entity(upsert).await?;
        debug!(change_count = entity.change_count, "Entity upserted");
        Ok(entity.id)
    }

    /// Create a new fact edge. Both endpoints must already exist.
    #[instrument(skip(self, rel), fields(rel_type = %rel.relationship_type))]
    pub async fn ingest_relationship(
        &self,
        mut rel: Relationship,
    ) -> Result<RelationshipId, IngestError> {
        if !(0.0..=1.0).contains(&rel.confidence) {
            return Err(IngestError::InvalidConfidence(rel.confidence));
        }

        let source = self.store.get_entity(&rel.source_entity_id).await?;
        let target = self.store.get_entity(&rel.target_entity_id).await?;
        if source.is_none() || target.is_none() {
            warn!(
                source_id = %rel.source_entity_id,
                target_id = %rel.target_entity_id,
                "Relationship endpoint missing"
            );
            return Err(IngestError::MissingEndpoint {
                source_id: rel.source_entity_id,
                target_id: rel.target_entity_id,
            });
        }

        rel.is_current = true;
        let id = self.store.create_relationship(rel).await?;
        debug!(relationship_id = %id, "Relationship created");
        Ok(id)
    }

    /// Upsert subject and object, then link them with a new edge.
    ///
    /// Entity ids are derived from the names, so repeated facts about the
    /// same subject accumulate on one node.
    #[instrument(skip(self, fact), fields(subject = %fact.subject, predicate = %fact.predicate))]
    pub async fn ingest_fact(&self, fact: Fact) -> Result<FactIngested, IngestError> {
        if !(0.0..=1.0).contains(&fact.confidence) {
            return Err(IngestError::InvalidConfidence(fact.confidence));
        }
        let timestamp = fact.timestamp.unwrap_or_else(Utc::now);

        let mut subject = EntityUpsert::new(fact.subject.as_str(), fact.subject_type())
            .with_id(EntityId::from_name(&fact.subject))
            .at(timestamp);
        let mut object = EntityUpsert::new(fact.object.as_str(), fact.object_type())
            .with_id(EntityId::from_name(&fact.object))
            .at(timestamp);
        if let Some(source) = &fact.source_document {
            subject = subject.with_source(source.as_str());
            object = object.with_source(source.as_str());
        }

        let subject_id = self.ingest_entity(subject).await?;
        let object_id = self.ingest_entity(object).await?;

        let mut rel = Relationship::new(subject_id.clone(), object_id.clone(), fact.predicate)
            .with_properties(fact.metadata)
            .with_confidence(fact.confidence)
            .at(timestamp);
        rel.source_document = fact.source_document;
        let relationship_id = self.ingest_relationship(rel).await?;

        Ok(FactIngested {
            subject_id,
            object_id,
            relationship_id,
        })
    }

    /// Ingest facts one by one, isolating failures per item.
    ///
    /// The result list has one entry per input, in input order.
    #[instrument(skip(self, facts), fields(count = facts.len()))]
    pub async fn batch_ingest_facts(
        &self,
        facts: Vec<FactInput>,
    ) -> Vec<Result<FactIngested, IngestError>> {
        let mut results = Vec::with_capacity(facts.len());
        for (index, input) in facts.into_iter().enumerate() {
            let outcome = match input.into_fact() {
                Ok(fact) => self.ingest_fact(fact).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                warn!(index, error = %e, "Fact ingestion failed");
            }
            results.push(outcome);
        }

        let ok = results.iter().filter(|r| r.is_ok()).count();
        info!(succeeded = ok, failed = results.len() - ok, "Batch ingestion complete");
        results
    }
}
