// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Temporal property graph model.
//!
//! Entities are named, typed nodes keyed by an immutable [`EntityId`].
//! Relationships are directed, typed, time-stamped fact edges carrying a
//! confidence score and an `is_current` flag. Edges are never merged or
//! deleted: healing demotes stale edges instead, so the full history of
//! assertions stays auditable.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Globally unique, immutable entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Derive a stable identifier from an entity name.
    ///
    /// Names are trimmed and lowercased before hashing, so `"Amit"` and
    /// `" amit "` map to the same node.
    pub fn from_name(name: &str) -> Self {
        let normalized = name.trim().to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        Self(format!("ent-{}", hex::encode(&digest[..12])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Globally unique relationship (fact edge) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationshipId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Property bags
// ---------------------------------------------------------------------------

/// A value in an open-ended property bag.
///
/// Deserialisation is untagged: RFC 3339 strings become timestamps, other
/// strings stay strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            PropertyValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(x: f64) -> Self {
        PropertyValue::Float(x)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(t: DateTime<Utc>) -> Self {
        PropertyValue::Timestamp(t)
    }
}

/// Ordered property bag, so serialised snapshots are deterministic.
pub type Properties = BTreeMap<String, PropertyValue>;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A named, typed node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: Properties,
    pub last_updated: DateTime<Utc>,
    pub source_document: Option<String>,
    /// Number of ingestion writes that touched this entity. Never decreases.
    pub change_count: u64,
    pub has_conflict: bool,
    pub is_unstable: bool,
    pub healing_count: u64,
    pub last_healed_at: Option<DateTime<Utc>>,
    pub conflict_detected_at: Option<DateTime<Utc>>,
    pub conflict_description: Option<String>,
    pub marked_unstable_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Materialise a brand-new entity from its first upsert.
    pub fn from_upsert(upsert: EntityUpsert) -> Self {
        Self {
            id: upsert.id,
            name: upsert.name,
            entity_type: upsert.entity_type,
            properties: upsert.properties,
            last_updated: upsert.timestamp,
            source_document: upsert.source_document,
            change_count: 1,
            has_conflict: false,
            is_unstable: false,
            healing_count: 0,
            last_healed_at: None,
            conflict_detected_at: None,
            conflict_description: None,
            marked_unstable_at: None,
        }
    }

    /// Merge an upsert into an existing entity.
    ///
    /// Descriptive fields are overwritten, properties are merged key by key,
    /// flags and healing history are preserved and `change_count` grows by one.
    pub fn apply_upsert(&mut self, upsert: EntityUpsert) {
        self.name = upsert.name;
        self.entity_type = upsert.entity_type;
        self.last_updated = upsert.timestamp;
        self.source_document = upsert.source_document;
        self.properties.extend(upsert.properties);
        self.change_count += 1;
    }

    pub fn flag_conflict(&mut self, description: &str, at: DateTime<Utc>) {
        self.has_conflict = true;
        self.conflict_detected_at = Some(at);
        self.conflict_description = Some(description.to_string());
    }

    /// Clear the conflict flag and record a healing. Returns the new healing count.
    pub fn record_healing(&mut self, at: DateTime<Utc>) -> u64 {
        self.has_conflict = false;
        self.healing_count += 1;
        self.last_healed_at = Some(at);
        self.healing_count
    }

    /// Flag as unstable if the change count reached `threshold`.
    ///
    /// Returns true only when the flag flipped on this call.
    pub fn mark_unstable_if(&mut self, threshold: u64, at: DateTime<Utc>) -> bool {
        if self.is_unstable || self.change_count < threshold {
            return false;
        }
        self.is_unstable = true;
        self.marked_unstable_at = Some(at);
        true
    }
}

/// Input for an entity upsert, keyed by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpsert {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: Properties,
    pub timestamp: DateTime<Utc>,
    pub source_document: Option<String>,
}

impl EntityUpsert {
    /// New upsert with a freshly generated identifier, stamped now.
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: EntityId::generate(),
            name: name.into(),
            entity_type: entity_type.into(),
            properties: Properties::new(),
            timestamp: Utc::now(),
            source_document: None,
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source_document: impl Into<String>) -> Self {
        self.source_document = Some(source_document.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

/// A directed, typed, time-stamped fact edge between two entities.
///
/// Only `is_current`, `confidence` and the verification/outdated annotations
/// change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub source_entity_id: EntityId,
    pub target_entity_id: EntityId,
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub properties: Properties,
    pub timestamp: DateTime<Utc>,
    pub source_document: Option<String>,
    pub confidence: f64,
    pub is_current: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_reasoning: Option<String>,
    pub outdated_at: Option<DateTime<Utc>>,
    pub outdated_reasoning: Option<String>,
}

impl Relationship {
    /// New current edge with full confidence, stamped now.
    pub fn new(
        source_entity_id: EntityId,
        target_entity_id: EntityId,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            id: RelationshipId::generate(),
            source_entity_id,
            target_entity_id,
            relationship_type: relationship_type.into(),
            properties: Properties::new(),
            timestamp: Utc::now(),
            source_document: None,
            confidence: 1.0,
            is_current: true,
            verified_at: None,
            verification_reasoning: None,
            outdated_at: None,
            outdated_reasoning: None,
        }
    }

    pub fn with_id(mut self, id: RelationshipId) -> Self {
        self.id = id;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn with_source(mut self, source_document: impl Into<String>) -> Self {
        self.source_document = Some(source_document.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Confirm this edge as the current truth.
    pub fn verify(&mut self, confidence: f64, reasoning: &str, at: DateTime<Utc>) {
        self.is_current = true;
        self.confidence = confidence;
        self.verified_at = Some(at);
        self.verification_reasoning = Some(reasoning.to_string());
    }

    /// Demote this edge. Its confidence is left as recorded.
    pub fn mark_outdated(&mut self, reasoning: &str, at: DateTime<Utc>) {
        self.is_current = false;
        self.outdated_at = Some(at);
        self.outdated_reasoning = Some(reasoning.to_string());
    }
}

/// Structured copy of an edge taken at conflict-detection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    pub id: RelationshipId,
    pub target_id: EntityId,
    pub target_name: String,
    pub timestamp: DateTime<Utc>,
    pub source_document: Option<String>,
    pub confidence: f64,
    pub is_current: bool,
    #[serde(default)]
    pub properties: Properties,
}

impl RelationshipSnapshot {
    pub fn capture(relationship: &Relationship, target_name: impl Into<String>) -> Self {
        Self {
            id: relationship.id.clone(),
            target_id: relationship.target_entity_id.clone(),
            target_name: target_name.into(),
            timestamp: relationship.timestamp,
            source_document: relationship.source_document.clone(),
            confidence: relationship.confidence,
            is_current: relationship.is_current,
            properties: relationship.properties.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_from_name_is_stable() {
        assert_eq!(EntityId::from_name("Amit"), EntityId::from_name(" amit "));
        assert_ne!(EntityId::from_name("Amit"), EntityId::from_name("Sarah"));
        assert!(EntityId::from_name("Amit").as_str().starts_with("ent-"));
    }

    #[test]
    fn test_upsert_merges_and_counts() {
        let id = EntityId::new("e-1");
        let mut entity = Entity::from_upsert(
            EntityUpsert::new("Amit", "Person")
                .with_id(id.clone())
                .with_property("age", 41i64),
        );
        entity.has_conflict = true;
        entity.healing_count = 2;

        entity.apply_upsert(
            EntityUpsert::new("Amit K", "Person")
                .with_id(id)
                .with_property("city", "San Francisco"),
        );

        assert_eq!(entity.change_count, 2);
        assert_eq!(entity.name, "Amit K");
        assert!(entity.has_conflict);
        assert_eq!(entity.healing_count, 2);
        assert_eq!(entity.properties.len(), 2);
    }

    #[test]
    fn test_relationship_defaults() {
        let rel = Relationship::new(EntityId::new("a"), EntityId::new("b"), "WORKS_AT")
            .with_property("since", "2024");
        assert!(rel.is_current);
        assert!((rel.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(rel.properties["since"], PropertyValue::from("2024"));
    }

    #[test]
    fn test_property_value_untagged_serde() {
        let json = r#"{"n": 3, "x": 0.5, "flag": true, "when": "2024-01-01T00:00:00Z", "s": "hello"}"#;
        let props: Properties = serde_json::from_str(json).unwrap();
        assert_eq!(props["n"], PropertyValue::Integer(3));
        assert_eq!(props["x"], PropertyValue::Float(0.5));
        assert_eq!(props["flag"], PropertyValue::Bool(true));
        assert!(matches!(props["when"], PropertyValue::Timestamp(_)));
        assert_eq!(props["s"], PropertyValue::from("hello"));
    }
}
