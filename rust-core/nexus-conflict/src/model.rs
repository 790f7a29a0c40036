// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Conflict data model shared by the detector and the correction engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nexus_graph::{ConflictLogRecord, EntityId, RelationshipId, RelationshipSnapshot, Severity};
use serde::{Deserialize, Serialize};

use crate::DetectorError;

// ---------------------------------------------------------------------------
// DetectionMethod
// ---------------------------------------------------------------------------

/// Which scan produced a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// More than one outgoing edge of the same type on one entity.
    DuplicateRelationship,
    /// Low-confidence or non-current edges of one type on one entity.
    LowConfidence,
}

impl DetectionMethod {
    /// Prefix used in conflict identifiers.
    pub fn prefix(&self) -> &'static str {
        match self {
            DetectionMethod::DuplicateRelationship => "dup",
            DetectionMethod::LowConfidence => "contra",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::DuplicateRelationship => "duplicate_relationship",
            DetectionMethod::LowConfidence => "low_confidence",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate_relationship" => Ok(DetectionMethod::DuplicateRelationship),
            "low_confidence" => Ok(DetectionMethod::LowConfidence),
            other => Err(DetectorError::InvalidLogRecord(format!(
                "unknown detection method '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflict
// ---------------------------------------------------------------------------

/// A group of same-type edges on one entity that cannot all be true at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Deterministic: `{prefix}_{entity_id}_{relationship_type}`.
    pub conflict_id: String,
    pub entity_id: EntityId,
    pub entity_name: String,
    pub relationship_type: String,
    pub detection_method: DetectionMethod,
    /// Edge snapshots taken at detection time, oldest first.
    pub conflicting_relationships: Vec<RelationshipSnapshot>,
    pub detected_at: DateTime<Utc>,
    pub severity: Severity,
    pub description: String,
    /// Mirrors the persisted log. Only set by a detection cycle or healing.
    pub resolved: bool,
}

impl Conflict {
    /// Build the deterministic identifier for an (entity, type, method) triple.
    pub fn make_id(method: DetectionMethod, entity_id: &EntityId, relationship_type: &str) -> String {
        format!("{}_{}_{}", method.prefix(), entity_id, relationship_type)
    }

    pub fn relationship_ids(&self) -> impl Iterator<Item = &RelationshipId> {
        self.conflicting_relationships.iter().map(|r| &r.id)
    }

    pub fn contains_relationship(&self, id: &RelationshipId) -> bool {
        self.relationship_ids().any(|r| r == id)
    }

    /// Persisted shape of this conflict, unresolved.
    pub fn to_log_record(&self) -> ConflictLogRecord {
        ConflictLogRecord {
            id: self.conflict_id.clone(),
            entity_id: self.entity_id.clone(),
            entity_name: self.entity_name.clone(),
            relationship_type: self.relationship_type.clone(),
            detection_method: self.detection_method.as_str().to_string(),
            severity: self.severity,
            description: self.description.clone(),
            detected_at: self.detected_at,
            resolved: false,
            resolved_at: None,
            resolution_decision: None,
            conflicting_relationships: self.conflicting_relationships.clone(),
            previous_resolutions: Vec::new(),
        }
    }

    /// Rebuild a conflict from its persisted log record.
    pub fn from_log_record(record: ConflictLogRecord) -> Result<Self, DetectorError> {
        let detection_method = record.detection_method.parse()?;
        Ok(Self {
            conflict_id: record.id,
            entity_id: record.entity_id,
            entity_name: record.entity_name,
            relationship_type: record.relationship_type,
            detection_method,
            conflicting_relationships: record.conflicting_relationships,
            detected_at: record.detected_at,
            severity: record.severity,
            description: record.description,
            resolved: record.resolved,
        })
    }
}
