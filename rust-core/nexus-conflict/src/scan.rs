// SPDX-License-Identifier: PMPL-1.0-or-later

//! Pure conflict scans over a graph snapshot.
//!
//! These functions read entity and edge lists and never touch the store, so
//! they can be unit-tested and benchmarked without a backend.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use nexus_graph::{Entity, EntityId, Relationship, RelationshipSnapshot, Severity};

use crate::model::{Conflict, DetectionMethod};
use crate::severity::assess_severity_within;
use crate::DetectorConfig;

type Groups<'a> = BTreeMap<(&'a EntityId, &'a str), Vec<&'a Relationship>>;

fn group_by_source_and_type<'a>(
    relationships: impl Iterator<Item = &'a Relationship>,
) -> Groups<'a> {
    let mut groups: Groups<'a> = BTreeMap::new();
    for rel in relationships {
        groups
            .entry((&rel.source_entity_id, rel.relationship_type.as_str()))
            .or_default()
            .push(rel);
    }
    groups
}

struct Names<'a>(HashMap<&'a EntityId, &'a str>);

impl<'a> Names<'a> {
    fn new(entities: &'a [Entity]) -> Self {
        Self(entities.iter().map(|e| (&e.id, e.name.as_str())).collect())
    }

    fn get(&self, id: &EntityId) -> String {
        self.0
            .get(id)
            .map(|n| n.to_string())
            .unwrap_or_else(|| id.to_string())
    }
}

fn snapshots(edges: &[&Relationship], names: &Names<'_>) -> Vec<RelationshipSnapshot> {
    let mut out: Vec<RelationshipSnapshot> = edges
        .iter()
        .map(|rel| RelationshipSnapshot::capture(rel, names.get(&rel.target_entity_id)))
        .collect();
    out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    out
}

/// Entities with more than one outgoing edge of the same type.
pub fn duplicate_conflicts(
    entities: &[Entity],
    relationships: &[Relationship],
    now: DateTime<Utc>,
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let names = Names::new(entities);
    let window = Duration::days(config.recent_window_days);

    group_by_source_and_type(relationships.iter())
        .into_iter()
        .filter(|(_, edges)| edges.len() > 1)
        .map(|((entity_id, rel_type), edges)| {
            let entity_name = names.get(entity_id);
            let conflicting = snapshots(&edges, &names);
            let severity = assess_severity_within(&conflicting, now, window);
            Conflict {
                conflict_id: Conflict::make_id(
                    DetectionMethod::DuplicateRelationship,
                    entity_id,
                    rel_type,
                ),
                entity_id: entity_id.clone(),
                description: format!(
                    "Entity '{}' has {} relationships of type '{}'",
                    entity_name,
                    conflicting.len(),
                    rel_type
                ),
                entity_name,
                relationship_type: rel_type.to_string(),
                detection_method: DetectionMethod::DuplicateRelationship,
                conflicting_relationships: conflicting,
                detected_at: now,
                severity,
                resolved: false,
            }
        })
        .collect()
}

/// Whether an edge counts as low-confidence or stale.
///
/// Edges demoted by a healing verdict (`outdated_at` set) are settled history
/// and do not count, otherwise every successful correction would raise a new
/// conflict on its own losers. Ingestion always writes current edges, so the
/// stale arm only fires for edges written non-current without a verdict, such
/// as imported history or direct store writes.
pub fn is_suspect(rel: &Relationship, config: &DetectorConfig) -> bool {
    if rel.outdated_at.is_some() {
        return false;
    }
    rel.confidence < config.low_confidence_threshold || !rel.is_current
}

/// Entities with low-confidence or non-current edges, grouped by type.
pub fn low_confidence_conflicts(
    entities: &[Entity],
    relationships: &[Relationship],
    now: DateTime<Utc>,
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let names = Names::new(entities);

    group_by_source_and_type(relationships.iter().filter(|r| is_suspect(r, config)))
        .into_iter()
        .map(|((entity_id, rel_type), edges)| {
            let entity_name = names.get(entity_id);
            Conflict {
                conflict_id: Conflict::make_id(DetectionMethod::LowConfidence, entity_id, rel_type),
                entity_id: entity_id.clone(),
                description: format!(
                    "Entity '{}' has low-confidence or outdated relationships of type '{}'",
                    entity_name, rel_type
                ),
                entity_name,
                relationship_type: rel_type.to_string(),
                detection_method: DetectionMethod::LowConfidence,
                conflicting_relationships: snapshots(&edges, &names),
                detected_at: now,
                severity: Severity::Medium,
                resolved: false,
            }
        })
        .collect()
}

/// Union of both scans: duplicates first, then low-confidence.
pub fn all_conflicts(
    entities: &[Entity],
    relationships: &[Relationship],
    now: DateTime<Utc>,
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let mut conflicts = duplicate_conflicts(entities, relationships, now, config);
    conflicts.extend(low_confidence_conflicts(entities, relationships, now, config));
    conflicts
}
