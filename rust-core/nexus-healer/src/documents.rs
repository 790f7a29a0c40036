// SPDX-License-Identifier: PMPL-1.0-or-later

//! Evidence documents for arbitration.

use nexus_conflict::Conflict;
use nexus_graph::RelationshipSnapshot;

/// One document per conflicting edge, in snapshot order.
///
/// Document text is synthesised from the edge's source reference and
/// metadata. Edges without a source reference get a placeholder, so the
/// output always has one entry per edge.
pub fn fetch_source_documents(conflict: &Conflict) -> Vec<String> {
    conflict
        .conflicting_relationships
        .iter()
        .map(|snap| render_document(conflict, snap))
        .collect()
}

fn render_document(conflict: &Conflict, snap: &RelationshipSnapshot) -> String {
    let Some(source) = snap.source_document.as_deref().filter(|s| !s.is_empty()) else {
        return format!("Relationship to {} (no source document)", snap.target_name);
    };
    let properties = serde_json::to_string(&snap.properties).unwrap_or_else(|_| "{}".into());
    format!(
        "Source Document: {source}\n\
         Entity: {entity}\n\
         Relationship: {rel_type} -> {target}\n\
         Timestamp: {timestamp}\n\
         Confidence: {confidence}\n\
         Additional Info: {properties}\n",
        entity = conflict.entity_name,
        rel_type = conflict.relationship_type,
        target = snap.target_name,
        timestamp = snap.timestamp.to_rfc3339(),
        confidence = snap.confidence,
    )
}
