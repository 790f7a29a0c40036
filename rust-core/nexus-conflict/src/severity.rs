// SPDX-License-Identifier: PMPL-1.0-or-later

//! Severity scoring for duplicate-relationship conflicts.

use chrono::{DateTime, Duration, Utc};
use nexus_graph::{RelationshipSnapshot, Severity};

/// Default recency window for the `high` rule.
pub const RECENT_WINDOW_DAYS: i64 = 30;

/// Score a group of same-type edges at time `now` with the default window.
pub fn assess_severity(edges: &[RelationshipSnapshot], now: DateTime<Utc>) -> Severity {
    assess_severity_within(edges, now, Duration::days(RECENT_WINDOW_DAYS))
}

/// Score a group of same-type edges.
///
/// - `High` if more than one edge is younger than `window` at `now`
///   (future-dated edges count as recent).
/// - `Medium` if the group has more than two edges.
/// - `Low` otherwise.
pub fn assess_severity_within(
    edges: &[RelationshipSnapshot],
    now: DateTime<Utc>,
    window: Duration,
) -> Severity {
    let recent = edges.iter().filter(|e| now - e.timestamp < window).count();
    if recent > 1 {
        Severity::High
    } else if edges.len() > 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
