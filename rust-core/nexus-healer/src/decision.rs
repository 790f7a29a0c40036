// SPDX-License-Identifier: PMPL-1.0-or-later

//! Arbiter decisions and tolerant parsing of arbiter output.
//!
//! Parsing never fails. Anything that is not a well-formed decision becomes a
//! degraded decision with `confidence = 0` and `error` set, which the engine
//! treats as "no correction applied".

use nexus_graph::RelationshipId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Verdict returned by an evidence arbiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterDecision {
    pub correct_relationship_id: Option<RelationshipId>,
    #[serde(default)]
    pub outdated_relationship_ids: Vec<RelationshipId>,
    /// Always within [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, rename = "supporting_evidence", alias = "evidenceSummary")]
    pub evidence_summary: String,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArbiterDecision {
    /// A decision that must not be applied.
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            correct_relationship_id: None,
            outdated_relationship_ids: Vec::new(),
            confidence: 0.0,
            reasoning: "Failed to analyze source documents".to_string(),
            evidence_summary: String::new(),
            tokens_used: 0,
            error: Some(error.into()),
        }
    }

    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Parse raw arbiter text (expected to hold a JSON object).
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => Self::from_json(&value),
            Err(e) => Self::degraded(format!("arbiter response is not valid JSON: {e}")),
        }
    }

    /// Interpret a JSON value as a decision.
    ///
    /// Field names are accepted in snake_case and camelCase. Confidence is
    /// clamped to [0, 1]. A missing or non-numeric confidence, a non-object
    /// payload, or an `error` field yield a degraded decision.
    pub fn from_json(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::degraded("arbiter response is not a JSON object");
        };

        let tokens_used = field(obj, &["tokens_used", "tokensUsed", "tokensConsumed", "tokens_consumed"])
            .and_then(Value::as_u64)
            .unwrap_or(0);

        if let Some(err) = field(obj, &["error"]).filter(|v| !v.is_null()) {
            let message = err
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Self::degraded(message).with_tokens(tokens_used);
        }

        let confidence = match field(obj, &["confidence"]).and_then(Value::as_f64) {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            _ => {
                return Self::degraded("arbiter response has no numeric confidence")
                    .with_tokens(tokens_used)
            }
        };

        let correct_relationship_id = field(obj, &["correct_relationship_id", "correctRelationshipId"])
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(RelationshipId::new);

        let outdated_relationship_ids = field(obj, &["outdated_relationship_ids", "outdatedRelationshipIds"])
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(RelationshipId::new)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            correct_relationship_id,
            outdated_relationship_ids,
            confidence,
            reasoning: text_field(obj, &["reasoning"]),
            evidence_summary: text_field(obj, &["supporting_evidence", "evidenceSummary", "evidence_summary"]),
            tokens_used,
            error: None,
        }
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

fn text_field(obj: &Map<String, Value>, names: &[&str]) -> String {
    match field(obj, names) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
