// SPDX-License-Identifier: PMPL-1.0-or-later

//! Deterministic arbiter for tests and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Arbiter, ArbiterError, ArbitrationRequest};
use crate::decision::ArbiterDecision;

type Responder = Box<dyn Fn(&ArbitrationRequest) -> Result<ArbiterDecision, ArbiterError> + Send + Sync>;

/// Replays queued responses, then falls back to a responder function.
///
/// ```
/// use nexus_healer::{ArbiterDecision, ScriptedArbiter};
///
/// let arbiter = ScriptedArbiter::new()
///     .then_decide(ArbiterDecision::degraded("first call fails"))
///     .otherwise(|req| {
///         let last = req.conflict.conflicting_relationships.last().map(|s| s.id.clone());
///         Ok(ArbiterDecision {
///             correct_relationship_id: last,
///             outdated_relationship_ids: Vec::new(),
///             confidence: 0.9,
///             reasoning: String::new(),
///             evidence_summary: String::new(),
///             tokens_used: 100,
///             error: None,
///         })
///     });
/// assert_eq!(arbiter.calls(), 0);
/// ```
pub struct ScriptedArbiter {
    queue: Mutex<VecDeque<Result<ArbiterDecision, ArbiterError>>>,
    fallback: Option<Responder>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedArbiter {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same decision.
    pub fn always(decision: ArbiterDecision) -> Self {
        Self::new().otherwise(move |_| Ok(decision.clone()))
    }

    pub fn then_decide(self, decision: ArbiterDecision) -> Self {
        self.push(Ok(decision))
    }

    pub fn then_fail(self, error: ArbiterError) -> Self {
        self.push(Err(error))
    }

    pub fn otherwise<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ArbitrationRequest) -> Result<ArbiterDecision, ArbiterError> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(responder));
        self
    }

    fn push(self, response: Result<ArbiterDecision, ArbiterError>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(response);
        }
        self
    }

    /// Number of arbitrate calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conflict ids in the order they were arbitrated.
    pub fn seen_conflicts(&self) -> Vec<String> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for ScriptedArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Arbiter for ScriptedArbiter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbiterDecision, ArbiterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.conflict.conflict_id.clone());
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match (queued, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(responder)) => responder(request),
            (None, None) => Err(ArbiterError::Exhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::test_support::two_edge_conflict;

    #[tokio::test]
    async fn test_queue_then_fallback_then_exhausted() {
        let request = ArbitrationRequest::new(two_edge_conflict(), Vec::new());

        let arbiter = ScriptedArbiter::new()
            .then_fail(ArbiterError::Transport("refused".into()))
            .then_decide(ArbiterDecision::degraded("x"));
        assert!(arbiter.arbitrate(&request).await.is_err());
        assert!(arbiter.arbitrate(&request).await.unwrap().is_error());
        assert_eq!(arbiter.arbitrate(&request).await.unwrap_err(), ArbiterError::Exhausted);
        assert_eq!(arbiter.calls(), 3);

        let always = ScriptedArbiter::always(ArbiterDecision::degraded("y"));
        for _ in 0..3 {
            assert!(always.arbitrate(&request).await.is_ok());
        }
        assert_eq!(always.seen_conflicts().len(), 3);
    }
}
