//! Request/response correlation across the subprocess boundary.
//!
//! Every gateway-originated request gets a fresh id and a pending entry
//! holding a oneshot sender. Settlement is idempotent by construction:
//! whichever of response, error, timeout, or teardown removes the entry
//! first wins, and later settlement attempts find nothing to settle.

use crate::error::{SupervisorError, SupervisorResult};
use lspgate_protocol::JsonRpcError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

#[derive(Debug)]
struct Pending {
    method: String,
    tx: oneshot::Sender<SupervisorResult<Value>>,
}

/// Correlates outbound JSON-RPC requests with their eventual responses.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Pending>>,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh request id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Record a pending request and return the receiver its settlement will
    /// arrive on.
    pub async fn register(
        &self,
        id: u64,
        method: impl Into<String>,
    ) -> oneshot::Receiver<SupervisorResult<Value>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            id,
            Pending {
                method: method.into(),
                tx,
            },
        );
        rx
    }

    /// Settle a pending request with a server response. Returns `false` if
    /// the id is unknown (already settled, timed out, or never ours).
    pub async fn settle(&self, id: u64, outcome: Result<Value, JsonRpcError>) -> bool {
        let entry = self.pending.lock().await.remove(&id);
        match entry {
            Some(pending) => {
                let outcome = outcome.map_err(SupervisorError::Rpc);
                // The receiver may already be dropped (caller timed out);
                // that is settlement too.
                let _ = pending.tx.send(outcome);
                true
            }
            None => {
                debug!(id, "response for unknown or already-settled request");
                false
            }
        }
    }

    /// Fail a pending request locally (timeout or teardown). Returns
    /// `false` if the entry was already settled.
    pub async fn fail(&self, id: u64, error: SupervisorError) -> bool {
        match self.pending.lock().await.remove(&id) {
            Some(pending) => {
                let _ = pending.tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Reject every outstanding request. Used on process exit and client
    /// disconnect so callers never wait on a dead process.
    pub async fn reject_all<F>(&self, make_error: F) -> usize
    where
        F: Fn(&str) -> SupervisorError,
    {
        let drained: Vec<(u64, Pending)> = self.pending.lock().await.drain().collect();
        let count = drained.len();
        for (id, pending) in drained {
            debug!(id, method = %pending.method, "rejecting in-flight request");
            let _ = pending.tx.send(Err(make_error(&pending.method)));
        }
        count
    }

    /// Number of requests currently in flight.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_settle_resolves_receiver() {
        let correlator = RequestCorrelator::new();
        let id = correlator.next_id();
        let rx = correlator.register(id, "textDocument/hover").await;

        assert!(correlator.settle(id, Ok(json!({"ok": true}))).await);
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_settle_with_error_object() {
        let correlator = RequestCorrelator::new();
        let id = correlator.next_id();
        let rx = correlator.register(id, "initialize").await;

        correlator
            .settle(id, Err(JsonRpcError::new(-32603, "internal")))
            .await;
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, Err(SupervisorError::Rpc(_))));
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let correlator = RequestCorrelator::new();
        let id = correlator.next_id();
        let _rx = correlator.register(id, "m").await;

        assert!(correlator.settle(id, Ok(json!(1))).await);
        assert!(!correlator.settle(id, Ok(json!(2))).await);
        assert!(
            !correlator
                .fail(id, SupervisorError::ClientDisconnected)
                .await
        );
    }

    #[tokio::test]
    async fn test_response_timeout_race_settles_once() {
        // Simulate a response and a timeout firing in the same tick: both
        // race to remove the entry, exactly one wins.
        let correlator = Arc::new(RequestCorrelator::new());
        for _ in 0..100 {
            let id = correlator.next_id();
            let _rx = correlator.register(id, "m").await;

            let a = {
                let c = Arc::clone(&correlator);
                tokio::spawn(async move { c.settle(id, Ok(json!(1))).await })
            };
            let b = {
                let c = Arc::clone(&correlator);
                tokio::spawn(async move {
                    c.fail(
                        id,
                        SupervisorError::Timeout {
                            method: "m".to_string(),
                            after: Duration::from_millis(1),
                        },
                    )
                    .await
                })
            };

            let (a, b) = (a.await.unwrap(), b.await.unwrap());
            assert!(a ^ b, "exactly one settlement must win");
        }
    }

    #[tokio::test]
    async fn test_reject_all_drains_pending() {
        let correlator = RequestCorrelator::new();
        let rx1 = correlator.register(correlator.next_id(), "a").await;
        let rx2 = correlator.register(correlator.next_id(), "b").await;
        assert_eq!(correlator.pending_count().await, 2);

        let rejected = correlator
            .reject_all(|_| SupervisorError::ClientDisconnected)
            .await;
        assert_eq!(rejected, 2);
        assert_eq!(correlator.pending_count().await, 0);
        assert!(matches!(
            rx1.await.unwrap(),
            Err(SupervisorError::ClientDisconnected)
        ));
        assert!(matches!(
            rx2.await.unwrap(),
            Err(SupervisorError::ClientDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let correlator = RequestCorrelator::new();
        let a = correlator.next_id();
        let b = correlator.next_id();
        assert_ne!(a, b);
    }
}
