//! Transport abstraction between the adapter and the gateway.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// A bidirectional JSON message channel. Implemented over WebSocket in
/// applications; tests use [`pair`].
#[async_trait]
pub trait MessageChannel: Send {
    /// Send one message to the gateway.
    async fn send(&mut self, message: Value) -> ClientResult<()>;

    /// Receive the next message, or `None` once the connection is closed.
    async fn recv(&mut self) -> Option<Value>;
}

/// In-memory channel endpoint backed by tokio mpsc queues.
pub struct MemoryChannel {
    tx: mpsc::Sender<Value>,
    rx: mpsc::Receiver<Value>,
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn send(&mut self, message: Value) -> ClientResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|e| ClientError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

/// Create a connected pair of in-memory channels.
pub fn pair() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, a_rx) = mpsc::channel(64);
    let (b_tx, b_rx) = mpsc::channel(64);
    (
        MemoryChannel { tx: a_tx, rx: b_rx },
        MemoryChannel { tx: b_tx, rx: a_rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_is_bidirectional() {
        let (mut a, mut b) = pair();
        a.send(json!({"from": "a"})).await.unwrap();
        b.send(json!({"from": "b"})).await.unwrap();
        assert_eq!(b.recv().await.unwrap()["from"], "a");
        assert_eq!(a.recv().await.unwrap()["from"], "b");
    }

    #[tokio::test]
    async fn test_recv_none_after_peer_drop() {
        let (mut a, b) = pair();
        drop(b);
        assert!(a.recv().await.is_none());
    }
}
