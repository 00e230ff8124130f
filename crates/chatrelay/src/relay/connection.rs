//! Client connection abstraction
//!
//! The relay only needs to push messages and close. A failed push means the
//! client went away, which the relay treats as a silent cancellation.

use async_trait::async_trait;
use axum::extract::ws::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

use super::envelope::{Framing, Outbound};

/// The client is no longer reachable
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("client disconnected")]
pub struct Disconnected;

/// Outbound side of one client connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Deliver one message to the client
    async fn send(&self, message: Outbound) -> Result<(), Disconnected>;

    /// Whether the client is still reachable
    fn is_open(&self) -> bool;

    /// Release the underlying connection
    async fn close(&self);
}

/// WebSocket connection backed by the socket writer task's channel
#[derive(Debug)]
pub struct WsConnection {
    tx: mpsc::UnboundedSender<Message>,
    framing: Framing,
    open: AtomicBool,
}

impl WsConnection {
    pub fn new(tx: mpsc::UnboundedSender<Message>, framing: Framing) -> Self {
        Self {
            tx,
            framing,
            open: AtomicBool::new(true),
        }
    }

    /// Called by the socket reader once the client has gone away
    pub fn mark_disconnected(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&self, message: Outbound) -> Result<(), Disconnected> {
        if !self.is_open() {
            return Err(Disconnected);
        }
        self.tx
            .send(Message::Text(message.render(self.framing).into()))
            .map_err(|_| Disconnected)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            // The writer task stops after forwarding the close frame
            let _ = self.tx.send(Message::Close(None));
        }
    }
}
