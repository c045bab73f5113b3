//! Connected client registry.
//!
//! Each WebSocket connection owns a bounded queue; the registry holds the
//! sending halves. Broadcasting never awaits, so the lock is only held for
//! a non-blocking pass over the map.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Queue depth per client. A single pending reload is enough.
const CLIENT_QUEUE_CAPACITY: usize = 4;

/// Identifier of a connected client.
pub(crate) type ClientId = u64;

/// Instruction delivered to a connection task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ClientMessage {
    /// Tell the browser to reload.
    Reload,
    /// Server is shutting down; close the socket.
    Close,
}

/// Set of currently connected reload clients.
pub(crate) struct Notifier {
    clients: Mutex<HashMap<ClientId, mpsc::Sender<ClientMessage>>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new client and return its id and message queue.
    pub(crate) fn connect(&self) -> (ClientId, mpsc::Receiver<ClientMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        self.clients.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub(crate) fn disconnect(&self, id: ClientId) -> bool {
        self.clients.lock().unwrap().remove(&id).is_some()
    }

    /// Number of connected clients.
    pub(crate) fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Send a reload instruction to every connected client.
    ///
    /// Clients whose connection task has gone away are dropped from the set.
    /// A client with a full queue already has a reload pending and still
    /// counts as notified. Returns the number of clients notified.
    pub(crate) fn broadcast_reload(&self) -> usize {
        let mut clients = self.clients.lock().unwrap();
        let mut notified = 0;

        clients.retain(|id, tx| match tx.try_send(ClientMessage::Reload) {
            Ok(()) => {
                notified += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(client = id, "Reload already queued");
                notified += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(client = id, "Dropping closed client");
                false
            }
        });

        tracing::info!(clients = notified, "Notified clients to reload");
        notified
    }

    /// Ask every client to close and empty the set.
    pub(crate) fn close_all(&self) {
        let clients: Vec<_> = self.clients.lock().unwrap().drain().collect();
        let count = clients.len();

        for (_, tx) in clients {
            let _ = tx.try_send(ClientMessage::Close);
        }

        if count > 0 {
            tracing::info!(clients = count, "Closing live reload connections");
        }
    }
}
