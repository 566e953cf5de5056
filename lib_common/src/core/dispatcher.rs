//! # Reading Dispatcher
//!
//! The broadcast hub for live dashboards. Every connected client owns an unbounded MPSC
//! channel; a broadcast pushes one `Arc` clone of the same `Reading` into each of them.
//!
//! ## Behaviour:
//!
//! 1.  **Zero-Copy Fan-out**: the snapshot is wrapped in an `Arc` once, clients only bump
//!     the reference count.
//! 2.  **Best-Effort Delivery**: there are no acknowledgements and no replay. A client whose
//!     receiver is gone is pruned during the broadcast that notices it.
//! 3.  **Targeted Send**: `send_to` delivers a single snapshot to one client, used for the
//!     initial state a dashboard receives on connect.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::sensors::Reading;

/// Receiving half handed to a client task.
pub type ReadingReceiver = mpsc::UnboundedReceiver<Arc<Reading>>;

/// # Client Handle
///
/// The dispatcher-side view of one connected subscriber.
struct ClientHandle {
    /// Unique id, assigned by the transport layer.
    id: usize,
    /// Sending half of the client's queue. Sends only fail once the receiver is dropped.
    sender: mpsc::UnboundedSender<Arc<Reading>>,
}

/// # Core Dispatcher
///
/// Registration, removal and fan-out for real-time subscribers.
#[derive(Default)]
pub struct Dispatcher {
    clients: Mutex<Vec<ClientHandle>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn clients(&self) -> MutexGuard<'_, Vec<ClientHandle>> {
        // A panic while holding the lock cannot leave the Vec half-modified
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// # Add Client
    ///
    /// Registers a client and returns the receiver that will see every later broadcast.
    /// Re-registering an id replaces the previous handle.
    pub fn add_client(&self, id: usize) -> ReadingReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut clients = self.clients();
        clients.retain(|c| c.id != id);
        clients.push(ClientHandle { id, sender: tx });
        log::info!("Client {} registered ({} connected)", id, clients.len());
        rx
    }

    /// Sends one snapshot to a single client. Returns `false` if the client is unknown or gone.
    pub fn send_to(&self, id: usize, reading: Arc<Reading>) -> bool {
        let clients = self.clients();
        clients
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.sender.send(reading).is_ok())
            .unwrap_or(false)
    }

    /// # Broadcast
    ///
    /// Pushes the snapshot to every registered client and drops the ones whose receiver has
    /// been closed. Returns the number of clients that accepted the snapshot.
    pub fn broadcast(&self, reading: Arc<Reading>) -> usize {
        let mut clients = self.clients();
        clients.retain(|client| match client.sender.send(Arc::clone(&reading)) {
            Ok(()) => true,
            Err(_) => {
                log::info!("Client {} disconnected. Removing from dispatcher.", client.id);
                false
            }
        });
        clients.len()
    }

    /// Removes a specific client by its id.
    pub fn remove_client(&self, id: usize) {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|c| c.id != id);
        if clients.len() != before {
            log::info!("Client {} removed ({} connected)", id, clients.len());
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients().len()
    }
}
