//! # Sensor State
//!
//! Owns the one `Reading` of the process. Both trigger paths (upstream events and manual
//! injection) go through the same async mutex, and the lock is held across
//! update -> persist -> broadcast so a broadcast never carries a state older than its own
//! trigger and concurrent triggers cannot lose each other's writes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;

use crate::core::dispatcher::{Dispatcher, ReadingReceiver};
use crate::sensors::{normalizer, DeviceEvent, Reading, ReadingPatch, SensorError};

/// Append-only destination for reading snapshots.
pub trait EventSink: Send + Sync {
    fn append<'a>(&'a self, reading: &'a Reading) -> BoxFuture<'a, Result<(), SensorError>>;
}

/// Upper bounds on the waits inside the state.
#[derive(Debug, Clone, Copy)]
pub struct StateOptions {
    /// How long a request path may wait for the state lock. Upstream events wait unbounded.
    pub lock_timeout: Duration,
    /// How long a single persistence attempt may hold up the broadcast.
    pub persist_timeout: Duration,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            persist_timeout: Duration::from_secs(3),
        }
    }
}

pub struct SensorState {
    reading: Mutex<Reading>,
    dispatcher: Dispatcher,
    sink: Option<Arc<dyn EventSink>>,
    options: StateOptions,
}

impl SensorState {
    /// Creates the state with an empty reading. `sink` is `None` when persistence is off.
    pub fn new(sink: Option<Arc<dyn EventSink>>, options: StateOptions) -> Self {
        Self {
            reading: Mutex::new(Reading::new()),
            dispatcher: Dispatcher::new(),
            sink,
            options,
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Reading>, SensorError> {
        timeout(self.options.lock_timeout, self.reading.lock())
            .await
            .map_err(|_| SensorError::Timeout("the sensor state lock"))
    }

    /// A copy of the current reading.
    pub async fn snapshot(&self) -> Result<Reading, SensorError> {
        Ok(self.lock().await?.clone())
    }

    /// Normalizes an upstream event into the reading, then persists and broadcasts it.
    ///
    /// Waits for the lock without a bound: the upstream loop has no caller to fail back to,
    /// so giving up here would drop the event.
    pub async fn apply_event(&self, event: &DeviceEvent) -> Reading {
        let mut guard = self.reading.lock().await;
        let next = normalizer::apply(&guard, event, normalizer::stamp_now());
        self.commit(&mut guard, next).await
    }

    /// Merges a manual patch over the reading, bypassing the normalizer rules.
    pub async fn inject(&self, patch: ReadingPatch) -> Result<Reading, SensorError> {
        if !patch.ignored.is_empty() {
            log::warn!("Ignoring unknown reading fields: {:?}", patch.ignored_keys());
        }
        let mut guard = self.lock().await?;
        let next = patch.merge_into(&guard, normalizer::stamp_now());
        Ok(self.commit(&mut guard, next).await)
    }

    async fn commit(&self, current: &mut Reading, next: Reading) -> Reading {
        *current = next.clone();
        self.persist(&next).await;
        let delivered = self.dispatcher.broadcast(Arc::new(next.clone()));
        log::debug!(
            "Reading updated (deviceType={:?}), pushed to {} subscriber(s)",
            next.device_type,
            delivered
        );
        next
    }

    /// Persistence failures are logged and swallowed; the broadcast always follows.
    async fn persist(&self, reading: &Reading) {
        let Some(sink) = &self.sink else {
            return;
        };
        match timeout(self.options.persist_timeout, sink.append(reading)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Error saving reading to the event log: {}", e),
            Err(_) => log::error!(
                "Saving reading to the event log timed out after {} ms",
                self.options.persist_timeout.as_millis()
            ),
        }
    }

    /// Registers a real-time subscriber. The current reading is queued for it before any
    /// later broadcast can be.
    pub async fn subscribe(&self, client_id: usize) -> Result<ReadingReceiver, SensorError> {
        let guard = self.lock().await?;
        let rx = self.dispatcher.add_client(client_id);
        self.dispatcher.send_to(client_id, Arc::new(guard.clone()));
        Ok(rx)
    }

    pub fn unsubscribe(&self, client_id: usize) {
        self.dispatcher.remove_client(client_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.dispatcher.client_count()
    }
}
