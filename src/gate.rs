//! Serializes all access to the receiver's single TCP connection slot.
//!
//! The receiver accepts one client at a time (a new connection evicts the old one) and has no
//! command queue. Every command and every poll cycle therefore runs through
//! [`OperationExecutor::execute`], which:
//!
//! 1. Acquires the [`ConnectionGate`] (FIFO, no timeout).
//! 2. Waits out the minimum spacing since the previous operation released the gate.
//! 3. Connects a [`Link`]. A failed connect releases the gate and returns `None`.
//! 4. Lends the `Link` to the operation.
//! 5. Disconnects (including the cleanup delay), even if the operation panicked.
//! 6. Releases the gate, recording the release time.
//!
//! A `Link` cannot be created anywhere else, so no code path can reach the socket without
//! holding the gate.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, warn};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};

use crate::connection_settings::ConnectionSettings;

mod link;

pub use link::Link;

// ------------------------------------------------------------------------------------------------
// ConnectionGate

/// Mutual exclusion plus minimum inter-operation spacing.
///
/// The lock protects the time of the last release. `tokio::sync::Mutex` queues waiters in FIFO
/// order.
struct ConnectionGate {
    last_release: Mutex<Option<Instant>>,
    spacing: Duration,
}

/// Held for the whole connect-operate-disconnect block. Records the release time when dropped.
struct GatePermit<'a> {
    last_release: MutexGuard<'a, Option<Instant>>,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        *self.last_release = Some(Instant::now());
    }
}

impl ConnectionGate {
    fn new(spacing: Duration) -> Self {
        ConnectionGate {
            last_release: Mutex::new(None),
            spacing,
        }
    }

    async fn acquire(&self) -> GatePermit<'_> {
        let last_release = self.last_release.lock().await;

        if let Some(released_at) = *last_release {
            let ready_at = released_at + self.spacing;

            if Instant::now() < ready_at {
                debug!(
                    "Waiting {:?} for operation spacing",
                    ready_at.saturating_duration_since(Instant::now())
                );
                sleep_until(ready_at).await;
            }
        }

        GatePermit { last_release }
    }
}

// ================================================================================================
// OperationExecutor

/// The connect-operate-disconnect template every receiver interaction goes through.
pub struct OperationExecutor {
    settings: ConnectionSettings,
    gate: ConnectionGate,
}

impl OperationExecutor {
    pub fn new(settings: ConnectionSettings) -> Self {
        let gate = ConnectionGate::new(settings.operation_spacing);

        OperationExecutor { settings, gate }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Run `operation` against a freshly-connected [`Link`], under the gate.
    ///
    /// Returns `None` if the receiver could not be reached, otherwise the operation's own result.
    /// There is no cancellation once the gate is held: the operation always runs to completion
    /// and the link is always disconnected before the gate is released. A panicking operation is
    /// resumed only after that cleanup.
    pub async fn execute<T, F>(&self, name: &str, operation: F) -> Option<T>
    where
        F: for<'l> FnOnce(&'l mut Link) -> BoxFuture<'l, T> + Send,
        T: Send,
    {
        let permit = self.gate.acquire().await;
        debug!("Gate acquired for operation: {}", name);

        let Some(mut link) = Link::connect(&self.settings).await else {
            warn!("Operation '{}' skipped: receiver unreachable", name);
            return None;
        };

        let result = AssertUnwindSafe(operation(&mut link)).catch_unwind().await;

        link.disconnect().await;
        drop(permit);
        debug!("Gate released after operation: {}", name);

        match result {
            Ok(value) => Some(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

// ================================================================================================
// Tests
