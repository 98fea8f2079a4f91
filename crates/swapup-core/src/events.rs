//! Event system for UI decoupling.
//!
//! Allows CLI/TUI/GUI to subscribe to upgrade events without tight
//! coupling to the orchestrator. All events of one run are delivered in
//! order from that run's worker thread, so an observer needs no
//! synchronization across the events of a single run. Exactly one terminal
//! event (`Completed`, `Failed` or `Cancelled`) ends each run, and it is
//! always the last event of the run.

use std::time::SystemTime;

use crate::upgrade::{UpgradeError, UpgradeState};

/// Events emitted during an upgrade run.
#[derive(Debug, Clone)]
pub enum UpgradeEvent {
    /// Run accepted, worker is up.
    Started,
    /// State machine moved along an edge.
    StateChanged {
        from: UpgradeState,
        to: UpgradeState,
    },
    /// Upload progress for the current image. Resets per image.
    Progress {
        bytes_sent: u64,
        image_size: u64,
        timestamp: SystemTime,
    },
    /// Terminal: the device swapped and came back online.
    Completed,
    /// Terminal: the run failed in `state`.
    Failed {
        state: UpgradeState,
        error: UpgradeError,
    },
    /// Terminal: the caller cancelled the run while in `state`.
    Cancelled { state: UpgradeState },
}

impl UpgradeEvent {
    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpgradeEvent::Completed | UpgradeEvent::Failed { .. } | UpgradeEvent::Cancelled { .. }
        )
    }
}

/// Observer trait for receiving upgrade events.
///
/// Implement this trait in your UI layer to receive updates. Callbacks run
/// on the worker thread; control calls (`pause`, `resume`, `cancel`) are
/// safe to make from inside a callback.
pub trait UpgradeObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &UpgradeEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl UpgradeObserver for NullObserver {
    fn on_event(&self, _event: &UpgradeEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl UpgradeObserver for TracingObserver {
    fn on_event(&self, event: &UpgradeEvent) {
        match event {
            UpgradeEvent::Started => {
                tracing::info!("Upgrade started");
            }
            UpgradeEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "State changed");
            }
            UpgradeEvent::Progress {
                bytes_sent,
                image_size,
                ..
            } => {
                let pct = if *image_size > 0 {
                    (*bytes_sent * 100) / *image_size
                } else {
                    0
                };
                tracing::debug!(
                    bytes = bytes_sent,
                    total = image_size,
                    progress = %format!("{pct}%"),
                    "Upload progress"
                );
            }
            UpgradeEvent::Completed => {
                tracing::info!("Upgrade complete");
            }
            UpgradeEvent::Failed { state, error } => {
                tracing::error!(state = %state, "Upgrade failed: {error}");
            }
            UpgradeEvent::Cancelled { state } => {
                tracing::warn!(state = %state, "Upgrade cancelled");
            }
        }
    }
}
