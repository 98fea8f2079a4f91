//! Upgrade orchestration.
//!
//! The orchestrator drives a connected transport through the phase
//! sequence validate, upload, test, confirm, reset. Construction is
//! two-phase: an [`UpgradeBuilder`] carries configuration and observers
//! while disconnected, [`UpgradeBuilder::connect`] binds a transport and
//! yields the [`UpgradeManager`] with the run controls.

use thiserror::Error;

use crate::transport::TransportError;

pub mod manager;
pub mod progress;
mod runner;
pub mod state;

pub use manager::{UpgradeBuilder, UpgradeManager};
pub use state::{UpgradeMode, UpgradeState};

/// Rejections `start` reports synchronously, before any event is emitted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("An upgrade run is already in progress")]
    AlreadyRunning,
    #[error("Image set is empty")]
    EmptyImageSet,
}

/// Errors that abort a running upgrade.
///
/// Carried by the terminal `Failed` event together with the phase the run
/// was in. Cancellation is not an error and never appears here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpgradeError {
    #[error("Transport: {0}")]
    Transport(#[from] TransportError),

    #[error("Device rejected {op} (reason {reason})")]
    DeviceRejected { op: &'static str, reason: u8 },

    #[error("Unexpected acknowledgement to {op}: {ack}")]
    UnexpectedAck { op: &'static str, ack: String },

    #[error("Device did not come back within {waited_ms}ms after reset")]
    Timeout { waited_ms: u64 },
}
