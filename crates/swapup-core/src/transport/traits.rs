//! Transport layer abstraction.
//!
//! Defines the `DeviceTransport` trait the orchestrator drives, allowing
//! different implementations (nusb, mock, etc.). A transport is an opaque
//! byte pipe: it moves frames and acknowledgements and reports liveness,
//! nothing more.

use thiserror::Error;

/// Default frame payload ceiling when a transport has no better answer.
pub const DEFAULT_MTU: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Abstract device transport.
///
/// This trait enables:
/// - Production implementation using nusb
/// - Mock implementation for unit testing
/// - Future alternative backends (serial, BLE bridge)
///
/// `send` is a full exchange: write one command frame, return the raw
/// acknowledgement bytes. Implementations must be usable from a worker
/// thread while control calls arrive from others.
pub trait DeviceTransport: Send + Sync {
    /// Write one frame and read the device's acknowledgement.
    fn send(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Check if the device is still reachable.
    fn is_connected(&self) -> bool;

    /// Largest chunk payload this transport wants per frame.
    fn mtu(&self) -> usize {
        DEFAULT_MTU
    }

    /// Short transport kind for logs ("usb", "mock", ...).
    fn kind(&self) -> &'static str {
        "device"
    }
}
