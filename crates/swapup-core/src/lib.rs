//! SwapUp-Core: dual-core firmware upgrade orchestration in Rust.
//!
//! This crate drives a complete firmware upgrade against a dual-core device:
//! package parsing, image validation, chunked upload, test/confirm
//! bookkeeping and the post-reset reconnect wait.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Command framing and device ACK parsing
//! - **Image**: Firmware image headers, digests and validation
//! - **Package**: Multi-image package container
//! - **Transport**: Device communication abstraction (usb, mock)
//! - **Upgrade**: State machine, background runner and manager handle
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use swapup_core::image::validate_all;
//! use swapup_core::transport::MockDevice;
//! use swapup_core::upgrade::{UpgradeManager, UpgradeMode};
//! use swapup_core::package;
//!
//! let raw = std::fs::read("firmware.swpk").expect("read package");
//! let candidates = package::extract(&raw).expect("parse package");
//! let images = validate_all(candidates).expect("validate images");
//!
//! let manager = UpgradeManager::builder().connect(Arc::new(MockDevice::new()));
//! manager
//!     .start(&images, UpgradeMode::TestAndConfirm)
//!     .expect("start upgrade");
//! ```

pub mod config;
pub mod events;
pub mod image;
pub mod package;
pub mod protocol;
pub mod transport;
pub mod upgrade;

// Re-exports for convenience
pub use config::UpgradeConfig;
pub use events::{NullObserver, TracingObserver, UpgradeEvent, UpgradeObserver};
pub use image::{CoreId, FirmwareImage, ImageCandidate, ImageError, validate_all};
pub use package::{PackageBuilder, PackageError};
pub use protocol::Ack;
pub use transport::{DeviceTransport, MockDevice, TransportError, UsbTransport};
pub use upgrade::{StartError, UpgradeError, UpgradeManager, UpgradeMode, UpgradeState};
