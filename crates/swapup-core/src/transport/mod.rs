//! Transport layer module.

pub mod logging;
pub mod mock;
pub mod traits;
pub mod usb;

pub use logging::{Direction, LoggedTransport, TracingTrafficLog, TrafficLog, TrafficRecord};
pub use mock::MockDevice;
pub use traits::{DEFAULT_MTU, DeviceTransport, TransportError};
pub use usb::UsbTransport;
