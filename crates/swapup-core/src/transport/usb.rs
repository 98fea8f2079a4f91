//! nusb-based USB transport implementation.

use nusb::transfer::{Bulk, In, Out};
use nusb::{MaybeFuture, list_devices};
use std::io::{Read, Write};
use tracing::{debug, info, instrument};

use super::traits::{DeviceTransport, TransportError};

/// Default vendor id scanned by [`UsbTransport::open`].
pub const DEFAULT_VENDOR_ID: u16 = 0x1915;

/// Product ids the open scan accepts.
pub const SUPPORTED_PIDS: &[u16] = &[0x520F, 0x521F];

/// USB transport over bulk endpoints.
pub struct UsbTransport {
    interface: nusb::Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    vid: u16,
    pid: u16,
}

impl UsbTransport {
    /// Open any matching device (tries all supported PIDs).
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if device_info.vendor_id() == DEFAULT_VENDOR_ID
                && SUPPORTED_PIDS.contains(&device_info.product_id())
            {
                return Self::open_device_info(device_info);
            }
        }

        Err(TransportError::DeviceNotFound {
            vid: DEFAULT_VENDOR_ID,
            pid: 0,
        })
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| TransportError::OpenFailed(format!("claim interface 0: {e}")))?;

        // Find BULK endpoints
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() == 0 {
                    for alt in iface.alt_settings() {
                        for ep in alt.endpoints() {
                            if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                                if ep.direction() == nusb::transfer::Direction::In {
                                    in_endpoint = ep.address();
                                } else {
                                    out_endpoint = ep.address();
                                }
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::OpenFailed("no bulk IN endpoint".into()));
        }
        if out_endpoint == 0 {
            return Err(TransportError::OpenFailed("no bulk OUT endpoint".into()));
        }

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
            vid,
            pid,
        })
    }

    pub fn vendor_id(&self) -> u16 {
        self.vid
    }

    pub fn product_id(&self) -> u16 {
        self.pid
    }
}

impl DeviceTransport for UsbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn send(&self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut writer = ep.writer(4096);
        writer
            .write_all(data)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let ep = self
            .interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut reader = ep.reader(4096);
        let mut buf = vec![0u8; 512];
        let n = reader
            .read(&mut buf)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        if n == 0 {
            return Err(TransportError::ReadFailed("empty acknowledgement".into()));
        }
        buf.truncate(n);

        debug!(sent = data.len(), received = n, "Exchange complete");
        Ok(buf)
    }

    fn is_connected(&self) -> bool {
        // nusb doesn't provide a direct "is connected" check; liveness is
        // probed with PING frames instead.
        true
    }

    fn mtu(&self) -> usize {
        512
    }

    fn kind(&self) -> &'static str {
        "usb"
    }
}
