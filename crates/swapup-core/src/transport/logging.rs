//! Traffic logging around a transport.
//!
//! `LoggedTransport` wraps any [`DeviceTransport`] and mirrors each frame
//! and acknowledgement into a [`TrafficLog`] sink. The wrapper is optional;
//! runs behave identically without it.

use std::fmt;
use std::sync::Arc;

use super::traits::{DeviceTransport, TransportError};
use crate::protocol::frame;

/// Frame direction relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "TX"),
            Direction::Rx => write!(f, "RX"),
        }
    }
}

/// One logged frame or acknowledgement.
#[derive(Debug, Clone)]
pub struct TrafficRecord {
    pub direction: Direction,
    /// ASCII tag for outgoing frames, "ack" for responses.
    pub label: String,
    /// Full length on the wire.
    pub length: usize,
    /// Leading bytes, capped for display.
    pub preview: Vec<u8>,
}

impl TrafficRecord {
    const PREVIEW_LEN: usize = 16;

    fn outgoing(data: &[u8]) -> Self {
        let label = match frame::tag_of(data) {
            Some(tag) => String::from_utf8_lossy(&tag).into_owned(),
            None => "????".into(),
        };
        Self {
            direction: Direction::Tx,
            label,
            length: data.len(),
            preview: data.iter().take(Self::PREVIEW_LEN).copied().collect(),
        }
    }

    fn incoming(data: &[u8]) -> Self {
        Self {
            direction: Direction::Rx,
            label: "ack".into(),
            length: data.len(),
            preview: data.iter().take(Self::PREVIEW_LEN).copied().collect(),
        }
    }
}

/// Sink for transport traffic.
pub trait TrafficLog: Send + Sync {
    fn record(&self, record: &TrafficRecord);
}

/// Traffic sink that forwards to tracing at trace level.
pub struct TracingTrafficLog;

impl TrafficLog for TracingTrafficLog {
    fn record(&self, record: &TrafficRecord) {
        tracing::trace!(
            dir = %record.direction,
            label = %record.label,
            len = record.length,
            "traffic"
        );
    }
}

/// Transport wrapper that mirrors traffic into a sink.
pub struct LoggedTransport {
    inner: Arc<dyn DeviceTransport>,
    sink: Arc<dyn TrafficLog>,
}

impl LoggedTransport {
    pub fn new(inner: Arc<dyn DeviceTransport>, sink: Arc<dyn TrafficLog>) -> Self {
        Self { inner, sink }
    }
}

impl DeviceTransport for LoggedTransport {
    fn send(&self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.sink.record(&TrafficRecord::outgoing(data));
        let result = self.inner.send(data);
        if let Ok(answer) = &result {
            self.sink.record(&TrafficRecord::incoming(answer));
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn mtu(&self) -> usize {
        self.inner.mtu()
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockDevice;
    use std::sync::Mutex;

    struct CollectingLog(Mutex<Vec<TrafficRecord>>);

    impl TrafficLog for CollectingLog {
        fn record(&self, record: &TrafficRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    #[test]
    fn test_logged_transport_mirrors_both_directions() {
        let sink = Arc::new(CollectingLog(Mutex::new(Vec::new())));
        let logged = LoggedTransport::new(Arc::new(MockDevice::new()), sink.clone());

        logged.send(&frame::ping()).unwrap();

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].direction, Direction::Tx);
        assert_eq!(records[0].label, "PING");
        assert_eq!(records[1].direction, Direction::Rx);
        assert_eq!(records[1].preview, b"OKAY");
    }

    #[test]
    fn test_preview_is_capped() {
        let record = TrafficRecord::outgoing(&frame::chunk(0, &[0xAA; 256]));
        assert_eq!(record.length, 12 + 256);
        assert_eq!(record.preview.len(), TrafficRecord::PREVIEW_LEN);
    }
}
