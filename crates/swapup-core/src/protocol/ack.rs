//! Acknowledgement parsing.
//!
//! The device answers every command frame with a short ASCII
//! acknowledgement: `OKAY`, or `RJCT` followed by a reason byte.
//! Anything else is a protocol violation and is preserved for the
//! error message.

use std::fmt;

/// Parsed acknowledgement from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Command accepted (`OKAY`).
    Ok,
    /// Command rejected (`RJCT` + reason byte).
    Rejected { reason: u8 },
    /// Unrecognized response, kept for diagnostics.
    Other(Vec<u8>),
}

impl Ack {
    /// Parse an acknowledgement from raw response bytes.
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.len() >= 4 && &bytes[..4] == b"OKAY" {
            return Ack::Ok;
        }
        if bytes.len() >= 5 && &bytes[..4] == b"RJCT" {
            return Ack::Rejected { reason: bytes[4] };
        }
        Ack::Other(bytes.iter().take(8).copied().collect())
    }

    /// Whether the device accepted the command.
    pub fn is_ok(&self) -> bool {
        matches!(self, Ack::Ok)
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ack::Ok => write!(f, "OKAY"),
            Ack::Rejected { reason } => write!(f, "RJCT({reason})"),
            Ack::Other(bytes) => {
                let ascii: String = bytes
                    .iter()
                    .map(|&b| {
                        if b.is_ascii_graphic() || b == b' ' {
                            b as char
                        } else {
                            '.'
                        }
                    })
                    .collect();
                write!(f, "?'{ascii}'")
            }
        }
    }
}

/// Compose an `OKAY` acknowledgement. Used by device-side fakes.
pub fn okay() -> Vec<u8> {
    b"OKAY".to_vec()
}

/// Compose a `RJCT` acknowledgement with a reason byte.
pub fn reject(reason: u8) -> Vec<u8> {
    let mut buf = b"RJCT".to_vec();
    buf.push(reason);
    buf
}
