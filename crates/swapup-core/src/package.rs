//! Firmware package container.
//!
//! A package is a flat binary container holding one image per core slot:
//!
//! ```text
//! "SWPK" | version u8 | count u8 | reserved u16
//! per entry: core u8 | reserved u8 | reserved u16 | len u32 | content
//! ```
//!
//! All integers little-endian. Extraction yields raw [`ImageCandidate`]s in
//! container order; validation is a separate step (`image::validate_all`).

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::path::Path;
use thiserror::Error;

use crate::image::{CoreId, ImageCandidate};

/// Magic at the start of every package file.
pub const PACKAGE_MAGIC: &[u8; 4] = b"SWPK";

/// Container format version this crate reads and writes.
pub const PACKAGE_VERSION: u8 = 1;

const FILE_HEADER_LEN: usize = 8;
const ENTRY_HEADER_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Not a firmware package: {0}")]
    Format(String),
    #[error("Package contains no images")]
    Empty,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read a package file and extract its image candidates.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<ImageCandidate>, PackageError> {
    let bytes = std::fs::read(path)?;
    extract(&bytes)
}

/// Extract image candidates from package bytes.
///
/// The whole container must parse: a truncated entry or trailing bytes
/// reject the package, a well-formed package with no entries is `Empty`.
pub fn extract(bytes: &[u8]) -> Result<Vec<ImageCandidate>, PackageError> {
    if bytes.len() < FILE_HEADER_LEN {
        return Err(PackageError::Format(format!(
            "{} bytes is too small for a package header",
            bytes.len()
        )));
    }
    if &bytes[..4] != PACKAGE_MAGIC {
        return Err(PackageError::Format("bad magic".into()));
    }
    let version = bytes[4];
    if version != PACKAGE_VERSION {
        return Err(PackageError::Format(format!(
            "unsupported container version {version}"
        )));
    }
    let count = bytes[5] as usize;

    let mut offset = FILE_HEADER_LEN;
    let mut candidates = Vec::with_capacity(count);
    for index in 0..count {
        if bytes.len() < offset + ENTRY_HEADER_LEN {
            return Err(PackageError::Format(format!("truncated entry {index}")));
        }
        let core = CoreId::from_raw(bytes[offset]);
        let len = LittleEndian::read_u32(&bytes[offset + 4..offset + 8]) as usize;
        offset += ENTRY_HEADER_LEN;
        if bytes.len() < offset + len {
            return Err(PackageError::Format(format!(
                "truncated content for entry {index}"
            )));
        }
        candidates.push(ImageCandidate {
            core,
            content: bytes[offset..offset + len].to_vec(),
        });
        offset += len;
    }
    if offset != bytes.len() {
        return Err(PackageError::Format(format!(
            "{} trailing bytes after last entry",
            bytes.len() - offset
        )));
    }
    if candidates.is_empty() {
        return Err(PackageError::Empty);
    }
    Ok(candidates)
}

/// Writer for package files, used by tooling and tests.
///
/// By convention the app core entry precedes the net core entry.
#[derive(Debug, Default)]
pub struct PackageBuilder {
    entries: Vec<(CoreId, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, core: CoreId, content: Vec<u8>) -> Self {
        self.entries.push((core, content));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(PACKAGE_MAGIC);
        buf.push(PACKAGE_VERSION);
        buf.push(self.entries.len() as u8);
        buf.write_u16::<LittleEndian>(0).unwrap();
        for (core, content) in &self.entries {
            buf.push(core.raw());
            buf.push(0);
            buf.write_u16::<LittleEndian>(0).unwrap();
            buf.write_u32::<LittleEndian>(content.len() as u32).unwrap();
            buf.extend_from_slice(content);
        }
        buf
    }
}
