//! Firmware images and their validation.
//!
//! A package yields [`ImageCandidate`]s (raw content per core slot). The
//! validator turns the whole set into [`FirmwareImage`]s or rejects the set
//! as a whole: either every candidate parses, or none is accepted.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod header;

pub use header::{HEADER_LEN, HeaderError, IMAGE_MAGIC, ImageHeader, ImageVersion};

/// SHA-256 digest length in bytes.
pub const DIGEST_LEN: usize = 32;

/// Core slot an image targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreId {
    /// Application core (index 0).
    App,
    /// Network core (index 1).
    Net,
    /// Any other core index.
    Unknown(u8),
}

impl CoreId {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => CoreId::App,
            1 => CoreId::Net,
            other => CoreId::Unknown(other),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            CoreId::App => 0,
            CoreId::Net => 1,
            CoreId::Unknown(other) => *other,
        }
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreId::App => write!(f, "app core"),
            CoreId::Net => write!(f, "net core"),
            CoreId::Unknown(other) => write!(f, "core {other}"),
        }
    }
}

/// Raw image content extracted from a package, not yet validated.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub core: CoreId,
    pub content: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image {index} ({core}): {source}")]
    Invalid {
        index: usize,
        core: CoreId,
        #[source]
        source: HeaderError,
    },
}

/// A validated firmware image ready for upload.
///
/// Content lives behind an `Arc` so callers keep the set across runs (for a
/// retry after failure) while an active run holds a read-only reference.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    core: CoreId,
    content: Arc<[u8]>,
    digest: [u8; DIGEST_LEN],
    header: ImageHeader,
}

impl FirmwareImage {
    fn from_candidate(candidate: ImageCandidate) -> Result<Self, HeaderError> {
        let header = ImageHeader::parse(&candidate.content)?;
        let digest = digest_of(&candidate.content);
        Ok(Self {
            core: candidate.core,
            content: candidate.content.into(),
            digest,
            header,
        })
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Full image content, header included.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// SHA-256 over the full content.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn version(&self) -> ImageVersion {
        self.header.version
    }

    /// Short digest label for display: first three bytes, upper-case hex.
    pub fn digest_label(&self) -> String {
        hex::encode_upper(&self.digest[..3])
    }

    /// Human-readable size label.
    pub fn size_label(&self) -> String {
        let bytes = self.content.len();
        if bytes < 1024 {
            format!("{bytes} B")
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        }
    }
}

/// SHA-256 digest over image content.
pub fn digest_of(content: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.finalize().into()
}

/// Validate a full candidate set, all-or-nothing.
///
/// Stops at the first invalid candidate and reports its index; no image
/// from the set is accepted in that case. Order is preserved.
pub fn validate_all(candidates: Vec<ImageCandidate>) -> Result<Vec<FirmwareImage>, ImageError> {
    let mut images = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.into_iter().enumerate() {
        let core = candidate.core;
        let image = FirmwareImage::from_candidate(candidate)
            .map_err(|source| ImageError::Invalid { index, core, source })?;
        images.push(image);
    }
    Ok(images)
}
