//! Firmware image header parsing.
//!
//! Each image in a package starts with a fixed 32-byte header carrying the
//! magic, the payload size and the semantic version. The layout follows the
//! bootloader's image format, all fields little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

/// Magic expected in the first four bytes of an image.
pub const IMAGE_MAGIC: u32 = 0x96F3_B83D;

/// Total header size in bytes.
pub const HEADER_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Image too small for a header: {actual} bytes, need {HEADER_LEN}")]
    TooShort { actual: usize },
    #[error("Invalid image magic: expected 0x{IMAGE_MAGIC:08X}, got 0x{actual:08X}")]
    BadMagic { actual: u32 },
    #[error("Image truncated: header declares {declared} bytes, only {actual} present")]
    Truncated { declared: usize, actual: usize },
}

/// Semantic version embedded in an image header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: u16,
    pub build: u32,
}

impl ImageVersion {
    pub fn new(major: u8, minor: u8, revision: u16) -> Self {
        Self {
            major,
            minor,
            revision,
            build: 0,
        }
    }
}

impl fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)?;
        if self.build != 0 {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

/// Parsed image header (32 bytes).
///
/// Layout: `magic u32 | load_addr u32 | header_size u16 | protect_tlv_size
/// u16 | image_size u32 | flags u32 | version (u8 u8 u16 u32) | pad u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub load_addr: u32,
    pub header_size: u16,
    pub protect_tlv_size: u16,
    /// Payload size after the header, excluding trailing TLVs.
    pub image_size: u32,
    pub flags: u32,
    pub version: ImageVersion,
}

impl ImageHeader {
    /// Header for authoring test and demo images.
    pub fn new(image_size: u32, version: ImageVersion) -> Self {
        Self {
            load_addr: 0,
            header_size: HEADER_LEN as u16,
            protect_tlv_size: 0,
            image_size,
            flags: 0,
            version,
        }
    }

    /// Parse and validate the header against the full image content.
    pub fn parse(content: &[u8]) -> Result<Self, HeaderError> {
        if content.len() < HEADER_LEN {
            return Err(HeaderError::TooShort {
                actual: content.len(),
            });
        }
        let mut cursor = Cursor::new(content);
        // Cursor reads cannot fail here, length was checked above.
        let magic = cursor.read_u32::<LittleEndian>().unwrap();
        if magic != IMAGE_MAGIC {
            return Err(HeaderError::BadMagic { actual: magic });
        }
        let load_addr = cursor.read_u32::<LittleEndian>().unwrap();
        let header_size = cursor.read_u16::<LittleEndian>().unwrap();
        let protect_tlv_size = cursor.read_u16::<LittleEndian>().unwrap();
        let image_size = cursor.read_u32::<LittleEndian>().unwrap();
        let flags = cursor.read_u32::<LittleEndian>().unwrap();
        let version = ImageVersion {
            major: cursor.read_u8().unwrap(),
            minor: cursor.read_u8().unwrap(),
            revision: cursor.read_u16::<LittleEndian>().unwrap(),
            build: cursor.read_u32::<LittleEndian>().unwrap(),
        };

        let declared = header_size as usize + image_size as usize;
        if declared > content.len() {
            return Err(HeaderError::Truncated {
                declared,
                actual: content.len(),
            });
        }

        Ok(Self {
            load_addr,
            header_size,
            protect_tlv_size,
            image_size,
            flags,
            version,
        })
    }

    /// Serialize the header, for authoring test and demo images.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.write_u32::<LittleEndian>(IMAGE_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(self.load_addr).unwrap();
        buf.write_u16::<LittleEndian>(self.header_size).unwrap();
        buf.write_u16::<LittleEndian>(self.protect_tlv_size).unwrap();
        buf.write_u32::<LittleEndian>(self.image_size).unwrap();
        buf.write_u32::<LittleEndian>(self.flags).unwrap();
        buf.push(self.version.major);
        buf.push(self.version.minor);
        buf.write_u16::<LittleEndian>(self.version.revision).unwrap();
        buf.write_u32::<LittleEndian>(self.version.build).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = ImageHeader::new(1000, ImageVersion::new(1, 2, 3));
        let mut content = header.to_bytes();
        assert_eq!(content.len(), HEADER_LEN);
        content.extend_from_slice(&vec![0u8; 1000]);

        let parsed = ImageHeader::parse(&content).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version.to_string(), "1.2.3");
    }

    #[test]
    fn test_too_short() {
        let err = ImageHeader::parse(&[0u8; 8]).unwrap_err();
        assert_eq!(err, HeaderError::TooShort { actual: 8 });
    }

    #[test]
    fn test_bad_magic() {
        let mut content = ImageHeader::new(0, ImageVersion::default()).to_bytes();
        content[0] ^= 0xFF;
        assert!(matches!(
            ImageHeader::parse(&content),
            Err(HeaderError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_truncated_payload() {
        // Header claims 1000 payload bytes but only 10 follow.
        let mut content = ImageHeader::new(1000, ImageVersion::new(1, 0, 0)).to_bytes();
        content.extend_from_slice(&[0u8; 10]);
        assert!(matches!(
            ImageHeader::parse(&content),
            Err(HeaderError::Truncated { declared: 1032, .. })
        ));
    }

    #[test]
    fn test_version_display_with_build() {
        let v = ImageVersion {
            major: 2,
            minor: 0,
            revision: 1,
            build: 77,
        };
        assert_eq!(v.to_string(), "2.0.1+77");
    }
}
