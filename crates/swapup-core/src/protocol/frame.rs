//! Command frame composition.
//!
//! Every command the orchestrator sends is a 4-byte ASCII tag followed by
//! little-endian fields. The device answers each frame with a single
//! acknowledgement (see [`crate::protocol::Ack`]).

use byteorder::{LittleEndian, WriteBytesExt};

use crate::image::DIGEST_LEN;

/// Length of the ASCII tag that starts every frame.
pub const TAG_LEN: usize = 4;

/// Announce an image slot: core, image size and digest (`CHK?`).
pub const TAG_CHECK: &[u8; 4] = b"CHK?";
/// Open an upload for a core (`UPLD`).
pub const TAG_UPLOAD: &[u8; 4] = b"UPLD";
/// One chunk of image content (`CHNK`).
pub const TAG_CHUNK: &[u8; 4] = b"CHNK";
/// Mark an uploaded image for a test boot (`TEST`).
pub const TAG_TEST: &[u8; 4] = b"TEST";
/// Make an uploaded image permanent (`CNFM`).
pub const TAG_CONFIRM: &[u8; 4] = b"CNFM";
/// Reboot the device into the swapped image (`RSET`).
pub const TAG_RESET: &[u8; 4] = b"RSET";
/// Liveness probe, used while waiting out the post-reset swap (`PING`).
pub const TAG_PING: &[u8; 4] = b"PING";

/// `CHK?` frame: `{core u8, pad u8, reserved u16, size u32, digest}`.
pub fn check(core: u8, size: u32, digest: &[u8; DIGEST_LEN]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TAG_LEN + 8 + DIGEST_LEN);
    buf.extend_from_slice(TAG_CHECK);
    buf.push(core);
    buf.push(0);
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_u32::<LittleEndian>(size).unwrap();
    buf.extend_from_slice(digest);
    buf
}

/// `UPLD` frame: `{core u8, pad u8, reserved u16, total u32}`.
pub fn begin_upload(core: u8, total: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TAG_LEN + 8);
    buf.extend_from_slice(TAG_UPLOAD);
    buf.push(core);
    buf.push(0);
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_u32::<LittleEndian>(total).unwrap();
    buf
}

/// `CHNK` frame: `{offset u32, len u32, bytes}`.
pub fn chunk(offset: u32, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TAG_LEN + 8 + data.len());
    buf.extend_from_slice(TAG_CHUNK);
    buf.write_u32::<LittleEndian>(offset).unwrap();
    buf.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    buf.extend_from_slice(data);
    buf
}

/// `TEST` frame: `{digest}`.
pub fn test(digest: &[u8; DIGEST_LEN]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TAG_LEN + DIGEST_LEN);
    buf.extend_from_slice(TAG_TEST);
    buf.extend_from_slice(digest);
    buf
}

/// `CNFM` frame: `{digest}`.
pub fn confirm(digest: &[u8; DIGEST_LEN]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TAG_LEN + DIGEST_LEN);
    buf.extend_from_slice(TAG_CONFIRM);
    buf.extend_from_slice(digest);
    buf
}

/// `RSET` frame (tag only).
pub fn reset() -> Vec<u8> {
    TAG_RESET.to_vec()
}

/// `PING` frame (tag only).
pub fn ping() -> Vec<u8> {
    TAG_PING.to_vec()
}

/// Tag of a composed frame, if it has one. Used by device-side fakes.
pub fn tag_of(frame: &[u8]) -> Option<[u8; TAG_LEN]> {
    if frame.len() < TAG_LEN {
        return None;
    }
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&frame[..TAG_LEN]);
    Some(tag)
}
