//! Mock device transport for testing.
//!
//! `MockDevice` speaks the command framing from the device side: it acks
//! frames, reassembles uploads, and can be scripted to reject commands,
//! drop the connection, or stay offline for a while after a reset (the
//! image swap window).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::traits::{DEFAULT_MTU, DeviceTransport, TransportError};
use crate::image::DIGEST_LEN;
use crate::protocol::{ack, frame};

#[derive(Default)]
struct MockState {
    /// Raw frames in arrival order.
    frames: Vec<Vec<u8>>,
    /// Reassembled upload content per core.
    uploads: HashMap<u8, Vec<u8>>,
    /// Core addressed by the open upload, set by `UPLD`.
    current_upload: Option<u8>,
    tested: Vec<[u8; DIGEST_LEN]>,
    confirmed: Vec<[u8; DIGEST_LEN]>,
    reset_count: usize,
    /// Canned answers per tag, overrides normal handling.
    answers: HashMap<[u8; 4], Vec<u8>>,
    /// Tag that triggers a transport error.
    drop_tag: Option<[u8; 4]>,
    /// Drop the connection once this many chunks were acked.
    drop_after_chunks: Option<usize>,
    chunks_acked: usize,
    /// Artificial ack delay per chunk, for exercising pause and cancel.
    chunk_delay: Duration,
    /// How long the device stays unreachable after a reset.
    swap_duration: Duration,
    /// Offline until this instant, if set.
    online_at: Option<Instant>,
    mtu: usize,
}

/// Scripted in-memory device.
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Self {
        let state = MockState {
            mtu: DEFAULT_MTU,
            ..MockState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Answer every frame with this tag with `RJCT` and the given reason.
    pub fn reject_on(&self, tag: [u8; 4], reason: u8) {
        self.state
            .lock()
            .unwrap()
            .answers
            .insert(tag, ack::reject(reason));
    }

    /// Answer every frame with this tag with canned bytes.
    pub fn answer_on(&self, tag: [u8; 4], answer: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .answers
            .insert(tag, answer.to_vec());
    }

    /// Fail the transport whenever this tag is seen.
    pub fn drop_on(&self, tag: [u8; 4]) {
        self.state.lock().unwrap().drop_tag = Some(tag);
    }

    /// Fail the transport once `n` chunks were acked.
    pub fn drop_after_chunks(&self, n: usize) {
        self.state.lock().unwrap().drop_after_chunks = Some(n);
    }

    /// Delay every chunk ack, keeping the upload phase open for a while.
    pub fn set_chunk_delay(&self, delay: Duration) {
        self.state.lock().unwrap().chunk_delay = delay;
    }

    /// How long the device stays unreachable after `RSET`.
    pub fn set_swap_duration(&self, duration: Duration) {
        self.state.lock().unwrap().swap_duration = duration;
    }

    pub fn set_mtu(&self, mtu: usize) {
        self.state.lock().unwrap().mtu = mtu;
    }

    /// All captured frames.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().frames.clone()
    }

    /// Tags of all captured frames.
    pub fn tags(&self) -> Vec<[u8; 4]> {
        self.state
            .lock()
            .unwrap()
            .frames
            .iter()
            .filter_map(|f| frame::tag_of(f))
            .collect()
    }

    /// Reassembled upload for a core, if any chunks arrived.
    pub fn uploaded(&self, core: u8) -> Option<Vec<u8>> {
        self.state.lock().unwrap().uploads.get(&core).cloned()
    }

    pub fn tested_digests(&self) -> Vec<[u8; DIGEST_LEN]> {
        self.state.lock().unwrap().tested.clone()
    }

    pub fn confirmed_digests(&self) -> Vec<[u8; DIGEST_LEN]> {
        self.state.lock().unwrap().confirmed.clone()
    }

    pub fn reset_count(&self) -> usize {
        self.state.lock().unwrap().reset_count
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTransport for MockDevice {
    fn send(&self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let tag =
            frame::tag_of(data).ok_or_else(|| TransportError::SendFailed("short frame".into()))?;

        let mut delay = Duration::ZERO;
        let result = {
            let mut state = self.state.lock().unwrap();

            if let Some(at) = state.online_at {
                if Instant::now() < at {
                    return Err(TransportError::Disconnected);
                }
                state.online_at = None;
            }

            state.frames.push(data.to_vec());

            if state.drop_tag == Some(tag) {
                return Err(TransportError::Disconnected);
            }
            if let Some(answer) = state.answers.get(&tag) {
                return Ok(answer.clone());
            }

            match &tag {
                frame::TAG_CHECK | frame::TAG_TEST | frame::TAG_CONFIRM => {
                    let mut digest = [0u8; DIGEST_LEN];
                    if data.len() >= 4 + DIGEST_LEN {
                        digest.copy_from_slice(&data[data.len() - DIGEST_LEN..]);
                    }
                    match &tag {
                        frame::TAG_TEST => state.tested.push(digest),
                        frame::TAG_CONFIRM => state.confirmed.push(digest),
                        _ => {}
                    }
                    Ok(ack::okay())
                }
                frame::TAG_UPLOAD => {
                    let core = data[4];
                    state.current_upload = Some(core);
                    state.uploads.insert(core, Vec::new());
                    Ok(ack::okay())
                }
                frame::TAG_CHUNK => {
                    if let Some(limit) = state.drop_after_chunks
                        && state.chunks_acked >= limit
                    {
                        return Err(TransportError::Disconnected);
                    }
                    if let Some(core) = state.current_upload {
                        let body = data[12..].to_vec();
                        state.uploads.entry(core).or_default().extend(body);
                    }
                    state.chunks_acked += 1;
                    delay = state.chunk_delay;
                    Ok(ack::okay())
                }
                frame::TAG_RESET => {
                    state.reset_count += 1;
                    if !state.swap_duration.is_zero() {
                        state.online_at = Some(Instant::now() + state.swap_duration);
                    }
                    Ok(ack::okay())
                }
                frame::TAG_PING => Ok(ack::okay()),
                _ => Ok(ack::reject(0xFE)),
            }
        };

        // Sleep outside the lock so scripted getters stay responsive.
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        result
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock().unwrap();
        match state.online_at {
            Some(at) => Instant::now() >= at,
            None => true,
        }
    }

    fn mtu(&self) -> usize {
        self.state.lock().unwrap().mtu
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_acks_and_captures() {
        let mock = MockDevice::new();
        let ack = mock.send(&frame::begin_upload(0, 100)).unwrap();
        assert_eq!(ack, ack::okay());

        mock.send(&frame::chunk(0, &[1, 2, 3])).unwrap();
        mock.send(&frame::chunk(3, &[4])).unwrap();

        assert_eq!(mock.uploaded(0), Some(vec![1, 2, 3, 4]));
        assert_eq!(
            mock.tags(),
            vec![*frame::TAG_UPLOAD, *frame::TAG_CHUNK, *frame::TAG_CHUNK]
        );
    }

    #[test]
    fn test_mock_reject_script() {
        let mock = MockDevice::new();
        mock.reject_on(*frame::TAG_TEST, 4);

        let answer = mock.send(&frame::test(&[0u8; DIGEST_LEN])).unwrap();
        assert_eq!(answer, ack::reject(4));
        // Other tags still pass.
        assert_eq!(mock.send(&frame::ping()).unwrap(), ack::okay());
    }

    #[test]
    fn test_mock_swap_window() {
        let mock = MockDevice::new();
        mock.set_swap_duration(Duration::from_millis(50));

        assert_eq!(mock.send(&frame::reset()).unwrap(), ack::okay());
        assert_eq!(mock.reset_count(), 1);

        // Rebooting: unreachable until the swap window passes.
        assert!(!mock.is_connected());
        assert_eq!(
            mock.send(&frame::ping()).unwrap_err(),
            TransportError::Disconnected
        );

        std::thread::sleep(Duration::from_millis(80));
        assert!(mock.is_connected());
        assert_eq!(mock.send(&frame::ping()).unwrap(), ack::okay());
    }

    #[test]
    fn test_mock_drop_after_chunks() {
        let mock = MockDevice::new();
        mock.drop_after_chunks(2);
        mock.send(&frame::begin_upload(0, 30)).unwrap();
        assert!(mock.send(&frame::chunk(0, &[0u8; 10])).is_ok());
        assert!(mock.send(&frame::chunk(10, &[0u8; 10])).is_ok());
        assert!(mock.send(&frame::chunk(20, &[0u8; 10])).is_err());
    }
}
