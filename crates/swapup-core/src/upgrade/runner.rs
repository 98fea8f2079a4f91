//! Worker-side phase execution.
//!
//! One `UpgradeRunner` drives one run to its terminal event. All events of
//! the run are emitted from this thread, in order, holding no locks, so an
//! observer may call back into the manager (pause/cancel) from a callback.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, info, warn};

use super::UpgradeError;
use super::manager::{Checkpoint, RunControl};
use super::state::{self, UpgradeMode, UpgradeState};
use crate::config::UpgradeConfig;
use crate::events::{UpgradeEvent, UpgradeObserver};
use crate::image::FirmwareImage;
use crate::protocol::{Ack, frame};
use crate::transport::DeviceTransport;

/// Why a phase stopped the run.
enum PhaseExit {
    Cancelled,
    Failed(UpgradeError),
}

type PhaseResult = Result<(), PhaseExit>;

pub(crate) struct UpgradeRunner {
    transport: Arc<dyn DeviceTransport>,
    observer: Arc<dyn UpgradeObserver>,
    config: UpgradeConfig,
    control: Arc<RunControl>,
    images: Vec<FirmwareImage>,
    mode: UpgradeMode,
}

impl UpgradeRunner {
    pub(crate) fn new(
        transport: Arc<dyn DeviceTransport>,
        observer: Arc<dyn UpgradeObserver>,
        config: UpgradeConfig,
        control: Arc<RunControl>,
        images: Vec<FirmwareImage>,
        mode: UpgradeMode,
    ) -> Self {
        Self {
            transport,
            observer,
            config,
            control,
            images,
            mode,
        }
    }

    /// Drive the run to its terminal event.
    pub(crate) fn run(self) {
        let span = tracing::info_span!("upgrade", mode = %self.mode, images = self.images.len());
        let _entered = span.enter();

        self.emit(&UpgradeEvent::Started);
        self.transition(UpgradeState::Validate);

        let result = self.execute();
        // Phase the run ended in, before the terminal transition.
        let phase = self.control.state();
        match result {
            Ok(()) => {
                self.transition(UpgradeState::Success);
                self.emit(&UpgradeEvent::Completed);
            }
            Err(PhaseExit::Cancelled) => {
                info!(phase = %phase, "Run cancelled");
                self.transition(UpgradeState::Cancelled);
                self.emit(&UpgradeEvent::Cancelled { state: phase });
            }
            Err(PhaseExit::Failed(error)) => {
                warn!(phase = %phase, error = %error, "Run failed");
                self.transition(UpgradeState::Failed);
                self.emit(&UpgradeEvent::Failed {
                    state: phase,
                    error,
                });
            }
        }
        self.control.finish();
    }

    fn execute(&self) -> PhaseResult {
        self.validate_images()?;

        self.transition(UpgradeState::Upload);
        self.upload_images()?;

        self.transition(self.mode.after_upload());
        if self.control.state() == UpgradeState::Test {
            self.test_images()?;
            self.transition(self.mode.after_test());
        }
        if self.control.state() == UpgradeState::Confirm {
            self.confirm_images()?;
            self.transition(UpgradeState::Reset);
        }
        self.reset_and_wait()
    }

    /// Announce every image to the device and require acceptance.
    fn validate_images(&self) -> PhaseResult {
        for image in &self.images {
            self.cancel_point()?;
            debug!(
                core = %image.core(),
                size = image.size(),
                digest = %image.digest_label(),
                "Validating image"
            );
            let frame = frame::check(image.core().raw(), image.size() as u32, image.digest());
            self.exchange("check", &frame)?;
        }
        Ok(())
    }

    fn upload_images(&self) -> PhaseResult {
        let chunk_size = self
            .config
            .chunk_size
            .unwrap_or_else(|| self.transport.mtu())
            .max(1);

        for image in &self.images {
            self.cancel_point()?;
            info!(
                core = %image.core(),
                size = image.size(),
                chunk = chunk_size,
                "Uploading image"
            );
            self.exchange(
                "upload",
                &frame::begin_upload(image.core().raw(), image.size() as u32),
            )?;

            let content = image.content();
            let total = content.len() as u64;
            // Progress is per-image: announce the zero point for this one.
            self.emit_progress(0, total);

            let mut offset = 0usize;
            while offset < content.len() {
                if let Checkpoint::Cancelled = self.control.checkpoint() {
                    return Err(PhaseExit::Cancelled);
                }
                let end = (offset + chunk_size).min(content.len());
                self.exchange("chunk", &frame::chunk(offset as u32, &content[offset..end]))?;
                offset = end;
                self.emit_progress(offset as u64, total);
            }
        }
        Ok(())
    }

    fn test_images(&self) -> PhaseResult {
        for image in &self.images {
            self.cancel_point()?;
            debug!(core = %image.core(), "Marking image for test boot");
            self.exchange("test", &frame::test(image.digest()))?;
        }
        Ok(())
    }

    fn confirm_images(&self) -> PhaseResult {
        for image in &self.images {
            self.cancel_point()?;
            debug!(core = %image.core(), "Confirming image");
            self.exchange("confirm", &frame::confirm(image.digest()))?;
        }
        Ok(())
    }

    /// Send the reset and wait out the image swap.
    ///
    /// The send itself may race the reboot, so a transport error here is
    /// tolerated; the device proves itself by answering a ping within
    /// `estimated_swap_time + swap_margin`. Running out the budget is a
    /// failure of the wait, never a cancellation.
    fn reset_and_wait(&self) -> PhaseResult {
        self.cancel_point()?;
        info!("Sending reset");
        match self.transport.send(&frame::reset()) {
            Ok(answer) => match Ack::parse(&answer) {
                Ack::Ok => {}
                Ack::Rejected { reason } => {
                    return Err(PhaseExit::Failed(UpgradeError::DeviceRejected {
                        op: "reset",
                        reason,
                    }));
                }
                other => {
                    return Err(PhaseExit::Failed(UpgradeError::UnexpectedAck {
                        op: "reset",
                        ack: other.to_string(),
                    }));
                }
            },
            Err(error) => {
                debug!(%error, "Reset send failed, device likely rebooting");
            }
        }

        let budget = self.config.estimated_swap_time() + self.config.swap_margin();
        let started = Instant::now();
        loop {
            self.cancel_point()?;
            if let Ok(answer) = self.transport.send(&frame::ping())
                && Ack::parse(&answer).is_ok()
            {
                info!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Device back online"
                );
                return Ok(());
            }
            if started.elapsed() >= budget {
                return Err(PhaseExit::Failed(UpgradeError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                }));
            }
            std::thread::sleep(self.config.reset_poll_interval());
        }
    }

    /// One command exchange; anything but `OKAY` stops the run.
    fn exchange(&self, op: &'static str, data: &[u8]) -> PhaseResult {
        let answer = self
            .transport
            .send(data)
            .map_err(|e| PhaseExit::Failed(UpgradeError::Transport(e)))?;
        match Ack::parse(&answer) {
            Ack::Ok => Ok(()),
            Ack::Rejected { reason } => {
                Err(PhaseExit::Failed(UpgradeError::DeviceRejected { op, reason }))
            }
            other => Err(PhaseExit::Failed(UpgradeError::UnexpectedAck {
                op,
                ack: other.to_string(),
            })),
        }
    }

    /// Phase boundary: stop here if cancellation was requested.
    fn cancel_point(&self) -> PhaseResult {
        if self.control.cancel_requested() {
            Err(PhaseExit::Cancelled)
        } else {
            Ok(())
        }
    }

    fn transition(&self, to: UpgradeState) {
        let from = self.control.set_state(to);
        debug_assert!(
            state::is_valid_transition(from, to),
            "invalid transition {from} -> {to}"
        );
        info!(from = %from, to = %to, "State transition");
        self.emit(&UpgradeEvent::StateChanged { from, to });
    }

    fn emit_progress(&self, bytes_sent: u64, image_size: u64) {
        self.emit(&UpgradeEvent::Progress {
            bytes_sent,
            image_size,
            timestamp: SystemTime::now(),
        });
    }

    // Events are emitted with no lock held, so a callback may call back
    // into the manager.
    fn emit(&self, event: &UpgradeEvent) {
        self.observer.on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::config::UpgradeConfig;
    use crate::events::{UpgradeEvent, UpgradeObserver};
    use crate::image::{CoreId, HEADER_LEN};
    use crate::protocol::frame;
    use crate::transport::{MockDevice, TransportError};
    use crate::upgrade::testutil::{Recorder, assert_valid_path, fast_config, images};
    use crate::upgrade::{UpgradeError, UpgradeManager, UpgradeMode, UpgradeState};

    const WAIT: Duration = Duration::from_secs(5);

    fn manager(mock: &Arc<MockDevice>, recorder: &Arc<Recorder>) -> UpgradeManager {
        UpgradeManager::builder()
            .config(fast_config())
            .observer(recorder.clone())
            .connect(mock.clone())
    }

    #[test]
    fn test_full_run_test_and_confirm() {
        let mock = Arc::new(MockDevice::new());
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        // The canonical two-image set: app then net.
        let set = images(&[(CoreId::App, 1000), (CoreId::Net, 500)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        use UpgradeState::*;
        assert_eq!(
            recorder.edges(),
            vec![
                (Idle, Validate),
                (Validate, Upload),
                (Upload, Test),
                (Test, Confirm),
                (Confirm, Reset),
                (Reset, Success),
            ]
        );

        let events = recorder.events();
        assert!(matches!(events.first(), Some(UpgradeEvent::Started)));
        assert!(matches!(events.last(), Some(UpgradeEvent::Completed)));

        // The device received the exact image bytes, both cores.
        assert_eq!(mock.uploaded(0).unwrap(), set[0].content());
        assert_eq!(mock.uploaded(1).unwrap(), set[1].content());
        assert_eq!(
            mock.tested_digests(),
            vec![*set[0].digest(), *set[1].digest()]
        );
        assert_eq!(
            mock.confirmed_digests(),
            vec![*set[0].digest(), *set[1].digest()]
        );
        assert_eq!(mock.reset_count(), 1);

        assert_eq!(manager.state(), UpgradeState::Idle);
        assert!(!manager.is_in_progress());
    }

    #[test]
    fn test_exactly_one_terminal_event_and_it_is_last() {
        let mock = Arc::new(MockDevice::new());
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 300)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        let events = recorder.events();
        let terminals: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_terminal())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(terminals, vec![events.len() - 1]);
        assert_valid_path(&recorder.edges());
    }

    #[test]
    fn test_progress_is_per_image_and_monotonic() {
        let mock = Arc::new(MockDevice::new());
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 1000), (CoreId::Net, 500)]);
        let sizes = [set[0].size() as u64, set[1].size() as u64];

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        let samples = recorder.progress();
        assert!(!samples.is_empty());

        // Split-by-image: image_size identifies the current image here
        // because the two differ.
        let first: Vec<_> = samples.iter().filter(|s| s.1 == sizes[0]).collect();
        let second: Vec<_> = samples.iter().filter(|s| s.1 == sizes[1]).collect();
        assert_eq!(first.len() + second.len(), samples.len());

        for (part, size) in [(&first, sizes[0]), (&second, sizes[1])] {
            assert_eq!(part.first().unwrap().0, 0, "progress must reset to zero");
            assert_eq!(part.last().unwrap().0, size);
            for pair in part.windows(2) {
                assert!(pair[0].0 <= pair[1].0, "progress went backwards");
            }
            for sample in part.iter() {
                assert!(sample.0 <= sample.1);
                let ratio = crate::upgrade::progress::ratio(sample.0, sample.1);
                assert!((0.0..=1.0).contains(&ratio));
            }
        }

        // All of image 1 precedes all of image 2.
        let switch = samples.iter().position(|s| s.1 == sizes[1]).unwrap();
        assert!(samples[..switch].iter().all(|s| s.1 == sizes[0]));
    }

    #[test]
    fn test_test_only_path() {
        let mock = Arc::new(MockDevice::new());
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 400)]);

        manager.start(&set, UpgradeMode::TestOnly).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        use UpgradeState::*;
        assert_eq!(
            recorder.edges(),
            vec![
                (Idle, Validate),
                (Validate, Upload),
                (Upload, Test),
                (Test, Reset),
                (Reset, Success),
            ]
        );
        assert_eq!(mock.tested_digests().len(), 1);
        assert!(mock.confirmed_digests().is_empty());
    }

    #[test]
    fn test_confirm_only_path() {
        let mock = Arc::new(MockDevice::new());
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 400)]);

        manager.start(&set, UpgradeMode::ConfirmOnly).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        use UpgradeState::*;
        assert_eq!(
            recorder.edges(),
            vec![
                (Idle, Validate),
                (Validate, Upload),
                (Upload, Confirm),
                (Confirm, Reset),
                (Reset, Success),
            ]
        );
        assert!(mock.tested_digests().is_empty());
        assert_eq!(mock.confirmed_digests().len(), 1);
    }

    #[test]
    fn test_validation_reject_fails_before_upload() {
        let mock = Arc::new(MockDevice::new());
        mock.reject_on(*frame::TAG_CHECK, 2);
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 400)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        match recorder.terminal().unwrap() {
            UpgradeEvent::Failed { state, error } => {
                assert_eq!(state, UpgradeState::Validate);
                assert_eq!(
                    error,
                    UpgradeError::DeviceRejected {
                        op: "check",
                        reason: 2
                    }
                );
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(!mock.tags().contains(frame::TAG_UPLOAD));
        assert_valid_path(&recorder.edges());
        assert_eq!(manager.state(), UpgradeState::Idle);
    }

    #[test]
    fn test_upload_transport_failure() {
        let mock = Arc::new(MockDevice::new());
        mock.drop_after_chunks(2);
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 2000)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        match recorder.terminal().unwrap() {
            UpgradeEvent::Failed { state, error } => {
                assert_eq!(state, UpgradeState::Upload);
                assert_eq!(
                    error,
                    UpgradeError::Transport(TransportError::Disconnected)
                );
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_valid_path(&recorder.edges());
    }

    #[test]
    fn test_restart_with_same_images_after_failure() {
        let mock = Arc::new(MockDevice::new());
        mock.reject_on(*frame::TAG_TEST, 7);
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 500)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));
        match recorder.terminal().unwrap() {
            UpgradeEvent::Failed { state, error } => {
                assert_eq!(state, UpgradeState::Test);
                assert_eq!(
                    error,
                    UpgradeError::DeviceRejected {
                        op: "test",
                        reason: 7
                    }
                );
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        // Device recovers; the caller retries with the same image set.
        mock.answer_on(*frame::TAG_TEST, b"OKAY");
        let recorder2 = Recorder::new();
        let retry = UpgradeManager::builder()
            .config(fast_config())
            .observer(recorder2.clone())
            .connect(mock.clone());
        retry.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder2.wait_terminal(WAIT));
        assert!(matches!(
            recorder2.terminal().unwrap(),
            UpgradeEvent::Completed
        ));
    }

    #[test]
    fn test_unexpected_ack_fails_run() {
        let mock = Arc::new(MockDevice::new());
        mock.answer_on(*frame::TAG_CONFIRM, b"HUH?");
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 300)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        match recorder.terminal().unwrap() {
            UpgradeEvent::Failed { state, error } => {
                assert_eq!(state, UpgradeState::Confirm);
                match error {
                    UpgradeError::UnexpectedAck { op, ack } => {
                        assert_eq!(op, "confirm");
                        assert!(ack.contains("HUH?"));
                    }
                    other => panic!("expected UnexpectedAck, got {other:?}"),
                }
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    /// Observer that cancels its manager the first time progress reaches a
    /// threshold. Runs on the worker thread, exercising reentrant control.
    struct CancelAtBytes {
        recorder: Arc<Recorder>,
        manager: Mutex<Option<UpgradeManager>>,
        threshold: u64,
    }

    impl UpgradeObserver for CancelAtBytes {
        fn on_event(&self, event: &UpgradeEvent) {
            self.recorder.on_event(event);
            if let UpgradeEvent::Progress { bytes_sent, .. } = event
                && *bytes_sent >= self.threshold
                && let Some(manager) = self.manager.lock().unwrap().take()
            {
                manager.cancel();
            }
        }
    }

    #[test]
    fn test_cancel_during_upload_stops_at_chunk_boundary() {
        let mock = Arc::new(MockDevice::new());
        let recorder = Recorder::new();
        let observer = Arc::new(CancelAtBytes {
            recorder: recorder.clone(),
            manager: Mutex::new(None),
            threshold: 200,
        });
        let manager = UpgradeManager::builder()
            .config(UpgradeConfig {
                chunk_size: Some(100),
                ..fast_config()
            })
            .observer(observer.clone())
            .connect(mock.clone());
        *observer.manager.lock().unwrap() = Some(manager.clone());

        let set = images(&[(CoreId::App, 2000 - HEADER_LEN)]);
        assert_eq!(set[0].size(), 2000);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        match recorder.terminal().unwrap() {
            UpgradeEvent::Cancelled { state } => assert_eq!(state, UpgradeState::Upload),
            other => panic!("expected Cancelled, got {other:?}"),
        }

        // The cancel lands inside the progress callback at 200 bytes; the
        // next checkpoint stops the run before another chunk goes out.
        let samples = recorder.progress();
        let last = samples.last().unwrap();
        assert_eq!(last.0, 200);
        assert_eq!(mock.uploaded(0).unwrap().len(), 200);
        // Never past a chunk boundary, never the full image.
        assert_eq!(last.0 % 100, 0);
        assert!(last.0 < last.1);
        assert_valid_path(&recorder.edges());
    }

    #[test]
    fn test_pause_holds_the_run_still() {
        let mock = Arc::new(MockDevice::new());
        mock.set_chunk_delay(Duration::from_millis(10));
        let recorder = Recorder::new();
        let manager = UpgradeManager::builder()
            .config(UpgradeConfig {
                chunk_size: Some(100),
                ..fast_config()
            })
            .observer(recorder.clone())
            .connect(mock.clone());
        // ~30 chunks at 10ms each: a wide window to pause within.
        let set = images(&[(CoreId::App, 3000)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        manager.pause();
        assert!(manager.is_paused());

        let before = recorder.events().len();
        std::thread::sleep(Duration::from_millis(150));
        let after = recorder.events();
        let paused_window = &after[before..];
        // At most the in-flight chunk completes; no transition happens.
        assert!(paused_window.len() <= 1);
        assert!(
            !paused_window
                .iter()
                .any(|e| matches!(e, UpgradeEvent::StateChanged { .. }))
        );
        assert_eq!(manager.state(), UpgradeState::Upload);

        manager.resume();
        assert!(recorder.wait_terminal(WAIT));
        assert!(matches!(
            recorder.terminal().unwrap(),
            UpgradeEvent::Completed
        ));
        // The upload finished after the pause.
        let samples = recorder.progress();
        assert_eq!(samples.last().unwrap().0, set[0].size() as u64);
    }

    #[test]
    fn test_cancel_wakes_a_paused_run() {
        let mock = Arc::new(MockDevice::new());
        mock.set_chunk_delay(Duration::from_millis(10));
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 3000)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        manager.pause();
        manager.cancel();

        assert!(recorder.wait_terminal(WAIT));
        assert!(matches!(
            recorder.terminal().unwrap(),
            UpgradeEvent::Cancelled { .. }
        ));
        assert!(!manager.is_in_progress());
    }

    #[test]
    fn test_reset_timeout_is_failure_not_cancellation() {
        let mock = Arc::new(MockDevice::new());
        // Device never comes back within the budget (200 + 300 ms).
        mock.set_swap_duration(Duration::from_secs(60));
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 300)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        match recorder.terminal().unwrap() {
            UpgradeEvent::Failed { state, error } => {
                assert_eq!(state, UpgradeState::Reset);
                assert!(matches!(error, UpgradeError::Timeout { .. }));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_valid_path(&recorder.edges());
    }

    #[test]
    fn test_reset_wait_survives_the_swap_window() {
        let mock = Arc::new(MockDevice::new());
        // Back before the 500ms budget runs out.
        mock.set_swap_duration(Duration::from_millis(150));
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 300)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));

        assert!(matches!(
            recorder.terminal().unwrap(),
            UpgradeEvent::Completed
        ));
        let edges = recorder.edges();
        assert_eq!(
            edges.last().unwrap(),
            &(UpgradeState::Reset, UpgradeState::Success)
        );
    }

    #[test]
    fn test_cancel_during_reset_wait() {
        let mock = Arc::new(MockDevice::new());
        mock.set_swap_duration(Duration::from_secs(60));
        let recorder = Recorder::new();
        let manager = UpgradeManager::builder()
            .config(UpgradeConfig {
                estimated_swap_time_ms: 30_000,
                swap_margin_ms: 30_000,
                reset_poll_ms: 10,
                chunk_size: Some(256),
            })
            .observer(recorder.clone())
            .connect(mock.clone());
        let set = images(&[(CoreId::App, 300)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        // Wait until the run parks in the reset wait loop.
        let deadline = std::time::Instant::now() + WAIT;
        while manager.state() != UpgradeState::Reset {
            assert!(std::time::Instant::now() < deadline, "never reached Reset");
            std::thread::sleep(Duration::from_millis(5));
        }
        manager.cancel();

        assert!(recorder.wait_terminal(WAIT));
        match recorder.terminal().unwrap() {
            UpgradeEvent::Cancelled { state } => assert_eq!(state, UpgradeState::Reset),
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }
}
