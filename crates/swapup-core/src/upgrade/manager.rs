//! Upgrade manager - construction and run control.
//!
//! Control calls are non-blocking signals: `start` spawns a worker thread
//! that owns the phase sequence, `pause`/`resume`/`cancel` flip flags the
//! worker observes at chunk and phase boundaries. All of them are safe
//! from any thread, including from inside observer callbacks.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::StartError;
use super::runner::UpgradeRunner;
use super::state::{UpgradeMode, UpgradeState};
use crate::config::UpgradeConfig;
use crate::events::{TracingObserver, UpgradeObserver};
use crate::image::FirmwareImage;
use crate::transport::{DeviceTransport, LoggedTransport, TrafficLog};

struct ControlState {
    state: UpgradeState,
    run_active: bool,
    paused: bool,
    cancel_requested: bool,
}

/// State shared between the manager handles and the worker.
pub(crate) struct RunControl {
    inner: Mutex<ControlState>,
    wake: Condvar,
}

/// Worker-side answer of a chunk boundary check.
pub(crate) enum Checkpoint {
    Continue,
    Cancelled,
}

impl RunControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(ControlState {
                state: UpgradeState::Idle,
                run_active: false,
                paused: false,
                cancel_requested: false,
            }),
            wake: Condvar::new(),
        })
    }

    pub(crate) fn state(&self) -> UpgradeState {
        self.inner.lock().unwrap().state
    }

    /// Swap in a new state, returning the previous one.
    pub(crate) fn set_state(&self, to: UpgradeState) -> UpgradeState {
        let mut ctl = self.inner.lock().unwrap();
        std::mem::replace(&mut ctl.state, to)
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.inner.lock().unwrap().cancel_requested
    }

    /// Chunk boundary: park while paused, report a pending cancel.
    ///
    /// Cancel wins over pause so a paused run can still be ended.
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        let mut ctl = self.inner.lock().unwrap();
        loop {
            if ctl.cancel_requested {
                return Checkpoint::Cancelled;
            }
            if !ctl.paused {
                return Checkpoint::Continue;
            }
            let (guard, _) = self
                .wake
                .wait_timeout(ctl, Duration::from_millis(100))
                .unwrap();
            ctl = guard;
        }
    }

    /// Worker is done: terminal event was delivered, run slot reopens.
    pub(crate) fn finish(&self) {
        let mut ctl = self.inner.lock().unwrap();
        ctl.state = UpgradeState::Idle;
        ctl.run_active = false;
        ctl.paused = false;
        ctl.cancel_requested = false;
    }
}

/// Disconnected half of the two-phase construction.
///
/// Collects configuration and observers; [`connect`](Self::connect) binds
/// the transport and produces the manager.
pub struct UpgradeBuilder {
    config: UpgradeConfig,
    observer: Arc<dyn UpgradeObserver>,
    traffic: Option<Arc<dyn TrafficLog>>,
}

impl UpgradeBuilder {
    pub fn new() -> Self {
        Self {
            config: UpgradeConfig::default(),
            observer: Arc::new(TracingObserver),
            traffic: None,
        }
    }

    pub fn config(mut self, config: UpgradeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn UpgradeObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Mirror all frames and acknowledgements into a traffic sink.
    pub fn traffic_log(mut self, sink: Arc<dyn TrafficLog>) -> Self {
        self.traffic = Some(sink);
        self
    }

    /// Bind a transport, completing construction.
    pub fn connect(self, transport: Arc<dyn DeviceTransport>) -> UpgradeManager {
        let kind = transport.kind();
        let transport: Arc<dyn DeviceTransport> = match self.traffic {
            Some(sink) => Arc::new(LoggedTransport::new(transport, sink)),
            None => transport,
        };
        info!(transport = kind, "Transport connected");
        UpgradeManager {
            transport,
            observer: self.observer,
            config: self.config,
            control: RunControl::new(),
        }
    }
}

impl Default for UpgradeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Connected upgrade orchestrator.
///
/// Cheap to clone; all clones control the same run slot. One run is active
/// at a time, a new `start` is accepted only after the previous run's
/// terminal event was delivered.
#[derive(Clone)]
pub struct UpgradeManager {
    transport: Arc<dyn DeviceTransport>,
    observer: Arc<dyn UpgradeObserver>,
    config: UpgradeConfig,
    control: Arc<RunControl>,
}

impl UpgradeManager {
    pub fn builder() -> UpgradeBuilder {
        UpgradeBuilder::new()
    }

    /// Manager with default config and the tracing observer.
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        UpgradeBuilder::new().connect(transport)
    }

    /// Begin an upgrade run over the given images.
    ///
    /// Non-blocking: the phase sequence runs on a worker thread and is
    /// reported through the observer. The image set is borrowed for the
    /// run (contents are shared, not copied), the caller keeps it and may
    /// start again with the same images after a failure.
    pub fn start(&self, images: &[FirmwareImage], mode: UpgradeMode) -> Result<(), StartError> {
        {
            let mut ctl = self.control.inner.lock().unwrap();
            if ctl.run_active {
                return Err(StartError::AlreadyRunning);
            }
            if images.is_empty() {
                return Err(StartError::EmptyImageSet);
            }
            ctl.run_active = true;
            ctl.paused = false;
            ctl.cancel_requested = false;
            ctl.state = UpgradeState::Idle;
        }

        info!(images = images.len(), mode = %mode, "Starting upgrade run");
        let runner = UpgradeRunner::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.observer),
            self.config.clone(),
            Arc::clone(&self.control),
            images.to_vec(),
            mode,
        );
        thread::spawn(move || runner.run());
        Ok(())
    }

    /// Request a pause at the next chunk boundary.
    ///
    /// Best effort: only the upload loop parks on the flag, an in-flight
    /// chunk always completes. No-op without an active run.
    pub fn pause(&self) {
        let mut ctl = self.control.inner.lock().unwrap();
        if ctl.run_active && !ctl.paused {
            ctl.paused = true;
            debug!("Pause requested");
        }
    }

    /// Reverse a pending or active pause. No-op if not paused.
    pub fn resume(&self) {
        let mut ctl = self.control.inner.lock().unwrap();
        if ctl.paused {
            ctl.paused = false;
            debug!("Resumed");
            self.control.wake.notify_all();
        }
    }

    /// Request cancellation at the next chunk or phase boundary.
    ///
    /// One-shot and idempotent; a no-op once the run has reached a
    /// terminal state.
    pub fn cancel(&self) {
        let mut ctl = self.control.inner.lock().unwrap();
        if ctl.run_active && !ctl.cancel_requested {
            ctl.cancel_requested = true;
            info!("Cancel requested");
            self.control.wake.notify_all();
        }
    }

    /// Current phase; `Idle` between runs.
    pub fn state(&self) -> UpgradeState {
        self.control.state()
    }

    /// Whether a run holds the slot (terminal event not yet delivered).
    pub fn is_in_progress(&self) -> bool {
        self.control.inner.lock().unwrap().run_active
    }

    pub fn is_paused(&self) -> bool {
        self.control.inner.lock().unwrap().paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::CoreId;
    use crate::transport::MockDevice;
    use crate::upgrade::testutil::{Recorder, fast_config, images};

    const WAIT: Duration = Duration::from_secs(5);

    fn manager(mock: &Arc<MockDevice>, recorder: &Arc<Recorder>) -> UpgradeManager {
        UpgradeManager::builder()
            .config(fast_config())
            .observer(recorder.clone())
            .connect(mock.clone())
    }

    #[test]
    fn test_start_rejects_empty_image_set() {
        let recorder = Recorder::new();
        let manager = manager(&Arc::new(MockDevice::new()), &recorder);

        let err = manager.start(&[], UpgradeMode::TestAndConfirm).unwrap_err();
        assert_eq!(err, StartError::EmptyImageSet);
        // Rejected synchronously: no events, state untouched.
        assert!(recorder.events().is_empty());
        assert_eq!(manager.state(), UpgradeState::Idle);
        assert!(!manager.is_in_progress());
    }

    #[test]
    fn test_start_rejects_while_run_active() {
        let mock = Arc::new(MockDevice::new());
        mock.set_chunk_delay(Duration::from_millis(5));
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 4000)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert_eq!(
            manager.start(&set, UpgradeMode::TestAndConfirm).unwrap_err(),
            StartError::AlreadyRunning
        );
        // Still rejected while paused mid-run.
        manager.pause();
        assert_eq!(
            manager.start(&set, UpgradeMode::TestOnly).unwrap_err(),
            StartError::AlreadyRunning
        );
        manager.resume();

        manager.cancel();
        assert!(recorder.wait_terminal(WAIT));
    }

    #[test]
    fn test_second_run_after_terminal() {
        let mock = Arc::new(MockDevice::new());
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 600)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder.wait_terminal(WAIT));
        assert!(!manager.is_in_progress());
        assert_eq!(manager.state(), UpgradeState::Idle);

        // Same image set again, the run slot reopened.
        let recorder2 = Recorder::new();
        let manager2 = UpgradeManager::builder()
            .config(fast_config())
            .observer(recorder2.clone())
            .connect(mock.clone());
        manager2.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(recorder2.wait_terminal(WAIT));
        assert_eq!(mock.reset_count(), 2);
    }

    #[test]
    fn test_controls_are_noops_without_a_run() {
        let recorder = Recorder::new();
        let manager = manager(&Arc::new(MockDevice::new()), &recorder);

        manager.pause();
        assert!(!manager.is_paused());
        manager.resume();
        manager.cancel();

        assert!(recorder.events().is_empty());
        assert_eq!(manager.state(), UpgradeState::Idle);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mock = Arc::new(MockDevice::new());
        mock.set_chunk_delay(Duration::from_millis(5));
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 4000)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        manager.cancel();
        manager.cancel();
        assert!(recorder.wait_terminal(WAIT));

        let terminals = recorder
            .events()
            .iter()
            .filter(|e| e.is_terminal())
            .count();
        assert_eq!(terminals, 1);

        // After the terminal event, a further cancel changes nothing.
        let before = recorder.events().len();
        manager.cancel();
        assert_eq!(recorder.events().len(), before);
        assert_eq!(manager.state(), UpgradeState::Idle);
    }

    #[test]
    fn test_pause_flag_visibility() {
        let mock = Arc::new(MockDevice::new());
        mock.set_chunk_delay(Duration::from_millis(5));
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let set = images(&[(CoreId::App, 4000)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(!manager.is_paused());
        manager.pause();
        assert!(manager.is_paused());
        manager.resume();
        assert!(!manager.is_paused());

        manager.cancel();
        assert!(recorder.wait_terminal(WAIT));
    }

    #[test]
    fn test_manager_clones_share_the_run_slot() {
        let mock = Arc::new(MockDevice::new());
        mock.set_chunk_delay(Duration::from_millis(5));
        let recorder = Recorder::new();
        let manager = manager(&mock, &recorder);
        let clone = manager.clone();
        let set = images(&[(CoreId::App, 4000)]);

        manager.start(&set, UpgradeMode::TestAndConfirm).unwrap();
        assert!(clone.is_in_progress());
        assert_eq!(
            clone.start(&set, UpgradeMode::TestAndConfirm).unwrap_err(),
            StartError::AlreadyRunning
        );
        clone.cancel();
        assert!(recorder.wait_terminal(WAIT));
        assert!(!manager.is_in_progress());
    }
}
