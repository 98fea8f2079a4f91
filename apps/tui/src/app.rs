//! Application state and logic.
//!
//! Contains the app state (Model), input handling (Controller).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use swapup_core::image::{FirmwareImage, validate_all};
use swapup_core::package;
use swapup_core::transport::{DeviceTransport, MockDevice, TrafficLog, TrafficRecord, UsbTransport};
use swapup_core::upgrade::progress::ProgressSample;
use swapup_core::upgrade::{UpgradeManager, UpgradeMode, UpgradeState};
use swapup_core::{UpgradeConfig, UpgradeEvent, UpgradeObserver};

/// Maximum log entries to keep.
const MAX_LOG_ENTRIES: usize = 1000;

/// Maximum traffic records to keep.
const MAX_TRAFFIC_ENTRIES: usize = 1000;

/// Application state.
pub struct App {
    /// Whether to quit the application.
    pub should_quit: bool,
    /// Current focus (which pane is active).
    pub focus: Focus,
    /// Current view/tab.
    pub current_tab: Tab,
    /// Upgrade configuration.
    pub config: UpgradeConfig,
    /// Selected upgrade mode.
    pub mode: UpgradeMode,
    /// Last observed upgrade state.
    pub state: UpgradeState,
    /// Upload progress of the current image.
    pub progress: Option<ProgressSample>,
    /// Log entries.
    pub logs: VecDeque<LogEntry>,
    /// Log scroll position.
    pub log_scroll: usize,
    /// Device status.
    pub device_status: DeviceStatus,
    /// Package path input.
    pub package_path: String,
    /// Use the in-process mock device instead of USB.
    pub use_mock: bool,
    /// Loaded and validated firmware images.
    pub images: Vec<FirmwareImage>,
    /// Is an upgrade running?
    pub is_running: bool,
    /// Shared observer for receiving upgrade events.
    pub observer: Arc<TuiObserver>,
    /// Shared sink for device traffic.
    pub traffic: Arc<TuiTrafficLog>,
    /// Manager handle, present once a transport is connected.
    manager: Option<UpgradeManager>,
    /// Recent traffic records.
    pub packets: VecDeque<TrafficEntry>,
    /// Traffic scroll position.
    pub packet_scroll: usize,
}

/// Which pane is focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Path,
    Controls,
}

/// Tab/view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Main,
    Logs,
    Traffic,
    Help,
}

/// Device connection status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    Disconnected,
    Connected { label: String },
}

/// Log severity for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warn,
    Info,
}

/// Log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    pub timestamp: String,
}

/// Traffic record annotated for display.
#[derive(Debug, Clone)]
pub struct TrafficEntry {
    pub record: TrafficRecord,
    pub timestamp: String,
}

/// TUI observer that collects events for display.
pub struct TuiObserver {
    events: Mutex<VecDeque<UpgradeEvent>>,
}

impl TuiObserver {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(100)),
        }
    }

    pub fn drain_events(&self) -> Vec<UpgradeEvent> {
        let mut events = self.events.lock().unwrap();
        events.drain(..).collect()
    }
}

impl Default for TuiObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeObserver for TuiObserver {
    fn on_event(&self, event: &UpgradeEvent) {
        let mut events = self.events.lock().unwrap();
        if events.len() >= 100 {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

/// Traffic sink that buffers records for the Traffic tab.
pub struct TuiTrafficLog {
    records: Mutex<VecDeque<TrafficRecord>>,
}

impl TuiTrafficLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(100)),
        }
    }

    pub fn drain_records(&self) -> Vec<TrafficRecord> {
        let mut records = self.records.lock().unwrap();
        records.drain(..).collect()
    }
}

impl Default for TuiTrafficLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficLog for TuiTrafficLog {
    fn record(&self, record: &TrafficRecord) {
        let mut records = self.records.lock().unwrap();
        if records.len() >= 100 {
            records.pop_front();
        }
        records.push_back(record.clone());
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            focus: Focus::Path,
            current_tab: Tab::Main,
            config: UpgradeConfig::default(),
            mode: UpgradeMode::TestAndConfirm,
            state: UpgradeState::Idle,
            progress: None,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            log_scroll: 0,
            device_status: DeviceStatus::Disconnected,
            package_path: String::new(),
            use_mock: false,
            images: Vec::new(),
            is_running: false,
            observer: Arc::new(TuiObserver::new()),
            traffic: Arc::new(TuiTrafficLog::new()),
            manager: None,
            packets: VecDeque::with_capacity(100),
            packet_scroll: 0,
        }
    }

    /// Handle keyboard input. Returns true if app should quit.
    pub fn on_key(&mut self, key: KeyEvent) -> bool {
        // Global shortcuts
        match key.code {
            KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return true;
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return true;
            }
            KeyCode::Esc => {
                if self.current_tab != Tab::Main {
                    self.current_tab = Tab::Main;
                    return false;
                }
                self.should_quit = true;
                return true;
            }
            KeyCode::F(1) => {
                self.current_tab = Tab::Help;
                return false;
            }
            KeyCode::F(2) => {
                self.current_tab = Tab::Logs;
                return false;
            }
            KeyCode::F(3) => {
                self.current_tab = Tab::Traffic;
                return false;
            }
            _ => {}
        }

        // Tab-specific handling
        match self.current_tab {
            Tab::Main => self.handle_main_key(key),
            Tab::Logs => self.handle_logs_key(key),
            Tab::Traffic => self.handle_traffic_key(key),
            Tab::Help => {
                // Any key returns to main
                self.current_tab = Tab::Main;
            }
        }

        false
    }

    fn handle_main_key(&mut self, key: KeyEvent) {
        if self.focus == Focus::Path {
            match key.code {
                KeyCode::Tab => self.focus = Focus::Controls,
                KeyCode::Enter => self.load_package(),
                KeyCode::Char(c) => self.package_path.push(c),
                KeyCode::Backspace => {
                    self.package_path.pop();
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Tab => self.focus = Focus::Path,
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('m') => self.toggle_mock(),
            KeyCode::Char('1') => self.select_mode(UpgradeMode::TestAndConfirm),
            KeyCode::Char('2') => self.select_mode(UpgradeMode::TestOnly),
            KeyCode::Char('3') => self.select_mode(UpgradeMode::ConfirmOnly),
            KeyCode::Char('s') | KeyCode::Enter => self.start_upgrade(),
            KeyCode::Char('p') => self.pause(),
            KeyCode::Char('r') => self.resume(),
            KeyCode::Char('c') => self.cancel(),
            _ => {}
        }
    }

    fn handle_logs_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.log_scroll = self.log_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.log_scroll < self.logs.len().saturating_sub(1) {
                    self.log_scroll += 1;
                }
            }
            KeyCode::PageUp => {
                self.log_scroll = self.log_scroll.saturating_sub(10);
            }
            KeyCode::PageDown => {
                self.log_scroll = (self.log_scroll + 10).min(self.logs.len().saturating_sub(1));
            }
            KeyCode::Home => {
                self.log_scroll = 0;
            }
            KeyCode::End => {
                self.log_scroll = self.logs.len().saturating_sub(1);
            }
            _ => {}
        }
    }

    fn handle_traffic_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.packet_scroll = self.packet_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.packet_scroll < self.packets.len().saturating_sub(1) {
                    self.packet_scroll += 1;
                }
            }
            KeyCode::PageUp => {
                self.packet_scroll = self.packet_scroll.saturating_sub(10);
            }
            KeyCode::PageDown => {
                self.packet_scroll =
                    (self.packet_scroll + 10).min(self.packets.len().saturating_sub(1));
            }
            KeyCode::Home => {
                self.packet_scroll = 0;
            }
            KeyCode::End => {
                self.packet_scroll = self.packets.len().saturating_sub(1);
            }
            _ => {}
        }
    }

    fn load_package(&mut self) {
        if self.package_path.is_empty() {
            self.add_log(Level::Error, "No package path entered");
            return;
        }
        if self.is_running {
            self.add_log(Level::Warn, "Upgrade in progress, not reloading");
            return;
        }

        let candidates = match package::load(&self.package_path) {
            Ok(candidates) => candidates,
            Err(e) => {
                self.add_log(Level::Error, format!("Package load failed: {}", e));
                return;
            }
        };
        match validate_all(candidates) {
            Ok(images) => {
                for image in &images {
                    self.add_log(
                        Level::Info,
                        format!(
                            "{}: v{} {} [{}]",
                            image.core(),
                            image.version(),
                            image.size_label(),
                            image.digest_label()
                        ),
                    );
                }
                self.add_log(Level::Info, format!("Package loaded: {} image(s)", images.len()));
                self.images = images;
            }
            Err(e) => {
                self.add_log(Level::Error, format!("Package rejected: {}", e));
                self.images.clear();
            }
        }
    }

    fn toggle_mock(&mut self) {
        if self.is_running {
            self.add_log(Level::Warn, "Upgrade in progress, not switching device");
            return;
        }
        self.use_mock = !self.use_mock;
        // Force a reconnect with the new backend.
        self.manager = None;
        self.device_status = DeviceStatus::Disconnected;
        let target = if self.use_mock { "mock" } else { "usb" };
        self.add_log(Level::Info, format!("Device backend: {}", target));
    }

    fn select_mode(&mut self, mode: UpgradeMode) {
        if self.is_running {
            self.add_log(Level::Warn, "Upgrade in progress, mode unchanged");
            return;
        }
        self.mode = mode;
        self.add_log(Level::Info, format!("Mode: {}", mode));
    }

    /// Bind a transport and build the manager, if not already connected.
    fn connect(&mut self) {
        if self.manager.is_some() {
            return;
        }

        let (transport, label): (Arc<dyn DeviceTransport>, String) = if self.use_mock {
            let mock = Arc::new(MockDevice::new());
            mock.set_swap_duration(Duration::from_millis(400));
            (mock, "mock".to_string())
        } else {
            match UsbTransport::open() {
                Ok(usb) => {
                    let label = format!("{:04X}:{:04X}", usb.vendor_id(), usb.product_id());
                    (Arc::new(usb), label)
                }
                Err(e) => {
                    self.add_log(Level::Error, format!("Device open failed: {}", e));
                    return;
                }
            }
        };

        let manager = UpgradeManager::builder()
            .config(self.config.clone())
            .observer(self.observer.clone())
            .traffic_log(self.traffic.clone())
            .connect(transport);
        self.manager = Some(manager);
        self.device_status = DeviceStatus::Connected { label };
    }

    fn start_upgrade(&mut self) {
        if self.images.is_empty() {
            self.add_log(Level::Error, "No package loaded! Enter a path and press Enter.");
            return;
        }

        self.connect();
        let Some(manager) = &self.manager else {
            return;
        };

        match manager.start(&self.images, self.mode) {
            Ok(()) => {
                self.is_running = true;
                self.progress = None;
                self.add_log(Level::Info, format!("Upgrade started ({})", self.mode));
            }
            Err(e) => {
                self.add_log(Level::Error, format!("Start rejected: {}", e));
            }
        }
    }

    fn pause(&mut self) {
        if let Some(manager) = &self.manager {
            manager.pause();
            self.add_log(Level::Info, "Pause requested");
        }
    }

    fn resume(&mut self) {
        if let Some(manager) = &self.manager {
            manager.resume();
            self.add_log(Level::Info, "Resume requested");
        }
    }

    fn cancel(&mut self) {
        if let Some(manager) = &self.manager {
            manager.cancel();
            self.add_log(Level::Warn, "Cancel requested");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.manager.as_ref().is_some_and(|m| m.is_paused())
    }

    /// Called on each tick - process observer events and traffic.
    pub fn on_tick(&mut self) {
        let events = self.observer.drain_events();
        for event in events {
            self.process_upgrade_event(event);
        }

        let records = self.traffic.drain_records();
        for record in records {
            self.push_traffic(record);
        }
    }

    fn process_upgrade_event(&mut self, event: UpgradeEvent) {
        match event {
            UpgradeEvent::Started => {
                self.add_log(Level::Info, "Upgrade run started");
            }
            UpgradeEvent::StateChanged { from, to } => {
                self.state = to;
                self.add_log(Level::Info, format!("State: {} -> {}", from, to));
            }
            UpgradeEvent::Progress {
                bytes_sent,
                image_size,
                timestamp,
            } => {
                self.progress = Some(ProgressSample {
                    bytes_sent,
                    image_size,
                    timestamp,
                });
            }
            UpgradeEvent::Completed => {
                self.is_running = false;
                self.add_log(Level::Info, "Upgrade completed!");
            }
            UpgradeEvent::Failed { state, error } => {
                self.is_running = false;
                self.add_log(Level::Error, format!("Failed during {}: {}", state, error));
            }
            UpgradeEvent::Cancelled { state } => {
                self.is_running = false;
                self.add_log(Level::Warn, format!("Cancelled during {}", state));
            }
        }
    }

    fn push_traffic(&mut self, record: TrafficRecord) {
        let now = chrono::Local::now();
        let entry = TrafficEntry {
            record,
            timestamp: now.format("%H:%M:%S%.3f").to_string(),
        };

        if self.packets.len() >= MAX_TRAFFIC_ENTRIES {
            self.packets.pop_front();
        }
        self.packets.push_back(entry);
        // Auto-scroll
        self.packet_scroll = self.packets.len().saturating_sub(1);
    }

    fn add_log(&mut self, level: Level, message: impl Into<String>) {
        let now = chrono::Local::now();
        let entry = LogEntry {
            level,
            message: message.into(),
            timestamp: now.format("%H:%M:%S").to_string(),
        };

        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);

        // Auto-scroll to bottom
        self.log_scroll = self.logs.len().saturating_sub(1);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
