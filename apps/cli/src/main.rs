use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use swapup_core::image::{CoreId, FirmwareImage, ImageHeader, ImageVersion, validate_all};
use swapup_core::package::{self, PackageBuilder};
use swapup_core::transport::{DeviceTransport, MockDevice, TracingTrafficLog, UsbTransport};
use swapup_core::upgrade::{UpgradeManager, UpgradeMode, progress};
use swapup_core::{UpgradeConfig, UpgradeEvent, UpgradeObserver};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Dual-core firmware upgrade tool", long_about = None)]
struct Args {
    /// Path to firmware package (.swpk)
    package: Option<PathBuf>,

    /// Upgrade mode
    #[arg(long, value_enum, default_value_t = ModeArg::TestAndConfirm)]
    mode: ModeArg,

    /// Estimated image swap time after reset, in seconds
    #[arg(long)]
    swap_time: Option<u64>,

    /// Upload chunk size in bytes (defaults to the transport MTU)
    #[arg(long)]
    chunk: Option<usize>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// List package contents and exit
    #[arg(long)]
    list: bool,

    /// Run against an in-process mock device
    #[arg(long)]
    mock: bool,

    /// USB vendor id (hex), requires --pid
    #[arg(long, value_parser = parse_id, requires = "pid")]
    vid: Option<u16>,

    /// USB product id (hex), requires --vid
    #[arg(long, value_parser = parse_id, requires = "vid")]
    pid: Option<u16>,

    /// Mirror device traffic into the log
    #[arg(long)]
    trace_traffic: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    TestAndConfirm,
    TestOnly,
    ConfirmOnly,
}

impl From<ModeArg> for UpgradeMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::TestAndConfirm => UpgradeMode::TestAndConfirm,
            ModeArg::TestOnly => UpgradeMode::TestOnly,
            ModeArg::ConfirmOnly => UpgradeMode::ConfirmOnly,
        }
    }
}

fn parse_id(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id '{s}': {e}"))
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> anyhow::Result<i32> {
    let mut config = match &args.config {
        Some(path) => UpgradeConfig::load_from_file(path)?,
        None => UpgradeConfig::default(),
    };
    if let Some(secs) = args.swap_time {
        config.estimated_swap_time_ms = secs * 1000;
    }
    if let Some(chunk) = args.chunk {
        config.chunk_size = Some(chunk);
    }

    let images = match &args.package {
        Some(path) => {
            let candidates = package::load(path)
                .with_context(|| format!("loading package {}", path.display()))?;
            validate_all(candidates)?
        }
        None if args.mock => demo_images(),
        None => bail!("no firmware package given (pass a .swpk path or --mock)"),
    };

    print_images(&images);
    if args.list {
        return Ok(0);
    }

    let transport: Arc<dyn DeviceTransport> = if args.mock {
        let mock = Arc::new(MockDevice::new());
        mock.set_swap_duration(Duration::from_millis(400));
        mock
    } else {
        Arc::new(match (args.vid, args.pid) {
            (Some(vid), Some(pid)) => UsbTransport::open_with_ids(vid, pid)?,
            _ => UsbTransport::open()?,
        })
    };

    let console = ConsoleObserver::new();
    let mut builder = UpgradeManager::builder()
        .config(config)
        .observer(console.clone());
    if args.trace_traffic {
        builder = builder.traffic_log(Arc::new(TracingTrafficLog));
    }
    let manager = builder.connect(transport);

    let started = Instant::now();
    manager.start(&images, args.mode.into())?;

    match console.wait() {
        UpgradeEvent::Completed => {
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "Upgrade finished");
            Ok(0)
        }
        _ => Ok(1),
    }
}

fn print_images(images: &[FirmwareImage]) {
    println!("Package contents:");
    for image in images {
        println!(
            "  {:<9} v{:<10} {:>10}  {}",
            image.core().to_string(),
            image.version().to_string(),
            image.size_label(),
            image.digest_label(),
        );
    }
}

/// Two-image package exercised against the mock device.
fn demo_images() -> Vec<FirmwareImage> {
    let raw = PackageBuilder::new()
        .image(CoreId::App, demo_content(1000, ImageVersion::new(1, 2, 3)))
        .image(CoreId::Net, demo_content(500, ImageVersion::new(1, 0, 9)))
        .build();
    let candidates = package::extract(&raw).expect("demo package is well formed");
    validate_all(candidates).expect("demo package is well formed")
}

fn demo_content(payload_len: usize, version: ImageVersion) -> Vec<u8> {
    let mut content = ImageHeader::new(payload_len as u32, version).to_bytes();
    content.extend((0..payload_len).map(|i| (i % 251) as u8));
    content
}

struct ConsoleState {
    outcome: Option<UpgradeEvent>,
    line_open: bool,
}

/// Prints run progress to stdout and hands the terminal event to `main`.
struct ConsoleObserver {
    state: Mutex<ConsoleState>,
    done: Condvar,
}

impl ConsoleObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ConsoleState {
                outcome: None,
                line_open: false,
            }),
            done: Condvar::new(),
        })
    }

    /// Block until the run delivers its terminal event.
    fn wait(&self) -> UpgradeEvent {
        let mut st = self.state.lock().unwrap();
        loop {
            if let Some(outcome) = &st.outcome {
                return outcome.clone();
            }
            st = self.done.wait(st).unwrap();
        }
    }
}

impl UpgradeObserver for ConsoleObserver {
    fn on_event(&self, event: &UpgradeEvent) {
        let mut st = self.state.lock().unwrap();
        match event {
            UpgradeEvent::Started => println!("Upgrade started"),
            UpgradeEvent::StateChanged { from, to } => {
                if st.line_open {
                    println!();
                    st.line_open = false;
                }
                println!("  {from} -> {to}");
            }
            UpgradeEvent::Progress {
                bytes_sent,
                image_size,
                ..
            } => {
                let pct = progress::ratio(*bytes_sent, *image_size) * 100.0;
                print!("\r  uploading {bytes_sent}/{image_size} ({pct:3.0}%)");
                let _ = std::io::stdout().flush();
                st.line_open = true;
            }
            terminal => {
                if st.line_open {
                    println!();
                    st.line_open = false;
                }
                match terminal {
                    UpgradeEvent::Completed => println!("Upgrade completed"),
                    UpgradeEvent::Failed { state, error } => {
                        println!("Upgrade failed during {state}: {error}")
                    }
                    UpgradeEvent::Cancelled { state } => {
                        println!("Upgrade cancelled during {state}")
                    }
                    _ => {}
                }
                st.outcome = Some(terminal.clone());
                self.done.notify_all();
            }
        }
    }
}
