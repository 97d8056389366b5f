//! Drishti demo driver
//!
//! Runs one scanning session against the synthetic frame source with live
//! host resource sampling, then prints the session summary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (drishti.toml in the working directory if present)
//! cargo run --release
//!
//! # Custom config, photogrammetry-only device, 600 frames
//! cargo run --release -- --config drishti.toml --no-lidar --frames 600
//! ```

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::unbounded;

use drishti::core::SessionClock;
use drishti::io::{FrameSource, SyntheticConfig, SyntheticFrameSource};
use drishti::resources::SysinfoSampler;
use drishti::threads::{ResourceMonitorThread, SessionRunner};
use drishti::{
    DrishtiConfig, InMemorySessionStore, ResourceMonitor, ScanError, ScanEvent, ScanSession,
    SessionSummary,
};

#[derive(Parser)]
#[command(name = "drishti")]
#[command(about = "Run a scanning session against synthetic capture")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Frames to capture
    #[arg(long, default_value = "300")]
    frames: u64,

    /// Capture rate (frames per second)
    #[arg(long, default_value = "30")]
    fps: f32,

    /// Synthetic noise seed (0 = random)
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Simulate a device without LiDAR
    #[arg(long)]
    no_lidar: bool,

    /// Override the threshold region
    #[arg(long)]
    region: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(summary) => {
            print_summary(&summary);
            if summary.escalation.is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> drishti::Result<DrishtiConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            DrishtiConfig::load(Path::new(path))?
        }
        None if Path::new("drishti.toml").exists() => {
            log::info!("Loading configuration from drishti.toml");
            DrishtiConfig::load(Path::new("drishti.toml"))?
        }
        None => {
            log::info!("Using default configuration");
            DrishtiConfig::default()
        }
    };
    if args.no_lidar {
        config.device.has_lidar = false;
    }
    if let Some(region) = &args.region {
        config.region = region.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> drishti::Result<SessionSummary> {
    let config = load_config(args)?;
    log::info!("drishti v{}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "  Device: lidar={}, processing power {:.2}",
        config.device.has_lidar,
        config.device.processing_power
    );
    log::info!("  Region: {}", config.region);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| ScanError::Unrecoverable(format!("Ctrl-C handler: {e}")))?;

    let store = Arc::new(InMemorySessionStore::new());
    let mut session = ScanSession::from_config(&config)?.with_store(store);
    let monitor = ResourceMonitor::new(config.resources.clone());
    let events = session.subscribe().with(monitor.publisher().subscribe());

    let clock = SessionClock::start();
    session.start(clock.now_us())?;

    let (report_tx, report_rx) = unbounded();
    let runner = SessionRunner::spawn(session, clock, Some(report_rx))?;
    let monitor_thread = ResourceMonitorThread::spawn(
        Box::new(SysinfoSampler::new()),
        monitor,
        clock,
        runner.frame_counter(),
        report_tx,
    )?;

    let mut source = SyntheticFrameSource::new(SyntheticConfig {
        with_depth: config.device.has_lidar,
        fps: args.fps,
        seed: args.seed,
        max_frames: Some(args.frames),
        ..Default::default()
    });
    let interval = Duration::from_secs_f32(1.0 / args.fps.max(1.0));
    let mut next_tick = Instant::now();

    while running.load(Ordering::Relaxed) {
        let Some(frame) = source.next_frame() else {
            break;
        };
        match runner.submit(frame) {
            Ok(()) => {}
            Err(ScanError::ProcessingInProgress) => log::debug!("Frame dropped, worker busy"),
            Err(e) => return Err(e),
        }

        for event in events.drain() {
            report_event(&event);
        }
        if runner.status().state.is_terminal() {
            log::warn!("Session ended early in {}", runner.status().state);
            break;
        }

        next_tick += interval;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    if monitor_thread.stop().is_err() {
        log::error!("Resource monitor panicked");
    }
    let summary = runner.stop(Duration::from_millis(config.session.stop_timeout_ms))?;
    for event in events.drain() {
        report_event(&event);
    }
    Ok(summary)
}

fn report_event(event: &ScanEvent) {
    match event {
        ScanEvent::ModeChanged { from, to, reason, .. } => {
            println!("  mode      {:?} -> {} ({})", from, to, reason);
        }
        ScanEvent::RecoverableError { kind, attempt, .. } => {
            println!("  recovery  {} (attempt {})", kind, attempt);
        }
        ScanEvent::UnrecoverableError(escalation) => {
            println!("  ERROR     {}", escalation.description());
            if let Some(hint) = escalation.recovery_suggestion() {
                println!("            suggestion: {}", hint);
            }
        }
        ScanEvent::ResourceCritical(alert) => {
            println!("  resource  {} critical ({:.2})", alert.resource, alert.value);
        }
        other => log::debug!("Event: {:?}", other),
    }
}

fn print_summary(summary: &SessionSummary) {
    let stats = &summary.stats;
    println!();
    println!("Session {}", summary.session_id);
    println!("  state:        {}", summary.final_state);
    match summary.final_mode {
        Some(mode) => println!("  mode:         {}", mode),
        None => println!("  mode:         none"),
    }
    if !summary.retired_modes.is_empty() {
        println!("  retired:      {:?}", summary.retired_modes);
    }
    println!("  settings:     {}", summary.settings);
    println!(
        "  frames:       {} received, {} accepted, {} rejected, {} invalid, {} dropped",
        stats.frames_received,
        stats.frames_accepted,
        stats.frames_rejected,
        stats.frames_invalid,
        stats.frames_dropped
    );
    println!(
        "  acceptance:   {:.1}%",
        stats.acceptance_rate() * 100.0
    );
    println!(
        "  decisions:    {} mode switches, {} adaptations, {} recoveries",
        stats.mode_switches, stats.adaptations, stats.recoveries
    );
    println!("  duration:     {:.1}s", summary.duration_us as f64 / 1e6);
}
