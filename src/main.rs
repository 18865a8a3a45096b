use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use attendcam::{
    AttemptCoordinator, AttendanceEvent, AttendcamConfig, BatteryMonitor, ConsolePresenter,
    EventBus, FixedLocationProvider, KeyboardTrigger, LocationProvider, StillCamera,
};

#[derive(Parser, Debug)]
#[command(name = "attendcam")]
#[command(about = "Rust-based attendance terminal with face-photo capture and verified submission")]
#[command(version)]
#[command(long_about = "An attendance terminal client that proves a staff member's presence by \
combining the terminal's location, battery level, and a live facial photo into one verified \
submission. Designed for fixed-mount check-in devices such as a Raspberry Pi by the office door.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "attendcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the terminal")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - probe capabilities but don't run attempts
    #[arg(long, help = "Perform dry run - probe capabilities and exit without marking")]
    dry_run: bool,

    /// Run a single attendance attempt and exit
    #[arg(long, help = "Run one attendance attempt immediately instead of waiting for input")]
    once: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config();
        return Ok(());
    }

    // Initialize logging
    init_logging(&args)?;

    info!("Starting Attendcam terminal v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let config = match AttendcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate()?;
    info!("Attendcam configuration loaded and validated");

    // Wire up the pipeline components
    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let location: Arc<dyn LocationProvider> =
        Arc::new(FixedLocationProvider::new(&config.location));
    let camera = Arc::new(StillCamera::new(config.camera.clone()));
    let battery = Arc::new(BatteryMonitor::new(&config.battery));

    let coordinator = AttemptCoordinator::new(
        &config,
        Arc::clone(&location),
        Arc::clone(&camera),
        Arc::clone(&battery),
        Arc::clone(&event_bus),
    )?;

    let presenter = ConsolePresenter::new();

    if args.dry_run {
        let gate = attendcam::PermissionGate::new(location, camera, battery);
        let state = gate.acquire_all().await;
        println!("✓ Dry run completed - capability state: {:?}", state);
        return Ok(());
    }

    if args.once {
        let report = coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await?;
        info!(
            "Attempt {} finished after {} submission(s)",
            report.attempt_id, report.submission_count
        );
        return Ok(());
    }

    run_terminal_loop(coordinator, presenter, event_bus).await
}

/// Wait for keyboard mark requests and run one attempt per request until
/// the operator quits.
async fn run_terminal_loop(
    coordinator: AttemptCoordinator,
    presenter: ConsolePresenter,
    event_bus: Arc<EventBus>,
) -> Result<()> {
    let mut receiver = event_bus.subscribe();

    loop {
        println!("Press ENTER to mark attendance, 'q' to quit");

        let trigger = KeyboardTrigger::new(Arc::clone(&event_bus));
        trigger.start().await?;

        let mark_requested = loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Ok(AttendanceEvent::MarkRequested { .. }) => break true,
                    Ok(AttendanceEvent::ShutdownRequested { .. }) => break false,
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event listener lagged by {} events; continuing", skipped);
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break false,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received - shutting down");
                    break false;
                }
            }
        };

        // Leave raw mode before the attempt so prompts can read answers
        trigger.stop().await?;

        if !mark_requested {
            break;
        }

        match coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await
        {
            Ok(report) => {
                info!(
                    "Attempt {} finished after {} submission(s)",
                    report.attempt_id, report.submission_count
                );
            }
            Err(e) => {
                error!("Attempt failed: {}", e);
                println!("✗ {}", e);
            }
        }
    }

    info!("Attendcam terminal exited");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("attendcam={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Attendcam Configuration File");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = r#"[server]
# Base URL of the attendance backend
base_url = "http://127.0.0.1:8000"
# Request timeout for the submission call in seconds
request_timeout_seconds = 30

[camera]
# Camera device index (e.g., 0 for /dev/video0)
index = 0
# Still resolution (width, height)
resolution = [1280, 720]
# JPEG quality (1-100)
jpeg_quality = 80
# Seconds to wait for the camera to deliver a frame
frame_timeout_seconds = 5

[location]
# Surveyed position of the terminal's mounting point
# latitude = 12.9716
# longitude = 77.5946

[battery]
# Power supply capacity file (percent 0-100)
capacity_path = "/sys/class/power_supply/BAT0/capacity"

[credentials]
# Path of the credential store written by the login flow
store_path = "./credentials.toml"

[system]
# Event bus capacity
event_bus_capacity = 100
"#;

    println!("{}", default_config);
}
