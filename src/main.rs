//! Layout Uploader - tiles an image and publishes it as a deep zoom layout.
//!
//! This binary wires the CLI to an upload session and reports progress.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layout_uploader::{
    config::{Cli, Command, PlanConfig, UploadConfig},
    pyramid::{plan_pyramid_with_bounds, PyramidPlan, ZoomBounds},
    HttpLayoutServer, ProgressUpdate, RunError, UploadClient, UploadSession,
};

/// Exit code reported when the run was cancelled with Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Upload(config) => run_upload(config).await,
        Command::Plan(config) => run_plan(config),
    }
}

// =============================================================================
// Upload Command
// =============================================================================

async fn run_upload(args: UploadConfig) -> ExitCode {
    init_logging(args.verbose);

    let config = match args.to_process_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = match HttpLayoutServer::new() {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    print_banner();
    info!("Configuration:");
    info!("  Image: {}", args.image.display());
    info!("  Server: {}", config.server_address);
    info!("  Layout key: {}", config.layout_key);
    info!(
        "  Tiles: {}px, JPEG quality {}, background {}",
        config.tile_size, config.jpeg_quality, config.background_color
    );
    info!("");

    let session = UploadSession::new(UploadClient::new(server));

    let interrupt = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling...");
            interrupt.cancel();
        }
    });

    let runner = session.clone();
    let mut run = tokio::spawn(async move { runner.start(config).await });

    let mut ticker = tokio::time::interval(Duration::from_millis(args.poll_interval_ms.max(1)));
    let mut last: Option<ProgressUpdate> = None;

    let outcome = loop {
        tokio::select! {
            joined = &mut run => break joined,
            _ = ticker.tick() => {
                if let Some(update) = session.progress() {
                    if last.as_ref() != Some(&update) && !update.status.is_terminal() {
                        log_progress(&update);
                    }
                    last = Some(update);
                }
            }
        }
    };

    match outcome {
        Ok(Ok(message)) => {
            info!("{}", message);
            ExitCode::SUCCESS
        }
        Ok(Err(RunError::Cancelled)) => {
            warn!("{}", RunError::Cancelled);
            ExitCode::from(EXIT_CANCELLED)
        }
        Ok(Err(e)) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Upload task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn log_progress(update: &ProgressUpdate) {
    info!(
        "[{:>5.1}%] {} - zoom {} ({}/{} tiles)",
        update.percentage, update.status, update.zoom_level, update.current, update.total
    );
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Layout Uploader v{}", version);
    info!("────────────────────────────────────────────────────────────────");
}

/// Initialize the tracing subscriber.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "layout_uploader=debug"
    } else {
        "layout_uploader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Plan Command
// =============================================================================

fn run_plan(config: PlanConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let (width, height) = match image::image_dimensions(&config.image) {
        Ok(dims) => dims,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", config.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let bounds = ZoomBounds {
        min_zoom: config.min_zoom.unwrap_or(0),
        max_zoom: config.max_zoom,
    };

    let plan = match plan_pyramid_with_bounds(width, height, config.tile_size, bounds) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&plan) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_plan(&config, &plan);
    }

    ExitCode::SUCCESS
}

fn print_plan(config: &PlanConfig, plan: &PyramidPlan) {
    println!("Pyramid plan for {}", config.image.display());
    println!("═════════════════════════════════");
    println!(
        "Source: {}x{}, tile size {}px",
        plan.source_width, plan.source_height, plan.tile_size
    );
    println!();
    println!(
        "{:>4}  {:>11}  {:>11}  {:>9}  {:>6}",
        "Zoom", "Scaled", "Canvas", "Grid", "Tiles"
    );
    println!("─────────────────────────────────────────────────");
    for level in &plan.levels {
        println!(
            "{:>4}  {:>11}  {:>11}  {:>9}  {:>6}",
            level.zoom,
            format!("{}x{}", level.scaled_width, level.scaled_height),
            format!("{}x{}", level.canvas_width, level.canvas_height),
            format!("{}x{}", level.columns, level.rows),
            level.tile_count()
        );
    }
    println!("─────────────────────────────────────────────────");
    println!(
        "{} level(s), {} tile(s), max zoom {}",
        plan.level_count(),
        plan.total_tiles(),
        plan.max_zoom()
    );
}
