// src/main.rs

use anyhow::{Context, Result};
use lane_tracking::pipeline::{find_mask_files, spawn_loader, LaneContext, RunMetrics};
use lane_tracking::types::{Config, LoggingConfig, OutputConfig};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Frames between progress lines.
const PROGRESS_INTERVAL: u64 = 100;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let (config, from_file) = if Path::new(&config_path).exists() {
        (Config::load(&config_path)?, true)
    } else {
        (Config::default(), false)
    };

    init_logging(&config.logging)?;

    info!("🛣️ Lane Tracking Starting");
    if from_file {
        info!("✓ Configuration loaded from {}", config_path);
    } else {
        warn!("{} not found, using built-in defaults", config_path);
    }
    info!(
        "Tracker: history={} alpha={:.2} tol(curv={:.2}, grad={:.2}) sep=[{:.0}, {:.0}]px refresh every {}f",
        config.tracker.history_depth,
        config.tracker.smoothing_alpha,
        config.tracker.curvature_tolerance,
        config.tracker.gradient_tolerance,
        config.tracker.min_separation,
        config.tracker.max_separation,
        config.tracker.curvature_refresh_interval,
    );

    let files = find_mask_files(&config.input)?;
    if files.is_empty() {
        error!("No mask files found in {}", config.input.mask_dir);
        return Ok(());
    }

    let metrics = Arc::new(RunMetrics::new());
    let mut frames = spawn_loader(files, &config.input, Arc::clone(&metrics));
    let mut context = LaneContext::new(&config);
    let mut report_writer = open_report(&config.output)?;

    while let Some(frame) = frames.recv().await {
        let frame = frame?;
        let report = context.process_frame(&frame.mask);
        metrics.record(&report);

        if report.frame_index % PROGRESS_INTERVAL == 0 {
            info!(
                "F{} [{}] L={} R={} | curvature={} | offset={}",
                report.frame_index,
                report.search,
                report.left.line.state.as_str(),
                report.right.line.state.as_str(),
                report
                    .lane_curvature_m
                    .map(|r| format!("{:.1}m", r))
                    .unwrap_or_else(|| "n/a".to_string()),
                report
                    .vehicle_offset
                    .map(|o| format!("{:.3}m {} of center", o.meters.abs(), o.side.as_str()))
                    .unwrap_or_else(|| "n/a".to_string()),
            );
        }

        if let Some(writer) = report_writer.as_mut() {
            let mut record = serde_json::to_value(&report)?;
            record["source"] = serde_json::json!(frame.path.display().to_string());
            writeln!(writer, "{}", serde_json::to_string(&record)?)?;
        }
    }

    if let Some(mut writer) = report_writer {
        writer.flush()?;
    }

    let summary = metrics.summary();
    info!("\n✓ Run complete");
    info!(
        "  Frames: {} processed, {} decoded, {} unreadable",
        summary.frames_processed, summary.frames_decoded, summary.decode_failures
    );
    info!(
        "  Both lines accepted: {} ({:.1}%)",
        summary.frames_both_detected,
        summary.detection_rate() * 100.0
    );
    info!(
        "  Left: {} accepted, {} rejected, {} missed",
        summary.left.accepted, summary.left.rejected, summary.left.missed
    );
    info!(
        "  Right: {} accepted, {} rejected, {} missed",
        summary.right.accepted, summary.right.rejected, summary.right.missed
    );
    info!(
        "  Searches: {} prior-seeded, {} blind | {:.1} fps",
        summary.prior_searches, summary.blind_searches, summary.fps
    );

    Ok(())
}

/// Console logging plus an optional plain-text copy in a file.
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lane_tracking={}", logging.level)));

    let file_layer = match &logging.file {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating log file {}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    if let Some(path) = &logging.file {
        info!("All logging will be written to {}", path);
    }
    Ok(())
}

fn open_report(output: &OutputConfig) -> Result<Option<BufWriter<File>>> {
    output
        .report_path
        .as_ref()
        .map(|path| {
            File::create(path)
                .map(BufWriter::new)
                .with_context(|| format!("creating report {}", path))
        })
        .transpose()
}
