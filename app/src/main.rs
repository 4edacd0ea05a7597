#![forbid(unsafe_code)]

//! Streaming driver: fixes the lane count at four, holds the start signal
//! high from tick 0 and runs the sharpening pipeline over a synthetic
//! raster for a fixed number of frames.

use engine::{PipelineError, SharpenPipeline};
use stream_core::{StreamCircuit, LANES};
use stream_trace::{input_stream_digest, run_trace, TraceError, TraceFile, TraceHeader, TraceTick, TRACE_VERSION};
use thiserror::Error;
use tuning::{ConfigError, FilterConfig};
use wire::{seal_report, RunReport};

const CONFIG_DIR: &str = "config";
const FRAMES: u32 = 4;

#[derive(Debug, Error)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("pipeline construction failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("trace replay failed: {0}")]
    Trace(#[from] TraceError),
}

fn load_config() -> Result<FilterConfig, ConfigError> {
    match FilterConfig::load_from_dir(CONFIG_DIR) {
        Ok(config) => {
            log::info!("loaded filter config from {CONFIG_DIR}/");
            Ok(config)
        }
        Err(ConfigError::Io { path, .. }) => {
            log::warn!("no config at {}, using fallback tables", path.display());
            Ok(FilterConfig::fallback())
        }
        Err(error) => Err(error),
    }
}

/// A deterministic test raster: a vertical edge at half the image width
/// plus a faint per-row ramp, repeated for every frame.
fn synthetic_stream(config: &FilterConfig, frames: u32) -> Vec<TraceTick> {
    let row_ticks = config.raster.row_ticks();
    let rows = config.raster.image_height as usize;
    let mut ticks = Vec::with_capacity(frames as usize * rows * row_ticks);
    for _ in 0..frames {
        for row in 0..rows {
            for group in 0..row_ticks {
                let mut lanes = [0u8; LANES];
                for (lane, slot) in lanes.iter_mut().enumerate() {
                    let column = group * LANES + lane;
                    let base = if column >= row_ticks * LANES / 2 { 192 } else { 32 };
                    *slot = (base + row % 16) as u8;
                }
                ticks.push(TraceTick { lanes, valid: true });
            }
        }
    }
    ticks
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    let mut pipeline = SharpenPipeline::from_filter_config(&config)?;
    log::info!(
        "pipeline up: {} lanes, {} ticks per row, fill latency {}",
        LANES,
        pipeline.row_ticks(),
        pipeline.fill_latency()
    );

    let ticks = synthetic_stream(&config, FRAMES);
    let trace = TraceFile {
        header: TraceHeader {
            trace_version: TRACE_VERSION,
            config_digest: pipeline.config_digest(),
            lane_count: LANES as u32,
            ticks: ticks.len() as u32,
        },
        ticks,
    };
    log::debug!(
        "input stream digest {}",
        hex(&input_stream_digest(&trace.ticks))
    );

    let result = run_trace(&trace, &mut pipeline)?;
    let report = seal_report(RunReport {
        ticks: trace.header.ticks as u64,
        valid_ticks: result.valid_ticks,
        first_valid_tick: result.first_valid_tick,
        run_digest: result.run_digest.to_vec(),
        report_digest: None,
    });

    println!(
        "run ok: {} ticks, {} valid, first valid at {:?}",
        report.ticks, report.valid_ticks, report.first_valid_tick
    );
    println!("run digest {}", hex(&result.run_digest));
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .init();

    if let Err(error) = run() {
        log::error!("{error}");
        std::process::exit(1);
    }
}
