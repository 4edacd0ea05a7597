#![forbid(unsafe_code)]

//! Input trace capture and deterministic replay.
//!
//! A trace is the complete per-tick input stream of one run. Replaying it
//! through a circuit folds every output frame into domain-tagged digests,
//! which is how regressions pin the filter's exact output without storing
//! the frames themselves.

use blake3::Hasher;
use stream_core::{LaneToken, StreamCircuit, Token, LANES};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

const TRACE_INPUT_DIGEST_DOMAIN: &str = "SHARP:TRACE:INPUT";
const TRACE_OUTPUT_DIGEST_DOMAIN: &str = "SHARP:TRACE:OUTPUT";
const TRACE_RUN_DIGEST_DOMAIN: &str = "SHARP:TRACE:RUN";
pub const TRACE_VERSION: u32 = 1;
const MAX_TRACE_TICKS: u32 = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub trace_version: u32,
    pub config_digest: [u8; 32],
    pub lane_count: u32,
    pub ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceTick {
    pub lanes: [u8; LANES],
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFile {
    pub header: TraceHeader,
    pub ticks: Vec<TraceTick>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRunResult {
    pub output_digest: [u8; 32],
    pub final_snapshot_digest: [u8; 32],
    pub run_digest: [u8; 32],
    pub valid_ticks: u64,
    pub first_valid_tick: Option<u64>,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace encoding error: {message}")]
    InvalidFormat { message: String },
    #[error("trace validation failed: {message}")]
    Validation { message: String },
}

pub fn input_stream_digest(ticks: &[TraceTick]) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(TRACE_INPUT_DIGEST_DOMAIN.as_bytes());
    for tick in ticks {
        hasher.update(&tick.lanes);
        hasher.update(&[tick.valid as u8]);
    }
    *hasher.finalize().as_bytes()
}

pub fn write_trace(path: impl AsRef<Path>, trace: &TraceFile) -> Result<(), TraceError> {
    validate_shape(trace)?;

    let mut file = File::create(path)?;
    write_header(&mut file, &trace.header)?;
    for tick in &trace.ticks {
        file.write_all(&tick.lanes)?;
        file.write_all(&[tick.valid as u8])?;
    }
    file.flush()?;
    Ok(())
}

pub fn read_trace(path: impl AsRef<Path>) -> Result<TraceFile, TraceError> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let mut cursor = 0usize;

    let header = read_header(&bytes, &mut cursor)?;
    if header.trace_version != TRACE_VERSION {
        return Err(TraceError::InvalidFormat {
            message: format!("unsupported trace version {}", header.trace_version),
        });
    }
    if header.lane_count != LANES as u32 {
        return Err(TraceError::InvalidFormat {
            message: format!("unsupported lane count {}", header.lane_count),
        });
    }
    if header.ticks > MAX_TRACE_TICKS {
        return Err(TraceError::InvalidFormat {
            message: format!("trace too long: {} ticks", header.ticks),
        });
    }

    let mut ticks = Vec::with_capacity(header.ticks as usize);
    for _ in 0..header.ticks {
        let lanes_slice = read_slice(&bytes, &mut cursor, LANES)?;
        let mut lanes = [0u8; LANES];
        lanes.copy_from_slice(lanes_slice);
        let valid = read_u8(&bytes, &mut cursor)? != 0;
        ticks.push(TraceTick { lanes, valid });
    }

    if cursor != bytes.len() {
        return Err(TraceError::InvalidFormat {
            message: "extra bytes at end of trace".to_string(),
        });
    }

    Ok(TraceFile { header, ticks })
}

/// Replay a trace through a circuit, folding every output frame into the
/// run digests. The circuit must be freshly constructed; replay assumes
/// tick 0 state.
pub fn run_trace<C>(trace: &TraceFile, circuit: &mut C) -> Result<TraceRunResult, TraceError>
where
    C: StreamCircuit<LaneToken, LaneToken>,
{
    validate_shape(trace)?;
    if trace.header.config_digest != circuit.config_digest() {
        return Err(TraceError::Validation {
            message: "trace config digest does not match circuit".to_string(),
        });
    }

    let mut output_hasher = Hasher::new();
    output_hasher.update(TRACE_OUTPUT_DIGEST_DOMAIN.as_bytes());
    let mut valid_ticks = 0u64;
    let mut first_valid_tick = None;

    for (tick_idx, tick) in trace.ticks.iter().enumerate() {
        let input = Token::new(tick.lanes, tick.valid);
        let output = circuit.step(&input, tick_idx as u64);
        output_hasher.update(&output.value);
        output_hasher.update(&[output.valid as u8]);
        if output.valid {
            valid_ticks += 1;
            if first_valid_tick.is_none() {
                first_valid_tick = Some(tick_idx as u64);
            }
        }
    }

    let output_digest = *output_hasher.finalize().as_bytes();
    let final_snapshot_digest = circuit.snapshot_digest();
    let run_digest = digest_run(output_digest, final_snapshot_digest);

    Ok(TraceRunResult {
        output_digest,
        final_snapshot_digest,
        run_digest,
        valid_ticks,
        first_valid_tick,
    })
}

fn validate_shape(trace: &TraceFile) -> Result<(), TraceError> {
    if trace.ticks.len() != trace.header.ticks as usize {
        return Err(TraceError::Validation {
            message: format!(
                "header ticks {} does not match trace ticks {}",
                trace.header.ticks,
                trace.ticks.len()
            ),
        });
    }
    Ok(())
}

fn digest_run(output_digest: [u8; 32], final_snapshot_digest: [u8; 32]) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(TRACE_RUN_DIGEST_DOMAIN.as_bytes());
    hasher.update(&output_digest);
    hasher.update(&final_snapshot_digest);
    *hasher.finalize().as_bytes()
}

fn write_header(mut writer: impl Write, header: &TraceHeader) -> Result<(), TraceError> {
    writer.write_all(&header.trace_version.to_le_bytes())?;
    writer.write_all(&header.config_digest)?;
    writer.write_all(&header.lane_count.to_le_bytes())?;
    writer.write_all(&header.ticks.to_le_bytes())?;
    Ok(())
}

fn read_header(bytes: &[u8], cursor: &mut usize) -> Result<TraceHeader, TraceError> {
    Ok(TraceHeader {
        trace_version: read_u32(bytes, cursor)?,
        config_digest: read_digest(bytes, cursor)?,
        lane_count: read_u32(bytes, cursor)?,
        ticks: read_u32(bytes, cursor)?,
    })
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, TraceError> {
    let slice = read_slice(bytes, cursor, 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(slice);
    Ok(u32::from_le_bytes(buf))
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8, TraceError> {
    Ok(read_slice(bytes, cursor, 1)?[0])
}

fn read_digest(bytes: &[u8], cursor: &mut usize) -> Result<[u8; 32], TraceError> {
    let slice = read_slice(bytes, cursor, 32)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(slice);
    Ok(out)
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], TraceError> {
    let end = cursor
        .checked_add(len)
        .ok_or_else(|| TraceError::InvalidFormat {
            message: "unexpected eof".to_string(),
        })?;
    if end > bytes.len() {
        return Err(TraceError::InvalidFormat {
            message: "unexpected eof".to_string(),
        });
    }
    let slice = &bytes[*cursor..end];
    *cursor = end;
    Ok(slice)
}
