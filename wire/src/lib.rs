#![forbid(unsafe_code)]

//! Wire encoding for emitted frames: prost messages sealed with a
//! derive-key digest over their encoding.

use blake3::Hasher;
use prost::Message;
use stream_core::{LaneToken, LANES};
use thiserror::Error;

const PIXEL_FRAME_DOMAIN: &str = "SHARP:WIRE:PIXEL_FRAME";
const RUN_REPORT_DOMAIN: &str = "SHARP:WIRE:RUN_REPORT";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame decoding failed: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("frame carries {got} lanes, expected {expected}")]
    LaneCount { got: usize, expected: usize },
    #[error("frame digest missing or invalid")]
    BadDigest,
}

#[derive(Clone, PartialEq, Message)]
pub struct PixelFrame {
    #[prost(uint64, tag = "1")]
    pub tick: u64,
    #[prost(bytes, tag = "2")]
    pub lanes: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub valid: bool,
    #[prost(bytes, optional, tag = "4")]
    pub frame_digest: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RunReport {
    #[prost(uint64, tag = "1")]
    pub ticks: u64,
    #[prost(uint64, tag = "2")]
    pub valid_ticks: u64,
    #[prost(uint64, optional, tag = "3")]
    pub first_valid_tick: Option<u64>,
    #[prost(bytes, tag = "4")]
    pub run_digest: Vec<u8>,
    #[prost(bytes, optional, tag = "5")]
    pub report_digest: Option<Vec<u8>>,
}

pub fn frame_from_output(tick: u64, output: &LaneToken) -> PixelFrame {
    seal_frame(PixelFrame {
        tick,
        lanes: output.value.to_vec(),
        valid: output.valid,
        frame_digest: None,
    })
}

pub fn seal_frame(mut frame: PixelFrame) -> PixelFrame {
    frame.frame_digest = None;
    frame.frame_digest = Some(digest_message(PIXEL_FRAME_DOMAIN, &frame).to_vec());
    frame
}

pub fn verify_frame(frame: &PixelFrame) -> Result<(), WireError> {
    if frame.lanes.len() != LANES {
        return Err(WireError::LaneCount {
            got: frame.lanes.len(),
            expected: LANES,
        });
    }
    let mut unsealed = frame.clone();
    unsealed.frame_digest = None;
    let expected = digest_message(PIXEL_FRAME_DOMAIN, &unsealed);
    match &frame.frame_digest {
        Some(digest) if digest.as_slice() == expected.as_slice() => Ok(()),
        _ => Err(WireError::BadDigest),
    }
}

pub fn seal_report(mut report: RunReport) -> RunReport {
    report.report_digest = None;
    report.report_digest = Some(digest_message(RUN_REPORT_DOMAIN, &report).to_vec());
    report
}

pub fn verify_report(report: &RunReport) -> Result<(), WireError> {
    let mut unsealed = report.clone();
    unsealed.report_digest = None;
    let expected = digest_message(RUN_REPORT_DOMAIN, &unsealed);
    match &report.report_digest {
        Some(digest) if digest.as_slice() == expected.as_slice() => Ok(()),
        _ => Err(WireError::BadDigest),
    }
}

pub fn decode_frame(bytes: &[u8]) -> Result<PixelFrame, WireError> {
    let frame = PixelFrame::decode(bytes)?;
    verify_frame(&frame)?;
    Ok(frame)
}

fn digest_message(domain: &str, message: &impl Message) -> [u8; 32] {
    let mut buf = Vec::new();
    message.encode(&mut buf).unwrap();

    let mut hasher = Hasher::new_derive_key(domain);
    hasher.update(&buf);
    *hasher.finalize().as_bytes()
}
