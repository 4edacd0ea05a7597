#![cfg(test)]

use engine::SharpenPipeline;
use sharpen_kernel::CoeffTable;
use stream_core::{LaneToken, StreamCircuit, Token, LANES};

pub fn pipeline(row_ticks: usize) -> SharpenPipeline {
    SharpenPipeline::new(row_ticks, CoeffTable::sharpen_default()).expect("balanced pipeline")
}

pub fn drive(pipeline: &mut SharpenPipeline, inputs: &[[u8; LANES]]) -> Vec<LaneToken> {
    inputs
        .iter()
        .enumerate()
        .map(|(tick, lanes)| pipeline.step(&Token::valid(*lanes), tick as u64))
        .collect()
}

pub fn constant_image(value: u8, ticks: usize) -> Vec<[u8; LANES]> {
    vec![[value; LANES]; ticks]
}

/// A vertical edge at half the raster width: for two-tick rows, even ticks
/// carry the dark half, odd ticks the bright half.
pub fn vertical_edge(ticks: usize) -> Vec<[u8; LANES]> {
    (0..ticks)
        .map(|tick| if tick % 2 == 0 { [0; LANES] } else { [200; LANES] })
        .collect()
}
