mod common;

use common::constant_image;
use engine::SharpenPipeline;
use sharpen_kernel::CoeffTable;
use stream_core::{StreamCircuit, Token};

/// On a flat image every gradient is zero, the kernel's select falls back
/// to the constant branch, and the output is `b + (k3 >> shift)` on every
/// lane — a hard-coded regression pair.
#[test]
fn flat_image_takes_the_constant_branch() {
    let (k3, shift) = (6u8, 1u8);
    let coeffs = CoeffTable::uniform(2, 8, shift, k3);
    let mut circuit = SharpenPipeline::new(2, coeffs).unwrap();
    let fill = circuit.fill_latency() as usize;

    let value = 100u8;
    let inputs = constant_image(value, fill + 20);
    for (tick, lanes) in inputs.iter().enumerate() {
        let output = circuit.step(&Token::valid(*lanes), tick as u64);
        if tick >= fill {
            assert!(output.valid);
            assert_eq!(output.value, [value.wrapping_add(k3 >> shift); 4]);
        }
    }
}

/// Wrapping survives the whole pipeline: a flat 255 image with an additive
/// constant wraps through zero instead of saturating.
#[test]
fn flat_image_add_back_wraps() {
    let coeffs = CoeffTable::uniform(2, 8, 0, 3);
    let mut circuit = SharpenPipeline::new(2, coeffs).unwrap();
    let fill = circuit.fill_latency() as usize;

    let inputs = constant_image(255, fill + 8);
    for (tick, lanes) in inputs.iter().enumerate() {
        let output = circuit.step(&Token::valid(*lanes), tick as u64);
        if tick >= fill {
            assert_eq!(output.value, [2u8; 4]);
        }
    }
}
