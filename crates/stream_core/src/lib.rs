#![forbid(unsafe_code)]

//! Core data model for the streaming pipeline: samples, tokens, lane
//! vectors, the tick traits and the valid-combination algebra.

use blake3::Hasher;

/// One 8-bit pixel sample. All sample arithmetic wraps; nothing saturates.
pub type Sample = u8;

/// Number of parallel lanes carried per tick.
pub const LANES: usize = 4;

/// One tick's worth of horizontally adjacent samples, positional order
/// significant.
pub type LaneVec = [Sample; LANES];

/// A value plus its validity flag. Stages always compute `value`, even when
/// `valid` is false; consumers must gate on `valid` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Token<T> {
    pub value: T,
    pub valid: bool,
}

impl<T> Token<T> {
    pub fn new(value: T, valid: bool) -> Self {
        Self { value, valid }
    }

    pub fn valid(value: T) -> Self {
        Self { value, valid: true }
    }
}

impl<T: Default> Token<T> {
    /// The reset value a registered element holds before its first push.
    pub fn reset() -> Self {
        Self {
            value: T::default(),
            valid: false,
        }
    }
}

pub type LaneToken = Token<LaneVec>;

/// Valid combination for multi-input combinational stages.
pub fn and_valid(valids: &[bool]) -> bool {
    valids.iter().all(|valid| *valid)
}

/// A synchronous stage: consumes one input per tick, emits one output per
/// tick, with a fixed registered latency.
pub trait StreamStage {
    type Input;
    type Output;

    fn tick(&mut self, input: &Self::Input) -> Self::Output;

    /// Registered latency in ticks between an input and the output it
    /// determines.
    fn latency(&self) -> u32;
}

/// A complete circuit driven from the outside, one input vector per tick.
pub trait StreamCircuit<I, O> {
    fn step(&mut self, input: &I, tick: u64) -> O;

    fn snapshot_digest(&self) -> [u8; 32];

    fn config_digest(&self) -> [u8; 32];
}

/// Free-running modulo counter. Owned by exactly one component and advanced
/// once per tick; never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModCounter {
    value: u32,
    modulus: u32,
}

impl ModCounter {
    pub fn new(modulus: u32) -> Self {
        assert!(modulus > 0, "modulus must be non-zero");
        Self { value: 0, modulus }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn index(&self) -> usize {
        self.value as usize
    }

    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    pub fn advance(&mut self) {
        self.value += 1;
        if self.value == self.modulus {
            self.value = 0;
        }
    }
}

/// State serialization into the owning component's digest stream.
pub trait StateBytes {
    fn state_bytes(&self, out: &mut Vec<u8>);
}

impl StateBytes for Sample {
    fn state_bytes(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

impl StateBytes for LaneVec {
    fn state_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl<T: StateBytes> StateBytes for Token<T> {
    fn state_bytes(&self, out: &mut Vec<u8>) {
        self.value.state_bytes(out);
        out.push(self.valid as u8);
    }
}

impl StateBytes for ModCounter {
    fn state_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.modulus.to_le_bytes());
    }
}

pub fn digest_meta(domain: &str, bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(bytes);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_reset_is_invalid_default() {
        let token: Token<Sample> = Token::reset();
        assert_eq!(token.value, 0);
        assert!(!token.valid);
    }

    #[test]
    fn and_valid_requires_all_inputs() {
        assert!(and_valid(&[]));
        assert!(and_valid(&[true, true, true]));
        assert!(!and_valid(&[true, false, true]));
    }

    #[test]
    fn mod_counter_wraps() {
        let mut counter = ModCounter::new(3);
        let observed: Vec<u32> = (0..7)
            .map(|_| {
                let value = counter.value();
                counter.advance();
                value
            })
            .collect();
        assert_eq!(observed, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn digest_depends_on_domain() {
        let a = digest_meta("alpha", b"payload");
        let b = digest_meta("beta", b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn digest_depends_on_bytes() {
        let a = digest_meta("alpha", b"payload");
        let b = digest_meta("alpha", b"payload2");
        assert_ne!(a, b);
    }

    #[test]
    fn token_state_bytes_cover_valid_flag() {
        let mut a = Vec::new();
        Token::new(7u8, true).state_bytes(&mut a);
        let mut b = Vec::new();
        Token::new(7u8, false).state_bytes(&mut b);
        assert_ne!(a, b);
    }
}
