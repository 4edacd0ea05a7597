#![forbid(unsafe_code)]

//! Fixed-depth delay lines. Both renditions reproduce a token bit-exactly
//! N ticks after it was pushed; ticks before the line is full emit the
//! reset default (zero value, valid false). Depth 0 is the identity.

use stream_core::{LaneToken, ModCounter, StateBytes, StreamStage, Token};

/// Shift-register rendition: one ring, one cursor. Suited to small depths
/// where every slot is a register.
#[derive(Debug, Clone)]
pub struct DelayLine<T> {
    ring: Vec<Token<T>>,
    cursor: ModCounter,
}

impl<T: Clone + Default> DelayLine<T> {
    pub fn new(depth: usize) -> Self {
        Self {
            ring: vec![Token::reset(); depth],
            cursor: ModCounter::new(depth.max(1) as u32),
        }
    }

    pub fn depth(&self) -> usize {
        self.ring.len()
    }

    /// Push this tick's token, receive the token from `depth` ticks ago.
    pub fn push(&mut self, token: Token<T>) -> Token<T> {
        if self.ring.is_empty() {
            return token;
        }
        let slot = self.cursor.index();
        let out = std::mem::replace(&mut self.ring[slot], token);
        self.cursor.advance();
        out
    }
}

impl<T: StateBytes> StateBytes for DelayLine<T> {
    fn state_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.ring.len() as u32).to_le_bytes());
        for token in &self.ring {
            token.state_bytes(out);
        }
        self.cursor.state_bytes(out);
    }
}

impl<T: Clone + Default> StreamStage for DelayLine<T> {
    type Input = Token<T>;
    type Output = Token<T>;

    fn tick(&mut self, input: &Self::Input) -> Self::Output {
        self.push(input.clone())
    }

    fn latency(&self) -> u32 {
        self.ring.len() as u32
    }
}

/// Memory-backed rendition for whole lane vectors: a fixed cell array
/// addressed by independent write and read counters, both advancing on the
/// same cycle-following schedule. The read counter always denotes the
/// oldest not-yet-consumed slot. One shared valid delay covers all lanes.
#[derive(Debug, Clone)]
pub struct RamDelayLine {
    cells: Vec<LaneToken>,
    write: ModCounter,
    read: ModCounter,
}

impl RamDelayLine {
    pub fn new(depth: usize) -> Self {
        Self {
            cells: vec![Token::reset(); depth],
            write: ModCounter::new(depth.max(1) as u32),
            read: ModCounter::new(depth.max(1) as u32),
        }
    }

    pub fn depth(&self) -> usize {
        self.cells.len()
    }

    pub fn push(&mut self, token: LaneToken) -> LaneToken {
        if self.cells.is_empty() {
            return token;
        }
        let out = self.cells[self.read.index()];
        self.cells[self.write.index()] = token;
        self.read.advance();
        self.write.advance();
        out
    }
}

impl StateBytes for RamDelayLine {
    fn state_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.cells.len() as u32).to_le_bytes());
        for token in &self.cells {
            token.state_bytes(out);
        }
        self.write.state_bytes(out);
        self.read.state_bytes(out);
    }
}

impl StreamStage for RamDelayLine {
    type Input = LaneToken;
    type Output = LaneToken;

    fn tick(&mut self, input: &Self::Input) -> Self::Output {
        self.push(*input)
    }

    fn latency(&self) -> u32 {
        self.cells.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_core::Sample;

    #[test]
    fn depth_zero_is_identity() {
        let mut line: DelayLine<Sample> = DelayLine::new(0);
        for value in 0..10u8 {
            let out = line.push(Token::valid(value));
            assert_eq!(out, Token::valid(value));
        }
    }

    #[test]
    fn reproduces_tokens_after_depth_ticks() {
        let mut line: DelayLine<Sample> = DelayLine::new(3);
        let inputs: Vec<Token<Sample>> = (10..20u8).map(Token::valid).collect();
        let outputs: Vec<Token<Sample>> =
            inputs.iter().map(|token| line.push(*token)).collect();

        for tick in 0..3 {
            assert_eq!(outputs[tick], Token::reset());
        }
        for tick in 3..inputs.len() {
            assert_eq!(outputs[tick], inputs[tick - 3]);
        }
    }

    #[test]
    fn prefill_emits_invalid_defaults() {
        let mut line: DelayLine<Sample> = DelayLine::new(2);
        let first = line.push(Token::valid(99));
        assert_eq!(first.value, 0);
        assert!(!first.valid);
    }

    #[test]
    fn ram_line_matches_shift_register() {
        let depth = 5;
        let mut shift: DelayLine<Sample> = DelayLine::new(depth);
        let mut ram = RamDelayLine::new(depth);

        // lane 0 of the RAM line must track a scalar shift register exactly
        let mut seed: u8 = 17;
        for tick in 0..32u8 {
            seed = seed.wrapping_mul(31).wrapping_add(7);
            let valid = tick % 3 != 0;
            let scalar = shift.push(Token::new(seed, valid));
            let vector = ram.push(Token::new([seed, 0, 0, 0], valid));
            assert_eq!(vector.value[0], scalar.value);
            assert_eq!(vector.valid, scalar.valid);
        }
    }

    #[test]
    fn ram_line_depth_zero_is_identity() {
        let mut ram = RamDelayLine::new(0);
        let token = Token::valid([1, 2, 3, 4]);
        assert_eq!(ram.push(token), token);
    }

    #[test]
    fn state_bytes_track_contents() {
        let mut a: DelayLine<Sample> = DelayLine::new(2);
        let mut b: DelayLine<Sample> = DelayLine::new(2);
        a.push(Token::valid(1));
        b.push(Token::valid(2));

        let mut bytes_a = Vec::new();
        a.state_bytes(&mut bytes_a);
        let mut bytes_b = Vec::new();
        b.state_bytes(&mut bytes_b);
        assert_ne!(bytes_a, bytes_b);
    }
}
