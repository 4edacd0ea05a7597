#![forbid(unsafe_code)]

//! The per-sample sharpening transfer function.
//!
//! Stage order is fixed: gradient → registered unsigned abs → threshold
//! against k1/k2 → select between the re-aligned gradient and k3 → logical
//! shift → add-back onto the re-aligned center sample. All arithmetic is
//! 8-bit wrapping; the coefficient tables are addressed by a free-running
//! modulo counter and their values are opaque filter data.

use delay_line::DelayLine;
use stream_core::{ModCounter, Sample, StateBytes, StreamStage, Token};

/// Number of coefficient phases; the phase counter wraps at this modulus.
pub const PHASES: usize = 4;

/// Per-phase coefficient tables. `k1`/`k2` shape the threshold band,
/// `shift` scales the enhancement, `k3` is the out-of-band substitute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoeffTable {
    pub k1: [u8; PHASES],
    pub k2: [u8; PHASES],
    pub shift: [u8; PHASES],
    pub k3: [u8; PHASES],
}

impl CoeffTable {
    /// The shipped sharpening tables. Treat the values as data: they are
    /// pinned by tests, not derived from filter theory.
    pub fn sharpen_default() -> Self {
        Self {
            k1: [2, 2, 4, 4],
            k2: [8, 12, 8, 12],
            shift: [1, 1, 2, 2],
            k3: [4, 4, 8, 8],
        }
    }

    /// A table with every phase equal, used where phase must not matter.
    pub fn uniform(k1: u8, k2: u8, shift: u8, k3: u8) -> Self {
        Self {
            k1: [k1; PHASES],
            k2: [k2; PHASES],
            shift: [shift; PHASES],
            k3: [k3; PHASES],
        }
    }

    pub fn max_shift(&self) -> u8 {
        self.shift.iter().copied().max().unwrap_or(0)
    }
}

impl StateBytes for CoeffTable {
    fn state_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.k1);
        out.extend_from_slice(&self.k2);
        out.extend_from_slice(&self.shift);
        out.extend_from_slice(&self.k3);
    }
}

/// Two's-complement 8-bit gradient, wraparound on overflow.
pub fn gradient(b: Sample, a: Sample) -> Sample {
    b.wrapping_sub(a)
}

/// Magnitude under unsigned interpretation: `d` if `d <= -d`, else `-d`.
pub fn unsigned_abs(d: Sample) -> Sample {
    let neg = 0u8.wrapping_sub(d);
    if d <= neg {
        d
    } else {
        neg
    }
}

/// Alignment depths for the two kernel-internal re-convergences. The
/// shipped depths come from latency analysis; constructing a stage with
/// wrong depths silently misaligns pixels, which is exactly the defect the
/// executor's graph verification exists to rule out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentPlan {
    pub gradient_depth: usize,
    pub center_depth: usize,
}

/// One lane's threshold/select/shift/add-back pipeline, latency 1 (the
/// abs register).
#[derive(Debug, Clone)]
pub struct TransferStage {
    coeffs: CoeffTable,
    phase: ModCounter,
    m_reg: Token<Sample>,
    gradient_align: DelayLine<Sample>,
    center_align: DelayLine<Sample>,
}

impl TransferStage {
    pub fn new(coeffs: CoeffTable, plan: AlignmentPlan) -> Self {
        debug_assert!(coeffs.max_shift() < 8, "shift amounts must stay below 8");
        Self {
            coeffs,
            phase: ModCounter::new(PHASES as u32),
            m_reg: Token::reset(),
            gradient_align: DelayLine::new(plan.gradient_depth),
            center_align: DelayLine::new(plan.center_depth),
        }
    }

    pub fn coeffs(&self) -> &CoeffTable {
        &self.coeffs
    }

    /// Feed this tick's aggregate gradient `d` and center sample `b`.
    pub fn transfer(&mut self, d: Token<Sample>, b: Token<Sample>) -> Token<Sample> {
        let m = std::mem::replace(
            &mut self.m_reg,
            Token::new(unsigned_abs(d.value), d.valid),
        );
        let d_aligned = self.gradient_align.push(d);
        let b_aligned = self.center_align.push(b);

        let p = self.phase.index();
        let t = m.value.wrapping_sub(self.coeffs.k1[p]);
        let sel = t < self.coeffs.k2[p];
        let chosen = if sel { d_aligned.value } else { self.coeffs.k3[p] };
        let r = chosen >> u32::from(self.coeffs.shift[p]);
        let out = Token::new(
            b_aligned.value.wrapping_add(r),
            m.valid && d_aligned.valid && b_aligned.valid,
        );
        self.phase.advance();
        out
    }
}

impl StreamStage for TransferStage {
    type Input = (Token<Sample>, Token<Sample>);
    type Output = Token<Sample>;

    fn tick(&mut self, input: &Self::Input) -> Self::Output {
        self.transfer(input.0, input.1)
    }

    fn latency(&self) -> u32 {
        1
    }
}

impl StateBytes for TransferStage {
    fn state_bytes(&self, out: &mut Vec<u8>) {
        self.coeffs.state_bytes(out);
        self.phase.state_bytes(out);
        self.m_reg.state_bytes(out);
        self.gradient_align.state_bytes(out);
        self.center_align.state_bytes(out);
    }
}
