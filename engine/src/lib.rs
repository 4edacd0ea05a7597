#![forbid(unsafe_code)]

//! The pipeline executor: wires window construction, gradient taps, the
//! reduce tree and the transfer stages into the complete four-lane
//! sharpening circuit.
//!
//! The two kernel-internal re-convergences (gradient vs. its threshold
//! decision, center sample vs. the enhancement term) are balanced with
//! delay depths taken from latency analysis, and the full stage graph is
//! verified at construction. An unbalanced graph never runs.

use latency_graph::{LatencyError, LatencyGraph};
use reduce_tree::{ReduceTree, WrappingAdd};
use sharpen_kernel::{gradient, AlignmentPlan, CoeffTable, TransferStage};
use stream_core::{
    and_valid, digest_meta, LaneToken, Sample, StateBytes, StreamCircuit, Token, LANES,
};
use thiserror::Error;
use tuning::FilterConfig;
use window_builder::{MapLanes, WindowBuilder};

const SNAPSHOT_DOMAIN: &str = "SHARP:ENGINE:SNAP";
const CONFIG_DOMAIN: &str = "SHARP:ENGINE:CONFIG";

/// Gradient taps feed the reduce tree in this fixed order. The reduce is
/// right-associated over it; changing the order changes the filter.
pub const TAP_COUNT: usize = 4;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("latency analysis failed: {0}")]
    Latency(#[from] LatencyError),
    #[error("configuration rejected: {0}")]
    Config(#[from] tuning::ConfigError),
}

/// The declarative stage graph of the kernel-side pipeline, from the
/// window output to the sharpened sample. `plan` supplies the depths of
/// the two re-alignment delay lines.
pub fn stage_graph(plan: AlignmentPlan) -> Result<LatencyGraph, LatencyError> {
    let mut graph = LatencyGraph::new();
    graph.source("input")?;
    graph.stage("window", &["input"], 0)?;
    graph.stage("gradient", &["window"], 0)?;
    graph.stage("reduce", &["gradient"], 0)?;
    graph.stage("abs", &["reduce"], 1)?;
    graph.stage("threshold", &["abs"], 0)?;
    graph.delay("gradient_aligned", "reduce", plan.gradient_depth as u32)?;
    graph.stage("select", &["threshold", "gradient_aligned"], 0)?;
    graph.stage("shift", &["select"], 0)?;
    graph.delay("center_aligned", "window", plan.center_depth as u32)?;
    graph.stage("add_back", &["shift", "center_aligned"], 0)?;
    Ok(graph)
}

/// Derive the minimal re-alignment depths from an unpadded graph.
pub fn derive_alignment_plan() -> Result<AlignmentPlan, LatencyError> {
    let unpadded = stage_graph(AlignmentPlan {
        gradient_depth: 0,
        center_depth: 0,
    })?;
    let padding = unpadded.balance();
    let pad = |node: &str, input: &str| {
        padding
            .get(&(node.to_string(), input.to_string()))
            .copied()
            .unwrap_or(0) as usize
    };
    Ok(AlignmentPlan {
        gradient_depth: pad("select", "gradient_aligned"),
        center_depth: pad("add_back", "center_aligned"),
    })
}

#[derive(Debug, Clone)]
pub struct SharpenPipeline {
    row_ticks: usize,
    coeffs: CoeffTable,
    plan: AlignmentPlan,
    kernel_latency: u64,
    window: WindowBuilder,
    reducers: Vec<ReduceTree<WrappingAdd>>,
    transfers: MapLanes<TransferStage>,
    tick_count: u64,
}

impl SharpenPipeline {
    /// Build the verified pipeline: alignment depths come from latency
    /// analysis and the resulting graph must prove balanced.
    pub fn new(row_ticks: usize, coeffs: CoeffTable) -> Result<Self, LatencyError> {
        let plan = derive_alignment_plan()?;
        let graph = stage_graph(plan)?;
        graph.verify()?;
        let kernel_latency = graph.pipeline_depth("add_back")? as u64;
        Ok(Self::assemble(row_ticks, coeffs, plan, kernel_latency))
    }

    pub fn from_filter_config(config: &FilterConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let coeffs = config.coeffs.to_table()?;
        Ok(Self::new(config.raster.row_ticks(), coeffs)?)
    }

    /// Diagnostic constructor taking the alignment plan as given, without
    /// graph verification. A wrong plan silently misaligns pixels — this
    /// exists so tests can demonstrate exactly that failure mode.
    pub fn with_alignment(row_ticks: usize, coeffs: CoeffTable, plan: AlignmentPlan) -> Self {
        let kernel_latency = stage_graph(plan)
            .and_then(|graph| graph.pipeline_depth("add_back"))
            .unwrap_or(1) as u64;
        Self::assemble(row_ticks, coeffs, plan, kernel_latency)
    }

    fn assemble(
        row_ticks: usize,
        coeffs: CoeffTable,
        plan: AlignmentPlan,
        kernel_latency: u64,
    ) -> Self {
        let reducers = (0..LANES)
            .map(|_| ReduceTree::new(WrappingAdd, TAP_COUNT))
            .collect();
        let transfers = MapLanes::new(
            (0..LANES)
                .map(|_| TransferStage::new(coeffs.clone(), plan))
                .collect(),
        );
        Self {
            row_ticks,
            coeffs,
            plan,
            kernel_latency,
            window: WindowBuilder::new(row_ticks),
            reducers,
            transfers,
            tick_count: 0,
        }
    }

    pub fn row_ticks(&self) -> usize {
        self.row_ticks
    }

    pub fn alignment_plan(&self) -> AlignmentPlan {
        self.plan
    }

    /// Ticks of valid input before the output valid first goes high:
    /// window fill plus the kernel's registered depth.
    pub fn fill_latency(&self) -> u64 {
        self.window.fill_ticks() + self.kernel_latency
    }
}

impl StreamCircuit<LaneToken, LaneToken> for SharpenPipeline {
    fn step(&mut self, input: &LaneToken, _tick: u64) -> LaneToken {
        let windows = self.window.tick(*input);

        let mut kernel_inputs = Vec::with_capacity(LANES);
        for (window, reducer) in windows.iter().zip(self.reducers.iter_mut()) {
            let center = window.center();
            let taps = [
                Token::new(gradient(center, window.north()), window.valid),
                Token::new(gradient(center, window.west()), window.valid),
                Token::new(gradient(center, window.east()), window.valid),
                Token::new(gradient(center, window.south()), window.valid),
            ];
            let aggregate = reducer.tick(&taps);
            kernel_inputs.push((aggregate, Token::new(center, window.valid)));
        }

        let outputs = self.transfers.tick(&kernel_inputs);
        let mut lanes: [Sample; LANES] = [0; LANES];
        let mut valids = [false; LANES];
        for (lane, output) in outputs.iter().enumerate() {
            lanes[lane] = output.value;
            valids[lane] = output.valid;
        }
        self.tick_count += 1;
        Token::new(lanes, and_valid(&valids))
    }

    fn snapshot_digest(&self) -> [u8; 32] {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.tick_count.to_le_bytes());
        self.window.state_bytes(&mut bytes);
        for reducer in &self.reducers {
            reducer.state_bytes(&mut bytes);
        }
        for transfer in self.transfers.children() {
            transfer.state_bytes(&mut bytes);
        }
        digest_meta(SNAPSHOT_DOMAIN, &bytes)
    }

    fn config_digest(&self) -> [u8; 32] {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.row_ticks as u32).to_le_bytes());
        bytes.extend_from_slice(&(LANES as u32).to_le_bytes());
        self.coeffs.state_bytes(&mut bytes);
        bytes.extend_from_slice(&(self.plan.gradient_depth as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.plan.center_depth as u32).to_le_bytes());
        digest_meta(CONFIG_DOMAIN, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_yields_single_tick_alignment() {
        let plan = derive_alignment_plan().unwrap();
        assert_eq!(plan.gradient_depth, 1);
        assert_eq!(plan.center_depth, 1);
    }

    #[test]
    fn shipped_graph_is_balanced() {
        let plan = derive_alignment_plan().unwrap();
        let graph = stage_graph(plan).unwrap();
        assert_eq!(graph.verify(), Ok(()));
        assert_eq!(graph.pipeline_depth("add_back"), Ok(1));
    }

    #[test]
    fn fill_latency_tracks_the_raster_width() {
        let pipeline = SharpenPipeline::new(16, CoeffTable::sharpen_default()).unwrap();
        assert_eq!(pipeline.fill_latency(), 2 * 16 + 2 + 1);
    }

    #[test]
    fn config_digest_tracks_the_tables() {
        let a = SharpenPipeline::new(8, CoeffTable::sharpen_default()).unwrap();
        let b = SharpenPipeline::new(8, CoeffTable::uniform(1, 1, 1, 1)).unwrap();
        assert_ne!(a.config_digest(), b.config_digest());
        assert_eq!(
            a.config_digest(),
            SharpenPipeline::new(8, CoeffTable::sharpen_default())
                .unwrap()
                .config_digest()
        );
    }
}
