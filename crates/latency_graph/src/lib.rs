#![forbid(unsafe_code)]

//! Construction-time latency analysis for the pipeline graph.
//!
//! A convergence point whose operands carry unequal cumulative register
//! latency silently misaligns pixels while still reporting valid data, so
//! balance is proven once, when the pipeline is built, never checked at
//! runtime. `balance` computes the minimal delay padding per operand;
//! `verify` fails fast on any residual mismatch.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LatencyError {
    #[error("node {0} declared twice")]
    Duplicate(String),
    #[error("node {0} references unknown input {1}")]
    UnknownInput(String, String),
    #[error("convergence at {node}: operand {input} arrives at {arrival} ticks, expected {expected}")]
    Unbalanced {
        node: String,
        input: String,
        arrival: u32,
        expected: u32,
    },
    #[error("unknown node {0}")]
    UnknownNode(String),
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    latency: u32,
    inputs: Vec<usize>,
    arrival: u32,
}

/// Declarative stage graph. Nodes are declared in dataflow order (every
/// input must already exist), mirroring the static circuit.
#[derive(Debug, Clone, Default)]
pub struct LatencyGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl LatencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// An external input, arrival 0.
    pub fn source(&mut self, name: &str) -> Result<(), LatencyError> {
        self.insert(name, 0, Vec::new())
    }

    /// A delay line of the given depth on a single input.
    pub fn delay(&mut self, name: &str, input: &str, depth: u32) -> Result<(), LatencyError> {
        let input = self.resolve(name, input)?;
        self.insert(name, depth, vec![input])
    }

    /// A combinational or registered operator over one or more operands.
    pub fn stage(
        &mut self,
        name: &str,
        inputs: &[&str],
        latency: u32,
    ) -> Result<(), LatencyError> {
        let inputs = inputs
            .iter()
            .map(|input| self.resolve(name, input))
            .collect::<Result<Vec<_>, _>>()?;
        self.insert(name, latency, inputs)
    }

    /// Cumulative registered latency from the sources to a node's output.
    pub fn arrival(&self, name: &str) -> Result<u32, LatencyError> {
        let idx = self
            .index
            .get(name)
            .ok_or_else(|| LatencyError::UnknownNode(name.to_string()))?;
        Ok(self.nodes[*idx].arrival)
    }

    /// For every stage operand, the delay padding that would equalize its
    /// arrival with the stage's slowest operand. An empty map means the
    /// graph is already balanced.
    pub fn balance(&self) -> BTreeMap<(String, String), u32> {
        let mut padding = BTreeMap::new();
        for node in &self.nodes {
            let Some(slowest) = node
                .inputs
                .iter()
                .map(|input| self.nodes[*input].arrival)
                .max()
            else {
                continue;
            };
            for input in &node.inputs {
                let pad = slowest - self.nodes[*input].arrival;
                if pad > 0 {
                    padding.insert(
                        (node.name.clone(), self.nodes[*input].name.clone()),
                        pad,
                    );
                }
            }
        }
        padding
    }

    /// Prove every convergence point balanced; the first mismatch is fatal.
    pub fn verify(&self) -> Result<(), LatencyError> {
        for node in &self.nodes {
            let Some(expected) = node
                .inputs
                .iter()
                .map(|input| self.nodes[*input].arrival)
                .max()
            else {
                continue;
            };
            for input in &node.inputs {
                let arrival = self.nodes[*input].arrival;
                if arrival != expected {
                    return Err(LatencyError::Unbalanced {
                        node: node.name.clone(),
                        input: self.nodes[*input].name.clone(),
                        arrival,
                        expected,
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, node: &str, input: &str) -> Result<usize, LatencyError> {
        self.index
            .get(input)
            .copied()
            .ok_or_else(|| LatencyError::UnknownInput(node.to_string(), input.to_string()))
    }

    fn insert(
        &mut self,
        name: &str,
        latency: u32,
        inputs: Vec<usize>,
    ) -> Result<(), LatencyError> {
        if self.index.contains_key(name) {
            return Err(LatencyError::Duplicate(name.to_string()));
        }
        let arrival = inputs
            .iter()
            .map(|input| self.nodes[*input].arrival)
            .max()
            .unwrap_or(0)
            + latency;
        self.index.insert(name.to_string(), self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            latency,
            inputs,
            arrival,
        });
        Ok(())
    }

    /// Total registered depth along the path to the named sink.
    pub fn pipeline_depth(&self, sink: &str) -> Result<u32, LatencyError> {
        self.arrival(sink)
    }

    pub fn node_latency(&self, name: &str) -> Result<u32, LatencyError> {
        let idx = self
            .index
            .get(name)
            .ok_or_else(|| LatencyError::UnknownNode(name.to_string()))?;
        Ok(self.nodes[*idx].latency)
    }
}
