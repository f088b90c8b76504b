//! Host state containers.
//!
//! The engine reads a flat `[x1..xN, v1..vN]` vector from a container, writes
//! the stepped vector and energy into a copy, and records its diagnostics in
//! the container's keyed extension store when it has one.

use serde_json::Value;
use std::collections::BTreeMap;

pub trait StateContainer {
    /// Independent clone; mutating it never affects `self`.
    fn copy(&self) -> Self
    where
        Self: Sized;

    fn state_vector(&self) -> &[f64];

    fn set_state_vector(&mut self, state: Vec<f64>);

    fn energy(&self) -> f64;

    fn set_energy(&mut self, energy: f64);

    /// Simulation time of the held state. Containers that do not track time
    /// stay at `0.0`.
    fn time(&self) -> f64 {
        0.0
    }

    fn set_time(&mut self, _time: f64) {}

    /// Reads an extension entry. Containers without a store return `None`.
    fn extension(&self, _key: &str) -> Option<&Value> {
        None
    }

    fn extension_or(&self, key: &str, default: Value) -> Value {
        self.extension(key).cloned().unwrap_or(default)
    }

    /// Writes an extension entry. Containers without a store drop it.
    fn set_extension(&mut self, _key: &str, _value: Value) {}
}

/// In-memory container for callers without a host of their own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    state_vector: Vec<f64>,
    energy: f64,
    time: f64,
    extensions: BTreeMap<String, Value>,
}

impl MemoryState {
    pub fn new(state_vector: Vec<f64>) -> Self {
        Self {
            state_vector,
            energy: 0.0,
            time: 0.0,
            extensions: BTreeMap::new(),
        }
    }

    pub fn extensions(&self) -> &BTreeMap<String, Value> {
        &self.extensions
    }
}

impl StateContainer for MemoryState {
    fn copy(&self) -> Self {
        self.clone()
    }

    fn state_vector(&self) -> &[f64] {
        &self.state_vector
    }

    fn set_state_vector(&mut self, state: Vec<f64>) {
        self.state_vector = state;
    }

    fn energy(&self) -> f64 {
        self.energy
    }

    fn set_energy(&mut self, energy: f64) {
        self.energy = energy;
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    fn set_extension(&mut self, key: &str, value: Value) {
        self.extensions.insert(key.to_string(), value);
    }
}
