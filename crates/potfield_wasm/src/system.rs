//! WASM wrapper around the state integrator.

use crate::sources::{build_sources, SourceSet, SourceSpec};
use anyhow::{anyhow, bail, Result};
use js_sys::Float64Array;
use potfield_core::config::EngineConfig;
use potfield_core::engine::{PotentialFieldEngine, EXTENSION_KEY};
use potfield_core::host::{MemoryState, StateContainer};
use potfield_core::traits::{Field, Potential};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

/// Reads an optional engine config; `undefined` and `null` select the defaults.
pub(crate) fn config_from_js(config: JsValue) -> Result<EngineConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(EngineConfig::default());
    }
    from_value(config).map_err(|e| JsValue::from_str(&format!("Invalid engine config: {}", e)))
}

pub(crate) fn sources_from_js(sources: JsValue) -> Result<Vec<SourceSpec>, JsValue> {
    from_value(sources).map_err(|e| JsValue::from_str(&format!("Invalid sources: {}", e)))
}

#[wasm_bindgen]
pub struct WasmEngine {
    engine: PotentialFieldEngine,
    sources: SourceSet,
    state: MemoryState,
    numeric_field: bool,
}

impl WasmEngine {
    pub(crate) fn from_parts(config: EngineConfig, specs: &[SourceSpec]) -> Result<Self> {
        let sources = build_sources(specs, &config)?;
        let engine = PotentialFieldEngine::new(config)?;
        let dim = sources.dimension.unwrap_or(1);
        Ok(Self {
            engine,
            sources,
            state: MemoryState::new(vec![0.0; 2 * dim]),
            numeric_field: false,
        })
    }

    fn field(&self) -> Option<&dyn Field> {
        if self.numeric_field {
            None
        } else {
            Some(&self.sources.field)
        }
    }

    pub(crate) fn replace_state(&mut self, state: &[f64]) -> Result<()> {
        if let Some(dim) = self.sources.dimension {
            if state.len() != 2 * dim {
                bail!(
                    "State must hold {} positions and {} velocities (got {} values).",
                    dim,
                    dim,
                    state.len()
                );
            }
        }
        self.state.set_state_vector(state.to_vec());
        Ok(())
    }

    pub(crate) fn advance(&mut self) -> Result<f64> {
        let updated = self
            .engine
            .update(&self.state, &self.sources.potential, self.field())?;
        self.state = updated;
        Ok(self.state.energy())
    }

    /// Runs `steps` steps from the current state, returning the energy after
    /// each one. The engine keeps the final state.
    pub(crate) fn advance_many(&mut self, steps: usize) -> Result<Vec<f64>> {
        let trajectory = self.engine.trajectory(
            self.state.state_vector(),
            self.state.time(),
            steps,
            &self.sources.potential,
            self.field(),
        )?;
        let last = trajectory
            .states
            .last()
            .ok_or_else(|| anyhow!("Trajectory produced no states."))?;
        self.state.set_state_vector(last.clone());
        if let Some(&time) = trajectory.times.last() {
            self.state.set_time(time);
        }
        let energies = trajectory.energies[1..].to_vec();
        if let Some(&energy) = energies.last() {
            self.state.set_energy(energy);
        }
        Ok(energies)
    }

    pub(crate) fn evaluate_field(&self, x: &[f64]) -> Result<Vec<f64>> {
        let mut out = vec![0.0; x.len()];
        potfield_core::numdiff::evaluate_field(
            &self.sources.potential,
            self.field(),
            x,
            self.engine.config().epsilon,
            &mut out,
        )?;
        Ok(out)
    }
}

#[wasm_bindgen]
impl WasmEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, sources: JsValue) -> Result<WasmEngine, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let config = config_from_js(config)?;
        let specs = sources_from_js(sources)?;
        WasmEngine::from_parts(config, &specs)
            .map_err(|e| JsValue::from_str(&format!("Failed to build engine: {:#}", e)))
    }

    /// Switches between the analytic source field and central differences
    /// of the summed potential.
    pub fn set_numeric_field(&mut self, numeric: bool) {
        self.numeric_field = numeric;
    }

    pub fn set_state(&mut self, state: &[f64]) -> Result<(), JsValue> {
        self.replace_state(state)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn get_state(&self) -> Vec<f64> {
        self.state.state_vector().to_vec()
    }

    pub fn get_energy(&self) -> f64 {
        self.state.energy()
    }

    pub fn get_time(&self) -> f64 {
        self.state.time()
    }

    pub fn set_time(&mut self, time: f64) -> Result<(), JsValue> {
        if !time.is_finite() {
            return Err(JsValue::from_str("Time must be finite."));
        }
        self.state.set_time(time);
        Ok(())
    }

    /// Advances one step and returns the new total energy.
    pub fn step(&mut self) -> Result<f64, JsValue> {
        self.advance()
            .map_err(|e| JsValue::from_str(&format!("Step failed: {}", e)))
    }

    pub fn run(&mut self, steps: u32) -> Result<Float64Array, JsValue> {
        let energies = self
            .advance_many(steps as usize)
            .map_err(|e| JsValue::from_str(&format!("Trajectory failed: {}", e)))?;
        Ok(Float64Array::from(energies.as_slice()))
    }

    /// Diagnostics recorded by the last single step, or `undefined`.
    pub fn last_step_record(&self) -> Result<JsValue, JsValue> {
        match self.state.extension(EXTENSION_KEY) {
            Some(record) => record
                .serialize(&Serializer::json_compatible())
                .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e))),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    pub fn potential_at(&self, x: Vec<f64>) -> Result<f64, JsValue> {
        self.sources
            .potential
            .potential(&x)
            .map_err(|e| JsValue::from_str(&format!("Potential evaluation failed: {}", e)))
    }

    pub fn field_at(&self, x: Vec<f64>) -> Result<Float64Array, JsValue> {
        let field = self
            .evaluate_field(&x)
            .map_err(|e| JsValue::from_str(&format!("Field evaluation failed: {}", e)))?;
        Ok(Float64Array::from(field.as_slice()))
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use serde_wasm_bindgen::to_value;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn constructor_reads_js_objects() {
        let sources = to_value(&vec![SourceSpec::Expression {
            expression: "x^2 + y^2".to_string(),
            var_names: vec!["x".to_string(), "y".to_string()],
            param_names: Vec::new(),
            params: Vec::new(),
        }])
        .expect("sources");
        let mut engine = WasmEngine::new(JsValue::UNDEFINED, sources).expect("engine");
        engine.set_state(&[1.0, 0.0, 0.0, 0.0]).expect("state");
        engine.step().expect("step");
        assert!(engine.last_step_record().expect("record").is_object());
    }

    #[wasm_bindgen_test]
    fn constructor_rejects_bad_sources() {
        let result = WasmEngine::new(JsValue::UNDEFINED, JsValue::from_str("not a list"));
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Invalid sources"));
    }
}
