//! Grid analysis exposed to JavaScript.

use crate::sources::{build_sources, SourceSet, SourceSpec};
use crate::system::{config_from_js, sources_from_js};
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use potfield_core::config::EngineConfig;
use potfield_core::grid::{AnalysisResult, FieldDiagnostics, GridAnalyzer};
use potfield_core::traits::Field;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

/// Flattened analysis maps. Every map is row-major over `(x, y)`: entry
/// `i * ny + j` belongs to `(xs[i], ys[j])`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisPayload {
    pub nx: usize,
    pub ny: usize,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub potential: Vec<f64>,
    pub field_x: Vec<f64>,
    pub field_y: Vec<f64>,
    pub divergence: Vec<f64>,
    pub curl: Vec<f64>,
    pub diagnostics: FieldDiagnostics,
}

fn row_major(map: &DMatrix<f64>) -> Vec<f64> {
    map.transpose().as_slice().to_vec()
}

impl From<&AnalysisResult> for AnalysisPayload {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            nx: result.xs().len(),
            ny: result.ys().len(),
            xs: result.xs().to_vec(),
            ys: result.ys().to_vec(),
            potential: row_major(result.potential()),
            field_x: row_major(result.field_x()),
            field_y: row_major(result.field_y()),
            divergence: row_major(result.divergence()),
            curl: row_major(result.curl()),
            diagnostics: result.diagnostics(),
        }
    }
}

#[wasm_bindgen]
pub struct WasmGridAnalyzer {
    analyzer: GridAnalyzer,
    sources: SourceSet,
    numeric_field: bool,
}

impl WasmGridAnalyzer {
    pub(crate) fn from_parts(config: EngineConfig, specs: &[SourceSpec]) -> Result<Self> {
        let sources = build_sources(specs, &config)?;
        if let Some(dim) = sources.dimension {
            if dim != 2 {
                bail!("Grid analysis needs two-dimensional sources (got dimension {}).", dim);
            }
        }
        let analyzer = GridAnalyzer::from_config(&config)?;
        Ok(Self {
            analyzer,
            sources,
            numeric_field: false,
        })
    }

    pub(crate) fn run(&self) -> Result<AnalysisResult> {
        let field = if self.numeric_field {
            None
        } else {
            Some(&self.sources.field as &dyn Field)
        };
        Ok(self.analyzer.analyze(&self.sources.potential, field)?)
    }
}

#[wasm_bindgen]
impl WasmGridAnalyzer {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, sources: JsValue) -> Result<WasmGridAnalyzer, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let config = config_from_js(config)?;
        let specs = sources_from_js(sources)?;
        WasmGridAnalyzer::from_parts(config, &specs)
            .map_err(|e| JsValue::from_str(&format!("Failed to build grid analyzer: {:#}", e)))
    }

    pub fn set_numeric_field(&mut self, numeric: bool) {
        self.numeric_field = numeric;
    }

    pub fn analyze(&self) -> Result<JsValue, JsValue> {
        let result = self
            .run()
            .map_err(|e| JsValue::from_str(&format!("Grid analysis failed: {}", e)))?;
        to_value(&AnalysisPayload::from(&result))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn is_conservative(&self, tolerance: f64) -> Result<bool, JsValue> {
        let result = self
            .run()
            .map_err(|e| JsValue::from_str(&format!("Grid analysis failed: {}", e)))?;
        Ok(result.is_conservative(tolerance))
    }
}
