//! Potential sources described from JavaScript.

use anyhow::{bail, Context, Result};
use potfield_core::compose::{CompositeField, CompositePotential};
use potfield_core::config::EngineConfig;
use potfield_core::expression::compile_potential;
use potfield_core::gravity::{GravityField, Mass};
use potfield_core::traits::{Field, Potential};
use potfield_core::well::{QuadraticWell, WeightForm};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Expression {
        expression: String,
        var_names: Vec<String>,
        #[serde(default)]
        param_names: Vec<String>,
        #[serde(default)]
        params: Vec<f64>,
    },
    Gravity {
        masses: Vec<Mass>,
    },
    Well(WeightForm),
}

trait Source: Potential + Field {}

impl<T: Potential + Field> Source for T {}

/// Summed potential and field of every configured source.
pub(crate) struct SourceSet {
    pub(crate) potential: CompositePotential<'static>,
    pub(crate) field: CompositeField<'static>,
    pub(crate) dimension: Option<usize>,
}

pub(crate) fn build_sources(specs: &[SourceSpec], config: &EngineConfig) -> Result<SourceSet> {
    let mut potential = CompositePotential::new();
    let mut field = CompositeField::new();
    let mut dimension: Option<usize> = None;

    for (index, spec) in specs.iter().enumerate() {
        let (source, source_dim): (Arc<dyn Source>, Option<usize>) = match spec {
            SourceSpec::Expression {
                expression,
                var_names,
                param_names,
                params,
            } => {
                let compiled = compile_potential(expression, var_names, param_names, params)
                    .with_context(|| format!("Source {index}: failed to compile '{expression}'"))?;
                let dim = compiled.dimension();
                let source: Arc<dyn Source> = Arc::new(compiled);
                (source, Some(dim))
            }
            SourceSpec::Gravity { masses } => {
                let gravity = GravityField::from_config(masses.clone(), config)
                    .with_context(|| format!("Source {index}: invalid gravity source"))?;
                let dim = gravity.dimension();
                let source: Arc<dyn Source> = Arc::new(gravity);
                (source, dim)
            }
            SourceSpec::Well(form) => {
                let well = QuadraticWell::from_form(form)
                    .with_context(|| format!("Source {index}: invalid well"))?;
                let dim = well.dimension();
                let source: Arc<dyn Source> = Arc::new(well);
                (source, Some(dim))
            }
        };

        match (dimension, source_dim) {
            (Some(expected), Some(actual)) if expected != actual => bail!(
                "Source {index} has dimension {actual}, but earlier sources have dimension {expected}."
            ),
            (None, Some(actual)) => dimension = Some(actual),
            _ => {}
        }
        potential.push(Box::new(Arc::clone(&source)));
        field.push(Box::new(source));
    }

    Ok(SourceSet {
        potential,
        field,
        dimension,
    })
}
