//! Point-mass gravity potentials.
//!
//! `V(x) = -G * sum_i m_i / r_i` and `g(x) = -G * sum_i m_i (x - c_i) / r_i^3`,
//! where `r_i` is the softened distance to center `c_i` (see
//! [`SofteningPolicy`]).

use crate::config::{EngineConfig, SofteningPolicy, DEFAULT_GRAVITY_CONSTANT, DEFAULT_SOFTENING};
use crate::error::{require_positive, FieldError, Result};
use crate::traits::{EvalResult, Field, Potential};
use serde::{Deserialize, Serialize};

/// A point source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mass {
    pub center: Vec<f64>,
    pub magnitude: f64,
}

impl Mass {
    pub fn new(center: impl Into<Vec<f64>>, magnitude: f64) -> Self {
        Self {
            center: center.into(),
            magnitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravitySettings {
    pub gravity_constant: f64,
    pub softening: f64,
    pub policy: SofteningPolicy,
}

impl Default for GravitySettings {
    fn default() -> Self {
        Self {
            gravity_constant: DEFAULT_GRAVITY_CONSTANT,
            softening: DEFAULT_SOFTENING,
            policy: SofteningPolicy::Clamp,
        }
    }
}

impl From<&EngineConfig> for GravitySettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            gravity_constant: config.gravity_constant,
            softening: config.softening,
            policy: config.softening_policy,
        }
    }
}

/// Potential and field of a fixed, ordered set of point masses.
///
/// Mass order is the summation order, so two fields built from the same
/// masses in the same order agree bit for bit.
#[derive(Debug, Clone)]
pub struct GravityField {
    masses: Vec<Mass>,
    dimension: Option<usize>,
    settings: GravitySettings,
}

impl GravityField {
    pub fn new(masses: Vec<Mass>, settings: GravitySettings) -> Result<Self> {
        require_positive("softening", settings.softening)?;
        if !settings.gravity_constant.is_finite() {
            return Err(FieldError::invalid("gravity_constant", "must be finite"));
        }
        let dimension = masses.first().map(|m| m.center.len());
        if let Some(dim) = dimension {
            if dim == 0 {
                return Err(FieldError::dimension("mass center", 1, 0));
            }
            for mass in &masses {
                if mass.center.len() != dim {
                    return Err(FieldError::dimension("mass center", dim, mass.center.len()));
                }
                if !mass.magnitude.is_finite() {
                    return Err(FieldError::invalid("mass", "magnitude must be finite"));
                }
            }
        }
        Ok(Self {
            masses,
            dimension,
            settings,
        })
    }

    pub fn from_config(masses: Vec<Mass>, config: &EngineConfig) -> Result<Self> {
        Self::new(masses, GravitySettings::from(config))
    }

    pub fn masses(&self) -> &[Mass] {
        &self.masses
    }

    pub fn settings(&self) -> GravitySettings {
        self.settings
    }

    /// Spatial dimension of the mass centers; `None` for an empty set.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Softened distance for a squared separation `r2`.
    fn softened_distance(&self, r2: f64) -> f64 {
        let softening = self.settings.softening;
        match self.settings.policy {
            SofteningPolicy::Clamp => r2.sqrt().max(softening),
            SofteningPolicy::Plummer => (r2 + softening * softening).sqrt(),
        }
    }

    fn check_position(&self, x: &[f64]) -> Result<()> {
        match self.dimension {
            Some(dim) if dim != x.len() => Err(FieldError::dimension("gravity position", dim, x.len())),
            _ => Ok(()),
        }
    }

    pub fn potential_at(&self, x: &[f64]) -> Result<f64> {
        self.check_position(x)?;
        let g = self.settings.gravity_constant;
        let mut total = 0.0;
        for mass in &self.masses {
            let r = self.softened_distance(squared_distance(x, &mass.center));
            total += -g * mass.magnitude / r;
        }
        Ok(total)
    }

    pub fn field_at(&self, x: &[f64], out: &mut [f64]) -> Result<()> {
        self.check_position(x)?;
        if out.len() != x.len() {
            return Err(FieldError::dimension("field output", x.len(), out.len()));
        }
        out.fill(0.0);
        let g = self.settings.gravity_constant;
        for mass in &self.masses {
            let r = self.softened_distance(squared_distance(x, &mass.center));
            let coef = -g * mass.magnitude / (r * r * r);
            for (component, (xi, ci)) in out.iter_mut().zip(x.iter().zip(&mass.center)) {
                *component += coef * (xi - ci);
            }
        }
        Ok(())
    }

    /// Potential and field in one pass over the masses.
    pub fn potential_and_field(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
        self.check_position(x)?;
        let g = self.settings.gravity_constant;
        let mut potential = 0.0;
        let mut field = vec![0.0; x.len()];
        for mass in &self.masses {
            let r = self.softened_distance(squared_distance(x, &mass.center));
            potential += -g * mass.magnitude / r;
            let coef = -g * mass.magnitude / (r * r * r);
            for (component, (xi, ci)) in field.iter_mut().zip(x.iter().zip(&mass.center)) {
                *component += coef * (xi - ci);
            }
        }
        Ok((potential, field))
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(ai, bi)| (ai - bi) * (ai - bi)).sum()
}

impl Potential for GravityField {
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        Ok(self.potential_at(x)?)
    }
}

impl Field for GravityField {
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        Ok(self.field_at(x, out)?)
    }
}
