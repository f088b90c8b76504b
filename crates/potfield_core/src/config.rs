//! Engine configuration.
//!
//! Every tunable constant lives in [`EngineConfig`], which is handed to each
//! component at construction and never mutated afterwards.

use crate::error::{require_positive, FieldError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DT: f64 = 0.01;
pub const DEFAULT_EPSILON: f64 = 1e-6;
pub const DEFAULT_GRAVITY_CONSTANT: f64 = 1.0;
pub const DEFAULT_SOFTENING: f64 = 1e-6;
pub const DEFAULT_GRID_SIZE: (usize, usize) = (100, 100);
pub const DEFAULT_X_RANGE: (f64, f64) = (-5.0, 5.0);
pub const DEFAULT_Y_RANGE: (f64, f64) = (-5.0, 5.0);

/// How point-mass distances are bounded away from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SofteningPolicy {
    /// `r = max(|x - c|, softening)`. Continuous potential, gradient kink at
    /// the clamp radius.
    #[default]
    Clamp,
    /// `r = sqrt(|x - c|^2 + softening^2)`. Smooth everywhere.
    Plummer,
}

/// Exact velocity rotation applied in the plane spanned by two state axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coriolis {
    pub omega: f64,
    pub plane: (usize, usize),
}

impl Coriolis {
    pub fn new(omega: f64) -> Self {
        Self {
            omega,
            plane: (0, 1),
        }
    }

    pub(crate) fn validate(&self, dimension: usize) -> Result<()> {
        let (first, second) = self.plane;
        if first == second || first >= dimension || second >= dimension {
            return Err(FieldError::RotationPlane {
                first,
                second,
                dimension,
            });
        }
        if !self.omega.is_finite() {
            return Err(FieldError::invalid("omega", "must be finite"));
        }
        Ok(())
    }
}

/// Rectangular sampling region of a 2-D state space.
///
/// Axis 0 of every map built from this spec indexes x (`grid_size.0`
/// samples), axis 1 indexes y (`grid_size.1` samples). Every `GridSpec`
/// holds at least two samples per axis over a non-empty range, including
/// deserialized ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGridSpec")]
pub struct GridSpec {
    x_range: (f64, f64),
    y_range: (f64, f64),
    grid_size: (usize, usize),
}

#[derive(Deserialize)]
struct RawGridSpec {
    x_range: (f64, f64),
    y_range: (f64, f64),
    grid_size: (usize, usize),
}

impl TryFrom<RawGridSpec> for GridSpec {
    type Error = FieldError;

    fn try_from(raw: RawGridSpec) -> Result<Self> {
        GridSpec::new(raw.x_range, raw.y_range, raw.grid_size)
    }
}

impl GridSpec {
    pub fn new(x_range: (f64, f64), y_range: (f64, f64), grid_size: (usize, usize)) -> Result<Self> {
        let spec = Self {
            x_range,
            y_range,
            grid_size,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn x_range(&self) -> (f64, f64) {
        self.x_range
    }

    pub fn y_range(&self) -> (f64, f64) {
        self.y_range
    }

    pub fn grid_size(&self) -> (usize, usize) {
        self.grid_size
    }

    /// Grid spacing `(dx, dy)`; `dx` pairs with axis 0, `dy` with axis 1.
    pub fn spacing(&self) -> (f64, f64) {
        let (nx, ny) = self.grid_size;
        (
            (self.x_range.1 - self.x_range.0) / (nx - 1) as f64,
            (self.y_range.1 - self.y_range.0) / (ny - 1) as f64,
        )
    }

    pub fn xs(&self) -> Vec<f64> {
        linspace(self.x_range, self.grid_size.0)
    }

    pub fn ys(&self) -> Vec<f64> {
        linspace(self.y_range, self.grid_size.1)
    }

    pub fn validate(&self) -> Result<()> {
        let (nx, ny) = self.grid_size;
        if nx < 2 || ny < 2 {
            return Err(FieldError::invalid(
                "grid_size",
                format!("each axis needs at least 2 samples (got {nx}x{ny})"),
            ));
        }
        for (name, (min, max)) in [("x_range", self.x_range), ("y_range", self.y_range)] {
            if !min.is_finite() || !max.is_finite() || min >= max {
                return Err(FieldError::invalid(
                    name,
                    format!("range must be finite with min < max (got [{min}, {max}])"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            x_range: DEFAULT_X_RANGE,
            y_range: DEFAULT_Y_RANGE,
            grid_size: DEFAULT_GRID_SIZE,
        }
    }
}

fn linspace((min, max): (f64, f64), samples: usize) -> Vec<f64> {
    let step = (max - min) / (samples - 1) as f64;
    (0..samples)
        .map(|i| {
            if i + 1 == samples {
                max
            } else {
                min + step * i as f64
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dt: f64,
    /// Finite-difference step used whenever no analytic field is supplied.
    pub epsilon: f64,
    pub gravity_constant: f64,
    pub softening: f64,
    pub softening_policy: SofteningPolicy,
    /// Velocity damping rate; the velocity decays as `exp(-damping * dt)` per step.
    pub damping: f64,
    pub coriolis: Option<Coriolis>,
    pub grid: GridSpec,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_DT,
            epsilon: DEFAULT_EPSILON,
            gravity_constant: DEFAULT_GRAVITY_CONSTANT,
            softening: DEFAULT_SOFTENING,
            softening_policy: SofteningPolicy::Clamp,
            damping: 0.0,
            coriolis: None,
            grid: GridSpec::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("dt", self.dt)?;
        require_positive("epsilon", self.epsilon)?;
        require_positive("softening", self.softening)?;
        if !self.gravity_constant.is_finite() {
            return Err(FieldError::invalid("gravity_constant", "must be finite"));
        }
        if !self.damping.is_finite() || self.damping < 0.0 {
            return Err(FieldError::invalid(
                "damping",
                format!("must be finite and non-negative (got {})", self.damping),
            ));
        }
        if let Some(coriolis) = &self.coriolis {
            if !coriolis.omega.is_finite() {
                return Err(FieldError::invalid("omega", "must be finite"));
            }
        }
        self.grid.validate()
    }
}
