pub mod autodiff;
pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod expression;
pub mod gravity;
pub mod grid;
pub mod host;
pub mod numdiff;
/// The `potfield_core` crate is the numerical engine for potential-field state dynamics.
/// States are flat `[x1..xN, v1..vN]` vectors driven by the field `g = -∇V` of a scalar
/// potential, and planar potentials can be sampled on a grid to inspect their structure.
///
/// Key components:
/// - **Traits**: `Potential` and `Field` capabilities, plus `Scalar` for the expression VM.
/// - **Providers**: softened point-mass gravity, quadratic wells, sums of both, and
///   potentials compiled from text expressions with exact dual-number fields.
/// - **Engine**: symplectic stepping with optional damping, Coriolis rotation and an
///   external `Injection` force, tracking simulation time.
/// - **Grid**: potential, field, divergence and curl maps over a rectangular grid.
pub mod traits;
pub mod well;

pub use compose::{compose_field, compose_potential, composite_field, composite_potential};
pub use config::{Coriolis, EngineConfig, GridSpec, SofteningPolicy};
pub use engine::{PotentialFieldEngine, StepOutcome, Trajectory};
pub use error::{ErrorKind, FieldError, Result};
pub use expression::{compile_potential, ExpressionPotential};
pub use gravity::{GravityField, GravitySettings, Mass};
pub use grid::{AnalysisResult, FieldDiagnostics, GridAnalyzer, VectorFieldMap};
pub use host::{MemoryState, StateContainer};
pub use traits::{
    field_fn, injection_fn, potential_fn, try_field_fn, try_potential_fn, Field, Injection, Potential,
};
pub use well::{QuadraticWell, WeightForm};
