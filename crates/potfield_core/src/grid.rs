//! Grid analysis of planar potentials.
//!
//! A [`GridAnalyzer`] samples a 2-D potential (and its field) on the regular
//! grid described by a [`GridSpec`] and derives divergence and curl maps from
//! the sampled field.
//!
//! Every map is a `DMatrix` whose rows run along x (`xs[i]`) and whose
//! columns run along y (`ys[j]`). Derivatives along rows use `dx`, along
//! columns `dy`:
//!
//! ```text
//! div g  = d(g_x)/dx + d(g_y)/dy
//! curl g = d(g_y)/dx - d(g_x)/dy
//! ```
//!
//! Divergence measures sources and sinks of the field (a potential well is a
//! sink with negative divergence), not stability. For a field that really is
//! `-∇V` the curl is zero up to discretization noise; a curl well above that
//! floor signals a rotational, non-conservative component.

use crate::config::{EngineConfig, GridSpec};
use crate::error::{require_positive, FieldError, Result};
use crate::numdiff::{axis_derivative, evaluate_field, GridAxis};
use crate::traits::{Field, Potential};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sampled field components, each shaped `(N_x, N_y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFieldMap {
    pub gx: DMatrix<f64>,
    pub gy: DMatrix<f64>,
}

impl VectorFieldMap {
    pub fn shape(&self) -> (usize, usize) {
        self.gx.shape()
    }

    /// `|g|` at every sample.
    pub fn magnitude(&self) -> DMatrix<f64> {
        self.gx.zip_map(&self.gy, |x, y| x.hypot(y))
    }
}

/// Summary statistics of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldDiagnostics {
    pub max_abs_curl: f64,
    pub mean_abs_curl: f64,
    pub min_divergence: f64,
    pub max_divergence: f64,
    pub mean_divergence: f64,
    pub max_field_magnitude: f64,
}

/// Maps produced by one [`GridAnalyzer::analyze`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    xs: Vec<f64>,
    ys: Vec<f64>,
    potential: DMatrix<f64>,
    field: VectorFieldMap,
    divergence: DMatrix<f64>,
    curl: DMatrix<f64>,
}

impl AnalysisResult {
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn potential(&self) -> &DMatrix<f64> {
        &self.potential
    }

    pub fn field_x(&self) -> &DMatrix<f64> {
        &self.field.gx
    }

    pub fn field_y(&self) -> &DMatrix<f64> {
        &self.field.gy
    }

    pub fn field_map(&self) -> &VectorFieldMap {
        &self.field
    }

    pub fn divergence(&self) -> &DMatrix<f64> {
        &self.divergence
    }

    pub fn curl(&self) -> &DMatrix<f64> {
        &self.curl
    }

    /// Position `(xs[i], ys[j])` of a map entry.
    pub fn sample_point(&self, i: usize, j: usize) -> Option<(f64, f64)> {
        Some((*self.xs.get(i)?, *self.ys.get(j)?))
    }

    pub fn diagnostics(&self) -> FieldDiagnostics {
        let count = self.curl.len() as f64;
        let abs_curl = self.curl.abs();
        FieldDiagnostics {
            max_abs_curl: abs_curl.max(),
            mean_abs_curl: abs_curl.sum() / count,
            min_divergence: self.divergence.min(),
            max_divergence: self.divergence.max(),
            mean_divergence: self.divergence.sum() / count,
            max_field_magnitude: self.field.magnitude().max(),
        }
    }

    /// True when the largest curl magnitude stays within `tolerance`.
    pub fn is_conservative(&self, tolerance: f64) -> bool {
        self.curl.abs().max() <= tolerance
    }
}

#[derive(Debug, Clone)]
pub struct GridAnalyzer {
    spec: GridSpec,
    epsilon: f64,
}

impl GridAnalyzer {
    /// `epsilon` is only checked by the map builders that fall back to
    /// central differences, so analytic-field callers may pass any value.
    pub fn new(spec: GridSpec, epsilon: f64) -> Self {
        Self { spec, epsilon }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.grid.clone(), config.epsilon))
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn xs(&self) -> Vec<f64> {
        self.spec.xs()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.spec.ys()
    }

    /// `V(xs[i], ys[j])` at every sample.
    pub fn compute_potential_map(&self, potential: &dyn Potential) -> Result<DMatrix<f64>> {
        let xs = self.spec.xs();
        let ys = self.spec.ys();
        let rows = xs
            .par_iter()
            .map(|&x| {
                ys.iter()
                    .map(|&y| {
                        potential
                            .potential(&[x, y])
                            .map_err(FieldError::evaluation("potential"))
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DMatrix::from_row_iterator(
            xs.len(),
            ys.len(),
            rows.into_iter().flatten(),
        ))
    }

    /// Field at every sample, from `field` when supplied and from central
    /// differences of `potential` otherwise.
    pub fn compute_field_map(
        &self,
        potential: &dyn Potential,
        field: Option<&dyn Field>,
    ) -> Result<VectorFieldMap> {
        self.compute_field_map_with(potential, field, self.epsilon)
    }

    pub fn compute_field_map_with(
        &self,
        potential: &dyn Potential,
        field: Option<&dyn Field>,
        epsilon: f64,
    ) -> Result<VectorFieldMap> {
        if field.is_none() {
            require_positive("epsilon", epsilon)?;
        }
        let xs = self.spec.xs();
        let ys = self.spec.ys();
        let rows = xs
            .par_iter()
            .map(|&x| -> Result<Vec<(f64, f64)>> {
                let mut out = [0.0; 2];
                let mut row = Vec::with_capacity(ys.len());
                for &y in &ys {
                    evaluate_field(potential, field, &[x, y], epsilon, &mut out)?;
                    row.push((out[0], out[1]));
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;
        let (nx, ny) = (xs.len(), ys.len());
        Ok(VectorFieldMap {
            gx: DMatrix::from_row_iterator(nx, ny, rows.iter().flatten().map(|g| g.0)),
            gy: DMatrix::from_row_iterator(nx, ny, rows.iter().flatten().map(|g| g.1)),
        })
    }

    pub fn compute_divergence(&self, map: &VectorFieldMap) -> Result<DMatrix<f64>> {
        self.check_shape(map)?;
        let (dx, dy) = self.spec.spacing();
        Ok(axis_derivative(&map.gx, GridAxis::X, dx) + axis_derivative(&map.gy, GridAxis::Y, dy))
    }

    pub fn compute_curl(&self, map: &VectorFieldMap) -> Result<DMatrix<f64>> {
        self.check_shape(map)?;
        let (dx, dy) = self.spec.spacing();
        Ok(axis_derivative(&map.gy, GridAxis::X, dx) - axis_derivative(&map.gx, GridAxis::Y, dy))
    }

    pub fn analyze(&self, potential: &dyn Potential, field: Option<&dyn Field>) -> Result<AnalysisResult> {
        self.analyze_with(potential, field, self.epsilon)
    }

    /// Computes every map from scratch; nothing is reused between calls.
    pub fn analyze_with(
        &self,
        potential: &dyn Potential,
        field: Option<&dyn Field>,
        epsilon: f64,
    ) -> Result<AnalysisResult> {
        let potential_map = self.compute_potential_map(potential)?;
        let field_map = self.compute_field_map_with(potential, field, epsilon)?;
        let divergence = self.compute_divergence(&field_map)?;
        let curl = self.compute_curl(&field_map)?;
        let (nx, ny) = self.spec.grid_size();
        debug!(nx, ny, analytic_field = field.is_some(), "analyzed grid");
        Ok(AnalysisResult {
            xs: self.spec.xs(),
            ys: self.spec.ys(),
            potential: potential_map,
            field: field_map,
            divergence,
            curl,
        })
    }

    fn check_shape(&self, map: &VectorFieldMap) -> Result<()> {
        let (nx, ny) = self.spec.grid_size();
        for component in [&map.gx, &map.gy] {
            let (rows, cols) = component.shape();
            if rows != nx {
                return Err(FieldError::dimension("field map rows", nx, rows));
            }
            if cols != ny {
                return Err(FieldError::dimension("field map columns", ny, cols));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::traits::{field_fn, potential_fn, try_potential_fn};
    use std::error::Error;

    fn analyzer(x_range: (f64, f64), y_range: (f64, f64), size: (usize, usize)) -> GridAnalyzer {
        GridAnalyzer::new(GridSpec::new(x_range, y_range, size).expect("spec"), 1e-6)
    }

    #[test]
    fn bowl_has_uniform_negative_divergence_and_no_curl() {
        let analyzer = GridAnalyzer::from_config(&EngineConfig::default()).expect("analyzer");
        let bowl = potential_fn(|p| p[0] * p[0] + p[1] * p[1]);
        let result = analyzer.analyze(&bowl, None).expect("analysis");
        assert_eq!(result.potential().shape(), (100, 100));
        assert!(result.divergence().iter().all(|d| (d + 4.0).abs() < 1e-2));
        assert!(result.curl().iter().all(|c| c.abs() < 1e-2));
        assert!(result.is_conservative(1e-4));

        let diagnostics = result.diagnostics();
        assert!((diagnostics.mean_divergence + 4.0).abs() < 1e-6);
        assert!((diagnostics.max_field_magnitude - 200f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn axes_pair_with_their_own_spacing() {
        // V = 3x + 5y^2 on a non-square grid with unequal spacing.
        let analyzer = analyzer((-2.0, 3.0), (-1.0, 4.0), (41, 26));
        let potential = potential_fn(|p| 3.0 * p[0] + 5.0 * p[1] * p[1]);
        let field = field_fn(|p, out| {
            out[0] = -3.0;
            out[1] = -10.0 * p[1];
        });

        let exact = analyzer.analyze(&potential, Some(&field)).expect("analysis");
        assert_eq!(exact.divergence().shape(), (41, 26));
        assert!(exact.divergence().iter().all(|d| (d + 10.0).abs() < 1e-9));

        let numeric = analyzer.analyze(&potential, None).expect("analysis");
        assert!(numeric.divergence().iter().all(|d| (d + 10.0).abs() < 1e-4));

        // g_y varies along columns only; differencing it along rows sees nothing.
        let (dx, _) = analyzer.spec().spacing();
        let crossed = axis_derivative(exact.field_y(), GridAxis::X, dx);
        assert!(crossed.iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn potential_map_indexes_x_by_row() {
        let analyzer = analyzer((0.0, 1.0), (10.0, 20.0), (3, 5));
        let map = analyzer
            .compute_potential_map(&potential_fn(|p| p[0] + 100.0 * p[1]))
            .expect("map");
        assert_eq!(map.shape(), (3, 5));
        assert_eq!(map[(1, 0)], 0.5 + 1000.0);
        assert_eq!(map[(0, 4)], 2000.0);
    }

    #[test]
    fn rotational_field_is_flagged() {
        let analyzer = analyzer((-1.0, 1.0), (-1.0, 1.0), (21, 21));
        let zero = potential_fn(|_| 0.0);
        let swirl = field_fn(|p, out| {
            out[0] = -p[1];
            out[1] = p[0];
        });
        let result = analyzer.analyze(&zero, Some(&swirl)).expect("analysis");
        assert!(result.curl().iter().all(|c| (c - 2.0).abs() < 1e-9));
        assert!(result.divergence().iter().all(|d| d.abs() < 1e-9));
        assert!(!result.is_conservative(1e-3));
        assert!((result.diagnostics().max_abs_curl - 2.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_grid_is_rejected() {
        let err = GridSpec::new((-5.0, 5.0), (-5.0, 5.0), (1, 5)).expect_err("grid");
        assert_eq!(err.kind(), ErrorKind::Value);

        let parsed = serde_json::from_str::<GridSpec>(
            r#"{"x_range": [-1.0, 1.0], "y_range": [-1.0, 1.0], "grid_size": [1, 5]}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn epsilon_is_only_needed_for_numeric_fields() {
        let analyzer = GridAnalyzer::new(
            GridSpec::new((-1.0, 1.0), (-1.0, 1.0), (5, 5)).expect("spec"),
            0.0,
        );
        let bowl = potential_fn(|p| p[0] * p[0] + p[1] * p[1]);
        let bowl_field = field_fn(|p, out| {
            out[0] = -2.0 * p[0];
            out[1] = -2.0 * p[1];
        });
        analyzer
            .analyze(&bowl, Some(&bowl_field))
            .expect("analytic field needs no epsilon");
        let err = analyzer.analyze(&bowl, None).expect_err("numeric field");
        assert_eq!(err.kind(), ErrorKind::Value);
        assert!(err.to_string().contains("epsilon"));
    }

    #[test]
    fn mismatched_map_shape_is_rejected() {
        let analyzer = analyzer((0.0, 1.0), (0.0, 1.0), (4, 6));
        let map = VectorFieldMap {
            gx: DMatrix::zeros(6, 4),
            gy: DMatrix::zeros(6, 4),
        };
        assert_eq!(analyzer.compute_divergence(&map).expect_err("shape").kind(), ErrorKind::Dimension);
        assert!(analyzer.compute_curl(&map).is_err());
    }

    #[test]
    fn capability_failure_surfaces_as_evaluation_error() {
        let analyzer = analyzer((-1.0, 1.0), (-1.0, 1.0), (8, 8));
        let singular = try_potential_fn(|p| {
            if p[0] > 0.5 {
                Err("outside domain".into())
            } else {
                Ok(p[0])
            }
        });
        let err = analyzer.analyze(&singular, None).expect_err("expected failure");
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert_eq!(err.source().expect("source").to_string(), "outside domain");
    }

    #[test]
    fn sample_points_follow_axes() {
        let analyzer = analyzer((0.0, 2.0), (-1.0, 1.0), (3, 3));
        let result = analyzer.analyze(&potential_fn(|_| 1.0), None).expect("analysis");
        assert_eq!(result.sample_point(2, 0), Some((2.0, -1.0)));
        assert_eq!(result.sample_point(3, 0), None);
        assert_eq!(result.xs(), &[0.0, 1.0, 2.0]);
    }
}
