//! State integrator.
//!
//! A state is the flat vector `[x1, ..., xN, v1, ..., vN]`. Each step reads
//! the acceleration `g(x) = -∇V(x)` from the supplied field, or from a
//! central-difference estimate of the potential when no field is given, adds
//! the engine's [`Injection`] force `I(x, v, t)` when one is attached, and
//! returns a fresh state; inputs are never mutated.
//!
//! Without rotation the step is semi-implicit Euler,
//!
//! ```text
//! v_new = (v + dt (g(x) + I(x, v, t))) exp(-gamma dt)
//! x_new = x + dt v_new
//! ```
//!
//! With a [`Coriolis`](crate::config::Coriolis) term the step is the symmetric
//! splitting damp/drift/kick/rotate/kick/drift/damp. The force is taken once
//! at the drifted midpoint and time `t + dt/2`, and the rotation is applied
//! exactly so it never changes the speed.

use crate::config::EngineConfig;
use crate::error::{require_positive, FieldError, Result};
use crate::host::StateContainer;
use crate::numdiff::evaluate_field;
use crate::traits::{Field, Injection, Potential};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Extension key under which [`PotentialFieldEngine::update`] records its
/// diagnostics.
pub const EXTENSION_KEY: &str = "potential_field";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// `x_new ‖ v_new`.
    pub state: Vec<f64>,
    /// Simulation time after the step, `t + dt`.
    pub time: f64,
    /// `kinetic_energy + potential_energy`.
    pub energy: f64,
    pub kinetic_energy: f64,
    /// `V(x_new)`.
    pub potential_energy: f64,
    /// Field plus injection used for the velocity kick.
    pub acceleration: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Initial state followed by one entry per step.
    pub states: Vec<Vec<f64>>,
    pub times: Vec<f64>,
    pub energies: Vec<f64>,
}

#[derive(Clone)]
pub struct PotentialFieldEngine {
    config: EngineConfig,
    injection: Option<Arc<dyn Injection>>,
}

impl fmt::Debug for PotentialFieldEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PotentialFieldEngine")
            .field("config", &self.config)
            .field("has_injection", &self.injection.is_some())
            .finish()
    }
}

impl PotentialFieldEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            injection: None,
        })
    }

    /// Attaches an external force added to every kick.
    pub fn with_injection(mut self, injection: impl Injection + 'static) -> Self {
        self.injection = Some(Arc::new(injection));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_injection(&self) -> bool {
        self.injection.is_some()
    }

    /// Advances `state` from time zero by one step of the configured `dt`.
    pub fn step(
        &self,
        state: &[f64],
        potential: &dyn Potential,
        field: Option<&dyn Field>,
    ) -> Result<StepOutcome> {
        self.step_at(state, 0.0, potential, field)
    }

    /// Advances `state` from time `t` by one step of the configured `dt`.
    pub fn step_at(
        &self,
        state: &[f64],
        t: f64,
        potential: &dyn Potential,
        field: Option<&dyn Field>,
    ) -> Result<StepOutcome> {
        self.step_with(state, t, potential, field, self.config.dt, self.config.epsilon)
    }

    /// Advances `state` from time `t` with an explicit `dt` and
    /// finite-difference `epsilon`. `epsilon` is only checked when `field`
    /// is `None`.
    pub fn step_with(
        &self,
        state: &[f64],
        t: f64,
        potential: &dyn Potential,
        field: Option<&dyn Field>,
        dt: f64,
        epsilon: f64,
    ) -> Result<StepOutcome> {
        let dim = split_dimension(state)?;
        require_positive("dt", dt)?;
        if !t.is_finite() {
            return Err(FieldError::invalid("t", format!("must be finite (got {t})")));
        }
        if field.is_none() {
            require_positive("epsilon", epsilon)?;
        }
        if let Some(coriolis) = &self.config.coriolis {
            coriolis.validate(dim)?;
        }

        let (x, v) = state.split_at(dim);
        let mut acceleration = vec![0.0; dim];
        let (x_new, v_new) = match &self.config.coriolis {
            None => {
                evaluate_field(potential, field, x, epsilon, &mut acceleration)?;
                self.add_injection(x, v, t, &mut acceleration)?;
                let decay = (-self.config.damping * dt).exp();
                let v_new: Vec<f64> = v
                    .iter()
                    .zip(&acceleration)
                    .map(|(vi, ai)| (vi + dt * ai) * decay)
                    .collect();
                let x_new: Vec<f64> = x.iter().zip(&v_new).map(|(xi, vi)| xi + dt * vi).collect();
                (x_new, v_new)
            }
            Some(coriolis) => {
                let half = 0.5 * dt;
                let half_decay = (-self.config.damping * half).exp();
                let mut v_work: Vec<f64> = v.iter().map(|vi| vi * half_decay).collect();
                let x_half: Vec<f64> = x.iter().zip(&v_work).map(|(xi, vi)| xi + half * vi).collect();
                evaluate_field(potential, field, &x_half, epsilon, &mut acceleration)?;
                self.add_injection(&x_half, &v_work, t + half, &mut acceleration)?;
                for (vi, ai) in v_work.iter_mut().zip(&acceleration) {
                    *vi += half * ai;
                }
                rotate(&mut v_work, coriolis.plane, coriolis.omega * dt);
                for (vi, ai) in v_work.iter_mut().zip(&acceleration) {
                    *vi += half * ai;
                }
                let x_new: Vec<f64> = x_half
                    .iter()
                    .zip(&v_work)
                    .map(|(xi, vi)| xi + half * vi)
                    .collect();
                for vi in v_work.iter_mut() {
                    *vi *= half_decay;
                }
                (x_new, v_work)
            }
        };

        let potential_energy = potential
            .potential(&x_new)
            .map_err(FieldError::evaluation("potential"))?;
        let kinetic_energy = 0.5 * v_new.iter().map(|vi| vi * vi).sum::<f64>();
        let energy = kinetic_energy + potential_energy;
        let time = t + dt;
        trace!(dimension = dim, dt, time, energy, "integrated step");

        let mut new_state = x_new;
        new_state.extend_from_slice(&v_new);
        Ok(StepOutcome {
            state: new_state,
            time,
            energy,
            kinetic_energy,
            potential_energy,
            acceleration,
        })
    }

    /// Adds `I(x, v, t)` to `acc` when an injection is attached.
    fn add_injection(&self, x: &[f64], v: &[f64], t: f64, acc: &mut [f64]) -> Result<()> {
        let Some(injection) = &self.injection else {
            return Ok(());
        };
        let mut force = vec![0.0; x.len()];
        injection
            .force(x, v, t, &mut force)
            .map_err(FieldError::evaluation("injection"))?;
        for (ai, fi) in acc.iter_mut().zip(&force) {
            *ai += fi;
        }
        Ok(())
    }

    /// Injected power `v · I(x, v, t)`; zero without an injection.
    fn injection_power(&self, x: &[f64], v: &[f64], t: f64) -> Result<f64> {
        let mut force = vec![0.0; x.len()];
        self.add_injection(x, v, t, &mut force)?;
        Ok(v.iter().zip(&force).map(|(vi, fi)| vi * fi).sum())
    }

    /// Steps the state held by `host` from its current time and returns an
    /// updated copy.
    ///
    /// The copy carries the new state vector, energy and time, plus an entry
    /// under [`EXTENSION_KEY`] with the potential, the field at the new
    /// position, the acceleration used, the energy split, the time, the
    /// damping rate, the dissipated power `-gamma |v_new|^2` and the injected
    /// power `v_new · I(x_new, v_new, t_new)`.
    pub fn update<S: StateContainer>(
        &self,
        host: &S,
        potential: &dyn Potential,
        field: Option<&dyn Field>,
    ) -> Result<S> {
        let outcome = self.step_at(host.state_vector(), host.time(), potential, field)?;
        let dim = outcome.acceleration.len();
        let (x_new, v_new) = outcome.state.split_at(dim);

        let mut field_at_new = vec![0.0; dim];
        evaluate_field(potential, field, x_new, self.config.epsilon, &mut field_at_new)?;
        let gamma = self.config.damping;
        let dissipation_power = -gamma * v_new.iter().map(|vi| vi * vi).sum::<f64>();
        let injection_power = self.injection_power(x_new, v_new, outcome.time)?;

        let mut updated = host.copy();
        updated.set_extension(
            EXTENSION_KEY,
            json!({
                "potential": outcome.potential_energy,
                "field": field_at_new,
                "acceleration": outcome.acceleration,
                "kinetic_energy": outcome.kinetic_energy,
                "potential_energy": outcome.potential_energy,
                "total_energy": outcome.energy,
                "time": outcome.time,
                "gamma": gamma,
                "dissipation_power": dissipation_power,
                "injection_power": injection_power,
            }),
        );
        updated.set_energy(outcome.energy);
        updated.set_time(outcome.time);
        updated.set_state_vector(outcome.state);
        debug!(
            dimension = dim,
            time = outcome.time,
            energy = outcome.energy,
            dissipation_power,
            injection_power,
            "updated host state"
        );
        Ok(updated)
    }

    /// Applies `steps` consecutive steps starting at time `t0`, recording the
    /// initial state and every intermediate one with its time and energy.
    pub fn trajectory(
        &self,
        state: &[f64],
        t0: f64,
        steps: usize,
        potential: &dyn Potential,
        field: Option<&dyn Field>,
    ) -> Result<Trajectory> {
        let dim = split_dimension(state)?;
        let initial_energy = total_energy(state, dim, potential)?;
        let mut states = Vec::with_capacity(steps + 1);
        let mut times = Vec::with_capacity(steps + 1);
        let mut energies = Vec::with_capacity(steps + 1);
        states.push(state.to_vec());
        times.push(t0);
        energies.push(initial_energy);

        let mut current = state.to_vec();
        let mut t = t0;
        for _ in 0..steps {
            let outcome = self.step_at(&current, t, potential, field)?;
            states.push(outcome.state.clone());
            times.push(outcome.time);
            energies.push(outcome.energy);
            t = outcome.time;
            current = outcome.state;
        }
        debug!(dimension = dim, steps, t_end = t, "integrated trajectory");
        Ok(Trajectory {
            states,
            times,
            energies,
        })
    }

    /// Steps independent states from the common time `t` in parallel. Each
    /// outcome equals a sequential [`step_at`](Self::step_at) of the same
    /// state.
    pub fn step_batch(
        &self,
        states: &[Vec<f64>],
        t: f64,
        potential: &dyn Potential,
        field: Option<&dyn Field>,
    ) -> Result<Vec<StepOutcome>> {
        let outcomes = states
            .par_iter()
            .map(|state| self.step_at(state, t, potential, field))
            .collect::<Result<Vec<_>>>()?;
        debug!(batch = states.len(), "stepped batch");
        Ok(outcomes)
    }
}

/// Position dimension of a flat state, rejecting odd or empty vectors.
fn split_dimension(state: &[f64]) -> Result<usize> {
    if state.is_empty() || state.len() % 2 != 0 {
        return Err(FieldError::StateLength { len: state.len() });
    }
    Ok(state.len() / 2)
}

fn total_energy(state: &[f64], dim: usize, potential: &dyn Potential) -> Result<f64> {
    let (x, v) = state.split_at(dim);
    let potential_energy = potential
        .potential(x)
        .map_err(FieldError::evaluation("potential"))?;
    Ok(0.5 * v.iter().map(|vi| vi * vi).sum::<f64>() + potential_energy)
}

/// Rotates `v` by `theta` in the plane `(i, j)`; other components are untouched.
fn rotate(v: &mut [f64], (i, j): (usize, usize), theta: f64) {
    let (s, c) = theta.sin_cos();
    let (vi, vj) = (v[i], v[j]);
    v[i] = c * vi - s * vj;
    v[j] = s * vi + c * vj;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Coriolis;
    use crate::error::ErrorKind;
    use crate::gravity::{GravityField, GravitySettings, Mass};
    use crate::host::MemoryState;
    use crate::traits::{field_fn, injection_fn, potential_fn, try_potential_fn};
    use proptest::prelude::*;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn engine() -> PotentialFieldEngine {
        PotentialFieldEngine::new(EngineConfig::default()).expect("engine")
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn zero_potential_drifts_at_constant_velocity() {
        let zero = potential_fn(|_| 0.0);
        let state = [1.0, -2.0, 0.5, 3.0];
        let outcome = engine()
            .step_with(&state, 0.0, &zero, None, 0.1, 1e-4)
            .expect("step");
        assert_eq!(&outcome.state[2..], &[0.5, 3.0]);
        assert!((outcome.state[0] - 1.05).abs() < 1e-15);
        assert!((outcome.state[1] + 1.7).abs() < 1e-15);
        assert_eq!(state, [1.0, -2.0, 0.5, 3.0]);
    }

    #[test]
    fn semi_implicit_euler_uses_updated_velocity() {
        // V = x^2 / 2, g = -x
        let harmonic = potential_fn(|x| 0.5 * x[0] * x[0]);
        let spring = field_fn(|x, out| out[0] = -x[0]);
        let outcome = engine()
            .step_with(&[1.0, 0.0], 0.0, &harmonic, Some(&spring), 0.1, 1e-4)
            .expect("step");
        assert!((outcome.state[1] + 0.1).abs() < 1e-15);
        assert!((outcome.state[0] - 0.99).abs() < 1e-15);
        assert_eq!(outcome.acceleration, vec![-1.0]);
        let expected = 0.5 * 0.01 + 0.5 * 0.99 * 0.99;
        assert!((outcome.energy - expected).abs() < 1e-15);
    }

    #[test]
    fn supplied_field_bypasses_differentiation() {
        let calls = AtomicUsize::new(0);
        let counting = potential_fn(|x| {
            calls.fetch_add(1, Ordering::SeqCst);
            x[0]
        });
        let field = field_fn(|_, out| out[0] = -1.0);
        engine()
            .step(&[0.0, 0.0], &counting, Some(&field))
            .expect("step");
        // Only the energy evaluation touches the potential.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        calls.store(0, Ordering::SeqCst);
        engine().step(&[0.0, 0.0], &counting, None).expect("step");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn numeric_field_tracks_gravity() {
        let gravity = GravityField::new(
            vec![Mass::new(vec![0.0, 0.0], 1.0)],
            GravitySettings::default(),
        )
        .expect("gravity");
        let state = [1.0, 0.0, 0.0, 1.0];
        let analytic = engine().step(&state, &gravity, Some(&gravity)).expect("analytic");
        let numeric = engine()
            .step_with(&state, 0.0, &gravity, None, 0.01, 1e-4)
            .expect("numeric");
        for (a, n) in analytic.state.iter().zip(&numeric.state) {
            assert!((a - n).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_bad_inputs() {
        let zero = potential_fn(|_| 0.0);
        assert_err_contains(engine().step(&[1.0, 2.0, 3.0], &zero, None), "got 3");
        assert_err_contains(engine().step(&[], &zero, None), "got 0");
        assert_err_contains(engine().step_with(&[0.0, 0.0], 0.0, &zero, None, 0.0, 1e-6), "dt");
        assert_err_contains(engine().step_with(&[0.0, 0.0], 0.0, &zero, None, 0.1, -1.0), "epsilon");
        assert_err_contains(engine().step_at(&[0.0, 0.0], f64::NAN, &zero, None), "invalid t");
        let field = field_fn(|_, out| out[0] = 0.0);
        engine()
            .step_with(&[0.0, 0.0], 0.0, &zero, Some(&field), 0.1, -1.0)
            .expect("epsilon is unused when a field is supplied");
    }

    #[test]
    fn capability_failure_keeps_its_source() {
        let failing = try_potential_fn(|_| Err("log of negative".into()));
        let err = engine().step(&[0.0, 0.0], &failing, None).expect_err("expected failure");
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert_eq!(err.source().expect("source").to_string(), "log of negative");
    }

    #[test]
    fn damping_decays_velocity_exponentially() {
        let engine = PotentialFieldEngine::new(EngineConfig {
            damping: 2.0,
            ..EngineConfig::default()
        })
        .expect("engine");
        let zero = potential_fn(|_| 0.0);
        let outcome = engine.step_with(&[0.0, 1.0], 0.0, &zero, None, 0.1, 1e-4).expect("step");
        let decay = (-0.2f64).exp();
        assert!((outcome.state[1] - decay).abs() < 1e-15);
        assert!((outcome.state[0] - 0.1 * decay).abs() < 1e-15);
    }

    #[test]
    fn coriolis_rotation_preserves_speed() {
        let engine = PotentialFieldEngine::new(EngineConfig {
            coriolis: Some(Coriolis::new(3.0)),
            ..EngineConfig::default()
        })
        .expect("engine");
        let zero = potential_fn(|_| 0.0);
        let mut state = vec![0.0, 0.0, 1.0, 0.5];
        let speed = (1.25f64).sqrt();
        for _ in 0..50 {
            state = engine.step(&state, &zero, None).expect("step").state;
        }
        let rotated = (state[2] * state[2] + state[3] * state[3]).sqrt();
        assert!((rotated - speed).abs() < 1e-12);
        // 50 steps of omega dt = 0.03 turn the velocity by 1.5 rad.
        let angle = state[3].atan2(state[2]) - 0.5f64.atan2(1.0);
        assert!((angle - 1.5).abs() < 1e-12);
    }

    #[test]
    fn coriolis_plane_must_fit_state() {
        let engine = PotentialFieldEngine::new(EngineConfig {
            coriolis: Some(Coriolis {
                omega: 1.0,
                plane: (0, 2),
            }),
            ..EngineConfig::default()
        })
        .expect("engine");
        let zero = potential_fn(|_| 0.0);
        let err = engine.step(&[0.0, 0.0, 1.0, 1.0], &zero, None).expect_err("plane");
        assert_eq!(err.kind(), ErrorKind::Dimension);
    }

    #[test]
    fn update_records_extension_and_leaves_input_alone() {
        let engine = PotentialFieldEngine::new(EngineConfig {
            damping: 0.5,
            ..EngineConfig::default()
        })
        .expect("engine");
        let harmonic = potential_fn(|x| 0.5 * x[0] * x[0]);
        let spring = field_fn(|x, out| out[0] = -x[0]);
        let host = MemoryState::new(vec![1.0, 0.0]);
        let updated = engine.update(&host, &harmonic, Some(&spring)).expect("update");

        assert_eq!(host.state_vector(), &[1.0, 0.0]);
        assert!(host.extension(EXTENSION_KEY).is_none());

        let outcome = engine.step(&[1.0, 0.0], &harmonic, Some(&spring)).expect("step");
        assert_eq!(updated.state_vector(), outcome.state.as_slice());
        assert_eq!(updated.energy(), outcome.energy);

        let record = updated.extension(EXTENSION_KEY).expect("extension");
        assert_eq!(record["gamma"], 0.5);
        assert_eq!(record["acceleration"][0], -1.0);
        assert_eq!(record["field"][0], -outcome.state[0]);
        assert_eq!(record["total_energy"], outcome.energy);
        let v = outcome.state[1];
        assert_eq!(record["dissipation_power"], -0.5 * v * v);
        assert_eq!(record["injection_power"], 0.0);
        assert_eq!(record["time"], 0.01);
        assert_eq!(updated.time(), 0.01);

        let again = engine.update(&updated, &harmonic, Some(&spring)).expect("update");
        assert_eq!(again.time(), 0.01 + 0.01);
    }

    #[test]
    fn splitting_kicks_with_midpoint_force() {
        let (omega, gamma, dt) = (1.5, 0.4, 0.1);
        let engine = PotentialFieldEngine::new(EngineConfig {
            damping: gamma,
            coriolis: Some(Coriolis::new(omega)),
            ..EngineConfig::default()
        })
        .expect("engine");
        let harmonic = potential_fn(|x| 0.5 * (x[0] * x[0] + x[1] * x[1]));
        let spring = field_fn(|x, out| {
            out[0] = -x[0];
            out[1] = -x[1];
        });
        let state = [1.0, -0.5, 0.3, 0.8];
        let outcome = engine
            .step_with(&state, 0.0, &harmonic, Some(&spring), dt, 1e-6)
            .expect("step");

        let half = 0.5 * dt;
        let half_decay = (-gamma * half).exp();
        // damp, drift
        let (vx, vy) = (0.3 * half_decay, 0.8 * half_decay);
        let (hx, hy) = (1.0 + half * vx, -0.5 + half * vy);
        // kick with g(x_half), rotate, kick again
        let (gx, gy) = (-hx, -hy);
        let (kx, ky) = (vx + half * gx, vy + half * gy);
        let (s, c) = (omega * dt).sin_cos();
        let (rx, ry) = (c * kx - s * ky + half * gx, s * kx + c * ky + half * gy);
        // drift, damp
        let expected = [hx + half * rx, hy + half * ry, rx * half_decay, ry * half_decay];

        for (got, want) in outcome.state.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-15, "got {got}, want {want}");
        }
        assert_eq!(outcome.acceleration, vec![gx, gy]);
        assert!((outcome.time - dt).abs() < 1e-15);
    }

    #[test]
    fn constant_injection_adds_to_the_kick() {
        let engine = engine().with_injection(injection_fn(|_, _, _, out| {
            out[0] = 2.0;
            out[1] = -1.0;
        }));
        let zero = potential_fn(|_| 0.0);
        let state = [0.0, 0.0, 1.0, 0.5];
        let outcome = engine
            .step_with(&state, 0.0, &zero, None, 0.1, 1e-4)
            .expect("step");
        assert!((outcome.state[2] - 1.2).abs() < 1e-15);
        assert!((outcome.state[3] - 0.4).abs() < 1e-15);
        assert!((outcome.state[0] - 0.12).abs() < 1e-15);
        assert!((outcome.state[1] - 0.04).abs() < 1e-15);
        assert_eq!(outcome.acceleration, vec![2.0, -1.0]);
    }

    #[test]
    fn injection_sees_step_time() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let drive = injection_fn(move |_, _, t, out| {
            recorder.lock().expect("lock").push(t);
            out.fill(0.0);
        });
        let zero = potential_fn(|_| 0.0);

        let euler = engine().with_injection(drive);
        euler.step_at(&[0.0, 1.0], 2.0, &zero, None).expect("step");
        assert_eq!(seen.lock().expect("lock").as_slice(), &[2.0]);

        seen.lock().expect("lock").clear();
        let recorder = Arc::clone(&seen);
        let split = PotentialFieldEngine::new(EngineConfig {
            dt: 0.5,
            coriolis: Some(Coriolis::new(1.0)),
            ..EngineConfig::default()
        })
        .expect("engine")
        .with_injection(injection_fn(move |_, _, t, out| {
            recorder.lock().expect("lock").push(t);
            out.fill(0.0);
        }));
        split.step_at(&[0.0, 0.0, 1.0, 0.0], 2.0, &zero, None).expect("step");
        assert_eq!(seen.lock().expect("lock").as_slice(), &[2.25]);
    }

    #[test]
    fn update_records_injected_power() {
        let engine = engine().with_injection(injection_fn(|_, v, t, out| {
            out[0] = -v[0] + t;
        }));
        let zero = potential_fn(|_| 0.0);
        let mut host = MemoryState::new(vec![0.0, 2.0]);
        host.set_time(1.0);
        let updated = engine.update(&host, &zero, None).expect("update");

        let outcome = engine.step_at(&[0.0, 2.0], 1.0, &zero, None).expect("step");
        assert_eq!(updated.state_vector(), outcome.state.as_slice());
        let v_new = outcome.state[1];
        let record = updated.extension(EXTENSION_KEY).expect("extension");
        assert_eq!(record["time"], outcome.time);
        assert_eq!(record["injection_power"], v_new * (-v_new + outcome.time));
        assert_eq!(updated.time(), outcome.time);
    }

    #[test]
    fn failing_injection_is_an_evaluation_error() {
        let failing = OfflineActuator;
        let zero = potential_fn(|_| 0.0);
        let err = engine()
            .with_injection(failing)
            .step(&[0.0, 0.0], &zero, None)
            .expect_err("injection failure");
        assert_eq!(err.kind(), ErrorKind::Evaluation);
        assert!(err.to_string().contains("injection"));
    }

    struct OfflineActuator;

    impl Injection for OfflineActuator {
        fn force(&self, _: &[f64], _: &[f64], _: f64, _: &mut [f64]) -> crate::traits::EvalResult<()> {
            Err("actuator offline".into())
        }
    }

    #[test]
    fn trajectory_records_initial_state() {
        let harmonic = potential_fn(|x| 0.5 * x[0] * x[0]);
        let trajectory = engine()
            .trajectory(&[1.0, 0.0], 0.0, 20, &harmonic, None)
            .expect("trajectory");
        assert_eq!(trajectory.states.len(), 21);
        assert_eq!(trajectory.energies.len(), 21);
        assert_eq!(trajectory.states[0], vec![1.0, 0.0]);
        assert_eq!(trajectory.energies[0], 0.5);
        assert_eq!(trajectory.times[0], 0.0);
        assert!((trajectory.times[20] - 0.2).abs() < 1e-12);
        let last = engine()
            .step_at(&trajectory.states[19], trajectory.times[19], &harmonic, None)
            .expect("step");
        assert_eq!(trajectory.states[20], last.state);
        assert_eq!(trajectory.times[20], last.time);
    }

    #[test]
    fn batch_matches_sequential_steps() {
        let harmonic = potential_fn(|x| 0.5 * (x[0] * x[0] + x[1] * x[1]));
        let states: Vec<Vec<f64>> = (0..16)
            .map(|k| vec![k as f64 * 0.1, 1.0, 0.0, -0.2])
            .collect();
        let batch = engine().step_batch(&states, 0.0, &harmonic, None).expect("batch");
        for (state, outcome) in states.iter().zip(&batch) {
            let single = engine().step(state, &harmonic, None).expect("step");
            assert_eq!(&single, outcome);
        }

        let mut with_bad = states.clone();
        with_bad.push(vec![1.0]);
        assert!(engine().step_batch(&with_bad, 0.0, &harmonic, None).is_err());
    }

    proptest! {
        #[test]
        fn output_length_matches_even_input(values in prop::collection::vec(-10.0f64..10.0, 1..8)) {
            let mut state = values.clone();
            state.extend(values.iter().map(|v| v * 0.5));
            let zero = potential_fn(|_| 0.0);
            let outcome = engine().step(&state, &zero, None).expect("step");
            prop_assert_eq!(outcome.state.len(), state.len());
        }

        #[test]
        fn odd_input_is_rejected(values in prop::collection::vec(-10.0f64..10.0, 0..8)) {
            let mut state = values.clone();
            state.extend(values.iter().copied());
            state.push(0.0);
            let zero = potential_fn(|_| 0.0);
            let err = engine().step(&state, &zero, None).expect_err("odd length");
            prop_assert_eq!(err.kind(), ErrorKind::Dimension);
        }
    }
}
