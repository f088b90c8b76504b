use num_traits::{NumOps, One, Zero};
use std::error::Error;
use std::fmt::Debug;
use std::ops::Neg;
use std::sync::Arc;

/// A trait for types the expression VM can evaluate on.
/// Implemented for `f64` and for the forward-mode `Dual` number.
pub trait Scalar:
    Copy + Debug + Zero + One + NumOps + Neg<Output = Self> + Send + Sync + 'static
{
    fn from_f64(value: f64) -> Self;
    fn powf(self, exponent: Self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sqrt(self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }
    fn sin(self) -> Self {
        f64::sin(self)
    }
    fn cos(self) -> Self {
        f64::cos(self)
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}

/// Error raised by a user-supplied capability.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result of evaluating a capability.
pub type EvalResult<T> = std::result::Result<T, BoxError>;

/// A scalar potential V: R^N -> R.
///
/// Implementations must be deterministic and free of side effects; the grid
/// analyzer evaluates them concurrently from several threads.
pub trait Potential: Send + Sync {
    /// Evaluates V(x).
    fn potential(&self, x: &[f64]) -> EvalResult<f64>;
}

/// A vector field g: R^N -> R^N interpreted as `-∇V(x)`.
///
/// Supplying a field next to a potential lets consumers skip numerical
/// differentiation entirely.
pub trait Field: Send + Sync {
    /// Writes g(x) into `out`, which has the same length as `x`.
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()>;
}

/// An external force `I(x, v, t)` added to the field at every velocity kick.
///
/// Unlike a [`Field`] it may depend on velocity and time, so it is not
/// tied to any potential and is never included in the energy.
pub trait Injection: Send + Sync {
    /// Writes `I(x, v, t)` into `out`, which has the same length as `x`.
    fn force(&self, x: &[f64], v: &[f64], t: f64, out: &mut [f64]) -> EvalResult<()>;
}

impl<P: Potential + ?Sized> Potential for &P {
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        (**self).potential(x)
    }
}

impl<P: Potential + ?Sized> Potential for Box<P> {
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        (**self).potential(x)
    }
}

impl<P: Potential + ?Sized> Potential for Arc<P> {
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        (**self).potential(x)
    }
}

impl<F: Field + ?Sized> Field for &F {
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        (**self).field(x, out)
    }
}

impl<F: Field + ?Sized> Field for Box<F> {
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        (**self).field(x, out)
    }
}

impl<F: Field + ?Sized> Field for Arc<F> {
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        (**self).field(x, out)
    }
}

impl<I: Injection + ?Sized> Injection for &I {
    fn force(&self, x: &[f64], v: &[f64], t: f64, out: &mut [f64]) -> EvalResult<()> {
        (**self).force(x, v, t, out)
    }
}

impl<I: Injection + ?Sized> Injection for Box<I> {
    fn force(&self, x: &[f64], v: &[f64], t: f64, out: &mut [f64]) -> EvalResult<()> {
        (**self).force(x, v, t, out)
    }
}

impl<I: Injection + ?Sized> Injection for Arc<I> {
    fn force(&self, x: &[f64], v: &[f64], t: f64, out: &mut [f64]) -> EvalResult<()> {
        (**self).force(x, v, t, out)
    }
}

/// Infallible closure adapted into a [`Potential`]. Built by [`potential_fn`].
pub struct PotentialFn<F>(F);

/// Fallible closure adapted into a [`Potential`]. Built by [`try_potential_fn`].
pub struct TryPotentialFn<F>(F);

/// Infallible closure adapted into a [`Field`]. Built by [`field_fn`].
pub struct FieldFn<F>(F);

/// Fallible closure adapted into a [`Field`]. Built by [`try_field_fn`].
pub struct TryFieldFn<F>(F);

/// Infallible closure adapted into an [`Injection`]. Built by [`injection_fn`].
pub struct InjectionFn<F>(F);

pub fn potential_fn<F>(f: F) -> PotentialFn<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    PotentialFn(f)
}

pub fn try_potential_fn<F>(f: F) -> TryPotentialFn<F>
where
    F: Fn(&[f64]) -> EvalResult<f64> + Send + Sync,
{
    TryPotentialFn(f)
}

pub fn field_fn<F>(f: F) -> FieldFn<F>
where
    F: Fn(&[f64], &mut [f64]) + Send + Sync,
{
    FieldFn(f)
}

pub fn try_field_fn<F>(f: F) -> TryFieldFn<F>
where
    F: Fn(&[f64], &mut [f64]) -> EvalResult<()> + Send + Sync,
{
    TryFieldFn(f)
}

pub fn injection_fn<F>(f: F) -> InjectionFn<F>
where
    F: Fn(&[f64], &[f64], f64, &mut [f64]) + Send + Sync,
{
    InjectionFn(f)
}

impl<F> Potential for PotentialFn<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        Ok((self.0)(x))
    }
}

impl<F> Potential for TryPotentialFn<F>
where
    F: Fn(&[f64]) -> EvalResult<f64> + Send + Sync,
{
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        (self.0)(x)
    }
}

impl<F> Field for FieldFn<F>
where
    F: Fn(&[f64], &mut [f64]) + Send + Sync,
{
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        (self.0)(x, out);
        Ok(())
    }
}

impl<F> Field for TryFieldFn<F>
where
    F: Fn(&[f64], &mut [f64]) -> EvalResult<()> + Send + Sync,
{
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        (self.0)(x, out)
    }
}

impl<F> Injection for InjectionFn<F>
where
    F: Fn(&[f64], &[f64], f64, &mut [f64]) + Send + Sync,
{
    fn force(&self, x: &[f64], v: &[f64], t: f64, out: &mut [f64]) -> EvalResult<()> {
        (self.0)(x, v, t, out);
        Ok(())
    }
}
