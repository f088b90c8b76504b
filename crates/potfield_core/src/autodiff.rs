use crate::traits::Scalar;
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / (rhs.val * rhs.val),
        )
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // d(a mod b) = da away from the jumps.
        Self::new(self.val % rhs.val, self.eps)
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Scalar for Dual {
    fn from_f64(value: f64) -> Self {
        Self::constant(value)
    }

    fn powf(self, exponent: Self) -> Self {
        let value = self.val.powf(exponent.val);
        // Constant exponent: n x^(n-1) dx. Keeps x^2 differentiable at x <= 0.
        if exponent.eps == 0.0 {
            let slope = if exponent.val == 0.0 {
                0.0
            } else {
                exponent.val * self.val.powf(exponent.val - 1.0)
            };
            return Self::new(value, slope * self.eps);
        }
        // x^y = exp(y ln x)
        let eps = value * (exponent.eps * self.val.ln() + exponent.val * self.eps / self.val);
        Self::new(value, eps)
    }

    fn sin(self) -> Self {
        Self::new(self.val.sin(), self.eps * self.val.cos())
    }

    fn cos(self) -> Self {
        Self::new(self.val.cos(), -self.eps * self.val.sin())
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        Self::new(e, e * self.eps)
    }

    fn ln(self) -> Self {
        Self::new(self.val.ln(), self.eps / self.val)
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }
}

/// Gradient of a scalar function by forward-mode differentiation.
///
/// Seeds one axis at a time, so `f` is evaluated `x.len()` times. `f` may
/// fail; the first failure is returned unchanged.
pub fn gradient<F, E>(f: F, x: &[f64], out: &mut [f64]) -> Result<(), E>
where
    F: Fn(&[Dual]) -> Result<Dual, E>,
{
    let mut seeded: Vec<Dual> = x.iter().map(|&v| Dual::constant(v)).collect();
    for j in 0..x.len() {
        seeded[j].eps = 1.0;
        out[j] = f(&seeded)?.eps;
        seeded[j].eps = 0.0;
    }
    Ok(())
}
