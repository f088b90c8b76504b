//! Sums of potentials and fields.
//!
//! Compositions are lazy: nothing is cached, every evaluation walks the
//! terms in insertion order and adds their contributions, so the result is
//! reproducible bit for bit. An empty composition is the zero potential
//! (or the zero field).

use crate::gravity::GravityField;
use crate::traits::{EvalResult, Field, Potential};
use crate::well::QuadraticWell;

/// Collection of potential terms whose values are summed.
#[derive(Default)]
pub struct CompositePotential<'a> {
    terms: Vec<Box<dyn Potential + 'a>>,
}

impl<'a> CompositePotential<'a> {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Appends a term; it is summed after every term already present.
    pub fn with<P>(mut self, term: P) -> Self
    where
        P: Potential + 'a,
    {
        self.terms.push(Box::new(term));
        self
    }

    pub fn push(&mut self, term: Box<dyn Potential + 'a>) {
        self.terms.push(term);
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Potential for CompositePotential<'_> {
    fn potential(&self, x: &[f64]) -> EvalResult<f64> {
        let mut total = 0.0;
        for term in &self.terms {
            total += term.potential(x)?;
        }
        Ok(total)
    }
}

/// Collection of field terms whose vectors are summed component-wise.
#[derive(Default)]
pub struct CompositeField<'a> {
    terms: Vec<Box<dyn Field + 'a>>,
}

impl<'a> CompositeField<'a> {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn with<F>(mut self, term: F) -> Self
    where
        F: Field + 'a,
    {
        self.terms.push(Box::new(term));
        self
    }

    pub fn push(&mut self, term: Box<dyn Field + 'a>) {
        self.terms.push(term);
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Field for CompositeField<'_> {
    fn field(&self, x: &[f64], out: &mut [f64]) -> EvalResult<()> {
        out.fill(0.0);
        if self.terms.is_empty() {
            return Ok(());
        }
        let mut scratch = vec![0.0; out.len()];
        for term in &self.terms {
            term.field(x, &mut scratch)?;
            for (acc, value) in out.iter_mut().zip(&scratch) {
                *acc += value;
            }
        }
        Ok(())
    }
}

pub fn compose_potential<'a>(terms: Vec<Box<dyn Potential + 'a>>) -> CompositePotential<'a> {
    CompositePotential { terms }
}

pub fn compose_field<'a>(terms: Vec<Box<dyn Field + 'a>>) -> CompositeField<'a> {
    CompositeField { terms }
}

/// Gravity, then each well, then each custom term, summed in that order.
pub fn composite_potential<'a>(
    gravity: Option<&'a GravityField>,
    wells: &'a [QuadraticWell],
    custom: Vec<Box<dyn Potential + 'a>>,
) -> CompositePotential<'a> {
    let mut composite = CompositePotential::new();
    if let Some(gravity) = gravity {
        composite.push(Box::new(gravity));
    }
    for well in wells {
        composite.push(Box::new(well));
    }
    for term in custom {
        composite.push(term);
    }
    composite
}

/// Field counterpart of [`composite_potential`], with the same term order.
pub fn composite_field<'a>(
    gravity: Option<&'a GravityField>,
    wells: &'a [QuadraticWell],
    custom: Vec<Box<dyn Field + 'a>>,
) -> CompositeField<'a> {
    let mut composite = CompositeField::new();
    if let Some(gravity) = gravity {
        composite.push(Box::new(gravity));
    }
    for well in wells {
        composite.push(Box::new(well));
    }
    for term in custom {
        composite.push(term);
    }
    composite
}
