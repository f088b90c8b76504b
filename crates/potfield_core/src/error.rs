use crate::traits::BoxError;
use thiserror::Error;

/// Broad failure category, used by callers that only care whether the input
/// shape, an input value, or a capability was at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Dimension,
    Value,
    Evaluation,
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error(
        "state_vector must have even, non-zero length (got {len}); expected [x1, ..., xN, v1, ..., vN]"
    )]
    StateLength { len: usize },

    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("weight matrix must be square (got {rows}x{cols})")]
    NonSquareMatrix { rows: usize, cols: usize },

    #[error("rotation plane ({first}, {second}) is invalid for a {dimension}-dimensional state")]
    RotationPlane {
        first: usize,
        second: usize,
        dimension: usize,
    },

    #[error("invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("{context} evaluation failed: {source}")]
    Evaluation {
        context: &'static str,
        #[source]
        source: BoxError,
    },
}

impl FieldError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FieldError::StateLength { .. }
            | FieldError::DimensionMismatch { .. }
            | FieldError::NonSquareMatrix { .. }
            | FieldError::RotationPlane { .. } => ErrorKind::Dimension,
            FieldError::InvalidValue { .. } => ErrorKind::Value,
            FieldError::Evaluation { .. } => ErrorKind::Evaluation,
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        FieldError::InvalidValue {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn dimension(context: &'static str, expected: usize, actual: usize) -> Self {
        FieldError::DimensionMismatch {
            context,
            expected,
            actual,
        }
    }

    /// Wraps a capability failure, keeping the original error as the source.
    pub(crate) fn evaluation(context: &'static str) -> impl FnOnce(BoxError) -> Self {
        move |source| FieldError::Evaluation { context, source }
    }
}

pub type Result<T, E = FieldError> = std::result::Result<T, E>;

/// Checks that `value` is finite and strictly positive.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(FieldError::invalid(
            name,
            format!("must be finite and positive (got {value})"),
        ));
    }
    Ok(())
}
