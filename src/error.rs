//! Error types for the quadratic constraint core.

use thiserror::Error;

use crate::model::VarId;

/// Errors that can occur while building or editing a quadratic constraint.
///
/// Infeasibility is deliberately *not* an error: it is an expected outcome of
/// propagation and is reported through [`crate::propagate::PropagationResult`].
/// Out-of-range positions are programming-contract violations and are caught
/// by assertions, not returned as errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuadError {
    /// A bilinear term was requested on a single variable.
    /// Square terms belong in the quadratic variable term, not here.
    #[error("degenerate bilinear term: variable {0} paired with itself")]
    DegenerateBilinear(VarId),

    /// Constraint sides are inconsistent.
    #[error("invalid constraint sides: lhs {lhs} > rhs {rhs}")]
    InvalidSides {
        /// Left-hand side.
        lhs: f64,
        /// Right-hand side.
        rhs: f64,
    },
}

/// Result type for quadratic constraint operations.
pub type QuadResult<T> = Result<T, QuadError>;
