//! Sparse quadratic term storage.
//!
//! A constraint body `lhs <= sum(b_i x_i) + sum(q_j(x_j)) + sum(c_k x y) <= rhs`
//! is held as three term arrays: linear terms, quadratic variable terms (one
//! per variable appearing quadratically, carrying both the linear and the
//! square coefficient), and bilinear terms. Each quadratic variable term
//! keeps an adjacency list of indices into the bilinear array.
//!
//! Index validity: a position into any of the three arrays, and any bilinear
//! index held in an adjacency list, is valid only until the next structural
//! mutation or re-sort of the referenced array. Bulk removal compacts the
//! bilinear array and rewrites all adjacency lists through an old-to-new
//! index map in a single pass.

mod store;
mod substitute;

pub use store::QuadTermStore;
pub use substitute::{remove_fixed_variables, replace_quad_var};

use crate::model::VarId;

/// A linear term `coef * var`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTerm {
    /// Variable.
    pub var: VarId,

    /// Coefficient; never (persistently) zero.
    pub coef: f64,
}

/// Per-variable quadratic term `sqr_coef * var^2 + lin_coef * var`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadVarTerm {
    /// Variable.
    pub var: VarId,

    /// Coefficient of the linear part.
    pub lin_coef: f64,

    /// Coefficient of the square part.
    pub sqr_coef: f64,

    /// Indices of the bilinear terms this variable participates in.
    pub adjacency: Vec<usize>,
}

/// A bilinear term `coef * var1 * var2` with `var1 < var2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilinTerm {
    /// First variable (smaller id).
    pub var1: VarId,

    /// Second variable (larger id).
    pub var2: VarId,

    /// Coefficient.
    pub coef: f64,
}

impl BilinTerm {
    /// The partner of `var` in this term.
    ///
    /// `var` must be one of the two endpoints.
    pub fn other(&self, var: VarId) -> VarId {
        debug_assert!(var == self.var1 || var == self.var2);
        if var == self.var1 {
            self.var2
        } else {
            self.var1
        }
    }

    /// True if `var` is one of the two endpoints.
    pub fn involves(&self, var: VarId) -> bool {
        var == self.var1 || var == self.var2
    }
}
