//! Quadrel: the numerical core of a quadratic constraint handler
//!
//! This library implements the four subsystems a branch-and-cut solver
//! needs to handle constraints of the form
//!
//! ```text
//! lhs <= sum(b_i x_i) + sum(q_j x_j^2 + l_j x_j) + sum(c_k x y) <= rhs
//! ```
//!
//! - **Term storage**: a sparse, incrementally editable representation of
//!   the linear, quadratic-variable, and bilinear terms, with adjacency
//!   indices linking each quadratic variable to its bilinear terms and
//!   lazily maintained sortedness/merge state.
//! - **Activity tracking**: event-driven min/max activity for the linear
//!   part and interval activity for the quadratic part, both with
//!   per-side infinity counting and directed rounding.
//! - **Bound propagation**: interval solves of the per-variable quadratic
//!   inclusion to tighten domains or prove infeasibility.
//! - **Cut generation**: gradient linearizations, secants, and McCormick
//!   envelopes producing valid linear cuts for an LP relaxation, with
//!   curvature decided by eigenvalue analysis of the Hessian.
//!
//! The surrounding solver stays outside: variables live behind the
//! [`VariableStore`] trait, bound changes flow back through
//! [`BoundObserver`], and generated cuts are plain coefficient rows the
//! host adds to its relaxation. Everything here is single-threaded and
//! invoked synchronously from the host's propagation/separation
//! callbacks.
//!
//! Directed rounding discipline: lower bounds and minimum activities are
//! always rounded down, upper bounds and maximum activities up. Results
//! are therefore never tighter than the exact values, which keeps every
//! deduced bound and every emitted cut sound.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activity;
pub mod branching;
pub mod curvature;
pub mod cuts;
pub mod error;
pub mod interval;
pub mod model;
pub mod propagate;
pub mod settings;
pub mod terms;
pub mod upgrade;

pub use activity::{LinearActivity, QuadActivity};
pub use branching::{branching_candidates, BranchCandidate};
pub use curvature::{Curvature, CurvatureAnalyzer, DenseEigenSolver, EigenSolver};
pub use cuts::{CutGenerator, CutSide, CutStats, QuadCut};
pub use error::{QuadError, QuadResult};
pub use interval::Interval;
pub use model::{
    BoundEvent, BoundKind, BoundObserver, EventBuffer, PresolveOutcome, QuadConstraint,
    Tightening, VarId, VarPool, VarStatus, VarType, VariableStore,
};
pub use propagate::{PropagationResult, PropagationStats, Propagator};
pub use settings::QuadSettings;
pub use terms::{BilinTerm, LinearTerm, QuadTermStore, QuadVarTerm};
pub use upgrade::{LinearUpgrade, UpgradeRegistry, UpgradeRule, UpgradedForm};
