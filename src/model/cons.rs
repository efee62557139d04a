//! The quadratic constraint body.
//!
//! Aggregates the term store, the sides, and the derived caches (linear and
//! quadratic activity, curvature). Every mutating call invalidates the
//! affected caches; readers must refresh before reading. A constraint body
//! is exclusively owned by its constraint; there is no sharing and no
//! rollback.

use crate::activity::{LinearActivity, QuadActivity};
use crate::curvature::{Curvature, CurvatureAnalyzer};
use crate::error::{QuadError, QuadResult};
use crate::interval::Interval;
use crate::settings::QuadSettings;
use crate::terms::{remove_fixed_variables, QuadTermStore};

use super::events::{BoundKind, BoundObserver};
use super::vars::{VarId, VariableStore};

/// Outcome of a presolve pass over one constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresolveOutcome {
    /// Nothing changed.
    Unchanged,

    /// Terms were merged or substituted.
    Reduced,

    /// All terms vanished; the constraint reduced to `lhs <= 0 <= rhs`.
    Empty {
        /// True if the remaining constant relation is violated.
        infeasible: bool,
    },
}

/// A quadratic constraint `lhs <= sum(terms) <= rhs`.
#[derive(Debug, Clone)]
pub struct QuadConstraint {
    lhs: f64,
    rhs: f64,
    terms: QuadTermStore,

    /// True if the constraint is only valid in the current subtree
    /// (e.g. it was derived from a branching decision).
    pub local: bool,

    lin_activity: LinearActivity,
    quad_activity: Option<QuadActivity>,
    curvature: Curvature,
    propagated: bool,
}

impl QuadConstraint {
    /// Create an empty constraint with the given sides.
    pub fn new(lhs: f64, rhs: f64) -> QuadResult<Self> {
        if lhs > rhs {
            return Err(QuadError::InvalidSides { lhs, rhs });
        }
        Ok(Self {
            lhs,
            rhs,
            terms: QuadTermStore::new(),
            local: false,
            lin_activity: LinearActivity::default(),
            quad_activity: None,
            curvature: Curvature::Unknown,
            propagated: false,
        })
    }

    /// Left-hand side.
    pub fn lhs(&self) -> f64 {
        self.lhs
    }

    /// Right-hand side.
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Read access to the term store.
    pub fn terms(&self) -> &QuadTermStore {
        &self.terms
    }

    /// Replace both sides.
    pub fn set_sides(&mut self, lhs: f64, rhs: f64) -> QuadResult<()> {
        if lhs > rhs {
            return Err(QuadError::InvalidSides { lhs, rhs });
        }
        self.lhs = lhs;
        self.rhs = rhs;
        self.lin_activity.invalidate();
        self.propagated = false;
        Ok(())
    }

    // === Term edits ===

    /// Add a linear term.
    pub fn add_linear(&mut self, var: VarId, coef: f64, settings: &QuadSettings) {
        self.terms.add_linear(var, coef, settings.zero_tol);
        self.lin_activity.invalidate();
        self.propagated = false;
    }

    /// Add a quadratic variable term, returning its position.
    pub fn add_quad_var(&mut self, var: VarId, lin_coef: f64, sqr_coef: f64) -> usize {
        self.invalidate_quadratic();
        self.terms.add_quad_var(var, lin_coef, sqr_coef)
    }

    /// Add a bilinear term between the quadratic variable terms at `pos1`
    /// and `pos2`.
    pub fn add_bilinear(&mut self, pos1: usize, pos2: usize, coef: f64) -> QuadResult<usize> {
        self.invalidate_quadratic();
        self.terms.add_bilinear(pos1, pos2, coef)
    }

    /// Remove a set of bilinear terms in one pass.
    pub fn remove_bilinear_set(&mut self, indices: &[usize]) {
        self.invalidate_quadratic();
        self.terms.remove_bilinear_set(indices);
    }

    /// Substitute `x = scale * new_var + offset` into the quadratic
    /// variable term at `pos`, moving the freed constant into the sides.
    pub fn replace_quad_var(
        &mut self,
        pos: usize,
        new_var: VarId,
        scale: f64,
        offset: f64,
        settings: &QuadSettings,
    ) {
        self.invalidate_quadratic();
        self.lin_activity.invalidate();
        let constant = crate::terms::replace_quad_var(
            &mut self.terms,
            pos,
            new_var,
            scale,
            offset,
            settings.zero_tol,
        );
        self.shift_sides(constant);
    }

    fn invalidate_quadratic(&mut self) {
        self.quad_activity = None;
        self.curvature = Curvature::Unknown;
        self.propagated = false;
    }

    // === Presolve ===

    /// Merge duplicate terms, substitute fixed and aggregated variables,
    /// and detect a vanished body.
    pub fn presolve(
        &mut self,
        vars: &dyn VariableStore,
        settings: &QuadSettings,
    ) -> QuadResult<PresolveOutcome> {
        let was_merged = self.terms.is_merged();
        self.terms.merge(vars, settings.zero_tol);

        let (constant, substituted) =
            remove_fixed_variables(&mut self.terms, vars, settings.zero_tol)?;
        if substituted {
            self.shift_sides(constant);
            self.terms.merge(vars, settings.zero_tol);
        }

        let changed = substituted || !was_merged;
        if changed {
            self.lin_activity.invalidate();
            self.invalidate_quadratic();
        }

        if self.terms.is_empty() {
            let infeasible = self.lhs > settings.feas_tol || self.rhs < -settings.feas_tol;
            return Ok(PresolveOutcome::Empty { infeasible });
        }
        Ok(if changed {
            PresolveOutcome::Reduced
        } else {
            PresolveOutcome::Unchanged
        })
    }

    /// Move a constant out of the term sum into the sides.
    pub(crate) fn shift_sides(&mut self, constant: f64) {
        if constant == 0.0 {
            return;
        }
        if self.lhs > f64::NEG_INFINITY {
            self.lhs -= constant;
        }
        if self.rhs < f64::INFINITY {
            self.rhs -= constant;
        }
    }

    // === Caches ===

    /// Refresh the linear and quadratic activity caches.
    pub fn refresh_activity(&mut self, vars: &dyn VariableStore, settings: &QuadSettings) {
        self.lin_activity
            .update(self.terms.linear_terms(), vars, self.lhs, self.rhs, settings);
        if self.quad_activity.is_none() {
            self.quad_activity = Some(QuadActivity::compute(&self.terms, vars, settings));
        }
    }

    /// Linear activity; panics if the cache is stale.
    pub fn lin_activity(&self) -> &LinearActivity {
        assert!(
            self.lin_activity.is_valid(),
            "linear activity read without refresh"
        );
        &self.lin_activity
    }

    /// Quadratic activity; panics if the cache is stale.
    pub fn quad_activity(&self) -> &QuadActivity {
        self.quad_activity
            .as_ref()
            .expect("quadratic activity read without refresh")
    }

    /// Combined activity interval of the whole body.
    pub fn activity(&self) -> Interval {
        self.lin_activity().outer().add(self.quad_activity().outer())
    }

    /// Curvature of the quadratic part, computed on first use and cached
    /// until a coefficient changes.
    pub fn curvature(&mut self, analyzer: &CurvatureAnalyzer) -> Curvature {
        if self.curvature == Curvature::Unknown {
            self.curvature = analyzer.classify(&self.terms);
        }
        self.curvature
    }

    /// True if no propagation-relevant change happened since the last
    /// completed propagation.
    pub fn is_propagated(&self) -> bool {
        self.propagated
    }

    /// Mark the constraint as propagated.
    pub fn set_propagated(&mut self) {
        self.propagated = true;
    }

    // === Checking ===

    /// Violation of the two sides at a point: `(lhs - g(x), g(x) - rhs)`,
    /// each clipped at zero.
    pub fn violation(&self, x: &[f64]) -> (f64, f64) {
        let val = self.terms.eval(x);
        let lhs_viol = if self.lhs > f64::NEG_INFINITY {
            (self.lhs - val).max(0.0)
        } else {
            0.0
        };
        let rhs_viol = if self.rhs < f64::INFINITY {
            (val - self.rhs).max(0.0)
        } else {
            0.0
        };
        (lhs_viol, rhs_viol)
    }

    /// True if the point satisfies both sides within tolerance.
    pub fn is_feasible(&self, x: &[f64], feas_tol: f64) -> bool {
        let (l, r) = self.violation(x);
        l <= feas_tol && r <= feas_tol
    }
}

impl BoundObserver for QuadConstraint {
    fn on_bound_changed(&mut self, var: VarId, kind: BoundKind, old: f64, new: f64) {
        // Incremental update of the linear side; one call per matching term
        // because duplicates may exist transiently.
        let coefs: Vec<f64> = self
            .terms
            .linear_terms()
            .iter()
            .filter(|t| t.var == var)
            .map(|t| t.coef)
            .collect();
        for coef in coefs {
            self.lin_activity.on_bound_changed(coef, kind, old, new);
        }

        // The quadratic activity is interval-based and recomputed on
        // demand; any bound move on a participating variable makes it
        // stale.
        let in_quad = self.terms.quad_terms().iter().any(|t| t.var == var)
            || self.terms.bilin_terms().iter().any(|t| t.involves(var));
        if in_quad {
            self.quad_activity = None;
        }

        self.propagated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VarPool, VarType};

    #[test]
    fn test_invalid_sides_rejected() {
        assert!(matches!(
            QuadConstraint::new(2.0, 1.0),
            Err(QuadError::InvalidSides { .. })
        ));
    }

    #[test]
    fn test_violation() {
        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 4.0).unwrap();
        let settings = QuadSettings::default();
        cons.add_linear(0, 1.0, &settings);
        let p = cons.add_quad_var(1, 0.0, 1.0);
        let _ = p;

        // x0 + x1^2 <= 4 at (1, 2): value 5, violation 1.
        let (l, r) = cons.violation(&[1.0, 2.0]);
        assert_eq!(l, 0.0);
        assert!((r - 1.0).abs() < 1e-12);
        assert!(!cons.is_feasible(&[1.0, 2.0], 1e-6));
        assert!(cons.is_feasible(&[1.0, 1.0], 1e-6));
    }

    #[test]
    fn test_presolve_empty_detection() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 1.0, VarType::Continuous);
        pool.fix(x, 3.0);

        let settings = QuadSettings::default();

        // 2x <= 4 with x fixed to 3: reduces to 6 <= 4, infeasible.
        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 4.0).unwrap();
        cons.add_linear(x, 2.0, &settings);
        let outcome = cons.presolve(&pool, &settings).unwrap();
        assert_eq!(outcome, PresolveOutcome::Empty { infeasible: true });

        // 2x <= 8 with x fixed to 3: reduces to 6 <= 8, redundant.
        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 8.0).unwrap();
        cons.add_linear(x, 2.0, &settings);
        let outcome = cons.presolve(&pool, &settings).unwrap();
        assert_eq!(outcome, PresolveOutcome::Empty { infeasible: false });
    }

    #[test]
    fn test_bound_event_invalidates_quad_activity() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 2.0, VarType::Continuous);
        let settings = QuadSettings::default();

        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 4.0).unwrap();
        cons.add_quad_var(x, 0.0, 1.0);
        cons.refresh_activity(&pool, &settings);
        let before = cons.quad_activity().outer();
        assert!((before.sup - 4.0).abs() < 1e-9);

        pool.tighten_upper(x, 1.0, &mut cons);
        cons.refresh_activity(&pool, &settings);
        let after = cons.quad_activity().outer();
        assert!((after.sup - 1.0).abs() < 1e-9);
    }
}
