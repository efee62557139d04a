//! Cut generation: linear under- and overestimators of the quadratic body.
//!
//! For a violated side on which the function is convex, the full gradient
//! linearization at the reference point gives a globally valid cut (with
//! square terms of fractionally-valued integer variables switched to the
//! secant between the neighboring integers, so the cut stays valid on the
//! integer domain). Otherwise each term is bounded individually: tangents
//! where the term already sides with the cut, secants and McCormick facets
//! where it does not; such cuts are valid only on the current bound box.

pub(crate) mod estimators;
mod rowprep;

use crate::curvature::CurvatureAnalyzer;
use crate::model::{QuadConstraint, VariableStore};
use crate::settings::QuadSettings;

use estimators::{
    bilinear_mccormick, bilinear_taylor, square_integer_secant, square_secant, square_tangent,
};
use rowprep::RowPrep;

/// Which constraint side a cut enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutSide {
    /// Enforce `lhs <= body`: the cut is an overestimator, `coefs x >= bound`.
    Lhs,

    /// Enforce `body <= rhs`: the cut is an underestimator, `coefs x <= bound`.
    Rhs,
}

/// A linear cut produced for one side of a quadratic constraint.
#[derive(Debug, Clone)]
pub struct QuadCut {
    /// Dense coefficient vector (length: number of variables).
    pub coefs: Vec<f64>,

    /// Cut bound: `coefs x <= bound` for [`CutSide::Rhs`],
    /// `coefs x >= bound` for [`CutSide::Lhs`].
    pub bound: f64,

    /// Enforced side.
    pub side: CutSide,

    /// Violation of the reference point, scaled by the largest
    /// coefficient magnitude.
    pub efficacy: f64,

    /// True if the cut is valid on the whole domain, not just the current
    /// bound box.
    pub globally_valid: bool,
}

impl QuadCut {
    /// Violation at a point (positive means violated).
    pub fn violation(&self, x: &[f64]) -> f64 {
        let activity: f64 = self.coefs.iter().zip(x.iter()).map(|(c, v)| c * v).sum();
        match self.side {
            CutSide::Rhs => activity - self.bound,
            CutSide::Lhs => self.bound - activity,
        }
    }

    /// True if the point violates the cut by more than `tol`.
    pub fn is_violated(&self, x: &[f64], tol: f64) -> bool {
        self.violation(x) > tol
    }
}

/// Statistics for cut generation.
#[derive(Debug, Default, Clone)]
pub struct CutStats {
    /// Cuts generated.
    pub cuts_generated: usize,

    /// Cuts abandoned (missing bounds, coefficient range, efficacy).
    pub cuts_rejected: usize,
}

/// Generator of linear cuts for quadratic constraints.
pub struct CutGenerator {
    settings: QuadSettings,
    analyzer: CurvatureAnalyzer,
    stats: CutStats,
}

impl CutGenerator {
    /// Create a generator with the default eigenvalue backend.
    pub fn new(settings: QuadSettings) -> Self {
        let analyzer = CurvatureAnalyzer::new(settings.curvature_tol);
        Self {
            settings,
            analyzer,
            stats: CutStats::default(),
        }
    }

    /// Create a generator with a custom curvature analyzer.
    pub fn with_analyzer(settings: QuadSettings, analyzer: CurvatureAnalyzer) -> Self {
        Self {
            settings,
            analyzer,
            stats: CutStats::default(),
        }
    }

    /// Generation statistics.
    pub fn stats(&self) -> &CutStats {
        &self.stats
    }

    /// Generate a cut for whichever side the reference point violates
    /// more, or `None` if the point is feasible.
    pub fn separate(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &dyn VariableStore,
        x_ref: &[f64],
    ) -> Option<QuadCut> {
        let (lhs_viol, rhs_viol) = cons.violation(x_ref);
        if lhs_viol <= self.settings.feas_tol && rhs_viol <= self.settings.feas_tol {
            return None;
        }
        let side = if rhs_viol >= lhs_viol {
            CutSide::Rhs
        } else {
            CutSide::Lhs
        };
        self.generate(cons, vars, x_ref, side)
    }

    /// Generate a cut enforcing the given side at the reference point.
    ///
    /// Returns `None` whenever a valid row cannot be built: a needed bound
    /// is missing, an intermediate value overflows, the coefficient range
    /// cannot be repaired, or the cut is not efficacious. A partially
    /// correct row is never returned.
    pub fn generate(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &dyn VariableStore,
        x_ref: &[f64],
        side: CutSide,
    ) -> Option<QuadCut> {
        let side_value = match side {
            CutSide::Rhs => cons.rhs(),
            CutSide::Lhs => cons.lhs(),
        };
        if self.settings.is_infinite(side_value) {
            return None;
        }

        let curvature = cons.curvature(&self.analyzer);
        let convex_side = match side {
            CutSide::Rhs => curvature.is_convex(),
            CutSide::Lhs => curvature.is_concave(),
        };
        let underestimate = side == CutSide::Rhs;

        let mut row = RowPrep::new(vars.num_vars(), side);

        for t in cons.terms().linear_terms() {
            row.add_coef(t.var, t.coef);
        }

        for t in cons.terms().quad_terms() {
            let bounds = vars.bounds(t.var);
            let ref_val = x_ref[t.var].min(bounds.sup).max(bounds.inf);
            row.add_coef(t.var, t.lin_coef);
            if t.sqr_coef == 0.0 {
                continue;
            }

            let fractional = vars.is_integral(t.var)
                && (ref_val - ref_val.round()).abs() > self.settings.int_feas_tol;

            let use_tangent = if convex_side {
                // Overall convexity on this side makes the full gradient
                // linearization valid term by term.
                true
            } else if underestimate {
                t.sqr_coef > 0.0
            } else {
                t.sqr_coef < 0.0
            };

            let est = if use_tangent {
                if fractional {
                    square_integer_secant(t.sqr_coef, ref_val)
                } else {
                    square_tangent(t.sqr_coef, ref_val)
                }
            } else {
                if bounds.inf.abs() >= self.settings.infinity
                    || bounds.sup.abs() >= self.settings.infinity
                {
                    self.stats.cuts_rejected += 1;
                    return None;
                }
                row.mark_local();
                square_secant(t.sqr_coef, bounds.inf, bounds.sup)
            };
            row.add_coef(t.var, est.coef);
            row.add_constant(est.constant);
        }

        for t in cons.terms().bilin_terms() {
            let xb = vars.bounds(t.var1);
            let yb = vars.bounds(t.var2);
            let xr = x_ref[t.var1].min(xb.sup).max(xb.inf);
            let yr = x_ref[t.var2].min(yb.sup).max(yb.inf);

            let est = if convex_side {
                bilinear_taylor(t.coef, xr, yr)
            } else {
                let Some(est) = bilinear_mccormick(
                    t.coef,
                    xb,
                    yb,
                    xr,
                    yr,
                    underestimate,
                    self.settings.infinity,
                ) else {
                    self.stats.cuts_rejected += 1;
                    return None;
                };
                row.mark_local();
                est
            };
            row.add_coef(t.var1, est.coef_x);
            row.add_coef(t.var2, est.coef_y);
            row.add_constant(est.constant);
        }

        if row.has_huge_values(self.settings.infinity) {
            self.stats.cuts_rejected += 1;
            return None;
        }
        if !row.cleanup_coef_range(vars, &self.settings) {
            self.stats.cuts_rejected += 1;
            return None;
        }

        let globally_valid = !row.is_local() && !cons.local;
        match row.into_cut(side_value, x_ref, globally_valid, &self.settings) {
            Some(cut) => {
                self.stats.cuts_generated += 1;
                log::debug!(
                    "quadratic cut: side {:?}, efficacy {:.3e}, global {}",
                    cut.side,
                    cut.efficacy,
                    cut.globally_valid
                );
                Some(cut)
            }
            None => {
                self.stats.cuts_rejected += 1;
                None
            }
        }
    }
}
