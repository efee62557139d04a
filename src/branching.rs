//! Branching candidate scoring for nonconvex constraints.
//!
//! When a constraint is violated on a side where it is not convex, cuts
//! alone cannot close the gap; the host branches on one of the quadratic
//! variables. The score of a candidate is the gap between its terms and
//! the tightest linear envelope available at the reference point: the
//! bigger the envelope error, the more branching on that variable can
//! improve the relaxation. Variables with unbounded domains score an
//! infinite gap, since no envelope exists for them at all.

use std::collections::HashMap;

use crate::curvature::CurvatureAnalyzer;
use crate::cuts::estimators::bilinear_mccormick;
use crate::model::{QuadConstraint, VarId, VariableStore};
use crate::settings::QuadSettings;

/// A scored branching candidate.
#[derive(Debug, Clone, Copy)]
pub struct BranchCandidate {
    /// Variable to branch on.
    pub var: VarId,

    /// Envelope gap at the reference point (may be infinite).
    pub gap: f64,
}

/// Score the quadratic variables of a violated nonconvex constraint.
///
/// Returns candidates sorted by decreasing gap; empty if the constraint is
/// satisfied at the reference point or convex on every violated side.
pub fn branching_candidates(
    cons: &mut QuadConstraint,
    vars: &dyn VariableStore,
    analyzer: &CurvatureAnalyzer,
    x_ref: &[f64],
    settings: &QuadSettings,
) -> Vec<BranchCandidate> {
    let (lhs_viol, rhs_viol) = cons.violation(x_ref);
    let curvature = cons.curvature(analyzer);

    let mut sides = Vec::new();
    if rhs_viol > settings.feas_tol && !curvature.is_convex() {
        sides.push(true); // need underestimators
    }
    if lhs_viol > settings.feas_tol && !curvature.is_concave() {
        sides.push(false); // need overestimators
    }
    if sides.is_empty() {
        return Vec::new();
    }

    let mut gaps: HashMap<VarId, f64> = HashMap::new();
    let mut bump = |var: VarId, gap: f64| {
        let entry = gaps.entry(var).or_insert(0.0);
        *entry += gap;
    };

    for &underestimate in &sides {
        for t in cons.terms().quad_terms() {
            let wrong_siding = if underestimate {
                t.sqr_coef < 0.0
            } else {
                t.sqr_coef > 0.0
            };
            if !wrong_siding {
                continue;
            }
            let bounds = vars.bounds(t.var);
            if bounds.inf.abs() >= settings.infinity || bounds.sup.abs() >= settings.infinity {
                bump(t.var, f64::INFINITY);
                continue;
            }
            let xr = x_ref[t.var].min(bounds.sup).max(bounds.inf);
            // Secant error of the square term at the reference.
            let gap = (t.sqr_coef * (xr - bounds.inf) * (xr - bounds.sup)).abs();
            bump(t.var, gap);
        }

        for t in cons.terms().bilin_terms() {
            let xb = vars.bounds(t.var1);
            let yb = vars.bounds(t.var2);
            let xr = x_ref[t.var1].min(xb.sup).max(xb.inf);
            let yr = x_ref[t.var2].min(yb.sup).max(yb.inf);

            let gap = match bilinear_mccormick(
                t.coef,
                xb,
                yb,
                xr,
                yr,
                underestimate,
                settings.infinity,
            ) {
                Some(est) => {
                    let term = t.coef * xr * yr;
                    let envelope = est.coef_x * xr + est.coef_y * yr + est.constant;
                    (term - envelope).abs()
                }
                None => f64::INFINITY,
            };
            // The envelope error is attributed to both endpoints.
            bump(t.var1, 0.5 * gap);
            bump(t.var2, 0.5 * gap);
        }
    }

    let mut candidates: Vec<BranchCandidate> = gaps
        .into_iter()
        .filter(|&(_, gap)| gap > settings.feas_tol)
        .map(|(var, gap)| BranchCandidate { var, gap })
        .collect();
    candidates.sort_by(|a, b| b.gap.partial_cmp(&a.gap).unwrap());
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VarPool, VarType};

    #[test]
    fn test_no_candidates_for_feasible_point() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 2.0, VarType::Continuous);
        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 4.0).unwrap();
        cons.add_quad_var(x, 0.0, 1.0);

        let settings = QuadSettings::default();
        let analyzer = CurvatureAnalyzer::new(settings.curvature_tol);
        let cands = branching_candidates(&mut cons, &pool, &analyzer, &[1.0], &settings);
        assert!(cands.is_empty());
    }

    #[test]
    fn test_no_candidates_for_convex_violation() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 5.0, VarType::Continuous);
        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 1.0).unwrap();
        cons.add_quad_var(x, 0.0, 1.0);

        // Violated but convex on the rhs: cuts suffice, no branching.
        let settings = QuadSettings::default();
        let analyzer = CurvatureAnalyzer::new(settings.curvature_tol);
        let cands = branching_candidates(&mut cons, &pool, &analyzer, &[3.0], &settings);
        assert!(cands.is_empty());
    }

    #[test]
    fn test_bilinear_violation_scores_both_endpoints() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 2.0, VarType::Continuous);
        let y = pool.add_var(0.0, 2.0, VarType::Continuous);
        let mut cons = QuadConstraint::new(f64::NEG_INFINITY, 1.0).unwrap();
        let px = cons.add_quad_var(x, 0.0, 0.0);
        let py = cons.add_quad_var(y, 0.0, 0.0);
        cons.add_bilinear(px, py, 1.0).unwrap();

        let settings = QuadSettings::default();
        let analyzer = CurvatureAnalyzer::new(settings.curvature_tol);
        // (1.5, 1.5): product 2.25 > 1, McCormick envelope at that point
        // gives 2(x + y) - 4 = 2, gap 0.25 split across x and y.
        let cands =
            branching_candidates(&mut cons, &pool, &analyzer, &[1.5, 1.5], &settings);
        assert_eq!(cands.len(), 2);
        assert!((cands[0].gap - 0.125).abs() < 1e-9);
        assert!((cands[1].gap - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_unbounded_variable_scores_infinite() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 2.0, VarType::Continuous);
        let y = pool.add_var(f64::NEG_INFINITY, f64::INFINITY, VarType::Continuous);
        let mut cons = QuadConstraint::new(0.5, f64::INFINITY).unwrap();
        let px = cons.add_quad_var(x, 0.0, 0.0);
        let py = cons.add_quad_var(y, 0.0, 0.0);
        cons.add_bilinear(px, py, 1.0).unwrap();

        // 0.5 <= x*y violated at (0, 0); y unbounded: infinite gap, and it
        // sorts first.
        let settings = QuadSettings::default();
        let analyzer = CurvatureAnalyzer::new(settings.curvature_tol);
        let cands =
            branching_candidates(&mut cons, &pool, &analyzer, &[0.0, 0.0], &settings);
        assert!(!cands.is_empty());
        assert_eq!(cands[0].gap, f64::INFINITY);
    }
}
