//! Incremental activity bounds for the linear part and on-demand interval
//! activity for the quadratic part of a constraint.
//!
//! The linear activity is event-driven: a single bound change adjusts the
//! running sums in O(1), with directed rounding applied per adjustment so
//! the result is never tighter than a full recomputation. Terms whose
//! relevant bound is unbounded are tracked through per-side infinity
//! counters; once a counter is positive the numeric sum for that side is
//! meaningless and consumers must treat the side as unbounded.
//!
//! The quadratic activity is recomputed on demand as a sum of per-term
//! interval contributions, which are cached so that residual activities
//! (total minus one variable's own terms) come out of a subtraction instead
//! of a rescan. Unbounded contributions enter the aggregate as a finite
//! soft-infinity sentinel (see [`QuadSettings::soft_infinity`]); the
//! counters carry the real unboundedness.

use crate::interval::{add_down, add_up, mul_down, mul_up, quad_range, sub_down, sub_up, Interval};
use crate::model::{BoundKind, VariableStore};
use crate::settings::QuadSettings;
use crate::terms::{LinearTerm, QuadTermStore, QuadVarTerm};

fn is_unbounded(bound: f64, infinity: f64) -> bool {
    bound.abs() >= infinity
}

/// Min/max activity of the linear term sum.
#[derive(Debug, Clone, Default)]
pub struct LinearActivity {
    /// Finite-part running sum for the minimum activity (rounded down).
    pub min: f64,

    /// Finite-part running sum for the maximum activity (rounded up).
    pub max: f64,

    /// Terms whose relevant bound makes the minimum unbounded.
    pub min_inf_count: u32,

    /// Terms whose relevant bound makes the maximum unbounded.
    pub max_inf_count: u32,

    min_tracked: bool,
    max_tracked: bool,
    valid: bool,

    /// Practical infinity threshold captured at the last update, so that
    /// incremental adjustments classify bounds the same way the full
    /// recomputation did.
    infinity: f64,
}

impl LinearActivity {
    /// Drop the cache; the next [`Self::update`] recomputes from scratch.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// True if the cache can be read without an update.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Recompute the activity sums unless the cache is present and
    /// internally consistent.
    ///
    /// The minimum is only maintained while `rhs` is finite and the
    /// maximum only while `lhs` is finite; the untracked side is pinned to
    /// the corresponding infinity.
    pub fn update(
        &mut self,
        terms: &[LinearTerm],
        vars: &dyn VariableStore,
        lhs: f64,
        rhs: f64,
        settings: &QuadSettings,
    ) {
        let min_tracked = !is_unbounded(rhs, settings.infinity);
        let max_tracked = !is_unbounded(lhs, settings.infinity);

        if self.valid && self.min_tracked == min_tracked && self.max_tracked == max_tracked {
            let consistent = self.min_inf_count > 0
                || self.max_inf_count > 0
                || !self.min_tracked
                || !self.max_tracked
                || self.min <= self.max + 1e-9 * (1.0 + self.max.abs());
            if consistent {
                return;
            }
        }

        self.min = 0.0;
        self.max = 0.0;
        self.min_inf_count = 0;
        self.max_inf_count = 0;
        self.min_tracked = min_tracked;
        self.max_tracked = max_tracked;
        self.infinity = settings.infinity;

        for t in terms {
            let bounds = vars.bounds(t.var);
            if min_tracked {
                let bound = if t.coef > 0.0 { bounds.inf } else { bounds.sup };
                if is_unbounded(bound, settings.infinity) {
                    self.min_inf_count += 1;
                } else {
                    self.min = add_down(self.min, mul_down(t.coef, bound));
                }
            }
            if max_tracked {
                let bound = if t.coef > 0.0 { bounds.sup } else { bounds.inf };
                if is_unbounded(bound, settings.infinity) {
                    self.max_inf_count += 1;
                } else {
                    self.max = add_up(self.max, mul_up(t.coef, bound));
                }
            }
        }
        self.valid = true;
    }

    /// O(1) adjustment for one bound change of a linear term with
    /// coefficient `coef`.
    ///
    /// Only the side that the changed bound feeds is touched: the lower
    /// bound feeds the minimum for positive coefficients and the maximum
    /// for negative ones, and vice versa for the upper bound.
    pub fn on_bound_changed(&mut self, coef: f64, kind: BoundKind, old: f64, new: f64) {
        if !self.valid {
            return;
        }
        let feeds_min = match kind {
            BoundKind::Lower => coef > 0.0,
            BoundKind::Upper => coef < 0.0,
        };
        if feeds_min {
            if !self.min_tracked {
                return;
            }
            let old_inf = is_unbounded(old, self.infinity);
            let new_inf = is_unbounded(new, self.infinity);
            match (old_inf, new_inf) {
                (true, true) => {}
                (true, false) => {
                    self.min_inf_count -= 1;
                    self.min = add_down(self.min, mul_down(coef, new));
                }
                (false, true) => {
                    self.min_inf_count += 1;
                    self.min = sub_down(self.min, mul_down(coef, old));
                }
                (false, false) => {
                    self.min = add_down(sub_down(self.min, mul_down(coef, old)), mul_down(coef, new));
                }
            }
        } else {
            if !self.max_tracked {
                return;
            }
            let old_inf = is_unbounded(old, self.infinity);
            let new_inf = is_unbounded(new, self.infinity);
            match (old_inf, new_inf) {
                (true, true) => {}
                (true, false) => {
                    self.max_inf_count -= 1;
                    self.max = add_up(self.max, mul_up(coef, new));
                }
                (false, true) => {
                    self.max_inf_count += 1;
                    self.max = sub_up(self.max, mul_up(coef, old));
                }
                (false, false) => {
                    self.max = add_up(sub_up(self.max, mul_up(coef, old)), mul_up(coef, new));
                }
            }
        }
    }

    /// Minimum activity for consumers: the tracked finite sum, or -inf.
    pub fn min_activity(&self) -> f64 {
        if !self.min_tracked || self.min_inf_count > 0 {
            f64::NEG_INFINITY
        } else {
            self.min
        }
    }

    /// Maximum activity for consumers: the tracked finite sum, or +inf.
    pub fn max_activity(&self) -> f64 {
        if !self.max_tracked || self.max_inf_count > 0 {
            f64::INFINITY
        } else {
            self.max
        }
    }

    /// Activity interval as seen by consumers.
    pub fn outer(&self) -> Interval {
        Interval::new(self.min_activity(), self.max_activity())
    }

    /// Minimum activity of all terms except one with coefficient `coef`
    /// and domain `bounds`.
    ///
    /// When exactly one term makes the minimum unbounded and it is the
    /// excluded one, the finite sum is the residual; with any other
    /// unbounded contributor no finite residual exists.
    pub fn residual_min(&self, coef: f64, bounds: Interval, settings: &QuadSettings) -> f64 {
        if !self.min_tracked {
            return f64::NEG_INFINITY;
        }
        let bound = if coef > 0.0 { bounds.inf } else { bounds.sup };
        if is_unbounded(bound, settings.infinity) {
            if self.min_inf_count == 1 {
                self.min
            } else {
                f64::NEG_INFINITY
            }
        } else if self.min_inf_count > 0 {
            f64::NEG_INFINITY
        } else {
            sub_down(self.min, mul_down(coef, bound))
        }
    }

    /// Maximum-side counterpart of [`Self::residual_min`].
    pub fn residual_max(&self, coef: f64, bounds: Interval, settings: &QuadSettings) -> f64 {
        if !self.max_tracked {
            return f64::INFINITY;
        }
        let bound = if coef > 0.0 { bounds.sup } else { bounds.inf };
        if is_unbounded(bound, settings.infinity) {
            if self.max_inf_count == 1 {
                self.max
            } else {
                f64::INFINITY
            }
        } else if self.max_inf_count > 0 {
            f64::INFINITY
        } else {
            sub_up(self.max, mul_up(coef, bound))
        }
    }
}

/// Interval activity of the quadratic part, with cached per-term
/// contributions.
#[derive(Debug, Clone)]
pub struct QuadActivity {
    /// Aggregate contribution sum; unbounded contributions enter as the
    /// soft-infinity sentinel.
    pub sum: Interval,

    /// Contributions whose lower end is unbounded.
    pub min_inf_count: u32,

    /// Contributions whose upper end is unbounded.
    pub max_inf_count: u32,

    /// Per quadratic-variable-term contribution `sqr x^2 + lin x`.
    pub var_contribs: Vec<Interval>,

    /// Per bilinear-term contribution `coef x y`.
    pub bilin_contribs: Vec<Interval>,
}

impl QuadActivity {
    /// Compute the quadratic activity from current bounds.
    pub fn compute(
        store: &QuadTermStore,
        vars: &dyn VariableStore,
        settings: &QuadSettings,
    ) -> Self {
        let soft = settings.soft_infinity();
        let mut act = Self {
            sum: Interval::point(0.0),
            min_inf_count: 0,
            max_inf_count: 0,
            var_contribs: Vec::with_capacity(store.quad_terms().len()),
            bilin_contribs: Vec::with_capacity(store.bilin_terms().len()),
        };

        for t in store.quad_terms() {
            let bounds = vars.bounds(t.var).unbounded_if_huge(settings.infinity);
            let contrib = quad_range(t.sqr_coef, Interval::point(t.lin_coef), bounds)
                .unbounded_if_huge(settings.infinity);
            act.accumulate(contrib, soft);
            act.var_contribs.push(contrib);
        }
        for t in store.bilin_terms() {
            let b1 = vars.bounds(t.var1).unbounded_if_huge(settings.infinity);
            let b2 = vars.bounds(t.var2).unbounded_if_huge(settings.infinity);
            let contrib = b1
                .mul(b2)
                .mul_scalar(t.coef)
                .unbounded_if_huge(settings.infinity);
            act.accumulate(contrib, soft);
            act.bilin_contribs.push(contrib);
        }
        act
    }

    fn accumulate(&mut self, contrib: Interval, soft: f64) {
        if contrib.inf == f64::NEG_INFINITY {
            self.min_inf_count += 1;
            self.sum.inf = add_down(self.sum.inf, -soft);
        } else {
            self.sum.inf = add_down(self.sum.inf, contrib.inf);
        }
        if contrib.sup == f64::INFINITY {
            self.max_inf_count += 1;
            self.sum.sup = add_up(self.sum.sup, soft);
        } else {
            self.sum.sup = add_up(self.sum.sup, contrib.sup);
        }
    }

    /// Activity interval as seen by consumers: any counted side is a true
    /// infinity.
    pub fn outer(&self) -> Interval {
        Interval::new(
            if self.min_inf_count > 0 {
                f64::NEG_INFINITY
            } else {
                self.sum.inf
            },
            if self.max_inf_count > 0 {
                f64::INFINITY
            } else {
                self.sum.sup
            },
        )
    }

    /// Activity of everything except the quadratic variable term at
    /// `pos` and its adjacent bilinear terms.
    ///
    /// Sides on which an unbounded contribution remains after the
    /// exclusion are true infinities; in particular the residual is finite
    /// when the excluded variable alone is responsible for the
    /// unboundedness.
    pub fn residual_for_var(
        &self,
        term: &QuadVarTerm,
        pos: usize,
        settings: &QuadSettings,
    ) -> Interval {
        let soft = settings.soft_infinity();
        let mut inf = self.sum.inf;
        let mut sup = self.sum.sup;
        let mut min_infs = self.min_inf_count;
        let mut max_infs = self.max_inf_count;

        let mut exclude = |c: Interval, inf: &mut f64, sup: &mut f64, min_infs: &mut u32, max_infs: &mut u32| {
            if c.inf == f64::NEG_INFINITY {
                *min_infs -= 1;
                *inf = sub_down(*inf, -soft);
            } else {
                *inf = sub_down(*inf, c.inf);
            }
            if c.sup == f64::INFINITY {
                *max_infs -= 1;
                *sup = sub_up(*sup, soft);
            } else {
                *sup = sub_up(*sup, c.sup);
            }
        };

        exclude(self.var_contribs[pos], &mut inf, &mut sup, &mut min_infs, &mut max_infs);
        for &t in &term.adjacency {
            exclude(self.bilin_contribs[t], &mut inf, &mut sup, &mut min_infs, &mut max_infs);
        }

        Interval::new(
            if min_infs > 0 { f64::NEG_INFINITY } else { inf },
            if max_infs > 0 { f64::INFINITY } else { sup },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VarPool, VarType, VariableStore};

    fn settings() -> QuadSettings {
        QuadSettings::default()
    }

    #[test]
    fn test_linear_activity_basic() {
        let mut pool = VarPool::default();
        let x = pool.add_var(1.0, 2.0, VarType::Continuous);
        let y = pool.add_var(-1.0, 3.0, VarType::Continuous);
        let terms = vec![
            LinearTerm { var: x, coef: 2.0 },
            LinearTerm { var: y, coef: -1.0 },
        ];

        let mut act = LinearActivity::default();
        act.update(&terms, &pool, 0.0, 10.0, &settings());

        // min = 2*1 - 3 = -1, max = 2*2 + 1 = 5
        assert!((act.min_activity() - (-1.0)).abs() < 1e-9);
        assert!((act.max_activity() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_activity_infinity_counting() {
        let mut pool = VarPool::default();
        let x = pool.add_var(f64::NEG_INFINITY, 2.0, VarType::Continuous);
        let y = pool.add_var(0.0, 1.0, VarType::Continuous);
        let terms = vec![
            LinearTerm { var: x, coef: 1.0 },
            LinearTerm { var: y, coef: 1.0 },
        ];

        let mut act = LinearActivity::default();
        act.update(&terms, &pool, 0.0, 10.0, &settings());

        assert_eq!(act.min_inf_count, 1);
        assert_eq!(act.min_activity(), f64::NEG_INFINITY);
        assert!((act.max_activity() - 3.0).abs() < 1e-9);

        // x alone is responsible: residual over the rest is finite.
        let r = act.residual_min(1.0, pool.bounds(x), &settings());
        assert!((r - 0.0).abs() < 1e-9);
        // ... but excluding y still leaves the unbounded x.
        let r = act.residual_min(1.0, pool.bounds(y), &settings());
        assert_eq!(r, f64::NEG_INFINITY);
    }

    #[test]
    fn test_incremental_matches_recompute() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 4.0, VarType::Continuous);
        let y = pool.add_var(-2.0, 2.0, VarType::Continuous);
        let z = pool.add_var(f64::NEG_INFINITY, f64::INFINITY, VarType::Continuous);
        let terms = vec![
            LinearTerm { var: x, coef: 1.5 },
            LinearTerm { var: y, coef: -2.0 },
            LinearTerm { var: z, coef: 0.5 },
        ];
        let s = settings();

        let mut act = LinearActivity::default();
        act.update(&terms, &pool, -5.0, 5.0, &s);

        // Apply a series of bound changes both incrementally and by
        // recomputation.
        let changes: Vec<(usize, BoundKind, f64)> = vec![
            (0, BoundKind::Lower, 1.0),
            (2, BoundKind::Lower, -3.0),
            (1, BoundKind::Upper, 0.5),
            (2, BoundKind::Upper, 7.0),
            (0, BoundKind::Upper, 3.0),
        ];

        for (vi, kind, val) in changes {
            let var = [x, y, z][vi];
            let coef = terms[vi].coef;
            let old = match kind {
                BoundKind::Lower => pool.lower_bound(var),
                BoundKind::Upper => pool.upper_bound(var),
            };
            match kind {
                BoundKind::Lower => {
                    pool.tighten_lower(var, val, &mut ());
                }
                BoundKind::Upper => {
                    pool.tighten_upper(var, val, &mut ());
                }
            }
            let new = match kind {
                BoundKind::Lower => pool.lower_bound(var),
                BoundKind::Upper => pool.upper_bound(var),
            };
            if old != new {
                act.on_bound_changed(coef, kind, old, new);
            }
        }

        let mut fresh = LinearActivity::default();
        fresh.update(&terms, &pool, -5.0, 5.0, &s);

        assert_eq!(act.min_inf_count, fresh.min_inf_count);
        assert_eq!(act.max_inf_count, fresh.max_inf_count);
        assert!((act.min_activity() - fresh.min_activity()).abs() < 1e-9);
        assert!((act.max_activity() - fresh.max_activity()).abs() < 1e-9);

        // The incremental sums are never tighter than the recomputation.
        assert!(act.min_activity() <= fresh.min_activity() + 1e-12);
        assert!(act.max_activity() >= fresh.max_activity() - 1e-12);
    }

    #[test]
    fn test_quad_activity_square_term() {
        let mut pool = VarPool::default();
        let x = pool.add_var(-1.0, 2.0, VarType::Continuous);
        let mut store = QuadTermStore::new();
        store.add_quad_var(x, 0.0, 1.0);

        let act = QuadActivity::compute(&store, &pool, &settings());
        // x^2 over [-1, 2] is [0, 4].
        assert!(act.outer().inf <= 0.0 && act.outer().inf > -1e-9);
        assert!((act.outer().sup - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_quad_activity_unbounded_term_counted() {
        let mut pool = VarPool::default();
        let x = pool.add_var(f64::NEG_INFINITY, f64::INFINITY, VarType::Continuous);
        let y = pool.add_var(0.0, 1.0, VarType::Continuous);
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(x, 1.0, 0.0); // just "x", unbounded both ways
        store.add_quad_var(y, 0.0, 1.0);
        let _ = px;

        let act = QuadActivity::compute(&store, &pool, &settings());
        assert_eq!(act.min_inf_count, 1);
        assert_eq!(act.max_inf_count, 1);
        assert_eq!(act.outer().inf, f64::NEG_INFINITY);
        assert_eq!(act.outer().sup, f64::INFINITY);

        // Residual for x excludes the only unbounded contribution.
        let term = store.quad_terms()[0].clone();
        let r = act.residual_for_var(&term, 0, &settings());
        assert!(r.inf.is_finite() && r.sup.is_finite());
        assert!(r.inf <= 0.0 && r.sup >= 1.0 - 1e-9);
    }

    #[test]
    fn test_quad_activity_bilinear_contribution() {
        let mut pool = VarPool::default();
        let x = pool.add_var(0.0, 2.0, VarType::Continuous);
        let y = pool.add_var(-1.0, 1.0, VarType::Continuous);
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(x, 0.0, 0.0);
        let py = store.add_quad_var(y, 0.0, 0.0);
        store.add_bilinear(px, py, 3.0).unwrap();

        let act = QuadActivity::compute(&store, &pool, &settings());
        // 3xy over [0,2] x [-1,1] is [-6, 6].
        assert!((act.outer().inf - (-6.0)).abs() < 1e-9);
        assert!((act.outer().sup - 6.0).abs() < 1e-9);
    }
}
