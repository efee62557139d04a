//! Bound propagation for quadratic constraints.
//!
//! Each round refreshes the activity caches, checks the constraint for
//! redundancy and infeasibility against its sides, then tightens variable
//! domains: linear variables against the residual activity, quadratic
//! variables by solving the per-variable quadratic inclusion with the
//! bilinear neighbors absorbed into an interval coefficient. Rounds repeat
//! until a fixed point, a configured round limit, or a cutoff.
//!
//! A cutoff aborts the round immediately; bound tightenings applied before
//! the cutoff stay in place (they are sound regardless), so no rollback
//! happens.

use crate::interval::{add_down, add_up, quad_range, solve_quadratic, sub_down, sub_up, Interval};
use crate::model::{BoundObserver, EventBuffer, QuadConstraint, VarId, VariableStore};
use crate::settings::QuadSettings;

/// Result of a propagation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationResult {
    /// Nothing to do: no relevant change since the last propagation.
    DidNotRun,

    /// Ran to a fixed point without changing any bound.
    Unchanged,

    /// At least one bound was tightened.
    Reduced,

    /// The constraint is infeasible on the current domains.
    Cutoff,
}

/// Statistics for the propagator.
#[derive(Debug, Default, Clone)]
pub struct PropagationStats {
    /// Propagation rounds executed.
    pub rounds: usize,

    /// Bounds tightened.
    pub tightenings: usize,

    /// Cutoffs detected.
    pub cutoffs: usize,

    /// Constraints found redundant on their domains.
    pub redundant: usize,
}

enum RoundOutcome {
    Unchanged,
    Reduced,
    Redundant,
    Cutoff,
}

/// Domain propagator for quadratic constraints.
pub struct Propagator {
    settings: QuadSettings,
    stats: PropagationStats,
}

impl Propagator {
    /// Create a propagator.
    pub fn new(settings: QuadSettings) -> Self {
        Self {
            settings,
            stats: PropagationStats::default(),
        }
    }

    /// Propagation statistics.
    pub fn stats(&self) -> &PropagationStats {
        &self.stats
    }

    /// Propagate one constraint to a fixed point (bounded by the round
    /// limit).
    pub fn propagate(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &mut dyn VariableStore,
    ) -> PropagationResult {
        if cons.is_propagated() {
            return PropagationResult::DidNotRun;
        }

        let mut overall = PropagationResult::Unchanged;
        for _ in 0..self.settings.max_prop_rounds.max(1) {
            self.stats.rounds += 1;
            match self.propagate_round(cons, vars) {
                RoundOutcome::Cutoff => {
                    self.stats.cutoffs += 1;
                    log::debug!("quadratic propagation: cutoff");
                    return PropagationResult::Cutoff;
                }
                RoundOutcome::Reduced => {
                    overall = PropagationResult::Reduced;
                }
                RoundOutcome::Redundant => {
                    self.stats.redundant += 1;
                    break;
                }
                RoundOutcome::Unchanged => break,
            }
        }

        cons.set_propagated();
        if overall == PropagationResult::Reduced {
            log::debug!(
                "quadratic propagation: reduced ({} tightenings total)",
                self.stats.tightenings
            );
        }
        overall
    }

    fn propagate_round(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &mut dyn VariableStore,
    ) -> RoundOutcome {
        cons.refresh_activity(vars, &self.settings);

        let feas = self.settings.feas_tol;
        let activity = cons.activity();
        let sides = Interval::new(cons.lhs(), cons.rhs());

        // Disjoint activity and sides: infeasible.
        if activity.inf > cons.rhs() + feas || activity.sup < cons.lhs() - feas {
            return RoundOutcome::Cutoff;
        }
        // Activity inside the sides: nothing can be deduced.
        if activity.is_subset_of(&sides, feas) {
            return RoundOutcome::Redundant;
        }

        let mut changed = false;

        match self.propagate_linear(cons, vars) {
            StepOutcome::Cutoff => return RoundOutcome::Cutoff,
            StepOutcome::Changed => changed = true,
            StepOutcome::Unchanged => {}
        }

        // The linear step may have invalidated the quadratic activity if a
        // variable appears on both sides; the general step snapshots it.
        cons.refresh_activity(vars, &self.settings);

        let nquad = cons.terms().quad_terms().len();
        let nbilin = cons.terms().bilin_terms().len();
        let step = if nquad == 1 && nbilin == 0 {
            self.propagate_single_quad_var(cons, vars)
        } else if nquad == 2 && nbilin == 1 {
            self.propagate_two_quad_vars(cons, vars)
        } else if nquad > 0 {
            self.propagate_general(cons, vars)
        } else {
            StepOutcome::Unchanged
        };
        match step {
            StepOutcome::Cutoff => return RoundOutcome::Cutoff,
            StepOutcome::Changed => changed = true,
            StepOutcome::Unchanged => {}
        }

        if changed {
            RoundOutcome::Reduced
        } else {
            RoundOutcome::Unchanged
        }
    }

    /// Upper target for a partial term sum: `rhs - others_min`.
    fn upper_target(&self, rhs: f64, others_min: f64) -> f64 {
        if self.settings.is_infinite(rhs) {
            f64::INFINITY
        } else {
            sub_up(rhs, others_min)
        }
    }

    /// Lower target for a partial term sum: `lhs - others_max`.
    fn lower_target(&self, lhs: f64, others_max: f64) -> f64 {
        if self.settings.is_infinite(lhs) {
            f64::NEG_INFINITY
        } else {
            sub_down(lhs, others_max)
        }
    }

    fn propagate_linear(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &mut dyn VariableStore,
    ) -> StepOutcome {
        let mut changed = false;
        let quad = cons.quad_activity().outer();

        for i in 0..cons.terms().linear_terms().len() {
            let term = cons.terms().linear_terms()[i];
            let bounds = vars.bounds(term.var);

            // Activity of everything except this term. The residual helpers
            // implement the single-unbounded-contributor special case: when
            // this very term carries the only infinite contribution, the
            // finite rest is still usable.
            let res_min = cons
                .lin_activity()
                .residual_min(term.coef, bounds, &self.settings);
            let res_max = cons
                .lin_activity()
                .residual_max(term.coef, bounds, &self.settings);
            let others_min = add_down(res_min, quad.inf);
            let others_max = add_up(res_max, quad.sup);

            // coef * x must fit in [lhs - others_max, rhs - others_min].
            let hi = self.upper_target(cons.rhs(), others_min);
            let lo = self.lower_target(cons.lhs(), others_max);

            let new_bounds = if term.coef > 0.0 {
                Interval::new(
                    if lo == f64::NEG_INFINITY {
                        f64::NEG_INFINITY
                    } else {
                        crate::interval::div_down(lo, term.coef)
                    },
                    if hi == f64::INFINITY {
                        f64::INFINITY
                    } else {
                        crate::interval::div_up(hi, term.coef)
                    },
                )
            } else {
                Interval::new(
                    if hi == f64::INFINITY {
                        f64::NEG_INFINITY
                    } else {
                        crate::interval::div_down(hi, term.coef)
                    },
                    if lo == f64::NEG_INFINITY {
                        f64::INFINITY
                    } else {
                        crate::interval::div_up(lo, term.coef)
                    },
                )
            };
            let new_bounds = new_bounds.unbounded_if_huge(self.settings.infinity);

            match self.tighten_var(cons, vars, term.var, new_bounds) {
                StepOutcome::Cutoff => return StepOutcome::Cutoff,
                StepOutcome::Changed => changed = true,
                StepOutcome::Unchanged => {}
            }
        }

        if changed {
            StepOutcome::Changed
        } else {
            StepOutcome::Unchanged
        }
    }

    /// Closed-form propagation for a single quadratic variable and no
    /// bilinear term.
    fn propagate_single_quad_var(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &mut dyn VariableStore,
    ) -> StepOutcome {
        let term = cons.terms().quad_terms()[0].clone();
        let bounds = vars.bounds(term.var);

        let lin_min = cons.lin_activity().min_activity();
        let lin_max = cons.lin_activity().max_activity();
        let target = Interval::new(
            self.lower_target(cons.lhs(), lin_max),
            self.upper_target(cons.rhs(), lin_min),
        );

        let solved = solve_quadratic(
            term.sqr_coef,
            Interval::point(term.lin_coef),
            target,
            bounds,
        )
        .unbounded_if_huge(self.settings.infinity);

        self.tighten_var(cons, vars, term.var, solved)
    }

    /// Closed-form propagation for exactly two quadratic variables coupled
    /// by one bilinear term.
    ///
    /// Each variable is solved against the other's exact term range, with
    /// the bilinear coefficient absorbed into the interval linear
    /// coefficient; nothing is cached, so the second solve sees the first
    /// one's tightening.
    fn propagate_two_quad_vars(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &mut dyn VariableStore,
    ) -> StepOutcome {
        let mut changed = false;
        let bilin_coef = cons.terms().bilin_terms()[0].coef;

        for (this, other) in [(0usize, 1usize), (1, 0)] {
            let term = cons.terms().quad_terms()[this].clone();
            let partner = cons.terms().quad_terms()[other].clone();

            let bounds = vars.bounds(term.var).unbounded_if_huge(self.settings.infinity);
            let partner_bounds = vars
                .bounds(partner.var)
                .unbounded_if_huge(self.settings.infinity);

            let b = Interval::point(term.lin_coef)
                .add(partner_bounds.mul_scalar(bilin_coef));

            let residual = quad_range(
                partner.sqr_coef,
                Interval::point(partner.lin_coef),
                partner_bounds,
            );

            let lin_min = cons.lin_activity().min_activity();
            let lin_max = cons.lin_activity().max_activity();
            let target = Interval::new(
                self.lower_target(cons.lhs(), add_up(lin_max, residual.sup)),
                self.upper_target(cons.rhs(), add_down(lin_min, residual.inf)),
            );

            let solved = solve_quadratic(term.sqr_coef, b, target, bounds)
                .unbounded_if_huge(self.settings.infinity);

            match self.tighten_var(cons, vars, term.var, solved) {
                StepOutcome::Cutoff => return StepOutcome::Cutoff,
                StepOutcome::Changed => changed = true,
                StepOutcome::Unchanged => {}
            }
        }

        if changed {
            StepOutcome::Changed
        } else {
            StepOutcome::Unchanged
        }
    }

    /// General per-variable propagation against cached residual
    /// activities.
    fn propagate_general(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &mut dyn VariableStore,
    ) -> StepOutcome {
        let mut changed = false;

        // Residuals come from the activity snapshot taken at round start.
        // Tightenings applied during this pass only shrink domains, so the
        // snapshot residuals stay valid (wider) outer bounds.
        let snapshot = cons.quad_activity().clone();

        for pos in 0..cons.terms().quad_terms().len() {
            let term = cons.terms().quad_terms()[pos].clone();
            let bounds = vars.bounds(term.var).unbounded_if_huge(self.settings.infinity);

            // Interval linear coefficient absorbing the bilinear neighbors.
            let mut b = Interval::point(term.lin_coef);
            for &t in &term.adjacency {
                let bt = cons.terms().bilin_terms()[t];
                let partner_bounds = vars
                    .bounds(bt.other(term.var))
                    .unbounded_if_huge(self.settings.infinity);
                b = b.add(partner_bounds.mul_scalar(bt.coef));
            }

            let residual = snapshot.residual_for_var(&term, pos, &self.settings);

            let lin_min = cons.lin_activity().min_activity();
            let lin_max = cons.lin_activity().max_activity();
            let target = Interval::new(
                self.lower_target(cons.lhs(), add_up(lin_max, residual.sup)),
                self.upper_target(cons.rhs(), add_down(lin_min, residual.inf)),
            );

            let solved = solve_quadratic(term.sqr_coef, b, target, bounds)
                .unbounded_if_huge(self.settings.infinity);

            match self.tighten_var(cons, vars, term.var, solved) {
                StepOutcome::Cutoff => return StepOutcome::Cutoff,
                StepOutcome::Changed => changed = true,
                StepOutcome::Unchanged => {}
            }
        }

        if changed {
            StepOutcome::Changed
        } else {
            StepOutcome::Unchanged
        }
    }

    /// Intersect a variable's domain with `new_bounds`, forwarding applied
    /// changes into the constraint's activity caches.
    fn tighten_var(
        &mut self,
        cons: &mut QuadConstraint,
        vars: &mut dyn VariableStore,
        var: VarId,
        new_bounds: Interval,
    ) -> StepOutcome {
        if new_bounds.is_empty() {
            return StepOutcome::Cutoff;
        }

        let mut changed = false;
        let mut buf = EventBuffer::new();

        if new_bounds.inf > -self.settings.infinity {
            let t = vars.tighten_lower(var, new_bounds.inf, &mut buf);
            if t.infeasible {
                return StepOutcome::Cutoff;
            }
            if t.changed {
                changed = true;
                self.stats.tightenings += 1;
            }
        }
        if new_bounds.sup < self.settings.infinity {
            let t = vars.tighten_upper(var, new_bounds.sup, &mut buf);
            if t.infeasible {
                return StepOutcome::Cutoff;
            }
            if t.changed {
                changed = true;
                self.stats.tightenings += 1;
            }
        }

        for ev in buf.drain() {
            cons.on_bound_changed(ev.var, ev.kind, ev.old, ev.new);
        }

        if changed {
            StepOutcome::Changed
        } else {
            StepOutcome::Unchanged
        }
    }
}

enum StepOutcome {
    Unchanged,
    Changed,
    Cutoff,
}
