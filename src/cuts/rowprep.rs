//! Cut row assembly and numerical cleanup.
//!
//! Estimator coefficients are accumulated into a dense row. Before the row
//! becomes a cut, its coefficient range is checked: a ratio between the
//! largest and smallest nonzero coefficient beyond the configured maximum
//! makes the row numerically harmful to an LP, so the smallest coefficients
//! are folded into the constant at a bound consistent with the cut's
//! validity direction. If no such bound exists the row is abandoned rather
//! than emitted weak or unsound.

use crate::model::{VarId, VariableStore};
use crate::settings::QuadSettings;

use super::{CutSide, QuadCut};

/// A cut under construction: the estimator `sum coefs x + constant`
/// bounding the constraint body from one side.
#[derive(Debug, Clone)]
pub(crate) struct RowPrep {
    coefs: Vec<f64>,
    constant: f64,
    side: CutSide,

    /// True once a bound-dependent estimator (secant, McCormick) entered
    /// the row.
    local: bool,
}

impl RowPrep {
    pub fn new(num_vars: usize, side: CutSide) -> Self {
        Self {
            coefs: vec![0.0; num_vars],
            constant: 0.0,
            side,
            local: false,
        }
    }

    pub fn add_coef(&mut self, var: VarId, coef: f64) {
        self.coefs[var] += coef;
    }

    pub fn add_constant(&mut self, constant: f64) {
        self.constant += constant;
    }

    pub fn mark_local(&mut self) {
        self.local = true;
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    /// True if any assembled value left the representable range.
    pub fn has_huge_values(&self, infinity: f64) -> bool {
        self.constant.is_nan()
            || self.constant.abs() >= infinity
            || self.coefs.iter().any(|c| c.is_nan() || c.abs() >= infinity)
    }

    fn max_abs_coef(&self) -> f64 {
        self.coefs.iter().fold(0.0_f64, |m, c| m.max(c.abs()))
    }

    /// Shrink the coefficient range by folding minimal coefficients into
    /// the constant.
    ///
    /// A term `c * x_j` can be dropped from an underestimator by replacing
    /// it with its minimum over the domain (and with its maximum for an
    /// overestimator); this weakens but never invalidates the row. Returns
    /// false if a needed bound is unbounded, in which case the cut is
    /// abandoned.
    pub fn cleanup_coef_range(
        &mut self,
        vars: &dyn VariableStore,
        settings: &QuadSettings,
    ) -> bool {
        loop {
            let mut max_abs = 0.0_f64;
            let mut min_abs = f64::INFINITY;
            let mut min_idx = usize::MAX;
            for (j, &c) in self.coefs.iter().enumerate() {
                if c == 0.0 {
                    continue;
                }
                max_abs = max_abs.max(c.abs());
                if c.abs() < min_abs {
                    min_abs = c.abs();
                    min_idx = j;
                }
            }
            if min_idx == usize::MAX {
                // All coefficients gone: nothing worth emitting.
                return false;
            }
            if max_abs <= settings.max_coef_range * min_abs {
                return true;
            }

            let c = self.coefs[min_idx];
            let bound = match (self.side, c > 0.0) {
                // Underestimator: replace c*x_j by its minimum.
                (CutSide::Rhs, true) => vars.lower_bound(min_idx),
                (CutSide::Rhs, false) => vars.upper_bound(min_idx),
                // Overestimator: replace c*x_j by its maximum.
                (CutSide::Lhs, true) => vars.upper_bound(min_idx),
                (CutSide::Lhs, false) => vars.lower_bound(min_idx),
            };
            if bound.abs() >= settings.infinity {
                return false;
            }
            self.constant += c * bound;
            self.coefs[min_idx] = 0.0;
        }
    }

    /// Turn the row into a cut against the given constraint side value.
    ///
    /// Returns `None` when the reference point violates the cut by less
    /// than the efficacy threshold.
    pub fn into_cut(
        self,
        side_value: f64,
        x_ref: &[f64],
        globally_valid: bool,
        settings: &QuadSettings,
    ) -> Option<QuadCut> {
        let bound = side_value - self.constant;
        if bound.abs() >= settings.infinity {
            return None;
        }

        let activity: f64 = self
            .coefs
            .iter()
            .zip(x_ref.iter())
            .map(|(c, x)| c * x)
            .sum();
        let violation = match self.side {
            CutSide::Rhs => activity - bound,
            CutSide::Lhs => bound - activity,
        };
        let efficacy = violation / self.max_abs_coef().max(1.0);
        if efficacy.is_nan() || efficacy < settings.min_efficacy {
            return None;
        }

        Some(QuadCut {
            coefs: self.coefs,
            bound,
            side: self.side,
            efficacy,
            globally_valid,
        })
    }
}
