//! Configuration settings for the quadratic constraint core.

/// Settings shared by the term store, propagator, and cut generator.
///
/// All components receive an immutable reference to one `QuadSettings` at
/// construction; there is no ambient global configuration.
#[derive(Debug, Clone)]
pub struct QuadSettings {
    // === Numerics ===
    /// Coefficients with absolute value below this are treated as zero.
    pub zero_tol: f64,

    /// Feasibility tolerance for activity and violation checks.
    pub feas_tol: f64,

    /// Practical infinity: bounds at or beyond this magnitude are unbounded.
    pub infinity: f64,

    /// Integer feasibility tolerance.
    /// A value is considered integral if |x - round(x)| <= int_feas_tol.
    pub int_feas_tol: f64,

    // === Propagation ===
    /// Maximum propagation rounds per call before giving up on a fixed point.
    pub max_prop_rounds: usize,

    // === Cuts ===
    /// Maximum ratio between the largest and smallest absolute cut
    /// coefficient. Cuts that cannot be cleaned below this are abandoned.
    pub max_coef_range: f64,

    /// Minimum efficacy for a generated cut to be returned.
    pub min_efficacy: f64,

    // === Curvature ===
    /// Eigenvalue tolerance: the Hessian counts as positive semidefinite if
    /// its smallest eigenvalue is >= -curvature_tol.
    pub curvature_tol: f64,
}

impl Default for QuadSettings {
    fn default() -> Self {
        Self {
            // Numerics
            zero_tol: 1e-9,
            feas_tol: 1e-6,
            infinity: 1e20,
            int_feas_tol: 1e-6,

            // Propagation
            max_prop_rounds: 10,

            // Cuts
            max_coef_range: 1e7,
            min_efficacy: 1e-4,

            // Curvature
            curvature_tol: 1e-9,
        }
    }
}

impl QuadSettings {
    /// Soft stand-in for an infinite per-term activity contribution.
    ///
    /// When a single term's activity interval is unbounded, the aggregate sum
    /// records this finite sentinel instead of the true infinity, so that
    /// subtracting the contribution back out (residual activities) stays
    /// well-defined. Infinity counters carry the real unboundedness
    /// information; consumers must treat any counted side as unbounded.
    pub fn soft_infinity(&self) -> f64 {
        self.infinity.sqrt()
    }

    /// True if `val` is at or beyond the practical infinity threshold.
    pub fn is_infinite(&self, val: f64) -> bool {
        val.abs() >= self.infinity
    }

    /// Set the maximum number of propagation rounds.
    pub fn with_max_prop_rounds(mut self, rounds: usize) -> Self {
        self.max_prop_rounds = rounds;
        self
    }

    /// Set the minimum cut efficacy.
    pub fn with_min_efficacy(mut self, efficacy: f64) -> Self {
        self.min_efficacy = efficacy;
        self
    }

    /// Set the maximum cut coefficient range.
    pub fn with_max_coef_range(mut self, range: f64) -> Self {
        self.max_coef_range = range;
        self
    }
}
