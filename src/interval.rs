//! Directed-rounding interval arithmetic.
//!
//! Provides the interval type used by activity computation and bound
//! propagation, together with the two quadratic primitives the propagator
//! is built on:
//!
//! - the exact range of `a*x^2 + b*x` over a domain (`b` an interval), and
//! - a sound outer solve of `a*x^2 + b*x in rhs` for `x`.
//!
//! Hardware rounding modes are not portable across targets, so directed
//! rounding is implemented by stepping the result of each native operation
//! one ulp outward. The result is never tighter than the exact interval,
//! which is the soundness direction every consumer relies on: lower bounds
//! round down, upper bounds round up.

/// Next representable value above `x`.
pub fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Next representable value below `x`.
pub fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

/// `a + b` rounded toward negative infinity.
pub fn add_down(a: f64, b: f64) -> f64 {
    next_down(a + b)
}

/// `a + b` rounded toward positive infinity.
pub fn add_up(a: f64, b: f64) -> f64 {
    next_up(a + b)
}

/// `a - b` rounded toward negative infinity.
pub fn sub_down(a: f64, b: f64) -> f64 {
    next_down(a - b)
}

/// `a - b` rounded toward positive infinity.
pub fn sub_up(a: f64, b: f64) -> f64 {
    next_up(a - b)
}

/// `a * b` rounded toward negative infinity, with `0 * inf = 0`.
pub fn mul_down(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }
    next_down(a * b)
}

/// `a * b` rounded toward positive infinity, with `0 * inf = 0`.
pub fn mul_up(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }
    next_up(a * b)
}

/// `a / b` rounded toward negative infinity, with `0 / b = 0`.
pub fn div_down(a: f64, b: f64) -> f64 {
    if a == 0.0 {
        return 0.0;
    }
    next_down(a / b)
}

/// `a / b` rounded toward positive infinity, with `0 / b = 0`.
pub fn div_up(a: f64, b: f64) -> f64 {
    if a == 0.0 {
        return 0.0;
    }
    next_up(a / b)
}

/// `sqrt(a)` rounded toward negative infinity.
pub fn sqrt_down(a: f64) -> f64 {
    if a <= 0.0 {
        return 0.0;
    }
    next_down(a.sqrt())
}

/// `sqrt(a)` rounded toward positive infinity.
pub fn sqrt_up(a: f64) -> f64 {
    if a <= 0.0 {
        return 0.0;
    }
    next_up(a.sqrt())
}

/// A closed interval `[inf, sup]`, possibly unbounded on either side.
///
/// The empty interval is represented as `[+inf, -inf]`; every operation
/// treats it as the empty set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Lower endpoint.
    pub inf: f64,
    /// Upper endpoint.
    pub sup: f64,
}

impl Interval {
    /// Create an interval from endpoints.
    pub fn new(inf: f64, sup: f64) -> Self {
        debug_assert!(!inf.is_nan() && !sup.is_nan());
        Self { inf, sup }
    }

    /// Degenerate interval `[v, v]`.
    pub fn point(v: f64) -> Self {
        Self::new(v, v)
    }

    /// The whole real line.
    pub const ENTIRE: Interval = Interval {
        inf: f64::NEG_INFINITY,
        sup: f64::INFINITY,
    };

    /// The empty set.
    pub fn empty() -> Self {
        Self {
            inf: f64::INFINITY,
            sup: f64::NEG_INFINITY,
        }
    }

    /// True if this interval is the empty set.
    pub fn is_empty(&self) -> bool {
        self.inf > self.sup
    }

    /// True if `v` lies in the interval.
    pub fn contains(&self, v: f64) -> bool {
        self.inf <= v && v <= self.sup
    }

    /// True if this interval is contained in `other`, with `tol` slack on
    /// both ends.
    pub fn is_subset_of(&self, other: &Interval, tol: f64) -> bool {
        if self.is_empty() {
            return true;
        }
        self.inf >= other.inf - tol && self.sup <= other.sup + tol
    }

    /// Intersection; may be empty.
    pub fn intersect(self, other: Interval) -> Interval {
        Interval {
            inf: self.inf.max(other.inf),
            sup: self.sup.min(other.sup),
        }
    }

    /// Convex hull of two intervals. The empty interval is an identity.
    pub fn hull(self, other: Interval) -> Interval {
        Interval {
            inf: self.inf.min(other.inf),
            sup: self.sup.max(other.sup),
        }
    }

    /// Negation `[-sup, -inf]`.
    pub fn neg(self) -> Interval {
        Interval {
            inf: -self.sup,
            sup: -self.inf,
        }
    }

    /// Sum, rounded outward.
    pub fn add(self, other: Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::empty();
        }
        Interval {
            inf: add_down(self.inf, other.inf),
            sup: add_up(self.sup, other.sup),
        }
    }

    /// Difference, rounded outward.
    pub fn sub(self, other: Interval) -> Interval {
        self.add(other.neg())
    }

    /// Product, rounded outward.
    pub fn mul(self, other: Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::empty();
        }
        let candidates_down = [
            mul_down(self.inf, other.inf),
            mul_down(self.inf, other.sup),
            mul_down(self.sup, other.inf),
            mul_down(self.sup, other.sup),
        ];
        let candidates_up = [
            mul_up(self.inf, other.inf),
            mul_up(self.inf, other.sup),
            mul_up(self.sup, other.inf),
            mul_up(self.sup, other.sup),
        ];
        Interval {
            inf: candidates_down.iter().copied().fold(f64::INFINITY, f64::min),
            sup: candidates_up.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Quotient, rounded outward. A denominator straddling zero yields the
    /// whole line (the hull of the two unbounded branches).
    pub fn div(self, other: Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::empty();
        }
        if other.contains(0.0) {
            return Interval::ENTIRE;
        }
        let candidates_down = [
            div_down(self.inf, other.inf),
            div_down(self.inf, other.sup),
            div_down(self.sup, other.inf),
            div_down(self.sup, other.sup),
        ];
        let candidates_up = [
            div_up(self.inf, other.inf),
            div_up(self.inf, other.sup),
            div_up(self.sup, other.inf),
            div_up(self.sup, other.sup),
        ];
        Interval {
            inf: candidates_down.iter().copied().fold(f64::INFINITY, f64::min),
            sup: candidates_up.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Scale by a scalar, rounded outward.
    pub fn mul_scalar(self, s: f64) -> Interval {
        if self.is_empty() {
            return self;
        }
        if s >= 0.0 {
            Interval {
                inf: mul_down(self.inf, s),
                sup: mul_up(self.sup, s),
            }
        } else {
            Interval {
                inf: mul_down(self.sup, s),
                sup: mul_up(self.inf, s),
            }
        }
    }

    /// Divide by a nonzero scalar, rounded outward.
    pub fn div_scalar(self, s: f64) -> Interval {
        debug_assert!(s != 0.0);
        if self.is_empty() {
            return self;
        }
        if s > 0.0 {
            Interval {
                inf: div_down(self.inf, s),
                sup: div_up(self.sup, s),
            }
        } else {
            Interval {
                inf: div_down(self.sup, s),
                sup: div_up(self.inf, s),
            }
        }
    }

    /// Replace endpoints at or beyond the practical infinity threshold by
    /// true infinities. Overflow past the representable range means
    /// "unbounded", not a numeric error.
    pub fn unbounded_if_huge(self, infinity: f64) -> Interval {
        if self.is_empty() {
            return self;
        }
        Interval {
            inf: if self.inf <= -infinity {
                f64::NEG_INFINITY
            } else {
                self.inf
            },
            sup: if self.sup >= infinity {
                f64::INFINITY
            } else {
                self.sup
            },
        }
    }
}

/// Upper bound of `a*t^2 + b*t` at a finite point `t`, rounded up.
fn eval_quad_up(a: f64, b: f64, t: f64) -> f64 {
    let sq = if a >= 0.0 {
        mul_up(t, t)
    } else {
        mul_down(t, t)
    };
    add_up(mul_up(a, sq), mul_up(b, t))
}

/// Maximum of `a*t^2 + b*t` over `t in x` for scalar `b`, rounded up.
///
/// `x` must be nonempty.
fn quad_max_scalar(a: f64, b: f64, x: Interval) -> f64 {
    let mut best = f64::NEG_INFINITY;

    if x.inf.is_finite() {
        best = best.max(eval_quad_up(a, b, x.inf));
    } else {
        if a > 0.0 || (a == 0.0 && b < 0.0) {
            return f64::INFINITY;
        }
        if a == 0.0 && b == 0.0 {
            best = best.max(0.0);
        }
    }

    if x.sup.is_finite() {
        best = best.max(eval_quad_up(a, b, x.sup));
    } else {
        if a > 0.0 || (a == 0.0 && b > 0.0) {
            return f64::INFINITY;
        }
        if a == 0.0 && b == 0.0 {
            best = best.max(0.0);
        }
    }

    // Interior maximum only for a concave parabola.
    if a < 0.0 {
        let vertex = -b / (2.0 * a);
        if x.contains(vertex) {
            // value at the vertex is -b^2/(4a) = b^2/(-4a)
            best = best.max(div_up(mul_up(b, b), -4.0 * a));
        }
    }

    best
}

/// Maximum of `a*t^2 + beta*t` over `t in x`, `beta in b`, rounded up.
fn quad_max(a: f64, b: Interval, x: Interval) -> f64 {
    let mut best = f64::NEG_INFINITY;

    // For t >= 0 the maximizing beta is b.sup, for t <= 0 it is b.inf.
    let pos = x.intersect(Interval::new(0.0, f64::INFINITY));
    if !pos.is_empty() {
        best = best.max(quad_max_scalar(a, b.sup, pos));
    }
    let neg = x.intersect(Interval::new(f64::NEG_INFINITY, 0.0));
    if !neg.is_empty() {
        best = best.max(quad_max_scalar(a, b.inf, neg));
    }

    best
}

/// Range of `a*x^2 + beta*x` over `x in xbnds`, `beta in b`.
///
/// Exact up to directed rounding; this is the quadratic activity primitive.
pub fn quad_range(a: f64, b: Interval, xbnds: Interval) -> Interval {
    if xbnds.is_empty() || b.is_empty() {
        return Interval::empty();
    }
    Interval {
        inf: -quad_max(-a, b.neg(), xbnds),
        sup: quad_max(a, b, xbnds),
    }
}

/// Hull of `{t >= 0 : a*t^2 + b*t <= c}` for scalar `a`, `b`, `c`,
/// with a sound outward rounding of the root computation.
fn solve_pos_quad_le(a: f64, b: f64, c: f64) -> Interval {
    let nonneg = Interval::new(0.0, f64::INFINITY);

    if c == f64::INFINITY {
        return nonneg;
    }
    if c == f64::NEG_INFINITY {
        return Interval::empty();
    }
    // Unbounded linear part dominates for every t > 0.
    if b == f64::NEG_INFINITY {
        return nonneg;
    }
    if b == f64::INFINITY {
        return if c >= 0.0 {
            Interval::point(0.0)
        } else {
            Interval::empty()
        };
    }

    if a == 0.0 {
        if b == 0.0 {
            return if c >= 0.0 { nonneg } else { Interval::empty() };
        }
        if b > 0.0 {
            // t <= c/b
            return if c < 0.0 {
                Interval::empty()
            } else {
                Interval::new(0.0, div_up(c, b))
            };
        }
        // b < 0: t >= c/b
        return if c >= 0.0 {
            nonneg
        } else {
            Interval::new(div_down(c, b).max(0.0), f64::INFINITY)
        };
    }

    if a > 0.0 {
        // Solution is the root interval [r_lo, r_hi]; widen it outward, so
        // the discriminant and square root are rounded up.
        let delta = add_up(mul_up(b, b), mul_up(4.0 * a, c));
        if delta < 0.0 {
            return Interval::empty();
        }
        let sq = sqrt_up(delta);
        let r_hi = div_up(add_up(-b, sq), 2.0 * a);
        if r_hi < 0.0 {
            return Interval::empty();
        }
        let r_lo = div_down(sub_down(-b, sq), 2.0 * a);
        return Interval::new(r_lo.max(0.0), r_hi);
    }

    // a < 0: solution is everything outside the root interval. Widening the
    // complement means shrinking the root interval, so the discriminant and
    // square root are rounded down here.
    let delta = add_down(mul_down(b, b), mul_down(4.0 * a, c));
    if delta < 0.0 {
        // No real roots: the concave parabola stays below c everywhere.
        return nonneg;
    }
    let sq = sqrt_down(delta);
    // 2a < 0, so (-b + sq)/(2a) is the smaller root.
    let r_small = div_up(add_down(-b, sq), 2.0 * a);
    let r_large = div_down(sub_up(-b, sq), 2.0 * a);
    if r_small >= 0.0 {
        // Both branches intersect [0, inf); the hull is everything.
        return nonneg;
    }
    Interval::new(r_large.max(0.0), f64::INFINITY)
}

/// Outer hull of `{t in dom : exists beta in b with a*t^2 + beta*t in rhs}`
/// for a domain `dom` contained in `[0, inf)`.
fn solve_pos(a: f64, b: Interval, rhs: Interval, dom: Interval) -> Interval {
    // For t >= 0 the term range is [a t^2 + b.inf t, a t^2 + b.sup t]; it
    // meets rhs iff the lower end is <= rhs.sup and the upper end >= rhs.inf.
    let s_up = solve_pos_quad_le(a, b.inf, rhs.sup);
    let s_lo = solve_pos_quad_le(-a, -b.sup, -rhs.inf);
    s_up.intersect(s_lo).intersect(dom)
}

/// Sound outer solve of `a*x^2 + beta*x in rhs` over `x in xbnds`,
/// `beta in b`.
///
/// Dispatches on the sign-feasible part of the domain: the nonnegative and
/// nonpositive branches have different monotonicity and are solved
/// separately (the negative branch by reflection), then hulled. The result
/// is an over-approximation of the true solution set, never an
/// under-approximation. An empty result proves infeasibility.
pub fn solve_quadratic(a: f64, b: Interval, rhs: Interval, xbnds: Interval) -> Interval {
    if rhs.is_empty() || xbnds.is_empty() {
        return Interval::empty();
    }

    // Constant zero function: pure feasibility check.
    if a == 0.0 && b.inf == 0.0 && b.sup == 0.0 {
        return if rhs.contains(0.0) {
            xbnds
        } else {
            Interval::empty()
        };
    }

    let mut result = Interval::empty();

    let pos = xbnds.intersect(Interval::new(0.0, f64::INFINITY));
    if !pos.is_empty() {
        result = result.hull(solve_pos(a, b, rhs, pos));
    }

    let neg = xbnds.intersect(Interval::new(f64::NEG_INFINITY, 0.0));
    if !neg.is_empty() {
        // Reflect x = -t and reuse the nonnegative solver.
        let reflected = Interval::new(-neg.sup, -neg.inf);
        let sol = solve_pos(a, b.neg(), rhs, reflected);
        if !sol.is_empty() {
            result = result.hull(sol.neg());
        }
    }

    result
}
