//! Linear term estimators: tangents, secants, and McCormick facets.
//!
//! Every estimator returns the coefficients of a linear function that
//! bounds its term from the requested side. Tangents of convex-siding
//! square terms are valid on the whole domain; secants and McCormick
//! facets are only valid on the current bound box.

use crate::interval::Interval;

/// A univariate linear estimate `coef * x + constant`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TermEstimate {
    pub coef: f64,
    pub constant: f64,
}

/// A bivariate linear estimate `coef_x * x + coef_y * y + constant`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BilinEstimate {
    pub coef_x: f64,
    pub coef_y: f64,
    pub constant: f64,
}

/// First-order linearization of `sqr * x^2` at `ref_val`.
///
/// Underestimates the term for `sqr > 0` and overestimates it for
/// `sqr < 0`, globally.
pub(crate) fn square_tangent(sqr: f64, ref_val: f64) -> TermEstimate {
    TermEstimate {
        coef: 2.0 * sqr * ref_val,
        constant: -sqr * ref_val * ref_val,
    }
}

/// Secant of `sqr * x^2` over `[lb, ub]`.
///
/// Overestimates the term for `sqr > 0` and underestimates it for
/// `sqr < 0`; valid only on the box.
pub(crate) fn square_secant(sqr: f64, lb: f64, ub: f64) -> TermEstimate {
    TermEstimate {
        coef: sqr * (lb + ub),
        constant: -sqr * lb * ub,
    }
}

/// Secant of `sqr * x^2` between the two integers surrounding `ref_val`.
///
/// On an integer domain this bounds the term from the same side as the
/// tangent would, while supporting the two neighboring integer points
/// exactly: `(k - f)(k - f - 1) >= 0` for every integer `k`.
pub(crate) fn square_integer_secant(sqr: f64, ref_val: f64) -> TermEstimate {
    let f = ref_val.floor();
    square_secant(sqr, f, f + 1.0)
}

/// Taylor linearization of `coef * x * y` at `(xr, yr)`.
///
/// Not a one-sided bound on its own; used when the whole function is
/// convex on the cut side, where the full gradient linearization is valid.
pub(crate) fn bilinear_taylor(coef: f64, xr: f64, yr: f64) -> BilinEstimate {
    BilinEstimate {
        coef_x: coef * yr,
        coef_y: coef * xr,
        constant: -coef * xr * yr,
    }
}

/// McCormick facet of `coef * x * y` over the bound box, bounding the term
/// from below (`underestimate`) or above.
///
/// Of the two facets of the relevant envelope half, the one supporting the
/// reference point more tightly is chosen. A facet is only available when
/// the bounds it is anchored at are finite; with neither available the
/// estimator fails.
pub(crate) fn bilinear_mccormick(
    coef: f64,
    xb: Interval,
    yb: Interval,
    xr: f64,
    yr: f64,
    underestimate: bool,
    infinity: f64,
) -> Option<BilinEstimate> {
    debug_assert!(coef != 0.0);

    // A negative coefficient swaps which half of the hull bounds the term.
    let under_xy = underestimate == (coef > 0.0);

    // Anchor corners (a, b) of the xy-envelope facets:
    //   xy >= b x + a y - a b   at (lx, ly) and (ux, uy)
    //   xy <= b x + a y - a b   at (lx, uy) and (ux, ly)
    let corners = if under_xy {
        [(xb.inf, yb.inf), (xb.sup, yb.sup)]
    } else {
        [(xb.inf, yb.sup), (xb.sup, yb.inf)]
    };

    let mut best: Option<(f64, f64, f64)> = None;
    for (a, b) in corners {
        if a.abs() >= infinity || b.abs() >= infinity {
            continue;
        }
        let val = b * xr + a * yr - a * b;
        let tighter = match best {
            None => true,
            Some((best_val, _, _)) => {
                if under_xy {
                    val > best_val
                } else {
                    val < best_val
                }
            }
        };
        if tighter {
            best = Some((val, a, b));
        }
    }

    let (_, a, b) = best?;
    Some(BilinEstimate {
        coef_x: coef * b,
        coef_y: coef * a,
        constant: -coef * a * b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tangent_underestimates_convex_square() {
        // x^2 at ref 2: 4x - 4. Below x^2 everywhere, equal at 2.
        let est = square_tangent(1.0, 2.0);
        for &x in &[-3.0, 0.0, 1.0, 2.0, 5.0] {
            assert!(est.coef * x + est.constant <= x * x + 1e-12);
        }
        assert!((est.coef * 2.0 + est.constant - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_secant_overestimates_convex_square() {
        // x^2 over [1, 3]: 4x - 3. Above x^2 on the box, equal at ends.
        let est = square_secant(1.0, 1.0, 3.0);
        for &x in &[1.0, 1.5, 2.0, 3.0] {
            assert!(est.coef * x + est.constant >= x * x - 1e-12);
        }
        assert!((est.coef * 1.0 + est.constant - 1.0).abs() < 1e-12);
        assert!((est.coef * 3.0 + est.constant - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_integer_secant_supports_neighbors() {
        // Around ref 2.4: secant between 2 and 3, exact at both.
        let est = square_integer_secant(1.0, 2.4);
        assert!((est.coef * 2.0 + est.constant - 4.0).abs() < 1e-12);
        assert!((est.coef * 3.0 + est.constant - 9.0).abs() < 1e-12);
        // Below x^2 at every other integer.
        for k in -5..8 {
            let k = k as f64;
            assert!(est.coef * k + est.constant <= k * k + 1e-12);
        }
    }

    #[test]
    fn test_mccormick_under_selects_tighter_facet() {
        // xy over [0,2]^2 at (2,2): the (ub, ub) facet 2x + 2y - 4 wins.
        let xb = Interval::new(0.0, 2.0);
        let est = bilinear_mccormick(1.0, xb, xb, 2.0, 2.0, true, 1e20).unwrap();
        assert!((est.coef_x - 2.0).abs() < 1e-12);
        assert!((est.coef_y - 2.0).abs() < 1e-12);
        assert!((est.constant - (-4.0)).abs() < 1e-12);

        // At (0.1, 0.1) the (lb, lb) facet (identically zero) is tighter.
        let est = bilinear_mccormick(1.0, xb, xb, 0.1, 0.1, true, 1e20).unwrap();
        assert_eq!(est.coef_x, 0.0);
        assert_eq!(est.coef_y, 0.0);
    }

    #[test]
    fn test_mccormick_validity_on_box() {
        let xb = Interval::new(-1.0, 2.0);
        let yb = Interval::new(0.5, 3.0);
        let under = bilinear_mccormick(1.5, xb, yb, 1.0, 1.0, true, 1e20).unwrap();
        let over = bilinear_mccormick(1.5, xb, yb, 1.0, 1.0, false, 1e20).unwrap();
        let mut x = xb.inf;
        while x <= xb.sup {
            let mut y = yb.inf;
            while y <= yb.sup {
                let term = 1.5 * x * y;
                assert!(under.coef_x * x + under.coef_y * y + under.constant <= term + 1e-9);
                assert!(over.coef_x * x + over.coef_y * y + over.constant >= term - 1e-9);
                y += 0.25;
            }
            x += 0.25;
        }
    }

    #[test]
    fn test_mccormick_negative_coefficient() {
        // -xy over [0,2]^2: underestimating -xy means overestimating xy.
        let xb = Interval::new(0.0, 2.0);
        let est = bilinear_mccormick(-1.0, xb, xb, 1.0, 1.0, true, 1e20).unwrap();
        let mut x = 0.0;
        while x <= 2.0 {
            let mut y = 0.0;
            while y <= 2.0 {
                assert!(est.coef_x * x + est.coef_y * y + est.constant <= -x * y + 1e-9);
                y += 0.25;
            }
            x += 0.25;
        }
    }

    #[test]
    fn test_mccormick_fails_without_bounds() {
        let free = Interval::ENTIRE;
        assert!(bilinear_mccormick(1.0, free, free, 0.0, 0.0, true, 1e20).is_none());

        // One finite corner is enough.
        let half = Interval::new(0.0, f64::INFINITY);
        let boxed = Interval::new(0.0, 1.0);
        assert!(bilinear_mccormick(1.0, half, boxed, 0.0, 0.0, true, 1e20).is_some());
    }
}
