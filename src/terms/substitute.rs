//! Variable substitution in quadratic terms.
//!
//! Presolve replaces fixed and (multi-)aggregated variables by their
//! defining expression. Substituting `x = scale * y + offset` into a
//! quadratic variable term touches the term itself, the constraint sides
//! (through the returned constant), and every adjacent bilinear term; a
//! multi-aggregation `x = sum_k s_k y_k + offset` additionally fans one
//! term out into new quadratic and bilinear terms for the products of the
//! replacement variables.
//!
//! The cascade runs as a worklist loop, not by recursive replace-in-place:
//! one substitution can surface further inactive references (aggregation
//! chains), which the next scan picks up.

use crate::error::QuadResult;
use crate::model::{VarId, VarStatus, VariableStore};

use super::store::QuadTermStore;
use super::BilinTerm;

/// Substitute `x = scale * y + offset` into the quadratic variable term at
/// `pos`, where `x` is that term's variable and `y` is `new_var`.
///
/// Rewrites the term coefficients by the quadratic substitution formula,
/// rewrites every adjacent bilinear term (folding the degenerate case in
/// which a bilinear term turns into a square of `y`), and returns the
/// constant that moved out of the term sum; the caller subtracts it from
/// both constraint sides.
pub fn replace_quad_var(
    store: &mut QuadTermStore,
    pos: usize,
    new_var: VarId,
    scale: f64,
    offset: f64,
    zero_tol: f64,
) -> f64 {
    let old = store.quad_terms()[pos].clone();
    let constant = old.sqr_coef * offset * offset + old.lin_coef * offset;

    {
        let term = store.quad_term_mut(pos);
        term.var = new_var;
        term.lin_coef = old.lin_coef * scale + 2.0 * old.sqr_coef * scale * offset;
        term.sqr_coef = old.sqr_coef * scale * scale;
    }

    let mut removed = Vec::new();
    for &idx in &old.adjacency {
        let b = store.bilin_term(idx);
        let other = b.other(old.var);

        // The offset part c*offset*z always lands on the partner's linear
        // coefficient.
        if offset != 0.0 {
            let other_pos = store
                .position_of_quad_var(other)
                .expect("bilinear partner has no quadratic term");
            store.quad_term_mut(other_pos).lin_coef += b.coef * offset;
        }

        let new_coef = b.coef * scale;
        if new_coef.abs() <= zero_tol {
            removed.push(idx);
        } else if other == new_var {
            // c*x*z with z == y collapses to a square term of y.
            let term = store.quad_term_mut(pos);
            term.sqr_coef += new_coef;
            removed.push(idx);
        } else {
            let (var1, var2) = if new_var < other {
                (new_var, other)
            } else {
                (other, new_var)
            };
            store.set_bilin_term(
                idx,
                BilinTerm {
                    var1,
                    var2,
                    coef: new_coef,
                },
            );
        }
    }
    store.remove_bilinear_set(&removed);

    constant
}

/// Drop the quadratic variable term at `pos` for a variable fixed to
/// `value`, returning the constant that moved out of the term sum.
fn remove_fixed_quad_var(store: &mut QuadTermStore, pos: usize, value: f64) -> f64 {
    let old = store.quad_terms()[pos].clone();
    let constant = old.sqr_coef * value * value + old.lin_coef * value;

    for &idx in &old.adjacency {
        let b = store.bilin_term(idx);
        let other = b.other(old.var);
        let other_pos = store
            .position_of_quad_var(other)
            .expect("bilinear partner has no quadratic term");
        store.quad_term_mut(other_pos).lin_coef += b.coef * value;
    }
    store.remove_bilinear_set(&old.adjacency);
    store.remove_quad_var(pos);

    constant
}

/// Position of the quadratic term for `var`, creating an empty one if the
/// variable does not appear quadratically yet.
fn quad_pos_or_insert(store: &mut QuadTermStore, var: VarId) -> usize {
    match store.position_of_quad_var(var) {
        Some(pos) => pos,
        None => store.add_quad_var(var, 0.0, 0.0),
    }
}

/// Fan the quadratic variable term at `pos` out over a multi-aggregation
/// `x = sum_k s_k y_k + offset`, returning the constant that moved out of
/// the term sum.
///
/// Produces one quadratic term per `y_k`, one bilinear term per pair
/// `(y_k, y_l)`, and rewrites every adjacent bilinear term `c*x*z` into
/// `sum_k c*s_k*y_k*z + c*offset*z`.
fn fan_out_quad_var(
    store: &mut QuadTermStore,
    pos: usize,
    aggs: &[(f64, VarId)],
    offset: f64,
    zero_tol: f64,
) -> QuadResult<f64> {
    let old = store.quad_terms()[pos].clone();
    let constant = old.sqr_coef * offset * offset + old.lin_coef * offset;

    // Rewrite the adjacent bilinear terms first, while the old ones still
    // carry their indices.
    for &idx in &old.adjacency {
        let b = store.bilin_term(idx);
        let other = b.other(old.var);
        let other_pos = store
            .position_of_quad_var(other)
            .expect("bilinear partner has no quadratic term");
        store.quad_term_mut(other_pos).lin_coef += b.coef * offset;

        for &(s_k, y_k) in aggs {
            let coef = b.coef * s_k;
            if coef.abs() <= zero_tol {
                continue;
            }
            if y_k == other {
                store.quad_term_mut(other_pos).sqr_coef += coef;
            } else {
                let y_pos = quad_pos_or_insert(store, y_k);
                store.add_bilinear(y_pos, other_pos, coef)?;
            }
        }
    }
    store.remove_bilinear_set(&old.adjacency);

    // Squared expansion: (sum_k s_k y_k + offset)^2 and the linear part.
    for (k, &(s_k, y_k)) in aggs.iter().enumerate() {
        let y_pos = quad_pos_or_insert(store, y_k);
        {
            let term = store.quad_term_mut(y_pos);
            term.lin_coef += old.lin_coef * s_k + 2.0 * old.sqr_coef * s_k * offset;
            term.sqr_coef += old.sqr_coef * s_k * s_k;
        }
        for &(s_l, y_l) in &aggs[k + 1..] {
            let coef = 2.0 * old.sqr_coef * s_k * s_l;
            if coef.abs() <= zero_tol {
                continue;
            }
            let l_pos = quad_pos_or_insert(store, y_l);
            store.add_bilinear(y_pos, l_pos, coef)?;
        }
    }

    store.remove_quad_var(pos);
    Ok(constant)
}

enum Pending {
    Linear(usize, VarStatus),
    Quad(usize, VarStatus),
}

fn first_inactive(store: &QuadTermStore, vars: &dyn VariableStore) -> Option<Pending> {
    for (pos, t) in store.linear_terms().iter().enumerate() {
        let status = vars.status(t.var);
        if status != VarStatus::Active {
            return Some(Pending::Linear(pos, status));
        }
    }
    for (pos, t) in store.quad_terms().iter().enumerate() {
        let status = vars.status(t.var);
        if status != VarStatus::Active {
            return Some(Pending::Quad(pos, status));
        }
    }
    None
}

/// Replace every term on a fixed or (multi-)aggregated variable by its
/// defining expression, to a fixed point.
///
/// Returns the accumulated constant that moved out of the term sum (to be
/// subtracted from both sides) and whether anything changed. The resulting
/// store usually needs a merge pass: substitution may create transient
/// duplicate terms.
pub fn remove_fixed_variables(
    store: &mut QuadTermStore,
    vars: &dyn VariableStore,
    zero_tol: f64,
) -> QuadResult<(f64, bool)> {
    let mut constant = 0.0;
    let mut changed = false;

    // The aggregation graph is acyclic, so the loop terminates; the budget
    // is a backstop against a malformed variable store.
    let mut budget =
        4 * (store.linear_terms().len() + store.quad_terms().len()) + 64;

    while let Some(pending) = first_inactive(store, vars) {
        if budget == 0 {
            log::warn!("substitution cascade stopped early: aggregation graph too deep");
            break;
        }
        budget -= 1;
        changed = true;

        match pending {
            Pending::Linear(pos, status) => {
                let coef = store.linear_terms()[pos].coef;
                store.remove_linear(pos);
                match status {
                    VarStatus::Fixed(value) => {
                        constant += coef * value;
                    }
                    VarStatus::Aggregated {
                        scale,
                        base,
                        offset,
                    } => {
                        constant += coef * offset;
                        store.add_linear(base, coef * scale, zero_tol);
                    }
                    VarStatus::MultiAggregated { terms, offset } => {
                        constant += coef * offset;
                        for (s_k, y_k) in terms {
                            store.add_linear(y_k, coef * s_k, zero_tol);
                        }
                    }
                    VarStatus::Active => unreachable!(),
                }
            }
            Pending::Quad(pos, status) => match status {
                VarStatus::Fixed(value) => {
                    constant += remove_fixed_quad_var(store, pos, value);
                }
                VarStatus::Aggregated {
                    scale,
                    base,
                    offset,
                } => {
                    constant += replace_quad_var(store, pos, base, scale, offset, zero_tol);
                }
                VarStatus::MultiAggregated { terms, offset } => {
                    constant += fan_out_quad_var(store, pos, &terms, offset, zero_tol)?;
                }
                VarStatus::Active => unreachable!(),
            },
        }
    }

    Ok((constant, changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VarPool, VarType};

    fn pool(n: usize) -> VarPool {
        let mut pool = VarPool::default();
        for _ in 0..n {
            pool.add_var(-10.0, 10.0, VarType::Continuous);
        }
        pool
    }

    /// Reference evaluation helper: substituted store plus constant must
    /// agree with the original on points consistent with the substitution.
    fn check_equivalent(
        original: &QuadTermStore,
        substituted: &QuadTermStore,
        constant: f64,
        points: &[Vec<f64>],
    ) {
        for x in points {
            let a = original.eval(x);
            let b = substituted.eval(x) + constant;
            assert!(
                (a - b).abs() < 1e-9 * (1.0 + a.abs()),
                "substitution changed value: {} vs {}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_substitute_fixed_quad_var() {
        let mut pool = pool(3);
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 1.0, 2.0);
        let py = store.add_quad_var(1, 0.0, 1.0);
        store.add_bilinear(px, py, 3.0).unwrap();

        let original = store.clone();
        pool.fix(0, 2.0);

        let (constant, changed) =
            remove_fixed_variables(&mut store, &pool, 1e-9).unwrap();
        assert!(changed);
        assert!(store.adjacency_consistent());
        assert!(store.position_of_quad_var(0).is_none());

        // Points with x0 = 2 must evaluate identically.
        check_equivalent(
            &original,
            &store,
            constant,
            &[vec![2.0, 1.0, 0.0], vec![2.0, -3.0, 0.0]],
        );
    }

    #[test]
    fn test_substitute_aggregated_var() {
        let mut pool = pool(3);
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 1.0, 2.0);
        let pz = store.add_quad_var(2, 0.0, 1.0);
        store.add_bilinear(px, pz, -1.0).unwrap();
        store.add_linear(0, 4.0, 1e-9);

        let original = store.clone();
        // x0 = 0.5 * x1 - 1
        pool.aggregate(0, 0.5, 1, -1.0);

        let (constant, changed) =
            remove_fixed_variables(&mut store, &pool, 1e-9).unwrap();
        assert!(changed);
        assert!(store.adjacency_consistent());
        assert!(store.position_of_quad_var(0).is_none());

        // Points respecting x0 = 0.5 x1 - 1.
        check_equivalent(
            &original,
            &store,
            constant,
            &[
                vec![0.0, 2.0, 5.0],
                vec![0.5, 3.0, -1.0],
                vec![-1.0, 0.0, 2.0],
            ],
        );
    }

    #[test]
    fn test_aggregation_collapses_bilinear_to_square() {
        let mut pool = pool(2);
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 0.0, 0.0);
        let py = store.add_quad_var(1, 0.0, 0.0);
        store.add_bilinear(px, py, 6.0).unwrap();

        let original = store.clone();
        // x0 = 2 * x1: 6 x0 x1 becomes 12 x1^2.
        pool.aggregate(0, 2.0, 1, 0.0);

        let (constant, _) = remove_fixed_variables(&mut store, &pool, 1e-9).unwrap();
        assert!(store.bilin_terms().is_empty());
        assert!(store.adjacency_consistent());

        let y = &store.quad_terms()[store.position_of_quad_var(1).unwrap()];
        assert!((y.sqr_coef - 12.0).abs() < 1e-12);

        check_equivalent(
            &original,
            &store,
            constant,
            &[vec![2.0, 1.0], vec![-4.0, -2.0]],
        );
    }

    #[test]
    fn test_multi_aggregation_fans_out() {
        let mut pool = pool(4);
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 1.0, 1.0);
        let pw = store.add_quad_var(3, 0.0, 1.0);
        store.add_bilinear(px, pw, 2.0).unwrap();

        let original = store.clone();
        // x0 = x1 + 2 x2 - 0.5: the square fans out into x1^2, x2^2, x1*x2.
        pool.multi_aggregate(0, vec![(1.0, 1), (2.0, 2)], -0.5);

        let (constant, changed) =
            remove_fixed_variables(&mut store, &pool, 1e-9).unwrap();
        assert!(changed);
        assert!(store.adjacency_consistent());
        assert!(store.position_of_quad_var(0).is_none());

        // x1*x2, x1*x3, x2*x3 all present.
        assert_eq!(store.bilin_terms().len(), 3);

        // Points respecting x0 = x1 + 2 x2 - 0.5.
        check_equivalent(
            &original,
            &store,
            constant,
            &[
                vec![2.5, 1.0, 1.0, 2.0],
                vec![-0.5, 0.0, 0.0, -1.0],
                vec![3.5, 2.0, 1.0, 0.5],
            ],
        );
    }

    #[test]
    fn test_aggregation_chain_resolves() {
        let mut pool = pool(3);
        let mut store = QuadTermStore::new();
        store.add_quad_var(0, 0.0, 1.0);

        // x0 = 2 x1, x1 = x2 + 1: the cascade must reach x2.
        pool.aggregate(0, 2.0, 1, 0.0);
        pool.aggregate(1, 1.0, 2, 1.0);

        let original_eval = |x2: f64| {
            let x1 = x2 + 1.0;
            let x0: f64 = 2.0 * x1;
            x0 * x0
        };

        let (constant, _) = remove_fixed_variables(&mut store, &pool, 1e-9).unwrap();
        assert!(store.position_of_quad_var(0).is_none());
        assert!(store.position_of_quad_var(1).is_none());

        for &x2 in &[0.0, 1.0, -2.5] {
            let val = store.eval(&[0.0, 0.0, x2]) + constant;
            assert!((val - original_eval(x2)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fixed_linear_term() {
        let mut pool = pool(2);
        let mut store = QuadTermStore::new();
        store.add_linear(0, 3.0, 1e-9);
        store.add_linear(1, 1.0, 1e-9);

        pool.fix(0, -2.0);
        let (constant, changed) =
            remove_fixed_variables(&mut store, &pool, 1e-9).unwrap();
        assert!(changed);
        assert!((constant - (-6.0)).abs() < 1e-12);
        assert_eq!(store.linear_terms().len(), 1);
        assert_eq!(store.linear_terms()[0].var, 1);
    }
}
