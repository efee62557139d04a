//! The quadratic term store and its structural operations.

use crate::error::{QuadError, QuadResult};
use crate::model::{VarId, VariableStore};

use super::{BilinTerm, LinearTerm, QuadVarTerm};

/// Container for the linear, quadratic-variable, and bilinear terms of one
/// constraint.
///
/// Sortedness and mergedness of each array are tracked lazily: structural
/// edits clear the flags, and the sort/merge routines restore them before
/// any operation that relies on canonical order (binary search, duplicate
/// detection).
#[derive(Debug, Clone, Default)]
pub struct QuadTermStore {
    lin: Vec<LinearTerm>,
    quad: Vec<QuadVarTerm>,
    bilin: Vec<BilinTerm>,

    lin_sorted: bool,
    lin_merged: bool,
    quad_sorted: bool,
    quad_merged: bool,
    bilin_sorted: bool,
    bilin_merged: bool,
}

impl QuadTermStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            lin_sorted: true,
            lin_merged: true,
            quad_sorted: true,
            quad_merged: true,
            bilin_sorted: true,
            bilin_merged: true,
            ..Default::default()
        }
    }

    /// Linear terms.
    pub fn linear_terms(&self) -> &[LinearTerm] {
        &self.lin
    }

    /// Quadratic variable terms.
    pub fn quad_terms(&self) -> &[QuadVarTerm] {
        &self.quad
    }

    /// Bilinear terms.
    pub fn bilin_terms(&self) -> &[BilinTerm] {
        &self.bilin
    }

    /// True if there is no quadratic part at all.
    pub fn is_linear(&self) -> bool {
        self.quad.is_empty() && self.bilin.is_empty()
    }

    /// True if the store holds no terms.
    pub fn is_empty(&self) -> bool {
        self.lin.is_empty() && self.is_linear()
    }

    /// True if all three arrays are merged (no duplicates).
    pub fn is_merged(&self) -> bool {
        self.lin_merged && self.quad_merged && self.bilin_merged
    }

    // === Adding terms ===

    /// Append a linear term. Coefficients below `zero_tol` are ignored.
    ///
    /// Duplicate variables are allowed transiently; [`Self::merge_linear`]
    /// consolidates them.
    pub fn add_linear(&mut self, var: VarId, coef: f64, zero_tol: f64) {
        if coef.abs() <= zero_tol {
            return;
        }
        if let Some(last) = self.lin.last() {
            if last.var > var {
                self.lin_sorted = false;
            }
            if !self.lin_sorted || last.var >= var {
                self.lin_merged = false;
            }
        }
        self.lin.push(LinearTerm { var, coef });
    }

    /// Append a quadratic variable term, returning its position.
    pub fn add_quad_var(&mut self, var: VarId, lin_coef: f64, sqr_coef: f64) -> usize {
        if let Some(last) = self.quad.last() {
            if last.var > var {
                self.quad_sorted = false;
            }
            if !self.quad_sorted || last.var >= var {
                self.quad_merged = false;
            }
        }
        self.quad.push(QuadVarTerm {
            var,
            lin_coef,
            sqr_coef,
            adjacency: Vec::new(),
        });
        self.quad.len() - 1
    }

    /// Append a bilinear term between the quadratic variable terms at
    /// `pos1` and `pos2`, returning its index.
    ///
    /// The variable pair is stored in canonical (increasing id) order and
    /// the index is appended to both adjacency lists. Requesting a term on
    /// a single variable is a contract violation reported as
    /// [`QuadError::DegenerateBilinear`].
    pub fn add_bilinear(&mut self, pos1: usize, pos2: usize, coef: f64) -> QuadResult<usize> {
        assert!(
            pos1 < self.quad.len() && pos2 < self.quad.len(),
            "bilinear term position out of range"
        );
        let (va, vb) = (self.quad[pos1].var, self.quad[pos2].var);
        if pos1 == pos2 || va == vb {
            return Err(QuadError::DegenerateBilinear(va));
        }
        let (var1, var2) = if va < vb { (va, vb) } else { (vb, va) };

        if let Some(last) = self.bilin.last() {
            if (last.var1, last.var2) > (var1, var2) {
                self.bilin_sorted = false;
            }
            if !self.bilin_sorted || (last.var1, last.var2) >= (var1, var2) {
                self.bilin_merged = false;
            }
        }

        let idx = self.bilin.len();
        self.bilin.push(BilinTerm { var1, var2, coef });
        self.quad[pos1].adjacency.push(idx);
        self.quad[pos2].adjacency.push(idx);
        Ok(idx)
    }

    // === Lookup ===

    /// Position of a linear term for `var`, sorting first.
    pub fn find_linear(&mut self, var: VarId) -> Option<usize> {
        self.sort_linear();
        self.lin.binary_search_by_key(&var, |t| t.var).ok()
    }

    /// Position of a quadratic variable term for `var`, sorting first.
    ///
    /// If duplicates exist (store not merged), any one of them is returned.
    pub fn find_quad_var(&mut self, var: VarId) -> Option<usize> {
        self.sort_quad();
        self.quad.binary_search_by_key(&var, |t| t.var).ok()
    }

    /// Index of the bilinear term on the (unordered) pair, sorting first.
    pub fn find_bilinear(&mut self, var_a: VarId, var_b: VarId) -> Option<usize> {
        let key = if var_a < var_b {
            (var_a, var_b)
        } else {
            (var_b, var_a)
        };
        self.sort_bilinear();
        self.bilin
            .binary_search_by_key(&key, |t| (t.var1, t.var2))
            .ok()
    }

    /// Position of a quadratic variable term for `var` without sorting.
    ///
    /// Used while other positions must stay stable.
    pub(crate) fn position_of_quad_var(&self, var: VarId) -> Option<usize> {
        self.quad.iter().position(|t| t.var == var)
    }

    pub(crate) fn quad_term_mut(&mut self, pos: usize) -> &mut QuadVarTerm {
        &mut self.quad[pos]
    }

    pub(crate) fn bilin_term(&self, idx: usize) -> BilinTerm {
        self.bilin[idx]
    }

    pub(crate) fn set_bilin_term(&mut self, idx: usize, term: BilinTerm) {
        debug_assert!(term.var1 < term.var2);
        self.bilin[idx] = term;
        self.bilin_sorted = false;
        self.bilin_merged = false;
    }

    // === Sorting ===

    /// Sort linear terms by variable id.
    pub fn sort_linear(&mut self) {
        if self.lin_sorted {
            return;
        }
        self.lin.sort_by_key(|t| t.var);
        self.lin_sorted = true;
    }

    /// Sort quadratic variable terms by variable id.
    ///
    /// Bilinear terms reference variables by id, not by position, so no
    /// remapping is needed.
    pub fn sort_quad(&mut self) {
        if self.quad_sorted {
            return;
        }
        self.quad.sort_by_key(|t| t.var);
        self.quad_sorted = true;
    }

    /// Sort bilinear terms by canonical variable pair and rewrite every
    /// adjacency list through the resulting permutation.
    pub fn sort_bilinear(&mut self) {
        if self.bilin_sorted {
            return;
        }
        let mut order: Vec<usize> = (0..self.bilin.len()).collect();
        order.sort_by_key(|&i| (self.bilin[i].var1, self.bilin[i].var2));

        let mut remap = vec![0usize; order.len()];
        for (new_idx, &old_idx) in order.iter().enumerate() {
            remap[old_idx] = new_idx;
        }

        let sorted: Vec<BilinTerm> = order.iter().map(|&old| self.bilin[old]).collect();
        self.bilin = sorted;
        for term in &mut self.quad {
            for idx in &mut term.adjacency {
                *idx = remap[*idx];
            }
        }
        self.bilin_sorted = true;
    }

    // === Merging ===

    /// Merge all three term arrays.
    pub fn merge(&mut self, vars: &dyn VariableStore, zero_tol: f64) {
        self.merge_quad_vars(vars, zero_tol);
        self.merge_bilinear(zero_tol);
        self.merge_linear(zero_tol);
    }

    /// Consolidate duplicate linear terms and drop near-zero coefficients.
    /// Idempotent; a no-op if already merged.
    pub fn merge_linear(&mut self, zero_tol: f64) {
        if self.lin_merged {
            return;
        }
        self.sort_linear();
        let old = std::mem::take(&mut self.lin);
        for term in old {
            if let Some(last) = self.lin.last_mut() {
                if last.var == term.var {
                    last.coef += term.coef;
                    continue;
                }
            }
            self.lin.push(term);
        }
        self.lin.retain(|t| t.coef.abs() > zero_tol);
        self.lin_merged = true;
    }

    /// Consolidate duplicate quadratic variable terms, fold `x^2` into `x`
    /// for binary variables without bilinear couplings, and demote terms
    /// that became purely linear. Idempotent.
    pub fn merge_quad_vars(&mut self, vars: &dyn VariableStore, zero_tol: f64) {
        if self.quad_merged {
            return;
        }
        self.sort_quad();
        let old = std::mem::take(&mut self.quad);
        for term in old {
            if let Some(last) = self.quad.last_mut() {
                if last.var == term.var {
                    last.lin_coef += term.lin_coef;
                    last.sqr_coef += term.sqr_coef;
                    last.adjacency.extend(term.adjacency);
                    continue;
                }
            }
            self.quad.push(term);
        }

        let mut still_sorted = true;
        let mut pos = 0;
        while pos < self.quad.len() {
            let term = &mut self.quad[pos];
            if term.adjacency.is_empty() {
                if term.sqr_coef != 0.0 && vars.is_binary(term.var) {
                    // x^2 = x on {0, 1}
                    term.lin_coef += term.sqr_coef;
                    term.sqr_coef = 0.0;
                }
                if term.sqr_coef.abs() <= zero_tol {
                    let var = term.var;
                    let lin_coef = term.lin_coef;
                    self.quad.swap_remove(pos);
                    still_sorted = false;
                    self.add_linear(var, lin_coef, zero_tol);
                    continue;
                }
            }
            pos += 1;
        }
        self.quad_sorted = still_sorted;
        self.quad_merged = true;
    }

    /// Consolidate duplicate bilinear terms and drop near-zero
    /// coefficients. Idempotent.
    pub fn merge_bilinear(&mut self, zero_tol: f64) {
        if self.bilin_merged {
            return;
        }
        self.sort_bilinear();

        let mut to_remove = Vec::new();
        let mut i = 0;
        while i < self.bilin.len() {
            let mut j = i + 1;
            while j < self.bilin.len()
                && self.bilin[j].var1 == self.bilin[i].var1
                && self.bilin[j].var2 == self.bilin[i].var2
            {
                self.bilin[i].coef += self.bilin[j].coef;
                to_remove.push(j);
                j += 1;
            }
            if self.bilin[i].coef.abs() <= zero_tol {
                to_remove.push(i);
            }
            i = j;
        }
        self.remove_bilinear_set(&to_remove);
        self.bilin_merged = true;
    }

    // === Removal ===

    /// Remove the linear term at `pos` by moving the last term into the
    /// freed slot.
    pub fn remove_linear(&mut self, pos: usize) {
        assert!(pos < self.lin.len(), "linear term position out of range");
        self.lin.swap_remove(pos);
        self.lin_sorted = false;
    }

    /// Remove the quadratic variable term at `pos` by moving the last term
    /// into the freed slot.
    ///
    /// The term must have an empty adjacency list; bilinear terms on the
    /// variable have to be removed first.
    pub fn remove_quad_var(&mut self, pos: usize) {
        assert!(pos < self.quad.len(), "quad term position out of range");
        assert!(
            self.quad[pos].adjacency.is_empty(),
            "removing quad term with live bilinear terms"
        );
        self.quad.swap_remove(pos);
        self.quad_sorted = false;
    }

    /// Remove a set of bilinear terms in one compaction pass.
    ///
    /// The surviving terms keep their relative order; every adjacency list
    /// is rewritten through the old-to-new index map, dropping removed
    /// indices.
    pub fn remove_bilinear_set(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let n = self.bilin.len();
        assert!(*sorted.last().unwrap() < n, "bilinear index out of range");

        let mut remap: Vec<Option<usize>> = Vec::with_capacity(n);
        let mut kept = 0usize;
        let mut next = 0usize;
        for old in 0..n {
            if next < sorted.len() && sorted[next] == old {
                remap.push(None);
                next += 1;
            } else {
                remap.push(Some(kept));
                kept += 1;
            }
        }

        let old_terms = std::mem::take(&mut self.bilin);
        self.bilin = old_terms
            .into_iter()
            .enumerate()
            .filter_map(|(old, term)| remap[old].map(|_| term))
            .collect();

        for term in &mut self.quad {
            term.adjacency.retain_mut(|idx| match remap[*idx] {
                Some(new) => {
                    *idx = new;
                    true
                }
                None => false,
            });
        }
    }

    // === Evaluation and checking ===

    /// Evaluate the term sum at a point (indexed by variable id).
    pub fn eval(&self, x: &[f64]) -> f64 {
        let mut val = 0.0;
        for t in &self.lin {
            val += t.coef * x[t.var];
        }
        for t in &self.quad {
            let xv = x[t.var];
            val += t.sqr_coef * xv * xv + t.lin_coef * xv;
        }
        for t in &self.bilin {
            val += t.coef * x[t.var1] * x[t.var2];
        }
        val
    }

    /// Verify the adjacency invariant: every bilinear term at index `i`
    /// with variables `(v1, v2)` is referenced exactly once from the
    /// quadratic term of `v1`, exactly once from the quadratic term of
    /// `v2`, and from nowhere else; and every pair is canonically ordered.
    pub fn adjacency_consistent(&self) -> bool {
        let mut refs: Vec<Vec<VarId>> = vec![Vec::new(); self.bilin.len()];
        for term in &self.quad {
            for &idx in &term.adjacency {
                if idx >= self.bilin.len() {
                    return false;
                }
                refs[idx].push(term.var);
            }
        }
        for (idx, b) in self.bilin.iter().enumerate() {
            if b.var1 >= b.var2 {
                return false;
            }
            let r = &refs[idx];
            if r.len() != 2 || !r.contains(&b.var1) || !r.contains(&b.var2) {
                return false;
            }
        }
        true
    }
}
