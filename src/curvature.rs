//! Curvature classification of the quadratic part.
//!
//! Decides whether the quadratic function is convex, concave, both (linear
//! or a zero quadratic), or indefinite. Cheap structural checks come first;
//! only when bilinear couplings make the answer non-obvious is the dense
//! Hessian sub-matrix built and its eigenvalue spectrum computed.

use nalgebra::linalg::SymmetricEigen;
use nalgebra::DMatrix;

use crate::terms::QuadTermStore;

/// Curvature of a quadratic function.
///
/// This is a small lattice, not a boolean pair: `Linear` means convex and
/// concave at the same time (valid for a vanishing quadratic part).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curvature {
    /// Not yet classified.
    Unknown,

    /// Convex (smallest Hessian eigenvalue >= -tol).
    Convex,

    /// Concave (largest Hessian eigenvalue <= tol).
    Concave,

    /// Both convex and concave: no effective quadratic part.
    Linear,

    /// Neither convex nor concave.
    Indefinite,
}

impl Curvature {
    /// True if the function is convex.
    pub fn is_convex(self) -> bool {
        matches!(self, Curvature::Convex | Curvature::Linear)
    }

    /// True if the function is concave.
    pub fn is_concave(self) -> bool {
        matches!(self, Curvature::Concave | Curvature::Linear)
    }

    fn from_flags(convex: bool, concave: bool) -> Self {
        match (convex, concave) {
            (true, true) => Curvature::Linear,
            (true, false) => Curvature::Convex,
            (false, true) => Curvature::Concave,
            (false, false) => Curvature::Indefinite,
        }
    }
}

/// Dense symmetric eigenvalue backend.
///
/// The analyzer degrades to `Indefinite` when no backend is available; it
/// never silently assumes convexity.
pub trait EigenSolver {
    /// Eigenvalues of a symmetric matrix, in ascending order, or `None` if
    /// the decomposition is unavailable.
    fn symmetric_eigenvalues(&self, matrix: DMatrix<f64>) -> Option<Vec<f64>>;
}

/// Eigenvalue backend based on nalgebra's symmetric eigendecomposition.
#[derive(Debug, Default, Clone)]
pub struct DenseEigenSolver;

impl EigenSolver for DenseEigenSolver {
    fn symmetric_eigenvalues(&self, matrix: DMatrix<f64>) -> Option<Vec<f64>> {
        let eig = SymmetricEigen::new(matrix);
        let mut vals: Vec<f64> = eig.eigenvalues.iter().copied().collect();
        if vals.iter().any(|v| !v.is_finite()) {
            return None;
        }
        vals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        Some(vals)
    }
}

/// Classifies the curvature of quadratic term stores.
pub struct CurvatureAnalyzer {
    tol: f64,
    eigen: Option<Box<dyn EigenSolver>>,
}

impl CurvatureAnalyzer {
    /// Analyzer with the default dense eigenvalue backend.
    pub fn new(tol: f64) -> Self {
        Self {
            tol,
            eigen: Some(Box::new(DenseEigenSolver)),
        }
    }

    /// Analyzer without an eigenvalue backend: bilinearly coupled
    /// functions beyond the 2x2 closed form classify as indefinite.
    pub fn without_eigensolver(tol: f64) -> Self {
        Self { tol, eigen: None }
    }

    /// Analyzer with a custom eigenvalue backend.
    pub fn with_eigensolver(tol: f64, eigen: Box<dyn EigenSolver>) -> Self {
        Self {
            tol,
            eigen: Some(eigen),
        }
    }

    /// Classify the quadratic part of `store`.
    pub fn classify(&self, store: &QuadTermStore) -> Curvature {
        let quad = store.quad_terms();
        let bilin = store.bilin_terms();

        if quad.is_empty() && bilin.is_empty() {
            return Curvature::Linear;
        }

        // Without bilinear couplings the Hessian is diagonal.
        if bilin.is_empty() {
            let mut convex = true;
            let mut concave = true;
            for t in quad {
                if t.sqr_coef < -self.tol {
                    convex = false;
                }
                if t.sqr_coef > self.tol {
                    concave = false;
                }
            }
            return Curvature::from_flags(convex, concave);
        }

        // Two variables, one bilinear term: closed-form 2x2 test on
        // a x^2 + b y^2 + c x y.
        if quad.len() == 2 && bilin.len() == 1 {
            let a = quad[0].sqr_coef;
            let b = quad[1].sqr_coef;
            let c = bilin[0].coef;
            let det_ok = 4.0 * a * b >= c * c - self.tol;
            let convex = a >= -self.tol && b >= -self.tol && det_ok;
            let concave = a <= self.tol && b <= self.tol && det_ok;
            return Curvature::from_flags(convex, concave);
        }

        // Diagonal early exit: a negative square coefficient anywhere rules
        // out convexity, a positive one rules out concavity. If both are
        // ruled out there is no need to build the matrix.
        let mut convex_possible = true;
        let mut concave_possible = true;
        for t in quad {
            if t.sqr_coef < -self.tol {
                convex_possible = false;
            }
            if t.sqr_coef > self.tol {
                concave_possible = false;
            }
        }
        if !convex_possible && !concave_possible {
            return Curvature::Indefinite;
        }

        // Variables without bilinear couplings only contribute their
        // diagonal entry, which the early exit already accounted for; the
        // matrix is restricted to the coupled variables.
        let coupled: Vec<usize> = (0..quad.len())
            .filter(|&i| !quad[i].adjacency.is_empty())
            .collect();
        let index_of: std::collections::HashMap<_, _> = coupled
            .iter()
            .enumerate()
            .map(|(dense, &pos)| (quad[pos].var, dense))
            .collect();

        let n = coupled.len();
        let mut h = DMatrix::<f64>::zeros(n, n);
        for (dense, &pos) in coupled.iter().enumerate() {
            h[(dense, dense)] = quad[pos].sqr_coef;
        }
        for t in bilin {
            let (Some(&i), Some(&j)) = (index_of.get(&t.var1), index_of.get(&t.var2)) else {
                // A bilinear endpoint without a coupled quadratic term
                // would violate the adjacency invariant.
                debug_assert!(false, "bilinear term on uncoupled variable");
                return Curvature::Indefinite;
            };
            h[(i, j)] += t.coef / 2.0;
            h[(j, i)] += t.coef / 2.0;
        }

        let Some(eigen) = self.eigen.as_ref() else {
            return Curvature::Indefinite;
        };
        let Some(vals) = eigen.symmetric_eigenvalues(h) else {
            return Curvature::Indefinite;
        };
        let min_eig = vals.first().copied().unwrap_or(0.0);
        let max_eig = vals.last().copied().unwrap_or(0.0);

        let convex = convex_possible && min_eig >= -self.tol;
        let concave = concave_possible && max_eig <= self.tol;
        Curvature::from_flags(convex, concave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> CurvatureAnalyzer {
        CurvatureAnalyzer::new(1e-9)
    }

    #[test]
    fn test_sum_of_squares_is_convex() {
        let mut store = QuadTermStore::new();
        store.add_quad_var(0, 0.0, 1.0);
        store.add_quad_var(1, 0.0, 1.0);

        let c = analyzer().classify(&store);
        assert!(c.is_convex());
        assert!(!c.is_concave());
    }

    #[test]
    fn test_negated_squares_are_concave() {
        let mut store = QuadTermStore::new();
        store.add_quad_var(0, 1.0, -2.0);
        store.add_quad_var(1, 0.0, -0.5);

        let c = analyzer().classify(&store);
        assert!(c.is_concave());
        assert!(!c.is_convex());
    }

    #[test]
    fn test_pure_bilinear_is_indefinite() {
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 0.0, 0.0);
        let py = store.add_quad_var(1, 0.0, 0.0);
        store.add_bilinear(px, py, 1.0).unwrap();

        assert_eq!(analyzer().classify(&store), Curvature::Indefinite);
    }

    #[test]
    fn test_two_by_two_closed_form() {
        // x^2 + y^2 + xy: eigenvalues 0.5 and 1.5, convex.
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 0.0, 1.0);
        let py = store.add_quad_var(1, 0.0, 1.0);
        store.add_bilinear(px, py, 1.0).unwrap();
        assert_eq!(analyzer().classify(&store), Curvature::Convex);

        // x^2 + y^2 + 3xy: indefinite.
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 0.0, 1.0);
        let py = store.add_quad_var(1, 0.0, 1.0);
        store.add_bilinear(px, py, 3.0).unwrap();
        assert_eq!(analyzer().classify(&store), Curvature::Indefinite);
    }

    #[test]
    fn test_no_quadratic_part_is_linear() {
        let mut store = QuadTermStore::new();
        store.add_linear(0, 1.0, 1e-9);

        let c = analyzer().classify(&store);
        assert_eq!(c, Curvature::Linear);
        assert!(c.is_convex() && c.is_concave());
    }

    #[test]
    fn test_general_case_uses_eigenvalues() {
        // x^2 + y^2 + z^2 + xy + yz + xz: Hessian eigenvalues {1, 1, 4}/2
        // scaled; positive semidefinite, convex.
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 0.0, 1.0);
        let py = store.add_quad_var(1, 0.0, 1.0);
        let pz = store.add_quad_var(2, 0.0, 1.0);
        store.add_bilinear(px, py, 1.0).unwrap();
        store.add_bilinear(py, pz, 1.0).unwrap();
        store.add_bilinear(px, pz, 1.0).unwrap();
        assert_eq!(analyzer().classify(&store), Curvature::Convex);

        // Same couplings but stronger: x^2 + y^2 + z^2 + 3(xy + yz + xz)
        // has a negative eigenvalue.
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 0.0, 1.0);
        let py = store.add_quad_var(1, 0.0, 1.0);
        let pz = store.add_quad_var(2, 0.0, 1.0);
        store.add_bilinear(px, py, 3.0).unwrap();
        store.add_bilinear(py, pz, 3.0).unwrap();
        store.add_bilinear(px, pz, 3.0).unwrap();
        assert_eq!(analyzer().classify(&store), Curvature::Indefinite);
    }

    #[test]
    fn test_diagonal_early_exit() {
        // Mixed diagonal signs with couplings: indefinite without any
        // eigensolver involvement.
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 0.0, 1.0);
        let py = store.add_quad_var(1, 0.0, -1.0);
        let pz = store.add_quad_var(2, 0.0, 1.0);
        store.add_bilinear(px, py, 0.1).unwrap();
        store.add_bilinear(py, pz, 0.1).unwrap();

        let a = CurvatureAnalyzer::without_eigensolver(1e-9);
        assert_eq!(a.classify(&store), Curvature::Indefinite);
    }

    #[test]
    fn test_missing_eigensolver_degrades() {
        // Convex case that needs the eigensolver: without one, the
        // conservative answer is indefinite.
        let mut store = QuadTermStore::new();
        let px = store.add_quad_var(0, 0.0, 1.0);
        let py = store.add_quad_var(1, 0.0, 1.0);
        let pz = store.add_quad_var(2, 0.0, 1.0);
        store.add_bilinear(px, py, 1.0).unwrap();
        store.add_bilinear(py, pz, 1.0).unwrap();
        store.add_bilinear(px, pz, 1.0).unwrap();

        let a = CurvatureAnalyzer::without_eigensolver(1e-9);
        assert_eq!(a.classify(&store), Curvature::Indefinite);
    }
}
