//! Geometry of the Stiefel manifold.
//!
//! The [Stiefel manifold](https://en.wikipedia.org/wiki/Stiefel_manifold)
//! St(n, p) is the set of n×p matrices with orthonormal columns (XᵀX = I).
//! This module provides the maps needed by the smooth exact penalty
//! reformulation in [penalty](crate::penalty):
//!
//! * the second-order retraction A(Z) = Z(3/2·I − 1/2·ZᵀZ) and the exact
//!   adjoint of its differential,
//! * the orthonormality constraint C(Z) = ZᵀZ − I and the adjoint of its
//!   differential,
//! * the projection onto the tangent space at a feasible point,
//! * random and warm-started initial points and the polar projection onto the
//!   manifold.
//!
//! All maps are pure functions of the matrix arguments; the [`Stiefel`] value
//! itself only carries the dimensions.
//!
//! # References
//!
//! \[1\] [A Class of Smooth Exact Penalty Function Methods for Optimization
//! Problems with Orthogonality Constraints](https://arxiv.org/abs/1907.12424)

use nalgebra::{convert, DMatrix, RealField};
use num_traits::One;
use rand::Rng;
use rand_distr::StandardNormal;

/// Symmetrization of a square matrix, (M + Mᵀ)/2.
pub fn sym<T: RealField + Copy>(m: &DMatrix<T>) -> DMatrix<T> {
    let half: T = convert(0.5);
    (m + m.transpose()) * half
}

/// The Stiefel manifold St(n, p) of n×p matrices with orthonormal columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stiefel {
    n: usize,
    p: usize,
}

impl Stiefel {
    /// Initializes the manifold with given dimensions.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0` or `p == 0` or `p > n`.
    pub fn new(n: usize, p: usize) -> Self {
        assert!(n >= 1, "n must be greater than zero");
        assert!(p >= 1, "p must be greater than zero");
        assert!(p <= n, "p must not exceed n");
        Self { n, p }
    }

    /// Number of rows of the matrices on the manifold.
    pub fn nrows(&self) -> usize {
        self.n
    }

    /// Number of columns of the matrices on the manifold.
    pub fn ncols(&self) -> usize {
        self.p
    }

    /// Dimension of the ambient space, n·p.
    pub fn dim(&self) -> usize {
        self.n * self.p
    }

    /// The second-order retraction A(Z) = Z(3/2·I − 1/2·ZᵀZ).
    ///
    /// Maps an arbitrary n×p matrix toward the manifold. Feasible points are
    /// fixed points of this map.
    pub fn retract<T: RealField + Copy>(&self, z: &DMatrix<T>) -> DMatrix<T> {
        let half: T = convert(0.5);
        let three_halves: T = convert(1.5);

        let ztz = z.tr_mul(z);
        z * three_halves - z * (ztz * half)
    }

    /// The exact adjoint of the differential of [`retract`](Stiefel::retract).
    ///
    /// Propagates a gradient `g` at A(Z) back to a gradient at Z:
    /// 3/2·G − 1/2·G(ZᵀZ) − Z·sym(ZᵀG). On the manifold it coincides with
    /// [`project_tangent`](Stiefel::project_tangent).
    pub fn retract_adjoint<T: RealField + Copy>(
        &self,
        z: &DMatrix<T>,
        g: &DMatrix<T>,
    ) -> DMatrix<T> {
        let half: T = convert(0.5);
        let three_halves: T = convert(1.5);

        let ztz = z.tr_mul(z);
        let ztg = z.tr_mul(g);
        g * three_halves - g * (ztz * half) - z * sym(&ztg)
    }

    /// Projection of `g` onto the tangent space at a feasible point `x`,
    /// G − X·sym(XᵀG).
    ///
    /// Applied to the Euclidean gradient, this yields the Riemannian gradient.
    pub fn project_tangent<T: RealField + Copy>(
        &self,
        x: &DMatrix<T>,
        g: &DMatrix<T>,
    ) -> DMatrix<T> {
        let xtg = x.tr_mul(g);
        g - x * sym(&xtg)
    }

    /// The orthonormality constraint C(Z) = ZᵀZ − I.
    pub fn constraint<T: RealField + Copy>(&self, z: &DMatrix<T>) -> DMatrix<T> {
        let mut c = z.tr_mul(z);
        for i in 0..self.p {
            c[(i, i)] -= T::one();
        }
        c
    }

    /// The adjoint of the differential of the constraint, X·sym(Λ).
    pub fn constraint_adjoint<T: RealField + Copy>(
        &self,
        x: &DMatrix<T>,
        lambda: &DMatrix<T>,
    ) -> DMatrix<T> {
        x * sym(lambda)
    }

    /// Constraint violation ‖ZᵀZ − I‖_F.
    pub fn feasibility<T: RealField + Copy>(&self, z: &DMatrix<T>) -> T {
        self.constraint(z).norm()
    }

    /// Generates a random point on the manifold.
    ///
    /// The point is the thin-QR orthonormalization of an n×p matrix with
    /// independent standard-normal entries.
    pub fn random_point<T, R>(&self, rng: &mut R) -> DMatrix<T>
    where
        T: RealField + Copy,
        R: Rng + ?Sized,
    {
        let raw = DMatrix::from_fn(self.n, self.p, |_, _| {
            convert(rng.sample::<f64, _>(StandardNormal))
        });
        raw.qr().q()
    }

    /// Returns an initial point on the manifold, possibly from a warm start.
    ///
    /// With `warm` given, the matrix is used as-is when it is already feasible
    /// (violation below `1e-6`) and re-orthonormalized by a thin QR otherwise.
    /// Without a warm start this is [`random_point`](Stiefel::random_point).
    pub fn init_point<T, R>(&self, rng: &mut R, warm: Option<DMatrix<T>>) -> DMatrix<T>
    where
        T: RealField + Copy,
        R: Rng + ?Sized,
    {
        match warm {
            Some(x) => {
                assert_eq!(x.nrows(), self.n, "warm start has wrong number of rows");
                assert_eq!(x.ncols(), self.p, "warm start has wrong number of columns");

                if self.feasibility(&x) > convert(1e-6) {
                    x.qr().q()
                } else {
                    x
                }
            }
            None => self.random_point(rng),
        }
    }

    /// Projects an arbitrary full-rank matrix onto the nearest point of the
    /// manifold, UVᵀ from the thin SVD Y = UΣVᵀ.
    pub fn nearest_point<T: RealField + Copy>(&self, y: &DMatrix<T>) -> DMatrix<T> {
        let svd = y.clone().svd(true, true);
        let u = svd.u.expect("SVD computed with singular vectors");
        let v_t = svd.v_t.expect("SVD computed with singular vectors");
        u * v_t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_point_is_feasible() {
        let mut rng = StdRng::seed_from_u64(3);

        for &(n, p) in &[(4, 1), (10, 3), (25, 25)] {
            let st = Stiefel::new(n, p);
            let x: DMatrix<f64> = st.random_point(&mut rng);

            assert_eq!(x.nrows(), n);
            assert_eq!(x.ncols(), p);
            assert_abs_diff_eq!(st.feasibility(&x), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn retraction_fixes_feasible_points() {
        let mut rng = StdRng::seed_from_u64(3);

        let st = Stiefel::new(12, 4);
        let x: DMatrix<f64> = st.random_point(&mut rng);
        let ax = st.retract(&x);

        assert_abs_diff_eq!(&ax, &x, epsilon = 1e-13);
    }

    #[test]
    fn retraction_moves_toward_manifold() {
        let mut rng = StdRng::seed_from_u64(7);

        let st = Stiefel::new(12, 4);
        let x: DMatrix<f64> = st.random_point(&mut rng);
        // Small infeasible perturbation.
        let z = &x + DMatrix::from_fn(12, 4, |_, _| 0.01 * rng.sample::<f64, _>(StandardNormal));

        assert!(st.feasibility(&st.retract(&z)) < st.feasibility(&z));
    }

    #[test]
    fn adjoint_equals_tangent_projection_on_manifold() {
        let mut rng = StdRng::seed_from_u64(11);

        let st = Stiefel::new(15, 5);
        let x: DMatrix<f64> = st.random_point(&mut rng);
        let g = DMatrix::from_fn(15, 5, |_, _| rng.sample::<f64, _>(StandardNormal));

        let exact = st.retract_adjoint(&x, &g);
        let projected = st.project_tangent(&x, &g);

        assert_abs_diff_eq!(&exact, &projected, epsilon = 1e-12);
    }

    #[test]
    fn retract_adjoint_matches_finite_difference_of_retraction() {
        let mut rng = StdRng::seed_from_u64(13);

        let st = Stiefel::new(8, 3);
        let z = DMatrix::from_fn(8, 3, |_, _| rng.sample::<f64, _>(StandardNormal));
        let g = DMatrix::from_fn(8, 3, |_, _| rng.sample::<f64, _>(StandardNormal));

        // <JA(Z)ᵀ G, E> must equal d/dt <G, A(Z + tE)> at t = 0 for any
        // direction E.
        let adj = st.retract_adjoint(&z, &g);
        let eps = 1e-6;

        for _ in 0..5 {
            let e = DMatrix::from_fn(8, 3, |_, _| rng.sample::<f64, _>(StandardNormal));
            let plus = st.retract(&(&z + &e * eps));
            let minus = st.retract(&(&z - &e * eps));
            let fd = (plus - minus).dot(&g) / (2.0 * eps);

            assert_abs_diff_eq!(adj.dot(&e), fd, epsilon = 1e-5);
        }
    }

    #[test]
    fn constraint_adjoint_symmetrizes() {
        let mut rng = StdRng::seed_from_u64(17);

        let st = Stiefel::new(6, 3);
        let x: DMatrix<f64> = st.random_point(&mut rng);
        let lambda = DMatrix::from_fn(3, 3, |_, _| rng.sample::<f64, _>(StandardNormal));

        let expected = &x * sym(&lambda);
        assert_abs_diff_eq!(&st.constraint_adjoint(&x, &lambda), &expected, epsilon = 1e-14);
    }

    #[test]
    fn init_point_reorthonormalizes_infeasible_warm_start() {
        let mut rng = StdRng::seed_from_u64(19);

        let st = Stiefel::new(10, 4);
        let warm = DMatrix::from_fn(10, 4, |_, _| rng.sample::<f64, _>(StandardNormal));
        let x: DMatrix<f64> = st.init_point(&mut rng, Some(warm));

        assert_abs_diff_eq!(st.feasibility(&x), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn init_point_keeps_feasible_warm_start() {
        let mut rng = StdRng::seed_from_u64(23);

        let st = Stiefel::new(10, 4);
        let warm: DMatrix<f64> = st.random_point(&mut rng);
        let x = st.init_point(&mut rng, Some(warm.clone()));

        assert_eq!(x, warm);
    }

    #[test]
    fn nearest_point_is_identity_on_manifold() {
        let mut rng = StdRng::seed_from_u64(29);

        let st = Stiefel::new(9, 3);
        let x: DMatrix<f64> = st.random_point(&mut rng);
        let projected = st.nearest_point(&x);

        assert_abs_diff_eq!(&projected, &x, epsilon = 1e-12);
    }

    #[test]
    fn nearest_point_is_feasible() {
        let mut rng = StdRng::seed_from_u64(31);

        let st = Stiefel::new(9, 3);
        let y = DMatrix::from_fn(9, 3, |_, _| rng.sample::<f64, _>(StandardNormal));
        let x: DMatrix<f64> = st.nearest_point(&y);

        assert_abs_diff_eq!(st.feasibility(&x), 0.0, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "p must not exceed n")]
    fn wide_matrices_are_rejected() {
        Stiefel::new(3, 5);
    }
}
