//! Discretized 1D Kohn-Sham energy model.
//!
//! The single-particle Hamiltonian of the 1D Kohn-Sham equation is discretized
//! by finite differences into the tridiagonal Laplacian L (diagonal 2,
//! off-diagonal −1). The energy of p orthonormal states collected in the
//! columns of an n×p matrix X is
//!
//! ```text
//! f(X) = 1/2 tr(XᵀLX) + α/4 ρᵀL⁻¹ρ,    ρ = diag(XXᵀ),
//! ```
//!
//! with Euclidean gradient ∇f(X) = LX + α·Diag(L⁻¹ρ)·X. The vector ρ is the
//! electron density. The term L⁻¹ρ is obtained from the LDLᵀ factorization of
//! L, never by forming the inverse; both the factorization and the solve are
//! O(n).
//!
//! # References
//!
//! \[1\] [Kohn-Sham equations](https://en.wikipedia.org/wiki/Kohn%E2%80%93Sham_equations)

use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Zero;

use crate::penalty::StiefelObjective;

/// A symmetric tridiagonal matrix with constant diagonal and off-diagonal
/// values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tridiagonal<T: RealField + Copy> {
    n: usize,
    diag: T,
    off: T,
}

impl<T: RealField + Copy> Tridiagonal<T> {
    /// Initializes a symmetric tridiagonal matrix with constant coefficients.
    ///
    /// # Panics
    ///
    /// Panics if `n < 2`.
    pub fn new(n: usize, diag: T, off: T) -> Self {
        assert!(n >= 2, "n must be at least 2");
        Self { n, diag, off }
    }

    /// The finite-difference discretization of the negative 1D Laplacian,
    /// tridiag(−1, 2, −1).
    pub fn laplacian_1d(n: usize) -> Self {
        Self::new(n, convert(2.0), convert(-1.0))
    }

    /// Size of the matrix.
    pub fn nrows(&self) -> usize {
        self.n
    }

    /// Computes `y = L x` in O(n).
    pub fn apply(&self, x: &DVector<T>, y: &mut DVector<T>) {
        assert_eq!(x.nrows(), self.n, "vector has wrong dimension");
        assert_eq!(y.nrows(), self.n, "output vector has wrong dimension");

        let n = self.n;
        for i in 0..n {
            let mut yi = self.diag * x[i];
            if i > 0 {
                yi += self.off * x[i - 1];
            }
            if i + 1 < n {
                yi += self.off * x[i + 1];
            }
            y[i] = yi;
        }
    }

    /// Computes `Y = L X` column by column.
    pub fn apply_mat(&self, x: &DMatrix<T>, y: &mut DMatrix<T>) {
        assert_eq!(x.nrows(), self.n, "matrix has wrong number of rows");
        assert_eq!(x.shape(), y.shape(), "output matrix has wrong shape");

        let n = self.n;
        for j in 0..x.ncols() {
            for i in 0..n {
                let mut yij = self.diag * x[(i, j)];
                if i > 0 {
                    yij += self.off * x[(i - 1, j)];
                }
                if i + 1 < n {
                    yij += self.off * x[(i + 1, j)];
                }
                y[(i, j)] = yij;
            }
        }
    }

    /// Computes the LDLᵀ factorization in O(n).
    ///
    /// Returns `None` when a non-positive pivot is encountered, that is, when
    /// the matrix is not positive definite. For the 1D Laplacian the
    /// factorization always exists.
    pub fn factorize(&self) -> Option<TridiagonalFactor<T>> {
        let n = self.n;
        let mut d = DVector::zeros(n);
        let mut l = DVector::zeros(n - 1);

        d[0] = self.diag;
        for i in 0..n - 1 {
            if d[i] <= T::zero() {
                return None;
            }
            l[i] = self.off / d[i];
            d[i + 1] = self.diag - self.off * l[i];
        }
        if d[n - 1] <= T::zero() {
            return None;
        }

        Some(TridiagonalFactor { d, l })
    }

    /// Materializes the matrix as a dense one. Intended for tests and
    /// debugging on small sizes.
    pub fn to_dense(&self) -> DMatrix<T> {
        let mut m = DMatrix::zeros(self.n, self.n);
        for i in 0..self.n {
            m[(i, i)] = self.diag;
            if i + 1 < self.n {
                m[(i, i + 1)] = self.off;
                m[(i + 1, i)] = self.off;
            }
        }
        m
    }
}

/// The LDLᵀ factorization of a symmetric positive definite
/// [`Tridiagonal`] matrix.
///
/// All pivots in `d` are positive, which certifies positive definiteness of
/// the factored matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct TridiagonalFactor<T: RealField + Copy> {
    d: DVector<T>,
    l: DVector<T>,
}

impl<T: RealField + Copy> TridiagonalFactor<T> {
    /// The diagonal of D, that is, the pivots.
    pub fn pivots(&self) -> &DVector<T> {
        &self.d
    }

    /// Solves `L x = b` in O(n).
    pub fn solve(&self, b: &DVector<T>) -> DVector<T> {
        let mut x = b.clone();
        self.solve_mut(&mut x);
        x
    }

    /// Solves `L x = b` in place.
    pub fn solve_mut(&self, b: &mut DVector<T>) {
        let n = self.d.nrows();
        assert_eq!(b.nrows(), n, "vector has wrong dimension");

        // Forward substitution with the unit bidiagonal factor.
        for i in 1..n {
            let correction = self.l[i - 1] * b[i - 1];
            b[i] -= correction;
        }
        // Diagonal scaling.
        for i in 0..n {
            b[i] /= self.d[i];
        }
        // Backward substitution with the transposed factor.
        for i in (0..n - 1).rev() {
            let correction = self.l[i] * b[i + 1];
            b[i] -= correction;
        }
    }
}

/// The discretized Kohn-Sham energy model.
///
/// Holds the discretization matrix and its factorization; all evaluation
/// methods are pure with respect to the iterate.
#[derive(Debug, Clone)]
pub struct KohnSham<T: RealField + Copy> {
    n: usize,
    p: usize,
    alpha: T,
    lap: Tridiagonal<T>,
    factor: TridiagonalFactor<T>,
}

impl<T: RealField + Copy> KohnSham<T> {
    /// Initializes the model for `n` grid points, `p` eigenstates and
    /// density-mixing coefficient `alpha`.
    ///
    /// # Panics
    ///
    /// Panics if `n < 2`, `p == 0`, `p > n` or `alpha < 0`.
    pub fn new(n: usize, p: usize, alpha: T) -> Self {
        assert!(n >= 2, "n must be at least 2");
        assert!(p >= 1, "p must be greater than zero");
        assert!(p <= n, "p must not exceed n");
        assert!(alpha >= T::zero(), "alpha must be non-negative");

        let lap = Tridiagonal::laplacian_1d(n);
        let factor = lap
            .factorize()
            .expect("the 1D Laplacian is symmetric positive definite");

        Self {
            n,
            p,
            alpha,
            lap,
            factor,
        }
    }

    /// The discretization matrix L.
    pub fn laplacian(&self) -> &Tridiagonal<T> {
        &self.lap
    }

    /// The density-mixing coefficient α.
    pub fn alpha(&self) -> T {
        self.alpha
    }

    /// The electron density ρ = diag(XXᵀ), that is, the row-wise squared
    /// norms of X.
    pub fn density(&self, x: &DMatrix<T>) -> DVector<T> {
        let mut rho = DVector::zeros(self.n);
        for j in 0..self.p {
            for i in 0..self.n {
                rho[i] += x[(i, j)] * x[(i, j)];
            }
        }
        rho
    }

    /// The energy f(X) = 1/2 tr(XᵀLX) + α/4 ρᵀL⁻¹ρ.
    pub fn energy(&self, x: &DMatrix<T>) -> T {
        let half: T = convert(0.5);
        let quarter: T = convert(0.25);

        let mut lx = DMatrix::zeros(self.n, self.p);
        self.lap.apply_mat(x, &mut lx);

        let rho = self.density(x);
        let linv_rho = self.factor.solve(&rho);

        half * x.dot(&lx) + quarter * self.alpha * rho.dot(&linv_rho)
    }

    /// The energy and its Euclidean gradient ∇f(X) = LX + α·Diag(L⁻¹ρ)·X.
    ///
    /// The LX product and the tridiagonal solve are shared between the value
    /// and the gradient.
    pub fn energy_and_gradient(&self, x: &DMatrix<T>, grad: &mut DMatrix<T>) -> T {
        assert_eq!(grad.shape(), (self.n, self.p), "gradient has wrong shape");

        let half: T = convert(0.5);
        let quarter: T = convert(0.25);

        self.lap.apply_mat(x, grad);
        let quadratic = half * x.dot(grad);

        let rho = self.density(x);
        let linv_rho = self.factor.solve(&rho);
        let coulomb = quarter * self.alpha * rho.dot(&linv_rho);

        for j in 0..self.p {
            for i in 0..self.n {
                grad[(i, j)] += self.alpha * linv_rho[i] * x[(i, j)];
            }
        }

        quadratic + coulomb
    }
}

impl<T: RealField + Copy> StiefelObjective for KohnSham<T> {
    type Field = T;

    fn nrows(&self) -> usize {
        self.n
    }

    fn ncols(&self) -> usize {
        self.p
    }

    fn eval(&self, x: &DMatrix<T>) -> T {
        self.energy(x)
    }

    fn eval_grad(&self, x: &DMatrix<T>, grad: &mut DMatrix<T>) -> T {
        self.energy_and_gradient(x, grad)
    }
}
