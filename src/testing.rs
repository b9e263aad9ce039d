//! Testing functions and utilities useful for benchmarking, debugging and
//! smoke testing.
//!
//! [`Sphere`] and [`Rosenbrock`] are recommended for first tests of
//! derivative-based algorithms; both come with analytic gradients and known
//! global minima.
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Numerical Methods for Unconstrained Optimization and Nonlinear
//! Equations](https://epubs.siam.org/doi/book/10.1137/1.9781611971200)

use nalgebra::{
    storage::{Storage, StorageMut},
    DVector, Dyn, IsContiguous, OVector, Vector,
};

use crate::core::{Function, Gradient, Problem};

/// Extension trait that provides standard initial points and known optima of
/// testing functions.
pub trait TestFunction: Function {
    /// Standard initial values for the problem. Using the same initial values
    /// is essential for fair comparison of methods.
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>>;

    /// The set of global minimizers (if known and finite).
    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>>;
}

/// Sphere function \[1\], Σ xᵢ². Trivially convex with the global minimum at
/// the origin.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    n: usize,
}

impl Sphere {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for Sphere {
    type Field = f64;

    fn dim(&self) -> usize {
        self.n
    }
}

impl Function for Sphere {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        x.iter().map(|xi| xi * xi).sum()
    }
}

impl Gradient for Sphere {
    fn grad<Sx, Sgx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        gx: &mut Vector<Self::Field, Dyn, Sgx>,
    ) where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sgx: StorageMut<Self::Field, Dyn>,
    {
        for i in 0..self.n {
            gx[i] = 2.0 * x[i];
        }
    }
}

impl TestFunction for Sphere {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::from_element(self.n, 10.0)]
    }

    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::zeros(self.n)]
    }
}

/// Two-dimensional [Rosenbrock
/// function](https://en.wikipedia.org/wiki/Rosenbrock_function) \[1,2\] (also
/// known as Rosenbrock's valley or banana function).
///
/// The global minimum is inside a long, narrow, parabolic shaped flat valley.
/// The challenge is to find the solution inside the valley.
#[derive(Debug, Clone, Copy)]
pub struct Rosenbrock {
    a: f64,
    b: f64,
}

impl Rosenbrock {
    /// Initializes the function with given parameters. The classic choice is
    /// `a = 1`, `b = 100`.
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }
}

impl Default for Rosenbrock {
    fn default() -> Self {
        Self::new(1.0, 100.0)
    }
}

impl Problem for Rosenbrock {
    type Field = f64;

    fn dim(&self) -> usize {
        2
    }
}

impl Function for Rosenbrock {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        (self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2)
    }
}

impl Gradient for Rosenbrock {
    fn grad<Sx, Sgx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        gx: &mut Vector<Self::Field, Dyn, Sgx>,
    ) where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sgx: StorageMut<Self::Field, Dyn>,
    {
        gx[0] = -2.0 * (self.a - x[0]) - 4.0 * self.b * x[0] * (x[1] - x[0].powi(2));
        gx[1] = 2.0 * self.b * (x[1] - x[0].powi(2));
    }
}

impl TestFunction for Rosenbrock {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![
            DVector::from_vec(vec![-1.2, 1.0]),
            DVector::from_vec(vec![6.39, -0.221]),
        ]
    }

    fn optima(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::from_vec(vec![self.a, self.a * self.a])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use crate::derivatives::GradientApprox;

    #[test]
    fn gradients_vanish_at_optima() {
        let sphere = Sphere::new(4);
        let rosenbrock = Rosenbrock::default();

        for x in sphere.optima() {
            let mut gx = x.clone_owned();
            sphere.grad(&x, &mut gx);
            assert_abs_diff_eq!(gx.norm(), 0.0, epsilon = 1e-12);
        }

        for x in rosenbrock.optima() {
            let mut gx = x.clone_owned();
            rosenbrock.grad(&x, &mut gx);
            assert_abs_diff_eq!(gx.norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn rosenbrock_gradient_matches_finite_differences() {
        let f = Rosenbrock::default();

        for mut x in f.initials() {
            let mut analytic = x.clone_owned();
            f.grad(&x, &mut analytic);

            let fx = f.apply(&x);
            let approximate = GradientApprox::compute(&f, &mut x, fx);

            assert_relative_eq!(&analytic, &*approximate, max_relative = 1e-4, epsilon = 1e-4);
        }
    }
}
