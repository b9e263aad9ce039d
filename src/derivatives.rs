//! Finite-difference approximation of derivatives.
//!
//! Used to verify that an analytic [`Gradient`](crate::core::Gradient)
//! implementation is consistent with its [`Function`](crate::core::Function)
//! value.

use std::ops::Deref;

use nalgebra::{
    convert, storage::StorageMut, ComplexField, DimName, Dyn, IsContiguous, OVector, RealField,
    Vector, U1,
};
use num_traits::{One, Zero};

use crate::core::{Function, Problem};

/// Square root of double precision machine epsilon. This value is a standard
/// constant for epsilons in approximating first-order derivative-based
/// concepts.
pub const EPSILON_SQRT: f64 = 0.000000014901161193847656;

/// Forward-difference approximation of the gradient of a function.
#[derive(Debug)]
pub struct GradientApprox<F: Problem> {
    grad: OVector<F::Field, Dyn>,
}

impl<F: Function> GradientApprox<F> {
    /// Approximates the gradient of the function in given point, with `fx`
    /// being the function value in that point.
    ///
    /// The parameter `x` is mutable to allow temporary mutations avoiding
    /// unnecessary allocations, but after this method ends, the content of
    /// the vector is exactly the same as before.
    pub fn compute<Sx>(f: &F, x: &mut Vector<F::Field, Dyn, Sx>, fx: F::Field) -> Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
    {
        let eps: F::Field = convert(EPSILON_SQRT);
        let mut grad = OVector::zeros_generic(Dyn(f.dim()), U1::name());

        for i in 0..f.dim() {
            let xi = x[i];

            // Compute the step size. We would like to have the step as small
            // as possible (to be as close to the real derivative as possible).
            // But at the same time, very small step could cause
            // f(x + e_i * step_i) ~= f(x) with very small number of good
            // digits. A reasonable balance is scaling the step by x_i itself,
            // clamped away from zero by the typical magnitude one.
            let magnitude = F::Field::one();
            let step = eps * xi.abs().max(magnitude) * F::Field::one().copysign(xi);
            let step = if step == F::Field::zero() { eps } else { step };

            // Update the point.
            x[i] = xi + step;
            let fxi = f.apply(x);

            // grad[i] = (f(x + e_i * step_i) - f(x)) / step_i.
            grad[i] = (fxi - fx) / step;

            // Restore the original value.
            x[i] = xi;
        }

        Self { grad }
    }
}

impl<F: Problem> Deref for GradientApprox<F> {
    type Target = OVector<F::Field, Dyn>;

    fn deref(&self) -> &Self::Target {
        &self.grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    use crate::testing::{Rosenbrock, Sphere};

    #[test]
    fn sphere_gradient() {
        let mut x = dvector![3.0, -3.0, 0.5];
        let f = Sphere::new(3);
        let fx = f.apply(&x);

        let grad = GradientApprox::compute(&f, &mut x, fx);

        let expected = dvector![6.0, -6.0, 1.0];
        assert_abs_diff_eq!(&*grad, &expected, epsilon = 1e-6);
    }

    #[test]
    fn rosenbrock_gradient() {
        let mut x = dvector![-1.2, 1.0];
        let f = Rosenbrock::new(1.0, 100.0);
        let fx = f.apply(&x);

        let grad = GradientApprox::compute(&f, &mut x, fx);

        // Analytic gradient of the Rosenbrock function at (-1.2, 1).
        let expected = dvector![-215.6, -88.0];
        assert_abs_diff_eq!(&*grad, &expected, epsilon = 1e-3);
    }

    #[test]
    fn point_is_restored() {
        let mut x = dvector![1.0, 2.0];
        let f = Sphere::new(2);
        let fx = f.apply(&x);

        GradientApprox::compute(&f, &mut x, fx);

        assert_eq!(x, dvector![1.0, 2.0]);
    }
}
