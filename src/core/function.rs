use nalgebra::{
    storage::{Storage, StorageMut},
    Dyn, IsContiguous, Vector,
};

use super::base::Problem;

/// Definition of a function.
///
/// ## Defining a function
///
/// A function is any type that implements [`Function`] and [`Problem`] traits.
///
/// ```rust
/// use expen::nalgebra as na;
/// use expen::{Function, Problem};
/// use na::{Dyn, IsContiguous};
///
/// struct Rosenbrock {
///     a: f64,
///     b: f64,
/// }
///
/// impl Problem for Rosenbrock {
///     type Field = f64;
///
///     fn dim(&self) -> usize {
///         2
///     }
/// }
///
/// impl Function for Rosenbrock {
///     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
///     where
///         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
///     {
///         // Compute the function value.
///         (self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2)
///     }
/// }
/// ```
pub trait Function: Problem {
    /// Calculates the function value in given point.
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous;
}

/// Definition of a function with an analytic gradient.
///
/// Derivative-based algorithms (see [algo](crate::algo)) require this trait.
/// The consistency of [`grad`](Gradient::grad) with
/// [`apply`](Function::apply) can be verified with the finite-difference
/// approximation in the [derivatives](crate::derivatives) module.
///
/// ## Defining a gradient
///
/// ```rust
/// use expen::nalgebra as na;
/// use expen::{Function, Gradient, Problem};
/// use na::{Dyn, IsContiguous};
///
/// struct Rosenbrock {
///     a: f64,
///     b: f64,
/// }
///
/// impl Problem for Rosenbrock {
///     type Field = f64;
///
///     fn dim(&self) -> usize {
///         2
///     }
/// }
///
/// impl Function for Rosenbrock {
///     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
///     where
///         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
///     {
///         (self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2)
///     }
/// }
///
/// impl Gradient for Rosenbrock {
///     fn grad<Sx, Sgx>(
///         &self,
///         x: &na::Vector<Self::Field, Dyn, Sx>,
///         gx: &mut na::Vector<Self::Field, Dyn, Sgx>,
///     ) where
///         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
///         Sgx: na::storage::StorageMut<Self::Field, Dyn>,
///     {
///         gx[0] = -2.0 * (self.a - x[0])
///             - 4.0 * self.b * x[0] * (x[1] - x[0].powi(2));
///         gx[1] = 2.0 * self.b * (x[1] - x[0].powi(2));
///     }
/// }
/// ```
pub trait Gradient: Function {
    /// Calculates the gradient of the function in given point.
    fn grad<Sx, Sgx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        gx: &mut Vector<Self::Field, Dyn, Sgx>,
    ) where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sgx: StorageMut<Self::Field, Dyn>;

    /// Calculates the function value and the gradient in given point at once.
    ///
    /// The default implementation simply calls [`grad`](Gradient::grad) and
    /// [`apply`](Function::apply). Implementors whose value and gradient share
    /// expensive intermediates should override it.
    fn apply_grad<Sx, Sgx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        gx: &mut Vector<Self::Field, Dyn, Sgx>,
    ) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sgx: StorageMut<Self::Field, Dyn>,
    {
        self.grad(x, gx);
        self.apply(x)
    }
}
