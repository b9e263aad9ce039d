//! High-level API for running the minimization.
//!
//! The [`Minimizer`] encapsulates the solver state and provides a simple API
//! to run the iterative process to convergence. It is configured through its
//! builder:
//!
//! ```rust
//! use expen::testing::Sphere;
//! use expen::Minimizer;
//!
//! let f = Sphere::new(4);
//!
//! let mut minimizer = Minimizer::builder(&f)
//!     .with_initial(vec![10.0; 4])
//!     .with_gtol(1e-8)
//!     .build();
//!
//! let report = minimizer.run();
//! assert!(report.success());
//! ```
//!
//! If you need more control over the iteration process, you can use
//! [`find`](Minimizer::find) with a custom stopping criterion, or do the
//! iterations manually:
//!
//! ```rust
//! # use expen::testing::Sphere;
//! # use expen::Minimizer;
//! #
//! # let f = Sphere::new(4);
//! # let mut minimizer = Minimizer::builder(&f).with_initial(vec![10.0; 4]).build();
//! #
//! loop {
//!     let value = minimizer.next().expect("no solver error");
//! #   break;
//! }
//! ```

use log::debug;

use nalgebra::{convert, DimName, Dyn, OVector, RealField, U1};

use crate::algo::lbfgs::{Lbfgs, LbfgsError, LbfgsOptions};
use crate::core::{Gradient, Problem};

/// Builder for the [`Minimizer`].
pub struct MinimizerBuilder<'a, F: Problem> {
    f: &'a F,
    x0: Option<Vec<F::Field>>,
    gtol: F::Field,
    max_iters: usize,
    options: LbfgsOptions<F>,
}

impl<'a, F: Gradient> MinimizerBuilder<'a, F> {
    fn new(f: &'a F) -> Self {
        Self {
            f,
            x0: None,
            gtol: convert(1e-6),
            max_iters: 1000,
            options: LbfgsOptions::default(),
        }
    }

    /// Sets the initial point from which the iterative process starts.
    /// Required.
    pub fn with_initial(mut self, x0: Vec<F::Field>) -> Self {
        self.x0 = Some(x0);
        self
    }

    /// Sets the convergence tolerance on the ∞-norm of the gradient. Default:
    /// `1e-6`.
    pub fn with_gtol(mut self, gtol: F::Field) -> Self {
        self.gtol = gtol;
        self
    }

    /// Sets the maximum number of iterations for [`run`](Minimizer::run).
    /// Default: `1000`.
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Sets the solver options.
    pub fn with_options(mut self, options: LbfgsOptions<F>) -> Self {
        self.options = options;
        self
    }

    /// Builds the [`Minimizer`].
    ///
    /// # Panics
    ///
    /// Panics if no initial point was given or if its length does not match
    /// the problem dimension.
    pub fn build(self) -> Minimizer<'a, F> {
        let x0 = self.x0.expect("initial point is required");
        assert_eq!(x0.len(), self.f.dim(), "initial point has wrong dimension");

        let algo = Lbfgs::with_options(self.f, self.options);
        let x = OVector::from_vec_generic(Dyn(self.f.dim()), U1::name(), x0);

        Minimizer {
            f: self.f,
            algo,
            x,
            fx: convert(f64::INFINITY),
            gtol: self.gtol,
            max_iters: self.max_iters,
        }
    }
}

/// Status of a finished minimization, see [`Report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The gradient tolerance was reached.
    Converged,
    /// The iteration limit was reached before the gradient tolerance.
    IterationLimit,
    /// The line search failed to make further progress.
    LineSearchFailed,
    /// An invalid value (NaN) of the function or the gradient occurred.
    InvalidValue,
}

/// Final state of a minimization run, see [`Minimizer::run`].
#[derive(Debug, Clone)]
pub struct Report<T: RealField + Copy> {
    /// The best point found.
    pub x: OVector<T, Dyn>,
    /// The function value at `x`.
    pub value: T,
    /// The ∞-norm of the gradient at `x`.
    pub grad_norm: T,
    /// Number of performed iterations.
    pub iterations: usize,
    /// Number of function-and-gradient evaluations.
    pub f_evals: usize,
    /// How the run finished.
    pub status: Status,
}

impl<T: RealField + Copy> Report<T> {
    /// Whether the run converged to the gradient tolerance.
    pub fn success(&self) -> bool {
        self.status == Status::Converged
    }
}

/// The driver for the minimization process.
///
/// See [module](self) documentation for usage.
pub struct Minimizer<'a, F: Problem> {
    f: &'a F,
    algo: Lbfgs<F>,
    x: OVector<F::Field, Dyn>,
    fx: F::Field,
    gtol: F::Field,
    max_iters: usize,
}

impl<'a, F: Gradient> Minimizer<'a, F> {
    /// Returns the builder for specifying the settings.
    pub fn builder(f: &'a F) -> MinimizerBuilder<'a, F> {
        MinimizerBuilder::new(f)
    }

    /// Returns reference to the current point.
    pub fn x(&self) -> &[F::Field] {
        self.x.as_slice()
    }

    /// Returns the current function value.
    pub fn fx(&self) -> F::Field {
        self.fx
    }

    /// Returns the ∞-norm of the gradient at the current point.
    pub fn grad_norm(&self) -> F::Field {
        self.algo.grad_inf_norm()
    }

    /// Returns the current iteration number.
    pub fn iter(&self) -> usize {
        self.algo.iter()
    }

    /// Returns the name of the used solver.
    pub fn name(&self) -> &str {
        Lbfgs::<F>::NAME
    }

    /// Does one iteration of the process, returning the function value in
    /// case of no error.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<F::Field, LbfgsError> {
        self.fx = self.algo.next(self.f, &mut self.x)?;
        Ok(self.fx)
    }

    /// Runs the iterative process until given stopping criterion is
    /// satisfied.
    pub fn find<C>(&mut self, stop: C) -> Result<(&[F::Field], F::Field), LbfgsError>
    where
        C: Fn(IterState<'_, F>) -> bool,
    {
        loop {
            let fx = self.next()?;

            let state = IterState {
                x: &self.x,
                fx,
                grad_norm: self.algo.grad_inf_norm(),
                iter: self.algo.iter(),
            };

            if stop(state) {
                return Ok((self.x.as_slice(), fx));
            }
        }
    }

    /// Runs the iterative process until the gradient tolerance or the
    /// iteration limit is reached, consuming the driver.
    ///
    /// Solver errors are not propagated; they are mapped to the corresponding
    /// [`Status`] with the best point found so far in the report.
    pub fn run(mut self) -> Report<F::Field> {
        let status = loop {
            match self.next() {
                Ok(_) => {
                    if self.algo.grad_inf_norm() <= self.gtol {
                        break Status::Converged;
                    }
                    if self.algo.iter() >= self.max_iters {
                        break Status::IterationLimit;
                    }
                }
                Err(error) => {
                    debug!("solver error: {}", error);
                    break match error {
                        LbfgsError::LineSearch => Status::LineSearchFailed,
                        LbfgsError::InvalidValue => Status::InvalidValue,
                    };
                }
            }
        };

        Report {
            value: self.fx,
            grad_norm: self.algo.grad_inf_norm(),
            iterations: self.algo.iter(),
            f_evals: self.algo.f_evals(),
            status,
            x: self.x,
        }
    }
}

/// State of the current iteration.
pub struct IterState<'a, F: Problem> {
    x: &'a OVector<F::Field, Dyn>,
    fx: F::Field,
    grad_norm: F::Field,
    iter: usize,
}

impl<'a, F: Problem> IterState<'a, F> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[F::Field] {
        self.x.as_slice()
    }

    /// Returns the current function value.
    pub fn fx(&self) -> F::Field {
        self.fx
    }

    /// Returns the ∞-norm of the gradient at the current point.
    pub fn grad_norm(&self) -> F::Field {
        self.grad_norm
    }

    /// Returns the current iteration number.
    pub fn iter(&self) -> usize {
        self.iter
    }
}
