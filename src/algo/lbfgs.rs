//! Limited-memory BFGS method.
//!
//! [L-BFGS](https://en.wikipedia.org/wiki/Limited-memory_BFGS) is a
//! quasi-Newton method for unconstrained smooth optimization that maintains an
//! implicit approximation of the inverse Hessian from a short history of
//! iterate and gradient differences. The search direction is obtained by the
//! two-loop recursion and the step length by a line search enforcing the
//! strong Wolfe conditions (bracketing and zoom with interpolation and a
//! bisection safeguard).
//!
//! The memory footprint is O(m·n) for history size m, which makes the method
//! suitable for problems with tens of thousands of variables such as the
//! flattened Stiefel iterates of [penalty](crate::penalty).
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//! (Algorithms 3.5, 3.6 and 7.4)
//!
//! \[2\] [On the Limited Memory BFGS Method for Large Scale
//! Optimization](https://link.springer.com/article/10.1007/BF01589116)

use std::collections::VecDeque;

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{
    convert,
    storage::{Storage, StorageMut},
    ComplexField, DimName, Dyn, IsContiguous, OVector, RealField, Vector, U1,
};
use num_traits::{One, Zero};
use thiserror::Error;

use crate::core::{Gradient, Problem};

/// Options for [`Lbfgs`] solver.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct LbfgsOptions<P: Problem> {
    /// Number of stored curvature pairs. Default: `10`.
    memory: usize,
    /// Sufficient decrease constant of the Wolfe conditions. Default: `1e-4`.
    c1: P::Field,
    /// Curvature constant of the strong Wolfe conditions. Default: `0.9`.
    c2: P::Field,
    /// Maximum number of step-length expansions in the bracketing phase of
    /// the line search. Default: `20`.
    max_bracket_steps: usize,
    /// Maximum number of interval refinements in the zoom phase of the line
    /// search. Default: `20`.
    max_zoom_steps: usize,
    /// Minimum value of s·y relative to ‖s‖‖y‖ for a curvature pair to be
    /// stored. Default: `1e-10`.
    curvature_thresh: P::Field,
}

impl<P: Problem> Default for LbfgsOptions<P> {
    fn default() -> Self {
        Self {
            memory: 10,
            c1: convert(1e-4),
            c2: convert(0.9),
            max_bracket_steps: 20,
            max_zoom_steps: 20,
            curvature_thresh: convert(1e-10),
        }
    }
}

/// Error returned from [`Lbfgs`] solver.
#[derive(Debug, Error)]
pub enum LbfgsError {
    /// The line search could not find a step satisfying the strong Wolfe
    /// conditions.
    #[error("line search failed to satisfy the Wolfe conditions")]
    LineSearch,
    /// An invalid value (NaN) of the function or the gradient occurred.
    #[error("invalid value encountered")]
    InvalidValue,
}

/// Limited-memory BFGS solver.
///
/// See [module](self) documentation for more details.
pub struct Lbfgs<P: Problem> {
    options: LbfgsOptions<P>,
    s_hist: VecDeque<OVector<P::Field, Dyn>>,
    y_hist: VecDeque<OVector<P::Field, Dyn>>,
    rho_hist: VecDeque<P::Field>,
    alphas: Vec<P::Field>,
    grad: OVector<P::Field, Dyn>,
    dir: OVector<P::Field, Dyn>,
    x_trial: OVector<P::Field, Dyn>,
    grad_trial: OVector<P::Field, Dyn>,
    fx: Option<P::Field>,
    iter: usize,
    f_evals: usize,
}

impl<P: Problem> Lbfgs<P> {
    /// Name of the solver.
    pub const NAME: &'static str = "L-BFGS";

    /// Initializes L-BFGS solver with default options.
    pub fn new(p: &P) -> Self {
        Self::with_options(p, LbfgsOptions::default())
    }

    /// Initializes L-BFGS solver with given options.
    pub fn with_options(p: &P, options: LbfgsOptions<P>) -> Self {
        let dim = Dyn(p.dim());
        let memory = options.memory;

        Self {
            options,
            s_hist: VecDeque::with_capacity(memory),
            y_hist: VecDeque::with_capacity(memory),
            rho_hist: VecDeque::with_capacity(memory),
            alphas: Vec::with_capacity(memory),
            grad: OVector::zeros_generic(dim, U1::name()),
            dir: OVector::zeros_generic(dim, U1::name()),
            x_trial: OVector::zeros_generic(dim, U1::name()),
            grad_trial: OVector::zeros_generic(dim, U1::name()),
            fx: None,
            iter: 0,
            f_evals: 0,
        }
    }

    /// Resets the internal state of the solver.
    pub fn reset(&mut self) {
        self.s_hist.clear();
        self.y_hist.clear();
        self.rho_hist.clear();
        self.fx = None;
        self.iter = 0;
        self.f_evals = 0;
    }

    /// Number of performed iterations.
    pub fn iter(&self) -> usize {
        self.iter
    }

    /// Number of function-and-gradient evaluations.
    pub fn f_evals(&self) -> usize {
        self.f_evals
    }

    /// The ∞-norm of the gradient at the current point. Zero until the first
    /// call to [`next`](Lbfgs::next).
    pub fn grad_inf_norm(&self) -> P::Field {
        self.grad.amax()
    }
}

impl<F: Gradient> Lbfgs<F> {
    /// Computes the next step of the optimization process.
    ///
    /// The value of `x` is the current point; after the method returns, it
    /// holds the point of the performed step and the return value is the
    /// function value in it.
    #[allow(clippy::should_implement_trait)]
    pub fn next<Sx>(
        &mut self,
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, LbfgsError>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
    {
        let LbfgsOptions {
            memory,
            c1,
            c2,
            max_bracket_steps,
            max_zoom_steps,
            curvature_thresh,
        } = self.options;

        // The function value and gradient at the current point, evaluated
        // lazily on the first step and carried over from the line search on
        // the subsequent ones.
        let fx = match self.fx {
            Some(fx) => fx,
            None => {
                let fx = f.apply_grad(x, &mut self.grad);
                self.f_evals += 1;

                if is_nan(fx) || self.grad.iter().any(|g| is_nan(*g)) {
                    return Err(LbfgsError::InvalidValue);
                }
                fx
            }
        };

        let grad_norm = self.grad.norm();
        if grad_norm == F::Field::zero() {
            // Stationary point, nowhere to go.
            self.fx = Some(fx);
            return Ok(fx);
        }

        two_loop(
            &self.s_hist,
            &self.y_hist,
            &self.rho_hist,
            &self.grad,
            &mut self.alphas,
            &mut self.dir,
        );

        let mut g_dot_d = self.grad.dot(&self.dir);
        if g_dot_d >= F::Field::zero() {
            // The history produced an ascent direction (possible with noisy
            // curvature). Drop it and restart from steepest descent.
            debug!("non-descent direction, restarting from steepest descent");
            self.s_hist.clear();
            self.y_hist.clear();
            self.rho_hist.clear();
            self.dir.copy_from(&self.grad);
            self.dir.neg_mut();
            g_dot_d = -grad_norm * grad_norm;
        }

        // A unit step is the natural quasi-Newton choice once curvature is
        // accumulated; the very first step is scaled by the gradient norm.
        let alpha_init = if self.s_hist.is_empty() {
            (F::Field::one() / grad_norm).min(F::Field::one())
        } else {
            F::Field::one()
        };

        let (alpha, fx_next) = wolfe_search(
            f,
            x,
            &self.dir,
            fx,
            g_dot_d,
            alpha_init,
            c1,
            c2,
            max_bracket_steps,
            max_zoom_steps,
            &mut self.x_trial,
            &mut self.grad_trial,
            &mut self.f_evals,
        )?;

        let mut s = self.dir.clone_owned();
        s *= alpha;
        let mut y = self.grad_trial.clone_owned();
        y -= &self.grad;

        let sy = s.dot(&y);
        if sy > curvature_thresh * s.norm() * y.norm() {
            if self.s_hist.len() == memory {
                self.s_hist.pop_front();
                self.y_hist.pop_front();
                self.rho_hist.pop_front();
            }
            self.rho_hist.push_back(F::Field::one() / sy);
            self.s_hist.push_back(s);
            self.y_hist.push_back(y);
        } else {
            debug!("curvature pair rejected (s . y = {:?})", sy);
        }

        x.copy_from(&self.x_trial);
        self.grad.copy_from(&self.grad_trial);
        self.fx = Some(fx_next);
        self.iter += 1;

        debug!(
            "iter = {}, fx = {:?}, |grad| = {:?}, alpha = {:?}",
            self.iter,
            fx_next,
            self.grad.amax(),
            alpha
        );

        Ok(fx_next)
    }
}

// NaN is the only value not comparable with itself.
fn is_nan<T: RealField + Copy>(v: T) -> bool {
    v.partial_cmp(&v).is_none()
}

/// The two-loop recursion: applies the implicit inverse Hessian approximation
/// to the gradient, writing the negated result (the search direction) into
/// `dir`.
fn two_loop<T: RealField + Copy>(
    s_hist: &VecDeque<OVector<T, Dyn>>,
    y_hist: &VecDeque<OVector<T, Dyn>>,
    rho_hist: &VecDeque<T>,
    grad: &OVector<T, Dyn>,
    alphas: &mut Vec<T>,
    dir: &mut OVector<T, Dyn>,
) {
    let k = s_hist.len();

    dir.copy_from(grad);
    alphas.clear();
    alphas.resize(k, T::zero());

    for i in (0..k).rev() {
        let alpha = rho_hist[i] * s_hist[i].dot(dir);
        alphas[i] = alpha;
        dir.axpy(-alpha, &y_hist[i], T::one());
    }

    // Initial inverse Hessian scaling, gamma = s·y / y·y for the most recent
    // pair.
    if k > 0 {
        let sy = s_hist[k - 1].dot(&y_hist[k - 1]);
        let yy = y_hist[k - 1].norm_squared();
        if yy > T::zero() {
            *dir *= sy / yy;
        }
    }

    for i in 0..k {
        let beta = rho_hist[i] * y_hist[i].dot(dir);
        dir.axpy(alphas[i] - beta, &s_hist[i], T::one());
    }

    dir.neg_mut();
}

/// Line search enforcing the strong Wolfe conditions, following the
/// bracketing/zoom scheme of Nocedal & Wright (Algorithms 3.5 and 3.6) with
/// quadratic interpolation and a bisection safeguard.
///
/// On success, returns the accepted step length and the function value at it;
/// `x_trial` and `grad_trial` hold the accepted point and its gradient.
#[allow(clippy::too_many_arguments)]
fn wolfe_search<F, Sx>(
    f: &F,
    x: &Vector<F::Field, Dyn, Sx>,
    dir: &OVector<F::Field, Dyn>,
    fx0: F::Field,
    g0_dot_d: F::Field,
    alpha_init: F::Field,
    c1: F::Field,
    c2: F::Field,
    max_bracket_steps: usize,
    max_zoom_steps: usize,
    x_trial: &mut OVector<F::Field, Dyn>,
    grad_trial: &mut OVector<F::Field, Dyn>,
    f_evals: &mut usize,
) -> Result<(F::Field, F::Field), LbfgsError>
where
    F: Gradient,
    Sx: Storage<F::Field, Dyn> + IsContiguous,
{
    let zero = F::Field::zero();
    let one = F::Field::one();
    let two: F::Field = convert(2.0);
    let half: F::Field = convert(0.5);

    // Evaluates the objective at x + alpha * dir, returning the value and the
    // derivative along the direction.
    let eval = |alpha: F::Field,
                x_trial: &mut OVector<F::Field, Dyn>,
                grad_trial: &mut OVector<F::Field, Dyn>,
                f_evals: &mut usize|
     -> (F::Field, F::Field) {
        x_trial.copy_from(x);
        x_trial.axpy(alpha, dir, one);
        let fa = f.apply_grad(x_trial, grad_trial);
        *f_evals += 1;
        (fa, grad_trial.dot(dir))
    };

    let mut alpha_prev = zero;
    let mut f_prev = fx0;
    let mut gd_prev = g0_dot_d;
    let mut alpha = alpha_init;

    let mut bracket = None;

    for i in 0..max_bracket_steps {
        let (fa, gd) = eval(alpha, x_trial, grad_trial, f_evals);

        if is_nan(fa) || is_nan(gd) {
            return Err(LbfgsError::InvalidValue);
        }

        // A non-finite value means the step overshot; treat it as a failed
        // sufficient decrease and let zoom shrink the interval.
        if !fa.is_finite() || fa > fx0 + c1 * alpha * g0_dot_d || (i > 0 && fa >= f_prev) {
            bracket = Some((alpha_prev, alpha, f_prev, fa, gd_prev));
            break;
        }

        if gd.abs() <= -c2 * g0_dot_d {
            return Ok((alpha, fa));
        }

        if gd >= zero {
            bracket = Some((alpha, alpha_prev, fa, f_prev, gd));
            break;
        }

        alpha_prev = alpha;
        f_prev = fa;
        gd_prev = gd;
        alpha *= two;
    }

    // The interval between lo and hi brackets a Wolfe point: lo has the lower
    // value and its derivative points into the interval; lo and hi need not
    // be ordered.
    let (mut lo, mut hi, mut f_lo, mut f_hi, mut gd_lo) =
        bracket.ok_or(LbfgsError::LineSearch)?;

    for _ in 0..max_zoom_steps {
        let width = (hi - lo).abs();
        let scale = lo.abs().max(hi.abs()).max(one);
        if width <= convert::<f64, F::Field>(1e-12) * scale {
            return Err(LbfgsError::LineSearch);
        }

        // Minimizer of the quadratic through (lo, f_lo, gd_lo) and (hi, f_hi),
        // safeguarded towards bisection when it falls outside (or too close
        // to the ends of) the interval.
        let d = hi - lo;
        let denom = two * (f_hi - f_lo - gd_lo * d);
        let mut alpha = lo - gd_lo * d * d / denom;

        let lower = lo.min(hi);
        let upper = lo.max(hi);
        let margin = convert::<f64, F::Field>(0.1) * width;
        if !alpha.is_finite() || alpha < lower + margin || alpha > upper - margin {
            alpha = (lo + hi) * half;
        }

        let (fa, gd) = eval(alpha, x_trial, grad_trial, f_evals);

        if is_nan(fa) || is_nan(gd) {
            return Err(LbfgsError::InvalidValue);
        }

        if !fa.is_finite() || fa > fx0 + c1 * alpha * g0_dot_d || fa >= f_lo {
            hi = alpha;
            f_hi = fa;
        } else {
            if gd.abs() <= -c2 * g0_dot_d {
                return Ok((alpha, fa));
            }

            if gd * (hi - lo) >= zero {
                hi = lo;
                f_hi = f_lo;
            }

            lo = alpha;
            f_lo = fa;
            gd_lo = gd;
        }
    }

    Err(LbfgsError::LineSearch)
}
