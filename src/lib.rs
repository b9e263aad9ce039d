#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

//! # ExPen
//!
//! A pure Rust implementation of a smooth exact penalty function (ExPen)
//! method for optimization over the Stiefel manifold, instantiated on a
//! discretized 1D Kohn-Sham single-particle Hamiltonian.
//!
//! ## Problem
//!
//! The constrained problem is
//!
//! ```text
//! min f(X)   subject to   XᵀX = I,
//! ```
//!
//! where X is an n×p real matrix, that is, X lies on the Stiefel manifold.
//! Instead of optimizing on the manifold directly, the problem is reformulated
//! as the *unconstrained* smooth problem
//!
//! ```text
//! min h(Z) = f(A(Z)) + β/4 ‖ZᵀZ − I‖²_F,
//! ```
//!
//! with A the second-order retraction A(Z) = Z(3/2·I − 1/2·ZᵀZ). For β above
//! a problem-dependent threshold, minimizers of h coincide with the
//! constrained minimizers of f — hence *exact* penalty. Any unconstrained
//! derivative-based solver is then applicable; this crate provides a
//! limited-memory BFGS method.
//!
//! The pieces are:
//!
//! * [stiefel](crate::stiefel) -- geometry of the Stiefel manifold (the
//!   retraction and its adjoint, the constraint maps, initial points),
//! * [kohn_sham](crate::kohn_sham) -- the discretized Kohn-Sham energy model
//!   defining f,
//! * [penalty](crate::penalty) -- the ExPen reformulation defining h and ∇h,
//! * [algo](crate::algo) -- the L-BFGS solver with a strong Wolfe line
//!   search,
//! * [driver](crate::driver) -- a high-level API running the iterations to
//!   convergence.
//!
//! ## Usage
//!
//! ```rust
//! use expen::kohn_sham::KohnSham;
//! use expen::nalgebra as na;
//! use expen::penalty::ExactPenalty;
//! use expen::stiefel::Stiefel;
//! use expen::Minimizer;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let (n, p, alpha) = (64, 4, 1.0);
//!
//! let stiefel = Stiefel::new(n, p);
//! let mut rng = StdRng::seed_from_u64(0);
//! let x0 = stiefel.random_point::<f64, _>(&mut rng);
//!
//! let h = ExactPenalty::new(KohnSham::new(n, p, alpha), &x0);
//!
//! let report = Minimizer::builder(&h)
//!     .with_initial(x0.as_slice().to_vec())
//!     .with_gtol(1e-5)
//!     .with_max_iters(500)
//!     .build()
//!     .run();
//!
//! assert!(report.success());
//!
//! // The optimized matrix, feasible up to the penalty accuracy.
//! let z = na::DMatrix::from_column_slice(n, p, report.x.as_slice());
//! assert!(stiefel.feasibility(&z) < 1e-4);
//! ```
//!
//! ## References
//!
//! \[1\] [A Class of Smooth Exact Penalty Function Methods for Optimization
//! Problems with Orthogonality Constraints](https://arxiv.org/abs/1907.12424)
//!
//! ## License
//!
//! Licensed under MIT.

pub mod algo;
mod core;
pub mod derivatives;
pub mod driver;
pub mod kohn_sham;
pub mod penalty;
pub mod stiefel;
pub mod testing;

pub use core::*;
pub use driver::{IterState, Minimizer, MinimizerBuilder, Report, Status};

pub use nalgebra;
