//! The collection of implemented algorithms.

pub mod lbfgs;

pub use lbfgs::Lbfgs;
