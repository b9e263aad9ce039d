//! Core abstractions and types.
//!
//! *Users* are mainly interested in implementing the [`Function`] and
//! [`Gradient`] traits for their objective.
//!
//! Algorithm *developers* are interested in consuming these traits (see
//! [algo](crate::algo)) and in the tools in the
//! [derivatives](crate::derivatives) and [testing](crate::testing) modules.

mod base;
mod function;

pub use base::*;
pub use function::*;
