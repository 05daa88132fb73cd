//! Numeric optimizers used to train gaussian process hyperparameters.
//!
//! Every optimizer minimizes an objective function with the signature
//! `Fn(&[f64], Option<&mut [f64]>, &mut U) -> f64` (see [`ObjFn`]): the gradient slice is
//! given when the algorithm requires it and has to be filled by the objective, `U` is user
//! data owned by the optimizer run (typically a private copy of a model).
//!
//! Available algorithms:
//! * [`Rprop`]: resilient backpropagation, gradient-based, unbounded,
//! * [`Cobyla`]: derivative-free, bounded (via the [cobyla](https://crates.io/crates/cobyla) crate),
//! * [`Slsqp`]: gradient-based, bounded (via the [slsqp](https://crates.io/crates/slsqp) crate).
//!
//! They can be selected at runtime through the [`Algorithm`] enum and repeated from several
//! starting points in parallel with [`ParallelRepeater`], which draws its restart seeds from a
//! shared thread-safe [`RandomSource`].
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod random;
mod repeater;
mod rprop;
mod stop;
mod types;

pub use algorithm::*;
pub use random::*;
pub use repeater::*;
pub use rprop::*;
pub use stop::*;
pub use types::*;
