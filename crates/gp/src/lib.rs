//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! regression as the surrogate model of a black-box function optimizer.
//!
//! A [GaussianProcess] keeps the Cholesky factorization of the covariance matrix of its
//! training samples up to date: appending a sample extends the factorization in O(n²)
//! instead of recomputing it in O(n³). Posterior mean and variance can then be queried at
//! any point.
//!
//! Kernels ([kernels]) and mean functions ([mean_models]) expose their hyperparameters and
//! the analytic gradient of their values with respect to them, so that hyperparameters
//! can be fitted by maximizing the log marginal likelihood of the training data with the
//! gradient-based or derivative-free optimizers of the `gpbo-opt` crate
//! (see [HyperOptimization]).
//!
//! GP models are built from [GpParams] checked with `linfa::ParamGuard`, they also implement
//! the `linfa::traits::Fit` trait.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod errors;
mod factorization;
mod hyperparameters;
pub mod kernels;
pub mod mean_models;
mod parameters;
mod training_data;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use factorization::{JITTER_FACTOR, JITTER_INIT, JITTER_MAX_TRIES};
pub use hyperparameters::{HpTarget, HyperOptimization, DEFAULT_INIT_RANGE};
pub use parameters::*;
pub use training_data::TrainingData;
