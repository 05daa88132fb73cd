use crate::rprop::Rprop;
use crate::types::{ObjFn, Optimizer};
use cobyla::RhoBeg;
use log::{debug, warn};
use ndarray::{arr1, Array1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Default bounds applied to each component by bounded algorithms
pub const DEFAULT_BOUNDS: (f64, f64) = (-10., 10.);

/// Derivative-free COBYLA optimizer, see [cobyla](https://crates.io/crates/cobyla)
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Cobyla {
    /// Maximum number of objective evaluations
    pub max_eval: usize,
    /// Initial trust region radius
    pub rhobeg: f64,
    /// Relative tolerance on the objective value
    pub ftol_rel: f64,
    /// Lower and upper bounds applied to each component
    pub bounds: (f64, f64),
}

impl Default for Cobyla {
    fn default() -> Self {
        Cobyla {
            max_eval: 200,
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            bounds: DEFAULT_BOUNDS,
        }
    }
}

/// Gradient-based SLSQP optimizer, see [slsqp](https://crates.io/crates/slsqp)
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Slsqp {
    /// Maximum number of iterations
    pub max_iters: usize,
    /// Relative tolerance on the objective value
    pub ftol_rel: f64,
    /// Absolute tolerance on the objective value
    pub ftol_abs: f64,
    /// Lower and upper bounds applied to each component
    pub bounds: (f64, f64),
}

impl Default for Slsqp {
    fn default() -> Self {
        Slsqp {
            max_iters: 200,
            ftol_rel: 1e-4,
            ftol_abs: 0.,
            bounds: DEFAULT_BOUNDS,
        }
    }
}

fn clamped_start(x0: &[f64], bounds: (f64, f64)) -> Vec<f64> {
    x0.iter().map(|v| v.clamp(bounds.0, bounds.1)).collect()
}

impl Optimizer for Cobyla {
    fn minimize<U, O>(&self, fun: &O, x0: &[f64], user_data: U) -> (f64, Array1<f64>)
    where
        U: Clone + Send,
        O: ObjFn<U> + Sync,
    {
        let xinit = clamped_start(x0, self.bounds);
        let bounds = vec![self.bounds; x0.len()];
        let cons: Vec<fn(&[f64], &mut U) -> f64> = vec![];
        let res = cobyla::minimize(
            |x: &[f64], u: &mut U| fun(x, None, u),
            &xinit,
            &bounds,
            &cons,
            user_data,
            self.max_eval,
            RhoBeg::All(self.rhobeg),
            Some(cobyla::StopTols {
                ftol_rel: self.ftol_rel,
                ..cobyla::StopTols::default()
            }),
        );
        match res {
            Ok((_, x_opt, y_opt)) => (y_opt, arr1(&x_opt)),
            Err((status, x_opt, _)) => {
                warn!("Cobyla optimization failed: {status:?}");
                (f64::INFINITY, arr1(&x_opt))
            }
        }
    }
}

impl Optimizer for Slsqp {
    fn minimize<U, O>(&self, fun: &O, x0: &[f64], user_data: U) -> (f64, Array1<f64>)
    where
        U: Clone + Send,
        O: ObjFn<U> + Sync,
    {
        let xinit = clamped_start(x0, self.bounds);
        let bounds = vec![self.bounds; x0.len()];
        let cons: Vec<fn(&[f64], Option<&mut [f64]>, &mut U) -> f64> = vec![];
        let res = slsqp::minimize(
            |x: &[f64], g: Option<&mut [f64]>, u: &mut U| fun(x, g, u),
            &xinit,
            &bounds,
            &cons,
            user_data,
            self.max_iters,
            Some(slsqp::StopTols {
                ftol_rel: self.ftol_rel,
                ftol_abs: self.ftol_abs,
                ..slsqp::StopTols::default()
            }),
        );
        match res {
            Ok((_, x_opt, y_opt)) => (y_opt, arr1(&x_opt)),
            Err((status, x_opt, _)) => {
                warn!("Slsqp optimization failed: {status:?}");
                (f64::INFINITY, arr1(&x_opt))
            }
        }
    }
}

/// Facade over the available optimization algorithms, selected at runtime
#[derive(Clone, Debug)]
pub enum Algorithm {
    /// Resilient backpropagation, gradient-based
    Rprop(Rprop),
    /// COBYLA, derivative-free
    Cobyla(Cobyla),
    /// SLSQP, gradient-based
    Slsqp(Slsqp),
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Rprop(Rprop::default())
    }
}

impl Algorithm {
    /// Whether the algorithm requests gradients from the objective function
    pub fn uses_gradient(&self) -> bool {
        !matches!(self, Algorithm::Cobyla(_))
    }
}

impl Optimizer for Algorithm {
    fn minimize<U, O>(&self, fun: &O, x0: &[f64], user_data: U) -> (f64, Array1<f64>)
    where
        U: Clone + Send,
        O: ObjFn<U> + Sync,
    {
        let res = match self {
            Algorithm::Rprop(algo) => algo.minimize(fun, x0, user_data),
            Algorithm::Cobyla(algo) => algo.minimize(fun, x0, user_data),
            Algorithm::Slsqp(algo) => algo.minimize(fun, x0, user_data),
        };
        debug!("... end optimization");
        res
    }
}
