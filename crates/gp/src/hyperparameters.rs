//! Hyperparameters optimization of the GP model.
//!
//! Kernel and/or mean hyperparameters are fitted by minimizing the negative log marginal
//! likelihood of the training data. The objective function sets the candidate
//! hyperparameters on a private copy of the model, recomputes its factorization and returns
//! `-log p(Y | X, p)` along with its analytic gradient.

use crate::algorithm::GaussianProcess;
use crate::errors::Result;
use crate::kernels::Kernel;
use crate::mean_models::MeanFunction;
use crate::utils::to_f64;
use gpbo_opt::{Algorithm, ParallelRepeater, RandomSource};
use linfa::Float;
use ndarray::{concatenate, s, Array1, ArrayBase, Axis, Data, Ix1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default range of the random initial hyperparameters
pub const DEFAULT_INIT_RANGE: (f64, f64) = (-3., 3.);

/// Hyperparameters fitted by the optimization
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum HpTarget {
    /// Kernel hyperparameters only
    #[default]
    Kernel,
    /// Mean hyperparameters only
    Mean,
    /// Kernel then mean hyperparameters, jointly
    KernelMean,
}

impl HpTarget {
    /// Number of optimized parameters for the given model
    pub fn size<F: Float, K: Kernel<F>, M: MeanFunction<F>>(
        &self,
        gp: &GaussianProcess<F, K, M>,
    ) -> usize {
        match self {
            HpTarget::Kernel => gp.kernel.h_params_size(),
            HpTarget::Mean => gp.mean.h_params_size(),
            HpTarget::KernelMean => gp.kernel.h_params_size() + gp.mean.h_params_size(),
        }
    }

    /// Current optimized parameters of the model
    pub fn h_params<F: Float, K: Kernel<F>, M: MeanFunction<F>>(
        &self,
        gp: &GaussianProcess<F, K, M>,
    ) -> Array1<F> {
        match self {
            HpTarget::Kernel => gp.kernel.h_params().to_owned(),
            HpTarget::Mean => gp.mean.h_params(),
            HpTarget::KernelMean => {
                concatenate![Axis(0), gp.kernel.h_params(), gp.mean.h_params()]
            }
        }
    }

    /// Set the optimized parameters without recomputing the model
    pub(crate) fn set_h_params<F: Float, K: Kernel<F>, M: MeanFunction<F>>(
        &self,
        gp: &mut GaussianProcess<F, K, M>,
        params: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        match self {
            HpTarget::Kernel => gp.kernel.set_h_params(params),
            HpTarget::Mean => gp.mean.set_h_params(params),
            HpTarget::KernelMean => {
                let nk = gp.kernel.h_params_size();
                let nk = nk.min(params.len());
                gp.kernel.set_h_params(&params.slice(s![..nk]))?;
                gp.mean.set_h_params(&params.slice(s![nk..]))
            }
        }
    }

    /// Gradient of the log likelihood with respect to the optimized parameters
    pub(crate) fn log_likelihood_grad<F: Float, K: Kernel<F>, M: MeanFunction<F>>(
        &self,
        gp: &GaussianProcess<F, K, M>,
    ) -> Result<Array1<F>> {
        match self {
            HpTarget::Kernel => gp.kernel_log_likelihood_grad(),
            HpTarget::Mean => Ok(gp.mean_log_likelihood_grad()),
            HpTarget::KernelMean => {
                let grad_kernel = gp.kernel_log_likelihood_grad()?;
                let grad_mean = gp.mean_log_likelihood_grad();
                Ok(concatenate![Axis(0), grad_kernel, grad_mean])
            }
        }
    }

    /// Whether the prior means at the samples have to be re-evaluated after a change
    pub(crate) fn updates_mean(&self) -> bool {
        !matches!(self, HpTarget::Kernel)
    }
}

/// Hyperparameters optimization policy of a GP model.
///
/// Every restart of the optimizer starts from a point drawn uniformly in `init_range` for each
/// component.
#[derive(Clone, Debug)]
pub struct HyperOptimization {
    pub(crate) target: HpTarget,
    pub(crate) optimizer: ParallelRepeater<Algorithm>,
    pub(crate) init_range: (f64, f64),
}

impl HyperOptimization {
    /// Optimize `target` hyperparameters with the given optimizer
    pub fn new(target: HpTarget, optimizer: ParallelRepeater<Algorithm>) -> Self {
        HyperOptimization {
            target,
            optimizer,
            init_range: DEFAULT_INIT_RANGE,
        }
    }

    /// Optimize `target` hyperparameters with restarted Rprop
    pub fn rprop(target: HpTarget, rng: Arc<RandomSource>) -> Self {
        Self::new(target, ParallelRepeater::new(Algorithm::default(), rng))
    }

    /// Set the number of optimizer restarts
    pub fn restarts(mut self, restarts: usize) -> Self {
        self.optimizer = self.optimizer.restarts(restarts);
        self
    }

    /// Set the range of the random initial hyperparameters
    pub fn init_range(mut self, lower: f64, upper: f64) -> Self {
        self.init_range = (lower, upper);
        self
    }

    /// Optimized hyperparameters
    pub fn target(&self) -> HpTarget {
        self.target
    }

    /// The restarted optimizer
    pub fn optimizer(&self) -> &ParallelRepeater<Algorithm> {
        &self.optimizer
    }
}

/// Negative log likelihood of `gp` once `params` are set for `target`.
///
/// The gradient is filled when requested. Any numeric failure gives `+inf` with a null
/// gradient so that optimizers discard the candidate.
pub(crate) fn neg_log_likelihood<F: Float, K: Kernel<F>, M: MeanFunction<F>>(
    target: HpTarget,
    params: &[f64],
    gradient: Option<&mut [f64]>,
    gp: &mut GaussianProcess<F, K, M>,
) -> f64 {
    let params: Array1<F> = params.iter().map(|&v| F::cast(v)).collect();
    let res = evaluate(target, &params, gradient.is_some(), gp);
    match res {
        Ok((value, grad)) if value.is_finite() => {
            if let (Some(gradient), Some(grad)) = (gradient, grad) {
                gradient
                    .iter_mut()
                    .zip(grad.iter())
                    .for_each(|(g, &v)| *g = -to_f64(v));
            }
            -value
        }
        _ => {
            if let Some(gradient) = gradient {
                gradient.iter_mut().for_each(|g| *g = 0.);
            }
            f64::INFINITY
        }
    }
}

fn evaluate<F: Float, K: Kernel<F>, M: MeanFunction<F>>(
    target: HpTarget,
    params: &Array1<F>,
    with_grad: bool,
    gp: &mut GaussianProcess<F, K, M>,
) -> Result<(f64, Option<Array1<F>>)> {
    if params.iter().any(|v| !v.is_finite()) {
        return Ok((f64::NEG_INFINITY, None));
    }
    target.set_h_params(gp, params)?;
    gp.recompute(target.updates_mean())?;
    let value = to_f64(gp.log_likelihood());
    let grad = if with_grad {
        Some(target.log_likelihood_grad(gp)?)
    } else {
        None
    };
    Ok((value, grad))
}
