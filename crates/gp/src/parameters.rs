use crate::errors::{GpError, Result};
use crate::hyperparameters::HyperOptimization;
use crate::kernels::Kernel;
use crate::mean_models::MeanFunction;
use linfa::{Float, ParamGuard};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A set of validated GP parameters.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize, M: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>, M: Deserialize<'de>"
    ))
)]
pub struct GpValidParams<F: Float, K: Kernel<F>, M: MeanFunction<F>> {
    /// Covariance function k(x, x')
    pub(crate) kernel: K,
    /// Prior mean function m(x)
    pub(crate) mean: M,
    /// Noise variance used when none is given with the training data
    pub(crate) noise: F,
    /// Dimension of the observations
    pub(crate) output_dim: usize,
    /// Hyperparameters optimization policy, `None` keeps hyperparameters fixed
    #[cfg_attr(feature = "serializable", serde(skip))]
    pub(crate) hp_opt: Option<HyperOptimization>,
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> GpValidParams<F, K, M> {
    /// Get covariance function
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Get mean function
    pub fn mean(&self) -> &M {
        &self.mean
    }

    /// Get default noise variance
    pub fn noise(&self) -> F {
        self.noise
    }

    /// Get output dimension
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Get hyperparameters optimization policy
    pub fn hp_opt(&self) -> Option<&HyperOptimization> {
        self.hp_opt.as_ref()
    }
}

#[derive(Clone, Debug)]
/// The set of parameters that can be specified to build a
/// [GP model](struct.GaussianProcess.html).
pub struct GpParams<F: Float, K: Kernel<F>, M: MeanFunction<F>>(GpValidParams<F, K, M>);

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> GpParams<F, K, M> {
    /// A constructor for GP parameters given kernel and mean functions.
    ///
    /// Defaults to noiseless scalar observations without hyperparameters optimization.
    pub fn new(kernel: K, mean: M) -> GpParams<F, K, M> {
        Self(GpValidParams {
            kernel,
            mean,
            noise: F::zero(),
            output_dim: 1,
            hp_opt: None,
        })
    }

    /// A constructor for GP parameters from validated parameters
    pub fn new_from_valid(params: &GpValidParams<F, K, M>) -> Self {
        Self(params.clone())
    }

    /// Set covariance function.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set mean function.
    pub fn mean(mut self, mean: M) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set default noise variance.
    pub fn noise(mut self, noise: F) -> Self {
        self.0.noise = noise;
        self
    }

    /// Set output dimension.
    pub fn output_dim(mut self, output_dim: usize) -> Self {
        self.0.output_dim = output_dim;
        self
    }

    /// Set hyperparameters optimization policy.
    pub fn hp_opt(mut self, hp_opt: HyperOptimization) -> Self {
        self.0.hp_opt = Some(hp_opt);
        self
    }
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> From<GpValidParams<F, K, M>>
    for GpParams<F, K, M>
{
    fn from(valid: GpValidParams<F, K, M>) -> Self {
        GpParams(valid)
    }
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> ParamGuard for GpParams<F, K, M> {
    type Checked = GpValidParams<F, K, M>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !(self.0.noise >= F::zero()) || !self.0.noise.is_finite() {
            return Err(GpError::InvalidValueError(format!(
                "`noise` should be finite and non negative, got {}",
                self.0.noise
            )));
        }
        if self.0.output_dim == 0 {
            return Err(GpError::InvalidValueError(
                "`output_dim` canot be 0!".to_string(),
            ));
        }
        if self.0.kernel.input_dim() == 0 {
            return Err(GpError::InvalidValueError(
                "kernel input dimension canot be 0!".to_string(),
            ));
        }
        if let Some(hp_opt) = &self.0.hp_opt {
            if hp_opt.optimizer.n_restarts() == 0 {
                return Err(GpError::InvalidValueError(
                    "hyperparameters optimization needs at least one restart".to_string(),
                ));
            }
            let (lo, hi) = hp_opt.init_range;
            if !(lo <= hi) {
                return Err(GpError::InvalidValueError(format!(
                    "bad hyperparameters initialization range ({lo}, {hi})"
                )));
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
