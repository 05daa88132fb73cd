//! A module for kernels (covariance functions) of the GP model.
//!
//! The following kernels are implemented:
//! * exponential (isotropic),
//! * matern 3/2 (isotropic),
//! * matern 5/2 (isotropic),
//! * squared exponential with automatic relevance determination (ARD) and an optional
//!   low rank correction.
//!
//! Hyperparameters are always handled in log-space: `set_h_params` takes the logarithm of the
//! length scales (and low rank matrix entries) and derives positive quantities by
//! exponentiation. Gradients are taken with respect to these log-space values.

use crate::errors::{GpError, Result};
use crate::utils::squared_distance;
use linfa::Float;
use ndarray::{array, Array1, Array2, ArrayBase, ArrayView1, Data, Ix1, Ix2};
use paste::paste;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kernel configuration
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct KernelConfig<F: Float> {
    /// Signal variance σ², kernel value for two identical inputs
    pub signal_variance: F,
    /// Initial length scale (all dimensions)
    pub length_scale: F,
    /// Rank of the low rank correction of ARD kernels
    pub ard_rank: usize,
}

impl<F: Float> Default for KernelConfig<F> {
    fn default() -> Self {
        KernelConfig {
            signal_variance: F::one(),
            length_scale: F::one(),
            ard_rank: 0,
        }
    }
}

impl<F: Float> KernelConfig<F> {
    /// Set signal variance
    pub fn signal_variance(mut self, signal_variance: F) -> Self {
        self.signal_variance = signal_variance;
        self
    }

    /// Set initial length scale
    pub fn length_scale(mut self, length_scale: F) -> Self {
        self.length_scale = length_scale;
        self
    }

    /// Set rank of ARD low rank correction
    pub fn ard_rank(mut self, ard_rank: usize) -> Self {
        self.ard_rank = ard_rank;
        self
    }
}

/// A trait for covariance functions used by the GP model
pub trait Kernel<F: Float>: Clone + fmt::Debug + fmt::Display + Send + Sync {
    /// Kernel for `dim`-dimensional inputs configured with `config`
    fn with_config(dim: usize, config: &KernelConfig<F>) -> Self;

    /// Input space dimension
    fn input_dim(&self) -> usize;

    /// Signal variance σ²
    fn signal_variance(&self) -> F;

    /// Number of hyperparameters
    fn h_params_size(&self) -> usize {
        self.h_params().len()
    }

    /// Hyperparameters in log-space
    fn h_params(&self) -> ArrayView1<F>;

    /// Set hyperparameters from log-space values
    fn set_h_params(&mut self, params: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()>;

    /// Covariance k(x1, x2)
    fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix1>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> F;

    /// Gradient of k(x1, x2) with respect to the log-space hyperparameters
    fn grad(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix1>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F>;

    /// Covariance matrix of the rows of `xs`
    fn gram(&self, xs: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let n = xs.nrows();
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let v = self.value(&xs.row(i), &xs.row(j));
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
        }
        k
    }

    /// Covariances between `x` and the rows of `xs`
    fn cross_covariance(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        xs: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array1<F> {
        xs.rows().into_iter().map(|xi| self.value(&xi, x)).collect()
    }
}

fn check_h_params_size(expected: usize, given: usize) -> Result<()> {
    if expected != given {
        return Err(GpError::DimensionMismatch(format!(
            "{given} kernel hyperparameters given, expected {expected}"
        )));
    }
    Ok(())
}

/// Declare an isotropic kernel depending only on the squared distance between inputs.
///
/// The kernel type has to implement `profile(r2)` returning the kernel value and its
/// derivative with respect to log(l) for a squared distance `r2`.
macro_rules! declare_isotropic_kernel {
    ($name:ident, $doc:literal) => {
        paste! {
            #[doc = $doc]
            #[derive(Clone, Debug, PartialEq)]
            #[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
            pub struct [<$name Kernel>]<F: Float> {
                dim: usize,
                sigma_sq: F,
                ell: F,
                h_params: Array1<F>,
            }

            impl<F: Float> [<$name Kernel>]<F> {
                /// Kernel for `dim`-dimensional inputs with default configuration
                pub fn new(dim: usize) -> Self {
                    Self::with_config(dim, &KernelConfig::default())
                }

                /// Current length scale
                pub fn length_scale(&self) -> F {
                    self.ell
                }
            }

            impl<F: Float> Kernel<F> for [<$name Kernel>]<F> {
                fn with_config(dim: usize, config: &KernelConfig<F>) -> Self {
                    [<$name Kernel>] {
                        dim,
                        sigma_sq: config.signal_variance,
                        ell: config.length_scale,
                        h_params: array![config.length_scale.ln()],
                    }
                }

                fn input_dim(&self) -> usize {
                    self.dim
                }

                fn signal_variance(&self) -> F {
                    self.sigma_sq
                }

                fn h_params(&self) -> ArrayView1<F> {
                    self.h_params.view()
                }

                fn set_h_params(&mut self, params: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
                    check_h_params_size(1, params.len())?;
                    self.h_params.assign(params);
                    self.ell = params[0].exp();
                    Ok(())
                }

                fn value(
                    &self,
                    x1: &ArrayBase<impl Data<Elem = F>, Ix1>,
                    x2: &ArrayBase<impl Data<Elem = F>, Ix1>,
                ) -> F {
                    self.profile(squared_distance(x1, x2)).0
                }

                fn grad(
                    &self,
                    x1: &ArrayBase<impl Data<Elem = F>, Ix1>,
                    x2: &ArrayBase<impl Data<Elem = F>, Ix1>,
                ) -> Array1<F> {
                    array![self.profile(squared_distance(x1, x2)).1]
                }
            }

            impl<F: Float> fmt::Display for [<$name Kernel>]<F> {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(
                        f,
                        "{}(l={}, sigma_sq={})",
                        stringify!($name),
                        self.ell,
                        self.sigma_sq
                    )
                }
            }
        }
    };
}

declare_isotropic_kernel!(
    Exponential,
    "Isotropic exponential kernel `σ² exp(-|x-y|² / 2l²)`"
);
declare_isotropic_kernel!(
    Matern32,
    "Isotropic Matern 3/2 kernel `σ² (1 + √3 r/l) exp(-√3 r/l)` with `r = |x-y|`"
);
declare_isotropic_kernel!(
    Matern52,
    "Isotropic Matern 5/2 kernel `σ² (1 + √5 r/l + 5r²/3l²) exp(-√5 r/l)` with `r = |x-y|`"
);

impl<F: Float> ExponentialKernel<F> {
    fn profile(&self, r2: F) -> (F, F) {
        let z = r2 / (self.ell * self.ell);
        let k = self.sigma_sq * (F::cast(-0.5) * z).exp();
        (k, k * z)
    }
}

impl<F: Float> Matern32Kernel<F> {
    fn profile(&self, r2: F) -> (F, F) {
        let a = F::cast(3.).sqrt() * r2.sqrt() / self.ell;
        let e = self.sigma_sq * (-a).exp();
        ((F::one() + a) * e, a * a * e)
    }
}

impl<F: Float> Matern52Kernel<F> {
    fn profile(&self, r2: F) -> (F, F) {
        let a = F::cast(5.).sqrt() * r2.sqrt() / self.ell;
        let e = self.sigma_sq * (-a).exp();
        let third = F::cast(1. / 3.);
        (
            (F::one() + a + a * a * third) * e,
            a * a * (F::one() + a) * third * e,
        )
    }
}

/// Squared exponential kernel with automatic relevance determination.
///
/// `k(x, y) = σ² exp(-(x-y)ᵗ M (x-y) / 2)` with `M = ΛΛᵗ + diag(l⁻²)`, where `l` holds one
/// length scale per input dimension and `Λ` is a (dim, rank) matrix. With `rank = 0` it
/// reduces to the standard ARD kernel.
///
/// Hyperparameters layout is `[log(l_1..l_dim), log(Λ[:, 0]), .., log(Λ[:, rank-1])]`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct SquaredExpArdKernel<F: Float> {
    sigma_sq: F,
    h_params: Array1<F>,
    ell: Array1<F>,
    lambda: Array2<F>,
    /// `ΛΛᵗ + diag(l⁻²)`, shared by value and gradient
    precision: Array2<F>,
}

impl<F: Float> SquaredExpArdKernel<F> {
    /// Kernel for `dim`-dimensional inputs with default configuration
    pub fn new(dim: usize) -> Self {
        Self::with_config(dim, &KernelConfig::default())
    }

    /// Current length scales
    pub fn length_scales(&self) -> ArrayView1<F> {
        self.ell.view()
    }

    /// Rank of the low rank correction
    pub fn rank(&self) -> usize {
        self.lambda.ncols()
    }

    fn update_precision(&mut self) {
        let dim = self.input_dim();
        let mut precision = if self.rank() > 0 {
            self.lambda.dot(&self.lambda.t())
        } else {
            Array2::zeros((dim, dim))
        };
        precision
            .diag_mut()
            .zip_mut_with(&self.ell, |m, &l| *m += F::one() / (l * l));
        self.precision = precision;
    }
}

impl<F: Float> Kernel<F> for SquaredExpArdKernel<F> {
    fn with_config(dim: usize, config: &KernelConfig<F>) -> Self {
        let rank = config.ard_rank;
        let mut h_params = Array1::zeros(dim * (1 + rank));
        h_params
            .slice_mut(ndarray::s![..dim])
            .fill(config.length_scale.ln());
        let mut kernel = SquaredExpArdKernel {
            sigma_sq: config.signal_variance,
            h_params: Array1::zeros(0),
            ell: Array1::zeros(dim),
            lambda: Array2::zeros((dim, rank)),
            precision: Array2::zeros((dim, dim)),
        };
        kernel.assign_h_params(h_params);
        kernel
    }

    fn input_dim(&self) -> usize {
        self.ell.len()
    }

    fn signal_variance(&self) -> F {
        self.sigma_sq
    }

    fn h_params(&self) -> ArrayView1<F> {
        self.h_params.view()
    }

    fn set_h_params(&mut self, params: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
        check_h_params_size(self.h_params.len(), params.len())?;
        self.assign_h_params(params.to_owned());
        Ok(())
    }

    fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix1>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> F {
        let d = x1 - x2;
        self.value_from_diff(&d)
    }

    fn grad(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix1>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        let d = x1 - x2;
        let k = self.value_from_diff(&d);
        let dim = self.input_dim();
        let mut grad = Array1::zeros(self.h_params.len());
        for i in 0..dim {
            let di = d[i] / self.ell[i];
            grad[i] = di * di * k;
        }
        if self.rank() > 0 {
            let dl = d.dot(&self.lambda);
            for j in 0..self.rank() {
                for i in 0..dim {
                    grad[(j + 1) * dim + i] = -k * d[i] * dl[j] * self.lambda[[i, j]];
                }
            }
        }
        grad
    }
}

impl<F: Float> SquaredExpArdKernel<F> {
    fn assign_h_params(&mut self, params: Array1<F>) {
        let dim = self.input_dim();
        for i in 0..dim {
            self.ell[i] = params[i].exp();
        }
        for j in 0..self.rank() {
            for i in 0..dim {
                self.lambda[[i, j]] = params[(j + 1) * dim + i].exp();
            }
        }
        self.h_params = params;
        self.update_precision();
    }

    fn value_from_diff(&self, d: &Array1<F>) -> F {
        let z = d.dot(&self.precision.dot(d)).max(F::zero());
        self.sigma_sq * (F::cast(-0.5) * z).exp()
    }
}

impl<F: Float> fmt::Display for SquaredExpArdKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SquaredExpArd(l={}, rank={}, sigma_sq={})",
            self.ell,
            self.rank(),
            self.sigma_sq
        )
    }
}
