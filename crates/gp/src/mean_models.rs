//! A module for mean functions giving the prior mean of the GP model.
//!
//! The following mean functions are implemented:
//! * null (zero),
//! * constant,
//! * data (average of the observations),
//! * function ARD, an affine re-weighting of another mean function with trainable
//!   coefficients.

use crate::errors::{GpError, Result};
use crate::training_data::TrainingData;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use paste::paste;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// A trait for mean functions used in GP regression.
///
/// The training data are given so that data-driven means can use the observations.
pub trait MeanFunction<F: Float>: Clone + fmt::Debug + fmt::Display + Send + Sync {
    /// Prior mean at `x`, a vector of the output dimension
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>, data: &TrainingData<F>) -> Array1<F>;

    /// Prior means at the rows of `xs` as a (n, ny) matrix
    fn values(&self, xs: &ArrayBase<impl Data<Elem = F>, Ix2>, data: &TrainingData<F>) -> Array2<F> {
        let mut res = Array2::zeros((xs.nrows(), data.output_dim()));
        for (mut row, x) in res.rows_mut().into_iter().zip(xs.rows()) {
            row.assign(&self.value(&x, data));
        }
        res
    }

    /// Number of trainable parameters
    fn h_params_size(&self) -> usize {
        0
    }

    /// Trainable parameters
    fn h_params(&self) -> Array1<F> {
        Array1::zeros(0)
    }

    /// Set trainable parameters
    fn set_h_params(&mut self, params: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
        check_h_params_size(self.h_params_size(), params.len())
    }

    /// Gradient of the mean at `x` with respect to the parameters as a (ny, n_params) matrix
    fn grad(&self, _x: &ArrayBase<impl Data<Elem = F>, Ix1>, data: &TrainingData<F>) -> Array2<F> {
        Array2::zeros((data.output_dim(), self.h_params_size()))
    }

    /// Called when the model output dimension changes
    fn set_output_dim(&mut self, _output_dim: usize) {}
}

fn check_h_params_size(expected: usize, given: usize) -> Result<()> {
    if expected != given {
        return Err(GpError::DimensionMismatch(format!(
            "{given} mean hyperparameters given, expected {expected}"
        )));
    }
    Ok(())
}

/// A zero function as mean of the GP
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct NullMean();

impl<F: Float> MeanFunction<F> for NullMean {
    fn value(&self, _x: &ArrayBase<impl Data<Elem = F>, Ix1>, data: &TrainingData<F>) -> Array1<F> {
        Array1::zeros(data.output_dim())
    }
}

/// The average of the observations as mean of the GP
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct DataMean();

impl<F: Float> MeanFunction<F> for DataMean {
    fn value(&self, _x: &ArrayBase<impl Data<Elem = F>, Ix1>, data: &TrainingData<F>) -> Array1<F> {
        data.mean_observation().to_owned()
    }
}

macro_rules! declare_mean_util_impls {
    ($mean:ident) => {
        paste! {
            impl fmt::Display for [<$mean Mean>] {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "{}Mean", stringify!($mean))
                }
            }

            impl From<[<$mean Mean>]> for String {
                fn from(_item: [<$mean Mean>]) -> Self {
                    [<$mean Mean>]().to_string()
                }
            }

            impl TryFrom<String> for [<$mean Mean>] {
                type Error = &'static str;
                fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
                    if s == stringify!([<$mean Mean>]) {
                        Ok(Self::default())
                    } else {
                        Err(concat!("Bad string value for ", stringify!($mean), "Mean"))
                    }
                }
            }
        }
    };
}

declare_mean_util_impls!(Null);
declare_mean_util_impls!(Data);

/// A constant function as mean of the GP, same constant for every output
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ConstantMean<F: Float> {
    constant: F,
}

impl<F: Float> Default for ConstantMean<F> {
    fn default() -> Self {
        ConstantMean { constant: F::one() }
    }
}

impl<F: Float> ConstantMean<F> {
    /// Constant mean of given value
    pub fn new(constant: F) -> Self {
        ConstantMean { constant }
    }

    /// The constant value
    pub fn constant(&self) -> F {
        self.constant
    }
}

impl<F: Float> MeanFunction<F> for ConstantMean<F> {
    fn value(&self, _x: &ArrayBase<impl Data<Elem = F>, Ix1>, data: &TrainingData<F>) -> Array1<F> {
        Array1::from_elem(data.output_dim(), self.constant)
    }
}

impl<F: Float> fmt::Display for ConstantMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConstantMean({})", self.constant)
    }
}

/// An affine re-weighting of an inner mean function: `T [m(x); 1]`.
///
/// `T` is a trainable (ny, ny + 1) matrix whose parameters are laid out row by row,
/// initialized so that the inner mean is returned unchanged.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct FunctionArdMean<F: Float, M: MeanFunction<F>> {
    inner: M,
    tr: Array2<F>,
}

impl<F: Float, M: MeanFunction<F>> FunctionArdMean<F, M> {
    /// Wrap `inner` mean for `output_dim` outputs
    pub fn new(inner: M, output_dim: usize) -> Self {
        FunctionArdMean {
            inner,
            tr: identity_transform(output_dim),
        }
    }

    /// The wrapped mean function
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// The (ny, ny + 1) transform matrix
    pub fn transform(&self) -> &Array2<F> {
        &self.tr
    }

    fn augmented_inner(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>, data: &TrainingData<F>) -> Array1<F> {
        let m = self.inner.value(x, data);
        let mut m1 = Array1::ones(m.len() + 1);
        m1.slice_mut(ndarray::s![..m.len()]).assign(&m);
        m1
    }
}

fn identity_transform<F: Float>(output_dim: usize) -> Array2<F> {
    let mut tr = Array2::zeros((output_dim, output_dim + 1));
    for i in 0..output_dim {
        tr[[i, i]] = F::one();
    }
    tr
}

impl<F: Float, M: MeanFunction<F>> MeanFunction<F> for FunctionArdMean<F, M> {
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>, data: &TrainingData<F>) -> Array1<F> {
        self.tr.dot(&self.augmented_inner(x, data))
    }

    fn h_params_size(&self) -> usize {
        self.tr.len()
    }

    fn h_params(&self) -> Array1<F> {
        self.tr.iter().cloned().collect()
    }

    fn set_h_params(&mut self, params: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
        check_h_params_size(self.h_params_size(), params.len())?;
        self.tr = Array2::from_shape_vec(self.tr.raw_dim(), params.to_vec())?;
        Ok(())
    }

    fn grad(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>, data: &TrainingData<F>) -> Array2<F> {
        let m1 = self.augmented_inner(x, data);
        let (nrows, ncols) = self.tr.dim();
        let mut grad = Array2::zeros((nrows, self.h_params_size()));
        for i in 0..nrows {
            grad.slice_mut(ndarray::s![i, i * ncols..(i + 1) * ncols])
                .assign(&m1);
        }
        grad
    }

    fn set_output_dim(&mut self, output_dim: usize) {
        self.inner.set_output_dim(output_dim);
        if self.tr.nrows() != output_dim {
            self.tr = identity_transform(output_dim);
        }
    }
}

impl<F: Float, M: MeanFunction<F>> fmt::Display for FunctionArdMean<F, M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FunctionArdMean({}, T={})", self.inner, self.tr)
    }
}
