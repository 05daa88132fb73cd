use crate::errors::{GpError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2};

/// Training samples, observations and noise variances of a GP, stored by insertion order.
///
/// Row `i` of samples and observations and component `i` of the noise describe the same
/// evaluation. All samples share the input dimension, all observations share the output
/// dimension, noise variances are non negative.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingData<F: Float> {
    samples: Array2<F>,
    observations: Array2<F>,
    noise: Array1<F>,
    mean_observation: Array1<F>,
}

impl<F: Float> TrainingData<F> {
    /// Empty training data with given dimensions
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        TrainingData {
            samples: Array2::zeros((0, input_dim)),
            observations: Array2::zeros((0, output_dim)),
            noise: Array1::zeros(0),
            mean_observation: Array1::zeros(output_dim),
        }
    }

    /// Training data built from `samples` (n, nx), `observations` (n, ny) and `noise` (n)
    pub fn from_arrays(
        samples: &ArrayBase<impl Data<Elem = F>, Ix2>,
        observations: &ArrayBase<impl Data<Elem = F>, Ix2>,
        noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        let n = samples.nrows();
        if observations.nrows() != n || noise.len() != n {
            return Err(GpError::DimensionMismatch(format!(
                "{} samples, {} observations and {} noise values given",
                n,
                observations.nrows(),
                noise.len()
            )));
        }
        check_observations(&observations.view())?;
        check_noise(&noise.view())?;
        let mut data = TrainingData {
            samples: samples.to_owned(),
            observations: observations.to_owned(),
            noise: noise.to_owned(),
            mean_observation: Array1::zeros(observations.ncols()),
        };
        data.update_mean_observation();
        Ok(data)
    }

    /// Append one evaluation, data is left unchanged on error
    pub fn push(
        &mut self,
        sample: &ArrayBase<impl Data<Elem = F>, Ix1>,
        observation: &ArrayBase<impl Data<Elem = F>, Ix1>,
        noise: F,
    ) -> Result<()> {
        if sample.len() != self.input_dim() {
            return Err(GpError::DimensionMismatch(format!(
                "sample of size {} given, expected {}",
                sample.len(),
                self.input_dim()
            )));
        }
        if observation.len() != self.output_dim() {
            return Err(GpError::DimensionMismatch(format!(
                "observation of size {} given, expected {}",
                observation.len(),
                self.output_dim()
            )));
        }
        check_observations(&observation.view().insert_axis(Axis(0)))?;
        check_noise(&ArrayView1::from(&[noise]))?;
        self.samples.push_row(sample.view())?;
        self.observations.push_row(observation.view())?;
        self.noise.append(Axis(0), ArrayView1::from(&[noise]))?;
        self.update_mean_observation();
        Ok(())
    }

    fn update_mean_observation(&mut self) {
        self.mean_observation = self
            .observations
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.output_dim()));
    }

    /// Number of stored evaluations
    pub fn nb_samples(&self) -> usize {
        self.samples.nrows()
    }

    /// Whether no evaluation is stored
    pub fn is_empty(&self) -> bool {
        self.nb_samples() == 0
    }

    /// Input space dimension
    pub fn input_dim(&self) -> usize {
        self.samples.ncols()
    }

    /// Output space dimension
    pub fn output_dim(&self) -> usize {
        self.observations.ncols()
    }

    /// Samples (n, nx)
    pub fn samples(&self) -> ArrayView2<F> {
        self.samples.view()
    }

    /// Observations (n, ny)
    pub fn observations(&self) -> ArrayView2<F> {
        self.observations.view()
    }

    /// Noise variances (n)
    pub fn noise(&self) -> ArrayView1<F> {
        self.noise.view()
    }

    /// Average of the observations per output dimension (zeros when empty)
    pub fn mean_observation(&self) -> ArrayView1<F> {
        self.mean_observation.view()
    }
}

fn check_observations<F: Float>(observations: &ArrayView2<F>) -> Result<()> {
    if observations.iter().any(|v| !v.is_finite()) {
        return Err(GpError::EvaluationError(
            "observations have to be finite".to_string(),
        ));
    }
    Ok(())
}

fn check_noise<F: Float>(noise: &ArrayView1<F>) -> Result<()> {
    if noise.iter().any(|v| !(*v >= F::zero()) || !v.is_finite()) {
        return Err(GpError::InvalidValueError(
            "noise variances have to be finite and non negative".to_string(),
        ));
    }
    Ok(())
}
