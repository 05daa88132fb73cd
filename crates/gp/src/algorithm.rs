use crate::errors::{GpError, Result};
use crate::factorization::CholeskyFactor;
use crate::hyperparameters::{neg_log_likelihood, HpTarget, HyperOptimization};
use crate::kernels::Kernel;
use crate::mean_models::MeanFunction;
use crate::parameters::{GpParams, GpValidParams};
use crate::training_data::TrainingData;
use crate::utils::to_f64;

use linfa::prelude::{DatasetBase, Fit, Float};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Ix2};
use std::fmt;
use std::time::Instant;

/// A GP regression model maintaining the Cholesky factorization of its covariance matrix
/// as training samples are added.
///
/// The observations are modeled as
///
/// `Y(x) = m(x) + Z(x)`
///
/// where:
/// * `m(x)` is the prior mean given by a [`MeanFunction`],
/// * `Z(x)` is a centered gaussian process with covariance `k(x, x')` given by a [`Kernel`].
///
/// Given `n` training samples `X` with observations `Y` and noise variances `s`, the covariance
/// matrix `K = k(X, X) + diag(s)` is factorized as `L Lᵗ` and `α = K⁻¹ (Y - m(X))` is cached.
/// The posterior at `x` is then
/// * mean: `m(x) + k(x)ᵗ α` in O(n)
/// * variance: `k(x, x) - |L⁻¹ k(x)|²` in O(n²)
///
/// where `k(x)` holds the covariances between `x` and the training samples.
///
/// Appending a sample with [`GaussianProcess::add_sample`] extends the factorization by one
/// row in O(n²) while [`GaussianProcess::compute`] and [`GaussianProcess::recompute`]
/// factorize from scratch in O(n³).
///
/// # Example
///
/// ```no_run
/// use gpbo_gp::{GaussianProcess, GpParams, kernels::*, mean_models::ConstantMean};
/// use linfa::ParamGuard;
/// use ndarray::array;
///
/// let kernel = Matern52Kernel::with_config(1, &KernelConfig::default().length_scale(0.25));
/// let params = GpParams::new(kernel, ConstantMean::default()).check().unwrap();
/// let mut gp = GaussianProcess::new(params);
///
/// gp.compute(&array![[1.], [2.], [3.]], &array![[5.], [10.], [5.]], &array![0., 0., 0.])
///     .expect("GP computation");
/// gp.add_sample(&array![2.5], &array![7.], 0.).expect("GP update");
///
/// let (mu, sigma) = gp.query(&array![1.5]).expect("GP query");
/// ```
#[derive(Clone, Debug)]
pub struct GaussianProcess<F: Float, K: Kernel<F>, M: MeanFunction<F>> {
    /// Covariance function
    pub(crate) kernel: K,
    /// Prior mean function
    pub(crate) mean: M,
    /// Hyperparameters optimization policy
    hp_opt: Option<HyperOptimization>,
    /// Training samples, observations and noise
    data: TrainingData<F>,
    /// Prior means at the training samples (n, ny)
    mean_values: Array2<F>,
    /// Factorization of the covariance matrix of the training samples
    chol: CholeskyFactor<F>,
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> fmt::Display for GaussianProcess<F, K, M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(kernel={}, mean={}, samples={}, likelihood={})",
            self.kernel,
            self.mean,
            self.nb_samples(),
            self.log_likelihood(),
        )
    }
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> GaussianProcess<F, K, M> {
    /// Gp parameters contructor
    pub fn params<NewK: Kernel<F>, NewM: MeanFunction<F>>(
        kernel: NewK,
        mean: NewM,
    ) -> GpParams<F, NewK, NewM> {
        GpParams::new(kernel, mean)
    }

    /// A model without training data
    pub fn new(params: GpValidParams<F, K, M>) -> Self {
        let GpValidParams {
            kernel,
            mut mean,
            noise: _,
            output_dim,
            hp_opt,
        } = params;
        mean.set_output_dim(output_dim);
        let input_dim = kernel.input_dim();
        GaussianProcess {
            kernel,
            mean,
            hp_opt,
            data: TrainingData::new(input_dim, output_dim),
            mean_values: Array2::zeros((0, output_dim)),
            chol: CholeskyFactor::new(output_dim),
        }
    }

    /// Replace the training data with `samples` (n, nx), `observations` (n, ny) and
    /// `noise` variances (n) and factorize the covariance matrix from scratch.
    ///
    /// The output dimension of the model becomes the one of the observations. The model is
    /// left unchanged on error.
    pub fn compute(
        &mut self,
        samples: &ArrayBase<impl Data<Elem = F>, Ix2>,
        observations: &ArrayBase<impl Data<Elem = F>, Ix2>,
        noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        self.check_input_dim(samples.ncols())?;
        if observations.ncols() == 0 {
            return Err(GpError::DimensionMismatch(
                "observations should have at least one component".to_string(),
            ));
        }
        let data = TrainingData::from_arrays(samples, observations, noise)?;
        let mut mean = self.mean.clone();
        mean.set_output_dim(data.output_dim());

        let mut chol = CholeskyFactor::new(data.output_dim());
        chol.factorize(&self.kernel, &data)?;
        let mean_values = mean.values(&data.samples(), &data);
        chol.update_alpha(&(&data.observations() - &mean_values))?;

        self.mean = mean;
        self.data = data;
        self.mean_values = mean_values;
        self.chol = chol;
        Ok(())
    }

    /// Append one training sample and extend the factorization incrementally.
    ///
    /// When the incremental update is not positive definite the covariance matrix is
    /// factorized from scratch. A non finite observation gives an
    /// [`GpError::EvaluationError`] and the model is left unchanged.
    pub fn add_sample(
        &mut self,
        sample: &ArrayBase<impl Data<Elem = F>, Ix1>,
        observation: &ArrayBase<impl Data<Elem = F>, Ix1>,
        noise: F,
    ) -> Result<()> {
        let mut data = self.data.clone();
        data.push(sample, observation, noise)?;

        if let Err(err) = self.chol.extend(&self.kernel, &data) {
            warn!("Incremental factorization failed ({err}), factorize from scratch");
            self.chol.factorize(&self.kernel, &data)?;
        }
        self.data = data;
        self.mean_values = self.mean.values(&self.data.samples(), &self.data);
        self.update_alpha()
    }

    /// Factorize the covariance matrix from scratch with the current hyperparameters.
    ///
    /// When `update_mean` is true the prior means at the training samples are evaluated
    /// again (needed after mean hyperparameters change), otherwise cached values are used.
    pub fn recompute(&mut self, update_mean: bool) -> Result<()> {
        if update_mean || self.mean_values.nrows() != self.data.nb_samples() {
            self.mean_values = self.mean.values(&self.data.samples(), &self.data);
        }
        self.chol.factorize(&self.kernel, &self.data)?;
        self.update_alpha()
    }

    fn update_alpha(&mut self) -> Result<()> {
        let residuals = &self.data.observations() - &self.mean_values;
        self.chol.update_alpha(&residuals)
    }

    fn check_input_dim(&self, dim: usize) -> Result<()> {
        if dim != self.input_dim() {
            return Err(GpError::DimensionMismatch(format!(
                "input of dimension {} given, expected {}",
                dim,
                self.input_dim()
            )));
        }
        Ok(())
    }

    /// Posterior mean (ny) and variance at `x`.
    ///
    /// Without training data the prior `(m(x), k(x, x))` is returned. The variance is
    /// clamped to zero as round-off errors may give small negative values.
    pub fn query(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<(Array1<F>, F)> {
        self.check_input_dim(x.len())?;
        let prior_mean = self.mean.value(x, &self.data);
        let prior_var = self.kernel.value(x, x);
        if self.data.is_empty() {
            return Ok((prior_mean, non_negative(prior_var)));
        }
        let k = self.kernel.cross_covariance(x, &self.data.samples());
        let mu = prior_mean + self.chol.alpha().t().dot(&k);
        let v = self.chol.solve_lower(&k)?;
        let sigma = prior_var - v.dot(&v);
        Ok((mu, non_negative(sigma)))
    }

    /// Posterior mean at `x`, same as `query(x).0`
    pub fn mu(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        Ok(self.query(x)?.0)
    }

    /// Posterior variance at `x`, same as `query(x).1`
    pub fn sigma(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<F> {
        Ok(self.query(x)?.1)
    }

    /// Predict posterior means at n given `x` points of nx components specified as a (n, nx)
    /// matrix. Returns a (n, ny) matrix.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let mut res = Array2::zeros((x.nrows(), self.output_dim()));
        for (mut row, xi) in res.rows_mut().into_iter().zip(x.rows()) {
            row.assign(&self.mu(&xi)?);
        }
        Ok(res)
    }

    /// Predict posterior variances at n given `x` points of nx components specified as a
    /// (n, nx) matrix.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        x.rows().into_iter().map(|xi| self.sigma(&xi)).collect()
    }

    /// Log marginal likelihood of the training data
    ///
    /// `-tr(Rᵗ α) / 2 - log(det(K)) / 2 - n log(2π) / 2` where `R = Y - m(X)`.
    pub fn log_likelihood(&self) -> F {
        let n = self.nb_samples();
        if n == 0 {
            return F::zero();
        }
        let residuals = &self.data.observations() - &self.mean_values;
        let fit = (&residuals * &self.chol.alpha()).sum();
        let half = F::cast(0.5);
        -half * fit
            - self.chol.half_log_det()
            - half * F::cast(n) * F::cast(2. * std::f64::consts::PI).ln()
    }

    /// Gradient of the log likelihood with respect to the kernel hyperparameters
    ///
    /// `tr((α αᵗ - K⁻¹) ∂K/∂θ) / 2`
    pub fn kernel_log_likelihood_grad(&self) -> Result<Array1<F>> {
        let n = self.nb_samples();
        let mut grad = Array1::zeros(self.kernel.h_params_size());
        if n == 0 {
            return Ok(grad);
        }
        let alpha = self.chol.alpha();
        let w = alpha.dot(&alpha.t()) - self.chol.inverse()?;
        let samples = self.data.samples();
        let half = F::cast(0.5);
        for i in 0..n {
            for j in 0..=i {
                let wij = if i == j { half * w[[i, j]] } else { w[[i, j]] };
                grad.scaled_add(wij, &self.kernel.grad(&samples.row(i), &samples.row(j)));
            }
        }
        Ok(grad)
    }

    /// Gradient of the log likelihood with respect to the mean hyperparameters
    ///
    /// `Σᵢ (∂m(xᵢ)/∂θ)ᵗ αᵢ`
    pub fn mean_log_likelihood_grad(&self) -> Array1<F> {
        let mut grad = Array1::zeros(self.mean.h_params_size());
        for (x, alpha) in self.data.samples().rows().into_iter().zip(self.chol.alpha().rows()) {
            grad += &self.mean.grad(&x, &self.data).t().dot(&alpha);
        }
        grad
    }

    /// Optimize hyperparameters by maximizing the log likelihood of the training data.
    ///
    /// Does nothing when the model has no optimization policy or no training data. The
    /// optimizer runs once from the current hyperparameters and once from each of `restarts`
    /// points drawn independently and uniformly in the policy `init_range`. The best
    /// hyperparameters found are set and the model is recomputed. Current hyperparameters are
    /// kept when no run improves on their likelihood.
    pub fn optimize_hyperparams(&mut self) -> Result<()> {
        let hp_opt = match &self.hp_opt {
            Some(hp_opt) => hp_opt.clone(),
            None => {
                debug!("No hyperparameters optimization policy, skip");
                return Ok(());
            }
        };
        let target = hp_opt.target;
        let size = target.size(self);
        if self.data.is_empty() || size == 0 {
            return Ok(());
        }

        let (lower, upper) = hp_opt.init_range;
        let current = target.h_params(self).mapv(to_f64);
        let mut starts = Array2::zeros((hp_opt.optimizer.n_restarts() + 1, size));
        starts.row_mut(0).assign(&current);
        for mut start in starts.rows_mut().into_iter().skip(1) {
            start.assign(&hp_opt.optimizer.rng().uniform_vector(size, lower, upper));
        }
        let objfn = |p: &[f64], gradient: Option<&mut [f64]>, gp: &mut Self| -> f64 {
            neg_log_likelihood(target, p, gradient, gp)
        };

        debug!(
            "Optimize {:?} hyperparameters ({}) from {} with {} random restarts",
            target,
            size,
            current,
            starts.nrows() - 1
        );
        let now = Instant::now();
        let (fmin, best) = hp_opt.optimizer.minimize_from(&objfn, &starts, self.clone());
        debug!("elapsed optim = {:?}", now.elapsed().as_millis());

        if !fmin.is_finite() {
            warn!("Hyperparameters optimization failed, previous values are kept");
            return Ok(());
        }
        let current_value = -to_f64(self.log_likelihood());
        if current_value.is_finite() && fmin >= current_value {
            debug!(
                "No improvement on current hyperparameters (-log likelihood = {})",
                current_value
            );
            return Ok(());
        }
        let best: Array1<F> = best.iter().map(|&v| F::cast(v)).collect();
        target.set_h_params(self, &best)?;
        self.recompute(target.updates_mean())?;
        info!(
            "Hyperparameters optimized: {} (log likelihood = {})",
            best,
            self.log_likelihood()
        );
        Ok(())
    }

    /// Lower triangular factor `L` of the covariance matrix `K = L Lᵗ`
    pub fn matrix_l(&self) -> ArrayView2<F> {
        self.chol.l()
    }

    /// `α = K⁻¹ (Y - m(X))` (n, ny)
    pub fn alpha(&self) -> ArrayView2<F> {
        self.chol.alpha()
    }

    /// Jitter added to the covariance diagonal to make it positive definite
    pub fn jitter(&self) -> F {
        self.chol.jitter()
    }

    /// Training samples (n, nx)
    pub fn samples(&self) -> ArrayView2<F> {
        self.data.samples()
    }

    /// Training observations (n, ny)
    pub fn observations(&self) -> ArrayView2<F> {
        self.data.observations()
    }

    /// Training noise variances (n)
    pub fn noise(&self) -> ArrayView1<F> {
        self.data.noise()
    }

    /// Average of the training observations (ny)
    pub fn mean_observation(&self) -> ArrayView1<F> {
        self.data.mean_observation()
    }

    /// Number of training samples
    pub fn nb_samples(&self) -> usize {
        self.data.nb_samples()
    }

    /// Input dimension
    pub fn input_dim(&self) -> usize {
        self.kernel.input_dim()
    }

    /// Output dimension
    pub fn output_dim(&self) -> usize {
        self.data.output_dim()
    }

    /// Covariance function
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Prior mean function
    pub fn mean(&self) -> &M {
        &self.mean
    }

    /// Hyperparameters optimization policy
    pub fn hp_opt(&self) -> Option<&HyperOptimization> {
        self.hp_opt.as_ref()
    }

    /// Set kernel hyperparameters (log-space) and recompute the model
    pub fn set_kernel_h_params(&mut self, params: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
        HpTarget::Kernel.set_h_params(self, params)?;
        self.recompute(false)
    }

    /// Set mean hyperparameters and recompute the model
    pub fn set_mean_h_params(&mut self, params: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
        HpTarget::Mean.set_h_params(self, params)?;
        self.recompute(true)
    }
}

fn non_negative<F: Float>(v: F) -> F {
    if v > F::zero() {
        v
    } else {
        F::zero()
    }
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>, GpError> for GpValidParams<F, K, M>
{
    type Object = GaussianProcess<F, K, M>;

    /// Compute the GP on the dataset using the default noise then optimize its hyperparameters
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        let mut gp = GaussianProcess::new(self.clone());
        gp.compute(x, y, &Array1::from_elem(x.nrows(), self.noise))?;
        gp.optimize_hyperparams()?;
        Ok(gp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{
        ExponentialKernel, KernelConfig, Matern32Kernel, Matern52Kernel, SquaredExpArdKernel,
    };
    use crate::mean_models::{ConstantMean, DataMean, FunctionArdMean};
    use approx::assert_abs_diff_eq;
    use paste::paste;
    use gpbo_opt::RandomSource;
    use linfa::ParamGuard;
    use ndarray::{array, s, Array, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;
    use std::sync::Arc;

    type MaternGp = GaussianProcess<f64, Matern52Kernel<f64>, ConstantMean<f64>>;

    fn matern_gp(dim: usize, length_scale: f64) -> MaternGp {
        let kernel =
            Matern52Kernel::with_config(dim, &KernelConfig::default().length_scale(length_scale));
        GaussianProcess::new(GpParams::new(kernel, ConstantMean::default()).check().unwrap())
    }

    #[test]
    fn test_gp() {
        let mut gp = matern_gp(1, 0.25);
        gp.compute(
            &array![[1.], [2.], [3.]],
            &array![[5.], [10.], [5.]],
            &Array1::zeros(3),
        )
        .unwrap();

        for (x, y) in [(1., 5.), (2., 10.), (3., 5.)] {
            let (mu, sigma) = gp.query(&array![x]).unwrap();
            assert_abs_diff_eq!(mu[0], y, epsilon = 1.);
            assert!(sigma < 1e-5);
        }

        for x in Array::linspace(0., 4., 80).iter() {
            let x = array![*x];
            let (mu, sigma) = gp.query(&x).unwrap();
            assert_eq!(gp.mu(&x).unwrap(), mu);
            assert_eq!(gp.sigma(&x).unwrap(), sigma);
        }
    }

    #[test]
    fn test_gp_dim() {
        let kernel = Matern52Kernel::with_config(2, &KernelConfig::default().length_scale(0.25));
        let params = GpParams::new(kernel, ConstantMean::default())
            .output_dim(2)
            .check()
            .unwrap();
        let mut gp = GaussianProcess::new(params);
        gp.compute(
            &array![[1., 1.], [2., 2.], [3., 3.]],
            &array![[5., 5.], [10., 10.], [5., 5.]],
            &Array1::zeros(3),
        )
        .unwrap();
        assert_eq!(gp.output_dim(), 2);

        let (mu, sigma) = gp.query(&array![1., 1.]).unwrap();
        assert_abs_diff_eq!(mu, array![5., 5.], epsilon = 1.);
        assert!(sigma < 1e-5);
    }

    macro_rules! test_gp_init_variance {
        ($kernel:ident) => {
            paste! {
                #[test]
                fn [<test_gp_init_variance_ $kernel:snake>]() {
                    let kernel =
                        $kernel::with_config(1, &KernelConfig::default().signal_variance(10.));
                    assert_eq!(kernel.signal_variance(), 10.);
                    let params = GpParams::new(kernel, ConstantMean::new(2.)).check().unwrap();
                    let gp = GaussianProcess::new(params);
                    for x in [-1., 0., 1.5] {
                        let (mu, sigma) = gp.query(&array![x]).unwrap();
                        assert_eq!(mu, array![2.]);
                        assert_abs_diff_eq!(sigma, 10., epsilon = 1e-12);
                    }
                    assert_eq!(gp.log_likelihood(), 0.);
                }
            }
        };
    }

    test_gp_init_variance!(ExponentialKernel);
    test_gp_init_variance!(Matern32Kernel);
    test_gp_init_variance!(Matern52Kernel);
    test_gp_init_variance!(SquaredExpArdKernel);

    #[test]
    fn test_variance_never_negative() {
        let mut gp = matern_gp(1, 2.);
        let xt = Array::linspace(0., 1., 8).insert_axis(Axis(1));
        let yt = xt.mapv(|v: f64| v.sin());
        gp.compute(&xt, &yt, &Array1::zeros(8)).unwrap();
        let xs = Array::linspace(-1., 2., 301).insert_axis(Axis(1));
        let vars = gp.predict_var(&xs).unwrap();
        assert!(vars.iter().all(|v| *v >= 0.));
        let vars = gp.predict_var(&xt).unwrap();
        assert!(vars.iter().all(|v| *v >= 0.));

        // noiseless sample with σ² = 3: k(x, x) - |L⁻¹k|² rounds below zero at the sample
        let kernel = Matern52Kernel::with_config(1, &KernelConfig::default().signal_variance(3.));
        let mut gp = GaussianProcess::new(GpParams::new(kernel, ConstantMean::default()).check().unwrap());
        gp.compute(&array![[0.5]], &array![[1.]], &Array1::zeros(1)).unwrap();
        let x = array![0.5];
        let k = gp.kernel().cross_covariance(&x, &gp.samples());
        let v = gp.chol.solve_lower(&k).unwrap();
        let raw = gp.kernel().value(&x, &x) - v.dot(&v);
        assert!(raw < 0.);
        assert_eq!(gp.sigma(&x).unwrap(), 0.);
    }

    #[test]
    fn test_predict() {
        let mut gp = matern_gp(1, 0.5);
        let xt = array![[0.], [1.], [2.], [3.]];
        let yt = array![[0.], [1.], [1.5], [0.9]];
        gp.compute(&xt, &yt, &Array1::zeros(4)).unwrap();
        let means = gp.predict(&xt).unwrap();
        assert_abs_diff_eq!(means, yt, epsilon = 1e-6);
        let xs = array![[0.5], [2.5]];
        let means = gp.predict(&xs).unwrap();
        for (i, x) in xs.rows().into_iter().enumerate() {
            assert_eq!(means.row(i), gp.mu(&x).unwrap());
        }
    }

    fn random_dataset(n: usize, dim: usize, seed: u64) -> (Array2<f64>, Array2<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let xt = Array::random_using((n, dim), Uniform::new(0., 5.), &mut rng);
        let yt = Array::random_using((n, 1), Uniform::new(-2., 2.), &mut rng);
        (xt, yt)
    }

    #[test]
    fn test_incremental_matches_compute() {
        let (xt, yt) = random_dataset(20, 2, 42);
        let mut gp = matern_gp(2, 0.5);
        gp.compute(
            &xt.slice(s![..19, ..]),
            &yt.slice(s![..19, ..]),
            &Array1::zeros(19),
        )
        .unwrap();
        gp.add_sample(&xt.row(19), &yt.row(19), 0.).unwrap();

        let mut gp2 = matern_gp(2, 0.5);
        gp2.compute(&xt, &yt, &Array1::zeros(20)).unwrap();

        let x = array![2.5, 2.5];
        assert_abs_diff_eq!(gp.matrix_l(), gp2.matrix_l(), epsilon = 1e-5);
        assert_abs_diff_eq!(gp.mu(&x).unwrap(), gp2.mu(&x).unwrap(), epsilon = 1e-5);
        assert_abs_diff_eq!(gp.sigma(&x).unwrap(), gp2.sigma(&x).unwrap(), epsilon = 1e-5);

        gp.recompute(true).unwrap();
        assert_abs_diff_eq!(gp.matrix_l(), gp2.matrix_l(), epsilon = 1e-5);
        assert_abs_diff_eq!(gp.alpha(), gp2.alpha(), epsilon = 1e-5);
    }

    #[test]
    fn test_add_sample_from_empty() {
        let (xt, yt) = random_dataset(10, 2, 7);
        let mut gp = matern_gp(2, 0.5);
        for (x, y) in xt.rows().into_iter().zip(yt.rows()) {
            gp.add_sample(&x, &y, 0.01).unwrap();
        }
        let mut gp2 = matern_gp(2, 0.5);
        gp2.compute(&xt, &yt, &Array1::from_elem(10, 0.01)).unwrap();

        assert_eq!(gp.nb_samples(), 10);
        assert_abs_diff_eq!(gp.matrix_l(), gp2.matrix_l(), epsilon = 1e-8);
        assert_abs_diff_eq!(gp.log_likelihood(), gp2.log_likelihood(), epsilon = 1e-8);
    }

    #[test]
    fn test_add_sample_fallback_to_full_factorization() {
        let mut gp = matern_gp(1, 1.);
        gp.compute(&array![[1.]], &array![[2.]], &Array1::zeros(1))
            .unwrap();
        assert_eq!(gp.jitter(), 0.);
        // duplicated noiseless sample makes the incremental update singular
        gp.add_sample(&array![1.], &array![2.], 0.).unwrap();
        assert_eq!(gp.nb_samples(), 2);
        assert!(gp.jitter() > 0.);
        let (mu, _) = gp.query(&array![1.]).unwrap();
        assert_abs_diff_eq!(mu[0], 2., epsilon = 1e-3);
    }

    #[test]
    fn test_gp_bw_inversion() {
        let n = 20;
        let mut failures = 0;
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        for _ in 0..n {
            let xt = Array::random_using((101, 1), Uniform::new(0., 10.), &mut rng);
            let yt = Array::random_using((101, 1), Uniform::new(0., 10.), &mut rng);
            let x = Array::random_using(1, Uniform::new(0., 10.), &mut rng);

            let mut gp = matern_gp(1, 0.25);
            if gp
                .compute(
                    &xt.slice(s![..100, ..]),
                    &yt.slice(s![..100, ..]),
                    &Array1::zeros(100),
                )
                .is_err()
            {
                failures += 1;
                continue;
            }

            let now = Instant::now();
            let incremental = gp.add_sample(&xt.row(100), &yt.row(100), 0.);
            let time_increment = now.elapsed();

            let now = Instant::now();
            let recomputed = gp.recompute(true);
            let time_recompute = now.elapsed();

            let mut gp2 = matern_gp(1, 0.25);
            let full = gp2.compute(&xt, &yt, &Array1::zeros(101));

            if incremental.is_err() || recomputed.is_err() || full.is_err() {
                failures += 1;
                continue;
            }
            let mu_diff = (gp.mu(&x).unwrap() - gp2.mu(&x).unwrap()).mapv(f64::abs).sum();
            if mu_diff >= 1e-5 {
                failures += 1;
            }
            let l_diff = (&gp.matrix_l() - &gp2.matrix_l()).mapv(|v| v * v).sum().sqrt();
            let l_norm = gp2.matrix_l().mapv(|v| v * v).sum().sqrt();
            if l_diff > 1e-5 * l_norm {
                failures += 1;
            }
            if time_recompute <= time_increment {
                failures += 1;
            }
        }
        assert!((failures as f64) / (n as f64) < 0.1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut gp = matern_gp(2, 1.);
        let res = gp.compute(&array![[1.], [2.]], &array![[1.], [2.]], &Array1::zeros(2));
        assert!(matches!(res, Err(GpError::DimensionMismatch(_))));
        let res = gp.compute(&array![[1., 1.], [2., 2.]], &array![[1.]], &Array1::zeros(2));
        assert!(matches!(res, Err(GpError::DimensionMismatch(_))));
        let res = gp.compute(
            &array![[1., 1.], [2., 2.]],
            &array![[1.], [2.]],
            &Array1::zeros(3),
        );
        assert!(matches!(res, Err(GpError::DimensionMismatch(_))));

        gp.compute(&array![[1., 1.], [2., 2.]], &array![[1.], [2.]], &Array1::zeros(2))
            .unwrap();
        assert!(matches!(
            gp.query(&array![1.]),
            Err(GpError::DimensionMismatch(_))
        ));
        assert!(matches!(
            gp.add_sample(&array![1., 2., 3.], &array![1.], 0.),
            Err(GpError::DimensionMismatch(_))
        ));
        assert!(matches!(
            gp.add_sample(&array![1., 2.], &array![1., 2.], 0.),
            Err(GpError::DimensionMismatch(_))
        ));
        assert_eq!(gp.nb_samples(), 2);
    }

    #[test]
    fn test_evaluation_error_keeps_model() {
        let mut gp = matern_gp(1, 0.5);
        gp.compute(&array![[0.], [1.]], &array![[1.], [3.]], &Array1::zeros(2))
            .unwrap();
        let before = gp.query(&array![0.5]).unwrap();
        let res = gp.add_sample(&array![2.], &array![f64::INFINITY], 0.);
        assert!(matches!(res, Err(GpError::EvaluationError(_))));
        assert_eq!(gp.nb_samples(), 2);
        assert_eq!(gp.matrix_l().nrows(), 2);
        assert_eq!(gp.query(&array![0.5]).unwrap(), before);
    }

    #[test]
    fn test_data_mean() {
        let kernel = Matern52Kernel::with_config(1, &KernelConfig::default().length_scale(0.1));
        let mut gp = GaussianProcess::new(GpParams::new(kernel, DataMean()).check().unwrap());
        gp.compute(&array![[0.], [1.]], &array![[1.], [3.]], &Array1::zeros(2))
            .unwrap();
        assert_eq!(gp.mean_observation(), array![2.]);
        // far from the samples the posterior mean reverts to the data mean
        assert_abs_diff_eq!(gp.mu(&array![10.]).unwrap()[0], 2., epsilon = 1e-8);
        gp.add_sample(&array![2.], &array![5.], 0.).unwrap();
        assert_abs_diff_eq!(gp.mu(&array![10.]).unwrap()[0], 3., epsilon = 1e-8);
    }

    #[test]
    fn test_optimize_without_policy_is_noop() {
        let mut gp = matern_gp(1, 0.5);
        gp.compute(&array![[0.], [1.]], &array![[1.], [3.]], &Array1::zeros(2))
            .unwrap();
        let h_params = gp.kernel().h_params().to_owned();
        gp.optimize_hyperparams().unwrap();
        assert_eq!(gp.kernel().h_params(), h_params);
    }

    #[test]
    fn test_set_h_params_recompute() {
        let mut gp = matern_gp(1, 0.5);
        let xt = array![[0.], [0.4], [1.]];
        let yt = array![[1.], [2.], [3.]];
        gp.compute(&xt, &yt, &Array1::zeros(3)).unwrap();
        gp.set_kernel_h_params(&array![1f64.ln()]).unwrap();

        let mut gp2 = matern_gp(1, 1.);
        gp2.compute(&xt, &yt, &Array1::zeros(3)).unwrap();
        assert_abs_diff_eq!(gp.matrix_l(), gp2.matrix_l(), epsilon = 1e-10);
        assert_abs_diff_eq!(gp.alpha(), gp2.alpha(), epsilon = 1e-10);
    }

    #[test]
    fn test_gp_auto() {
        let rng = Arc::new(RandomSource::seed_from_u64(42));
        let params = GpParams::new(SquaredExpArdKernel::new(1), ConstantMean::default())
            .hp_opt(HyperOptimization::rprop(HpTarget::Kernel, rng).restarts(4));
        let gp = params
            .fit(&DatasetBase::new(array![[1.], [2.], [3.]], array![[5.], [10.], [5.]]))
            .expect("GP fit error");

        for (x, y) in [(1., 5.), (2., 10.), (3., 5.)] {
            let (mu, sigma) = gp.query(&array![x]).unwrap();
            assert_abs_diff_eq!(mu[0], y, epsilon = 1.);
            assert!(sigma < 1e-5);
        }
    }

    #[test]
    fn test_optimize_improves_likelihood() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let xt = Array::random_using((15, 1), Uniform::new(0., 4.), &mut rng);
        let yt = xt.mapv(|v: f64| (2. * v).sin());
        let hp_opt = HyperOptimization::rprop(
            HpTarget::Kernel,
            Arc::new(RandomSource::seed_from_u64(0)),
        )
        .restarts(3);
        let kernel = Matern52Kernel::with_config(1, &KernelConfig::default().length_scale(0.05));
        let params = GpParams::new(kernel, ConstantMean::new(0.)).hp_opt(hp_opt);
        let mut gp = GaussianProcess::new(params.check().unwrap());
        gp.compute(&xt, &yt, &Array1::from_elem(15, 1e-6)).unwrap();
        let before = gp.log_likelihood();
        gp.optimize_hyperparams().unwrap();
        assert!(gp.log_likelihood() >= before);
        // hyperparameters are set and the model recomputed with them
        let mut gp2 = gp.clone();
        gp2.recompute(false).unwrap();
        assert_abs_diff_eq!(gp.log_likelihood(), gp2.log_likelihood(), epsilon = 1e-10);
    }

    #[test]
    fn test_optimize_keeps_better_current_params() {
        // the likelihood over log l has a sharp mode following the oscillation and a smooth
        // one taking it for noise
        let xt = Array::linspace(0., 1., 40).insert_axis(Axis(1));
        let yt = xt.mapv(|v: f64| v + 0.3 * (23. * v).sin());
        let noise = Array1::from_elem(40, 1e-2);
        let params = GpParams::new(Matern52Kernel::new(1), ConstantMean::default());

        let mut gp = GaussianProcess::new(params.clone().check().unwrap());
        gp.compute(&xt, &yt, &noise).unwrap();
        let (mut best_ll, mut best_log_l) = (f64::NEG_INFINITY, 0.);
        for log_l in Array::linspace(-3., 3., 601).iter() {
            gp.set_kernel_h_params(&array![*log_l]).unwrap();
            if gp.log_likelihood() > best_ll {
                best_ll = gp.log_likelihood();
                best_log_l = *log_l;
            }
        }

        for seed in 0..10 {
            let rng = Arc::new(RandomSource::seed_from_u64(seed));
            let hp_opt = HyperOptimization::rprop(HpTarget::Kernel, rng).restarts(4);
            let mut gp = GaussianProcess::new(params.clone().hp_opt(hp_opt).check().unwrap());
            gp.compute(&xt, &yt, &noise).unwrap();
            gp.set_kernel_h_params(&array![best_log_l]).unwrap();
            let before = gp.log_likelihood();
            gp.optimize_hyperparams().unwrap();
            assert!(
                gp.log_likelihood() >= before,
                "seed {seed}: {} < {before}",
                gp.log_likelihood()
            );
            assert_abs_diff_eq!(gp.kernel().h_params()[0], best_log_l, epsilon = 0.1);
        }
    }

    #[test]
    fn test_optimize_from_independent_starts() {
        // starting in the basin of the smooth mode, random restarts reach the sharp one
        let xt = Array::linspace(0., 1., 40).insert_axis(Axis(1));
        let yt = xt.mapv(|v: f64| v + 0.3 * (23. * v).sin());
        let rng = Arc::new(RandomSource::seed_from_u64(0));
        let hp_opt = HyperOptimization::rprop(HpTarget::Kernel, rng).restarts(10);
        let kernel = Matern52Kernel::with_config(1, &KernelConfig::default().length_scale(3.));
        let params = GpParams::new(kernel, ConstantMean::default()).hp_opt(hp_opt);
        let mut gp = GaussianProcess::new(params.check().unwrap());
        gp.compute(&xt, &yt, &Array1::from_elem(40, 1e-2)).unwrap();
        gp.optimize_hyperparams().unwrap();
        assert!(gp.kernel().h_params()[0] < 0.);
    }

    /// Sum over sample points of the distance between the analytic gradient of the negative
    /// log likelihood and its central finite difference estimate
    fn check_grad<K: Kernel<f64>, M: MeanFunction<f64>>(
        gp: &GaussianProcess<f64, K, M>,
        target: HpTarget,
        points: &Array2<f64>,
    ) -> f64 {
        let e = 1e-4;
        let mut total = 0.;
        for p in points.rows() {
            let p = p.to_vec();
            let mut analytic = vec![0.; p.len()];
            neg_log_likelihood(target, &p, Some(&mut analytic[..]), &mut gp.clone());
            let mut finite_diff = vec![0.; p.len()];
            for j in 0..p.len() {
                let (mut p1, mut p2) = (p.clone(), p.clone());
                p1[j] -= e;
                p2[j] += e;
                let f1 = neg_log_likelihood(target, &p1, None, &mut gp.clone());
                let f2 = neg_log_likelihood(target, &p2, None, &mut gp.clone());
                finite_diff[j] = (f2 - f1) / (2. * e);
            }
            total += analytic
                .iter()
                .zip(finite_diff.iter())
                .map(|(a, f)| (a - f) * (a - f))
                .sum::<f64>()
                .sqrt();
        }
        total
    }

    #[test]
    fn test_gp_check_lf_grad() {
        let (n, m) = (40, 10);
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let xt = Array::random_using((n, 4), Uniform::new(0., 1.), &mut rng);
        let yt = Array::random_using((n, 2), Uniform::new(0., 1.), &mut rng);

        let kernel = SquaredExpArdKernel::with_config(4, &KernelConfig::default().ard_rank(1));
        let mean = FunctionArdMean::new(ConstantMean::default(), 2);
        let params = GpParams::new(kernel, mean).output_dim(2).check().unwrap();
        let mut gp = GaussianProcess::new(params);
        gp.compute(&xt, &yt, &Array1::from_elem(n, 0.01)).unwrap();

        let n_kernel = gp.kernel().h_params_size();
        let n_mean = gp.mean().h_params_size();
        assert_eq!(n_kernel, 8);
        assert_eq!(n_mean, 6);

        let points = Array::random_using((m, n_kernel), Uniform::new(0., 1.), &mut rng);
        assert!(check_grad(&gp, HpTarget::Kernel, &points) < m as f64 * 1e-4);

        let points = Array::random_using((m, n_kernel + n_mean), Uniform::new(0., 1.), &mut rng);
        assert!(check_grad(&gp, HpTarget::KernelMean, &points) < m as f64 * 1e-4);

        let points = Array::random_using((m, n_mean), Uniform::new(0., 1.), &mut rng);
        assert!(check_grad(&gp, HpTarget::Mean, &points) < m as f64 * 1e-4);
    }

    #[test]
    fn test_objective_failure_is_infinite() {
        let mut gp = matern_gp(1, 1.);
        gp.compute(&array![[0.], [1.]], &array![[1.], [2.]], &Array1::zeros(2))
            .unwrap();
        let mut grad = vec![1.];
        let v = neg_log_likelihood(HpTarget::Kernel, &[f64::NAN], Some(&mut grad[..]), &mut gp);
        assert_eq!(v, f64::INFINITY);
        assert_eq!(grad, vec![0.]);
    }

    #[test]
    fn test_display() {
        let mut gp = matern_gp(1, 1.);
        gp.compute(&array![[0.], [1.]], &array![[1.], [2.]], &Array1::zeros(2))
            .unwrap();
        let s = gp.to_string();
        assert!(s.starts_with("GP(kernel="));
        assert!(s.contains("samples=2"));
    }
}
