//! Cholesky factorization of the GP covariance matrix.
//!
//! `K = kernel(X, X) + diag(noise)` is factorized as `L Lᵗ` either from scratch or, when a
//! single sample is appended, by extending the previous factor with one row in O(n²).
//!
//! Non positive definite matrices are handled by a deterministic jitter policy: when the
//! plain factorization fails, `JITTER_INIT * mean(diag(K))` is added to the diagonal and
//! multiplied by `JITTER_FACTOR` after each failure, up to `JITTER_MAX_TRIES` attempts,
//! after which [`GpError::NotPositiveDefinite`] is returned. The jitter finally used is kept
//! and applied to the diagonal entries added by incremental updates, so that `L Lᵗ` always
//! matches `K + jitter I`. An incremental update giving a non positive diagonal entry is
//! reported as [`GpError::NotPositiveDefinite`] and the caller falls back to a full
//! factorization.

use crate::errors::{GpError, Result};
use crate::kernels::Kernel;
use crate::training_data::TrainingData;
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use log::debug;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1};

/// Initial jitter relative to the mean of the covariance diagonal
pub const JITTER_INIT: f64 = 1e-10;
/// Jitter growth factor between two factorization attempts
pub const JITTER_FACTOR: f64 = 10.;
/// Maximum number of jittered factorization attempts
pub const JITTER_MAX_TRIES: usize = 6;

#[derive(Clone, Debug)]
pub(crate) struct CholeskyFactor<F: Float> {
    /// Lower triangular factor (n, n)
    l: Array2<F>,
    /// `K⁻¹ (Y - mean(X))`, (n, ny)
    alpha: Array2<F>,
    /// Value added to the diagonal of K
    jitter: F,
}

impl<F: Float> CholeskyFactor<F> {
    pub fn new(output_dim: usize) -> Self {
        CholeskyFactor {
            l: Array2::zeros((0, 0)),
            alpha: Array2::zeros((0, output_dim)),
            jitter: F::zero(),
        }
    }

    pub fn l(&self) -> ArrayView2<F> {
        self.l.view()
    }

    pub fn alpha(&self) -> ArrayView2<F> {
        self.alpha.view()
    }

    pub fn jitter(&self) -> F {
        self.jitter
    }

    pub fn size(&self) -> usize {
        self.l.nrows()
    }

    /// Factorize the covariance matrix of `data` from scratch
    pub fn factorize<K: Kernel<F>>(&mut self, kernel: &K, data: &TrainingData<F>) -> Result<()> {
        let mut k = kernel.gram(&data.samples());
        k.diag_mut()
            .zip_mut_with(&data.noise(), |kii, &noise| *kii += noise);
        let (l, jitter) = cholesky_with_jitter(k)?;
        self.l = l;
        self.jitter = jitter;
        Ok(())
    }

    /// Extend the factorization with the last sample of `data`, the previous factor has to
    /// match the other samples
    pub fn extend<K: Kernel<F>>(&mut self, kernel: &K, data: &TrainingData<F>) -> Result<()> {
        let n = data.nb_samples();
        if n == 0 || self.size() + 1 != n {
            return Err(GpError::InvalidValueError(format!(
                "cannot extend a factorization of size {} to {} samples",
                self.size(),
                n
            )));
        }
        let samples = data.samples();
        let x_new = samples.row(n - 1);
        let k_nn = kernel.value(&x_new, &x_new) + data.noise()[n - 1] + self.jitter;

        let row = if n > 1 {
            let k_col = kernel.cross_covariance(&x_new, &samples.slice(s![..n - 1, ..]));
            self.l
                .solve_triangular(&k_col.insert_axis(Axis(1)), UPLO::Lower)?
                .remove_axis(Axis(1))
        } else {
            Array1::zeros(0)
        };
        let d2 = k_nn - row.dot(&row);
        if !(d2 > F::zero()) || !d2.is_finite() {
            return Err(GpError::NotPositiveDefinite(format!(
                "incremental update gives diagonal value {d2}"
            )));
        }

        let mut l = Array2::zeros((n, n));
        l.slice_mut(s![..n - 1, ..n - 1]).assign(&self.l);
        l.slice_mut(s![n - 1, ..n - 1]).assign(&row);
        l[[n - 1, n - 1]] = d2.sqrt();
        self.l = l;
        Ok(())
    }

    /// Compute and cache `alpha = K⁻¹ residuals`
    pub fn update_alpha(&mut self, residuals: &Array2<F>) -> Result<()> {
        self.alpha = self.solve(residuals)?;
        Ok(())
    }

    /// Solve `K x = b`
    pub fn solve(&self, b: &Array2<F>) -> Result<Array2<F>> {
        if self.size() == 0 {
            return Ok(Array2::zeros(b.raw_dim()));
        }
        let y = self.l.solve_triangular(b, UPLO::Lower)?;
        Ok(self.l.t().solve_triangular(&y, UPLO::Upper)?)
    }

    /// Solve `L z = k`
    pub fn solve_lower(&self, k: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        if self.size() == 0 {
            return Ok(Array1::zeros(0));
        }
        let z = self
            .l
            .solve_triangular(&k.to_owned().insert_axis(Axis(1)), UPLO::Lower)?;
        Ok(z.remove_axis(Axis(1)))
    }

    /// `K⁻¹`
    pub fn inverse(&self) -> Result<Array2<F>> {
        self.solve(&Array2::eye(self.size()))
    }

    /// `log(det(K)) / 2 = sum(log(L_ii))`
    pub fn half_log_det(&self) -> F {
        self.l.diag().mapv(|v| v.ln()).sum()
    }
}

/// Cholesky factor of `k` with the smallest jitter of the retry sequence making it succeed
fn cholesky_with_jitter<F: Float>(k: Array2<F>) -> Result<(Array2<F>, F)> {
    let n = k.nrows();
    if n == 0 {
        return Ok((k, F::zero()));
    }
    if let Some(l) = try_cholesky(&k) {
        return Ok((l, F::zero()));
    }

    let scale = k.diag().mapv(|v| v.abs()).sum() / F::cast(n);
    let scale = if scale > F::zero() { scale } else { F::one() };
    let mut jitter = scale * F::cast(JITTER_INIT);
    for attempt in 0..JITTER_MAX_TRIES {
        let mut kj = k.clone();
        kj.diag_mut().mapv_inplace(|v| v + jitter);
        if let Some(l) = try_cholesky(&kj) {
            debug!("Cholesky succeeded with jitter {jitter} (attempt {})", attempt + 1);
            return Ok((l, jitter));
        }
        jitter *= F::cast(JITTER_FACTOR);
    }
    Err(GpError::NotPositiveDefinite(format!(
        "covariance matrix of size {n} still not positive definite with jitter {}",
        jitter / F::cast(JITTER_FACTOR)
    )))
}

fn try_cholesky<F: Float>(k: &Array2<F>) -> Option<Array2<F>> {
    let mut l = k.cholesky().ok()?;
    let n = l.nrows();
    // only the lower triangle is meaningful
    for i in 0..n {
        for j in i + 1..n {
            l[[i, j]] = F::zero();
        }
    }
    if l.diag().iter().all(|v| v.is_finite() && *v > F::zero()) {
        Some(l)
    } else {
        None
    }
}
