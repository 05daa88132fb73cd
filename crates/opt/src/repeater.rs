use crate::random::RandomSource;
use crate::types::{ObjFn, Optimizer};
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// Default number of restarts
pub const DEFAULT_RESTARTS: usize = 10;
/// Default half-width of the perturbation applied to the starting point
pub const DEFAULT_EPSILON: f64 = 1e-2;

/// Run an inner optimizer several times in parallel and keep the best result.
///
/// Each restart starts from the given point perturbed by `uniform(-epsilon, epsilon)` on
/// every component and owns its own copy of the user data. Restart points are drawn
/// sequentially from the shared random source before the parallel runs, so a seeded
/// source gives reproducible results. The restart with the lowest objective value wins,
/// ties going to the first restart.
///
/// Callers owning their own start points (e.g. a current solution plus independent random
/// draws) use [`ParallelRepeater::minimize_from`] instead.
#[derive(Clone, Debug)]
pub struct ParallelRepeater<O: Optimizer> {
    inner: O,
    restarts: usize,
    epsilon: f64,
    rng: Arc<RandomSource>,
}

impl<O: Optimizer> ParallelRepeater<O> {
    /// Repeat `inner` optimizer drawing restart points from `rng`
    pub fn new(inner: O, rng: Arc<RandomSource>) -> Self {
        ParallelRepeater {
            inner,
            restarts: DEFAULT_RESTARTS,
            epsilon: DEFAULT_EPSILON,
            rng,
        }
    }

    /// Set the number of restarts (at least one run is always done)
    pub fn restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    /// Set the half-width of the starting point perturbation
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// The repeated optimizer
    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// The number of restarts
    pub fn n_restarts(&self) -> usize {
        self.restarts
    }

    /// The shared random source
    pub fn rng(&self) -> &Arc<RandomSource> {
        &self.rng
    }
}

/// Index of the lowest value, first one on ties, `None` when no value is a number
fn argmin_first(values: ArrayView1<f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

impl<Opt: Optimizer> ParallelRepeater<Opt> {
    /// Run the inner optimizer once from each row of `starts`, in parallel, and keep the
    /// lowest result (first one on ties).
    ///
    /// When no run gives a number, `f64::INFINITY` is returned with the first start point.
    pub fn minimize_from<U, O>(
        &self,
        fun: &O,
        starts: &Array2<f64>,
        user_data: U,
    ) -> (f64, Array1<f64>)
    where
        U: Clone + Send,
        O: ObjFn<U> + Sync,
    {
        if starts.nrows() == 0 {
            return (f64::INFINITY, Array1::zeros(starts.ncols()));
        }
        let runs: Vec<(Vec<f64>, U)> = starts
            .rows()
            .into_iter()
            .map(|start| (start.to_vec(), user_data.clone()))
            .collect();

        let now = Instant::now();
        let results: Vec<(f64, Array1<f64>)> = runs
            .into_par_iter()
            .map(|(start, u)| self.inner.minimize(fun, &start, u))
            .collect();
        debug!(
            "{} restarts done in {:?} ms",
            results.len(),
            now.elapsed().as_millis()
        );

        let values: Array1<f64> = results.iter().map(|(f, _)| *f).collect();
        match argmin_first(values.view()) {
            Some(i) => results[i].clone(),
            None => (f64::INFINITY, starts.row(0).to_owned()),
        }
    }
}

impl<Opt: Optimizer> Optimizer for ParallelRepeater<Opt> {
    fn minimize<U, O>(&self, fun: &O, x0: &[f64], user_data: U) -> (f64, Array1<f64>)
    where
        U: Clone + Send,
        O: ObjFn<U> + Sync,
    {
        let x0 = ArrayView1::from(x0);
        let mut starts = Array2::zeros((self.restarts.max(1), x0.len()));
        for mut start in starts.axis_iter_mut(Axis(0)) {
            let deviation = self
                .rng
                .uniform_vector(x0.len(), -self.epsilon, self.epsilon);
            start.assign(&(&deviation + &x0));
        }
        self.minimize_from(fun, &starts, user_data)
    }
}
