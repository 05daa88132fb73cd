use crate::stop::{GradientNorm, IterState, MaxIterations, StopCriterion};
use crate::types::{sign, ObjFn, Optimizer};
use log::debug;
use ndarray::Array1;
use std::sync::Arc;

/// Default number of Rprop iterations
pub const RPROP_ITERATIONS: usize = 300;

/// Gradient-based Resilient backpropagation (iRprop-) optimizer.
///
/// Only the sign of each gradient component is used: per-component step sizes grow by
/// `eta_plus` while the sign is stable and shrink by `eta_minus` when it flips. The best
/// evaluated point is returned, which makes the algorithm robust to objective values
/// blowing up to infinity.
///
/// Reference: Igel & Hüsken, *Improving the Rprop learning algorithm*, 2000.
#[derive(Clone, Debug)]
pub struct Rprop {
    iterations: usize,
    delta0: f64,
    delta_min: f64,
    delta_max: f64,
    eta_minus: f64,
    eta_plus: f64,
    criteria: Vec<Arc<dyn StopCriterion>>,
}

impl Default for Rprop {
    fn default() -> Self {
        Rprop {
            iterations: RPROP_ITERATIONS,
            delta0: 0.1,
            delta_min: 1e-6,
            delta_max: 50.,
            eta_minus: 0.5,
            eta_plus: 1.2,
            criteria: vec![],
        }
    }
}

impl Rprop {
    /// Rprop optimizer with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of iterations
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Stop as soon as the gradient norm is lower than `eps`
    pub fn eps_stop(self, eps: f64) -> Self {
        self.stop_criterion(GradientNorm(eps))
    }

    /// Add a stop criterion, the optimization stops when any criterion is met
    pub fn stop_criterion(mut self, criterion: impl StopCriterion + 'static) -> Self {
        self.criteria.push(Arc::new(criterion));
        self
    }

    /// Set initial step size
    pub fn delta0(mut self, delta0: f64) -> Self {
        self.delta0 = delta0;
        self
    }

    /// Set step size bounds
    pub fn delta_bounds(mut self, delta_min: f64, delta_max: f64) -> Self {
        self.delta_min = delta_min;
        self.delta_max = delta_max;
        self
    }

    /// Set step size decrease and increase factors
    pub fn etas(mut self, eta_minus: f64, eta_plus: f64) -> Self {
        self.eta_minus = eta_minus;
        self.eta_plus = eta_plus;
        self
    }

    fn should_stop(&self, state: &IterState) -> bool {
        MaxIterations(self.iterations).should_stop(state)
            || self.criteria.iter().any(|s| s.should_stop(state))
    }
}

impl Optimizer for Rprop {
    fn minimize<U, O>(&self, fun: &O, x0: &[f64], user_data: U) -> (f64, Array1<f64>)
    where
        U: Clone + Send,
        O: ObjFn<U> + Sync,
    {
        let mut user_data = user_data;
        let n = x0.len();
        let mut params = x0.to_vec();
        let mut best_params = params.clone();
        let mut best = f64::INFINITY;
        let mut delta = vec![self.delta0; n];
        let mut grad_old = vec![0.; n];

        let mut state = IterState {
            iteration: 0,
            fval: f64::INFINITY,
            grad_norm: f64::INFINITY,
        };
        while !self.should_stop(&state) {
            let mut grad = vec![0.; n];
            let fval = fun(&params, Some(&mut grad[..]), &mut user_data);
            if fval < best {
                best = fval;
                best_params.copy_from_slice(&params);
            }

            for j in 0..n {
                let s = grad_old[j] * grad[j];
                if s > 0. {
                    delta[j] = (delta[j] * self.eta_plus).min(self.delta_max);
                } else if s < 0. {
                    delta[j] = (delta[j] * self.eta_minus).max(self.delta_min);
                    grad[j] = 0.;
                }
                params[j] -= sign(grad[j]) * delta[j];
            }

            state.iteration += 1;
            state.fval = fval;
            state.grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            grad_old = grad;
        }
        debug!("Rprop: {} iterations, best value = {}", state.iteration, best);
        (best, Array1::from(best_params))
    }
}
