use std::fmt;

/// State of an iterative optimizer handed to stop criteria
#[derive(Clone, Debug)]
pub struct IterState {
    /// Number of completed iterations
    pub iteration: usize,
    /// Objective value at the current point
    pub fval: f64,
    /// Euclidean norm of the last gradient
    pub grad_norm: f64,
}

/// A trait deciding when an iterative optimization has to stop
pub trait StopCriterion: fmt::Debug + Send + Sync {
    /// Returns true when the optimization has to stop given the current `state`
    fn should_stop(&self, state: &IterState) -> bool;
}

/// Stop after a given number of iterations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaxIterations(pub usize);

impl StopCriterion for MaxIterations {
    fn should_stop(&self, state: &IterState) -> bool {
        state.iteration >= self.0
    }
}

/// Stop when the gradient norm falls below a threshold
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientNorm(pub f64);

impl StopCriterion for GradientNorm {
    fn should_stop(&self, state: &IterState) -> bool {
        state.grad_norm < self.0
    }
}
