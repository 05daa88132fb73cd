use ndarray::Array1;

/// An interface for objective function to be minimized.
///
/// Given a point `x`, it returns the objective value and, when `gradient` is `Some`,
/// fills it with the gradient at `x`. `user_data` is mutable state owned by the current
/// optimization run.
pub trait ObjFn<U>: Fn(&[f64], Option<&mut [f64]>, &mut U) -> f64 {}
impl<T, U> ObjFn<U> for T where T: Fn(&[f64], Option<&mut [f64]>, &mut U) -> f64 {}

/// A trait for numeric optimizers minimizing an [`ObjFn`]
pub trait Optimizer: Send + Sync {
    /// Minimize `fun` starting from `x0`.
    ///
    /// Returns the best objective value found and the corresponding point. A run which fails
    /// or never evaluates a finite value returns `f64::INFINITY`, it is not an error.
    fn minimize<U, O>(&self, fun: &O, x0: &[f64], user_data: U) -> (f64, Array1<f64>)
    where
        U: Clone + Send,
        O: ObjFn<U> + Sync;
}

/// Sign of `v` where zero (and NaN) map to zero
pub(crate) fn sign(v: f64) -> f64 {
    if v > 0. {
        1.
    } else if v < 0. {
        -1.
    } else {
        0.
    }
}
