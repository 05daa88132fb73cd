use linfa::Float;
use ndarray::{ArrayBase, Data, Ix1, Zip};

/// Squared euclidean distance between `x1` and `x2`
pub(crate) fn squared_distance<F: Float>(
    x1: &ArrayBase<impl Data<Elem = F>, Ix1>,
    x2: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> F {
    Zip::from(x1)
        .and(x2)
        .fold(F::zero(), |acc, &a, &b| acc + (a - b) * (a - b))
}

/// Lossy conversion used at the optimizer boundary which works on `f64`
pub(crate) fn to_f64<F: Float>(v: F) -> f64 {
    num_traits::ToPrimitive::to_f64(&v).unwrap_or(f64::NAN)
}
