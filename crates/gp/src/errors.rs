use thiserror::Error;

/// A result type for GP regression algorithm
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using [`GaussianProcess`](crate::GaussianProcess)
#[derive(Error, Debug)]
pub enum GpError {
    /// When the covariance matrix stays non positive definite after jitter retries
    #[error("Not positive definite covariance: {0}")]
    NotPositiveDefinite(String),
    /// When sample, observation or noise dimensions do not match the model
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// When the black-box function evaluation gives an unusable observation
    #[error("Evaluation error: {0}")]
    EvaluationError(String),
    #[error(transparent)]
    /// When linear algebra computation fails
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When array shapes are inconsistent
    #[error(transparent)]
    ShapeError(#[from] ndarray::ShapeError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error dur to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
