use thiserror::Error;

/// A result type for incremental GP regression
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using [`IncrementalGp`](crate::IncrementalGp) or its [`SampleSet`](crate::SampleSet)
#[derive(Error, Debug)]
pub enum GpError {
    /// When input points and target values do not have the same length
    #[error("Shape mismatch: {inputs} input points for {targets} target values")]
    ShapeMismatch {
        /// Number of input points
        inputs: usize,
        /// Number of target values
        targets: usize,
    },
    /// When points do not have the expected number of components
    #[error("Dimension mismatch: expected {expected} components, got {actual}")]
    DimensionMismatch {
        /// Expected number of components
        expected: usize,
        /// Actual number of components
        actual: usize,
    },
    /// When an observation is accessed with an invalid index
    #[error("Index {index} out of range for a sample set of size {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of observations
        len: usize,
    },
    /// When a non-positive diagonal entry shows up during Cholesky factorization
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
    /// When read-only predictions are requested while caches still have to be refreshed
    #[error("Stale model: call refresh() before sharing predictions")]
    StaleModel,
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When sample storage cannot be extended
    #[error(transparent)]
    ShapeError(#[from] ndarray::ShapeError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
