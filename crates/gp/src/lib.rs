//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//! over 3D points where observations arrive over time, as used to reconstruct implicit surfaces
//! from point clouds: the surface is the zero level set of the predicted mean while
//! the predicted variance tells where the reconstruction is uncertain.
//!
//! The Cholesky factor of the kernel matrix is extended by one row per new observation
//! in O(n^2) instead of being recomputed in O(n^3), a full factorization only being
//! required when the covariance function hyperparameters change.
//!
//! GP regression is implemented by [IncrementalGp] parameterized by [GpParams]
//! and a covariance function from the [covariance] module.
//!
//! # Example
//!
//! ```no_run
//! use gpsurf_gp::{covariance::ThinPlateCov, IncrementalGp};
//! use ndarray::array;
//!
//! let mut gp = IncrementalGp::params(ThinPlateCov::new(2.).expect("valid radius"))
//!     .noise(1e-4)
//!     .build()
//!     .expect("GP engine");
//! gp.add_observations(&array![[1., 0., 0.], [0., 0., 0.]], &array![0., -1.])
//!     .expect("observations absorbed");
//!
//! // predictions shared between threads
//! gp.refresh().expect("up to date model");
//! let predictor = gp.predictor().expect("predictor");
//! let means = predictor.predict(&array![[0.5, 0., 0.], [0., 0.5, 0.]]).expect("means");
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod covariance;
mod errors;
mod factor;
mod parameters;
mod sample_set;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use parameters::*;
pub use sample_set::*;

/// Number of components of input points
pub const INPUT_DIM: usize = 3;

/// Env variable to set the log level of binaries and benches
pub const GPSURF_LOG: &str = "GPSURF_LOG";
