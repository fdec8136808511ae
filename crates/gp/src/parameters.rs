use crate::covariance::CovarianceFunction;
use crate::errors::{GpError, Result};
use crate::IncrementalGp;
use linfa::{Float, ParamGuard};

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Default number of rows of the factor storage allocated up front
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct GpValidParams<F: Float, K: CovarianceFunction<F>> {
    /// Noise variance added to the diagonal of the kernel matrix
    pub(crate) noise: F,
    /// Number of rows of the factor storage allocated up front
    pub(crate) initial_capacity: usize,
    /// Covariance function k(x, x')
    pub(crate) kernel: K,
}

impl<F: Float, K: CovarianceFunction<F> + Default> Default for GpValidParams<F, K> {
    fn default() -> GpValidParams<F, K> {
        GpValidParams {
            noise: F::zero(),
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            kernel: K::default(),
        }
    }
}

impl<F: Float, K: CovarianceFunction<F>> GpValidParams<F, K> {
    /// Get noise variance
    pub fn noise(&self) -> F {
        self.noise
    }

    /// Get initial capacity of the factor storage
    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// Get covariance function k(x, x')
    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<F: Float, K: CovarianceFunction<F> + Clone> GpValidParams<F, K> {
    /// Create an empty GP engine
    pub fn build(&self) -> IncrementalGp<F, K> {
        IncrementalGp::new(self.clone())
    }
}

#[derive(Clone, Debug)]
/// The set of parameters that can be specified for the creation of
/// an [incremental GP engine](crate::IncrementalGp).
pub struct GpParams<F: Float, K: CovarianceFunction<F>>(GpValidParams<F, K>);

impl<F: Float, K: CovarianceFunction<F>> GpParams<F, K> {
    /// A constructor for GP parameters given the covariance function
    pub fn new(kernel: K) -> GpParams<F, K> {
        Self(GpValidParams {
            noise: F::zero(),
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            kernel,
        })
    }

    /// A constructor for GP parameters from validated parameters
    pub fn new_from_valid(params: &GpValidParams<F, K>) -> Self
    where
        K: Clone,
    {
        Self(params.clone())
    }

    /// Set noise variance.
    ///
    /// Noise is added to the diagonal of the kernel matrix, it should be non negative.
    pub fn noise(mut self, noise: F) -> Self {
        self.0.noise = noise;
        self
    }

    /// Set the number of rows allocated up front for the Cholesky factor.
    /// Should be strictly positive.
    pub fn initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.0.initial_capacity = initial_capacity;
        self
    }

    /// Set covariance function.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Check parameters and create an empty GP engine
    pub fn build(self) -> Result<IncrementalGp<F, K>> {
        Ok(IncrementalGp::new(self.check()?))
    }
}

impl<F: Float, K: CovarianceFunction<F>> From<GpValidParams<F, K>> for GpParams<F, K> {
    fn from(valid: GpValidParams<F, K>) -> Self {
        GpParams(valid)
    }
}

impl<F: Float, K: CovarianceFunction<F>> ParamGuard for GpParams<F, K> {
    type Checked = GpValidParams<F, K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !self.0.noise.is_finite() || self.0.noise < F::zero() {
            return Err(GpError::InvalidValueError(format!(
                "`noise` should be finite and non negative, got {}",
                self.0.noise
            )));
        }
        if self.0.initial_capacity == 0 {
            return Err(GpError::InvalidValueError(
                "`initial_capacity` cannot be 0!".to_string(),
            ));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::{LaplaceCov, ThinPlateCov};

    #[test]
    fn test_default_params() {
        let params = GpValidParams::<f64, LaplaceCov<f64>>::default();
        assert_eq!(0., params.noise());
        assert_eq!(DEFAULT_INITIAL_CAPACITY, params.initial_capacity());
        assert_eq!(&LaplaceCov::default(), params.kernel());
    }

    #[test]
    fn test_check_params() {
        let params = GpParams::<f64, _>::new(ThinPlateCov::<f64>::new(2.).unwrap())
            .noise(1e-3)
            .initial_capacity(10)
            .check()
            .expect("valid params");
        assert_eq!(1e-3, params.noise());
        assert_eq!(10, params.initial_capacity());
        assert_eq!(2., params.kernel().radius());
    }

    #[test]
    fn test_invalid_params() {
        let kernel = LaplaceCov::<f64>::default();
        assert!(GpParams::<f64, _>::new(kernel.clone()).noise(-1e-3).check().is_err());
        assert!(GpParams::<f64, _>::new(kernel.clone()).noise(f64::NAN).check().is_err());
        assert!(GpParams::<f64, _>::new(kernel.clone())
            .initial_capacity(0)
            .check()
            .is_err());
        assert!(GpParams::<f64, _>::new(kernel).initial_capacity(0).build().is_err());
    }

    #[test]
    fn test_roundtrip_valid_params() {
        let valid = GpParams::new(LaplaceCov::<f64>::default())
            .noise(0.1)
            .check()
            .unwrap();
        let params = GpParams::new_from_valid(&valid);
        assert_eq!(valid, params.check().unwrap());
        let params: GpParams<f64, LaplaceCov<f64>> = valid.clone().into();
        assert_eq!(valid, params.check().unwrap());
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_serialize_params() {
        let valid = GpParams::<f64, _>::new(LaplaceCov::new(0.5, 2.).unwrap())
            .noise(1e-4)
            .check()
            .unwrap();
        let json = serde_json::to_string(&valid).expect("serialized params");
        let loaded: GpValidParams<f64, LaplaceCov<f64>> =
            serde_json::from_str(&json).expect("deserialized params");
        assert_eq!(valid, loaded);
        assert!(loaded.kernel().hyperparameters_changed());
    }
}
