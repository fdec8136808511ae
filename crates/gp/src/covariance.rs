//! A module for covariance functions (kernels) used by the incremental GP engine
//! to model the similarity between two points of the 3D input space.
//!
//! The following covariance functions are implemented:
//! * Laplace (exponential),
//! * thin plate,
//! * squared exponential.
//!
//! Every kernel carries a *changed* flag raised on construction and whenever one of
//! its hyperparameters is mutated. The engine consults this flag to know whether its
//! Cholesky factor has to be rebuilt from scratch.

use crate::errors::{GpError, Result};
use crate::utils::distance;
use linfa::Float;
use ndarray::{array, Array1, ArrayView1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trait for using a covariance function in GP regression
///
/// Implementations are expected to be symmetric, `value(a, b) == value(b, a)`,
/// and to return a non-negative variance `value(p, p) >= 0`.
pub trait CovarianceFunction<F: Float>: fmt::Display + Send + Sync {
    /// Covariance `k(a, b)` between points `a` and `b`
    fn value(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> F;

    /// Gradient of `k(a, b)` wrt the components of `a`
    fn gradient(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> Array1<F>;

    /// Current hyperparameters values
    fn hyperparameters(&self) -> Array1<F>;

    /// Replace all hyperparameters at once, values are given in [`hyperparameters()`](Self::hyperparameters) order.
    /// Raises the changed flag on success.
    fn set_hyperparameters(&mut self, hyper: &[F]) -> Result<()>;

    /// Whether hyperparameters changed since the flag was last cleared
    fn hyperparameters_changed(&self) -> bool;

    /// Acknowledge hyperparameters change
    fn clear_changed_flag(&mut self);
}

impl<F: Float, K: CovarianceFunction<F> + ?Sized> CovarianceFunction<F> for Box<K> {
    fn value(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> F {
        (**self).value(a, b)
    }

    fn gradient(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> Array1<F> {
        (**self).gradient(a, b)
    }

    fn hyperparameters(&self) -> Array1<F> {
        (**self).hyperparameters()
    }

    fn set_hyperparameters(&mut self, hyper: &[F]) -> Result<()> {
        (**self).set_hyperparameters(hyper)
    }

    fn hyperparameters_changed(&self) -> bool {
        (**self).hyperparameters_changed()
    }

    fn clear_changed_flag(&mut self) {
        (**self).clear_changed_flag()
    }
}

#[cfg(feature = "serializable")]
fn raised() -> bool {
    true
}

fn check_positive<F: Float>(name: &str, value: F) -> Result<F> {
    if value > F::zero() && value.is_finite() {
        Ok(value)
    } else {
        Err(GpError::InvalidValueError(format!(
            "`{name}` should be positive and finite, got {value}"
        )))
    }
}

fn check_len<F: Float>(kernel: &str, hyper: &[F], expected: usize) -> Result<()> {
    if hyper.len() != expected {
        return Err(GpError::InvalidValueError(format!(
            "{kernel} kernel expects {expected} hyperparameters, got {}",
            hyper.len()
        )));
    }
    Ok(())
}

/// Laplace covariance function
///
/// `k(a, b) = sigma2 * exp(-|a - b| / length_scale)`
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LaplaceCov<F: Float> {
    length_scale: F,
    sigma2: F,
    #[cfg_attr(feature = "serializable", serde(skip, default = "raised"))]
    changed: bool,
}

impl<F: Float> Default for LaplaceCov<F> {
    fn default() -> Self {
        LaplaceCov {
            length_scale: F::one(),
            sigma2: F::one(),
            changed: true,
        }
    }
}

impl<F: Float> LaplaceCov<F> {
    /// Constructor given the length scale and the signal variance
    pub fn new(length_scale: F, sigma2: F) -> Result<Self> {
        Ok(LaplaceCov {
            length_scale: check_positive("length_scale", length_scale)?,
            sigma2: check_positive("sigma2", sigma2)?,
            changed: true,
        })
    }

    /// Length scale
    pub fn length_scale(&self) -> F {
        self.length_scale
    }

    /// Signal variance
    pub fn sigma2(&self) -> F {
        self.sigma2
    }

    /// Set length scale
    pub fn set_length_scale(&mut self, length_scale: F) -> Result<()> {
        self.length_scale = check_positive("length_scale", length_scale)?;
        self.changed = true;
        Ok(())
    }

    /// Set signal variance
    pub fn set_sigma2(&mut self, sigma2: F) -> Result<()> {
        self.sigma2 = check_positive("sigma2", sigma2)?;
        self.changed = true;
        Ok(())
    }
}

impl<F: Float> CovarianceFunction<F> for LaplaceCov<F> {
    fn value(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> F {
        let r = distance(&a, &b);
        self.sigma2 * F::exp(-r / self.length_scale)
    }

    /// Not differentiable at `a == b`, zero is returned there.
    fn gradient(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> Array1<F> {
        let d = &a - &b;
        let r = d.dot(&d).sqrt();
        if r == F::zero() {
            return Array1::zeros(a.len());
        }
        let k = self.sigma2 * F::exp(-r / self.length_scale);
        d.mapv(|v| -k * v / (r * self.length_scale))
    }

    fn hyperparameters(&self) -> Array1<F> {
        array![self.length_scale, self.sigma2]
    }

    fn set_hyperparameters(&mut self, hyper: &[F]) -> Result<()> {
        check_len("Laplace", hyper, 2)?;
        let length_scale = check_positive("length_scale", hyper[0])?;
        let sigma2 = check_positive("sigma2", hyper[1])?;
        self.length_scale = length_scale;
        self.sigma2 = sigma2;
        self.changed = true;
        Ok(())
    }

    fn hyperparameters_changed(&self) -> bool {
        self.changed
    }

    fn clear_changed_flag(&mut self) {
        self.changed = false;
    }
}

impl<F: Float> fmt::Display for LaplaceCov<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Laplace(length_scale={}, sigma2={})",
            self.length_scale, self.sigma2
        )
    }
}

/// Thin plate covariance function
///
/// `k(a, b) = 2 |a - b|^3 - 3 R |a - b|^2 + R^3`
///
/// where `R` is the radius, expected to be larger than the distance between any two
/// points of interest for the kernel matrix to stay positive definite.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ThinPlateCov<F: Float> {
    radius: F,
    #[cfg_attr(feature = "serializable", serde(skip, default = "raised"))]
    changed: bool,
}

impl<F: Float> Default for ThinPlateCov<F> {
    fn default() -> Self {
        ThinPlateCov {
            radius: F::one(),
            changed: true,
        }
    }
}

impl<F: Float> ThinPlateCov<F> {
    /// Constructor given the radius
    pub fn new(radius: F) -> Result<Self> {
        Ok(ThinPlateCov {
            radius: check_positive("radius", radius)?,
            changed: true,
        })
    }

    /// Radius
    pub fn radius(&self) -> F {
        self.radius
    }

    /// Set radius
    pub fn set_radius(&mut self, radius: F) -> Result<()> {
        self.radius = check_positive("radius", radius)?;
        self.changed = true;
        Ok(())
    }
}

impl<F: Float> CovarianceFunction<F> for ThinPlateCov<F> {
    fn value(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> F {
        let r = distance(&a, &b);
        let big_r = self.radius;
        F::cast(2.) * r * r * r - F::cast(3.) * big_r * r * r + big_r * big_r * big_r
    }

    ///   dk/da = (6 r - 6 R) (a - b)
    fn gradient(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> Array1<F> {
        let d = &a - &b;
        let r = d.dot(&d).sqrt();
        let factor = F::cast(6.) * (r - self.radius);
        d.mapv(|v| factor * v)
    }

    fn hyperparameters(&self) -> Array1<F> {
        array![self.radius]
    }

    fn set_hyperparameters(&mut self, hyper: &[F]) -> Result<()> {
        check_len("ThinPlate", hyper, 1)?;
        self.set_radius(hyper[0])
    }

    fn hyperparameters_changed(&self) -> bool {
        self.changed
    }

    fn clear_changed_flag(&mut self) {
        self.changed = false;
    }
}

impl<F: Float> fmt::Display for ThinPlateCov<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ThinPlate(radius={})", self.radius)
    }
}

/// Squared exponential covariance function
///
/// `k(a, b) = sigma2 * exp(-|a - b|^2 / (2 * length_scale^2))`
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct SquaredExponentialCov<F: Float> {
    length_scale: F,
    sigma2: F,
    #[cfg_attr(feature = "serializable", serde(skip, default = "raised"))]
    changed: bool,
}

impl<F: Float> Default for SquaredExponentialCov<F> {
    fn default() -> Self {
        SquaredExponentialCov {
            length_scale: F::one(),
            sigma2: F::one(),
            changed: true,
        }
    }
}

impl<F: Float> SquaredExponentialCov<F> {
    /// Constructor given the length scale and the signal variance
    pub fn new(length_scale: F, sigma2: F) -> Result<Self> {
        Ok(SquaredExponentialCov {
            length_scale: check_positive("length_scale", length_scale)?,
            sigma2: check_positive("sigma2", sigma2)?,
            changed: true,
        })
    }

    /// Length scale
    pub fn length_scale(&self) -> F {
        self.length_scale
    }

    /// Signal variance
    pub fn sigma2(&self) -> F {
        self.sigma2
    }

    /// Set length scale
    pub fn set_length_scale(&mut self, length_scale: F) -> Result<()> {
        self.length_scale = check_positive("length_scale", length_scale)?;
        self.changed = true;
        Ok(())
    }

    /// Set signal variance
    pub fn set_sigma2(&mut self, sigma2: F) -> Result<()> {
        self.sigma2 = check_positive("sigma2", sigma2)?;
        self.changed = true;
        Ok(())
    }
}

impl<F: Float> CovarianceFunction<F> for SquaredExponentialCov<F> {
    fn value(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> F {
        let d = &a - &b;
        let l2 = self.length_scale * self.length_scale;
        self.sigma2 * F::exp(F::cast(-0.5) * d.dot(&d) / l2)
    }

    fn gradient(&self, a: ArrayView1<F>, b: ArrayView1<F>) -> Array1<F> {
        let k = self.value(a.view(), b.view());
        let l2 = self.length_scale * self.length_scale;
        (&a - &b).mapv(|v| -k * v / l2)
    }

    fn hyperparameters(&self) -> Array1<F> {
        array![self.length_scale, self.sigma2]
    }

    fn set_hyperparameters(&mut self, hyper: &[F]) -> Result<()> {
        check_len("SquaredExponential", hyper, 2)?;
        let length_scale = check_positive("length_scale", hyper[0])?;
        let sigma2 = check_positive("sigma2", hyper[1])?;
        self.length_scale = length_scale;
        self.sigma2 = sigma2;
        self.changed = true;
        Ok(())
    }

    fn hyperparameters_changed(&self) -> bool {
        self.changed
    }

    fn clear_changed_flag(&mut self) {
        self.changed = false;
    }
}

impl<F: Float> fmt::Display for SquaredExponentialCov<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SquaredExponential(length_scale={}, sigma2={})",
            self.length_scale, self.sigma2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::Array2;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    fn random_points(n: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        Array2::random_using((n, 3), Uniform::new(-0.5, 0.5), &mut rng)
    }

    macro_rules! test_covariance {
        ($name:ident, $kernel:expr) => {
            paste! {
                #[test]
                fn [<test_ $name _symmetric_and_nonnegative>]() {
                    let kernel = $kernel;
                    let x = random_points(20, 42);
                    for a in x.rows() {
                        assert!(kernel.value(a, a) >= 0.);
                        for b in x.rows() {
                            assert_abs_diff_eq!(kernel.value(a, b), kernel.value(b, a), epsilon = 1e-12);
                        }
                    }
                }

                #[test]
                fn [<test_ $name _gradient>]() {
                    let kernel = $kernel;
                    let x = random_points(10, 7);
                    let b = x.row(0);
                    for a in x.rows().into_iter().skip(1) {
                        let grad = kernel.gradient(a, b);
                        let f = |a: &Array1<f64>| -> f64 { kernel.value(a.view(), b) };
                        let grad_central = a.to_owned().central_diff(&f);
                        assert_abs_diff_eq!(grad, grad_central, epsilon = 1e-6);
                    }
                }
            }
        };
    }

    test_covariance!(laplace, LaplaceCov::new(0.8, 1.5).unwrap());
    test_covariance!(thin_plate, ThinPlateCov::new(2.).unwrap());
    test_covariance!(squared_exponential, SquaredExponentialCov::new(0.7, 2.).unwrap());

    #[test]
    fn test_laplace_value() {
        let kernel = LaplaceCov::new(2., 3.).unwrap();
        let a = array![0., 0., 0.];
        let b = array![0., 3., 4.];
        assert_abs_diff_eq!(3. * (-2.5f64).exp(), kernel.value(a.view(), b.view()));
        assert_abs_diff_eq!(3., kernel.value(a.view(), a.view()));
        assert_eq!(array![0., 0., 0.], kernel.gradient(a.view(), a.view()));
    }

    #[test]
    fn test_thin_plate_value() {
        let kernel = ThinPlateCov::new(2.).unwrap();
        let a = array![0., 0., 0.];
        let b = array![1., 0., 0.];
        // 2 - 3 * 2 + 8
        assert_abs_diff_eq!(4., kernel.value(a.view(), b.view()));
        assert_abs_diff_eq!(8., kernel.value(a.view(), a.view()));
    }

    #[test]
    fn test_changed_flag() {
        let mut kernel = LaplaceCov::<f64>::default();
        assert!(kernel.hyperparameters_changed());
        kernel.clear_changed_flag();
        assert!(!kernel.hyperparameters_changed());
        kernel.set_length_scale(0.5).unwrap();
        assert!(kernel.hyperparameters_changed());
        kernel.clear_changed_flag();
        kernel.set_hyperparameters(&[0.3, 2.]).unwrap();
        assert!(kernel.hyperparameters_changed());
        assert_eq!(array![0.3, 2.], kernel.hyperparameters());
    }

    #[test]
    fn test_invalid_hyperparameters() {
        assert!(LaplaceCov::new(0., 1.).is_err());
        assert!(SquaredExponentialCov::new(1., f64::NAN).is_err());
        assert!(ThinPlateCov::new(-1.).is_err());

        let mut kernel = SquaredExponentialCov::<f64>::default();
        kernel.clear_changed_flag();
        assert!(kernel.set_hyperparameters(&[1.]).is_err());
        assert!(kernel.set_hyperparameters(&[1., -2.]).is_err());
        // rejected values leave the kernel untouched
        assert!(!kernel.hyperparameters_changed());
        assert_eq!(array![1., 1.], kernel.hyperparameters());
    }

    #[test]
    fn test_boxed_kernel() {
        let mut kernel: Box<dyn CovarianceFunction<f64>> = Box::new(ThinPlateCov::new(2.).unwrap());
        kernel.clear_changed_flag();
        assert!(!kernel.hyperparameters_changed());
        kernel.set_hyperparameters(&[3.]).unwrap();
        assert!(kernel.hyperparameters_changed());
        assert_eq!("ThinPlate(radius=3)", kernel.to_string());
        let p = array![0.1, 0.2, 0.3];
        assert_abs_diff_eq!(27., kernel.value(p.view(), p.view()));
    }
}
