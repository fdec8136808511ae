use crate::covariance::*;
use crate::errors::{GpError, Result};
use crate::factor::CholeskyArena;
use crate::parameters::{GpParams, GpValidParams};
use crate::sample_set::SampleSet;
use crate::utils::{check_batch, check_point, cross_covariance};

use linfa::prelude::{DatasetBase, Fit, Float};
use linfa_linalg::cholesky::*;
use linfa_linalg::LinalgError;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2, Zip};

use log::{debug, warn};
use num_traits::clamp_min;
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;

/// Freshness of the cached computations of an [`IncrementalGp`].
///
/// Transitions:
/// * `Empty` --add observations--> `AlphaStale`
/// * `AlphaStale` --predict or refresh--> `Ready`
/// * any built state --add observations or set target--> `AlphaStale`
/// * any built state --kernel hyperparameters change--> `FactorStale`
/// * `FactorStale` --full recompute--> `AlphaStale`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// No observation yet, nothing to factorize
    Empty,
    /// Kernel hyperparameters changed, the Cholesky factor has to be rebuilt
    FactorStale,
    /// Cholesky factor is valid, coefficients `alpha` have to be solved again
    AlphaStale,
    /// Cholesky factor and coefficients are up to date
    Ready,
}

impl Freshness {
    fn on_kernel_changed(self) -> Self {
        match self {
            Freshness::Empty => Freshness::Empty,
            _ => Freshness::FactorStale,
        }
    }

    fn on_samples_changed(self) -> Self {
        match self {
            Freshness::Empty | Freshness::FactorStale => self,
            Freshness::AlphaStale | Freshness::Ready => Freshness::AlphaStale,
        }
    }

    fn on_alpha_solved(self) -> Self {
        match self {
            Freshness::AlphaStale => Freshness::Ready,
            _ => self,
        }
    }
}

/// Gaussian process regression over 3D points which absorbs new observations
/// incrementally.
///
/// The engine models an unknown scalar function `f` from noisy observations
/// `y_i = f(x_i) + e_i` as a zero mean Gaussian process governed by a
/// covariance function `k(x, x')`. Predictions at `x*` are given by:
///
/// * mean: `k*.alpha` where `K alpha = y`
/// * variance: `k(x*, x*) - v.v` where `L v = k*`
///
/// with `K = [k(x_i, x_j)] + noise I` the regularized kernel matrix, `L` its
/// lower Cholesky factor and `k* = [k(x*, x_i)]`.
///
/// # Implementation
///
/// * `K` is never stored: only `L` is kept, in a storage with spare capacity.
/// * Adding the `j`th observation extends `L` by one row in O(j) kernel evaluations
///   and one triangular solve, instead of refactorizing `K` in O(n^3).
/// * `alpha` is cached and solved again lazily after observations changed.
/// * Changing the covariance function hyperparameters (through [`IncrementalGp::kernel_mut`])
///   triggers a full factorization before next use.
/// * Kernel matrix and cross-covariance evaluations are spread over the
///   [rayon](https://github.com/rayon-rs/rayon) thread pool.
///
/// Mutating operations and lazy cache resolution take `&mut self`. Once
/// [`IncrementalGp::refresh`] has been called, [`IncrementalGp::predictor`] gives
/// a read-only handle which can be shared between threads.
///
/// # Example
///
/// ```no_run
/// use gpsurf_gp::LaplaceRegressor;
/// use ndarray::array;
///
/// // points on the unit sphere, the surface being the zero level set
/// let xt = array![[1., 0., 0.], [0., 1., 0.], [0., 0., 1.], [0., 0., 0.]];
/// let yt = array![0., 0., 0., -1.];
///
/// let mut gp = LaplaceRegressor::<f64>::params()
///     .noise(1e-6)
///     .build()
///     .expect("GP engine");
/// gp.add_observations(&xt, &yt).expect("observations absorbed");
///
/// let mean = gp.predict_mean(&array![0., -1., 0.]).expect("mean");
/// let var = gp.predict_var(&array![0., -1., 0.]).expect("variance");
///
/// // later on, new observations extend the factorization
/// gp.add_observations(&array![[0., -1., 0.]], &array![0.]).expect("observations absorbed");
/// ```
#[derive(Debug, Clone)]
pub struct IncrementalGp<F: Float, K: CovarianceFunction<F>> {
    /// Training observations
    samples: SampleSet<F>,
    /// Covariance function
    kernel: K,
    /// Noise variance added to the kernel matrix diagonal
    noise: F,
    /// Cholesky factor of the regularized kernel matrix
    factor: CholeskyArena<F>,
    /// Solution of K alpha = y
    alpha: Array1<F>,
    /// Freshness of factor and alpha
    state: Freshness,
}

/// Incremental GP with Laplace covariance function
pub type LaplaceRegressor<F> = GpParams<F, LaplaceCov<F>>;

impl<F: Float> LaplaceRegressor<F> {
    /// Laplace regressor parameters constructor
    pub fn params() -> GpParams<F, LaplaceCov<F>> {
        GpParams::new(LaplaceCov::default())
    }
}

/// Incremental GP with thin plate covariance function
pub type ThinPlateRegressor<F> = GpParams<F, ThinPlateCov<F>>;

impl<F: Float> ThinPlateRegressor<F> {
    /// Thin plate regressor parameters constructor
    pub fn params() -> GpParams<F, ThinPlateCov<F>> {
        GpParams::new(ThinPlateCov::default())
    }
}

impl<F: Float, K: CovarianceFunction<F>> fmt::Display for IncrementalGp<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "IncrementalGp(kernel={}, noise={}, n_samples={})",
            self.kernel,
            self.noise,
            self.samples.len()
        )
    }
}

impl<F: Float, K: CovarianceFunction<F>> IncrementalGp<F, K> {
    /// Gp parameters constructor
    pub fn params(kernel: K) -> GpParams<F, K> {
        GpParams::new(kernel)
    }

    /// Empty engine from validated parameters
    pub fn new(params: GpValidParams<F, K>) -> Self {
        let GpValidParams {
            noise,
            initial_capacity,
            mut kernel,
        } = params;
        // nothing to invalidate yet
        kernel.clear_changed_flag();
        IncrementalGp {
            samples: SampleSet::new(),
            kernel,
            noise,
            factor: CholeskyArena::with_capacity(initial_capacity),
            alpha: Array1::zeros(0),
            state: Freshness::Empty,
        }
    }

    /// Training observations
    pub fn sample_set(&self) -> &SampleSet<F> {
        &self.samples
    }

    /// Number of training observations
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Covariance function
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Mutable access to the covariance function.
    ///
    /// Changing hyperparameters raises the kernel changed flag: the Cholesky factor
    /// is rebuilt from scratch before the next prediction or update.
    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    /// Noise variance
    pub fn noise(&self) -> F {
        self.noise
    }

    /// Number of observations the factor storage holds without reallocation
    pub fn capacity(&self) -> usize {
        self.factor.capacity()
    }

    /// Freshness of the cached computations
    pub fn freshness(&self) -> Freshness {
        if self.kernel.hyperparameters_changed() {
            self.state.on_kernel_changed()
        } else {
            self.state
        }
    }

    /// Lower Cholesky factor (n, n) of the regularized kernel matrix.
    /// Meaningless when the factor is stale, see [`IncrementalGp::refresh`].
    pub fn factor(&self) -> ArrayView2<F> {
        self.factor.view()
    }

    /// Add observations given as `x` (m, 3) points and `y` (m,) target values.
    ///
    /// When the engine is empty (or the kernel hyperparameters changed) the kernel
    /// matrix is factorized from scratch over all observations, otherwise the
    /// Cholesky factor is extended row by row.
    ///
    /// On error the engine is left as it was before the call.
    pub fn add_observations(
        &mut self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        check_batch(x, y)?;
        if y.is_empty() {
            return Ok(());
        }
        self.sync_kernel();

        let n = self.samples.len();
        self.samples.append(x, y)?;
        let res = match self.state {
            Freshness::Empty | Freshness::FactorStale => self.full_recompute(),
            Freshness::AlphaStale | Freshness::Ready => self.extend_factor(n),
        };
        if let Err(err) = res {
            warn!("Cannot add {} observations: {}", y.len(), err);
            self.samples.truncate(n);
            self.factor.truncate(n);
            return Err(err);
        }
        self.state = self.state.on_samples_changed();
        Ok(())
    }

    /// Replace target value of the `k`th observation.
    ///
    /// The Cholesky factor does not depend on targets and stays valid.
    pub fn set_target(&mut self, k: usize, y: F) -> Result<()> {
        self.samples.set_target(k, y)?;
        self.state = self.state.on_samples_changed();
        Ok(())
    }

    /// Remove all observations, factor storage is kept for reuse.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.factor.clear();
        self.alpha = Array1::zeros(0);
        self.state = Freshness::Empty;
    }

    /// Factorize the kernel matrix from scratch whatever the cache state
    pub fn recompute(&mut self) -> Result<()> {
        self.sync_kernel();
        if self.samples.is_empty() {
            return Ok(());
        }
        self.full_recompute()
    }

    /// Resolve pending cache invalidations: rebuild the factor if the kernel changed,
    /// solve `alpha` if observations changed.
    pub fn refresh(&mut self) -> Result<()> {
        self.sync_kernel();
        if self.state == Freshness::FactorStale {
            self.full_recompute()?;
        }
        if self.state == Freshness::AlphaStale {
            let z = self.factor.solve_lower(&self.samples.targets())?;
            self.alpha = self.factor.solve_upper(&z)?;
            self.state = self.state.on_alpha_solved();
        }
        Ok(())
    }

    /// Read-only predictor which can be shared across threads.
    ///
    /// Fails with [`GpError::StaleModel`] when caches have to be refreshed first.
    pub fn predictor(&self) -> Result<GpPredictor<'_, F, K>> {
        match self.freshness() {
            Freshness::Empty | Freshness::Ready => Ok(GpPredictor(self)),
            Freshness::AlphaStale | Freshness::FactorStale => Err(GpError::StaleModel),
        }
    }

    /// Predict mean value at given `x` point. Returns 0 when there is no observation.
    pub fn predict_mean(&mut self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<F> {
        self.refresh()?;
        GpPredictor(&*self).predict_mean(x)
    }

    /// Predict variance at given `x` point. Returns 0 when there is no observation.
    ///
    /// Variance might be slightly negative due to round-off errors,
    /// it is set to zero in that case.
    pub fn predict_var(&mut self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<F> {
        self.refresh()?;
        GpPredictor(&*self).predict_var(x)
    }

    /// Predict both mean value and variance at given `x` point
    pub fn predict_valvar(&mut self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<(F, F)> {
        self.refresh()?;
        GpPredictor(&*self).predict_valvar(x)
    }

    /// Predict gradient of the mean wrt `x` components
    pub fn predict_gradient(&mut self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        self.refresh()?;
        GpPredictor(&*self).predict_gradient(x)
    }

    /// Log marginal likelihood of the observations
    ///
    /// `-1/2 y.alpha - sum(log(L_ii)) - n/2 log(2 pi)`
    ///
    /// Equals 0 when there is no observation.
    pub fn log_likelihood(&mut self) -> Result<F> {
        self.refresh()?;
        let n = self.samples.len();
        if n == 0 {
            return Ok(F::zero());
        }
        let y = self.samples.targets();
        let log_2pi = F::cast(std::f64::consts::TAU).ln();
        Ok(F::cast(-0.5) * y.dot(&self.alpha)
            - self.factor.half_log_det()
            - F::cast(0.5) * F::cast(n) * log_2pi)
    }

    /// Fold the kernel changed flag into the freshness state
    fn sync_kernel(&mut self) {
        if self.kernel.hyperparameters_changed() {
            debug!("Kernel hyperparameters changed: {}", self.kernel);
            self.kernel.clear_changed_flag();
            self.state = self.state.on_kernel_changed();
        }
    }

    /// Extend the factor with rows of observations from index `from`
    fn extend_factor(&mut self, from: usize) -> Result<()> {
        let now = Instant::now();
        let x = self.samples.inputs();
        let n = x.nrows();
        self.factor.reserve(n);
        for j in from..n {
            let xj = x.row(j);
            let k = cross_covariance(&self.kernel, &xj, &x.slice(ndarray::s![..j, ..]));
            let kappa = self.kernel.value(xj, xj) + self.noise;
            self.factor.push_row(&k, kappa)?;
        }
        debug!(
            "Factor extended from {} to {} rows in {:?}",
            from,
            n,
            now.elapsed()
        );
        Ok(())
    }

    /// Compute the kernel matrix and its Cholesky factorization over all observations
    fn full_recompute(&mut self) -> Result<()> {
        let now = Instant::now();
        let x = self.samples.inputs();
        let n = x.nrows();
        let kernel = &self.kernel;
        let noise = self.noise;

        // lower triangle, rows are filled independently
        let mut k_mx = Array2::<F>::zeros((n, n));
        Zip::indexed(k_mx.rows_mut()).par_for_each(|i, mut row| {
            let xi = x.row(i);
            for j in 0..i {
                row[j] = kernel.value(xi, x.row(j));
            }
            row[i] = kernel.value(xi, xi) + noise;
        });
        for i in 0..n {
            for j in 0..i {
                k_mx[[j, i]] = k_mx[[i, j]];
            }
        }

        let l = match k_mx.cholesky() {
            Ok(l) => l,
            Err(LinalgError::NotPositiveDefinite) => {
                return Err(GpError::NumericalInstability(format!(
                    "kernel matrix of {n} samples is not positive definite"
                )));
            }
            Err(err) => return Err(err.into()),
        };
        if let Some((i, pivot)) = l
            .diag()
            .iter()
            .enumerate()
            .find(|(_, v)| v.is_nan() || **v <= F::zero())
        {
            return Err(GpError::NumericalInstability(format!(
                "non-positive pivot {pivot} for sample {i} (duplicate or ill-conditioned input?)"
            )));
        }
        self.factor.assign(&l);
        self.state = Freshness::AlphaStale;
        debug!("Full factorization of {} samples in {:?}", n, now.elapsed());
        Ok(())
    }
}

/// Read-only view of an up to date [`IncrementalGp`] used to share predictions
/// across threads.
#[derive(Debug)]
pub struct GpPredictor<'a, F: Float, K: CovarianceFunction<F>>(&'a IncrementalGp<F, K>);

impl<'a, F: Float, K: CovarianceFunction<F>> Clone for GpPredictor<'a, F, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, F: Float, K: CovarianceFunction<F>> Copy for GpPredictor<'a, F, K> {}

impl<'a, F: Float, K: CovarianceFunction<F>> GpPredictor<'a, F, K> {
    /// Predict mean value at given `x` point
    pub fn predict_mean(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<F> {
        check_point(x)?;
        let gp = self.0;
        if gp.samples.is_empty() {
            return Ok(F::zero());
        }
        let k_star = cross_covariance(&gp.kernel, &x.view(), &gp.samples.inputs());
        Ok(k_star.dot(&gp.alpha))
    }

    /// Predict variance at given `x` point
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<F> {
        check_point(x)?;
        let gp = self.0;
        if gp.samples.is_empty() {
            return Ok(F::zero());
        }
        let k_star = cross_covariance(&gp.kernel, &x.view(), &gp.samples.inputs());
        self.variance(x, &k_star)
    }

    /// Predict both mean value and variance at given `x` point
    pub fn predict_valvar(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<(F, F)> {
        check_point(x)?;
        let gp = self.0;
        if gp.samples.is_empty() {
            return Ok((F::zero(), F::zero()));
        }
        let k_star = cross_covariance(&gp.kernel, &x.view(), &gp.samples.inputs());
        Ok((k_star.dot(&gp.alpha), self.variance(x, &k_star)?))
    }

    /// Predict gradient of the mean wrt `x` components
    ///
    /// `sum_i dk(x, x_i)/dx * alpha_i`
    pub fn predict_gradient(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        check_point(x)?;
        let gp = self.0;
        let mut grad = Array1::zeros(x.len());
        Zip::from(gp.samples.inputs().rows())
            .and(&gp.alpha)
            .for_each(|xi, &alpha_i| {
                grad.scaled_add(alpha_i, &gp.kernel.gradient(x.view(), xi));
            });
        Ok(grad)
    }

    /// Predict mean values at n given `x` points specified as a (n, 3) matrix
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let x = x.view();
        let values = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|xi| self.predict_mean(&xi))
            .collect::<Result<Vec<_>>>()?;
        Ok(Array1::from_vec(values))
    }

    /// Predict variances at n given `x` points specified as a (n, 3) matrix
    pub fn predict_vars(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let x = x.view();
        let values = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|xi| self.predict_var(&xi))
            .collect::<Result<Vec<_>>>()?;
        Ok(Array1::from_vec(values))
    }

    fn variance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix1>, k_star: &Array1<F>) -> Result<F> {
        let gp = self.0;
        let v = gp.factor.solve_lower(k_star)?;
        let var = gp.kernel.value(x.view(), x.view()) - v.dot(&v);
        // Variance might be slightly negative depending on
        // machine precision: set to zero in that case
        Ok(clamp_min(var, F::zero()))
    }
}

impl<F, K, D> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<F, K>
where
    F: Float,
    K: CovarianceFunction<F> + Clone,
    D: Data<Elem = F>,
{
    type Object = IncrementalGp<F, K>;

    /// Create a GP engine seeded with the dataset observations
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let mut gp = self.build();
        gp.add_observations(dataset.records(), dataset.targets())?;
        Ok(gp)
    }
}
