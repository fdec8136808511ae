use crate::covariance::CovarianceFunction;
use crate::errors::{GpError, Result};
use crate::INPUT_DIM;
use linfa::Float;
use ndarray::{Array1, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Ix2, Zip};

/// Euclidean distance between two points
pub(crate) fn distance<F: Float>(a: &ArrayView1<F>, b: &ArrayView1<F>) -> F {
    let d = a - b;
    d.dot(&d).sqrt()
}

/// Computes `[k(x, xs_i)]` for every row `xs_i` of `xs`.
/// Kernel evaluations are independent and spread over the rayon pool.
pub(crate) fn cross_covariance<F: Float, K: CovarianceFunction<F> + ?Sized>(
    kernel: &K,
    x: &ArrayView1<F>,
    xs: &ArrayView2<F>,
) -> Array1<F> {
    let mut k = Array1::zeros(xs.nrows());
    Zip::from(&mut k)
        .and(xs.rows())
        .par_for_each(|ki, xi| *ki = kernel.value(x.view(), xi));
    k
}

/// Checks `x` is a point of the input space
pub(crate) fn check_point<F: Float>(x: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
    if x.len() != INPUT_DIM {
        return Err(GpError::DimensionMismatch {
            expected: INPUT_DIM,
            actual: x.len(),
        });
    }
    Ok(())
}

/// Checks a batch of observations: one target per point, points of the input space.
/// An empty batch is always valid whatever its column count.
pub(crate) fn check_batch<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(GpError::ShapeMismatch {
            inputs: x.nrows(),
            targets: y.len(),
        });
    }
    if x.nrows() > 0 && x.ncols() != INPUT_DIM {
        return Err(GpError::DimensionMismatch {
            expected: INPUT_DIM,
            actual: x.ncols(),
        });
    }
    Ok(())
}
