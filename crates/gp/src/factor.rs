use crate::errors::{GpError, Result};
use linfa::Float;
use linfa_linalg::triangular::*;
use log::debug;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1};

/// Storage of a lower triangular Cholesky factor `L` of a (n, n) kernel matrix.
///
/// The factor lives in the top left corner of a square buffer allocated with
/// spare capacity so that appending rows does not reallocate each time.
/// When the capacity is exceeded, the buffer capacity is at least doubled and
/// existing entries are copied over.
#[derive(Clone, Debug)]
pub(crate) struct CholeskyArena<F: Float> {
    buf: Array2<F>,
    n: usize,
}

impl<F: Float> CholeskyArena<F> {
    pub fn with_capacity(capacity: usize) -> Self {
        CholeskyArena {
            buf: Array2::zeros((capacity, capacity)),
            n: 0,
        }
    }

    /// Number of rows which can be stored without reallocation
    pub fn capacity(&self) -> usize {
        self.buf.nrows()
    }

    /// Number of rows of the factor
    pub fn len(&self) -> usize {
        self.n
    }

    /// Ensure the buffer can hold a (n, n) factor
    pub fn reserve(&mut self, n: usize) {
        if n <= self.capacity() {
            return;
        }
        let capacity = n.max(2 * self.capacity());
        debug!("Grow factor storage from {} to {}", self.capacity(), capacity);
        let mut buf = Array2::zeros((capacity, capacity));
        buf.slice_mut(s![..self.n, ..self.n])
            .assign(&self.buf.slice(s![..self.n, ..self.n]));
        self.buf = buf;
    }

    /// The (n, n) lower triangular factor
    pub fn view(&self) -> ArrayView2<F> {
        self.buf.slice(s![..self.n, ..self.n])
    }

    /// Replace the factor by the given (n, n) lower triangular matrix
    pub fn assign(&mut self, l: &Array2<F>) {
        let n = l.nrows();
        self.reserve(n);
        self.buf.slice_mut(s![..n, ..n]).assign(l);
        self.n = n;
    }

    /// Extend the factor by one row given `k`, the covariances of the new point
    /// with the n points already factorized, and `kappa` its regularized variance.
    ///
    /// Solves `L r = k` then sets the new row to `[r, sqrt(kappa - r.r)]`.
    pub fn push_row(&mut self, k: &Array1<F>, kappa: F) -> Result<()> {
        let j = self.n;
        let r = if j == 0 {
            Array1::zeros(0)
        } else {
            self.solve_lower(k)?
        };
        let pivot = kappa - r.dot(&r);
        if pivot.is_nan() || pivot <= F::zero() {
            return Err(GpError::NumericalInstability(format!(
                "non-positive pivot {pivot} while adding sample {j} (duplicate or ill-conditioned input?)"
            )));
        }
        self.reserve(j + 1);
        self.buf.slice_mut(s![j, ..j]).assign(&r);
        self.buf[[j, j]] = pivot.sqrt();
        self.n = j + 1;
        Ok(())
    }

    /// Forget rows from index `n` onwards
    pub fn truncate(&mut self, n: usize) {
        self.n = self.n.min(n);
    }

    pub fn clear(&mut self) {
        self.n = 0;
    }

    /// Solve `L x = b` by forward substitution
    pub fn solve_lower(&self, b: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let x = self
            .view()
            .solve_triangular(&b.view().insert_axis(Axis(1)), UPLO::Lower)?;
        Ok(x.remove_axis(Axis(1)))
    }

    /// Solve `L^t x = b` by backward substitution
    pub fn solve_upper(&self, b: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let x = self
            .view()
            .t()
            .solve_triangular(&b.view().insert_axis(Axis(1)), UPLO::Upper)?;
        Ok(x.remove_axis(Axis(1)))
    }

    /// `sum(log(L_ii))`, that is half the log determinant of the factorized matrix
    pub fn half_log_det(&self) -> F {
        self.view().diag().mapv(|v| v.ln()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // K = [[4, 2, 2], [2, 5, 3], [2, 3, 6]]
    fn expected_factor() -> Array2<f64> {
        array![
            [2., 0., 0.],
            [1., 2., 0.],
            [1., 1., 2.]
        ]
    }

    #[test]
    fn test_push_rows() {
        let mut arena = CholeskyArena::with_capacity(1);
        arena.push_row(&Array1::zeros(0), 4.).unwrap();
        arena.push_row(&array![2.], 5.).unwrap();
        arena.push_row(&array![2., 3.], 6.).unwrap();
        assert_eq!(3, arena.len());
        assert!(arena.capacity() >= 3);
        assert_abs_diff_eq!(expected_factor(), arena.view(), epsilon = 1e-12);
        assert_abs_diff_eq!(3. * 2f64.ln(), arena.half_log_det(), epsilon = 1e-12);
    }

    #[test]
    fn test_non_positive_pivot() {
        let mut arena = CholeskyArena::with_capacity(4);
        arena.push_row(&Array1::zeros(0), 1.).unwrap();
        let res = arena.push_row(&array![1.], 1.);
        assert!(matches!(res, Err(GpError::NumericalInstability(_))));
        assert_eq!(1, arena.len());
        assert!(matches!(
            CholeskyArena::with_capacity(1).push_row(&Array1::zeros(0), 0.),
            Err(GpError::NumericalInstability(_))
        ));
    }

    #[test]
    fn test_reserve_preserves_factor() {
        let mut arena = CholeskyArena::with_capacity(3);
        arena.assign(&expected_factor());
        arena.reserve(4);
        assert_eq!(6, arena.capacity());
        arena.reserve(20);
        assert_eq!(20, arena.capacity());
        assert_eq!(expected_factor(), arena.view());
    }

    #[test]
    fn test_solves() {
        let mut arena = CholeskyArena::with_capacity(3);
        arena.assign(&expected_factor());
        let k = array![[4., 2., 2.], [2., 5., 3.], [2., 3., 6.]];
        let b = array![1., 2., 3.];
        let z = arena.solve_lower(&b).unwrap();
        assert_abs_diff_eq!(b, expected_factor().dot(&z), epsilon = 1e-12);
        let x = arena.solve_upper(&z).unwrap();
        assert_abs_diff_eq!(b, k.dot(&x), epsilon = 1e-12);
    }

    #[test]
    fn test_truncate() {
        let mut arena = CholeskyArena::with_capacity(3);
        arena.assign(&expected_factor());
        arena.truncate(2);
        assert_eq!(array![[2., 0.], [1., 2.]], arena.view());
        arena.push_row(&array![2., 3.], 6.).unwrap();
        assert_eq!(expected_factor(), arena.view());
        arena.clear();
        assert_eq!(0, arena.len());
    }
}
