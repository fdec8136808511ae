use crate::errors::{GpError, Result};
use crate::utils::check_batch;
use crate::INPUT_DIM;
use linfa::Float;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2};

/// An ordered collection of observations `(x, y)` where `x` is a 3D point
/// and `y` a scalar target value.
///
/// Observations are only appended: the index of an observation never changes
/// for the lifetime of the set, the only allowed mutation of existing data being
/// the replacement of a single target value.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleSet<F: Float> {
    /// Input points (n, 3)
    inputs: Array2<F>,
    /// Target values (n,)
    targets: Array1<F>,
}

impl<F: Float> Default for SampleSet<F> {
    fn default() -> Self {
        SampleSet {
            inputs: Array2::zeros((0, INPUT_DIM)),
            targets: Array1::zeros(0),
        }
    }
}

impl<F: Float> SampleSet<F> {
    /// Empty sample set
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample set initialized with `inputs` (n, 3) points and their `targets` (n,) values
    pub fn from_data(
        inputs: &ArrayBase<impl Data<Elem = F>, Ix2>,
        targets: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        let mut samples = Self::new();
        samples.append(inputs, targets)?;
        Ok(samples)
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the set holds no observation
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Append `inputs` (m, 3) points and their `targets` (m,) values after existing observations
    pub fn append(
        &mut self,
        inputs: &ArrayBase<impl Data<Elem = F>, Ix2>,
        targets: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        check_batch(inputs, targets)?;
        if targets.is_empty() {
            return Ok(());
        }
        self.inputs.append(Axis(0), inputs.view())?;
        self.targets.append(Axis(0), targets.view())?;
        Ok(())
    }

    /// Input point of the `k`th observation
    pub fn input(&self, k: usize) -> Result<ArrayView1<F>> {
        self.check_index(k)?;
        Ok(self.inputs.row(k))
    }

    /// Target value of the `k`th observation
    pub fn target(&self, k: usize) -> Result<F> {
        self.check_index(k)?;
        Ok(self.targets[k])
    }

    /// All input points as a (n, 3) matrix in index order
    pub fn inputs(&self) -> ArrayView2<F> {
        self.inputs.view()
    }

    /// All target values in index order
    pub fn targets(&self) -> ArrayView1<F> {
        self.targets.view()
    }

    /// Replace the target value of the `k`th observation
    pub fn set_target(&mut self, k: usize, y: F) -> Result<()> {
        self.check_index(k)?;
        self.targets[k] = y;
        Ok(())
    }

    /// Remove all observations
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Drop observations from index `len` onwards.
    /// Only used to roll back a batch the engine failed to absorb.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.inputs = self.inputs.slice(s![..len, ..]).to_owned();
            self.targets = self.targets.slice(s![..len]).to_owned();
        }
    }

    fn check_index(&self, k: usize) -> Result<()> {
        if k >= self.len() {
            return Err(GpError::IndexOutOfRange {
                index: k,
                len: self.len(),
            });
        }
        Ok(())
    }
}
