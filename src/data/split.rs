//! Split Engine: seeded train/test partitioning
//!
//! Classification splits are stratified so each class keeps roughly its
//! overall proportion in both partitions; regression uses a plain shuffled
//! split. The seed is fixed so a batch is reproducible end to end.

use crate::error::{MlError, Result};
use crate::models::Task;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Train/test partition of prepared data.
#[derive(Debug, Clone)]
pub struct DataSplit {
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
}

impl DataSplit {
    pub fn train_size(&self) -> usize {
        self.x_train.nrows()
    }

    pub fn test_size(&self) -> usize {
        self.x_test.nrows()
    }
}

/// Partition `x`/`y` with the given held-out fraction.
///
/// `test_fraction` must lie strictly in (0, 1). For classification with more
/// than one distinct label the split is stratified per class; each class
/// contributes at least one test sample but never all of its samples.
pub fn split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    test_fraction: f64,
    task: Task,
    seed: u64,
) -> Result<DataSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(MlError::InvalidSplitRatio(test_fraction));
    }

    let n = x.nrows();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let stratify = task == Task::Classification && distinct_labels(y) > 1;
    let (train_idx, test_idx) = if stratify {
        stratified_indices(y, test_fraction, &mut rng)
    } else {
        shuffled_indices(n, test_fraction, &mut rng)
    };

    if train_idx.is_empty() || test_idx.is_empty() {
        return Err(MlError::EmptySplit);
    }
    debug_assert_eq!(train_idx.len() + test_idx.len(), n);

    Ok(DataSplit {
        x_train: take_rows(x, &train_idx),
        y_train: take(y, &train_idx),
        x_test: take_rows(x, &test_idx),
        y_test: take(y, &test_idx),
    })
}

fn distinct_labels(y: &Array1<f64>) -> usize {
    let mut seen: Vec<i64> = y.iter().map(|&v| v as i64).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

fn shuffled_indices(
    n: usize,
    test_fraction: f64,
    rng: &mut ChaCha8Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let n_test = ((n as f64) * test_fraction).round() as usize;
    let n_test = n_test.clamp(usize::from(n > 1), n.saturating_sub(1));
    let test = indices.split_off(n - n_test);
    (indices, test)
}

/// Group indices by class, shuffle within each class, and allocate each
/// class's share of the test set proportionally (at least 1, at most all
/// but 1).
fn stratified_indices(
    y: &Array1<f64>,
    test_fraction: f64,
    rng: &mut ChaCha8Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        by_class.entry(label as i64).or_default().push(i);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for indices in by_class.values_mut() {
        indices.shuffle(rng);
        let n_class = indices.len();
        let n_test = ((n_class as f64) * test_fraction).round() as usize;
        let n_test = n_test.clamp(1, n_class.saturating_sub(1).max(1));
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }
    (train, test)
}

fn take_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((indices.len(), x.ncols()), |(i, j)| x[[indices[i], j]])
}

fn take(y: &Array1<f64>, indices: &[usize]) -> Array1<f64> {
    Array1::from_iter(indices.iter().map(|&i| y[i]))
}
