//! Random train/test partition

use crate::error::{Result, TabforgeError};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Result of [`train_test_split`]
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    /// Seed that produced this partition, drawn at random when none was given
    pub seed: u64,
}

/// Number of held-out rows for `n_samples` rows, rounded up
pub fn test_count(n_samples: usize, test_size: f64) -> usize {
    (n_samples as f64 * test_size).ceil() as usize
}

/// Shuffle the rows and hold out `ceil(test_size * n)` of them.
///
/// Rows keep their pairing between `x` and `y`. Fails when either side of
/// the partition would be empty.
pub fn train_test_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    test_size: f64,
    seed: Option<u64>,
) -> Result<TrainTestSplit> {
    let n_samples = x.nrows();

    if n_samples != y.len() {
        return Err(TabforgeError::ShapeError {
            expected: format!("y length = {}", n_samples),
            actual: format!("y length = {}", y.len()),
        });
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TabforgeError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }

    let n_test = test_count(n_samples, test_size);
    if n_test == 0 || n_test >= n_samples {
        return Err(TabforgeError::ValidationError(format!(
            "{} samples with test_size={} leaves an empty train or test set",
            n_samples, test_size
        )));
    }

    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), train_idx),
        x_test: x.select(Axis(0), test_idx),
        y_train: y.select(Axis(0), train_idx),
        y_test: y.select(Axis(0), test_idx),
        seed,
    })
}
