//! Decision tree implementation (CART)

use crate::error::{Result, TabforgeError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node. Children are indices into the tree's node list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node, samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

/// Training targets, class indices or raw values
enum Targets {
    Classes { labels: Vec<usize>, n_classes: usize },
    Values(Vec<f64>),
}

/// Sufficient statistics of a set of samples
#[derive(Clone)]
enum Accumulator {
    Counts(Vec<usize>),
    Moments { sum: f64, sq_sum: f64 },
}

impl Accumulator {
    fn empty(targets: &Targets) -> Self {
        match targets {
            Targets::Classes { n_classes, .. } => Accumulator::Counts(vec![0; *n_classes]),
            Targets::Values(_) => Accumulator::Moments { sum: 0.0, sq_sum: 0.0 },
        }
    }

    fn from_indices(targets: &Targets, indices: &[usize]) -> Self {
        let mut acc = Self::empty(targets);
        for &i in indices {
            acc.add(targets, i);
        }
        acc
    }

    fn add(&mut self, targets: &Targets, i: usize) {
        match (self, targets) {
            (Accumulator::Counts(counts), Targets::Classes { labels, .. }) => counts[labels[i]] += 1,
            (Accumulator::Moments { sum, sq_sum }, Targets::Values(values)) => {
                *sum += values[i];
                *sq_sum += values[i] * values[i];
            }
            _ => unreachable!("accumulator built for another target kind"),
        }
    }

    fn remove(&mut self, targets: &Targets, i: usize) {
        match (self, targets) {
            (Accumulator::Counts(counts), Targets::Classes { labels, .. }) => counts[labels[i]] -= 1,
            (Accumulator::Moments { sum, sq_sum }, Targets::Values(values)) => {
                *sum -= values[i];
                *sq_sum -= values[i] * values[i];
            }
            _ => unreachable!("accumulator built for another target kind"),
        }
    }

    fn impurity(&self, n: usize, criterion: Criterion) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        match self {
            Accumulator::Counts(counts) => match criterion {
                Criterion::Entropy => -counts
                    .iter()
                    .filter(|&&c| c > 0)
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p.ln()
                    })
                    .sum::<f64>(),
                _ => 1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
            },
            // Var = E[X^2] - E[X]^2, clamped against cancellation
            Accumulator::Moments { sum, sq_sum } => (sq_sum / n - (sum / n).powi(2)).max(0.0),
        }
    }
}

/// Node waiting to be grown
struct PendingNode {
    slot: usize,
    indices: Vec<usize>,
    depth: usize,
}

/// Best split found for a node
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Flat node list, the root at index 0. Empty until fitted.
    nodes: Vec<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Number of features drawn at random per split (None = all)
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed of the per-split feature sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Is classification task
    is_classification: bool,
    /// Sorted distinct labels (for classification)
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set number of candidate features per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(TabforgeError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(TabforgeError::ValidationError(
                "cannot fit a tree on an empty matrix".to_string(),
            ));
        }

        self.n_features = n_features;

        let targets = if self.is_classification {
            let mut classes: Vec<f64> = y.to_vec();
            classes.sort_by(f64::total_cmp);
            classes.dedup();
            let labels = y
                .iter()
                .map(|v| classes.partition_point(|c| c.total_cmp(v).is_lt()))
                .collect();
            let n_classes = classes.len();
            self.classes = classes;
            Targets::Classes { labels, n_classes }
        } else {
            Targets::Values(y.to_vec())
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];
        self.nodes = self.build_tree(x, &targets, n_samples, &mut importances, &mut rng);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    /// Grows the tree with an explicit work stack, so depth is bounded by
    /// memory rather than by the thread stack. Left subtrees are grown
    /// before right ones.
    fn build_tree(
        &self,
        x: &Array2<f64>,
        targets: &Targets,
        n_samples: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> Vec<TreeNode> {
        let mut nodes = vec![TreeNode::Leaf { value: 0.0, n_samples: 0 }];
        let mut stack = vec![PendingNode {
            slot: 0,
            indices: (0..n_samples).collect(),
            depth: 0,
        }];

        while let Some(PendingNode { slot, indices, depth }) = stack.pop() {
            let n_samples = indices.len();
            let stats = Accumulator::from_indices(targets, &indices);
            let impurity = stats.impurity(n_samples, self.criterion);

            let should_stop = n_samples < self.min_samples_split
                || n_samples < 2 * self.min_samples_leaf
                || self.max_depth.map_or(false, |d| depth >= d)
                || impurity <= f64::EPSILON;

            let best = if should_stop {
                None
            } else {
                self.find_best_split(x, targets, &indices, &stats, impurity, rng)
            };
            let Some(best) = best else {
                nodes[slot] = self.make_leaf(&stats, n_samples);
                continue;
            };

            let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

            importances[best.feature_idx] += n_samples as f64 * best.gain;

            // Placeholders, overwritten when the children are grown
            let left = nodes.len();
            let right = left + 1;
            nodes.push(TreeNode::Leaf { value: 0.0, n_samples: 0 });
            nodes.push(TreeNode::Leaf { value: 0.0, n_samples: 0 });

            nodes[slot] = TreeNode::Split {
                feature_idx: best.feature_idx,
                threshold: best.threshold,
                left,
                right,
                n_samples,
                impurity,
            };

            stack.push(PendingNode { slot: right, indices: right_indices, depth: depth + 1 });
            stack.push(PendingNode { slot: left, indices: left_indices, depth: depth + 1 });
        }

        nodes
    }

    /// Draws `max_features` candidates at random; when none of them admits a
    /// valid split the remaining features are tried as well.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        targets: &Targets,
        indices: &[usize],
        stats: &Accumulator,
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        let k = self.max_features.unwrap_or(n_features).clamp(1, n_features);

        let mut features: Vec<usize> = (0..n_features).collect();
        if k < n_features {
            features.shuffle(rng);
        }

        let (drawn, rest) = features.split_at(k);
        self.best_among(x, targets, indices, stats, parent_impurity, drawn)
            .or_else(|| self.best_among(x, targets, indices, stats, parent_impurity, rest))
    }

    fn best_among(
        &self,
        x: &Array2<f64>,
        targets: &Targets,
        indices: &[usize],
        stats: &Accumulator,
        parent_impurity: f64,
        features: &[usize],
    ) -> Option<SplitCandidate> {
        // Each feature independently finds its best split
        let results: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&f| self.best_split_for_feature(x.column(f), f, targets, indices, stats, parent_impurity))
            .collect();

        // Ties keep the earliest candidate
        results.into_iter().flatten().fold(None, |best, cand| match best {
            Some(b) if b.gain >= cand.gain => Some(b),
            _ => Some(cand),
        })
    }

    fn best_split_for_feature(
        &self,
        column: ArrayView1<f64>,
        feature_idx: usize,
        targets: &Targets,
        indices: &[usize],
        stats: &Accumulator,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

        let mut left = Accumulator::empty(targets);
        let mut right = stats.clone();
        let mut best: Option<SplitCandidate> = None;

        for pos in 0..n - 1 {
            let i = order[pos];
            left.add(targets, i);
            right.remove(targets, i);

            let lo = column[i];
            let hi = column[order[pos + 1]];
            if lo >= hi {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let weighted = (n_left as f64 * left.impurity(n_left, self.criterion)
                + n_right as f64 * right.impurity(n_right, self.criterion))
                / n as f64;
            let gain = parent_impurity - weighted;

            if best.as_ref().map_or(true, |b| gain > b.gain) {
                let mid = lo + (hi - lo) / 2.0;
                // Adjacent floats: the midpoint may round onto `hi`
                let threshold = if mid >= hi { lo } else { mid };
                best = Some(SplitCandidate { feature_idx, threshold, gain });
            }
        }

        best
    }

    fn make_leaf(&self, stats: &Accumulator, n_samples: usize) -> TreeNode {
        let value = match stats {
            Accumulator::Counts(counts) => {
                // Ties resolve to the smallest class
                let majority = counts
                    .iter()
                    .enumerate()
                    .fold((0usize, 0usize), |best, (idx, &c)| if c > best.1 { (idx, c) } else { best })
                    .0;
                self.classes.get(majority).copied().unwrap_or(0.0)
            }
            Accumulator::Moments { sum, .. } => {
                if n_samples == 0 {
                    0.0
                } else {
                    sum / n_samples as f64
                }
            }
        };

        TreeNode::Leaf { value, n_samples }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.nodes.is_empty() {
            return Err(TabforgeError::ModelNotFitted);
        }

        if x.ncols() != self.n_features {
            return Err(TabforgeError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| self.predict_sample(row))
            .collect())
    }

    fn predict_sample(&self, sample: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    idx = if sample[*feature_idx] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth (a lone leaf has depth 0)
    pub fn get_depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            match &self.nodes[idx] {
                TreeNode::Leaf { .. } => max_depth = max_depth.max(depth),
                TreeNode::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        max_depth
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    /// Flat node list, the root at index 0
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_separable() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.get_depth(), 1);
    }

    #[test]
    fn test_classifier_xor_needs_zero_gain_split() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 1.0, 1.0, 0.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.get_n_leaves(), 4);
    }

    #[test]
    fn test_classifier_keeps_original_labels() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![7.0, 7.0, -3.0, -3.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&array![[1.5], [3.5]]).unwrap(), array![7.0, -3.0]);
    }

    #[test]
    fn test_regressor_fits_training_data() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;

        assert!(mse < 1e-12, "MSE too high: {}", mse);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(1);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 1);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_min_samples_leaf(3);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_n_leaves() <= 2);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_predict_wrong_width() {
        let x = array![[1.0, 0.0], [2.0, 1.0]];
        let y = array![0.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(TabforgeError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_skewed_target_grows_a_chain() {
        // Each value dwarfs all smaller ones, so every split peels off the largest
        let n = 60;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| 4f64.powi(i as i32));

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.get_depth(), n - 1);
        assert_eq!(tree.get_n_leaves(), n);
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_deep_tree_on_small_stack() {
        let depth = 100_000;
        let mut nodes = Vec::with_capacity(2 * depth + 1);
        for i in 0..depth {
            let split = nodes.len();
            nodes.push(TreeNode::Split {
                feature_idx: 0,
                threshold: i as f64 + 0.5,
                left: split + 1,
                right: split + 2,
                n_samples: depth - i + 1,
                impurity: 1.0,
            });
            nodes.push(TreeNode::Leaf { value: i as f64, n_samples: 1 });
        }
        nodes.push(TreeNode::Leaf { value: depth as f64, n_samples: 1 });

        let tree = DecisionTree {
            nodes,
            n_features: 1,
            ..DecisionTree::new_regressor()
        };

        let handle = std::thread::Builder::new()
            .stack_size(128 * 1024)
            .spawn(move || {
                assert_eq!(tree.get_depth(), depth);
                assert_eq!(tree.get_n_leaves(), depth + 1);
                let x = array![[3.0], [depth as f64 + 1.0]];
                assert_eq!(tree.predict(&x).unwrap(), array![3.0, depth as f64]);

                let bytes = bincode::serialize(&tree).unwrap();
                let restored: DecisionTree = bincode::deserialize(&bytes).unwrap();
                assert_eq!(restored.get_depth(), depth);
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_predict_unfitted() {
        let tree = DecisionTree::new_regressor();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(TabforgeError::ModelNotFitted)
        ));
    }
}
