//! CART decision tree, the base learner for forests and boosting
//!
//! Supports gini impurity (classification) and variance reduction
//! (regression), best-split or random-split modes, and per-node feature
//! subsampling for ensembles.

use crate::error::Result;
use crate::models::check_xy;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Split-point selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Splitter {
    /// Exhaustive scan over candidate thresholds
    Best,
    /// One uniform random threshold per candidate feature (extra trees)
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all
    pub max_features: Option<usize>,
    pub splitter: Splitter,
    pub classification: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            splitter: Splitter::Best,
            classification: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<TreeNode>,
    n_features: usize,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            n_features: 0,
        }
    }

    /// Fit with a caller-provided RNG so ensembles stay reproducible.
    pub fn fit_with_rng(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        check_xy(x, y)?;
        self.n_features = x.ncols();
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build(x, y, &indices, 0, rng));
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(crate::error::MlError::NotFitted)?;
        Ok(Array1::from_iter(
            x.rows().into_iter().map(|row| Self::walk(root, &row.to_vec())),
        ))
    }

    pub fn predict_row(&self, row: &[f64]) -> Option<f64> {
        self.root.as_ref().map(|root| Self::walk(root, row))
    }

    fn walk(node: &TreeNode, row: &[f64]) -> f64 {
        match node {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    Self::walk(left, row)
                } else {
                    Self::walk(right, row)
                }
            }
        }
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let leaf = TreeNode::Leaf {
            value: self.leaf_value(y, indices),
        };

        if indices.len() < self.config.min_samples_split {
            return leaf;
        }
        if let Some(max_depth) = self.config.max_depth {
            if depth >= max_depth {
                return leaf;
            }
        }
        if self.impurity(y, indices) <= 1e-12 {
            return leaf;
        }

        let Some((feature, threshold)) = self.best_split(x, y, indices, rng) else {
            return leaf;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] <= threshold);
        if left_idx.len() < self.config.min_samples_leaf
            || right_idx.len() < self.config.min_samples_leaf
        {
            return leaf;
        }

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.build(x, y, &left_idx, depth + 1, rng)),
            right: Box::new(self.build(x, y, &right_idx, depth + 1, rng)),
        }
    }

    fn leaf_value(&self, y: &Array1<f64>, indices: &[usize]) -> f64 {
        if self.config.classification {
            // Majority class; ties resolve to the smallest id
            let mut counts: HashMap<i64, usize> = HashMap::new();
            for &i in indices {
                *counts.entry(y[i] as i64).or_insert(0) += 1;
            }
            counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                .map(|(class, _)| class as f64)
                .unwrap_or(0.0)
        } else {
            let sum: f64 = indices.iter().map(|&i| y[i]).sum();
            sum / indices.len().max(1) as f64
        }
    }

    fn impurity(&self, y: &Array1<f64>, indices: &[usize]) -> f64 {
        if self.config.classification {
            gini(y, indices)
        } else {
            variance(y, indices)
        }
    }

    /// Pick the split with the lowest weighted child impurity over a random
    /// subset of features.
    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64)> {
        let n_features = x.ncols();
        let k = self.config.max_features.unwrap_or(n_features).clamp(1, n_features);
        let mut features: Vec<usize> = (0..n_features).collect();
        if k < n_features {
            features.shuffle(rng);
            features.truncate(k);
        }

        let mut best: Option<(usize, f64, f64)> = None;
        for &feature in &features {
            let candidates = self.candidate_thresholds(x, indices, feature, rng);
            for threshold in candidates {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature]] <= threshold);
                if left.is_empty() || right.is_empty() {
                    continue;
                }
                let n = indices.len() as f64;
                let score = (left.len() as f64 / n) * self.impurity(y, &left)
                    + (right.len() as f64 / n) * self.impurity(y, &right);
                if best.map_or(true, |(_, _, s)| score < s) {
                    best = Some((feature, threshold, score));
                }
            }
        }
        best.map(|(feature, threshold, _)| (feature, threshold))
    }

    fn candidate_thresholds(
        &self,
        x: &Array2<f64>,
        indices: &[usize],
        feature: usize,
        rng: &mut ChaCha8Rng,
    ) -> Vec<f64> {
        let mut values: Vec<f64> = indices.iter().map(|&i| x[[i, feature]]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();
        if values.len() < 2 {
            return Vec::new();
        }
        match self.config.splitter {
            Splitter::Best => values
                .windows(2)
                .map(|pair| (pair[0] + pair[1]) / 2.0)
                .collect(),
            Splitter::Random => {
                let (lo, hi) = (values[0], values[values.len() - 1]);
                vec![rng.gen_range(lo..hi)]
            }
        }
    }
}

fn gini(y: &Array1<f64>, indices: &[usize]) -> f64 {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &i in indices {
        *counts.entry(y[i] as i64).or_insert(0) += 1;
    }
    let n = indices.len() as f64;
    1.0 - counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

fn variance(y: &Array1<f64>, indices: &[usize]) -> f64 {
    let n = indices.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean: f64 = indices.iter().map(|&i| y[i]).sum::<f64>() / n;
    indices.iter().map(|&i| (y[i] - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_separable_classification() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit_with_rng(&x, &y, &mut rng()).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert_eq!(pred.to_vec(), y.to_vec());
    }

    #[test]
    fn test_regression_fits_step_function() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![10.0, 10.0, 10.0, 20.0, 20.0, 20.0];
        let mut tree = DecisionTree::new(TreeConfig {
            classification: false,
            ..TreeConfig::default()
        });
        tree.fit_with_rng(&x, &y, &mut rng()).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert!((pred[0] - 10.0).abs() < 1e-9);
        assert!((pred[5] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..32).map(|i| (i % 4) as f64));
        let mut tree = DecisionTree::new(TreeConfig {
            max_depth: Some(1),
            ..TreeConfig::default()
        });
        tree.fit_with_rng(&x, &y, &mut rng()).unwrap();
        // Depth 1 means a single split: at most 2 distinct predictions
        let mut distinct = tree.predict(&x).unwrap().to_vec();
        distinct.sort_by(|a, b| a.partial_cmp(b).unwrap());
        distinct.dedup();
        assert!(distinct.len() <= 2);
    }

    #[test]
    fn test_predict_before_fit_errors() {
        let tree = DecisionTree::new(TreeConfig::default());
        assert!(tree.predict(&array![[1.0]]).is_err());
    }
}
