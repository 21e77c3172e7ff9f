//! Gradient boosting and AdaBoost on shallow tree learners
//!
//! Gradient boosting fits regression trees to residuals: squared-error
//! gradients for regression, logistic gradients (one booster per class when
//! multi-class) for classification. A `subsample` fraction below 1 makes
//! each stage fit on a random row subset. AdaBoost reweights samples after
//! each round and fits the next tree on a weighted resample.

use crate::error::{MlError, Result};
use crate::models::tree::{DecisionTree, Splitter, TreeConfig};
use crate::models::{check_width, check_xy, require_f64, require_usize, Estimator};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

fn stage_config(max_depth: usize) -> TreeConfig {
    TreeConfig {
        max_depth: Some(max_depth),
        min_samples_split: 2,
        min_samples_leaf: 1,
        max_features: None,
        splitter: Splitter::Best,
        classification: false,
    }
}

fn resample(
    x: &Array2<f64>,
    y: &Array1<f64>,
    weights: &[f64],
    rng: &mut ChaCha8Rng,
) -> Result<(Array2<f64>, Array1<f64>)> {
    let dist = WeightedIndex::new(weights)
        .map_err(|e| MlError::Training(format!("degenerate sample weights: {e}")))?;
    let n = x.nrows();
    let indices: Vec<usize> = (0..n).map(|_| dist.sample(rng)).collect();
    let xs = Array2::from_shape_fn((n, x.ncols()), |(i, j)| x[[indices[i], j]]);
    let ys = Array1::from_iter(indices.iter().map(|&i| y[i]));
    Ok((xs, ys))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    random_state: Option<u64>,
    classification: bool,
    classes: Vec<i64>,
    /// One stage list per class (a single list for regression and binary)
    stages: Vec<Vec<DecisionTree>>,
    base_scores: Vec<f64>,
    n_features: usize,
}

impl GradientBoosting {
    pub fn from_params(classification: bool, params: &ParamMap) -> Result<Self> {
        let mut model = Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            subsample: 1.0,
            random_state: None,
            classification,
            classes: Vec::new(),
            stages: Vec::new(),
            base_scores: Vec::new(),
            n_features: 0,
        };
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => model.n_estimators = require_usize(name, value)?.max(1),
                "learning_rate" => model.learning_rate = require_f64(name, value)?.max(1e-6),
                "max_depth" => model.max_depth = require_usize(name, value)?.max(1),
                "subsample" => model.subsample = require_f64(name, value)?.clamp(0.1, 1.0),
                "random_state" => model.random_state = value.as_i64().map(|v| v as u64),
                _ => return Err(MlError::UnknownParameter { name: name.clone() }),
            }
        }
        Ok(model)
    }

    /// Random row subset for one stage, or `None` when training on the full
    /// sample (`subsample >= 1`). Sampling is without replacement.
    fn stage_sample(
        &self,
        x: &Array2<f64>,
        residuals: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Option<(Array2<f64>, Array1<f64>)> {
        if self.subsample >= 1.0 {
            return None;
        }
        let n = x.nrows();
        let k = (((n as f64) * self.subsample).round() as usize).clamp(1, n);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(k);
        let xs = Array2::from_shape_fn((k, x.ncols()), |(i, j)| x[[indices[i], j]]);
        let rs = Array1::from_iter(indices.iter().map(|&i| residuals[i]));
        Some((xs, rs))
    }

    fn fit_stage(
        &self,
        x: &Array2<f64>,
        residuals: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<DecisionTree> {
        let mut tree = DecisionTree::new(stage_config(self.max_depth));
        match self.stage_sample(x, residuals, rng) {
            Some((xs, rs)) => tree.fit_with_rng(&xs, &rs, rng)?,
            None => tree.fit_with_rng(x, residuals, rng)?,
        }
        Ok(tree)
    }

    /// Boost one sigmoid score chain toward binary targets in {0, 1}.
    fn fit_binary_chain(
        &self,
        x: &Array2<f64>,
        target: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<(Vec<DecisionTree>, f64)> {
        let pos = target.iter().filter(|&&v| v == 1.0).count() as f64;
        let n = target.len() as f64;
        // Log-odds prior, clamped away from degenerate all-one-class targets
        let prior = (pos / n).clamp(1e-6, 1.0 - 1e-6);
        let base = (prior / (1.0 - prior)).ln();

        let mut scores = Array1::from_elem(target.len(), base);
        let mut stages = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let residuals = target - &scores.mapv(sigmoid);
            let tree = self.fit_stage(x, &residuals, rng)?;
            let update = tree.predict(x)?;
            scores = scores + update * self.learning_rate;
            stages.push(tree);
        }
        Ok((stages, base))
    }

    fn fit_regression_chain(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<(Vec<DecisionTree>, f64)> {
        let base = y.mean().unwrap_or(0.0);
        let mut scores = Array1::from_elem(y.len(), base);
        let mut stages = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let residuals = y - &scores;
            let tree = self.fit_stage(x, &residuals, rng)?;
            let update = tree.predict(x)?;
            scores = scores + update * self.learning_rate;
            stages.push(tree);
        }
        Ok((stages, base))
    }

    fn chain_scores(&self, chain: usize, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut scores = Array1::from_elem(x.nrows(), self.base_scores[chain]);
        for tree in &self.stages[chain] {
            scores = scores + tree.predict(x)? * self.learning_rate;
        }
        Ok(scores)
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

impl Estimator for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        self.stages.clear();
        self.base_scores.clear();

        if !self.classification {
            let (stages, base) = self.fit_regression_chain(x, y, &mut rng)?;
            self.stages.push(stages);
            self.base_scores.push(base);
            return Ok(());
        }

        let mut classes: Vec<i64> = y.iter().map(|&v| v as i64).collect();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(MlError::Training(
                "gradient boosting needs at least 2 classes".to_string(),
            ));
        }

        if classes.len() == 2 {
            let target = Array1::from_iter(
                y.iter().map(|&v| f64::from(v as i64 == classes[1])),
            );
            let (stages, base) = self.fit_binary_chain(x, &target, &mut rng)?;
            self.stages.push(stages);
            self.base_scores.push(base);
        } else {
            // One-vs-rest chain per class, argmax at prediction time
            for &class in &classes {
                let target =
                    Array1::from_iter(y.iter().map(|&v| f64::from(v as i64 == class)));
                let (stages, base) = self.fit_binary_chain(x, &target, &mut rng)?;
                self.stages.push(stages);
                self.base_scores.push(base);
            }
        }
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.stages.is_empty() {
            return Err(MlError::NotFitted);
        }
        check_width(x, self.n_features)?;

        if !self.classification {
            return self.chain_scores(0, x);
        }
        if self.classes.len() == 2 {
            let scores = self.chain_scores(0, x)?;
            return Ok(scores.mapv(|s| {
                if s >= 0.0 {
                    self.classes[1] as f64
                } else {
                    self.classes[0] as f64
                }
            }));
        }

        let per_class: Vec<Array1<f64>> = (0..self.classes.len())
            .map(|c| self.chain_scores(c, x))
            .collect::<Result<_>>()?;
        Ok(Array1::from_iter((0..x.nrows()).map(|i| {
            let best = per_class
                .iter()
                .map(|scores| scores[i])
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            self.classes[best] as f64
        })))
    }

    fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(
            "n_estimators".into(),
            ParamValue::Int(self.n_estimators as i64),
        );
        map.insert(
            "learning_rate".into(),
            ParamValue::Float(self.learning_rate),
        );
        map.insert("max_depth".into(), ParamValue::Int(self.max_depth as i64));
        map.insert("subsample".into(), ParamValue::Float(self.subsample));
        map.insert(
            "random_state".into(),
            self.random_state
                .map_or(ParamValue::None, |s| ParamValue::Int(s as i64)),
        );
        map
    }

    fn artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// AdaBoost with SAMME weighting for classification and a median-free
/// weighted-average variant for regression. Weak learners are depth-limited
/// trees fit on weighted resamples, so the tree code stays weight-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoost {
    pub n_estimators: usize,
    pub learning_rate: f64,
    random_state: Option<u64>,
    classification: bool,
    classes: Vec<i64>,
    learners: Vec<DecisionTree>,
    learner_weights: Vec<f64>,
    n_features: usize,
}

impl AdaBoost {
    pub fn from_params(classification: bool, params: &ParamMap) -> Result<Self> {
        let mut model = Self {
            n_estimators: 50,
            learning_rate: 1.0,
            random_state: None,
            classification,
            classes: Vec::new(),
            learners: Vec::new(),
            learner_weights: Vec::new(),
            n_features: 0,
        };
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => model.n_estimators = require_usize(name, value)?.max(1),
                "learning_rate" => model.learning_rate = require_f64(name, value)?.max(1e-6),
                "random_state" => model.random_state = value.as_i64().map(|v| v as u64),
                _ => return Err(MlError::UnknownParameter { name: name.clone() }),
            }
        }
        Ok(model)
    }

    fn stump_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: Some(if self.classification { 1 } else { 3 }),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            splitter: Splitter::Best,
            classification: self.classification,
        }
    }

    fn fit_classifier(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        let n = x.nrows();
        let n_classes = self.classes.len() as f64;
        let mut weights = vec![1.0 / n as f64; n];

        for _ in 0..self.n_estimators {
            let (xs, ys) = resample(x, y, &weights, rng)?;
            let mut tree = DecisionTree::new(self.stump_config());
            tree.fit_with_rng(&xs, &ys, rng)?;
            let pred = tree.predict(x)?;

            let err: f64 = weights
                .iter()
                .zip(pred.iter().zip(y.iter()))
                .filter(|(_, (p, t))| (*p - *t).abs() > 0.5)
                .map(|(w, _)| *w)
                .sum();

            if err >= 1.0 - 1.0 / n_classes {
                // Worse than chance on the weighted sample; skip the round
                continue;
            }
            let err = err.max(1e-10);
            // SAMME stage weight
            let alpha =
                self.learning_rate * ((1.0 - err) / err).ln() + (n_classes - 1.0).ln();

            for (i, w) in weights.iter_mut().enumerate() {
                if (pred[i] - y[i]).abs() > 0.5 {
                    *w *= alpha.exp().min(1e12);
                }
            }
            let total: f64 = weights.iter().sum();
            for w in &mut weights {
                *w /= total;
            }

            self.learners.push(tree);
            self.learner_weights.push(alpha);
            if err < 1e-10 {
                break;
            }
        }

        if self.learners.is_empty() {
            // Every round was worse than chance; keep one unweighted learner
            let mut tree = DecisionTree::new(self.stump_config());
            tree.fit_with_rng(x, y, rng)?;
            self.learners.push(tree);
            self.learner_weights.push(1.0);
        }
        Ok(())
    }

    fn fit_regressor(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        let n = x.nrows();
        let mut weights = vec![1.0 / n as f64; n];

        for _ in 0..self.n_estimators {
            let (xs, ys) = resample(x, y, &weights, rng)?;
            let mut tree = DecisionTree::new(self.stump_config());
            tree.fit_with_rng(&xs, &ys, rng)?;
            let pred = tree.predict(x)?;

            let abs_errors: Vec<f64> =
                pred.iter().zip(y.iter()).map(|(p, t)| (p - t).abs()).collect();
            let max_err = abs_errors.iter().cloned().fold(0.0f64, f64::max);
            if max_err <= 1e-12 {
                self.learners.push(tree);
                self.learner_weights.push(1.0);
                break;
            }
            // Linear loss normalized to [0, 1]
            let loss: f64 = weights
                .iter()
                .zip(&abs_errors)
                .map(|(w, e)| w * e / max_err)
                .sum();
            if loss >= 0.5 {
                continue;
            }
            let beta = loss / (1.0 - loss);
            let alpha = self.learning_rate * (1.0 / beta.max(1e-10)).ln();

            for (i, w) in weights.iter_mut().enumerate() {
                *w *= beta.powf(self.learning_rate * (1.0 - abs_errors[i] / max_err));
            }
            let total: f64 = weights.iter().sum();
            for w in &mut weights {
                *w /= total;
            }

            self.learners.push(tree);
            self.learner_weights.push(alpha);
        }

        if self.learners.is_empty() {
            let mut tree = DecisionTree::new(self.stump_config());
            tree.fit_with_rng(x, y, rng)?;
            self.learners.push(tree);
            self.learner_weights.push(1.0);
        }
        Ok(())
    }
}

impl Estimator for AdaBoost {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.n_features = x.ncols();
        self.learners.clear();
        self.learner_weights.clear();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));

        if self.classification {
            let mut classes: Vec<i64> = y.iter().map(|&v| v as i64).collect();
            classes.sort_unstable();
            classes.dedup();
            if classes.len() < 2 {
                return Err(MlError::Training(
                    "adaboost needs at least 2 classes".to_string(),
                ));
            }
            self.classes = classes;
            self.fit_classifier(x, y, &mut rng)
        } else {
            self.fit_regressor(x, y, &mut rng)
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.learners.is_empty() {
            return Err(MlError::NotFitted);
        }
        check_width(x, self.n_features)?;

        let per_learner: Vec<Array1<f64>> = self
            .learners
            .iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<_>>()?;

        Ok(Array1::from_iter((0..x.nrows()).map(|i| {
            if self.classification {
                // Weighted vote, ties to the smallest class id
                self.classes
                    .iter()
                    .map(|&class| {
                        let score: f64 = per_learner
                            .iter()
                            .zip(&self.learner_weights)
                            .filter(|(pred, _)| pred[i] as i64 == class)
                            .map(|(_, alpha)| *alpha)
                            .sum();
                        (class, score)
                    })
                    .max_by(|a, b| {
                        a.1.partial_cmp(&b.1)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(b.0.cmp(&a.0))
                    })
                    .map(|(class, _)| class as f64)
                    .unwrap_or(0.0)
            } else {
                let total: f64 = self.learner_weights.iter().sum();
                per_learner
                    .iter()
                    .zip(&self.learner_weights)
                    .map(|(pred, alpha)| pred[i] * alpha)
                    .sum::<f64>()
                    / total.max(1e-12)
            }
        })))
    }

    fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(
            "n_estimators".into(),
            ParamValue::Int(self.n_estimators as i64),
        );
        map.insert(
            "learning_rate".into(),
            ParamValue::Float(self.learning_rate),
        );
        map.insert(
            "random_state".into(),
            self.random_state
                .map_or(ParamValue::None, |s| ParamValue::Int(s as i64)),
        );
        map
    }

    fn artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
