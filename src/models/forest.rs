//! Random forest and extra trees ensembles

use crate::error::{MlError, Result};
use crate::models::tree::{DecisionTree, Splitter, TreeConfig};
use crate::models::{
    check_width, check_xy, optional_usize, require_bool, require_usize, Estimator,
};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many features each split may consider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Count(usize),
    Fraction(f64),
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().round() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(k) => *k,
            MaxFeatures::Fraction(f) => ((n_features as f64) * f).round() as usize,
        };
        k.clamp(1, n_features)
    }

    fn from_param(value: &ParamValue) -> Result<MaxFeatures> {
        match value {
            ParamValue::None => Ok(MaxFeatures::All),
            ParamValue::Str(s) if s == "sqrt" || s == "auto" => Ok(MaxFeatures::Sqrt),
            ParamValue::Str(s) if s == "log2" => Ok(MaxFeatures::Log2),
            ParamValue::Int(k) if *k > 0 => Ok(MaxFeatures::Count(*k as usize)),
            ParamValue::Float(f) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            _ => Err(MlError::ParameterType {
                name: "max_features".to_string(),
                expected: "\"sqrt\", \"log2\", None, a positive count, or a fraction in (0, 1]",
            }),
        }
    }

    fn as_param(&self) -> ParamValue {
        match self {
            MaxFeatures::Sqrt => ParamValue::Str("sqrt".to_string()),
            MaxFeatures::Log2 => ParamValue::Str("log2".to_string()),
            MaxFeatures::All => ParamValue::None,
            MaxFeatures::Count(k) => ParamValue::Int(*k as i64),
            MaxFeatures::Fraction(f) => ParamValue::Float(*f),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
}

/// Tree ensemble; covers random forests (bootstrap + best splits) and extra
/// trees (full sample + random splits).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
    config: ForestConfig,
    classification: bool,
    /// Random-threshold splits (extra trees) instead of exhaustive scans
    randomized: bool,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl Forest {
    pub fn random_forest(classification: bool, params: &ParamMap) -> Result<Self> {
        Self::from_params(classification, false, params)
    }

    pub fn extra_trees(classification: bool, params: &ParamMap) -> Result<Self> {
        Self::from_params(classification, true, params)
    }

    fn from_params(classification: bool, randomized: bool, params: &ParamMap) -> Result<Self> {
        let mut config = ForestConfig {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: if classification {
                MaxFeatures::Sqrt
            } else {
                MaxFeatures::All
            },
            // Extra trees default to the full sample
            bootstrap: !randomized,
            random_state: None,
        };
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => config.n_estimators = require_usize(name, value)?.max(1),
                "max_depth" => config.max_depth = optional_usize(name, value)?,
                "min_samples_split" => {
                    config.min_samples_split = require_usize(name, value)?.max(2)
                }
                "min_samples_leaf" => config.min_samples_leaf = require_usize(name, value)?.max(1),
                "max_features" => config.max_features = MaxFeatures::from_param(value)?,
                "bootstrap" => config.bootstrap = require_bool(name, value)?,
                "random_state" => {
                    config.random_state = value.as_i64().map(|v| v as u64);
                }
                _ => return Err(MlError::UnknownParameter { name: name.clone() }),
            }
        }
        Ok(Self {
            config,
            classification,
            randomized,
            trees: Vec::new(),
            n_features: 0,
        })
    }

    fn tree_config(&self, n_features: usize) -> TreeConfig {
        TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: Some(self.config.max_features.resolve(n_features)),
            splitter: if self.randomized {
                Splitter::Random
            } else {
                Splitter::Best
            },
            classification: self.classification,
        }
    }
}

impl Estimator for Forest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.n_features = x.ncols();
        let tree_config = self.tree_config(x.ncols());
        let base_seed = self.config.random_state.unwrap_or(0);
        let n = x.nrows();
        let bootstrap = self.config.bootstrap;

        self.trees = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let mut tree = DecisionTree::new(tree_config.clone());
                if bootstrap {
                    let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                    let xb = Array2::from_shape_fn((n, x.ncols()), |(i, j)| x[[indices[i], j]]);
                    let yb = Array1::from_iter(indices.iter().map(|&i| y[i]));
                    tree.fit_with_rng(&xb, &yb, &mut rng)?;
                } else {
                    tree.fit_with_rng(x, y, &mut rng)?;
                }
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(MlError::NotFitted);
        }
        check_width(x, self.n_features)?;
        let per_tree: Vec<Array1<f64>> = self
            .trees
            .iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<_>>()?;

        Ok(Array1::from_iter((0..x.nrows()).map(|i| {
            if self.classification {
                // Majority vote across trees, ties to the smallest class id
                let mut votes: HashMap<i64, usize> = HashMap::new();
                for pred in &per_tree {
                    *votes.entry(pred[i] as i64).or_insert(0) += 1;
                }
                votes
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                    .map(|(class, _)| class as f64)
                    .unwrap_or(0.0)
            } else {
                per_tree.iter().map(|pred| pred[i]).sum::<f64>() / per_tree.len() as f64
            }
        })))
    }

    fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(
            "n_estimators".into(),
            ParamValue::Int(self.config.n_estimators as i64),
        );
        map.insert(
            "max_depth".into(),
            self.config
                .max_depth
                .map_or(ParamValue::None, |d| ParamValue::Int(d as i64)),
        );
        map.insert(
            "min_samples_split".into(),
            ParamValue::Int(self.config.min_samples_split as i64),
        );
        map.insert(
            "min_samples_leaf".into(),
            ParamValue::Int(self.config.min_samples_leaf as i64),
        );
        map.insert("max_features".into(), self.config.max_features.as_param());
        map.insert("bootstrap".into(), ParamValue::Bool(self.config.bootstrap));
        map.insert(
            "random_state".into(),
            self.config
                .random_state
                .map_or(ParamValue::None, |s| ParamValue::Int(s as i64)),
        );
        map
    }

    fn artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
