//! k-nearest-neighbors classifier and regressor
//!
//! Deterministic by construction, so this family takes no seed. Neighbor
//! ties at the same distance resolve by training-row order.

use crate::error::{MlError, Result};
use crate::models::{check_width, check_xy, require_usize, Estimator};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Neighbor vote weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weights {
    Uniform,
    Distance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearestNeighbors {
    pub n_neighbors: usize,
    pub weights: Weights,
    classification: bool,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl KNearestNeighbors {
    pub fn from_params(classification: bool, params: &ParamMap) -> Result<Self> {
        let mut model = Self {
            n_neighbors: 5,
            weights: Weights::Uniform,
            classification,
            x_train: None,
            y_train: None,
        };
        for (name, value) in params {
            match name.as_str() {
                "n_neighbors" => model.n_neighbors = require_usize(name, value)?.max(1),
                "weights" => {
                    model.weights = match value.as_str() {
                        Some("uniform") => Weights::Uniform,
                        Some("distance") => Weights::Distance,
                        _ => {
                            return Err(MlError::ParameterType {
                                name: name.clone(),
                                expected: "\"uniform\" or \"distance\"",
                            })
                        }
                    }
                }
                _ => return Err(MlError::UnknownParameter { name: name.clone() }),
            }
        }
        Ok(model)
    }

    /// Indices and distances of the k nearest training rows.
    fn neighbors(&self, x_train: &Array2<f64>, row: &[f64]) -> Vec<(usize, f64)> {
        let mut dists: Vec<(usize, f64)> = x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train_row)| {
                let d: f64 = train_row
                    .iter()
                    .zip(row)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (i, d.sqrt())
            })
            .collect();
        dists.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        dists.truncate(self.n_neighbors.min(dists.len()));
        dists
    }

    fn vote_weight(&self, distance: f64) -> f64 {
        match self.weights {
            Weights::Uniform => 1.0,
            // An exact match dominates the vote
            Weights::Distance => 1.0 / distance.max(1e-12),
        }
    }
}

impl Estimator for KNearestNeighbors {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(xt), Some(yt)) => (xt, yt),
            _ => return Err(MlError::NotFitted),
        };
        check_width(x, x_train.ncols())?;

        Ok(Array1::from_iter(x.rows().into_iter().map(|row| {
            let row = row.to_vec();
            let neighbors = self.neighbors(x_train, &row);
            if self.classification {
                let mut votes: HashMap<i64, f64> = HashMap::new();
                for (i, d) in &neighbors {
                    *votes.entry(y_train[*i] as i64).or_insert(0.0) += self.vote_weight(*d);
                }
                votes
                    .into_iter()
                    .max_by(|a, b| {
                        a.1.partial_cmp(&b.1)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(b.0.cmp(&a.0))
                    })
                    .map(|(class, _)| class as f64)
                    .unwrap_or(0.0)
            } else {
                let total: f64 = neighbors.iter().map(|(_, d)| self.vote_weight(*d)).sum();
                neighbors
                    .iter()
                    .map(|(i, d)| y_train[*i] * self.vote_weight(*d))
                    .sum::<f64>()
                    / total.max(1e-12)
            }
        })))
    }

    fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(
            "n_neighbors".into(),
            ParamValue::Int(self.n_neighbors as i64),
        );
        map.insert(
            "weights".into(),
            ParamValue::Str(
                match self.weights {
                    Weights::Uniform => "uniform",
                    Weights::Distance => "distance",
                }
                .to_string(),
            ),
        );
        map
    }

    fn artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_knn_classifies_nearest_cluster() {
        let x = array![[0.0], [0.1], [0.2], [10.0], [10.1], [10.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut params = ParamMap::new();
        params.insert("n_neighbors".into(), ParamValue::Int(3));
        let mut knn = KNearestNeighbors::from_params(true, &params).unwrap();
        knn.fit(&x, &y).unwrap();
        let pred = knn.predict(&array![[0.05], [10.05]]).unwrap();
        assert_eq!(pred.to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_knn_regression_averages_neighbors() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 10.0, 20.0, 30.0];
        let mut params = ParamMap::new();
        params.insert("n_neighbors".into(), ParamValue::Int(2));
        let mut knn = KNearestNeighbors::from_params(false, &params).unwrap();
        knn.fit(&x, &y).unwrap();
        let pred = knn.predict(&array![[0.5]]).unwrap();
        assert!((pred[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_weighting_prefers_exact_match() {
        let x = array![[0.0], [1.0], [1.1], [1.2]];
        let y = array![0.0, 1.0, 1.0, 1.0];
        let mut params = ParamMap::new();
        params.insert("n_neighbors".into(), ParamValue::Int(4));
        params.insert("weights".into(), ParamValue::Str("distance".into()));
        let mut knn = KNearestNeighbors::from_params(true, &params).unwrap();
        knn.fit(&x, &y).unwrap();
        // Sitting exactly on the class-0 point outweighs three uniform votes
        let pred = knn.predict(&array![[0.0]]).unwrap();
        assert_eq!(pred[0], 0.0);
    }

    #[test]
    fn test_bad_weights_value_is_type_error() {
        let mut params = ParamMap::new();
        params.insert("weights".into(), ParamValue::Str("manhattan".into()));
        assert!(matches!(
            KNearestNeighbors::from_params(true, &params),
            Err(MlError::ParameterType { .. })
        ));
    }
}
