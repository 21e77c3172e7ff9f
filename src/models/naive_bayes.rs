//! Gaussian naive Bayes classifier

use crate::error::{MlError, Result};
use crate::models::{check_width, check_xy, require_f64, Estimator};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    class: i64,
    prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNb {
    pub var_smoothing: f64,
    stats: Vec<ClassStats>,
    n_features: usize,
}

impl GaussianNb {
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let mut model = Self {
            var_smoothing: 1e-9,
            stats: Vec::new(),
            n_features: 0,
        };
        for (name, value) in params {
            match name.as_str() {
                "var_smoothing" => model.var_smoothing = require_f64(name, value)?.abs(),
                _ => return Err(MlError::UnknownParameter { name: name.clone() }),
            }
        }
        Ok(model)
    }

    fn log_likelihood(&self, stats: &ClassStats, row: &[f64]) -> f64 {
        let mut total = stats.prior.ln();
        for ((value, mean), var) in row.iter().zip(&stats.means).zip(&stats.variances) {
            total += -0.5 * (2.0 * std::f64::consts::PI * var).ln()
                - (value - mean).powi(2) / (2.0 * var);
        }
        total
    }
}

impl Estimator for GaussianNb {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.n_features = x.ncols();

        let mut classes: Vec<i64> = y.iter().map(|&v| v as i64).collect();
        classes.sort_unstable();
        classes.dedup();

        // Smoothing floor relative to the largest overall feature variance
        let overall_max_var = (0..x.ncols())
            .map(|j| {
                let col = x.column(j);
                let mean = col.mean().unwrap_or(0.0);
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / col.len() as f64
            })
            .fold(0.0f64, f64::max);
        let epsilon = self.var_smoothing * overall_max_var.max(1e-12);

        self.stats = classes
            .iter()
            .map(|&class| {
                let rows: Vec<usize> = y
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v as i64 == class)
                    .map(|(i, _)| i)
                    .collect();
                let n_class = rows.len() as f64;
                let means: Vec<f64> = (0..x.ncols())
                    .map(|j| rows.iter().map(|&i| x[[i, j]]).sum::<f64>() / n_class)
                    .collect();
                let variances: Vec<f64> = (0..x.ncols())
                    .map(|j| {
                        let var = rows
                            .iter()
                            .map(|&i| (x[[i, j]] - means[j]).powi(2))
                            .sum::<f64>()
                            / n_class;
                        var + epsilon
                    })
                    .collect();
                ClassStats {
                    class,
                    prior: n_class / y.len() as f64,
                    means,
                    variances,
                }
            })
            .collect();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.stats.is_empty() {
            return Err(MlError::NotFitted);
        }
        check_width(x, self.n_features)?;

        Ok(Array1::from_iter(x.rows().into_iter().map(|row| {
            let row = row.to_vec();
            self.stats
                .iter()
                .map(|stats| (stats.class, self.log_likelihood(stats, &row)))
                .max_by(|a, b| {
                    a.1.partial_cmp(&b.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.0.cmp(&a.0))
                })
                .map(|(class, _)| class as f64)
                .unwrap_or(0.0)
        })))
    }

    fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(
            "var_smoothing".into(),
            ParamValue::Float(self.var_smoothing),
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
    fn test_separable_gaussians() {
        let x = array![
            [1.0, 1.1],
            [1.2, 0.9],
            [0.8, 1.0],
            [5.0, 5.2],
            [5.1, 4.9],
            [4.9, 5.0]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut nb = GaussianNb::from_params(&ParamMap::new()).unwrap();
        nb.fit(&x, &y).unwrap();
        let pred = nb.predict(&array![[1.0, 1.0], [5.0, 5.0]]).unwrap();
        assert_eq!(pred.to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_priors_break_ambiguous_points() {
        // Class 1 has 3x the mass; a point equidistant from both means
        // should take the heavier prior
        let x = array![[0.0], [4.0], [4.0], [4.0]];
        let y = array![0.0, 1.0, 1.0, 1.0];
        let mut nb = GaussianNb::from_params(&ParamMap::new()).unwrap();
        nb.fit(&x, &y).unwrap();
        let pred = nb.predict(&array![[2.0]]).unwrap();
        assert_eq!(pred[0], 1.0);
    }

    #[test]
    fn test_rejects_unknown_parameter() {
        let mut params = ParamMap::new();
        params.insert("alpha".into(), ParamValue::Float(0.1));
        assert!(matches!(
            GaussianNb::from_params(&params),
            Err(MlError::UnknownParameter { .. })
        ));
    }
}
