//! Multi-layer perceptron with ReLU hidden layers
//!
//! Full-batch gradient descent; softmax cross-entropy output for
//! classification, a linear unit with squared error for regression. Weight
//! initialization is seeded so a fixed `random_state` reproduces the fit.

use crate::error::{MlError, Result};
use crate::models::{check_width, check_xy, require_f64, require_tuple, require_usize, Estimator};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Layer {
    weights: Array2<f64>,
    biases: Array1<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpNetwork {
    pub hidden_layer_sizes: Vec<usize>,
    pub learning_rate_init: f64,
    /// L2 penalty on the weights
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    random_state: Option<u64>,
    classification: bool,
    classes: Vec<i64>,
    layers: Vec<Layer>,
    n_features: usize,
}

impl MlpNetwork {
    pub fn from_params(classification: bool, params: &ParamMap) -> Result<Self> {
        let mut model = Self {
            hidden_layer_sizes: vec![100],
            learning_rate_init: 0.001,
            alpha: 0.0001,
            max_iter: 200,
            tol: 1e-4,
            random_state: None,
            classification,
            classes: Vec::new(),
            layers: Vec::new(),
            n_features: 0,
        };
        for (name, value) in params {
            match name.as_str() {
                "hidden_layer_sizes" => {
                    let sizes = require_tuple(name, value)?;
                    if sizes.is_empty() || sizes.iter().any(|&s| s <= 0) {
                        return Err(MlError::ParameterType {
                            name: name.clone(),
                            expected: "a tuple of positive layer widths",
                        });
                    }
                    model.hidden_layer_sizes = sizes.iter().map(|&s| s as usize).collect();
                }
                "learning_rate_init" => {
                    model.learning_rate_init = require_f64(name, value)?.max(1e-8)
                }
                "alpha" => model.alpha = require_f64(name, value)?.max(0.0),
                "max_iter" => model.max_iter = require_usize(name, value)?.max(1),
                "tol" => model.tol = require_f64(name, value)?.abs(),
                "random_state" => model.random_state = value.as_i64().map(|v| v as u64),
                _ => return Err(MlError::UnknownParameter { name: name.clone() }),
            }
        }
        Ok(model)
    }

    fn init_layers(&self, n_features: usize, n_outputs: usize, rng: &mut ChaCha8Rng) -> Vec<Layer> {
        let mut widths = vec![n_features];
        widths.extend(&self.hidden_layer_sizes);
        widths.push(n_outputs);

        widths
            .windows(2)
            .map(|pair| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                // Glorot uniform
                let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
                Layer {
                    weights: Array2::from_shape_fn((fan_in, fan_out), |_| {
                        rng.gen_range(-bound..bound)
                    }),
                    biases: Array1::zeros(fan_out),
                }
            })
            .collect()
    }

    /// Activations per layer, input included. The output layer stays linear;
    /// softmax is applied by the loss.
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.clone()];
        for (idx, layer) in self.layers.iter().enumerate() {
            let z = activations.last().unwrap().dot(&layer.weights)
                + &layer.biases.clone().insert_axis(Axis(0));
            let a = if idx + 1 < self.layers.len() {
                z.mapv(|v| v.max(0.0))
            } else {
                z
            };
            activations.push(a);
        }
        activations
    }

    fn output_scores(&self, x: &Array2<f64>) -> Array2<f64> {
        self.forward(x).pop().unwrap_or_else(|| x.clone())
    }
}

fn softmax_rows(scores: &Array2<f64>) -> Array2<f64> {
    let mut out = scores.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f64 = row.iter().sum();
        row.mapv_inplace(|v| v / sum.max(1e-12));
    }
    out
}

impl Estimator for MlpNetwork {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.n_features = x.ncols();
        let n = x.nrows() as f64;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));

        let (n_outputs, targets) = if self.classification {
            let mut classes: Vec<i64> = y.iter().map(|&v| v as i64).collect();
            classes.sort_unstable();
            classes.dedup();
            if classes.len() < 2 {
                return Err(MlError::Training(
                    "mlp classifier needs at least 2 classes".to_string(),
                ));
            }
            // One-hot targets in class order
            let mut onehot = Array2::<f64>::zeros((x.nrows(), classes.len()));
            for (i, &label) in y.iter().enumerate() {
                let col = classes
                    .iter()
                    .position(|&c| c == label as i64)
                    .unwrap_or(0);
                onehot[[i, col]] = 1.0;
            }
            self.classes = classes;
            (self.classes.len(), onehot)
        } else {
            (1, y.clone().insert_axis(Axis(1)))
        };

        self.layers = self.init_layers(x.ncols(), n_outputs, &mut rng);

        for _ in 0..self.max_iter {
            let activations = self.forward(x);
            let output = activations.last().unwrap();

            // dL/dz at the output for both losses reduces to (pred - target)
            let mut delta = if self.classification {
                (softmax_rows(output) - &targets) / n
            } else {
                (output - &targets) / n
            };

            let mut max_update = 0.0f64;
            for idx in (0..self.layers.len()).rev() {
                let input = &activations[idx];
                let grad_w = input.t().dot(&delta) + &(&self.layers[idx].weights * self.alpha);
                let grad_b = delta.sum_axis(Axis(0));

                if idx > 0 {
                    let back = delta.dot(&self.layers[idx].weights.t());
                    // ReLU gate on the hidden activation
                    delta = back * &activations[idx].mapv(|v| f64::from(v > 0.0));
                }

                let step = grad_w.iter().map(|g| g.abs()).fold(0.0f64, f64::max);
                max_update = max_update.max(step * self.learning_rate_init);
                self.layers[idx].weights =
                    &self.layers[idx].weights - &(grad_w * self.learning_rate_init);
                self.layers[idx].biases =
                    &self.layers[idx].biases - &(grad_b * self.learning_rate_init);
            }
            if max_update < self.tol * self.learning_rate_init {
                break;
            }
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.layers.is_empty() {
            return Err(MlError::NotFitted);
        }
        check_width(x, self.n_features)?;
        let scores = self.output_scores(x);

        if self.classification {
            Ok(Array1::from_iter(scores.rows().into_iter().map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);
                self.classes[best] as f64
            })))
        } else {
            Ok(scores.column(0).to_owned())
        }
    }

    fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(
            "hidden_layer_sizes".into(),
            ParamValue::Tuple(self.hidden_layer_sizes.iter().map(|&s| s as i64).collect()),
        );
        map.insert(
            "learning_rate_init".into(),
            ParamValue::Float(self.learning_rate_init),
        );
        map.insert("alpha".into(), ParamValue::Float(self.alpha));
        map.insert("max_iter".into(), ParamValue::Int(self.max_iter as i64));
        map.insert("tol".into(), ParamValue::Float(self.tol));
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
