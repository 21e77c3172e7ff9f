//! Linear model families: OLS, ridge, lasso, elastic net, and logistic
//! regression (one-vs-rest for multi-class)

use crate::error::{MlError, Result};
use crate::models::{check_width, check_xy, require_bool, require_f64, require_usize, Estimator};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the normal equations `(X^T X + reg I) w = X^T y` by Cholesky,
/// adding diagonal jitter once if the system is not positive definite, then
/// falling back to Gauss-Jordan elimination.
fn solve_normal_eq(x: &Array2<f64>, y: &Array1<f64>, reg: f64) -> Result<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    let n = xtx.nrows();
    for i in 0..n {
        xtx[[i, i]] += reg;
    }

    if let Some(w) = cholesky_solve(&xtx, &xty) {
        return Ok(w);
    }
    let jitter = 1e-8 * (1.0 + xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64);
    let mut jittered = xtx.clone();
    for i in 0..n {
        jittered[[i, i]] += jitter;
    }
    cholesky_solve(&jittered, &xty)
        .or_else(|| gauss_jordan_solve(&xtx, &xty))
        .ok_or_else(|| MlError::Training("normal equations are singular".to_string()))
}

fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    // L y = b, then L^T x = y
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    Some(x)
}

fn gauss_jordan_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut aug = Array2::<f64>::zeros((n, n + 1));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = a[[i, j]];
        }
        aug[[i, n]] = b[i];
    }
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| {
                aug[[r1, col]]
                    .abs()
                    .partial_cmp(&aug[[r2, col]].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if aug[[pivot_row, col]].abs() < 1e-12 {
            return None;
        }
        if pivot_row != col {
            for j in 0..=n {
                aug.swap([col, j], [pivot_row, j]);
            }
        }
        let pivot = aug[[col, col]];
        for j in 0..=n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..=n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }
    Some(Array1::from_iter((0..n).map(|i| aug[[i, n]])))
}

/// Center features and target so the intercept can be recovered after the
/// solve, the standard trick for intercept-bearing linear fits.
fn centered(x: &Array2<f64>, y: &Array1<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>, f64) {
    let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let xc = x - &x_mean.clone().insert_axis(Axis(0));
    let yc = y - y_mean;
    (xc, yc, x_mean, y_mean)
}

/// Penalty mix for the coordinate-descent solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Penalty {
    None,
    Ridge,
    Lasso,
    ElasticNet,
}

/// Shared linear regressor covering linreg/ridge/lasso/elastic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    penalty: Penalty,
    pub alpha: f64,
    pub l1_ratio: f64,
    pub fit_intercept: bool,
    pub max_iter: usize,
    pub tol: f64,
    random_state: Option<u64>,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl LinearModel {
    fn new(penalty: Penalty, params: &ParamMap) -> Result<Self> {
        let mut model = Self {
            penalty,
            alpha: 1.0,
            l1_ratio: 0.5,
            fit_intercept: true,
            max_iter: 1000,
            tol: 1e-4,
            random_state: None,
            coefficients: None,
            intercept: 0.0,
        };
        for (name, value) in params {
            match name.as_str() {
                "alpha" if penalty != Penalty::None => {
                    model.alpha = require_f64(name, value)?.max(0.0)
                }
                "l1_ratio" if penalty == Penalty::ElasticNet => {
                    model.l1_ratio = require_f64(name, value)?.clamp(0.0, 1.0)
                }
                "fit_intercept" => model.fit_intercept = require_bool(name, value)?,
                "max_iter" if matches!(penalty, Penalty::Lasso | Penalty::ElasticNet) => {
                    model.max_iter = require_usize(name, value)?.max(1)
                }
                "tol" if matches!(penalty, Penalty::Lasso | Penalty::ElasticNet) => {
                    model.tol = require_f64(name, value)?.abs()
                }
                "random_state" => model.random_state = value.as_i64().map(|v| v as u64),
                _ => return Err(MlError::UnknownParameter { name: name.clone() }),
            }
        }
        Ok(model)
    }

    pub fn ordinary(params: &ParamMap) -> Result<Self> {
        Self::new(Penalty::None, params)
    }

    pub fn ridge(params: &ParamMap) -> Result<Self> {
        Self::new(Penalty::Ridge, params)
    }

    pub fn lasso(params: &ParamMap) -> Result<Self> {
        Self::new(Penalty::Lasso, params)
    }

    pub fn elastic_net(params: &ParamMap) -> Result<Self> {
        Self::new(Penalty::ElasticNet, params)
    }

    /// Effective (l1, l2) strengths in the elastic-net parameterization.
    fn penalties(&self) -> (f64, f64) {
        match self.penalty {
            Penalty::None => (0.0, 0.0),
            Penalty::Ridge => (0.0, self.alpha),
            Penalty::Lasso => (self.alpha, 0.0),
            Penalty::ElasticNet => (
                self.alpha * self.l1_ratio,
                self.alpha * (1.0 - self.l1_ratio),
            ),
        }
    }

    /// Cyclic coordinate descent with soft thresholding; used whenever an
    /// L1 term is present.
    fn coordinate_descent(&self, x: &Array2<f64>, y: &Array1<f64>) -> Array1<f64> {
        let (n, p) = (x.nrows() as f64, x.ncols());
        let (l1, l2) = self.penalties();
        let mut w = Array1::<f64>::zeros(p);
        let col_sq: Vec<f64> = (0..p)
            .map(|j| x.column(j).iter().map(|v| v * v).sum::<f64>() / n)
            .collect();

        let mut residual = y - &x.dot(&w);
        for _ in 0..self.max_iter {
            let mut max_delta = 0.0f64;
            for j in 0..p {
                if col_sq[j] == 0.0 {
                    continue;
                }
                let old = w[j];
                // Partial residual correlation for coordinate j
                let rho = x.column(j).dot(&residual) / n + col_sq[j] * old;
                let new = soft_threshold(rho, l1) / (col_sq[j] + l2);
                if new != old {
                    let delta = new - old;
                    residual = residual - &(x.column(j).to_owned() * delta);
                    w[j] = new;
                    max_delta = max_delta.max(delta.abs());
                }
            }
            if max_delta < self.tol {
                break;
            }
        }
        w
    }
}

fn soft_threshold(v: f64, threshold: f64) -> f64 {
    if v > threshold {
        v - threshold
    } else if v < -threshold {
        v + threshold
    } else {
        0.0
    }
}

impl Estimator for LinearModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let (xc, yc, x_mean, y_mean) = if self.fit_intercept {
            centered(x, y)
        } else {
            (x.clone(), y.clone(), Array1::zeros(x.ncols()), 0.0)
        };

        let (l1, l2) = self.penalties();
        let w = if l1 > 0.0 {
            self.coordinate_descent(&xc, &yc)
        } else {
            solve_normal_eq(&xc, &yc, l2)?
        };

        self.intercept = if self.fit_intercept {
            y_mean - w.dot(&x_mean)
        } else {
            0.0
        };
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let w = self.coefficients.as_ref().ok_or(MlError::NotFitted)?;
        check_width(x, w.len())?;
        Ok(x.dot(w) + self.intercept)
    }

    fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("fit_intercept".into(), ParamValue::Bool(self.fit_intercept));
        if self.penalty != Penalty::None {
            map.insert("alpha".into(), ParamValue::Float(self.alpha));
        }
        if self.penalty == Penalty::ElasticNet {
            map.insert("l1_ratio".into(), ParamValue::Float(self.l1_ratio));
        }
        if matches!(self.penalty, Penalty::Lasso | Penalty::ElasticNet) {
            map.insert("max_iter".into(), ParamValue::Int(self.max_iter as i64));
            map.insert("tol".into(), ParamValue::Float(self.tol));
        }
        if self.penalty != Penalty::None {
            map.insert(
                "random_state".into(),
                self.random_state
                    .map_or(ParamValue::None, |s| ParamValue::Int(s as i64)),
            );
        }
        map
    }

    fn artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Logistic regression via gradient descent; multi-class handled
/// one-vs-rest with argmax over per-class scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength; larger C means less penalty
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    random_state: Option<u64>,
    classes: Vec<i64>,
    /// Per-class weight vectors (one when binary)
    weights: Vec<Array1<f64>>,
    intercepts: Vec<f64>,
}

impl LogisticRegression {
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let mut model = Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            random_state: None,
            classes: Vec::new(),
            weights: Vec::new(),
            intercepts: Vec::new(),
        };
        for (name, value) in params {
            match name.as_str() {
                "C" => model.c = require_f64(name, value)?.max(1e-6),
                "max_iter" => model.max_iter = require_usize(name, value)?.max(1),
                "tol" => model.tol = require_f64(name, value)?.abs(),
                "random_state" => model.random_state = value.as_i64().map(|v| v as u64),
                _ => return Err(MlError::UnknownParameter { name: name.clone() }),
            }
        }
        Ok(model)
    }

    /// Fit one binary sigmoid classifier: target 1 for `positive`, 0 otherwise.
    fn fit_binary(&self, x: &Array2<f64>, y: &Array1<f64>, positive: i64) -> (Array1<f64>, f64) {
        let n = x.nrows() as f64;
        let lambda = 1.0 / (self.c * n);
        let target: Array1<f64> =
            Array1::from_iter(y.iter().map(|&v| f64::from(v as i64 == positive)));

        let mut w = Array1::<f64>::zeros(x.ncols());
        let mut b = 0.0f64;
        let lr = 0.1;
        for _ in 0..self.max_iter {
            let scores = x.dot(&w) + b;
            let probs = scores.mapv(sigmoid);
            let error = &probs - &target;
            let grad_w = x.t().dot(&error) / n + &w * lambda;
            let grad_b = error.sum() / n;
            let step = grad_w.iter().map(|g| g.abs()).fold(0.0f64, f64::max);
            w = w - &(grad_w * lr);
            b -= grad_b * lr;
            if step < self.tol {
                break;
            }
        }
        (w, b)
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let mut classes: Vec<i64> = y.iter().map(|&v| v as i64).collect();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(MlError::Training(
                "logistic regression needs at least 2 classes".to_string(),
            ));
        }

        self.weights.clear();
        self.intercepts.clear();
        if classes.len() == 2 {
            let (w, b) = self.fit_binary(x, y, classes[1]);
            self.weights.push(w);
            self.intercepts.push(b);
        } else {
            for &class in &classes {
                let (w, b) = self.fit_binary(x, y, class);
                self.weights.push(w);
                self.intercepts.push(b);
            }
        }
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.weights.is_empty() {
            return Err(MlError::NotFitted);
        }
        check_width(x, self.weights[0].len())?;

        if self.classes.len() == 2 {
            let scores = x.dot(&self.weights[0]) + self.intercepts[0];
            Ok(scores.mapv(|s| {
                if sigmoid(s) >= 0.5 {
                    self.classes[1] as f64
                } else {
                    self.classes[0] as f64
                }
            }))
        } else {
            Ok(Array1::from_iter((0..x.nrows()).map(|i| {
                let row = x.row(i);
                let best = self
                    .weights
                    .iter()
                    .zip(&self.intercepts)
                    .map(|(w, b)| row.dot(w) + b)
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);
                self.classes[best] as f64
            })))
        }
    }

    fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("C".into(), ParamValue::Float(self.c));
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_ols_recovers_line() {
        // y = 3x + 1
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![4.0, 7.0, 10.0, 13.0, 16.0];
        let mut model = LinearModel::ordinary(&ParamMap::new()).unwrap();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[6.0]]).unwrap();
        assert_abs_diff_eq!(pred[0], 19.0, epsilon = 1e-6);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut plain = LinearModel::ordinary(&ParamMap::new()).unwrap();
        plain.fit(&x, &y).unwrap();
        let mut params = ParamMap::new();
        params.insert("alpha".into(), ParamValue::Float(10.0));
        let mut ridge = LinearModel::ridge(&params).unwrap();
        ridge.fit(&x, &y).unwrap();
        let c_plain = plain.coefficients.as_ref().unwrap()[0];
        let c_ridge = ridge.coefficients.as_ref().unwrap()[0];
        assert!(c_ridge.abs() < c_plain.abs());
    }

    #[test]
    fn test_lasso_zeroes_irrelevant_feature() {
        // Second feature is pure noise around zero signal
        let x = array![
            [1.0, 0.01],
            [2.0, -0.02],
            [3.0, 0.015],
            [4.0, -0.01],
            [5.0, 0.02],
            [6.0, -0.015]
        ];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0, 12.0];
        let mut params = ParamMap::new();
        params.insert("alpha".into(), ParamValue::Float(0.5));
        let mut lasso = LinearModel::lasso(&params).unwrap();
        lasso.fit(&x, &y).unwrap();
        let coef = lasso.coefficients.as_ref().unwrap();
        assert_eq!(coef[1], 0.0, "noise feature should be zeroed: {coef:?}");
    }

    #[test]
    fn test_logreg_binary() {
        let x = array![
            [0.0], [0.5], [1.0], [1.5],
            [5.0], [5.5], [6.0], [6.5]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::from_params(&ParamMap::new()).unwrap();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.to_vec(), y.to_vec());
    }

    #[test]
    fn test_logreg_multiclass() {
        let x = array![
            [0.0], [0.2], [0.4],
            [5.0], [5.2], [5.4],
            [10.0], [10.2], [10.4]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let mut model = LogisticRegression::from_params(&ParamMap::new()).unwrap();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[0.1], [5.1], [10.1]]).unwrap();
        assert_eq!(pred.to_vec(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_wrong_param_kind_is_type_error() {
        let mut params = ParamMap::new();
        params.insert("C".into(), ParamValue::Str("high".into()));
        let err = LogisticRegression::from_params(&params).unwrap_err();
        assert!(matches!(err, MlError::ParameterType { .. }));
    }
}
