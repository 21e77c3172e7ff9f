//! Model families and the registry that constructs them
//!
//! Every family implements [`Estimator`]: construct from a typed parameter
//! map, fit on a numeric matrix, predict, and expose a full parameter
//! snapshot plus a serializable artifact of the fitted state.

pub mod boosting;
pub mod forest;
pub mod knn;
pub mod linear;
pub mod mlp;
pub mod naive_bayes;
pub mod registry;
pub mod tree;

pub use registry::{lookup, ModelFamily};

use crate::error::{MlError, Result};
use crate::params::{ParamMap, ParamValue};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Learning task for the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Classification,
    Regression,
}

impl Default for Task {
    fn default() -> Self {
        Task::Classification
    }
}

/// Common capability interface over all model families.
pub trait Estimator: Send {
    /// Fit on the training split. Must be called before [`Estimator::predict`].
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict targets (class ids for classification).
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Full constructor-visible hyperparameter snapshot, searched or not.
    fn params(&self) -> ParamMap;

    /// Serialized fitted state, for artifact persistence.
    fn artifact(&self) -> Result<serde_json::Value>;
}

pub(crate) fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(MlError::Shape {
            expected: format!("{} target values", x.nrows()),
            actual: format!("{}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(MlError::Training("cannot fit on an empty matrix".to_string()));
    }
    Ok(())
}

pub(crate) fn check_width(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(MlError::Shape {
            expected: format!("{} features", n_features),
            actual: format!("{}", x.ncols()),
        });
    }
    Ok(())
}

// Typed extraction from a ParamMap; wrong kinds surface as ParameterType so
// the orchestrator can classify them.

pub(crate) fn require_f64(name: &str, value: &ParamValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| MlError::ParameterType {
        name: name.to_string(),
        expected: "a number",
    })
}

pub(crate) fn require_usize(name: &str, value: &ParamValue) -> Result<usize> {
    value.as_usize().ok_or_else(|| MlError::ParameterType {
        name: name.to_string(),
        expected: "a non-negative integer",
    })
}

pub(crate) fn require_bool(name: &str, value: &ParamValue) -> Result<bool> {
    value.as_bool().ok_or_else(|| MlError::ParameterType {
        name: name.to_string(),
        expected: "a boolean",
    })
}

/// Optional integer: the native absent value passes through as `None`.
pub(crate) fn optional_usize(name: &str, value: &ParamValue) -> Result<Option<usize>> {
    if value.is_none() {
        return Ok(None);
    }
    require_usize(name, value).map(Some)
}

pub(crate) fn require_tuple(name: &str, value: &ParamValue) -> Result<Vec<i64>> {
    value
        .as_tuple()
        .map(<[i64]>::to_vec)
        .ok_or_else(|| MlError::ParameterType {
            name: name.to_string(),
            expected: "an integer tuple",
        })
}
