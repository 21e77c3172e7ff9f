//! Trainer/Evaluator: fit a configuration once and score both splits

use crate::data::split::DataSplit;
use crate::error::Result;
use crate::models::{Estimator, ModelFamily, Task};
use crate::params::ParamMap;
use crate::training::metrics;
use std::collections::BTreeMap;

/// Outcome of one fit: metric map, the full parameter snapshot, and the
/// fitted model itself for optional persistence.
pub struct Evaluation {
    pub metrics: BTreeMap<String, f64>,
    pub params: ParamMap,
    pub model: Box<dyn Estimator>,
}

/// Construct the family with the given parameters, fit on the train split,
/// and compute task metrics on both splits.
pub fn train_and_evaluate(
    family: &ModelFamily,
    params: &ParamMap,
    split: &DataSplit,
    task: Task,
) -> Result<Evaluation> {
    let mut model = family.construct(params)?;
    model.fit(&split.x_train, &split.y_train)?;

    let train_pred = model.predict(&split.x_train)?;
    let test_pred = model.predict(&split.x_test)?;

    let mut out = BTreeMap::new();
    match task {
        Task::Classification => {
            out.insert(
                "train_accuracy".to_string(),
                metrics::accuracy(&split.y_train, &train_pred),
            );
            out.insert(
                "test_accuracy".to_string(),
                metrics::accuracy(&split.y_test, &test_pred),
            );
            out.insert(
                "test_precision".to_string(),
                metrics::weighted_precision(&split.y_test, &test_pred),
            );
            out.insert(
                "test_recall".to_string(),
                metrics::weighted_recall(&split.y_test, &test_pred),
            );
            out.insert(
                "test_f1".to_string(),
                metrics::weighted_f1(&split.y_test, &test_pred),
            );
        }
        Task::Regression => {
            out.insert(
                "train_mse".to_string(),
                metrics::mean_squared_error(&split.y_train, &train_pred),
            );
            out.insert(
                "test_mse".to_string(),
                metrics::mean_squared_error(&split.y_test, &test_pred),
            );
            out.insert(
                "train_mae".to_string(),
                metrics::mean_absolute_error(&split.y_train, &train_pred),
            );
            out.insert(
                "test_mae".to_string(),
                metrics::mean_absolute_error(&split.y_test, &test_pred),
            );
            out.insert(
                "train_r2".to_string(),
                metrics::r2_score(&split.y_train, &train_pred),
            );
            out.insert(
                "test_r2".to_string(),
                metrics::r2_score(&split.y_test, &test_pred),
            );
        }
    }

    let snapshot = model.params();
    Ok(Evaluation {
        metrics: out,
        params: snapshot,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::split::split;
    use crate::data::RANDOM_SEED;
    use crate::models::lookup;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_classification_metric_keys() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| {
            if i < 10 {
                (i + j) as f64
            } else {
                50.0 + (i + j) as f64
            }
        });
        let y = Array1::from_iter((0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }));
        let s = split(&x, &y, 0.25, Task::Classification, RANDOM_SEED).unwrap();
        let family = lookup("nb").unwrap();
        let eval =
            train_and_evaluate(&family, &ParamMap::new(), &s, Task::Classification).unwrap();

        for key in [
            "train_accuracy",
            "test_accuracy",
            "test_precision",
            "test_recall",
            "test_f1",
        ] {
            let v = eval.metrics.get(key).unwrap_or_else(|| panic!("missing {key}"));
            assert!((0.0..=1.0).contains(v), "{key} out of range: {v}");
        }
        assert_eq!(eval.metrics.len(), 5);
        assert!(!eval.params.is_empty());
    }

    #[test]
    fn test_regression_metric_keys() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| 3.0 * v);
        let s = split(&x, &y, 0.25, Task::Regression, RANDOM_SEED).unwrap();
        let family = lookup("linreg").unwrap();
        let eval = train_and_evaluate(&family, &ParamMap::new(), &s, Task::Regression).unwrap();

        for key in [
            "train_mse", "test_mse", "train_mae", "test_mae", "train_r2", "test_r2",
        ] {
            assert!(eval.metrics.contains_key(key), "missing {key}");
        }
        assert!(*eval.metrics.get("test_r2").unwrap() > 0.99);
    }
}
