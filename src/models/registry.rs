//! Model registry: string id to family descriptor
//!
//! Every trainable family is a table entry with a constructor function, so
//! new families plug in without touching the orchestrator. Families that
//! need optional native backends are registered as unavailable with a reason
//! instead of being absent, which keeps their error messages stable.

use crate::error::{MlError, Result};
use crate::models::boosting::{AdaBoost, GradientBoosting};
use crate::models::forest::Forest;
use crate::models::knn::KNearestNeighbors;
use crate::models::linear::{LinearModel, LogisticRegression};
use crate::models::mlp::MlpNetwork;
use crate::models::naive_bayes::GaussianNb;
use crate::models::{Estimator, Task};
use crate::params::{ParamMap, ParamValue};

type Constructor = fn(&ParamMap) -> Result<Box<dyn Estimator>>;

/// Registry entry for one model family.
#[derive(Clone, Debug)]
pub struct ModelFamily {
    pub id: &'static str,
    pub task: Task,
    /// Whether the constructor honors a `random_state` parameter
    pub accepts_seed: bool,
    construct: Constructor,
}

impl ModelFamily {
    /// Build an estimator from a typed parameter map. Unknown parameter
    /// names and wrong value kinds are rejected by the constructors.
    pub fn construct(&self, params: &ParamMap) -> Result<Box<dyn Estimator>> {
        (self.construct)(params)
    }

    /// Full default hyperparameter snapshot for this family.
    pub fn defaults(&self) -> ParamMap {
        // Constructors accept the empty map, so this cannot fail
        self.construct(&ParamMap::new())
            .map(|model| model.params())
            .unwrap_or_default()
    }

    /// Parameters pinned regardless of search results, applied last.
    pub fn forced_overrides(&self) -> ParamMap {
        let mut overrides = ParamMap::new();
        match self.id {
            "logreg" => {
                overrides.insert("max_iter".into(), ParamValue::Int(1000));
            }
            "mlp" | "mlp_reg" => {
                overrides.insert("max_iter".into(), ParamValue::Int(500));
            }
            _ => {}
        }
        overrides
    }
}

macro_rules! family {
    ($id:literal, $task:expr, $seed:expr, $ctor:expr) => {
        ModelFamily {
            id: $id,
            task: $task,
            accepts_seed: $seed,
            construct: $ctor,
        }
    };
}

/// Look up a model family by its wire id.
///
/// Ids registered but not trainable in this build return
/// [`MlError::ModelFamilyUnavailable`]; anything else is
/// [`MlError::UnknownModel`].
pub fn lookup(model_id: &str) -> Result<ModelFamily> {
    use Task::{Classification, Regression};

    Ok(match model_id {
        "logreg" => family!("logreg", Classification, true, |p| Ok(Box::new(
            LogisticRegression::from_params(p)?
        ))),
        "rf" => family!("rf", Classification, true, |p| Ok(Box::new(
            Forest::random_forest(true, p)?
        ))),
        "rf_reg" => family!("rf_reg", Regression, true, |p| Ok(Box::new(
            Forest::random_forest(false, p)?
        ))),
        "et" => family!("et", Classification, true, |p| Ok(Box::new(
            Forest::extra_trees(true, p)?
        ))),
        "et_reg" => family!("et_reg", Regression, true, |p| Ok(Box::new(
            Forest::extra_trees(false, p)?
        ))),
        "gbm" => family!("gbm", Classification, true, |p| Ok(Box::new(
            GradientBoosting::from_params(true, p)?
        ))),
        "gbm_reg" => family!("gbm_reg", Regression, true, |p| Ok(Box::new(
            GradientBoosting::from_params(false, p)?
        ))),
        "adaboost" => family!("adaboost", Classification, true, |p| Ok(Box::new(
            AdaBoost::from_params(true, p)?
        ))),
        "adaboost_reg" => family!("adaboost_reg", Regression, true, |p| Ok(Box::new(
            AdaBoost::from_params(false, p)?
        ))),
        "knn" => family!("knn", Classification, false, |p| Ok(Box::new(
            KNearestNeighbors::from_params(true, p)?
        ))),
        "knn_reg" => family!("knn_reg", Regression, false, |p| Ok(Box::new(
            KNearestNeighbors::from_params(false, p)?
        ))),
        "nb" => family!("nb", Classification, false, |p| Ok(Box::new(
            GaussianNb::from_params(p)?
        ))),
        "mlp" => family!("mlp", Classification, true, |p| Ok(Box::new(
            MlpNetwork::from_params(true, p)?
        ))),
        "mlp_reg" => family!("mlp_reg", Regression, true, |p| Ok(Box::new(
            MlpNetwork::from_params(false, p)?
        ))),
        "linreg" => family!("linreg", Regression, false, |p| Ok(Box::new(
            LinearModel::ordinary(p)?
        ))),
        "ridge" => family!("ridge", Regression, true, |p| Ok(Box::new(
            LinearModel::ridge(p)?
        ))),
        "lasso" => family!("lasso", Regression, true, |p| Ok(Box::new(
            LinearModel::lasso(p)?
        ))),
        "elastic" => family!("elastic", Regression, true, |p| Ok(Box::new(
            LinearModel::elastic_net(p)?
        ))),

        "xgb" | "xgb_reg" => {
            return Err(MlError::ModelFamilyUnavailable {
                model_id: model_id.to_string(),
                reason: "XGBoost backend is not built in; use gbm or gbm_reg".to_string(),
            })
        }
        "lgbm" | "lgbm_reg" => {
            return Err(MlError::ModelFamilyUnavailable {
                model_id: model_id.to_string(),
                reason: "LightGBM backend is not built in; use gbm or gbm_reg".to_string(),
            })
        }
        "catboost" | "catboost_reg" => {
            return Err(MlError::ModelFamilyUnavailable {
                model_id: model_id.to_string(),
                reason: "CatBoost backend is not built in; use gbm or gbm_reg".to_string(),
            })
        }
        "svm" | "svr" => {
            return Err(MlError::ModelFamilyUnavailable {
                model_id: model_id.to_string(),
                reason: "SVM backend is not built in; use logreg or ridge".to_string(),
            })
        }

        _ => {
            return Err(MlError::UnknownModel {
                model_id: model_id.to_string(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINABLE: &[&str] = &[
        "logreg", "rf", "rf_reg", "et", "et_reg", "gbm", "gbm_reg", "adaboost",
        "adaboost_reg", "knn", "knn_reg", "nb", "mlp", "mlp_reg", "linreg", "ridge",
        "lasso", "elastic",
    ];

    #[test]
    fn test_every_trainable_family_constructs_with_defaults() {
        for id in TRAINABLE {
            let family = lookup(id).unwrap();
            assert_eq!(family.id, *id);
            family
                .construct(&ParamMap::new())
                .unwrap_or_else(|e| panic!("{id} default construction failed: {e}"));
            assert!(!family.defaults().is_empty() || *id == "nb" || *id == "knn");
        }
    }

    #[test]
    fn test_unavailable_families_report_reason() {
        for id in ["xgb", "lgbm", "catboost", "svm", "svr", "xgb_reg"] {
            let err = lookup(id).unwrap_err();
            assert!(
                matches!(err, MlError::ModelFamilyUnavailable { .. }),
                "{id}: {err}"
            );
        }
    }

    #[test]
    fn test_unknown_id_is_unknown_model() {
        assert!(matches!(
            lookup("quantum_svm"),
            Err(MlError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_seedless_families() {
        for id in ["knn", "knn_reg", "nb", "linreg"] {
            assert!(!lookup(id).unwrap().accepts_seed, "{id} should not take a seed");
        }
        assert!(lookup("rf").unwrap().accepts_seed);
    }

    #[test]
    fn test_forced_overrides() {
        let mlp = lookup("mlp").unwrap().forced_overrides();
        assert_eq!(mlp.get("max_iter"), Some(&ParamValue::Int(500)));
        assert!(lookup("rf").unwrap().forced_overrides().is_empty());
    }

    #[test]
    fn test_task_assignment() {
        assert_eq!(lookup("rf").unwrap().task, Task::Classification);
        assert_eq!(lookup("rf_reg").unwrap().task, Task::Regression);
        assert_eq!(lookup("linreg").unwrap().task, Task::Regression);
    }
}
