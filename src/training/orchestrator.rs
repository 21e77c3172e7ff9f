//! Batch Orchestrator
//!
//! Runs one training request end to end: validate, prepare, split, then one
//! Model Job per requested id. A job's failure is classified into a
//! user-facing message and recorded as that job's result; the loop always
//! proceeds to the next job. Only request-level validation (bad inputs,
//! unpreparable data, bad split) aborts the batch as a whole.

use crate::data::prepare::{column_names, prepare, NullHandling, Row};
use crate::data::split::{split, DataSplit};
use crate::data::RANDOM_SEED;
use crate::error::{MlError, Result};
use crate::models::{lookup, ModelFamily, Task};
use crate::params::{ParamMap, ParamSpace};
use crate::training::evaluator::train_and_evaluate;
use crate::training::store::ModelStore;
use crate::tuning::{finalize, SearchEngine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

fn default_train_pct() -> f64 {
    80.0
}

fn default_test_pct() -> f64 {
    20.0
}

fn default_n_trials() -> usize {
    20
}

fn default_true() -> bool {
    true
}

/// One batch training request. Field names are part of the wire format and
/// must not change.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub model_ids: Vec<String>,
    #[serde(default)]
    pub task: Task,
    #[serde(default = "default_train_pct")]
    pub train_split_percentage: f64,
    #[serde(default = "default_test_pct")]
    pub test_split_percentage: f64,
    #[serde(default)]
    pub null_handling_method: NullHandling,
    /// Whether to run a trial search per model
    #[serde(rename = "use_optuna", default)]
    pub tune: bool,
    #[serde(default = "default_n_trials")]
    pub n_trials: usize,
    #[serde(default = "default_true")]
    pub save_models: bool,
    #[serde(default)]
    pub hyperparameter_configs: BTreeMap<String, ParamSpace>,
}

/// Successful job entry in the response.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub model_id: String,
    pub metrics: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_filename: Option<String>,
    pub train_size: usize,
    pub test_size: usize,
    pub feature_count: usize,
    pub model_params: ParamMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// One entry per Model Job, success or failure.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobOutcome {
    Trained(JobReport),
    Failed { model_id: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedModel {
    pub model_id: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub success: bool,
    pub results: Vec<JobOutcome>,
    pub saved_models: Vec<SavedModel>,
}

pub struct Orchestrator {
    store: ModelStore,
    seed: u64,
}

impl Orchestrator {
    pub fn new(store: ModelStore) -> Self {
        Self {
            store,
            seed: RANDOM_SEED,
        }
    }

    /// Run the whole batch. Errors returned here are request-level; per-job
    /// failures come back inside `results`.
    pub fn train(&self, request: &TrainRequest) -> Result<TrainResponse> {
        validate(request)?;

        let prepared = prepare(
            &request.data,
            &request.features,
            &request.label,
            request.null_handling_method,
            request.task,
        )?;
        let test_fraction = request.test_split_percentage / 100.0;
        let data_split = split(
            &prepared.x,
            &prepared.y,
            test_fraction,
            request.task,
            self.seed,
        )?;
        info!(
            rows = prepared.x.nrows(),
            features = prepared.feature_names.len(),
            train = data_split.train_size(),
            test = data_split.test_size(),
            "data prepared and split"
        );

        let mut results = Vec::with_capacity(request.model_ids.len());
        let mut saved_models = Vec::new();

        for model_id in &request.model_ids {
            info!(model = %model_id, "starting model job");
            match self.run_job(model_id, request, &data_split) {
                Ok(report) => {
                    if let Some(filename) = &report.model_filename {
                        saved_models.push(SavedModel {
                            model_id: model_id.clone(),
                            filename: filename.clone(),
                        });
                    }
                    results.push(JobOutcome::Trained(report));
                }
                Err(e) => {
                    warn!(model = %model_id, error = %e, "model job failed");
                    results.push(JobOutcome::Failed {
                        model_id: model_id.clone(),
                        error: job_error_message(&e),
                    });
                }
            }
        }

        if results.is_empty() {
            return Err(MlError::Validation(
                "No models were trained".to_string(),
            ));
        }
        Ok(TrainResponse {
            success: true,
            results,
            saved_models,
        })
    }

    fn run_job(
        &self,
        model_id: &str,
        request: &TrainRequest,
        data_split: &DataSplit,
    ) -> Result<JobReport> {
        let family = lookup(model_id)?;
        let params = self.choose_params(&family, request, data_split);
        let evaluation = train_and_evaluate(&family, &params, data_split, request.task)?;

        let mut model_path = None;
        let mut model_filename = None;
        let mut warning = None;
        if request.save_models {
            match self
                .store
                .save(model_id, &evaluation.params, evaluation.model.as_ref())
            {
                Ok(filename) => {
                    model_path = Some(
                        self.store.dir().join(&filename).to_string_lossy().into_owned(),
                    );
                    model_filename = Some(filename);
                }
                Err(e) => {
                    // Metrics survive a failed save; report it alongside
                    warn!(model = model_id, error = %e, "model persistence failed");
                    warning = Some(format!("Model could not be saved: {e}"));
                }
            }
        }

        Ok(JobReport {
            model_id: model_id.to_string(),
            metrics: evaluation.metrics,
            model_path,
            model_filename,
            train_size: data_split.train_size(),
            test_size: data_split.test_size(),
            feature_count: data_split.x_train.ncols(),
            model_params: evaluation.params,
            warning,
        })
    }

    /// Tuned parameters when a search is requested and usable, otherwise
    /// family defaults; both merged with the seed and forced overrides.
    fn choose_params(
        &self,
        family: &ModelFamily,
        request: &TrainRequest,
        data_split: &DataSplit,
    ) -> ParamMap {
        if request.tune {
            if let Some(space) = request.hyperparameter_configs.get(family.id) {
                let engine = SearchEngine::new(request.n_trials, self.seed);
                if let Some(tuned) = engine.search(family, space, data_split, request.task) {
                    return tuned.params;
                }
                info!(model = family.id, "no usable tuning; falling back to defaults");
            }
        }
        finalize(family, ParamMap::new(), self.seed)
    }
}

fn validate(request: &TrainRequest) -> Result<()> {
    if request.data.is_empty() {
        return Err(MlError::Validation("No data provided".to_string()));
    }
    if request.features.is_empty() {
        return Err(MlError::Validation("No features selected".to_string()));
    }
    if request.label.is_empty() {
        return Err(MlError::Validation("No label column selected".to_string()));
    }
    if request.model_ids.is_empty() {
        return Err(MlError::Validation("No models selected".to_string()));
    }

    let columns = column_names(&request.data);
    let mut missing: Vec<&str> = request
        .features
        .iter()
        .map(String::as_str)
        .filter(|name| !columns.contains(*name))
        .collect();
    if !columns.contains(&request.label) {
        missing.push(request.label.as_str());
    }
    if !missing.is_empty() {
        return Err(MlError::Validation(format!(
            "Columns not found in dataset: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Classify a job failure into the user-facing message family.
fn job_error_message(err: &MlError) -> String {
    match err {
        MlError::UnknownModel { .. } | MlError::ModelFamilyUnavailable { .. } => err.to_string(),
        MlError::Validation(_)
        | MlError::EmptyDataset
        | MlError::InsufficientClasses { .. }
        | MlError::InsufficientSamplesPerClass { .. }
        | MlError::InvalidSplitRatio(_)
        | MlError::EmptySplit
        | MlError::Shape { .. } => format!("Data validation error: {err}"),
        MlError::ParameterType { .. } => format!("Type error: {err}"),
        MlError::UnknownParameter { .. } => format!("Missing parameter: {err}"),
        _ => format!("Training error: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let value = json!({
                    "a": i as f64,
                    "b": (i * 2) as f64,
                    "target": if i % 2 == 0 { "yes" } else { "no" },
                });
                value.as_object().unwrap().clone()
            })
            .collect()
    }

    fn request(n: usize, model_ids: &[&str]) -> TrainRequest {
        TrainRequest {
            data: rows(n),
            features: vec!["a".into(), "b".into()],
            label: "target".into(),
            model_ids: model_ids.iter().map(|s| (*s).to_string()).collect(),
            task: Task::Classification,
            train_split_percentage: 80.0,
            test_split_percentage: 20.0,
            null_handling_method: NullHandling::Impute,
            tune: false,
            n_trials: 5,
            save_models: false,
            hyperparameter_configs: BTreeMap::new(),
        }
    }

    fn orchestrator() -> (Orchestrator, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path()).unwrap();
        (Orchestrator::new(store), tmp)
    }

    #[test]
    fn test_empty_data_is_request_level_error() {
        let (orch, _tmp) = orchestrator();
        let req = request(0, &["nb"]);
        let err = orch.train(&req).unwrap_err();
        assert!(matches!(err, MlError::Validation(ref msg) if msg == "No data provided"));
    }

    #[test]
    fn test_missing_column_is_request_level_error() {
        let (orch, _tmp) = orchestrator();
        let mut req = request(20, &["nb"]);
        req.features.push("ghost".into());
        let err = orch.train(&req).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_unknown_model_is_job_level() {
        let (orch, _tmp) = orchestrator();
        let req = request(20, &["nb", "quantum"]);
        let resp = orch.train(&req).unwrap();
        assert!(resp.success);
        assert_eq!(resp.results.len(), 2);
        let failed = resp
            .results
            .iter()
            .filter(|r| matches!(r, JobOutcome::Failed { .. }))
            .count();
        assert_eq!(failed, 1);
    }

    #[test]
    fn test_unavailable_family_message_names_backend() {
        let (orch, _tmp) = orchestrator();
        let req = request(20, &["xgb"]);
        let resp = orch.train(&req).unwrap();
        match &resp.results[0] {
            JobOutcome::Failed { error, .. } => assert!(error.contains("XGBoost")),
            JobOutcome::Trained(_) => panic!("xgb should not train"),
        }
    }

    #[test]
    fn test_request_deserializes_wire_names() {
        let req: TrainRequest = serde_json::from_value(json!({
            "data": [{"a": 1.0, "target": "x"}, {"a": 2.0, "target": "y"}],
            "features": ["a"],
            "label": "target",
            "model_ids": ["nb"],
            "task": "classification",
            "use_optuna": true,
            "null_handling_method": "remove"
        }))
        .unwrap();
        assert!(req.tune);
        assert_eq!(req.null_handling_method, NullHandling::Remove);
        // Unspecified fields take the documented defaults
        assert_eq!(req.n_trials, 20);
        assert!(req.save_models);
        assert_eq!(req.test_split_percentage, 20.0);
    }

    #[test]
    fn test_error_message_classification() {
        let type_err = MlError::ParameterType {
            name: "C".into(),
            expected: "a number",
        };
        assert!(job_error_message(&type_err).starts_with("Type error: "));

        let missing = MlError::UnknownParameter { name: "gamma".into() };
        assert!(job_error_message(&missing).starts_with("Missing parameter: "));

        let training = MlError::Training("fit diverged".into());
        assert_eq!(job_error_message(&training), "Training error: fit diverged");

        let unknown = MlError::UnknownModel { model_id: "zz".into() };
        assert_eq!(job_error_message(&unknown), "Unknown model: zz");
    }
}
