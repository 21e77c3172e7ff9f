//! Search-engine properties exercised through the public API

use researchml::data::prepare::Row;
use researchml::training::{JobOutcome, ModelStore, Orchestrator, TrainRequest};
use researchml::{ParamValue, SearchEngine, Task, RANDOM_SEED};
use serde_json::json;

fn rows() -> Vec<Row> {
    (0..80)
        .map(|i| {
            let class = i % 2;
            json!({
                "f1": i as f64 + (class * 40) as f64,
                "f2": (i % 7) as f64,
                "outcome": class,
            })
            .as_object()
            .unwrap()
            .clone()
        })
        .collect()
}

fn orchestrator() -> (Orchestrator, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let store = ModelStore::new(tmp.path()).unwrap();
    (Orchestrator::new(store), tmp)
}

fn tuned_request(configs: serde_json::Value) -> TrainRequest {
    serde_json::from_value(json!({
        "data": rows(),
        "features": ["f1", "f2"],
        "label": "outcome",
        "model_ids": ["rf"],
        "task": "classification",
        "use_optuna": true,
        "n_trials": 5,
        "save_models": false,
        "hyperparameter_configs": configs,
    }))
    .unwrap()
}

#[test]
fn test_tuned_batch_reports_sampled_parameters() {
    let (orch, _tmp) = orchestrator();
    let request = tuned_request(json!({
        "rf": {
            "n_estimators": {"enabled": true, "type": "int", "min": 5, "max": 15},
            "bootstrap": {"enabled": true, "type": "categorical", "options": [true, false]},
        }
    }));

    let response = orch.train(&request).unwrap();
    let JobOutcome::Trained(report) = &response.results[0] else {
        panic!("tuned rf job should succeed");
    };
    let n = report.model_params["n_estimators"].as_i64().unwrap();
    assert!((5..=15).contains(&n), "n_estimators outside searched range: {n}");
    assert_eq!(
        report.model_params["random_state"],
        ParamValue::Int(RANDOM_SEED as i64)
    );
    assert!(matches!(
        report.model_params["bootstrap"],
        ParamValue::Bool(_)
    ));
}

#[test]
fn test_all_failing_trials_fall_back_to_defaults() {
    let (orch, _tmp) = orchestrator();
    // No forest accepts this parameter, so every trial fails to construct
    let request = tuned_request(json!({
        "rf": {
            "definitely_wrong": {"enabled": true, "type": "int", "min": 1, "max": 9},
        }
    }));

    let response = orch.train(&request).unwrap();
    let JobOutcome::Trained(report) = &response.results[0] else {
        panic!("fallback to defaults should still train");
    };
    // Default forest size, not a sampled value
    assert_eq!(report.model_params["n_estimators"], ParamValue::Int(100));
}

#[test]
fn test_malformed_entries_are_skipped_not_fatal() {
    let (orch, _tmp) = orchestrator();
    let request = tuned_request(json!({
        "rf": {
            // min == max: skipped
            "n_estimators": {"enabled": true, "type": "int", "min": 10, "max": 10},
            // Unknown type tag: skipped
            "max_depth": {"enabled": true, "type": "matrix", "min": 1, "max": 5},
            // Well-formed; the only one actually searched
            "min_samples_leaf": {"enabled": true, "type": "int", "min": 1, "max": 4},
        }
    }));

    let response = orch.train(&request).unwrap();
    let JobOutcome::Trained(report) = &response.results[0] else {
        panic!("rf job should succeed");
    };
    assert_eq!(report.model_params["n_estimators"], ParamValue::Int(100));
    let leaf = report.model_params["min_samples_leaf"].as_i64().unwrap();
    assert!((1..=4).contains(&leaf));
}

#[test]
fn test_negative_log_range_is_skipped_not_fatal() {
    let (orch, _tmp) = orchestrator();
    // A log-scale range with non-positive bounds cannot be sampled; the
    // entry must be skipped and the batch must still produce a result
    let request = tuned_request(json!({
        "rf": {
            "gamma": {"enabled": true, "type": "float", "min": -2.0, "max": -1.0, "scale": "log"},
        }
    }));

    let response = orch.train(&request).unwrap();
    assert!(response.success);
    let JobOutcome::Trained(report) = &response.results[0] else {
        panic!("rf job should fall back to defaults and train");
    };
    assert_eq!(report.model_params["n_estimators"], ParamValue::Int(100));
}

#[test]
fn test_disabled_space_trains_on_defaults() {
    let (orch, _tmp) = orchestrator();
    let request = tuned_request(json!({
        "rf": {
            "n_estimators": {"enabled": false, "type": "int", "min": 5, "max": 15},
        }
    }));

    let response = orch.train(&request).unwrap();
    let JobOutcome::Trained(report) = &response.results[0] else {
        panic!("rf job should succeed");
    };
    assert_eq!(report.model_params["n_estimators"], ParamValue::Int(100));
}

#[test]
fn test_none_option_maps_to_native_absence() {
    let (orch, _tmp) = orchestrator();
    let request = tuned_request(json!({
        "rf": {
            "max_features": {"enabled": true, "type": "categorical", "options": ["None"]},
        }
    }));

    let response = orch.train(&request).unwrap();
    let JobOutcome::Trained(report) = &response.results[0] else {
        panic!("rf job should succeed");
    };
    assert_eq!(report.model_params["max_features"], ParamValue::None);
}

#[test]
fn test_tuple_space_drives_mlp_architecture() {
    let (orch, _tmp) = orchestrator();
    let request: TrainRequest = serde_json::from_value(json!({
        "data": rows(),
        "features": ["f1", "f2"],
        "label": "outcome",
        "model_ids": ["mlp"],
        "task": "classification",
        "use_optuna": true,
        "n_trials": 3,
        "save_models": false,
        "hyperparameter_configs": {
            "mlp": {
                "hidden_layer_sizes": {
                    "enabled": true,
                    "type": "tuple",
                    "default_options": ["(8,)", "(4, 4)"]
                }
            }
        }
    }))
    .unwrap();

    let response = orch.train(&request).unwrap();
    let JobOutcome::Trained(report) = &response.results[0] else {
        panic!("mlp job should succeed");
    };
    let sizes = report.model_params["hidden_layer_sizes"].as_tuple().unwrap();
    assert!(sizes == [8] || sizes == [4, 4]);
    // Forced override survives tuning
    assert_eq!(report.model_params["max_iter"], ParamValue::Int(500));
}

#[test]
fn test_search_is_deterministic_for_a_fixed_seed() {
    let family = researchml::lookup("rf").unwrap();
    let space: researchml::ParamSpace = serde_json::from_value(json!({
        "n_estimators": {"enabled": true, "type": "int", "min": 5, "max": 50},
        "max_depth": {"enabled": true, "type": "int", "min": 2, "max": 8},
    }))
    .unwrap();

    let x = ndarray::Array2::from_shape_fn((40, 2), |(i, j)| {
        if i < 20 { (i + j) as f64 } else { 30.0 + (i + j) as f64 }
    });
    let y = ndarray::Array1::from_iter((0..40).map(|i| if i < 20 { 0.0 } else { 1.0 }));
    let split = researchml::split(&x, &y, 0.25, Task::Classification, RANDOM_SEED).unwrap();

    let engine = SearchEngine::new(6, RANDOM_SEED);
    let a = engine
        .search(&family, &space, &split, Task::Classification)
        .unwrap();
    let b = engine
        .search(&family, &space, &split, Task::Classification)
        .unwrap();
    assert_eq!(a.params, b.params);
    assert_eq!(a.score, b.score);
}
