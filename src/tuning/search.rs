//! Hyperparameter Search Engine
//!
//! Runs a bounded number of trials against a declarative parameter space.
//! Each trial draws one concrete assignment, trains on the train split, and
//! scores on the held-out split; classification scores accuracy, regression
//! scores negative MSE, so higher is better for both. A trial that fails to
//! construct or fit is skipped rather than aborting the search. When no
//! trial succeeds the engine reports no usable tuning and the caller falls
//! back to the family defaults.

use crate::data::split::DataSplit;
use crate::error::Result;
use crate::models::{ModelFamily, Task};
use crate::params::{ParamMap, ParamRange, ParamSpace, ParamValue};
use crate::training::metrics::{accuracy, mean_squared_error};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

/// Best assignment found by a search, already merged with the seed and
/// forced overrides used during its trials.
#[derive(Debug, Clone)]
pub struct TunedParams {
    pub params: ParamMap,
    pub score: f64,
    pub successful_trials: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchEngine {
    pub n_trials: usize,
    pub seed: u64,
}

impl SearchEngine {
    pub fn new(n_trials: usize, seed: u64) -> Self {
        Self { n_trials, seed }
    }

    /// Search the space for the given family, scoring trials by the batch
    /// task. Returns `None` when the space has nothing to sample or when
    /// every trial failed.
    pub fn search(
        &self,
        family: &ModelFamily,
        space: &ParamSpace,
        split: &DataSplit,
        task: Task,
    ) -> Option<TunedParams> {
        if !space.has_searchable() {
            return None;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut best: Option<(ParamMap, f64)> = None;
        let mut successes = 0usize;

        for trial in 0..self.n_trials {
            let mut assignment = ParamMap::new();
            for (name, range) in space.resolved() {
                assignment.insert(name.to_string(), sample(&range, &mut rng));
            }
            let candidate = finalize(family, assignment.clone(), self.seed);

            match evaluate(&candidate, family, split, task) {
                Ok(score) => {
                    debug!(model = family.id, trial, score, "trial scored");
                    successes += 1;
                    if best.as_ref().map_or(true, |(_, s)| score > *s) {
                        best = Some((assignment, score));
                    }
                }
                Err(e) => {
                    debug!(model = family.id, trial, error = %e, "trial failed");
                }
            }
        }

        best.map(|(assignment, score)| {
            info!(
                model = family.id,
                score, successes, "search finished with a usable configuration"
            );
            TunedParams {
                params: finalize(family, assignment, self.seed),
                score,
                successful_trials: successes,
            }
        })
    }
}

/// Merge an assignment with the family's seed parameter (when accepted) and
/// its forced overrides. Overrides are applied last so they always win.
pub(crate) fn finalize(family: &ModelFamily, mut assignment: ParamMap, seed: u64) -> ParamMap {
    if family.accepts_seed {
        assignment.insert("random_state".into(), ParamValue::Int(seed as i64));
    }
    for (name, value) in family.forced_overrides() {
        assignment.insert(name, value);
    }
    assignment
}

/// Score one concrete assignment: construct, fit on train, score on test.
/// The batch task picks the score so it matches the reported metrics.
///
/// Pure with respect to the search loop; all trial state lives in the
/// assignment itself.
pub fn evaluate(
    assignment: &ParamMap,
    family: &ModelFamily,
    split: &DataSplit,
    task: Task,
) -> Result<f64> {
    let mut model = family.construct(assignment)?;
    model.fit(&split.x_train, &split.y_train)?;
    let pred = model.predict(&split.x_test)?;
    Ok(match task {
        Task::Classification => accuracy(&split.y_test, &pred),
        Task::Regression => -mean_squared_error(&split.y_test, &pred),
    })
}

fn sample(range: &ParamRange, rng: &mut ChaCha8Rng) -> ParamValue {
    match range {
        ParamRange::Float { min, max, log } => {
            let v = if *log {
                // Bounds are strictly positive here; resolve() skips log
                // ranges that are not
                rng.gen_range(min.ln()..max.ln()).exp()
            } else {
                rng.gen_range(*min..*max)
            };
            ParamValue::Float(v)
        }
        ParamRange::Int { min, max } => ParamValue::Int(rng.gen_range(*min..=*max)),
        ParamRange::Categorical { options, boolean } => {
            let pick = &options[rng.gen_range(0..options.len())];
            if *boolean {
                let truthy = match pick {
                    serde_json::Value::Bool(b) => *b,
                    serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
                    _ => false,
                };
                ParamValue::Bool(truthy)
            } else {
                ParamValue::from_json(pick)
            }
        }
        ParamRange::Tuple { options } => {
            ParamValue::Tuple(options[rng.gen_range(0..options.len())].clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::split::split;
    use crate::data::RANDOM_SEED;
    use crate::models::lookup;
    use ndarray::{Array1, Array2};
    use serde_json::json;

    fn classification_split() -> DataSplit {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| {
            if i < 20 {
                (i + j) as f64 * 0.1
            } else {
                5.0 + (i + j) as f64 * 0.1
            }
        });
        let y = Array1::from_iter((0..40).map(|i| if i < 20 { 0.0 } else { 1.0 }));
        split(&x, &y, 0.25, Task::Classification, RANDOM_SEED).unwrap()
    }

    fn space(json: serde_json::Value) -> ParamSpace {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_search_returns_merged_configuration() {
        let family = lookup("rf").unwrap();
        let space = space(json!({
            "n_estimators": {"enabled": true, "type": "int", "min": 5, "max": 20}
        }));
        let engine = SearchEngine::new(5, RANDOM_SEED);
        let tuned = engine
            .search(&family, &space, &classification_split(), Task::Classification)
            .unwrap();

        let n = tuned.params.get("n_estimators").and_then(ParamValue::as_i64).unwrap();
        assert!((5..=20).contains(&n));
        // Seed is merged into the winning assignment
        assert_eq!(
            tuned.params.get("random_state"),
            Some(&ParamValue::Int(RANDOM_SEED as i64))
        );
        assert_eq!(tuned.successful_trials, 5);
        assert!((0.0..=1.0).contains(&tuned.score));
    }

    #[test]
    fn test_empty_space_yields_no_tuning() {
        let family = lookup("rf").unwrap();
        let engine = SearchEngine::new(5, RANDOM_SEED);
        assert!(engine
            .search(&family, &ParamSpace::new(), &classification_split(), Task::Classification)
            .is_none());
    }

    #[test]
    fn test_all_trials_failing_yields_no_tuning() {
        // The parameter name is valid for no family, so every construction
        // fails and the search must report no usable tuning
        let family = lookup("rf").unwrap();
        let space = space(json!({
            "definitely_not_a_parameter": {"enabled": true, "type": "int", "min": 1, "max": 5}
        }));
        let engine = SearchEngine::new(4, RANDOM_SEED);
        assert!(engine
            .search(&family, &space, &classification_split(), Task::Classification)
            .is_none());
    }

    #[test]
    fn test_forced_overrides_win_over_sampled_values() {
        let family = lookup("mlp").unwrap();
        let space = space(json!({
            "max_iter": {"enabled": true, "type": "int", "min": 1, "max": 3}
        }));
        let engine = SearchEngine::new(2, RANDOM_SEED);
        let tuned = engine
            .search(&family, &space, &classification_split(), Task::Classification)
            .unwrap();
        assert_eq!(tuned.params.get("max_iter"), Some(&ParamValue::Int(500)));
    }

    #[test]
    fn test_boolean_options_normalized() {
        let mut rng = ChaCha8Rng::seed_from_u64(RANDOM_SEED);
        let range = ParamRange::Categorical {
            options: vec![json!("True"), json!("False")],
            boolean: true,
        };
        for _ in 0..8 {
            assert!(matches!(sample(&range, &mut rng), ParamValue::Bool(_)));
        }
    }

    #[test]
    fn test_log_uniform_stays_in_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(RANDOM_SEED);
        let range = ParamRange::Float {
            min: 1e-4,
            max: 1.0,
            log: true,
        };
        for _ in 0..50 {
            let ParamValue::Float(v) = sample(&range, &mut rng) else {
                panic!("expected a float");
            };
            assert!((1e-4..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_regression_score_is_negated_mse() {
        let family = lookup("linreg").unwrap();
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| 2.0 * v + 1.0);
        let s = split(&x, &y, 0.25, Task::Regression, RANDOM_SEED).unwrap();
        let score = evaluate(&ParamMap::new(), &family, &s, Task::Regression).unwrap();
        // A perfect linear fit has MSE ~0, so the score approaches 0 from below
        assert!(score <= 0.0 && score > -1e-6);
    }

    #[test]
    fn test_score_follows_batch_task() {
        // The same family on the same split scores differently depending on
        // the batch task: accuracy lands in [0, 1], negated MSE never exceeds 0
        let family = lookup("rf").unwrap();
        let s = classification_split();
        let as_classification =
            evaluate(&ParamMap::new(), &family, &s, Task::Classification).unwrap();
        let as_regression = evaluate(&ParamMap::new(), &family, &s, Task::Regression).unwrap();
        assert!((0.0..=1.0).contains(&as_classification));
        assert!(as_regression <= 0.0);
    }
}
