//! ResearchML - Batch tabular model training orchestrator
//!
//! This crate takes a raw tabular dataset plus a feature/label selection and
//! trains several candidate supervised models against it in one batch,
//! optionally tuning each model's hyperparameters with a bounded trial
//! search. Per-model failures are contained: one bad model produces an error
//! entry in the response instead of aborting the batch.
//!
//! # Modules
//!
//! - [`data`] - Row cleaning, categorical encoding, train/test splitting
//! - [`params`] - Typed hyperparameter values and declarative search spaces
//! - [`models`] - Model families behind a common [`models::Estimator`] trait,
//!   looked up by string id in the registry
//! - [`tuning`] - Trial-based hyperparameter search with default fallback
//! - [`training`] - Metrics, the trainer/evaluator, artifact persistence,
//!   and the batch orchestrator
//!
//! # Example
//!
//! ```no_run
//! use researchml::training::{ModelStore, Orchestrator, TrainRequest};
//!
//! # fn run(request: TrainRequest) -> researchml::error::Result<()> {
//! let store = ModelStore::new("models")?;
//! let orchestrator = Orchestrator::new(store);
//! let response = orchestrator.train(&request)?;
//! for outcome in &response.results {
//!     println!("{}", serde_json::to_string(outcome)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;

pub mod data;
pub mod models;
pub mod params;
pub mod training;
pub mod tuning;

pub use data::{prepare, split, NullHandling, PreparedData, RANDOM_SEED};
pub use error::{MlError, Result};
pub use models::{lookup, Estimator, ModelFamily, Task};
pub use params::{ParamMap, ParamSpace, ParamValue};
pub use training::{ModelStore, Orchestrator, TrainRequest, TrainResponse};
pub use tuning::SearchEngine;
