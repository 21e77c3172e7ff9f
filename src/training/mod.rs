//! Training, evaluation, persistence, and batch orchestration

pub mod evaluator;
pub mod metrics;
pub mod orchestrator;
pub mod store;

pub use evaluator::{train_and_evaluate, Evaluation};
pub use orchestrator::{
    JobOutcome, JobReport, Orchestrator, SavedModel, TrainRequest, TrainResponse,
};
pub use store::ModelStore;
