//! Crate-wide error types

use thiserror::Error;

/// Errors produced by the training pipeline
#[derive(Debug, Error)]
pub enum MlError {
    /// Request-level validation failure; aborts the batch before any job runs
    #[error("{0}")]
    Validation(String),

    /// No rows survived cleaning
    #[error("Dataset is empty after handling null values")]
    EmptyDataset,

    /// Classification needs at least two distinct label values
    #[error("Classification requires at least 2 classes, but found {found}. Please check your label column.")]
    InsufficientClasses { found: usize },

    /// Every class needs at least two samples for a stratifiable split
    #[error("Classification requires at least 2 samples per class, but class '{class}' has {count}. Please check your label distribution.")]
    InsufficientSamplesPerClass { class: String, count: usize },

    /// Test fraction outside (0, 1)
    #[error("Invalid test split fraction {0}; test_split_percentage must be between 1 and 99")]
    InvalidSplitRatio(f64),

    /// A train/test partition came out empty
    #[error("Train-test split resulted in an empty partition")]
    EmptySplit,

    /// Model identifier not present in the registry
    #[error("Unknown model: {model_id}")]
    UnknownModel { model_id: String },

    /// Model family is registered but not usable in this build
    #[error("{reason}")]
    ModelFamilyUnavailable { model_id: String, reason: String },

    /// Hyperparameter name the model family does not accept
    #[error("Unexpected hyperparameter '{name}' for this model family")]
    UnknownParameter { name: String },

    /// Hyperparameter value of the wrong kind
    #[error("Hyperparameter '{name}' expects {expected}")]
    ParameterType { name: String, expected: &'static str },

    /// Dimension mismatch between inputs
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    /// Predict called before fit
    #[error("Model has not been fitted")]
    NotFitted,

    /// Any failure inside a single job's fit/evaluate path
    #[error("{0}")]
    Training(String),

    /// Artifact write or retrieval failure
    #[error("{0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, MlError>;
