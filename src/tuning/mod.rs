//! Trial-based hyperparameter search

mod search;

pub use search::{evaluate, SearchEngine, TunedParams};

pub(crate) use search::finalize;
