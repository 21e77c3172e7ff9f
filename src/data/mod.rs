//! Dataset preparation and splitting
//!
//! Turns raw row records into a clean numeric matrix ([`prepare`]) and
//! partitions it into train/test sets ([`split`]).

pub mod prepare;
pub mod split;

pub use prepare::{column_names, prepare, NullHandling, PreparedData, Row};
pub use split::{split, DataSplit};

/// Fixed seed for splits and trial sampling, for reproducible batches.
pub const RANDOM_SEED: u64 = 42;
