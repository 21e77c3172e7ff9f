//! Data Preparer: raw rows + column selection -> numeric matrix and target
//!
//! Handles missing values (drop or impute), label-encodes categorical
//! columns, and guarantees the output contains no NaN or infinite values.
//! The caller's rows are never mutated.

use crate::error::{MlError, Result};
use crate::models::Task;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One row record: column name -> JSON scalar.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Policy for rows with missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullHandling {
    /// Drop any row with a missing feature or label
    Remove,
    /// Fill numeric columns with the mean, categorical with the mode
    Impute,
}

impl Default for NullHandling {
    fn default() -> Self {
        NullHandling::Impute
    }
}

/// Clean numeric matrix plus encoded target, ready for splitting.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
}

/// Union of column names across all rows.
pub fn column_names(rows: &[Row]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for row in rows {
        for key in row.keys() {
            names.insert(key.clone());
        }
    }
    names
}

/// Internal cell representation after missing-value handling.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Num(f64),
    Text(String),
    Missing,
}

impl Cell {
    fn from_value(value: Option<&serde_json::Value>) -> Cell {
        match value {
            None | Some(serde_json::Value::Null) => Cell::Missing,
            Some(serde_json::Value::Number(n)) => Cell::Num(n.as_f64().unwrap_or(0.0)),
            Some(serde_json::Value::String(s)) => Cell::Text(s.clone()),
            Some(serde_json::Value::Bool(b)) => Cell::Text(b.to_string()),
            Some(other) => Cell::Text(other.to_string()),
        }
    }

    fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// String form used for categorical encoding and mode imputation.
    fn text(&self) -> String {
        match self {
            Cell::Num(v) => format_num(*v),
            Cell::Text(s) => s.clone(),
            Cell::Missing => "__MISSING__".to_string(),
        }
    }
}

/// Stable string form for numeric cells (`1` rather than `1.0` for whole
/// numbers, so integer-valued columns encode consistently).
fn format_num(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// One materialized column of the selected data.
struct Column {
    cells: Vec<Cell>,
    /// Numeric iff every non-missing cell is a number
    numeric: bool,
}

impl Column {
    fn extract(rows: &[Row], name: &str) -> Column {
        let cells: Vec<Cell> = rows
            .iter()
            .map(|row| Cell::from_value(row.get(name)))
            .collect();
        let numeric = cells
            .iter()
            .filter(|c| !c.is_missing())
            .all(|c| matches!(c, Cell::Num(_)));
        Column { cells, numeric }
    }

    fn mean(&self) -> f64 {
        let values: Vec<f64> = self
            .cells
            .iter()
            .filter_map(|c| match c {
                Cell::Num(v) => Some(*v),
                _ => None,
            })
            .collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// Most frequent non-missing value; ties broken by the lexicographically
    /// smallest, matching a most-frequent imputer.
    fn mode(&self) -> Cell {
        let mut counts: std::collections::BTreeMap<String, (usize, Cell)> = Default::default();
        for cell in self.cells.iter().filter(|c| !c.is_missing()) {
            let entry = counts
                .entry(cell.text())
                .or_insert_with(|| (0, cell.clone()));
            entry.0 += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.0.cmp(&a.0)))
            .map(|(_, (_, cell))| cell)
            .unwrap_or(Cell::Text("__MISSING__".to_string()))
    }

    /// Replace remaining missing cells according to the impute policy.
    fn impute(&mut self) {
        let fill = if self.numeric {
            Cell::Num(self.mean())
        } else {
            self.mode()
        };
        for cell in &mut self.cells {
            if cell.is_missing() {
                *cell = fill.clone();
            }
        }
    }

    /// Numeric vector for this column: numbers pass through; categorical
    /// cells are label-encoded over the sorted distinct string set, with
    /// missing mapped to the dedicated sentinel category first.
    fn encode(&self) -> Vec<f64> {
        if self.numeric {
            self.cells
                .iter()
                .map(|c| match c {
                    Cell::Num(v) => sanitize(*v),
                    // Unparseable residue coerces to 0
                    Cell::Text(s) => sanitize(s.trim().parse::<f64>().unwrap_or(0.0)),
                    Cell::Missing => 0.0,
                })
                .collect()
        } else {
            let mut distinct: BTreeSet<String> =
                self.cells.iter().map(|c| c.text()).collect();
            distinct.insert("__MISSING__".to_string());
            let index: Vec<String> = distinct.into_iter().collect();
            self.cells
                .iter()
                .map(|c| index.iter().position(|v| *v == c.text()).unwrap_or(0) as f64)
                .collect()
        }
    }
}

/// Zero out NaN and infinities; models must never see them.
fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Prepare selected features and label into a numeric matrix/vector.
pub fn prepare(
    rows: &[Row],
    features: &[String],
    label: &str,
    null_handling: NullHandling,
    task: Task,
) -> Result<PreparedData> {
    let mut selected: Vec<&str> = features.iter().map(String::as_str).collect();
    selected.push(label);

    // Null handling operates on row indices so the caller's rows stay intact.
    let kept: Vec<usize> = match null_handling {
        NullHandling::Remove => (0..rows.len())
            .filter(|&i| {
                selected
                    .iter()
                    .all(|col| !Cell::from_value(rows[i].get(*col)).is_missing())
            })
            .collect(),
        NullHandling::Impute => (0..rows.len()).collect(),
    };
    if kept.is_empty() {
        return Err(MlError::EmptyDataset);
    }
    let rows: Vec<Row> = kept.iter().map(|&i| rows[i].clone()).collect();

    let mut columns: Vec<Column> = features
        .iter()
        .map(|name| Column::extract(&rows, name))
        .collect();
    let label_col = Column::extract(&rows, label);

    // Imputation covers features only; a still-missing label falls into the
    // sentinel category (classification) or coerces to 0 (regression).
    if null_handling == NullHandling::Impute {
        for col in &mut columns {
            col.impute();
        }
    }

    let y = encode_label(&label_col, task)?;

    let n_rows = rows.len();
    if n_rows < 2 {
        return Err(MlError::Validation(
            "Not enough samples for training (need at least 2)".to_string(),
        ));
    }

    let encoded: Vec<Vec<f64>> = columns.iter().map(Column::encode).collect();
    let x = Array2::from_shape_fn((n_rows, features.len()), |(r, c)| encoded[c][r]);

    Ok(PreparedData {
        x,
        y: Array1::from_vec(y),
        feature_names: features.to_vec(),
    })
}

/// Encode the target vector.
///
/// Classification targets always come out as contiguous class ids starting
/// at 0; binary cases are normalized so the first-seen label maps to 0.
fn encode_label(col: &Column, task: Task) -> Result<Vec<f64>> {
    match task {
        Task::Regression => Ok(col
            .cells
            .iter()
            .map(|c| match c {
                Cell::Num(v) => sanitize(*v),
                Cell::Text(s) => sanitize(s.trim().parse::<f64>().unwrap_or(0.0)),
                Cell::Missing => 0.0,
            })
            .collect()),
        Task::Classification => {
            // Contiguous ids over the sorted distinct values, whether the
            // raw labels were numeric or categorical.
            let keys: Vec<String> = col.cells.iter().map(|c| c.text()).collect();
            let mut distinct: Vec<String> = {
                let set: BTreeSet<String> = keys.iter().cloned().collect();
                set.into_iter().collect()
            };
            if col.numeric {
                // Sort numeric labels numerically, not lexically
                distinct.sort_by(|a, b| {
                    let (a, b) = (
                        a.parse::<f64>().unwrap_or(f64::MAX),
                        b.parse::<f64>().unwrap_or(f64::MAX),
                    );
                    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
                });
            }

            if distinct.len() < 2 {
                return Err(MlError::InsufficientClasses {
                    found: distinct.len(),
                });
            }

            let mut ids: Vec<usize> = keys
                .iter()
                .map(|k| distinct.iter().position(|d| d == k).unwrap_or(0))
                .collect();

            // Every class needs >= 2 samples for a stratifiable split
            let mut counts = vec![0usize; distinct.len()];
            for &id in &ids {
                counts[id] += 1;
            }
            if let Some(offender) = counts.iter().position(|&c| c < 2) {
                return Err(MlError::InsufficientSamplesPerClass {
                    class: distinct[offender].clone(),
                    count: counts[offender],
                });
            }

            // Binary normalization: first-seen label -> 0
            if distinct.len() == 2 && ids[0] != 0 {
                for id in &mut ids {
                    *id = 1 - *id;
                }
            }

            Ok(ids.into_iter().map(|id| id as f64).collect())
        }
    }
}
