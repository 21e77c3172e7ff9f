//! Task metrics
//!
//! Classification metrics treat targets as integer class ids. Precision,
//! recall, and F1 are support-weighted across classes; a class with no
//! positive predictions contributes 0 rather than NaN.

use ndarray::Array1;
use std::collections::BTreeMap;

pub fn accuracy(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth
        .iter()
        .zip(pred.iter())
        .filter(|(t, p)| **t as i64 == **p as i64)
        .count();
    correct as f64 / truth.len() as f64
}

/// Per-class confusion counts: (true positives, false positives, support).
fn class_counts(truth: &Array1<f64>, pred: &Array1<f64>) -> BTreeMap<i64, (f64, f64, f64)> {
    let mut counts: BTreeMap<i64, (f64, f64, f64)> = BTreeMap::new();
    for (&t, &p) in truth.iter().zip(pred.iter()) {
        let (t, p) = (t as i64, p as i64);
        counts.entry(t).or_default().2 += 1.0;
        if t == p {
            counts.entry(t).or_default().0 += 1.0;
        } else {
            counts.entry(p).or_default().1 += 1.0;
        }
    }
    counts
}

pub fn weighted_precision(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    weighted_over_classes(truth, pred, |(tp, fp, _)| {
        if tp + fp > 0.0 {
            tp / (tp + fp)
        } else {
            0.0
        }
    })
}

pub fn weighted_recall(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    weighted_over_classes(truth, pred, |(tp, _, support)| {
        if support > 0.0 {
            tp / support
        } else {
            0.0
        }
    })
}

pub fn weighted_f1(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    weighted_over_classes(truth, pred, |(tp, fp, support)| {
        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if support > 0.0 { tp / support } else { 0.0 };
        if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        }
    })
}

fn weighted_over_classes<F>(truth: &Array1<f64>, pred: &Array1<f64>, per_class: F) -> f64
where
    F: Fn((f64, f64, f64)) -> f64,
{
    let n = truth.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    class_counts(truth, pred)
        .values()
        .map(|&counts| per_class(counts) * counts.2 / n)
        .sum()
}

pub fn mean_squared_error(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    truth
        .iter()
        .zip(pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / truth.len() as f64
}

pub fn mean_absolute_error(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    truth
        .iter()
        .zip(pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / truth.len() as f64
}

/// Coefficient of determination. A constant target yields 0 when predicted
/// exactly and a large negative value otherwise, matching the convention of
/// clamping nothing.
pub fn r2_score(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mean = truth.mean().unwrap_or(0.0);
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = truth
        .iter()
        .zip(pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            return 0.0;
        }
        return f64::NEG_INFINITY;
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let truth = array![0.0, 1.0, 1.0, 0.0];
        let pred = array![0.0, 1.0, 0.0, 0.0];
        assert_abs_diff_eq!(accuracy(&truth, &pred), 0.75);
    }

    #[test]
    fn test_perfect_prediction_metrics() {
        let truth = array![0.0, 1.0, 2.0, 1.0];
        assert_abs_diff_eq!(weighted_precision(&truth, &truth), 1.0);
        assert_abs_diff_eq!(weighted_recall(&truth, &truth), 1.0);
        assert_abs_diff_eq!(weighted_f1(&truth, &truth), 1.0);
    }

    #[test]
    fn test_weighted_precision_matches_hand_computation() {
        // truth: two 0s, two 1s; pred: everything 1
        let truth = array![0.0, 0.0, 1.0, 1.0];
        let pred = array![1.0, 1.0, 1.0, 1.0];
        // class 0: no predictions -> precision 0; class 1: 2/4 = 0.5
        // weighted: 0 * 0.5 + 0.5 * 0.5 = 0.25
        assert_abs_diff_eq!(weighted_precision(&truth, &pred), 0.25);
        assert_abs_diff_eq!(weighted_recall(&truth, &pred), 0.5);
    }

    #[test]
    fn test_zero_division_yields_zero_not_nan() {
        let truth = array![0.0, 0.0];
        let pred = array![1.0, 1.0];
        assert_eq!(weighted_precision(&truth, &pred), 0.0);
        assert_eq!(weighted_f1(&truth, &pred), 0.0);
    }

    #[test]
    fn test_regression_metrics() {
        let truth = array![1.0, 2.0, 3.0];
        let pred = array![1.0, 2.0, 4.0];
        assert_abs_diff_eq!(mean_squared_error(&truth, &pred), 1.0 / 3.0);
        assert_abs_diff_eq!(mean_absolute_error(&truth, &pred), 1.0 / 3.0);
        assert_abs_diff_eq!(r2_score(&truth, &truth), 1.0);
        assert!(r2_score(&truth, &pred) < 1.0);
    }

    #[test]
    fn test_r2_constant_target() {
        let truth = array![5.0, 5.0, 5.0];
        assert_eq!(r2_score(&truth, &truth), 0.0);
    }
}
