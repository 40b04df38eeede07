// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for binary classification over encoded labels
//!
//! Class 1 is treated as the positive class in the confusion matrix.
//! Precision, recall and F1 in [`ClassificationReport`] are support-weighted
//! averages over both classes; undefined ratios count as 0.

use serde::{Deserialize, Serialize};

/// Confusion matrix for binary classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Class 1 predicted as 1
    pub tp: usize,
    /// Class 0 predicted as 0
    pub tn: usize,
    /// Class 0 predicted as 1
    pub fp: usize,
    /// Class 1 predicted as 0
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Create from predicted and true class indices
    pub fn from_predictions(predictions: &[u8], ground_truth: &[u8]) -> Self {
        assert_eq!(predictions.len(), ground_truth.len(), "Prediction and ground truth lengths must match");

        let mut matrix = Self::default();

        for (pred, truth) in predictions.iter().zip(ground_truth.iter()) {
            match (*pred, *truth) {
                (1, 1) => matrix.tp += 1,
                (0, 0) => matrix.tn += 1,
                (1, 0) => matrix.fp += 1,
                (0, 1) => matrix.fn_ += 1,
                _ => {}
            }
        }

        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Accuracy: (TP + TN) / Total
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Per-class metrics for class `index` (0 or 1)
    pub fn class_metrics(&self, index: u8) -> ClassMetrics {
        let (hit, false_alarm, miss) = if index == 1 {
            (self.tp, self.fp, self.fn_)
        } else {
            (self.tn, self.fn_, self.fp)
        };

        let precision = ratio(hit, hit + false_alarm);
        let recall = ratio(hit, hit + miss);

        ClassMetrics {
            precision,
            recall,
            f1_score: harmonic_mean(precision, recall),
            support: hit + miss,
        }
    }

    /// Matthews Correlation Coefficient, from -1 to 1
    pub fn mcc(&self) -> f64 {
        let tp = self.tp as f64;
        let tn = self.tn as f64;
        let fp = self.fp as f64;
        let fn_ = self.fn_ as f64;

        let numerator = tp * tn - fp * fn_;
        let denominator = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();

        if denominator == 0.0 {
            return 0.0;
        }
        numerator / denominator
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Held-out evaluation summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: f64,
    /// Support-weighted precision
    pub precision: f64,
    /// Support-weighted recall
    pub recall: f64,
    /// Support-weighted F1
    pub f1_score: f64,
    pub mcc: f64,
    pub support: usize,
    /// Indexed by class: `per_class[0]` is class 0
    pub per_class: [ClassMetrics; 2],
    /// Raw label names in class order
    pub class_names: [String; 2],
}

impl ClassificationReport {
    pub fn from_predictions(predictions: &[u8], ground_truth: &[u8], class_names: [String; 2]) -> Self {
        let cm = ConfusionMatrix::from_predictions(predictions, ground_truth);
        let per_class = [cm.class_metrics(0), cm.class_metrics(1)];
        let support = cm.total();

        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if support == 0 {
                return 0.0;
            }
            per_class
                .iter()
                .map(|m| f(m) * m.support as f64)
                .sum::<f64>()
                / support as f64
        };

        Self {
            accuracy: cm.accuracy(),
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1_score: weighted(|m| m.f1_score),
            mcc: cm.mcc(),
            support,
            per_class,
            class_names,
            confusion_matrix: cm,
        }
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let cm = &self.confusion_matrix;
        let [name0, name1] = &self.class_names;
        let width = name0.len().max(name1.len()).max(6);

        let mut output = format!(
            r#"Classification Report
=====================
Accuracy:           {:.4} ({:.2}%)
Precision (wtd):    {:.4}
Recall (wtd):       {:.4}
F1 Score (wtd):     {:.4}
MCC:                {:.4}
Support:            {}

Per-Class Metrics:
"#,
            self.accuracy,
            self.accuracy * 100.0,
            self.precision,
            self.recall,
            self.f1_score,
            self.mcc,
            self.support,
        );

        for (name, m) in self.class_names.iter().zip(&self.per_class) {
            output.push_str(&format!(
                "  {:<width$}  P={:.4} R={:.4} F1={:.4} (n={})\n",
                name,
                m.precision,
                m.recall,
                m.f1_score,
                m.support,
                width = width
            ));
        }

        output.push_str(&format!(
            "\nConfusion Matrix (rows = actual, columns = predicted):\n  {:<w$}  {:>w$}  {:>w$}\n  {:<w$}  {:>w$}  {:>w$}\n  {:<w$}  {:>w$}  {:>w$}\n",
            "", name0, name1,
            name0, cm.tn, cm.fp,
            name1, cm.fn_, cm.tp,
            w = width
        ));

        output
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        return 0.0;
    }
    2.0 * a * b / (a + b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> [String; 2] {
        ["FALSE".to_string(), "TRUE".to_string()]
    }

    #[test]
    fn test_confusion_matrix_perfect() {
        let predictions = vec![1, 1, 0, 0];
        let ground_truth = vec![1, 1, 0, 0];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth);

        assert_eq!(cm.tp, 2);
        assert_eq!(cm.tn, 2);
        assert_eq!(cm.fp, 0);
        assert_eq!(cm.fn_, 0);
        assert!((cm.accuracy() - 1.0).abs() < 1e-6);
        assert!((cm.mcc() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_confusion_matrix_worst() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1], &[1, 1, 0, 0]);

        assert_eq!(cm.fp, 2);
        assert_eq!(cm.fn_, 2);
        assert!(cm.accuracy().abs() < 1e-6);
        assert!((cm.mcc() - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_metrics() {
        // truth: three 0s, one 1; one 0 mislabeled as 1
        let predictions = vec![0, 0, 1, 1];
        let ground_truth = vec![0, 0, 0, 1];

        let report = ClassificationReport::from_predictions(&predictions, &ground_truth, names());

        // class 0: P=1, R=2/3, F1=0.8, n=3; class 1: P=0.5, R=1, F1=2/3, n=1
        assert!((report.accuracy - 0.75).abs() < 1e-12);
        assert!((report.precision - (3.0 * 1.0 + 0.5) / 4.0).abs() < 1e-12);
        assert!((report.recall - (2.0 + 1.0) / 4.0).abs() < 1e-12);
        assert!((report.f1_score - (3.0 * 0.8 + 2.0 / 3.0) / 4.0).abs() < 1e-12);
        assert_eq!(report.per_class[0].support, 3);
        assert_eq!(report.per_class[1].support, 1);
    }

    #[test]
    fn test_zero_division_yields_zero() {
        // Class 1 never predicted
        let report = ClassificationReport::from_predictions(&[0, 0], &[0, 1], names());
        assert_eq!(report.per_class[1].precision, 0.0);
        assert_eq!(report.per_class[1].f1_score, 0.0);

        let empty = ClassificationReport::from_predictions(&[], &[], names());
        assert_eq!(empty.accuracy, 0.0);
        assert_eq!(empty.f1_score, 0.0);
    }

    #[test]
    fn test_classification_report_format() {
        let report = ClassificationReport::from_predictions(&[1, 1, 0, 0], &[1, 0, 0, 0], names());
        let formatted = report.format();

        assert!(formatted.contains("Classification Report"));
        assert!(formatted.contains("Accuracy"));
        assert!(formatted.contains("Confusion Matrix"));
        assert!(formatted.contains("TRUE"));
    }
}
