// src/metrics.rs
//
// Evaluation bookkeeping: confusion counts in, accuracy and per-class
// precision/recall/F1 out. Kept separate from the trainer so both the
// `evaluate` command and the per-epoch validation pass share one
// implementation.

use crate::types::ClassMap;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    pub name: String,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Number of true examples of this class.
    pub support: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub accuracy: f32,
    pub macro_precision: f32,
    pub macro_recall: f32,
    pub macro_f1: f32,
    pub per_class: Vec<ClassReport>,
}

/// Square confusion matrix, rows = true class, columns = predicted.
pub struct ConfusionAccumulator {
    counts: Vec<Vec<usize>>,
    total: usize,
}

impl ConfusionAccumulator {
    pub fn new(num_classes: usize) -> Self {
        Self {
            counts: vec![vec![0; num_classes]; num_classes],
            total: 0,
        }
    }

    pub fn record(&mut self, true_id: usize, predicted_id: usize) {
        if true_id < self.counts.len() && predicted_id < self.counts.len() {
            self.counts[true_id][predicted_id] += 1;
            self.total += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.counts.len()).map(|i| self.counts[i][i]).sum();
        correct as f32 / self.total as f32
    }

    pub fn report(&self, class_map: &ClassMap) -> EvaluationReport {
        let n = self.counts.len();
        let mut per_class = Vec::with_capacity(n);

        for c in 0..n {
            let tp = self.counts[c][c];
            let predicted: usize = (0..n).map(|t| self.counts[t][c]).sum();
            let actual: usize = self.counts[c].iter().sum();

            let precision = ratio(tp, predicted);
            let recall = ratio(tp, actual);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            per_class.push(ClassReport {
                name: class_map.name_of(c).unwrap_or("?").to_string(),
                precision,
                recall,
                f1,
                support: actual,
            });
        }

        let macro_avg = |f: fn(&ClassReport) -> f32| -> f32 {
            if per_class.is_empty() {
                0.0
            } else {
                per_class.iter().map(f).sum::<f32>() / per_class.len() as f32
            }
        };

        EvaluationReport {
            total: self.total,
            accuracy: self.accuracy(),
            macro_precision: macro_avg(|c| c.precision),
            macro_recall: macro_avg(|c| c.recall),
            macro_f1: macro_avg(|c| c.f1),
            per_class,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_class_map() -> ClassMap {
        ClassMap::from_names(vec!["hello".to_string(), "thanks".to_string()])
    }

    #[test]
    fn test_perfect_predictions() {
        let mut acc = ConfusionAccumulator::new(2);
        acc.record(0, 0);
        acc.record(0, 0);
        acc.record(1, 1);

        let report = acc.report(&two_class_map());
        assert_eq!(report.total, 3);
        assert!((report.accuracy - 1.0).abs() < 1e-6);
        assert!((report.macro_f1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hand_computed_confusion() {
        // true hello: 3 (2 right, 1 called thanks)
        // true thanks: 2 (1 right, 1 called hello)
        let mut acc = ConfusionAccumulator::new(2);
        acc.record(0, 0);
        acc.record(0, 0);
        acc.record(0, 1);
        acc.record(1, 1);
        acc.record(1, 0);

        let report = acc.report(&two_class_map());
        assert!((report.accuracy - 0.6).abs() < 1e-6);

        let hello = &report.per_class[0];
        assert_eq!(hello.support, 3);
        assert!((hello.precision - 2.0 / 3.0).abs() < 1e-6);
        assert!((hello.recall - 2.0 / 3.0).abs() < 1e-6);

        let thanks = &report.per_class[1];
        assert_eq!(thanks.support, 2);
        assert!((thanks.precision - 0.5).abs() < 1e-6);
        assert!((thanks.recall - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_absent_class_scores_zero() {
        let mut acc = ConfusionAccumulator::new(2);
        acc.record(0, 0);

        let report = acc.report(&two_class_map());
        let thanks = &report.per_class[1];
        assert_eq!(thanks.support, 0);
        assert_eq!(thanks.precision, 0.0);
        assert_eq!(thanks.recall, 0.0);
        assert_eq!(thanks.f1, 0.0);
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = ConfusionAccumulator::new(2);
        assert_eq!(acc.accuracy(), 0.0);
        assert_eq!(acc.total(), 0);
    }
}
