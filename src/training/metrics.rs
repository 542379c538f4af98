use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Confusion-matrix based classification metrics: overall accuracy, average
/// (per-class) accuracy and Cohen's kappa.
#[derive(Debug, Clone)]
pub struct ClassificationMetric {
    class_names: Vec<String>,
    matrix: Vec<Vec<usize>>,
}

impl ClassificationMetric {
    pub fn new(class_names: Vec<String>) -> Self {
        let n = class_names.len();
        Self {
            class_names,
            matrix: vec![vec![0; n]; n],
        }
    }

    pub fn reset(&mut self) {
        for row in &mut self.matrix {
            row.iter_mut().for_each(|c| *c = 0);
        }
    }

    /// Accumulates a batch of ground-truth and predicted label indices.
    pub fn update(&mut self, labels_true: &[usize], labels_pred: &[usize]) {
        for (&t, &p) in labels_true.iter().zip(labels_pred) {
            if t < self.matrix.len() && p < self.matrix.len() {
                self.matrix[t][p] += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn overall_accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let diag: usize = (0..self.matrix.len()).map(|i| self.matrix[i][i]).sum();
        diag as f64 / total as f64
    }

    /// Per-class recall; classes without samples report 0.
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        self.matrix
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let support: usize = row.iter().sum();
                if support == 0 {
                    0.0
                } else {
                    row[i] as f64 / support as f64
                }
            })
            .collect()
    }

    /// Mean of per-class accuracy over classes that have samples.
    pub fn average_accuracy(&self) -> f64 {
        let supported: Vec<f64> = self
            .matrix
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().sum::<usize>() > 0)
            .map(|(i, row)| row[i] as f64 / row.iter().sum::<usize>() as f64)
            .collect();
        if supported.is_empty() {
            0.0
        } else {
            supported.iter().sum::<f64>() / supported.len() as f64
        }
    }

    pub fn kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        let po = self.overall_accuracy();
        let pe: f64 = (0..self.matrix.len())
            .map(|i| {
                let row: usize = self.matrix[i].iter().sum();
                let col: usize = self.matrix.iter().map(|r| r[i]).sum();
                (row as f64 / n) * (col as f64 / n)
            })
            .sum();
        if (1.0 - pe).abs() < f64::EPSILON {
            0.0
        } else {
            (po - pe) / (1.0 - pe)
        }
    }

    /// Human-readable summary with per-class breakdown.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "samples: {}", self.total());
        let _ = writeln!(out, "overall accuracy: {:.4}", self.overall_accuracy());
        let _ = writeln!(out, "average accuracy: {:.4}", self.average_accuracy());
        let _ = writeln!(out, "kappa: {:.4}", self.kappa());
        for (name, acc) in self.class_names.iter().zip(self.per_class_accuracy()) {
            let _ = writeln!(out, "  {name}: {acc:.4}");
        }
        out
    }

    /// Writes the report and the confusion matrix (CSV) into `dir`.
    pub fn save_report(&self, dir: &Path, tag: &str) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("create report dir {}", dir.display()))?;
        let report_path = dir.join(format!("{tag}_report.txt"));
        fs::write(&report_path, self.report())
            .with_context(|| format!("write {}", report_path.display()))?;

        let mut csv = String::new();
        let _ = writeln!(csv, ",{}", self.class_names.join(","));
        for (name, row) in self.class_names.iter().zip(&self.matrix) {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            let _ = writeln!(csv, "{name},{}", cells.join(","));
        }
        let csv_path = dir.join(format!("{tag}_confusion.csv"));
        fs::write(&csv_path, csv).with_context(|| format!("write {}", csv_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn metric() -> ClassificationMetric {
        ClassificationMetric::new(vec!["a".into(), "b".into(), "c".into()])
    }

    #[test]
    fn overall_accuracy_counts_the_diagonal() {
        let mut m = metric();
        m.update(&[0, 0, 1, 2], &[0, 1, 1, 2]);
        assert_relative_eq!(m.overall_accuracy(), 0.75);
    }

    #[test]
    fn average_accuracy_ignores_empty_classes() {
        let mut m = metric();
        // Class 2 has no ground-truth samples.
        m.update(&[0, 0, 1, 1], &[0, 0, 1, 0]);
        assert_relative_eq!(m.average_accuracy(), 0.75);
    }

    #[test]
    fn kappa_matches_hand_computed_value() {
        let mut m = ClassificationMetric::new(vec!["a".into(), "b".into()]);
        // Confusion matrix [[3, 1], [1, 5]]: po = 0.8.
        m.update(&[0, 0, 0, 0, 1, 1, 1, 1, 1, 1], &[0, 0, 0, 1, 0, 1, 1, 1, 1, 1]);
        let po = 0.8;
        let pe = 0.4 * 0.4 + 0.6 * 0.6;
        assert_relative_eq!(m.kappa(), (po - pe) / (1.0 - pe), epsilon = 1e-9);
    }

    #[test]
    fn perfect_agreement_gives_kappa_one() {
        let mut m = metric();
        m.update(&[0, 1, 2], &[0, 1, 2]);
        assert_relative_eq!(m.kappa(), 1.0);
    }

    #[test]
    fn reset_clears_counts() {
        let mut m = metric();
        m.update(&[0, 1], &[0, 1]);
        m.reset();
        assert_eq!(m.total(), 0);
        assert_eq!(m.overall_accuracy(), 0.0);
    }

    #[test]
    fn report_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = metric();
        m.update(&[0, 1, 2], &[0, 1, 1]);
        m.save_report(dir.path(), "fold0").unwrap();
        assert!(dir.path().join("fold0_report.txt").exists());
        let csv = std::fs::read_to_string(dir.path().join("fold0_confusion.csv")).unwrap();
        assert!(csv.starts_with(",a,b,c"));
    }
}
