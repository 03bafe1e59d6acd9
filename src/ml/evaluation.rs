//! Classification metrics and stratified cross-validation

use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, RandomForestClassifier, RandomForestParams};
use crate::ml::models::{ClassMetrics, CrossValidationResult, Dataset, ModelMetrics, Prediction};
use crate::models::{CornealMeasurement, Severity, N_STAGES};
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, info};

/// Fraction of matching labels
pub fn accuracy(y_true: &[Severity], y_pred: &[Severity]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Confusion matrix with rows as true stage and columns as predicted stage
pub fn confusion_matrix(y_true: &[Severity], y_pred: &[Severity]) -> Array2<usize> {
    let mut matrix = Array2::zeros((N_STAGES, N_STAGES));
    for (t, p) in y_true.iter().zip(y_pred) {
        matrix[[t.index(), p.index()]] += 1;
    }
    matrix
}

/// F-beta from precision and recall; zero when undefined
pub fn fbeta(precision: f64, recall: f64, beta: f64) -> f64 {
    let b2 = beta * beta;
    let denom = b2 * precision + recall;
    if denom > 0.0 {
        (1.0 + b2) * precision * recall / denom
    } else {
        0.0
    }
}

/// Accuracy, per-class and support-weighted metrics
pub fn calculate_metrics(y_true: &[Severity], y_pred: &[Severity]) -> ModelMetrics {
    let n_samples = y_true.len();
    if n_samples == 0 {
        return ModelMetrics::new();
    }

    let matrix = confusion_matrix(y_true, y_pred);
    let mut per_class = BTreeMap::new();
    let mut weighted = [0.0f64; 4];

    for class_idx in 0..N_STAGES {
        let tp = matrix[[class_idx, class_idx]];
        let support: usize = matrix.row(class_idx).sum();
        let predicted: usize = matrix.column(class_idx).sum();

        let precision = if predicted > 0 {
            tp as f64 / predicted as f64
        } else {
            0.0
        };
        let recall = if support > 0 {
            tp as f64 / support as f64
        } else {
            0.0
        };
        let f1 = fbeta(precision, recall, 1.0);
        let f2 = fbeta(precision, recall, 2.0);

        let w = support as f64 / n_samples as f64;
        weighted[0] += precision * w;
        weighted[1] += recall * w;
        weighted[2] += f1 * w;
        weighted[3] += f2 * w;

        per_class.insert(
            class_idx,
            ClassMetrics {
                precision,
                recall,
                f1_score: f1,
                support,
            },
        );
    }

    ModelMetrics {
        accuracy: accuracy(y_true, y_pred),
        precision: weighted[0],
        recall: weighted[1],
        f1_score: weighted[2],
        f2_score: weighted[3],
        confusion_matrix: matrix,
        per_class_metrics: per_class,
    }
}

/// Text classification report with per-stage rows, accuracy and averages
pub fn classification_report(metrics: &ModelMetrics, digits: usize) -> String {
    let names: Vec<String> = Severity::all().iter().map(|s| s.to_string()).collect();
    let width = names
        .iter()
        .map(|n| n.len())
        .chain(std::iter::once("weighted avg".len()))
        .max()
        .unwrap_or(12);
    let total: usize = metrics.per_class_metrics.values().map(|m| m.support).sum();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>width$}  {:>9} {:>9} {:>9} {:>9}\n",
        "",
        "precision",
        "recall",
        "f1-score",
        "support",
        width = width
    );

    for index in metrics.present_labels() {
        let (Some(name), Some(class_metrics)) =
            (names.get(index), metrics.per_class_metrics.get(&index))
        else {
            continue;
        };
        let _ = writeln!(
            out,
            "{:>width$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}",
            name,
            class_metrics.precision,
            class_metrics.recall,
            class_metrics.f1_score,
            class_metrics.support,
            width = width,
            d = digits
        );
    }
    out.push('\n');

    let _ = writeln!(
        out,
        "{:>width$}  {:>9} {:>9} {:>9.d$} {:>9}",
        "accuracy",
        "",
        "",
        metrics.accuracy,
        total,
        width = width,
        d = digits
    );
    let _ = writeln!(
        out,
        "{:>width$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}",
        "macro avg",
        metrics.macro_average(|m| m.precision),
        metrics.macro_average(|m| m.recall),
        metrics.macro_average(|m| m.f1_score),
        total,
        width = width,
        d = digits
    );
    let _ = writeln!(
        out,
        "{:>width$}  {:>9.d$} {:>9.d$} {:>9.d$} {:>9}",
        "weighted avg",
        metrics.precision,
        metrics.recall,
        metrics.f1_score,
        total,
        width = width,
        d = digits
    );

    out
}

/// Confusion matrix as an aligned text table
pub fn format_confusion_matrix(matrix: &Array2<usize>) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:>12}", "true \\ pred");
    for stage in Severity::all() {
        let _ = write!(out, "{:>9}", stage.to_string());
    }
    out.push('\n');

    for (stage, row) in Severity::all().iter().zip(matrix.rows()) {
        let _ = write!(out, "{:>12}", stage.to_string());
        for count in row {
            let _ = write!(out, "{:>9}", count);
        }
        out.push('\n');
    }
    out
}

/// Stratified fold assignment: test-row indices per fold
///
/// Each class's rows are shuffled with the seed and dealt round-robin
/// across folds, continuing from where the previous class stopped, so
/// every fold holds each class's share to within one row.
pub fn stratified_folds(labels: &[Severity], n_folds: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    if n_folds < 2 {
        return Err(AppError::Validation(format!(
            "cross-validation needs at least 2 folds, got {}",
            n_folds
        )));
    }

    let mut by_class: BTreeMap<Severity, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(i);
    }

    if let Some((stage, rows)) = by_class.iter().find(|(_, rows)| rows.len() < n_folds) {
        return Err(AppError::Validation(format!(
            "n_folds={} is greater than the {} members of {}",
            n_folds,
            rows.len(),
            stage
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); n_folds];
    let mut next = 0usize;

    for rows in by_class.values_mut() {
        rows.shuffle(&mut rng);
        for &row in rows.iter() {
            folds[next % n_folds].push(row);
            next += 1;
        }
    }

    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Stratified k-fold cross-validated accuracy of a freshly fitted forest per fold
pub fn cross_validate(
    params: &RandomForestParams,
    dataset: &Dataset,
    n_folds: usize,
    seed: u64,
) -> Result<CrossValidationResult> {
    let folds = stratified_folds(&dataset.labels, n_folds, seed)?;
    info!(n_folds, n_samples = dataset.n_samples(), "Running stratified cross-validation");

    let mut fold_accuracies = Vec::with_capacity(n_folds);
    for (k, test_rows) in folds.iter().enumerate() {
        let mut is_test = vec![false; dataset.n_samples()];
        for &row in test_rows {
            is_test[row] = true;
        }
        let train_rows: Vec<usize> = (0..dataset.n_samples()).filter(|&i| !is_test[i]).collect();

        let train = dataset.subset(&train_rows);
        let test = dataset.subset(test_rows);

        let mut forest = RandomForestClassifier::new(params.clone());
        forest.fit(&train)?;
        let predictions = forest.predict(&test.features)?;
        let fold_accuracy = accuracy(&test.labels, &predictions);

        debug!(fold = k + 1, accuracy = fold_accuracy, "Fold scored");
        fold_accuracies.push(fold_accuracy);
    }

    let mean_accuracy = fold_accuracies.iter().sum::<f64>() / n_folds as f64;
    let variance = fold_accuracies
        .iter()
        .map(|a| (a - mean_accuracy).powi(2))
        .sum::<f64>()
        / n_folds as f64;

    Ok(CrossValidationResult {
        fold_accuracies,
        mean_accuracy,
        std_accuracy: variance.sqrt(),
    })
}

/// A fixed reference measurement with its expected stage
#[derive(Debug, Clone, Copy)]
pub struct ClinicalCase {
    pub name: &'static str,
    pub measurement: CornealMeasurement,
    pub expected: Severity,
}

/// Outcome of scoring one clinical case
#[derive(Debug, Clone)]
pub struct ClinicalCaseResult {
    pub case: ClinicalCase,
    pub prediction: Prediction,
}

impl ClinicalCaseResult {
    pub fn passed(&self) -> bool {
        self.prediction.stage == self.case.expected
    }
}

/// One textbook measurement per stage
pub fn clinical_cases() -> Vec<ClinicalCase> {
    let case = |name: &'static str, rm_b: f64, rm_f: f64, pachy_min: f64, expected: Severity| ClinicalCase {
        name,
        measurement: CornealMeasurement::new(rm_b, rm_f, pachy_min),
        expected,
    };
    vec![
        case("Normal (Stage 0)", 6.4, 7.7, 518.0, Severity::Normal),
        case("Mild (Stage 1)", 6.0, 7.3, 481.0, Severity::Mild),
        case("Moderate (Stage 2)", 5.7, 7.0, 448.0, Severity::Moderate),
        case("Advanced (Stage 3)", 5.1, 6.7, 391.0, Severity::Advanced),
        case("Severe (Stage 4)", 4.6, 6.0, 395.0, Severity::Severe),
    ]
}

/// Predict every clinical case with `model`
pub fn evaluate_clinical_cases(model: &RandomForestClassifier) -> Result<Vec<ClinicalCaseResult>> {
    clinical_cases()
        .into_iter()
        .map(|case| {
            let prediction = model.predict_measurement(&case.measurement)?;
            Ok(ClinicalCaseResult { case, prediction })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::generator::SyntheticDataGenerator;

    fn stages(indices: &[usize]) -> Vec<Severity> {
        indices.iter().map(|&i| Severity::from_index(i).unwrap()).collect()
    }

    #[test]
    fn test_accuracy() {
        let y_true = stages(&[0, 1, 2, 3]);
        let y_pred = stages(&[0, 1, 2, 4]);
        assert_eq!(accuracy(&y_true, &y_pred), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_confusion_matrix() {
        let y_true = stages(&[0, 0, 1, 4]);
        let y_pred = stages(&[0, 1, 1, 3]);
        let matrix = confusion_matrix(&y_true, &y_pred);

        assert_eq!(matrix[[0, 0]], 1);
        assert_eq!(matrix[[0, 1]], 1);
        assert_eq!(matrix[[1, 1]], 1);
        assert_eq!(matrix[[4, 3]], 1);
        assert_eq!(matrix.sum(), 4);
    }

    #[test]
    fn test_fbeta() {
        assert!((fbeta(0.5, 0.5, 1.0) - 0.5).abs() < 1e-12);
        // F2 leans toward recall
        assert!(fbeta(0.5, 1.0, 2.0) > fbeta(0.5, 1.0, 1.0));
        assert_eq!(fbeta(0.0, 0.0, 2.0), 0.0);
    }

    #[test]
    fn test_weighted_metrics() {
        // Stage 0: 2 of 2 right; Stage 1: 1 of 2 right; predicted 1 once as 0
        let y_true = stages(&[0, 0, 1, 1]);
        let y_pred = stages(&[0, 0, 1, 0]);
        let metrics = calculate_metrics(&y_true, &y_pred);

        let p0 = 2.0 / 3.0;
        let r1 = 0.5;
        assert!((metrics.per_class_metrics[&0].precision - p0).abs() < 1e-12);
        assert!((metrics.per_class_metrics[&1].recall - r1).abs() < 1e-12);
        assert!((metrics.precision - (p0 * 0.5 + 1.0 * 0.5)).abs() < 1e-12);
        assert!((metrics.recall - 0.75).abs() < 1e-12);
        assert_eq!(metrics.accuracy, 0.75);
        // Absent stages contribute zero without dividing by zero
        assert_eq!(metrics.per_class_metrics[&4].support, 0);
        assert_eq!(metrics.per_class_metrics[&4].precision, 0.0);
    }

    #[test]
    fn test_perfect_predictions() {
        let y = stages(&[0, 1, 2, 3, 4]);
        let metrics = calculate_metrics(&y, &y);
        assert_eq!(metrics.accuracy, 1.0);
        assert!((metrics.f1_score - 1.0).abs() < 1e-12);
        assert!((metrics.f2_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_classification_report_layout() {
        let y = stages(&[0, 1, 2, 3, 4, 0]);
        let report = classification_report(&calculate_metrics(&y, &y), 4);

        assert!(report.contains("precision"));
        assert!(report.contains("     Stage 0     1.0000    1.0000    1.0000         2"));
        assert!(report.contains("    accuracy                         1.0000         6"));
        assert!(report.contains("weighted avg"));
    }

    #[test]
    fn test_classification_report_absent_stages() {
        let y = stages(&[0, 0, 1]);
        let metrics = calculate_metrics(&y, &y);
        let report = classification_report(&metrics, 4);

        assert!(report.contains("     Stage 1     1.0000    1.0000    1.0000         1"));
        assert!(!report.contains("Stage 4"));
        assert!(report.contains("   macro avg     1.0000    1.0000    1.0000         3"));
    }

    #[test]
    fn test_format_confusion_matrix() {
        let y = stages(&[0, 4]);
        let text = format_confusion_matrix(&confusion_matrix(&y, &y));
        assert_eq!(text.lines().count(), 6);
        assert!(text.lines().next().unwrap().contains("Stage 4"));
    }

    #[test]
    fn test_stratified_folds_partition_and_balance() {
        let dataset = SyntheticDataGenerator::new(130, 42).generate().unwrap();
        let folds = stratified_folds(&dataset.labels, 6, 42).unwrap();

        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..650).collect::<Vec<_>>());

        for fold in &folds {
            assert!(fold.len() == 108 || fold.len() == 109);
            let fold_labels: Vec<Severity> = fold.iter().map(|&i| dataset.labels[i]).collect();
            for stage in Severity::all() {
                let n = fold_labels.iter().filter(|&&s| s == stage).count();
                assert!(n == 21 || n == 22, "stage {} has {} rows", stage, n);
            }
        }
    }

    #[test]
    fn test_stratified_folds_deterministic() {
        let labels = stages(&[0, 0, 0, 1, 1, 1, 2, 2, 2]);
        assert_eq!(
            stratified_folds(&labels, 3, 7).unwrap(),
            stratified_folds(&labels, 3, 7).unwrap()
        );
    }

    #[test]
    fn test_stratified_folds_validation() {
        let labels = stages(&[0, 0, 1]);
        assert!(stratified_folds(&labels, 1, 42).is_err());
        assert!(stratified_folds(&labels, 2, 42).is_err());
    }

    #[test]
    fn test_cross_validate() {
        let dataset = SyntheticDataGenerator::new(30, 42).generate().unwrap();
        let params = RandomForestParams::default().with_n_estimators(10);
        let result = cross_validate(&params, &dataset, 3, 42).unwrap();

        assert_eq!(result.fold_accuracies.len(), 3);
        assert!(result.mean_accuracy > 0.5 && result.mean_accuracy <= 1.0);
        assert!(result.std_accuracy >= 0.0);
    }

    #[test]
    fn test_clinical_cases_cover_every_stage() {
        let cases = clinical_cases();
        assert_eq!(cases.len(), N_STAGES);
        for (case, stage) in cases.iter().zip(Severity::all()) {
            assert_eq!(case.expected, stage);
        }
        assert_eq!(cases[3].measurement, CornealMeasurement::new(5.1, 6.7, 391.0));
    }

    #[test]
    fn test_evaluate_clinical_cases() {
        let dataset = SyntheticDataGenerator::new(60, 42).generate().unwrap();
        let mut forest = RandomForestClassifier::new(RandomForestParams::default().with_n_estimators(20));
        forest.fit(&dataset).unwrap();

        let results = evaluate_clinical_cases(&forest).unwrap();
        assert_eq!(results.len(), 5);
        // The Normal case sits at the Stage 0 means
        assert!(results[0].passed());
        for result in &results {
            assert!(result.prediction.confidence > 0.0);
        }
    }
}
