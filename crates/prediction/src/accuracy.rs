//! Accuracy metrics over `(prediction, actual)` pairs.
//!
//! Both sides of a pair are snapped to the dataset's rating scale before they
//! are compared, so a prediction of 3.8 on the MovieLens scale counts as 4.0.
//!
//! - [`rmse`]: root mean squared error
//! - [`BinaryConfusion`]: ratings split at a threshold into "liked" / "disliked"
//! - [`ConfusionMatrix`]: one class per level of the scale

use data_loader::RatingScale;
use serde::Serialize;

/// Ratings at or above this count as "liked" in threshold metrics
pub const DEFAULT_THRESHOLD: f64 = 3.5;

/// Root mean squared error of snapped predictions, `None` for no pairs
pub fn rmse(pairs: &[(f64, f64)], scale: &RatingScale) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }
    let sum: f64 = pairs
        .iter()
        .map(|&(prediction, actual)| {
            let diff = scale.snap(actual) - scale.snap(prediction);
            diff * diff
        })
        .sum();
    Some((sum / pairs.len() as f64).sqrt())
}

/// Collapse a rating to the lowest level below `threshold`, the highest otherwise
pub fn threshold_round(value: f64, threshold: f64, scale: &RatingScale) -> f64 {
    if value < threshold {
        scale.lowest() as f64
    } else {
        scale.highest() as f64
    }
}

/// Two-class confusion counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BinaryConfusion {
    pub true_positive: u64,
    pub false_negative: u64,
    pub false_positive: u64,
    pub true_negative: u64,
}

impl BinaryConfusion {
    /// Count pairs after threshold rounding; "positive" is a liked movie
    pub fn from_threshold(pairs: &[(f64, f64)], threshold: f64) -> Self {
        let mut counts = Self::default();
        for &(prediction, actual) in pairs {
            match (prediction >= threshold, actual >= threshold) {
                (true, true) => counts.true_positive += 1,
                (false, true) => counts.false_negative += 1,
                (true, false) => counts.false_positive += 1,
                (false, false) => counts.true_negative += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u64 {
        self.true_positive + self.false_negative + self.false_positive + self.true_negative
    }

    pub fn metrics(&self) -> BinaryMetrics {
        BinaryMetrics::from_confusion(self)
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 { 0.0 } else { numerator / denominator }
}

/// Classification metrics derived from a [`BinaryConfusion`].
///
/// Every ratio with a zero denominator is reported as `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BinaryMetrics {
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub informedness: f64,
    pub markedness: f64,
    pub f1: f64,
    pub mcc: f64,
    pub precision: f64,
    pub recall: f64,
    pub specificity: f64,
    pub npv: f64,
}

impl BinaryMetrics {
    pub fn from_confusion(c: &BinaryConfusion) -> Self {
        let tp = c.true_positive as f64;
        let fn_ = c.false_negative as f64;
        let fp = c.false_positive as f64;
        let tn = c.true_negative as f64;

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let specificity = ratio(tn, fp + tn);
        let npv = ratio(tn, tn + fn_);

        let mcc_denominator = (tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_);
        let mcc = if mcc_denominator > 0.0 {
            (tp * tn - fp * fn_) / mcc_denominator.sqrt()
        } else {
            0.0
        };

        Self {
            accuracy: ratio(tp + tn, tp + fn_ + fp + tn),
            balanced_accuracy: (recall + specificity) / 2.0,
            informedness: recall + specificity - 1.0,
            markedness: precision + npv - 1.0,
            f1: ratio(2.0 * precision * recall, precision + recall),
            mcc,
            precision,
            recall,
            specificity,
            npv,
        }
    }
}

/// Multi-class confusion matrix with one class per level of the scale.
///
/// Rows are actual classes, columns predicted classes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    levels: Vec<f32>,
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn from_predictions(pairs: &[(f64, f64)], scale: &RatingScale) -> Self {
        let n = scale.len();
        let mut counts = vec![vec![0u64; n]; n];
        for &(prediction, actual) in pairs {
            counts[scale.level_index(actual)][scale.level_index(prediction)] += 1;
        }
        Self {
            levels: scale.levels(),
            counts,
        }
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    /// Count of pairs with the given actual and predicted class indices
    pub fn count(&self, actual: usize, predicted: usize) -> u64 {
        self.counts[actual][predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Share of pairs on the diagonal
    pub fn accuracy(&self) -> f64 {
        let diagonal: u64 = (0..self.counts.len()).map(|i| self.counts[i][i]).sum();
        ratio(diagonal as f64, self.total() as f64)
    }

    /// Binary view of one class against all others
    pub fn one_against_all(&self, class: usize) -> BinaryConfusion {
        let tp = self.counts[class][class];
        let actual: u64 = self.counts[class].iter().sum();
        let predicted: u64 = self.counts.iter().map(|row| row[class]).sum();
        BinaryConfusion {
            true_positive: tp,
            false_negative: actual - tp,
            false_positive: predicted - tp,
            true_negative: self.total() + tp - actual - predicted,
        }
    }

    /// Metrics of every class against the rest, in scale order
    pub fn per_class_metrics(&self) -> Vec<BinaryMetrics> {
        (0..self.counts.len())
            .map(|class| self.one_against_all(class).metrics())
            .collect()
    }
}

/// Everything the accuracy layer can say about a batch of predictions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub predictions: usize,
    pub rmse: Option<f64>,
    pub threshold: f64,
    pub threshold_metrics: BinaryMetrics,
    pub class_accuracy: f64,
}

impl AccuracyReport {
    pub fn new(pairs: &[(f64, f64)], scale: &RatingScale, threshold: f64) -> Self {
        Self {
            predictions: pairs.len(),
            rmse: rmse(pairs, scale),
            threshold,
            threshold_metrics: BinaryConfusion::from_threshold(pairs, threshold).metrics(),
            class_accuracy: ConfusionMatrix::from_predictions(pairs, scale).accuracy(),
        }
    }
}
