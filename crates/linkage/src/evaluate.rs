//! Linkage and blocking quality measures.

use crate::error::LinkageError;
use crate::model::{
    BlockingQuality, CandidatePairs, ClassifiedPairs, ConfusionMatrix, GroundTruth, LinkageQuality,
};

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Confusion matrix of a classification against the ground truth.
///
/// True matches that were never classified (never became candidates) count
/// as false negatives. TN is whatever remains of `all_comparisons`.
pub fn confusion_matrix(
    classified: &ClassifiedPairs,
    truth: &GroundTruth,
    all_comparisons: u64,
) -> Result<ConfusionMatrix, LinkageError> {
    if let Some(pair) = classified.matches.intersection(&classified.non_matches).next() {
        return Err(LinkageError::Computation(format!(
            "pair ({}, {}) is classified as both match and non-match",
            pair.0, pair.1
        )));
    }

    let tp = classified.matches.iter().filter(|p| truth.contains(p)).count() as u64;
    let fp = classified.matches.len() as u64 - tp;
    let fn_ = truth
        .iter()
        .filter(|p| !classified.matches.contains(*p))
        .count() as u64;

    let tn = all_comparisons
        .checked_sub(tp + fp + fn_)
        .ok_or_else(|| {
            LinkageError::Computation(format!(
                "{} classified/true pair(s) exceed the {all_comparisons} possible comparison(s)",
                tp + fp + fn_
            ))
        })?;

    log::debug!("confusion matrix: TP={tp}, FP={fp}, FN={fn_}, TN={tn}");
    Ok(ConfusionMatrix { tp, fp, fn_, tn })
}

/// (TP + TN) / total.
pub fn accuracy(m: &ConfusionMatrix) -> f64 {
    ratio(m.tp + m.tn, m.total())
}

/// TP / (TP + FP).
pub fn precision(m: &ConfusionMatrix) -> f64 {
    ratio(m.tp, m.tp + m.fp)
}

/// TP / (TP + FN).
pub fn recall(m: &ConfusionMatrix) -> f64 {
    ratio(m.tp, m.tp + m.fn_)
}

/// Harmonic mean of precision and recall.
pub fn f_measure(m: &ConfusionMatrix) -> f64 {
    let p = precision(m);
    let r = recall(m);
    if p + r == 0.0 {
        return 0.0;
    }
    2.0 * p * r / (p + r)
}

pub fn linkage_quality(m: &ConfusionMatrix) -> LinkageQuality {
    LinkageQuality {
        accuracy: accuracy(m),
        precision: precision(m),
        recall: recall(m),
        f_measure: f_measure(m),
    }
}

impl LinkageQuality {
    /// Per-metric mean. An empty slice yields all zeros.
    pub fn mean(items: &[LinkageQuality]) -> LinkageQuality {
        if items.is_empty() {
            return LinkageQuality::default();
        }
        let n = items.len() as f64;
        let sum = |f: fn(&LinkageQuality) -> f64| items.iter().map(f).sum::<f64>() / n;
        LinkageQuality {
            accuracy: sum(|q| q.accuracy),
            precision: sum(|q| q.precision),
            recall: sum(|q| q.recall),
            f_measure: sum(|q| q.f_measure),
        }
    }
}

/// 1 - candidates / all comparisons.
pub fn reduction_ratio(num_candidates: u64, all_comparisons: u64) -> f64 {
    if all_comparisons == 0 {
        return 0.0;
    }
    1.0 - num_candidates as f64 / all_comparisons as f64
}

/// Share of true matches that survived blocking.
pub fn pairs_completeness(candidates: &CandidatePairs, truth: &GroundTruth) -> f64 {
    let found = truth.iter().filter(|p| candidates.contains(*p)).count() as u64;
    ratio(found, truth.len() as u64)
}

/// Share of candidates that are true matches.
pub fn pairs_quality(candidates: &CandidatePairs, truth: &GroundTruth) -> f64 {
    let found = truth.iter().filter(|p| candidates.contains(*p)).count() as u64;
    ratio(found, candidates.len() as u64)
}

pub fn blocking_quality(
    candidates: &CandidatePairs,
    truth: &GroundTruth,
    all_comparisons: u64,
) -> BlockingQuality {
    BlockingQuality {
        reduction_ratio: reduction_ratio(candidates.len() as u64, all_comparisons),
        pairs_completeness: pairs_completeness(candidates, truth),
        pairs_quality: pairs_quality(candidates, truth),
    }
}
