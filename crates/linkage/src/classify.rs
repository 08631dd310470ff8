//! Rule-based pair classification and cross-validation splits.
//!
//! Every classifier is total over its input: each pair lands in exactly one of
//! `matches` / `non_matches`.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::compare::ComparisonSpec;
use crate::error::LinkageError;
use crate::model::{ClassifiedPairs, Fold, GroundTruth, PairId, RecordStore, SimilarityVectors};

fn check_threshold(threshold: f64) -> Result<(), LinkageError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(LinkageError::Config(format!(
            "similarity threshold must be in [0, 1], got {threshold}"
        )));
    }
    Ok(())
}

fn partition(vectors: &SimilarityVectors, is_match: impl Fn(&[f64]) -> bool) -> ClassifiedPairs {
    let mut out = ClassifiedPairs::default();
    for (pair, vector) in vectors {
        if is_match(vector) {
            out.matches.insert(pair.clone());
        } else {
            out.non_matches.insert(pair.clone());
        }
    }
    log::debug!(
        "classified {} pair(s): {} match(es), {} non-match(es)",
        vectors.len(),
        out.matches.len(),
        out.non_matches.len()
    );
    out
}

fn mean(vector: &[f64]) -> f64 {
    if vector.is_empty() {
        return 0.0;
    }
    vector.iter().sum::<f64>() / vector.len() as f64
}

/// Match iff every similarity is exactly 1.0.
pub fn exact_classify(vectors: &SimilarityVectors) -> ClassifiedPairs {
    partition(vectors, |v| v.iter().all(|&s| s == 1.0))
}

/// Match iff the mean similarity reaches `threshold`.
pub fn threshold_classify(
    vectors: &SimilarityVectors,
    threshold: f64,
) -> Result<ClassifiedPairs, LinkageError> {
    check_threshold(threshold)?;
    Ok(partition(vectors, |v| mean(v) >= threshold))
}

/// Match iff every similarity reaches `threshold`.
pub fn min_threshold_classify(
    vectors: &SimilarityVectors,
    threshold: f64,
) -> Result<ClassifiedPairs, LinkageError> {
    check_threshold(threshold)?;
    Ok(partition(vectors, |v| v.iter().all(|&s| s >= threshold)))
}

/// Match iff the weighted mean similarity reaches `threshold`.
pub fn weighted_similarity_classify(
    vectors: &SimilarityVectors,
    weights: &[f64],
    threshold: f64,
) -> Result<ClassifiedPairs, LinkageError> {
    check_threshold(threshold)?;
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(LinkageError::Config("weights must be finite and non-negative".into()));
    }
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        return Err(LinkageError::Config("weights must have a positive sum".into()));
    }
    if let Some((pair, vector)) = vectors.iter().find(|(_, v)| v.len() != weights.len()) {
        return Err(LinkageError::Config(format!(
            "weight vector has {} entries but pair ({}, {}) has {} similarities",
            weights.len(),
            pair.0,
            pair.1,
            vector.len()
        )));
    }

    Ok(partition(vectors, |v| {
        let weighted: f64 = v.iter().zip(weights).map(|(s, w)| s * w).sum();
        weighted / weight_sum >= threshold
    }))
}

/// A configured rule-based classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleClassifier {
    Exact,
    Threshold(f64),
    MinThreshold(f64),
    Weighted { weights: Vec<f64>, threshold: f64 },
}

impl RuleClassifier {
    pub fn classify(&self, vectors: &SimilarityVectors) -> Result<ClassifiedPairs, LinkageError> {
        match self {
            Self::Exact => Ok(exact_classify(vectors)),
            Self::Threshold(t) => threshold_classify(vectors, *t),
            Self::MinThreshold(t) => min_threshold_classify(vectors, *t),
            Self::Weighted { weights, threshold } => {
                weighted_similarity_classify(vectors, weights, *threshold)
            }
        }
    }
}

/// Weight per comparison from the distinctness of its attribute values.
///
/// Raw weight = distinct non-empty values / non-empty values, pooled over
/// both datasets; the result is normalized to sum to 1. An attribute with no
/// values gets weight 0.
pub fn automatic_weights(
    records_a: &RecordStore,
    records_b: &RecordStore,
    specs: &[ComparisonSpec],
) -> Result<Vec<f64>, LinkageError> {
    let mut raw = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut distinct: BTreeSet<&str> = BTreeSet::new();
        let mut total = 0usize;
        for record in records_a.iter() {
            let value = record.value(spec.attribute_a)?;
            if !value.is_empty() {
                distinct.insert(value);
                total += 1;
            }
        }
        for record in records_b.iter() {
            let value = record.value(spec.attribute_b())?;
            if !value.is_empty() {
                distinct.insert(value);
                total += 1;
            }
        }
        raw.push(if total == 0 { 0.0 } else { distinct.len() as f64 / total as f64 });
    }

    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        for w in &mut raw {
            *w /= sum;
        }
    }
    log::info!("automatic weights: {raw:?}");
    Ok(raw)
}

/// Split similarity vectors into `k` cross-validation folds.
///
/// True matches found among the vectors are shuffled with `seed` and dealt
/// round-robin first so every fold gets a share of positives; the remaining
/// pairs follow round-robin in pair order.
pub fn kfold_split(
    vectors: &SimilarityVectors,
    truth: &GroundTruth,
    k: usize,
    seed: u64,
) -> Result<Vec<Fold>, LinkageError> {
    if k < 2 {
        return Err(LinkageError::Config(format!("fold count must be at least 2, got {k}")));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut positives: Vec<&PairId> = truth.iter().filter(|p| vectors.contains_key(*p)).collect();
    positives.shuffle(&mut rng);

    let mut assignment: Vec<SimilarityVectors> = vec![SimilarityVectors::new(); k];
    for (i, pair) in positives.iter().enumerate() {
        assignment[i % k].insert((*pair).clone(), vectors[*pair].clone());
    }
    let rest = vectors.iter().filter(|(pair, _)| !truth.contains(pair));
    for (i, (pair, vector)) in rest.enumerate() {
        assignment[i % k].insert(pair.clone(), vector.clone());
    }

    let folds = (0..k)
        .map(|i| {
            let test = assignment[i].clone();
            let train: SimilarityVectors = assignment
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, fold)| fold.iter().map(|(p, v)| (p.clone(), v.clone())))
                .collect();
            let (ground_truth, all_comparisons) = fold_universe(truth, &test);
            Fold { train, test, ground_truth, all_comparisons }
        })
        .collect();
    Ok(folds)
}

/// True matches whose ids both occur in `test`, and |A ids| × |B ids| of `test`.
fn fold_universe(truth: &GroundTruth, test: &SimilarityVectors) -> (GroundTruth, u64) {
    let ids_a: BTreeSet<&str> = test.keys().map(|(a, _)| a.as_str()).collect();
    let ids_b: BTreeSet<&str> = test.keys().map(|(_, b)| b.as_str()).collect();
    let subset = GroundTruth::new(
        truth
            .iter()
            .filter(|(a, b)| ids_a.contains(a.as_str()) && ids_b.contains(b.as_str()))
            .cloned(),
    );
    (subset, ids_a.len() as u64 * ids_b.len() as u64)
}
