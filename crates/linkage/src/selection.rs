//! Supervised blocking-key selection.
//!
//! Picks a small disjunctive set of blocking keys from a candidate pool: the
//! pool is filtered by block size, ranked by Fisher score over a labeled
//! sample, and walked greedily, keeping a key only when it covers a sampled
//! true match no earlier key covered.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::blocking::{build_blocks, max_block_size};
use crate::error::LinkageError;
use crate::keys::{BlockingKey, KeyFunction};
use crate::model::{GroundTruth, PairId, RecordId, RecordStore, ScoredKey, SelectionReport};

/// Tuning knobs of the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorParams {
    /// Number of positive (and negative) sample pairs.
    pub training_size: usize,
    /// Allowed fraction of sampled positives left uncovered.
    pub eps: f64,
    /// Maximum block size as a fraction of the larger dataset.
    pub max_block_size_ratio: f64,
    pub seed: u64,
    /// Upper bound on (pair, candidate) feature evaluations.
    pub max_feature_iterations: Option<usize>,
}

impl Default for SelectorParams {
    fn default() -> Self {
        Self {
            training_size: 100,
            eps: 0.1,
            max_block_size_ratio: 0.5,
            seed: 42,
            max_feature_iterations: None,
        }
    }
}

impl SelectorParams {
    pub fn validate(&self) -> Result<(), LinkageError> {
        if self.training_size == 0 {
            return Err(LinkageError::Config("training_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.eps) {
            return Err(LinkageError::Config(format!(
                "eps must be in [0, 1], got {}",
                self.eps
            )));
        }
        if !(self.max_block_size_ratio > 0.0) {
            return Err(LinkageError::Config(format!(
                "max_block_size_ratio must be > 0, got {}",
                self.max_block_size_ratio
            )));
        }
        Ok(())
    }
}

/// Every function applied to every attribute, functions outermost.
pub fn candidate_pool(functions: &[KeyFunction], attributes: &[usize]) -> Vec<BlockingKey> {
    functions
        .iter()
        .flat_map(|f| attributes.iter().map(move |&a| f.key(a)))
        .collect()
}

/// Labeled sample for scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSample {
    pub positives: Vec<PairId>,
    pub negatives: Vec<PairId>,
}

/// Draw the labeled sample.
///
/// Positives are the first `training_size` true matches (in pair order) whose
/// records exist in both stores. Negatives pair the A ids and B ids after
/// shuffling both lists with one seeded generator, dropping true matches.
pub fn generate_samples(
    records_a: &RecordStore,
    records_b: &RecordStore,
    truth: &GroundTruth,
    training_size: usize,
    seed: u64,
) -> TrainingSample {
    let mut skipped = 0usize;
    let positives: Vec<PairId> = truth
        .iter()
        .filter(|(a, b)| {
            let present = records_a.contains(a) && records_b.contains(b);
            if !present {
                skipped += 1;
            }
            present
        })
        .take(training_size)
        .cloned()
        .collect();
    if skipped > 0 {
        log::warn!("{skipped} ground-truth pair(s) reference unknown records and were not sampled");
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut ids_a: Vec<&RecordId> = records_a.ids().collect();
    let mut ids_b: Vec<&RecordId> = records_b.ids().collect();
    ids_a.shuffle(&mut rng);
    ids_b.shuffle(&mut rng);

    let negatives: Vec<PairId> = ids_a
        .into_iter()
        .zip(ids_b)
        .filter(|(a, b)| !truth.contains_either(a, b))
        .take(training_size)
        .map(|(a, b)| (a.clone(), b.clone()))
        .collect();

    TrainingSample { positives, negatives }
}

/// Binary agreement matrix, one row per pair and one column per candidate.
struct FeatureMatrix {
    rows: Vec<Vec<u8>>,
}

/// Shared evaluation budget across the positive and negative matrices.
struct Budget {
    remaining: Option<usize>,
    used: usize,
    exhausted: bool,
}

impl Budget {
    fn new(limit: Option<usize>) -> Self {
        Self { remaining: limit, used: 0, exhausted: false }
    }

    fn take(&mut self) -> bool {
        match self.remaining.as_mut() {
            Some(0) => {
                self.exhausted = true;
                false
            }
            Some(n) => {
                *n -= 1;
                self.used += 1;
                true
            }
            None => {
                self.used += 1;
                true
            }
        }
    }
}

fn feature_matrix(
    records_a: &RecordStore,
    records_b: &RecordStore,
    pairs: &[PairId],
    candidates: &[BlockingKey],
    budget: &mut Budget,
) -> Result<FeatureMatrix, LinkageError> {
    let mut rows = Vec::with_capacity(pairs.len());
    for (id_a, id_b) in pairs {
        let rec_a = records_a.require(id_a)?;
        let rec_b = records_b.require(id_b)?;
        let mut row = vec![0u8; candidates.len()];
        for (cell, key) in row.iter_mut().zip(candidates) {
            if !budget.take() {
                break;
            }
            if key.evaluate(rec_a)? == key.evaluate(rec_b)? {
                *cell = 1;
            }
        }
        rows.push(row);
    }
    Ok(FeatureMatrix { rows })
}

/// Population mean and variance of one column.
fn column_moments(matrix: &FeatureMatrix, column: usize) -> (f64, f64) {
    let n = matrix.rows.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = matrix.rows.iter().map(|r| f64::from(r[column])).sum::<f64>() / n as f64;
    let var = matrix
        .rows
        .iter()
        .map(|r| (f64::from(r[column]) - mean).powi(2))
        .sum::<f64>()
        / n as f64;
    (mean, var)
}

/// Fisher discriminant of one binary feature. 0 when both classes have zero variance.
pub fn fisher_score(mean_pos: f64, var_pos: f64, mean_neg: f64, var_neg: f64) -> f64 {
    let denominator = var_pos + var_neg;
    if denominator == 0.0 {
        return 0.0;
    }
    (mean_pos - mean_neg).powi(2) / denominator
}

/// Select a disjunctive blocking scheme from `pool`.
///
/// Returns the selected keys in selection order together with a report of
/// every intermediate count.
pub fn select_blocking_keys(
    records_a: &RecordStore,
    records_b: &RecordStore,
    pool: &[BlockingKey],
    truth: &GroundTruth,
    params: &SelectorParams,
) -> Result<(Vec<BlockingKey>, SelectionReport), LinkageError> {
    if pool.is_empty() {
        return Err(LinkageError::Config("blocking key candidate pool is empty".into()));
    }
    params.validate()?;
    records_a.ensure_non_empty("A")?;
    records_b.ensure_non_empty("B")?;

    let sample = generate_samples(records_a, records_b, truth, params.training_size, params.seed);
    if sample.positives.is_empty() {
        return Err(LinkageError::Data(
            "no ground-truth pair references records in both datasets".into(),
        ));
    }

    // Size filtering
    let size_limit = params.max_block_size_ratio * records_a.len().max(records_b.len()) as f64;
    let mut filtered = Vec::with_capacity(pool.len());
    for key in pool {
        let slice = std::slice::from_ref(key);
        let largest = max_block_size(&build_blocks(records_a, slice)?)
            .max(max_block_size(&build_blocks(records_b, slice)?));
        if largest as f64 <= size_limit {
            filtered.push(key.clone());
        } else {
            log::debug!("dropping candidate {key}: max block size {largest} exceeds {size_limit:.1}");
        }
    }
    log::info!(
        "blocking key candidates: {} in pool, {} after size filtering",
        pool.len(),
        filtered.len()
    );

    // Scoring
    let mut budget = Budget::new(params.max_feature_iterations);
    let pos = feature_matrix(records_a, records_b, &sample.positives, &filtered, &mut budget)?;
    let neg = feature_matrix(records_a, records_b, &sample.negatives, &filtered, &mut budget)?;
    if budget.exhausted {
        log::warn!(
            "feature construction capped after {} evaluation(s); remaining cells count as disagreement",
            budget.used
        );
    }

    let scores: Vec<f64> = (0..filtered.len())
        .map(|j| {
            let (mean_pos, var_pos) = column_moments(&pos, j);
            let (mean_neg, var_neg) = column_moments(&neg, j);
            fisher_score(mean_pos, var_pos, mean_neg, var_neg)
        })
        .collect();

    // Greedy selection, stable on pool order
    let mut order: Vec<usize> = (0..filtered.len()).collect();
    order.sort_by(|&x, &y| scores[y].total_cmp(&scores[x]));

    let positives = sample.positives.len();
    let allowed_uncovered = params.eps * positives as f64;
    let mut covered: BTreeSet<usize> = BTreeSet::new();
    let mut selected = Vec::new();
    for j in order {
        let before = covered.len();
        covered.extend(
            pos.rows
                .iter()
                .enumerate()
                .filter(|(_, row)| row[j] == 1)
                .map(|(i, _)| i),
        );
        if covered.len() > before {
            log::debug!(
                "selected {} (score {:.4}), covers {} new positive(s)",
                filtered[j],
                scores[j],
                covered.len() - before
            );
            selected.push(filtered[j].clone());
        }
        if ((positives - covered.len()) as f64) < allowed_uncovered {
            break;
        }
    }

    log::info!(
        "selected {} blocking key(s) covering {}/{} sampled true matches",
        selected.len(),
        covered.len(),
        positives
    );

    let report = SelectionReport {
        pool_size: pool.len(),
        filtered_size: filtered.len(),
        positives,
        negatives: sample.negatives.len(),
        covered_positives: covered.len(),
        feature_evaluations: budget.used,
        capped: budget.exhausted,
        scores: filtered
            .iter()
            .zip(&scores)
            .map(|(key, &score)| ScoredKey { key: key.clone(), score })
            .collect(),
        selected: selected.clone(),
    };
    Ok((selected, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;

    fn store(rows: &[(&str, &[&str])]) -> RecordStore {
        RecordStore::from_records(rows.iter().map(|(id, values)| {
            Record::new(*id, values.iter().map(|v| v.to_string()).collect())
        }))
        .unwrap()
    }

    fn truth(pairs: &[(&str, &str)]) -> GroundTruth {
        GroundTruth::new(pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())))
    }

    /// Attribute 0: surname (agrees on matches), 1: city (constant), 2: noise.
    fn fixture() -> (RecordStore, RecordStore, GroundTruth) {
        let a = store(&[
            ("a1", &["smith", "perth", "x1"]),
            ("a2", &["jones", "perth", "x2"]),
            ("a3", &["brown", "perth", "x3"]),
            ("a4", &["white", "perth", "x4"]),
        ]);
        let b = store(&[
            ("b1", &["smith", "perth", "y1"]),
            ("b2", &["jones", "perth", "y2"]),
            ("b3", &["brown", "perth", "y3"]),
            ("b4", &["white", "perth", "y4"]),
        ]);
        let t = truth(&[("a1", "b1"), ("a2", "b2"), ("a3", "b3"), ("a4", "b4")]);
        (a, b, t)
    }

    fn params() -> SelectorParams {
        SelectorParams {
            training_size: 4,
            eps: 0.0,
            max_block_size_ratio: 0.5,
            seed: 42,
            max_feature_iterations: None,
        }
    }

    #[test]
    fn fisher_zero_denominator() {
        assert_eq!(fisher_score(1.0, 0.0, 0.0, 0.0), 0.0);
        assert!((fisher_score(1.0, 0.0, 0.5, 0.25) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pool_is_function_major() {
        let pool = candidate_pool(&[KeyFunction::Exact, KeyFunction::Soundex], &[0, 2]);
        let shown: Vec<String> = pool.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["exact(0)", "exact(2)", "soundex(0)", "soundex(2)"]);
    }

    #[test]
    fn samples_are_reproducible_and_labeled() {
        let (a, b, t) = fixture();
        let s1 = generate_samples(&a, &b, &t, 3, 7);
        let s2 = generate_samples(&a, &b, &t, 3, 7);
        assert_eq!(s1, s2);
        assert_eq!(s1.positives.len(), 3);
        assert!(s1.negatives.len() <= 3);
        assert!(s1.negatives.iter().all(|(x, y)| !t.contains_either(x, y)));
    }

    #[test]
    fn selects_discriminative_key_and_filters_large_blocks() {
        let (a, b, t) = fixture();
        let pool = candidate_pool(&[KeyFunction::Exact], &[0, 1, 2]);
        let (selected, report) = select_blocking_keys(&a, &b, &pool, &t, &params()).unwrap();

        // city puts every record in one block, noise never agrees
        assert_eq!(report.pool_size, 3);
        assert_eq!(report.filtered_size, 2);
        assert_eq!(selected, vec![BlockingKey::Exact { attribute: 0 }]);
        assert_eq!(report.covered_positives, 4);
        assert!(!report.capped);
    }

    #[test]
    fn eps_stops_once_enough_positives_are_covered() {
        // surname agrees on three matches, given name only on the fourth
        let a = store(&[
            ("a1", &["smith", "perth", "ann"]),
            ("a2", &["jones", "perth", "bob"]),
            ("a3", &["brown", "perth", "cat"]),
            ("a4", &["white", "perth", "dan"]),
        ]);
        let b = store(&[
            ("b1", &["smith", "perth", "anne"]),
            ("b2", &["jones", "perth", "rob"]),
            ("b3", &["brown", "perth", "kat"]),
            ("b4", &["whyte", "perth", "dan"]),
        ]);
        let t = truth(&[("a1", "b1"), ("a2", "b2"), ("a3", "b3"), ("a4", "b4")]);
        let pool = candidate_pool(&[KeyFunction::Exact], &[0, 2]);

        let loose = SelectorParams { eps: 0.3, ..params() };
        let (selected, report) = select_blocking_keys(&a, &b, &pool, &t, &loose).unwrap();
        assert_eq!(selected, vec![BlockingKey::Exact { attribute: 0 }]);
        assert_eq!(report.covered_positives, 3);
        assert!(report.covered_positives as f64 >= (1.0 - loose.eps) * report.positives as f64);

        let (selected, report) = select_blocking_keys(&a, &b, &pool, &t, &params()).unwrap();
        assert_eq!(
            selected,
            vec![BlockingKey::Exact { attribute: 0 }, BlockingKey::Exact { attribute: 2 }]
        );
        assert_eq!(report.covered_positives, 4);
    }

    #[test]
    fn selection_is_deterministic() {
        let (a, b, t) = fixture();
        let pool = candidate_pool(&[KeyFunction::Exact, KeyFunction::Soundex], &[0, 2]);
        let first = select_blocking_keys(&a, &b, &pool, &t, &params()).unwrap().0;
        let second = select_blocking_keys(&a, &b, &pool, &t, &params()).unwrap().0;
        assert_eq!(first, second);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let (a, b, t) = fixture();
        let pool = candidate_pool(&[KeyFunction::Exact], &[0, 2]);
        let capped = SelectorParams { max_feature_iterations: Some(3), ..params() };
        let (_, report) = select_blocking_keys(&a, &b, &pool, &t, &capped).unwrap();
        assert!(report.capped);
        assert_eq!(report.feature_evaluations, 3);
    }

    #[test]
    fn invalid_inputs() {
        let (a, b, t) = fixture();
        let pool = vec![BlockingKey::Exact { attribute: 0 }];
        assert!(select_blocking_keys(&a, &b, &[], &t, &params()).unwrap_err().is_config());

        let bad_eps = SelectorParams { eps: 1.5, ..params() };
        assert!(select_blocking_keys(&a, &b, &pool, &t, &bad_eps).unwrap_err().is_config());

        let bad_ratio = SelectorParams { max_block_size_ratio: 0.0, ..params() };
        assert!(select_blocking_keys(&a, &b, &pool, &t, &bad_ratio).unwrap_err().is_config());

        let empty = RecordStore::new();
        assert!(select_blocking_keys(&empty, &b, &pool, &t, &params()).unwrap_err().is_data());
    }
}
