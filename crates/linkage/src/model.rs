use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::LinkageError;
use crate::keys::BlockingKey;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

pub type RecordId = String;

/// (id in dataset A, id in dataset B).
pub type PairId = (RecordId, RecordId);

/// A single record: identifier plus ordered attribute values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub values: Vec<String>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, values: Vec<String>) -> Self {
        Self { id: id.into(), values }
    }

    /// Attribute value at `index`, or an `AttributeIndex` error.
    pub fn value(&self, index: usize) -> Result<&str, LinkageError> {
        self.values
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| LinkageError::AttributeIndex {
                record_id: self.id.clone(),
                index,
                len: self.values.len(),
            })
    }
}

/// Records of one dataset keyed by id. Iteration is in id order.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<RecordId, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records, rejecting duplicate ids.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Result<Self, LinkageError> {
        let mut store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, record: Record) -> Result<(), LinkageError> {
        if self.records.contains_key(&record.id) {
            return Err(LinkageError::Data(format!("duplicate record id '{}'", record.id)));
        }
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Lookup that treats a missing id as a data error.
    pub fn require(&self, id: &str) -> Result<&Record, LinkageError> {
        self.get(id)
            .ok_or_else(|| LinkageError::Data(format!("unknown record id '{id}'")))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.keys()
    }

    /// Fails with a data error when the store holds no records.
    pub fn ensure_non_empty(&self, label: &str) -> Result<(), LinkageError> {
        if self.is_empty() {
            return Err(LinkageError::Data(format!("record store '{label}' is empty")));
        }
        Ok(())
    }
}

/// Known true matches between dataset A and dataset B.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundTruth {
    pairs: BTreeSet<PairId>,
}

impl GroundTruth {
    pub fn new(pairs: impl IntoIterator<Item = PairId>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }

    /// Exact (A, B) membership.
    pub fn contains(&self, pair: &PairId) -> bool {
        self.pairs.contains(pair)
    }

    /// Membership in either id ordering.
    pub fn contains_either(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&(a.to_string(), b.to_string()))
            || self.pairs.contains(&(b.to_string(), a.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PairId> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Pre-loaded inputs for one linkage run.
pub struct LinkageInput {
    pub records_a: RecordStore,
    pub records_b: RecordStore,
    pub ground_truth: GroundTruth,
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

/// Deduplicated candidate record pairs produced by blocking.
pub type CandidatePairs = BTreeSet<PairId>;

/// Block size distribution for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStatistics {
    pub block_count: usize,
    pub min_size: usize,
    pub avg_size: f64,
    pub max_size: usize,
    /// Distinct records in at least one block.
    pub blocked_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_block: Option<String>,
}

// ---------------------------------------------------------------------------
// Comparison + Classification
// ---------------------------------------------------------------------------

/// Similarity vector per candidate pair, one entry per configured comparison.
pub type SimilarityVectors = BTreeMap<PairId, Vec<f64>>;

/// Output of every classifier: two disjoint sets covering all classified pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedPairs {
    pub matches: BTreeSet<PairId>,
    pub non_matches: BTreeSet<PairId>,
}

/// One cross-validation fold.
#[derive(Debug, Clone)]
pub struct Fold {
    pub train: SimilarityVectors,
    pub test: SimilarityVectors,
    /// True matches whose ids both occur among the test pairs.
    pub ground_truth: GroundTruth,
    /// |ids of A in test| × |ids of B in test|.
    pub all_comparisons: u64,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub tp: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub tn: u64,
}

impl ConfusionMatrix {
    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.fn_ + self.tn
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LinkageQuality {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BlockingQuality {
    pub reduction_ratio: f64,
    pub pairs_completeness: f64,
    pub pairs_quality: f64,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub pool_size: usize,
    pub filtered_size: usize,
    pub positives: usize,
    pub negatives: usize,
    pub covered_positives: usize,
    pub feature_evaluations: usize,
    pub capped: bool,
    pub scores: Vec<ScoredKey>,
    pub selected: Vec<BlockingKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredKey {
    pub key: BlockingKey,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockingReport {
    /// Conjunctive schemes combined with OR. Empty means no blocking.
    pub schemes: Vec<Vec<BlockingKey>>,
    pub stats_a: BlockStatistics,
    pub stats_b: BlockStatistics,
    pub candidate_pairs: usize,
    pub all_comparisons: u64,
    pub quality: BlockingQuality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    pub matches: usize,
    pub non_matches: usize,
    pub confusion: ConfusionMatrix,
    pub quality: LinkageQuality,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    pub folds: Vec<FoldReport>,
    pub mean: LinkageQuality,
    /// Rule-based classifiers need no training, so they are also scored on all candidates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall: Option<FoldReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub records_a: usize,
    pub records_b: usize,
    pub true_matches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkageResult {
    pub meta: RunMeta,
    pub blocking: BlockingReport,
    pub classification: ClassificationReport,
}
