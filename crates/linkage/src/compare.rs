use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::LinkageError;
use crate::model::{CandidatePairs, PairId, RecordStore, SimilarityVectors};
use crate::similarity::{Comparator, SimilarityConfig};

/// One component of the similarity vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSpec {
    pub comparator: Comparator,
    pub attribute_a: usize,
    /// Defaults to `attribute_a` when both datasets share a layout.
    #[serde(default)]
    pub attribute_b: Option<usize>,
}

impl ComparisonSpec {
    pub fn new(comparator: Comparator, attribute: usize) -> Self {
        Self { comparator, attribute_a: attribute, attribute_b: None }
    }

    pub fn attribute_b(&self) -> usize {
        self.attribute_b.unwrap_or(self.attribute_a)
    }
}

/// Similarity vectors for every candidate pair, computed in parallel.
///
/// Only candidate pairs are compared. A pair naming an unknown record or a
/// spec naming a missing attribute fails the whole computation.
pub fn compare_pairs(
    candidates: &CandidatePairs,
    records_a: &RecordStore,
    records_b: &RecordStore,
    specs: &[ComparisonSpec],
    config: &SimilarityConfig,
) -> Result<SimilarityVectors, LinkageError> {
    if specs.is_empty() {
        return Err(LinkageError::Config("at least one comparison is required".into()));
    }

    let pairs: Vec<&PairId> = candidates.iter().collect();
    let vectors = pairs
        .par_iter()
        .map(|&pair| -> Result<(PairId, Vec<f64>), LinkageError> {
            let rec_a = records_a.require(&pair.0)?;
            let rec_b = records_b.require(&pair.1)?;
            let vector = specs
                .iter()
                .map(|spec| {
                    let val_a = rec_a.value(spec.attribute_a)?;
                    let val_b = rec_b.value(spec.attribute_b())?;
                    Ok(spec.comparator.compare(val_a, val_b, config))
                })
                .collect::<Result<Vec<f64>, LinkageError>>()?;
            Ok((pair.clone(), vector))
        })
        .collect::<Result<SimilarityVectors, LinkageError>>()?;

    log::info!(
        "compared {} candidate pair(s) on {} attribute(s)",
        vectors.len(),
        specs.len()
    );
    Ok(vectors)
}
