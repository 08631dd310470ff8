use std::time::Instant;

use rayon::prelude::*;

use crate::blocking::{
    block_statistics, build_blocks, log_block_statistics, no_blocking, union_candidate_pairs,
    BlockIndex,
};
use crate::classify::{automatic_weights, kfold_split};
use crate::compare::compare_pairs;
use crate::config::{BlockingConfig, ClassificationConfig, LinkageConfig};
use crate::error::LinkageError;
use crate::evaluate::{blocking_quality, confusion_matrix, linkage_quality};
use crate::keys::BlockingKey;
use crate::model::{
    BlockingReport, CandidatePairs, ClassificationReport, ClassifiedPairs, Fold,
    FoldReport, GroundTruth, LinkageInput, LinkageQuality, LinkageResult, RecordStore, RunMeta,
    SelectionReport, SimilarityVectors,
};
use crate::selection::select_blocking_keys;
use crate::trainable::{fit_and_classify, DecisionTreeModel};

/// Run the full pipeline: blocking, comparison, classification, evaluation.
pub fn run(config: &LinkageConfig, input: &LinkageInput) -> Result<LinkageResult, LinkageError> {
    input.records_a.ensure_non_empty("A")?;
    input.records_b.ensure_non_empty("B")?;

    let started = Instant::now();
    let blocking = run_blocking(config, input)?;
    log::info!(
        "blocking produced {} candidate pair(s) in {:.3}s",
        blocking.candidates.len(),
        started.elapsed().as_secs_f64()
    );

    let started = Instant::now();
    let vectors = compare_pairs(
        &blocking.candidates,
        &input.records_a,
        &input.records_b,
        &config.comparisons,
        &config.similarity,
    )?;
    log::info!("comparison took {:.3}s", started.elapsed().as_secs_f64());

    let started = Instant::now();
    let classification = run_classification(config, input, &vectors)?;
    log::info!("classification took {:.3}s", started.elapsed().as_secs_f64());

    Ok(LinkageResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            records_a: input.records_a.len(),
            records_b: input.records_b.len(),
            true_matches: input.ground_truth.len(),
        },
        blocking: blocking.report,
        classification,
    })
}

/// |A| × |B|: the comparison universe without blocking.
pub fn all_comparisons(records_a: &RecordStore, records_b: &RecordStore) -> u64 {
    records_a.len() as u64 * records_b.len() as u64
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

/// Candidate pairs plus the report describing how they were produced.
pub struct BlockingOutcome {
    pub candidates: CandidatePairs,
    pub report: BlockingReport,
}

/// One block index per scheme; no scheme means a single all-records block.
fn scheme_indexes(store: &RecordStore, schemes: &[Vec<BlockingKey>]) -> Result<Vec<BlockIndex>, LinkageError> {
    if schemes.is_empty() {
        return Ok(vec![no_blocking(store)]);
    }
    schemes.iter().map(|scheme| build_blocks(store, scheme)).collect()
}

/// Merge per-scheme indexes for statistics. With several schemes each block
/// key is prefixed with its scheme number.
fn merge_indexes(indexes: Vec<BlockIndex>) -> BlockIndex {
    if indexes.len() == 1 {
        return indexes.into_iter().next().unwrap_or_default();
    }
    let mut merged = BlockIndex::default();
    for (i, index) in indexes.into_iter().enumerate() {
        merged.extend(index.into_iter().map(|(bkv, ids)| (format!("#{i}:{bkv}"), ids)));
    }
    merged
}

/// Resolve the configured blocking into candidate pairs and statistics.
pub fn run_blocking(config: &LinkageConfig, input: &LinkageInput) -> Result<BlockingOutcome, LinkageError> {
    let a = &input.records_a;
    let b = &input.records_b;

    let (schemes, selection): (Vec<Vec<BlockingKey>>, Option<SelectionReport>) = match &config.blocking {
        BlockingConfig::None => (Vec::new(), None),
        BlockingConfig::Conjunctive { keys } => (vec![keys.clone()], None),
        BlockingConfig::Disjunctive { schemes } => (schemes.clone(), None),
        BlockingConfig::Selected(selection) => {
            let (selected, report) = select_blocking_keys(
                a,
                b,
                &selection.candidate_pool(),
                &input.ground_truth,
                &selection.params(),
            )?;
            if selected.is_empty() {
                return Err(LinkageError::Computation(
                    "blocking key selection chose no key; no sampled true match agrees on any candidate"
                        .into(),
                ));
            }
            (selected.into_iter().map(|k| vec![k]).collect(), Some(report))
        }
    };

    let indexes_a = scheme_indexes(a, &schemes)?;
    let indexes_b = scheme_indexes(b, &schemes)?;
    let candidates = union_candidate_pairs(&indexes_a, &indexes_b);

    let stats_a = block_statistics(&merge_indexes(indexes_a));
    let stats_b = block_statistics(&merge_indexes(indexes_b));
    log_block_statistics("A", &stats_a);
    log_block_statistics("B", &stats_b);

    let universe = all_comparisons(a, b);
    let quality = blocking_quality(&candidates, &input.ground_truth, universe);
    log::info!(
        "blocking quality: RR {:.3}, PC {:.3}, PQ {:.3}",
        quality.reduction_ratio,
        quality.pairs_completeness,
        quality.pairs_quality
    );

    let report = BlockingReport {
        schemes,
        stats_a,
        stats_b,
        candidate_pairs: candidates.len(),
        all_comparisons: universe,
        quality,
        selection,
    };
    Ok(BlockingOutcome { candidates, report })
}

// ---------------------------------------------------------------------------
// Classification + Evaluation
// ---------------------------------------------------------------------------

fn fold_report(classified: &ClassifiedPairs, truth: &GroundTruth, universe: u64) -> Result<FoldReport, LinkageError> {
    let confusion = confusion_matrix(classified, truth, universe)?;
    Ok(FoldReport {
        matches: classified.matches.len(),
        non_matches: classified.non_matches.len(),
        confusion,
        quality: linkage_quality(&confusion),
    })
}

fn run_classification(
    config: &LinkageConfig,
    input: &LinkageInput,
    vectors: &SimilarityVectors,
) -> Result<ClassificationReport, LinkageError> {
    let weights = match &config.classification {
        ClassificationConfig::Weighted { weights: Some(w), .. } => Some(w.clone()),
        ClassificationConfig::Weighted { weights: None, .. } => Some(automatic_weights(
            &input.records_a,
            &input.records_b,
            &config.comparisons,
        )?),
        _ => None,
    };
    let rule = config.classification.rule(weights.as_deref());

    let folds = kfold_split(
        vectors,
        &input.ground_truth,
        config.evaluation.folds,
        config.evaluation.seed,
    )?;

    let evaluate_fold = |fold: &Fold| -> Result<FoldReport, LinkageError> {
        let classified = match (&rule, &config.classification) {
            (Some(rule), _) => rule.classify(&fold.test)?,
            (None, ClassificationConfig::DecisionTree { max_depth }) => {
                let mut model = DecisionTreeModel::new(*max_depth);
                fit_and_classify(&mut model, &fold.train, &fold.test, &input.ground_truth)?
            }
            (None, other) => {
                return Err(LinkageError::Config(format!(
                    "classification method '{}' has no classifier",
                    other.method_name()
                )))
            }
        };
        fold_report(&classified, &fold.ground_truth, fold.all_comparisons)
    };

    let fold_reports = folds
        .par_iter()
        .map(evaluate_fold)
        .collect::<Result<Vec<FoldReport>, LinkageError>>()?;

    for (i, report) in fold_reports.iter().enumerate() {
        log::debug!(
            "fold {}: P {:.3} R {:.3} F {:.3}",
            i + 1,
            report.quality.precision,
            report.quality.recall,
            report.quality.f_measure
        );
    }
    let qualities: Vec<LinkageQuality> = fold_reports.iter().map(|r| r.quality).collect();
    let mean = LinkageQuality::mean(&qualities);
    log::info!(
        "linkage quality over {} fold(s): accuracy {:.3}, precision {:.3}, recall {:.3}, F {:.3}",
        fold_reports.len(),
        mean.accuracy,
        mean.precision,
        mean.recall,
        mean.f_measure
    );

    let overall = match &rule {
        Some(rule) => {
            let classified = rule.classify(vectors)?;
            // truth pairs naming unknown records lie outside |A| x |B|
            let known = GroundTruth::new(
                input
                    .ground_truth
                    .iter()
                    .filter(|(a, b)| input.records_a.contains(a) && input.records_b.contains(b))
                    .cloned(),
            );
            Some(fold_report(
                &classified,
                &known,
                all_comparisons(&input.records_a, &input.records_b),
            )?)
        }
        None => None,
    };

    Ok(ClassificationReport {
        method: config.classification.method_name().to_string(),
        weights,
        folds: fold_reports,
        mean,
        overall,
    })
}
