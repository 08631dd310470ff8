use std::collections::BTreeSet;
use std::path::PathBuf;

use reclink_linkage::blocking::{build_blocks, candidate_pairs};
use reclink_linkage::classify::exact_classify;
use reclink_linkage::config::{BlockingConfig, LinkageConfig};
use reclink_linkage::engine::{run, run_blocking};
use reclink_linkage::keys::BlockingKey;
use reclink_linkage::loader::{load_ground_truth_csv, load_records_csv};
use reclink_linkage::model::{LinkageInput, LinkageResult, PairId, Record, RecordStore, SimilarityVectors};
use reclink_linkage::selection::select_blocking_keys;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn read_fixture(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

fn load(config_file: &str) -> (LinkageConfig, LinkageInput) {
    let config = LinkageConfig::from_toml(&read_fixture(config_file)).unwrap();
    let records_a = load_records_csv(&read_fixture(&config.datasets.a.file), &config.datasets.a).unwrap();
    let records_b = load_records_csv(&read_fixture(&config.datasets.b.file), &config.datasets.b).unwrap();
    let ground_truth =
        load_ground_truth_csv(&read_fixture(&config.ground_truth.file), config.ground_truth.has_header)
            .unwrap();
    (config, LinkageInput { records_a, records_b, ground_truth })
}

fn load_and_run(config_file: &str) -> LinkageResult {
    let (config, input) = load(config_file);
    run(&config, &input).unwrap()
}

fn pair(a: &str, b: &str) -> PairId {
    (a.to_string(), b.to_string())
}

// -------------------------------------------------------------------------
// Worked example
// -------------------------------------------------------------------------

#[test]
fn surname_blocking_then_exact_classification() {
    let a = RecordStore::from_records(vec![
        Record::new("1", vec!["john".into(), "smith".into()]),
        Record::new("2", vec!["jon".into(), "smith".into()]),
    ])
    .unwrap();
    let b = RecordStore::from_records(vec![Record::new("1", vec!["john".into(), "smith".into()])])
        .unwrap();

    let key = [BlockingKey::Exact { attribute: 1 }];
    let blocks_a = build_blocks(&a, &key).unwrap();
    let blocks_b = build_blocks(&b, &key).unwrap();
    assert_eq!(blocks_a["smith"], vec!["1".to_string(), "2".to_string()]);
    assert_eq!(blocks_b["smith"], vec!["1".to_string()]);

    let candidates = candidate_pairs(&blocks_a, &blocks_b);
    let expected: BTreeSet<PairId> = [pair("1", "1"), pair("2", "1")].into_iter().collect();
    assert_eq!(candidates, expected);

    let mut vectors = SimilarityVectors::new();
    vectors.insert(pair("1", "1"), vec![1.0, 1.0]);
    vectors.insert(pair("2", "1"), vec![0.0, 1.0]);
    let classified = exact_classify(&vectors);
    assert_eq!(classified.matches, [pair("1", "1")].into_iter().collect());
    assert_eq!(classified.non_matches, [pair("2", "1")].into_iter().collect());
}

// -------------------------------------------------------------------------
// Fixture pipelines
// -------------------------------------------------------------------------

#[test]
fn soundex_blocking_keeps_every_true_match() {
    let result = load_and_run("soundex.linkage.toml");

    assert_eq!(result.meta.records_a, 10);
    assert_eq!(result.meta.records_b, 10);
    assert_eq!(result.meta.true_matches, 7);
    assert!(!result.meta.run_at.is_empty());

    let blocking = &result.blocking;
    assert_eq!(blocking.candidate_pairs, 7);
    assert_eq!(blocking.all_comparisons, 100);
    assert!((blocking.quality.reduction_ratio - 0.93).abs() < 1e-9);
    assert_eq!(blocking.quality.pairs_completeness, 1.0);
    assert_eq!(blocking.quality.pairs_quality, 1.0);
    assert_eq!(blocking.stats_a.block_count, 10);
    assert_eq!(blocking.stats_a.max_size, 1);
}

#[test]
fn threshold_classification_over_all_candidates() {
    let result = load_and_run("soundex.linkage.toml");
    let classification = &result.classification;
    assert_eq!(classification.method, "threshold");
    assert_eq!(classification.folds.len(), 2);

    // a06/b06 differ in date of birth and fall below the threshold
    let overall = classification.overall.as_ref().unwrap();
    assert_eq!(overall.matches, 6);
    assert_eq!(overall.non_matches, 1);
    assert_eq!(overall.confusion.tp, 6);
    assert_eq!(overall.confusion.fp, 0);
    assert_eq!(overall.confusion.fn_, 1);
    assert_eq!(overall.confusion.tn, 93);
    assert_eq!(overall.quality.precision, 1.0);
    assert!((overall.quality.recall - 6.0 / 7.0).abs() < 1e-9);
}

#[test]
fn folds_split_candidates_and_keep_metrics_in_range() {
    let result = load_and_run("soundex.linkage.toml");
    let tested: usize = result.classification.folds.iter().map(|f| f.matches + f.non_matches).sum();
    assert_eq!(tested, 7);
    for fold in &result.classification.folds {
        assert!(fold.confusion.total() >= (fold.matches + fold.non_matches) as u64);
        for metric in [
            fold.quality.accuracy,
            fold.quality.precision,
            fold.quality.recall,
            fold.quality.f_measure,
        ] {
            assert!((0.0..=1.0).contains(&metric));
        }
    }
}

#[test]
fn exact_surname_blocking_misses_spelling_variants() {
    let (mut config, input) = load("soundex.linkage.toml");
    config.blocking = BlockingConfig::Conjunctive { keys: vec![BlockingKey::Exact { attribute: 2 }] };
    let outcome = run_blocking(&config, &input).unwrap();
    // brown/browne and white/whyte no longer share a block
    assert_eq!(outcome.candidates.len(), 5);
    assert!(!outcome.candidates.contains(&pair("a03", "b03")));
    assert!((outcome.report.quality.pairs_completeness - 5.0 / 7.0).abs() < 1e-9);
}

#[test]
fn learned_scheme_covers_sampled_matches() {
    let result = load_and_run("selected.linkage.toml");
    let selection = result.blocking.selection.as_ref().unwrap();

    assert_eq!(selection.pool_size, 8);
    // soundex of the date of birth is "0000" for every record
    assert_eq!(selection.filtered_size, 7);
    assert_eq!(selection.positives, 7);
    assert_eq!(selection.covered_positives, 7);
    assert!(!selection.selected.is_empty());
    assert_eq!(result.blocking.schemes.len(), selection.selected.len());
    assert_eq!(result.blocking.quality.pairs_completeness, 1.0);

    let weights = result.classification.weights.as_ref().unwrap();
    assert_eq!(weights.len(), 2);
    assert_eq!(result.classification.folds.len(), 3);
}

#[test]
fn learned_scheme_is_reproducible() {
    let (config, input) = load("selected.linkage.toml");
    let BlockingConfig::Selected(selection) = &config.blocking else {
        panic!("expected selected blocking");
    };
    let pool = selection.candidate_pool();
    let first = select_blocking_keys(
        &input.records_a,
        &input.records_b,
        &pool,
        &input.ground_truth,
        &selection.params(),
    )
    .unwrap();
    let second = select_blocking_keys(
        &input.records_a,
        &input.records_b,
        &pool,
        &input.ground_truth,
        &selection.params(),
    )
    .unwrap();
    assert_eq!(first.0, second.0);
    assert_eq!(first.1.covered_positives, second.1.covered_positives);
}

#[test]
fn decision_tree_without_blocking() {
    let result = load_and_run("tree.linkage.toml");
    assert_eq!(result.blocking.candidate_pairs, 100);
    assert_eq!(result.blocking.quality.reduction_ratio, 0.0);
    assert!(result.blocking.schemes.is_empty());

    let classification = &result.classification;
    assert_eq!(classification.method, "decision_tree");
    assert!(classification.overall.is_none());
    assert_eq!(classification.folds.len(), 2);
    let tested: usize = classification.folds.iter().map(|f| f.matches + f.non_matches).sum();
    assert_eq!(tested, 100);
}

#[test]
fn result_serializes_confusion_as_fn() {
    let result = load_and_run("soundex.linkage.toml");
    let json = serde_json::to_value(&result).unwrap();
    let overall = &json["classification"]["overall"]["confusion"];
    assert_eq!(overall["fn"], 1);
    assert_eq!(json["meta"]["config_name"], "Soundex surname blocking");
}
