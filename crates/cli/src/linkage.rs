//! `reclink` subcommands: config-driven record linkage.

use std::path::{Path, PathBuf};

use reclink_linkage::config::BlockingConfig;
use reclink_linkage::engine::run_blocking;
use reclink_linkage::keys::soundex;
use reclink_linkage::loader::{load_ground_truth_csv, load_records_csv};
use reclink_linkage::model::{BlockStatistics, BlockingReport};
use reclink_linkage::selection::select_blocking_keys;
use reclink_linkage::{LinkageConfig, LinkageInput};

use crate::CliError;

// ============================================================================
// Loading
// ============================================================================

fn read_config(config_path: &Path) -> Result<LinkageConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        CliError::args(format!("cannot read config {}: {e}", config_path.display()))
    })?;
    Ok(LinkageConfig::from_toml(&config_str)?)
}

fn read_data(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))
}

/// Parse the config and load both datasets and the ground truth.
///
/// Data file paths resolve relative to the config file's directory.
fn load(config_path: &Path) -> Result<(LinkageConfig, LinkageInput), CliError> {
    let config = read_config(config_path)?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let records_a = load_records_csv(&read_data(&base_dir.join(&config.datasets.a.file))?, &config.datasets.a)?;
    let records_b = load_records_csv(&read_data(&base_dir.join(&config.datasets.b.file))?, &config.datasets.b)?;
    let ground_truth = load_ground_truth_csv(
        &read_data(&base_dir.join(&config.ground_truth.file))?,
        config.ground_truth.has_header,
    )?;

    Ok((config, LinkageInput { records_a, records_b, ground_truth }))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))
}

// ============================================================================
// Commands
// ============================================================================

pub fn cmd_run(config_path: PathBuf, json_output: bool, output_file: Option<PathBuf>) -> Result<(), CliError> {
    let (config, input) = load(&config_path)?;
    let result = reclink_linkage::run(&config, &input)?;

    let json_str = to_json(&result)?;
    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::io(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }
    if json_output {
        println!("{json_str}");
    }

    // Human summary to stderr
    eprintln!(
        "'{}': {} x {} records, {} true match(es)",
        result.meta.config_name, result.meta.records_a, result.meta.records_b, result.meta.true_matches,
    );
    print_blocking(&result.blocking);

    let c = &result.classification;
    eprintln!(
        "classification ({}, {} folds): mean precision {:.3}, recall {:.3}, F {:.3}",
        c.method,
        c.folds.len(),
        c.mean.precision,
        c.mean.recall,
        c.mean.f_measure,
    );
    if let Some(ref overall) = c.overall {
        eprintln!(
            "all candidates: {} match(es) / {} non-match(es), tp {} fp {} fn {} tn {}",
            overall.matches,
            overall.non_matches,
            overall.confusion.tp,
            overall.confusion.fp,
            overall.confusion.fn_,
            overall.confusion.tn,
        );
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let blocking = match &config.blocking {
        BlockingConfig::None => "no blocking".to_string(),
        BlockingConfig::Conjunctive { keys } => format!("{} conjunctive key(s)", keys.len()),
        BlockingConfig::Disjunctive { schemes } => format!("{} disjunctive scheme(s)", schemes.len()),
        BlockingConfig::Selected(selection) => {
            format!("key selection over {} candidate(s)", selection.candidate_pool().len())
        }
    };
    eprintln!(
        "valid: '{}' with {}, {} comparison(s), {} classification, {} folds",
        config.name,
        blocking,
        config.comparisons.len(),
        config.classification.method_name(),
        config.evaluation.folds,
    );
    Ok(())
}

pub fn cmd_select_keys(config_path: PathBuf, json_output: bool) -> Result<(), CliError> {
    let (config, input) = load(&config_path)?;
    let BlockingConfig::Selected(selection) = &config.blocking else {
        return Err(CliError::config("config does not use blocking key selection")
            .with_hint("set `method = \"selected\"` in the [blocking] section"));
    };

    let (selected, report) = select_blocking_keys(
        &input.records_a,
        &input.records_b,
        &selection.candidate_pool(),
        &input.ground_truth,
        &selection.params(),
    )?;

    if json_output {
        println!("{}", to_json(&report)?);
    } else {
        for key in &selected {
            println!("{key}");
        }
    }

    eprintln!(
        "selected {} of {} candidate(s) ({} after size filter); {} of {} sampled match(es) covered{}",
        selected.len(),
        report.pool_size,
        report.filtered_size,
        report.covered_positives,
        report.positives,
        if report.capped { " (iteration cap reached)" } else { "" },
    );
    Ok(())
}

pub fn cmd_blocks(config_path: PathBuf, json_output: bool) -> Result<(), CliError> {
    let (config, input) = load(&config_path)?;
    let outcome = run_blocking(&config, &input)?;

    if json_output {
        println!("{}", to_json(&outcome.report)?);
    }
    print_blocking(&outcome.report);
    Ok(())
}

pub fn cmd_soundex(names: &[String]) -> Result<(), CliError> {
    for name in names {
        println!("{name}\t{}", soundex(name));
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_blocking(report: &BlockingReport) {
    let schemes: Vec<String> = report
        .schemes
        .iter()
        .map(|scheme| scheme.iter().map(ToString::to_string).collect::<Vec<_>>().join(" AND "))
        .collect();
    eprintln!(
        "blocking: {}",
        if schemes.is_empty() { "none".to_string() } else { schemes.join(" OR ") }
    );
    print_stats("A", &report.stats_a);
    print_stats("B", &report.stats_b);
    eprintln!(
        "{} candidate pair(s) of {}: RR {:.4}, PC {:.4}, PQ {:.4}",
        report.candidate_pairs,
        report.all_comparisons,
        report.quality.reduction_ratio,
        report.quality.pairs_completeness,
        report.quality.pairs_quality,
    );
}

fn print_stats(label: &str, stats: &BlockStatistics) {
    eprintln!(
        "  {label}: {} block(s) over {} record(s), size min {} / avg {:.2} / max {}",
        stats.block_count, stats.blocked_records, stats.min_size, stats.avg_size, stats.max_size,
    );
}
