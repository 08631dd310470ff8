//! Blocking engine: group record ids by blocking key value and derive the
//! candidate pairs worth comparing.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::LinkageError;
use crate::keys::BlockingKey;
use crate::model::{BlockStatistics, CandidatePairs, RecordId, RecordStore};

/// Block key value → ids of the records in that block, in store order.
pub type BlockIndex = FxHashMap<String, Vec<RecordId>>;

/// Joins the per-function values of a conjunctive key into one block key.
const KEY_SEPARATOR: char = '\u{1f}';

/// Block key used by [`no_blocking`].
pub const ALL_RECORDS_BLOCK: &str = "*";

/// Build the block index of one dataset for a conjunctive list of keys.
///
/// Every record receives exactly one block key: the values of all `keys`
/// joined together. An empty key list is rejected.
pub fn build_blocks(store: &RecordStore, keys: &[BlockingKey]) -> Result<BlockIndex, LinkageError> {
    if keys.is_empty() {
        return Err(LinkageError::Config(
            "conjunctive blocking needs at least one key".into(),
        ));
    }

    let mut blocks = BlockIndex::default();
    for record in store.iter() {
        let mut bkv = String::new();
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                bkv.push(KEY_SEPARATOR);
            }
            bkv.push_str(&key.evaluate(record)?);
        }
        blocks.entry(bkv).or_default().push(record.id.clone());
    }

    log::debug!(
        "built {} block(s) from {} record(s) with key [{}]",
        blocks.len(),
        store.len(),
        display_keys(keys)
    );
    Ok(blocks)
}

/// A single block holding every record: the full comparison space.
pub fn no_blocking(store: &RecordStore) -> BlockIndex {
    let mut blocks = BlockIndex::default();
    if !store.is_empty() {
        blocks.insert(ALL_RECORDS_BLOCK.to_string(), store.ids().cloned().collect());
    }
    blocks
}

/// Cross product of every block key present on both sides, deduplicated.
pub fn candidate_pairs(blocks_a: &BlockIndex, blocks_b: &BlockIndex) -> CandidatePairs {
    let mut pairs = CandidatePairs::new();
    for (bkv, ids_a) in blocks_a {
        let Some(ids_b) = blocks_b.get(bkv) else {
            continue;
        };
        for id_a in ids_a {
            for id_b in ids_b {
                pairs.insert((id_a.clone(), id_b.clone()));
            }
        }
    }
    pairs
}

/// Union of the candidate pairs of several conjunctive schemes (OR of ANDs).
pub fn disjunctive_candidate_pairs(
    records_a: &RecordStore,
    records_b: &RecordStore,
    schemes: &[Vec<BlockingKey>],
) -> Result<CandidatePairs, LinkageError> {
    if schemes.is_empty() {
        return Err(LinkageError::Config(
            "disjunctive blocking needs at least one scheme".into(),
        ));
    }

    let mut indexes_a = Vec::with_capacity(schemes.len());
    let mut indexes_b = Vec::with_capacity(schemes.len());
    for scheme in schemes {
        indexes_a.push(build_blocks(records_a, scheme)?);
        indexes_b.push(build_blocks(records_b, scheme)?);
    }
    Ok(union_candidate_pairs(&indexes_a, &indexes_b))
}

/// Union of the candidate pairs of per-scheme block indexes, paired by position.
pub fn union_candidate_pairs(indexes_a: &[BlockIndex], indexes_b: &[BlockIndex]) -> CandidatePairs {
    let mut pairs = CandidatePairs::new();
    for (i, (blocks_a, blocks_b)) in indexes_a.iter().zip(indexes_b).enumerate() {
        let before = pairs.len();
        pairs.extend(candidate_pairs(blocks_a, blocks_b));
        log::debug!("scheme #{i} added {} candidate pair(s)", pairs.len() - before);
    }
    pairs
}

/// Number of distinct records placed in at least one block.
pub fn blocked_record_count(blocks: &BlockIndex) -> usize {
    blocks
        .values()
        .flatten()
        .collect::<FxHashSet<&RecordId>>()
        .len()
}

/// Size distribution of a block index.
///
/// The largest block is reported by key, ties broken by the smaller key so the
/// output does not depend on hash order.
pub fn block_statistics(blocks: &BlockIndex) -> BlockStatistics {
    if blocks.is_empty() {
        return BlockStatistics {
            block_count: 0,
            min_size: 0,
            avg_size: 0.0,
            max_size: 0,
            blocked_records: 0,
            largest_block: None,
        };
    }

    let mut min_size = usize::MAX;
    let mut total = 0usize;
    let mut largest: Option<(&String, usize)> = None;
    for (bkv, ids) in blocks {
        let size = ids.len();
        min_size = min_size.min(size);
        total += size;
        largest = match largest {
            Some((key, max)) if max > size || (max == size && key < bkv) => Some((key, max)),
            _ => Some((bkv, size)),
        };
    }
    let (largest_key, max_size) = largest.map_or((None, 0), |(k, s)| (Some(k), s));

    BlockStatistics {
        block_count: blocks.len(),
        min_size,
        avg_size: total as f64 / blocks.len() as f64,
        max_size,
        blocked_records: blocked_record_count(blocks),
        largest_block: largest_key.map(|k| k.replace(KEY_SEPARATOR, " | ")),
    }
}

/// Largest block size, 0 for an empty index.
pub fn max_block_size(blocks: &BlockIndex) -> usize {
    blocks.values().map(Vec::len).max().unwrap_or(0)
}

/// Log the block statistics of one dataset at info level.
pub fn log_block_statistics(label: &str, stats: &BlockStatistics) {
    log::info!(
        "dataset {label}: {} block(s), size min {} / avg {:.2} / max {}{}",
        stats.block_count,
        stats.min_size,
        stats.avg_size,
        stats.max_size,
        stats
            .largest_block
            .as_deref()
            .map(|k| format!(" (largest: '{k}')"))
            .unwrap_or_default()
    );
}

fn display_keys(keys: &[BlockingKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" & ")
}
