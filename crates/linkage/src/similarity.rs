//! String similarity functions.
//!
//! Every function shares one boundary contract: an empty value on either side
//! scores 0.0, identical values score 1.0, and the result lies in [0, 1].
//! Strings are compared as sequences of `char`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::LinkageError;

const WINKLER_PREFIX_SCALE: f64 = 0.1;
const WINKLER_MAX_PREFIX: usize = 4;
const QGRAM_PAD_START: char = '\u{2}';
const QGRAM_PAD_END: char = '\u{3}';

/// Settings shared by the q-gram based comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Q-gram length for Jaccard and Dice.
    #[serde(default = "default_q")]
    pub q: usize,
    /// Pad values with q-1 sentinel characters at both ends before extracting q-grams.
    #[serde(default = "default_padding")]
    pub padding: bool,
}

fn default_q() -> usize {
    2
}

fn default_padding() -> bool {
    true
}

impl SimilarityConfig {
    /// Longest accepted q-gram length.
    pub const MAX_Q: usize = 16;

    pub fn validate(&self) -> Result<(), LinkageError> {
        if !(1..=Self::MAX_Q).contains(&self.q) {
            return Err(LinkageError::Config(format!(
                "q-gram length must be in [1, {}], got {}",
                Self::MAX_Q,
                self.q
            )));
        }
        Ok(())
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            q: default_q(),
            padding: default_padding(),
        }
    }
}

/// Named comparison functions selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Exact,
    Jaro,
    JaroWinkler,
    Jaccard,
    Dice,
    BagDistance,
    EditDistance,
}

impl Comparator {
    pub fn compare(self, val1: &str, val2: &str, config: &SimilarityConfig) -> f64 {
        match self {
            Self::Exact => exact_comp(val1, val2),
            Self::Jaro => jaro_comp(val1, val2),
            Self::JaroWinkler => jaro_winkler_comp(val1, val2),
            Self::Jaccard => jaccard_comp(val1, val2, config),
            Self::Dice => dice_comp(val1, val2, config),
            Self::BagDistance => bag_dist_sim_comp(val1, val2),
            Self::EditDistance => edit_dist_sim_comp(val1, val2),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Jaro => "jaro",
            Self::JaroWinkler => "jaro_winkler",
            Self::Jaccard => "jaccard",
            Self::Dice => "dice",
            Self::BagDistance => "bag_distance",
            Self::EditDistance => "edit_distance",
        }
    }
}

/// Shared boundary handling: `Some(score)` when the contract decides the result.
fn boundary(val1: &str, val2: &str) -> Option<f64> {
    if val1.is_empty() || val2.is_empty() {
        Some(0.0)
    } else if val1 == val2 {
        Some(1.0)
    } else {
        None
    }
}

fn clamp_unit(sim: f64) -> f64 {
    sim.clamp(0.0, 1.0)
}

/// 1.0 if both values are non-empty and identical, 0.0 otherwise.
pub fn exact_comp(val1: &str, val2: &str) -> f64 {
    boundary(val1, val2).unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Jaro / Jaro-Winkler
// ---------------------------------------------------------------------------

/// Scan `from` for characters present in `other` within `window` positions.
///
/// Matched positions in `other` are consumed. Returns the matched characters of
/// `from` in `from` order.
fn jaro_assign(from: &[char], other: &[char], window: usize) -> Vec<char> {
    let mut consumed = vec![false; other.len()];
    let mut assigned = Vec::new();

    for (i, &c) in from.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(other.len());
        if start >= end {
            continue;
        }
        if let Some(j) = (start..end).find(|&j| !consumed[j] && other[j] == c) {
            consumed[j] = true;
            assigned.push(c);
        }
    }
    assigned
}

/// Jaro similarity (Winkler & Thibaudeau).
pub fn jaro_comp(val1: &str, val2: &str) -> f64 {
    if let Some(sim) = boundary(val1, val2) {
        return sim;
    }

    let s1: Vec<char> = val1.chars().collect();
    let s2: Vec<char> = val2.chars().collect();
    let len1 = s1.len() as f64;
    let len2 = s2.len() as f64;
    let window = (s1.len().max(s2.len()) / 2).saturating_sub(1);

    let assigned1 = jaro_assign(&s1, &s2, window);
    let assigned2 = jaro_assign(&s2, &s1, window);

    let common = (assigned1.len() + assigned2.len()) as f64 / 2.0;
    if common == 0.0 {
        return 0.0;
    }

    let mismatches = assigned1
        .iter()
        .zip(&assigned2)
        .filter(|(a, b)| a != b)
        .count();
    let transpositions = mismatches as f64 / 2.0;

    clamp_unit((common / len1 + common / len2 + (common - transpositions) / common) / 3.0)
}

/// Jaro similarity boosted by the length of the common prefix (at most 4).
pub fn jaro_winkler_comp(val1: &str, val2: &str) -> f64 {
    if let Some(sim) = boundary(val1, val2) {
        return sim;
    }

    let jaro = jaro_comp(val1, val2);
    let prefix = val1
        .chars()
        .zip(val2.chars())
        .take(WINKLER_MAX_PREFIX)
        .take_while(|(a, b)| a == b)
        .count();

    clamp_unit(jaro + prefix as f64 * WINKLER_PREFIX_SCALE * (1.0 - jaro))
}

// ---------------------------------------------------------------------------
// Q-grams
// ---------------------------------------------------------------------------

/// Q-grams of `value`. A q outside [1, MAX_Q] is clamped into that range.
fn qgrams(value: &str, config: &SimilarityConfig) -> BTreeSet<String> {
    let q = config.q.clamp(1, SimilarityConfig::MAX_Q);
    let mut chars: Vec<char> = Vec::new();
    if config.padding {
        chars.extend(std::iter::repeat(QGRAM_PAD_START).take(q - 1));
    }
    chars.extend(value.chars());
    if config.padding {
        chars.extend(std::iter::repeat(QGRAM_PAD_END).take(q - 1));
    }

    if chars.len() < q {
        return BTreeSet::new();
    }
    chars.windows(q).map(|w| w.iter().collect()).collect()
}

/// Jaccard similarity of the two q-gram sets.
pub fn jaccard_comp(val1: &str, val2: &str, config: &SimilarityConfig) -> f64 {
    if let Some(sim) = boundary(val1, val2) {
        return sim;
    }

    let grams1 = qgrams(val1, config);
    let grams2 = qgrams(val2, config);
    let common = grams1.intersection(&grams2).count();
    let union = grams1.union(&grams2).count();
    if union == 0 {
        return 0.0;
    }
    clamp_unit(common as f64 / union as f64)
}

/// Dice coefficient of the two q-gram sets.
pub fn dice_comp(val1: &str, val2: &str, config: &SimilarityConfig) -> f64 {
    if let Some(sim) = boundary(val1, val2) {
        return sim;
    }

    let grams1 = qgrams(val1, config);
    let grams2 = qgrams(val2, config);
    let total = grams1.len() + grams2.len();
    if total == 0 {
        return 0.0;
    }
    let common = grams1.intersection(&grams2).count();
    clamp_unit(2.0 * common as f64 / total as f64)
}

// ---------------------------------------------------------------------------
// Bag distance / edit distance
// ---------------------------------------------------------------------------

/// 1 - bag distance / longer length. Bag distance is a cheap lower bound of
/// the edit distance.
pub fn bag_dist_sim_comp(val1: &str, val2: &str) -> f64 {
    if let Some(sim) = boundary(val1, val2) {
        return sim;
    }

    let mut bag: HashMap<char, i64> = HashMap::new();
    for c in val1.chars() {
        *bag.entry(c).or_insert(0) += 1;
    }
    for c in val2.chars() {
        *bag.entry(c).or_insert(0) -= 1;
    }
    let only1: i64 = bag.values().filter(|&&n| n > 0).sum();
    let only2: i64 = -bag.values().filter(|&&n| n < 0).sum::<i64>();

    let longest = val1.chars().count().max(val2.chars().count()) as f64;
    clamp_unit(1.0 - only1.max(only2) as f64 / longest)
}

/// Levenshtein distance over chars, two-row dynamic program.
pub fn levenshtein(val1: &str, val2: &str) -> usize {
    let s1: Vec<char> = val1.chars().collect();
    let s2: Vec<char> = val2.chars().collect();
    if s1.is_empty() {
        return s2.len();
    }
    if s2.is_empty() {
        return s1.len();
    }

    let mut prev: Vec<usize> = (0..=s2.len()).collect();
    let mut curr = vec![0; s2.len() + 1];
    for (i, &c1) in s1.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &c2) in s2.iter().enumerate() {
            let cost = usize::from(c1 != c2);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[s2.len()]
}

/// 1 - Levenshtein distance / longer length.
pub fn edit_dist_sim_comp(val1: &str, val2: &str) -> f64 {
    if let Some(sim) = boundary(val1, val2) {
        return sim;
    }

    let longest = val1.chars().count().max(val2.chars().count()) as f64;
    clamp_unit(1.0 - levenshtein(val1, val2) as f64 / longest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn exact_contract() {
        assert_eq!(exact_comp("smith", "smith"), 1.0);
        assert_eq!(exact_comp("smith", "smyth"), 0.0);
        assert_eq!(exact_comp("", ""), 0.0);
    }

    #[test]
    fn jaro_reference_values() {
        assert!(close(jaro_comp("MARTHA", "MARHTA"), 0.944));
        assert!(close(jaro_comp("DWAYNE", "DUANE"), 0.822));
        assert!(close(jaro_comp("DIXON", "DICKSONX"), 0.767));
        assert_eq!(jaro_comp("abc", "xyz"), 0.0);
    }

    #[test]
    fn jaro_boundaries() {
        assert_eq!(jaro_comp("peter", "peter"), 1.0);
        assert_eq!(jaro_comp("peter", ""), 0.0);
        assert_eq!(jaro_comp("", "peter"), 0.0);
        assert_eq!(jaro_comp("a", "b"), 0.0);
    }

    #[test]
    fn jaro_is_symmetric() {
        for (a, b) in [("MARTHA", "MARHTA"), ("jon", "john"), ("christina", "kirstyn")] {
            assert_eq!(jaro_comp(a, b), jaro_comp(b, a));
        }
    }

    #[test]
    fn jaro_winkler_boosts_prefix() {
        let jaro = jaro_comp("MARTHA", "MARHTA");
        let jw = jaro_winkler_comp("MARTHA", "MARHTA");
        assert!(jw >= jaro);
        assert!(close(jw, 0.961));
        assert!(close(jaro_winkler_comp("DWAYNE", "DUANE"), 0.840));
    }

    #[test]
    fn qgrams_with_and_without_padding() {
        let padded = SimilarityConfig { q: 2, padding: true };
        let plain = SimilarityConfig { q: 2, padding: false };
        assert_eq!(qgrams("ab", &padded).len(), 3);
        assert_eq!(qgrams("ab", &plain).len(), 1);
        assert!(qgrams("a", &plain).is_empty());
    }

    #[test]
    fn oversized_q_is_rejected_and_bounded() {
        let huge = SimilarityConfig { q: 1 << 62, padding: true };
        assert!(huge.validate().unwrap_err().is_config());
        assert!(SimilarityConfig { q: 0, padding: false }.validate().is_err());
        assert!(SimilarityConfig { q: SimilarityConfig::MAX_Q, padding: true }.validate().is_ok());

        // direct calls without validation stay bounded
        let sim = Comparator::Jaccard.compare("smith", "smyth", &huge);
        assert!((0.0..=1.0).contains(&sim));
        assert_eq!(qgrams("ab", &huge).len(), 2 + SimilarityConfig::MAX_Q - 1);
    }

    #[test]
    fn jaccard_and_dice() {
        let plain = SimilarityConfig { q: 2, padding: false };
        // {pe, et, te, er} vs {pe, et, ta, ar}: 2 common, 6 in union
        assert!(close(jaccard_comp("peter", "petar", &plain), 2.0 / 6.0));
        assert!(close(dice_comp("peter", "petar", &plain), 4.0 / 8.0));
        assert_eq!(jaccard_comp("a", "b", &plain), 0.0);
        assert_eq!(dice_comp("", "b", &plain), 0.0);
    }

    #[test]
    fn bag_distance() {
        // one substitution: bag distance 1
        assert!(close(bag_dist_sim_comp("peter", "petar"), 0.8));
        // anagram: bag distance 0 even though the strings differ
        assert_eq!(bag_dist_sim_comp("abc", "cba"), 1.0);
        assert_eq!(bag_dist_sim_comp("abc", "xyz"), 0.0);
    }

    #[test]
    fn edit_distance() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert!(close(edit_dist_sim_comp("kitten", "sitting"), 1.0 - 3.0 / 7.0));
        assert_eq!(edit_dist_sim_comp("abc", ""), 0.0);
    }

    #[test]
    fn comparator_dispatch() {
        let cfg = SimilarityConfig::default();
        assert_eq!(Comparator::Exact.compare("a", "a", &cfg), 1.0);
        assert_eq!(Comparator::Jaro.name(), "jaro");
        for comparator in [
            Comparator::Exact,
            Comparator::Jaro,
            Comparator::JaroWinkler,
            Comparator::Jaccard,
            Comparator::Dice,
            Comparator::BagDistance,
            Comparator::EditDistance,
        ] {
            assert_eq!(comparator.compare("smith", "", &cfg), 0.0);
            assert_eq!(comparator.compare("smith", "smith", &cfg), 1.0);
            let sim = comparator.compare("smith", "smyth", &cfg);
            assert!((0.0..=1.0).contains(&sim));
        }
    }
}
