//! Blocking key functions.
//!
//! A [`BlockingKey`] maps one record to a blocking key value (BKV). Records
//! sharing a BKV land in the same block. Every variant is pure.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LinkageError;
use crate::model::Record;

/// Soundex code of a value without letters.
pub const SOUNDEX_EMPTY: &str = "0000";

/// Filler for name parts shorter than their SLK-581 width.
pub const SLK_FILLER: char = '2';

const SOUNDEX_LEN: usize = 4;
const SLK_FAMILY_LEN: usize = 3;
const SLK_GIVEN_LEN: usize = 2;

/// A blocking key candidate: key function bound to the attribute(s) it reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum BlockingKey {
    /// Raw attribute value.
    Exact { attribute: usize },
    /// Soundex code of the attribute value.
    Soundex { attribute: usize },
    /// Statistical linkage key (SLK-581) over four attributes.
    Slk {
        family_name: usize,
        given_name: usize,
        birth_date: usize,
        sex: usize,
    },
}

impl BlockingKey {
    /// Compute the blocking key value for `record`.
    pub fn evaluate(&self, record: &Record) -> Result<String, LinkageError> {
        match *self {
            Self::Exact { attribute } => Ok(record.value(attribute)?.to_string()),
            Self::Soundex { attribute } => Ok(soundex(record.value(attribute)?)),
            Self::Slk { family_name, given_name, birth_date, sex } => Ok(slk581(
                record.value(family_name)?,
                record.value(given_name)?,
                record.value(birth_date)?,
                record.value(sex)?,
            )),
        }
    }
}

impl fmt::Display for BlockingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { attribute } => write!(f, "exact({attribute})"),
            Self::Soundex { attribute } => write!(f, "soundex({attribute})"),
            Self::Slk { family_name, given_name, birth_date, sex } => {
                write!(f, "slk({family_name},{given_name},{birth_date},{sex})")
            }
        }
    }
}

/// Single-attribute key functions, used to generate candidate pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFunction {
    Exact,
    Soundex,
}

impl KeyFunction {
    pub fn key(self, attribute: usize) -> BlockingKey {
        match self {
            Self::Exact => BlockingKey::Exact { attribute },
            Self::Soundex => BlockingKey::Soundex { attribute },
        }
    }
}

// ---------------------------------------------------------------------------
// Soundex
// ---------------------------------------------------------------------------

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

/// American Soundex.
///
/// Non-letters are discarded. A digit equal to the previous letter's digit is
/// not emitted again. Vowels (and Y) break such a run, H and W do not, so
/// "Ashcraft" encodes to `A261` and "Tymczak" to `T522`.
pub fn soundex(value: &str) -> String {
    let letters: Vec<char> = value
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let Some((&first, rest)) = letters.split_first() else {
        return SOUNDEX_EMPTY.to_string();
    };

    let mut code = String::with_capacity(SOUNDEX_LEN);
    code.push(first);
    let mut previous = soundex_digit(first);

    for &c in rest {
        if code.len() == SOUNDEX_LEN {
            break;
        }
        match soundex_digit(c) {
            Some(digit) => {
                if previous != Some(digit) {
                    code.push(digit);
                }
                previous = Some(digit);
            }
            None if c == 'H' || c == 'W' => {}
            None => previous = None,
        }
    }

    while code.len() < SOUNDEX_LEN {
        code.push('0');
    }
    code
}

// ---------------------------------------------------------------------------
// SLK-581
// ---------------------------------------------------------------------------

fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')
}

/// Leading consonants of `value`, uppercased and padded with [`SLK_FILLER`].
fn leading_consonants(value: &str, width: usize) -> String {
    let mut out: String = value
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .filter(|&c| !is_vowel(c))
        .take(width)
        .collect();
    while out.len() < width {
        out.push(SLK_FILLER);
    }
    out
}

/// Statistical linkage key: family-name consonants, given-name consonants,
/// date-of-birth digits and the uppercase sex code.
pub fn slk581(family_name: &str, given_name: &str, birth_date: &str, sex: &str) -> String {
    let mut key = leading_consonants(family_name, SLK_FAMILY_LEN);
    key.push_str(&leading_consonants(given_name, SLK_GIVEN_LEN));
    key.extend(birth_date.chars().filter(char::is_ascii_digit));
    key.push_str(&sex.trim().to_uppercase());
    key
}
