//! Blocking-key tokenizer strategies.
//!
//! Every strategy starts from the same normalized word set: the text is
//! lowercased, split on every non-alphanumeric character, empties dropped,
//! duplicates removed. Strategies then expand each word into blocking keys
//! in their own way. Selection is a closed enum, so dispatch is one `match`
//! and unknown strategy names can only occur at the CLI or serde boundary.
//!
//! # Example
//!
//! ```
//! use entwine_blocking::TokenizerStrategy;
//!
//! let keys = TokenizerStrategy::QGrams { q: 3 }.blocking_keys("Sofia");
//! assert!(keys.contains("sof") && keys.contains("fia"));
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use entwine_core::{EntwineError, Result};

/// Default q-gram length.
pub const DEFAULT_QGRAM_SIZE: usize = 6;
/// Default minimum suffix length.
pub const DEFAULT_SUFFIX_LENGTH: usize = 6;
/// Default cap on the q-grams kept per word before combining.
pub const DEFAULT_MAX_QGRAMS: usize = 15;
/// Default fraction of a word's q-gram list a combination must cover.
pub const DEFAULT_COMBINATION_THRESHOLD: f64 = 0.95;

/// Strategy for expanding record text into blocking keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenizerStrategy {
    /// Whole words.
    Standard,
    /// Sliding character windows of length `q` per word.
    QGrams {
        /// Window length; words shorter than this stay whole.
        q: usize,
    },
    /// Word suffixes no shorter than `min_length`.
    SuffixArrays {
        /// Shortest suffix emitted; shorter words stay whole.
        min_length: usize,
    },
    /// The whole word plus every contiguous substring of length
    /// `min_length` up to one below the word length.
    ExtendedSuffixArrays {
        /// Shortest substring emitted.
        min_length: usize,
    },
    /// Concatenated order-preserving subsequences of each word's q-grams.
    ExtendedQGrams {
        /// Q-gram length; words shorter than this stay whole.
        q: usize,
        /// Cap on the q-grams kept per word before combining.
        max_qgrams: usize,
        /// Fraction of the kept q-grams a combination must cover.
        threshold: f64,
    },
}

impl Default for TokenizerStrategy {
    fn default() -> Self {
        Self::Standard
    }
}

impl TokenizerStrategy {
    /// Q-grams with the default window length.
    #[must_use]
    pub fn qgrams() -> Self {
        Self::QGrams { q: DEFAULT_QGRAM_SIZE }
    }

    /// Suffix arrays with the default minimum length.
    #[must_use]
    pub fn suffix_arrays() -> Self {
        Self::SuffixArrays { min_length: DEFAULT_SUFFIX_LENGTH }
    }

    /// Extended suffix arrays with the default minimum length.
    #[must_use]
    pub fn extended_suffix_arrays() -> Self {
        Self::ExtendedSuffixArrays { min_length: DEFAULT_SUFFIX_LENGTH }
    }

    /// Extended q-grams with the default length, cap, and threshold.
    #[must_use]
    pub fn extended_qgrams() -> Self {
        Self::ExtendedQGrams {
            q: DEFAULT_QGRAM_SIZE,
            max_qgrams: DEFAULT_MAX_QGRAMS,
            threshold: DEFAULT_COMBINATION_THRESHOLD,
        }
    }

    /// Validates strategy parameters. Runs before any worker starts.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Standard => Ok(()),
            Self::QGrams { q } => {
                if q == 0 {
                    return Err(EntwineError::Config("q-gram length must be at least 1".into()));
                }
                Ok(())
            }
            Self::SuffixArrays { min_length } | Self::ExtendedSuffixArrays { min_length } => {
                if min_length == 0 {
                    return Err(EntwineError::Config(
                        "minimum suffix length must be at least 1".into(),
                    ));
                }
                Ok(())
            }
            Self::ExtendedQGrams { q, max_qgrams, threshold } => {
                if q == 0 {
                    return Err(EntwineError::Config("q-gram length must be at least 1".into()));
                }
                if max_qgrams == 0 {
                    return Err(EntwineError::Config("max_qgrams must be at least 1".into()));
                }
                if !(threshold > 0.0 && threshold <= 1.0) {
                    return Err(EntwineError::Config(
                        "combination threshold must lie in (0, 1]".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Expands `text` into its set of blocking keys.
    #[must_use]
    pub fn blocking_keys(&self, text: &str) -> HashSet<String> {
        let words = word_set(text);
        match *self {
            Self::Standard => words,
            Self::QGrams { q } => expand_words(&words, |word, keys| qgram_keys(word, q, keys)),
            Self::SuffixArrays { min_length } => {
                expand_words(&words, |word, keys| suffix_keys(word, min_length, keys))
            }
            Self::ExtendedSuffixArrays { min_length } => {
                expand_words(&words, |word, keys| extended_suffix_keys(word, min_length, keys))
            }
            Self::ExtendedQGrams { q, max_qgrams, threshold } => {
                expand_words(&words, |word, keys| {
                    extended_qgram_keys(word, q, max_qgrams, threshold, keys);
                })
            }
        }
    }
}

/// Normalizes text into its deduplicated word set.
///
/// Lowercases, splits on every non-alphanumeric character, drops empties.
#[must_use]
pub fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(String::from)
        .collect()
}

fn expand_words<F>(words: &HashSet<String>, mut per_word: F) -> HashSet<String>
where
    F: FnMut(&str, &mut HashSet<String>),
{
    let mut keys = HashSet::new();
    for word in words {
        per_word(word, &mut keys);
    }
    keys
}

fn qgram_keys(word: &str, q: usize, keys: &mut HashSet<String>) {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() < q {
        keys.insert(word.to_owned());
        return;
    }
    for window in chars.windows(q) {
        keys.insert(window.iter().collect());
    }
}

fn suffix_keys(word: &str, min_length: usize, keys: &mut HashSet<String>) {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() < min_length {
        keys.insert(word.to_owned());
        return;
    }
    for offset in 0..=chars.len() - min_length {
        keys.insert(chars[offset..].iter().collect());
    }
}

fn extended_suffix_keys(word: &str, min_length: usize, keys: &mut HashSet<String>) {
    keys.insert(word.to_owned());
    let chars: Vec<char> = word.chars().collect();
    if chars.len() > min_length {
        for size in min_length..chars.len() {
            for window in chars.windows(size) {
                keys.insert(window.iter().collect());
            }
        }
    }
}

fn extended_qgram_keys(
    word: &str,
    q: usize,
    max_qgrams: usize,
    threshold: f64,
    keys: &mut HashSet<String>,
) {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() < q {
        keys.insert(word.to_owned());
        return;
    }
    let mut grams: Vec<String> = chars.windows(q).map(|window| window.iter().collect()).collect();
    grams.truncate(max_qgrams);
    let minimum = ((grams.len() as f64 * threshold).floor() as usize).max(1);
    for size in minimum..=grams.len() {
        for combination in qgram_combinations(&grams, size) {
            keys.insert(combination);
        }
    }
}

/// All order-preserving choices of `size` grams, each concatenated into one
/// key. Classic exclude-last / include-last recursion on the final gram;
/// an empty include branch means the final gram stands alone.
fn qgram_combinations(grams: &[String], size: usize) -> Vec<String> {
    if size == 0 || grams.len() < size {
        return Vec::new();
    }
    let (rest, last) = grams.split_at(grams.len() - 1);
    let last = &last[0];
    let mut combinations = qgram_combinations(rest, size);
    let with_last = qgram_combinations(rest, size - 1);
    if with_last.is_empty() {
        combinations.push(last.clone());
    } else {
        for prefix in with_last {
            combinations.push(prefix + last);
        }
    }
    combinations
}
