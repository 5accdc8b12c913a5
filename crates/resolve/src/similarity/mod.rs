//! Character-level similarity primitives. All functions are pure, operate
//! on pre-normalized strings, and return scores in `[0,1]`.

pub mod edit;
pub mod jaro;
pub mod phonetic;

pub use edit::{damerau_distance, damerau_similarity, levenshtein_distance, levenshtein_similarity};
pub use jaro::{jaro, jaro_winkler, token_jaro_winkler};
pub use phonetic::{cologne, encode, metaphone, phonetic_similarity, soundex};

use crate::config::{AlgorithmKind, SimilarityConfig};

/// Dispatch one algorithm over two already-normalized strings.
pub fn similarity(a: &str, b: &str, algorithm: AlgorithmKind, config: &SimilarityConfig) -> f64 {
    match algorithm {
        AlgorithmKind::Exact => {
            if a == b {
                1.0
            } else {
                0.0
            }
        }
        AlgorithmKind::Levenshtein => levenshtein_similarity(a, b, &config.edit),
        AlgorithmKind::DamerauLevenshtein => damerau_similarity(a, b, &config.edit),
        AlgorithmKind::JaroWinkler => jaro_winkler(a, b, &config.winkler),
        AlgorithmKind::TokenJaroWinkler => token_jaro_winkler(a, b, &config.winkler),
        AlgorithmKind::Phonetic => phonetic_similarity(a, b, &config.phonetic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AlgorithmKind; 6] = [
        AlgorithmKind::Exact,
        AlgorithmKind::Levenshtein,
        AlgorithmKind::DamerauLevenshtein,
        AlgorithmKind::JaroWinkler,
        AlgorithmKind::TokenJaroWinkler,
        AlgorithmKind::Phonetic,
    ];

    #[test]
    fn every_algorithm_scores_identity_as_one() {
        let config = SimilarityConfig::default();
        for algo in ALL {
            assert_eq!(similarity("acme corp", "acme corp", algo, &config), 1.0, "{algo}");
        }
    }

    #[test]
    fn every_algorithm_handles_empty_input() {
        let config = SimilarityConfig::default();
        for algo in ALL {
            assert_eq!(similarity("", "", algo, &config), 1.0, "{algo}");
            assert_eq!(similarity("acme", "", algo, &config), 0.0, "{algo}");
        }
    }
}
