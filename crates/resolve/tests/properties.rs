use proptest::prelude::*;

use aurum_resolve::config::{AlgorithmKind, SimilarityConfig};
use aurum_resolve::similarity::similarity;

const ALGORITHMS: [AlgorithmKind; 6] = [
    AlgorithmKind::Exact,
    AlgorithmKind::Levenshtein,
    AlgorithmKind::DamerauLevenshtein,
    AlgorithmKind::JaroWinkler,
    AlgorithmKind::TokenJaroWinkler,
    AlgorithmKind::Phonetic,
];

/// Short mixed-alphabet strings: ASCII, digits, spaces, and a few accented
/// characters so the Unicode path is exercised.
fn arb_name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-zA-Z0-9àéöüß,\\-\\. ]{0,16}").unwrap()
}

fn config_256() -> ProptestConfig {
    ProptestConfig { cases: 256, ..ProptestConfig::default() }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn similarity_is_symmetric(a in arb_name(), b in arb_name()) {
        let config = SimilarityConfig::default();
        for algo in ALGORITHMS {
            let ab = similarity(&a, &b, algo, &config);
            let ba = similarity(&b, &a, algo, &config);
            prop_assert_eq!(ab, ba, "{} asymmetric for {:?} / {:?}", algo, a, b);
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn self_similarity_is_one(a in arb_name()) {
        let config = SimilarityConfig::default();
        for algo in ALGORITHMS {
            prop_assert_eq!(similarity(&a, &a, algo, &config), 1.0, "{} on {:?}", algo, a);
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn scores_stay_in_unit_interval(a in arb_name(), b in arb_name()) {
        let config = SimilarityConfig::default();
        for algo in ALGORITHMS {
            let s = similarity(&a, &b, algo, &config);
            prop_assert!((0.0..=1.0).contains(&s), "{} out of range: {} for {:?} / {:?}", algo, s, a, b);
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn edit_distance_respects_triangle_inequality(
        a in arb_name(),
        b in arb_name(),
        c in arb_name(),
    ) {
        use aurum_resolve::config::EditCosts;
        use aurum_resolve::similarity::levenshtein_distance;

        let costs = EditCosts::default();
        let ab = levenshtein_distance(&a, &b, &costs);
        let bc = levenshtein_distance(&b, &c, &costs);
        let ac = levenshtein_distance(&a, &c, &costs);
        prop_assert!(ac <= ab + bc + 1e-9, "d(a,c)={ac} > d(a,b)+d(b,c)={}", ab + bc);
    }
}
