use std::collections::{BTreeMap, BTreeSet};

use crate::config::{AlgorithmKind, KeyTransform, ResolveConfig};
use crate::model::{EntityRecord, RunWarning};
use crate::normalize::normalize;
use crate::similarity::encode;

// Candidate-reduction layer: records are only ever compared when they share
// at least one blocking key. Recall over precision — a false candidate is
// resolved later by scoring, a missed pair is gone for good.

/// Blocking keys for one record, one entry per configured pass whose
/// components all produced non-empty parts.
pub fn generate_keys(record: &EntityRecord, config: &ResolveConfig) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();

    'rules: for rule in &config.blocking.keys {
        let mut parts = Vec::with_capacity(rule.components.len());
        for comp in &rule.components {
            let Some(value) = record.present_field(&comp.field) else {
                continue 'rules;
            };
            let text = normalize(&value.render(), &config.normalization);
            let part = apply_transform(&text, comp.transform, comp.length, config);
            if part.is_empty() {
                continue 'rules;
            }
            parts.push(part);
        }
        keys.insert(format!("{}|{}", rule.name, parts.join(":")));
    }

    keys
}

fn apply_transform(
    text: &str,
    transform: KeyTransform,
    length: Option<usize>,
    config: &ResolveConfig,
) -> String {
    match transform {
        KeyTransform::Full => text.to_string(),
        KeyTransform::Prefix => {
            let n = length.unwrap_or(1);
            text.chars().take(n).collect()
        }
        KeyTransform::Suffix => {
            let n = length.unwrap_or(1);
            let chars: Vec<char> = text.chars().collect();
            chars[chars.len().saturating_sub(n)..].iter().collect()
        }
        KeyTransform::Digits => {
            let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
            match length {
                Some(n) => {
                    let chars: Vec<char> = digits.chars().collect();
                    chars[chars.len().saturating_sub(n)..].iter().collect()
                }
                None => digits,
            }
        }
        KeyTransform::Phonetic => encode(text, config.similarity.phonetic.encoder),
    }
}

/// Bucket records (by index) under every key they generate.
pub fn bucket(records: &[EntityRecord], config: &ResolveConfig) -> BTreeMap<String, Vec<usize>> {
    let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        for key in generate_keys(record, config) {
            buckets.entry(key).or_default().push(idx);
        }
    }
    buckets
}

/// One bucket's scoring work: the pairs that have not already been claimed
/// by an earlier bucket (multi-pass blocking unions passes, but a pair is
/// scored exactly once).
#[derive(Debug)]
pub struct BucketPlan {
    pub key: String,
    pub pairs: Vec<(usize, usize)>,
}

#[derive(Debug)]
pub struct BlockingPlan {
    pub buckets: Vec<BucketPlan>,
    pub bucket_count: usize,
    pub candidate_pairs: usize,
    pub pruned_pairs: usize,
    pub warnings: Vec<RunWarning>,
}

/// Turn buckets into per-bucket pair lists. Oversized buckets get the
/// length pre-filter; buckets over the hard cap are processed anyway but
/// flagged, since a bucket that large means the blocking key is too coarse.
pub fn plan(records: &[EntityRecord], config: &ResolveConfig) -> BlockingPlan {
    let buckets = bucket(records, config);
    let mut seen: BTreeSet<(usize, usize)> = BTreeSet::new();
    let mut plans = Vec::new();
    let mut warnings = Vec::new();
    let mut candidate_pairs = 0usize;
    let mut pruned_pairs = 0usize;
    let bucket_count = buckets.len();

    for (key, members) in buckets {
        if members.len() > config.blocking.hard_cap {
            warnings.push(RunWarning::OversizedBucket {
                key: key.clone(),
                size: members.len(),
                hard_cap: config.blocking.hard_cap,
            });
        }
        let prefilter = members.len() > config.blocking.max_bucket_size;

        let mut pairs = Vec::new();
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                let pair = if a < b { (a, b) } else { (b, a) };
                if !seen.insert(pair) {
                    continue;
                }
                candidate_pairs += 1;
                if prefilter && length_prune(&records[pair.0], &records[pair.1], config) {
                    pruned_pairs += 1;
                    continue;
                }
                pairs.push(pair);
            }
        }

        if !pairs.is_empty() {
            plans.push(BucketPlan { key, pairs });
        }
    }

    BlockingPlan {
        buckets: plans,
        bucket_count,
        candidate_pairs,
        pruned_pairs,
        warnings,
    }
}

/// Cheap pre-filter for oversized buckets: skip a pair when some required
/// field's length gap alone already proves a sub-threshold score (the same
/// condition the hard veto would apply after full scoring).
fn length_prune(a: &EntityRecord, b: &EntityRecord, config: &ResolveConfig) -> bool {
    for fc in &config.fields {
        if !fc.required || fc.threshold <= 0.0 {
            continue;
        }
        let (Some(va), Some(vb)) = (a.present_field(&fc.field), b.present_field(&fc.field)) else {
            continue;
        };
        let la = normalize(&va.render(), &config.normalization).chars().count();
        let lb = normalize(&vb.render(), &config.normalization).chars().count();
        let max = la.max(lb);
        if max == 0 {
            continue;
        }
        let diff = la.abs_diff(lb);

        let bound = match fc.algorithm {
            AlgorithmKind::Exact => {
                if diff == 0 {
                    1.0
                } else {
                    0.0
                }
            }
            AlgorithmKind::Levenshtein | AlgorithmKind::DamerauLevenshtein => {
                let edit = &config.similarity.edit;
                let floor = edit.insert.min(edit.delete);
                1.0 - (diff as f64 * floor) / (max as f64 * edit.max_single())
            }
            AlgorithmKind::JaroWinkler => {
                let min = la.min(lb) as f64;
                let jaro_bound = (min / max as f64 + 2.0) / 3.0;
                let w = &config.similarity.winkler;
                let bonus = w.max_prefix as f64 * w.prefix_scale;
                jaro_bound + bonus.min(1.0) * (1.0 - jaro_bound)
            }
            // Token pairing and phonetic codes aren't length-bounded.
            AlgorithmKind::TokenJaroWinkler | AlgorithmKind::Phonetic => 1.0,
        };

        if bound < fc.threshold {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolveConfig;
    use crate::model::{EntityType, FieldValue};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn config(extra: &str) -> ResolveConfig {
        let toml = format!(
            r#"
name = "Blocking Test"
entity_type = "company"

[[fields]]
field = "company_name"
algorithm = "jaro-winkler"
weight = 1.0

[blocking]
max_bucket_size = 4
hard_cap = 8

[[blocking.keys]]
name = "name_phonetic"

[[blocking.keys.components]]
field = "company_name"
transform = "phonetic"

[[blocking.keys]]
name = "tax_suffix"

[[blocking.keys.components]]
field = "tax_id"
transform = "digits"
length = 4
{extra}
"#
        );
        ResolveConfig::from_toml(&toml).unwrap()
    }

    fn record(id: &str, name: &str, tax_id: Option<&str>) -> EntityRecord {
        let mut fields = BTreeMap::new();
        fields.insert("company_name".to_string(), FieldValue::Text(name.into()));
        if let Some(t) = tax_id {
            fields.insert("tax_id".to_string(), FieldValue::Text(t.into()));
        }
        EntityRecord {
            id: id.into(),
            entity_type: EntityType::Company,
            source_system: "crm".into(),
            tenant_id: "t1".into(),
            observed_at: Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
            fields,
        }
    }

    #[test]
    fn phonetic_key_groups_similar_names() {
        let config = config("");
        let a = record("a", "Robert & Sons", None);
        let b = record("b", "Rupert Sons", None);

        let ka = generate_keys(&a, &config);
        let kb = generate_keys(&b, &config);
        // "robert sons" and "rupert sons" share a soundex code on the full value
        assert!(!ka.is_disjoint(&kb), "{ka:?} vs {kb:?}");
    }

    #[test]
    fn missing_component_suppresses_key() {
        let config = config("");
        let keys = generate_keys(&record("a", "Acme", None), &config);
        assert_eq!(keys.len(), 1, "tax_suffix pass must be skipped: {keys:?}");
        assert!(keys.iter().all(|k| k.starts_with("name_phonetic|")));
    }

    #[test]
    fn multi_pass_union_scores_pair_once() {
        let config = config("");
        // Same phonetic code AND same tax suffix → pair appears in two buckets
        let records = vec![
            record("a", "Acme Corp", Some("US-991234")),
            record("b", "Acme Corp", Some("DE 111234")),
        ];
        let plan = plan(&records, &config);
        let total: usize = plan.buckets.iter().map(|b| b.pairs.len()).sum();
        assert_eq!(total, 1, "deduplicated across passes");
        assert_eq!(plan.candidate_pairs, 1);
    }

    #[test]
    fn disjoint_keys_never_pair() {
        let config = config("");
        let records = vec![
            record("a", "Acme Corp", Some("1234")),
            record("b", "Zenith Ltd", Some("9876")),
        ];
        let plan = plan(&records, &config);
        assert_eq!(plan.candidate_pairs, 0);
        assert!(plan.buckets.is_empty());
    }

    #[test]
    fn hard_cap_warns_but_processes() {
        let config = config("");
        // 9 identical names in one phonetic bucket, hard_cap = 8
        let records: Vec<EntityRecord> = (0..9)
            .map(|i| record(&format!("r{i}"), "Acme Corp", None))
            .collect();
        let plan = plan(&records, &config);
        assert!(plan
            .warnings
            .iter()
            .any(|w| matches!(w, RunWarning::OversizedBucket { size: 9, .. })));
        // still fully paired: C(9,2) = 36
        let total: usize = plan.buckets.iter().map(|b| b.pairs.len()).sum();
        assert_eq!(total + plan.pruned_pairs, 36);
    }

    #[test]
    fn oversized_bucket_prunes_hopeless_pairs() {
        let extra = r#"
[[fields]]
field = "tax_id"
algorithm = "exact"
weight = 1.0
threshold = 1.0
required = true
"#;
        let config = config(extra);
        // 6 members > max_bucket_size 4 → prefilter active; tax ids have
        // different digit counts so exact can never reach 1.0
        let mut records: Vec<EntityRecord> = (0..5)
            .map(|i| record(&format!("r{i}"), "Acme Corp", Some("12345")))
            .collect();
        records.push(record("r5", "Acme Corp", Some("123456789")));

        let plan = plan(&records, &config);
        assert!(plan.pruned_pairs >= 5, "pairs against r5 pruned, got {}", plan.pruned_pairs);
    }
}
