use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::config::{MergeStrategyKind, ResolveConfig};
use crate::model::{
    CandidateValue, DuplicateCluster, EntityRecord, FieldValue, GoldenRecord, MergeConflict,
    QualityScore, RunWarning,
};
use crate::quality::{score_quality, Validators};

/// Fuse one duplicate cluster into a golden record. Every field where the
/// sources disagreed gets a conflict entry, auto-resolved or not; required
/// fields with no usable value anywhere are surfaced as unresolved instead
/// of failing the merge.
pub fn merge_cluster(
    cluster: &DuplicateCluster,
    records: &BTreeMap<&str, &EntityRecord>,
    qualities: &BTreeMap<&str, QualityScore>,
    config: &ResolveConfig,
    validators: &Validators,
    version: u32,
    now: DateTime<Utc>,
) -> (GoldenRecord, Vec<RunWarning>) {
    let members: Vec<&EntityRecord> = cluster
        .record_ids
        .iter()
        .filter_map(|id| records.get(id.as_str()).copied())
        .collect();

    // Union of observed field names plus required fields, so a required
    // field nobody carries still shows up as unresolved.
    let mut field_names: BTreeSet<&str> = BTreeSet::new();
    for m in &members {
        field_names.extend(m.fields.keys().map(String::as_str));
    }
    field_names.extend(config.quality.required_fields.iter().map(String::as_str));

    let mut fields: BTreeMap<String, FieldValue> = BTreeMap::new();
    let mut conflicts: Vec<MergeConflict> = Vec::new();
    let mut unresolved: Vec<String> = Vec::new();

    for name in field_names {
        let candidates: Vec<CandidateValue> = members
            .iter()
            .filter_map(|m| {
                m.present_field(name).map(|v| CandidateValue {
                    value: v.clone(),
                    record_id: m.id.clone(),
                    quality: qualities.get(m.id.as_str()).map(|q| q.overall).unwrap_or(0.0),
                })
            })
            .collect();

        if candidates.is_empty() {
            if config.quality.required_fields.iter().any(|f| f == name) {
                unresolved.push(name.to_string());
            }
            continue;
        }

        let distinct: BTreeSet<(&'static str, String)> = candidates
            .iter()
            .map(|c| (c.value.type_name(), c.value.render()))
            .collect();

        if distinct.len() == 1 {
            fields.insert(name.to_string(), candidates[0].value.clone());
            continue;
        }

        let strategy = config.merge.strategy_for(name);
        let resolved = resolve(&candidates, &members, strategy, config).map(|c| c.value.clone());
        match resolved {
            Some(value) => {
                fields.insert(name.to_string(), value.clone());
                conflicts.push(MergeConflict {
                    field: name.to_string(),
                    resolved: Some(value),
                    candidates,
                    strategy,
                    requires_manual_review: false,
                });
            }
            None => {
                conflicts.push(MergeConflict {
                    field: name.to_string(),
                    resolved: None,
                    candidates,
                    strategy,
                    requires_manual_review: true,
                });
            }
        }
    }

    let tenant_id = members
        .first()
        .map(|m| m.tenant_id.clone())
        .unwrap_or_default();
    let id = golden_id(&tenant_id, &config.entity_type.to_string(), version, &cluster.record_ids);

    // `unresolved` comes out of the sorted field-name walk, so warning
    // order is already deterministic.
    let warnings: Vec<RunWarning> = unresolved
        .iter()
        .map(|field| RunWarning::UnresolvedRequiredField { golden_id: id.clone(), field: field.clone() })
        .collect();

    // Quality of the fused record itself, stamped with the newest
    // observation time among the sources.
    let observed_at = members
        .iter()
        .map(|m| m.observed_at)
        .max()
        .unwrap_or(now);
    let synthetic = EntityRecord {
        id: id.clone(),
        entity_type: config.entity_type,
        source_system: "golden".into(),
        tenant_id: tenant_id.clone(),
        observed_at,
        fields: fields.clone(),
    };
    let quality_score = score_quality(&synthetic, &config.quality, validators, now).overall;

    let golden = GoldenRecord {
        id,
        entity_type: config.entity_type,
        tenant_id,
        version,
        fields,
        unresolved_fields: unresolved,
        source_record_ids: cluster.record_ids.clone(),
        conflicts,
        quality_score,
        merged_at: now,
        superseded_by: None,
    };

    (golden, warnings)
}

/// Pick the winning candidate for a disagreeing field, or `None` for
/// `manual_review`. All tie chains end in a record-id comparison so the
/// outcome is deterministic.
fn resolve<'a>(
    candidates: &'a [CandidateValue],
    members: &[&EntityRecord],
    strategy: MergeStrategyKind,
    config: &ResolveConfig,
) -> Option<&'a CandidateValue> {
    let observed = |c: &CandidateValue| -> DateTime<Utc> {
        members
            .iter()
            .find(|m| m.id == c.record_id)
            .map(|m| m.observed_at)
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC)
    };

    // Later observation wins; ties fall through to quality, then to the
    // lexicographically smaller record id.
    let recency_key = |c: &CandidateValue| {
        (observed(c), ordered(c.quality), std::cmp::Reverse(c.record_id.clone()))
    };

    match strategy {
        MergeStrategyKind::ManualReview => None,
        MergeStrategyKind::MostRecent => candidates.iter().max_by_key(|c| recency_key(c)),
        MergeStrategyKind::HighestQualitySource => candidates
            .iter()
            .max_by_key(|c| (ordered(c.quality), observed(c), std::cmp::Reverse(c.record_id.clone()))),
        MergeStrategyKind::LongestValue => {
            let longest = candidates
                .iter()
                .filter(|c| c.value.as_text().is_some())
                .max_by_key(|c| {
                    (
                        c.value.render().chars().count(),
                        ordered(c.quality),
                        std::cmp::Reverse(c.record_id.clone()),
                    )
                });
            // Length is meaningless for non-text values; fall back to recency.
            longest.or_else(|| candidates.iter().max_by_key(|c| recency_key(c)))
        }
        MergeStrategyKind::MostFrequentValue => {
            let mut counts: BTreeMap<(&'static str, String), usize> = BTreeMap::new();
            for c in candidates {
                *counts.entry((c.value.type_name(), c.value.render())).or_insert(0) += 1;
            }
            candidates.iter().max_by_key(|c| {
                (
                    counts[&(c.value.type_name(), c.value.render())],
                    ordered(c.quality),
                    observed(c),
                    std::cmp::Reverse(c.record_id.clone()),
                )
            })
        }
        MergeStrategyKind::SourcePriorityList => {
            let rank = |c: &CandidateValue| -> usize {
                let source = members
                    .iter()
                    .find(|m| m.id == c.record_id)
                    .map(|m| m.source_system.as_str())
                    .unwrap_or("");
                config
                    .merge
                    .source_priority
                    .iter()
                    .position(|s| s == source)
                    .unwrap_or(usize::MAX)
            };
            let best_rank = candidates.iter().map(|c| rank(c)).min()?;
            candidates
                .iter()
                .filter(|c| rank(c) == best_rank)
                .max_by_key(|c| recency_key(c))
        }
    }
}

/// Total order over quality scores for use in max_by_key tuples.
fn ordered(q: f64) -> OrderedF64 {
    OrderedF64(q)
}

#[derive(PartialEq)]
struct OrderedF64(f64);

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Deterministic golden-record id: digest of tenant, entity type, version,
/// and the sorted source ids. Identical runs produce identical ids.
pub fn golden_id(tenant: &str, entity_type: &str, version: u32, source_ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant.as_bytes());
    hasher.update([0u8]);
    hasher.update(entity_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(version.to_be_bytes());
    for id in source_ids {
        hasher.update([0u8]);
        hasher.update(id.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::model::EntityType;

    fn config(merge_section: &str) -> ResolveConfig {
        let toml = format!(
            r#"
name = "Merge Test"
entity_type = "company"

[[fields]]
field = "company_name"
algorithm = "exact"

[[fields]]
field = "email"
algorithm = "exact"

[blocking]
[[blocking.keys]]
name = "k"
[[blocking.keys.components]]
field = "company_name"

[quality]
required_fields = ["company_name"]
{merge_section}
"#
        );
        ResolveConfig::from_toml(&toml).unwrap()
    }

    fn record(id: &str, source: &str, day: u32, fields: &[(&str, FieldValue)]) -> EntityRecord {
        EntityRecord {
            id: id.into(),
            entity_type: EntityType::Company,
            source_system: source.into(),
            tenant_id: "t1".into(),
            observed_at: Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.into())
    }

    fn run_merge(
        config: &ResolveConfig,
        members: Vec<EntityRecord>,
    ) -> (GoldenRecord, Vec<RunWarning>) {
        let cluster = DuplicateCluster {
            record_ids: {
                let mut ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
                ids.sort();
                ids
            },
            flags: Vec::new(),
        };
        let records: BTreeMap<&str, &EntityRecord> =
            members.iter().map(|m| (m.id.as_str(), m)).collect();
        let validators = Validators::new();
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let qualities: BTreeMap<&str, QualityScore> = members
            .iter()
            .map(|m| {
                (m.id.as_str(), score_quality(m, &config.quality, &validators, now))
            })
            .collect();
        merge_cluster(&cluster, &records, &qualities, config, &validators, 1, now)
    }

    #[test]
    fn most_recent_wins() {
        let config = config("");
        let (golden, _) = run_merge(
            &config,
            vec![
                record("r1", "crm", 1, &[("company_name", text("X"))]),
                record("r2", "erp", 5, &[("company_name", text("Y"))]),
            ],
        );
        assert_eq!(golden.fields["company_name"], text("Y"));
        assert_eq!(golden.conflicts.len(), 1);
        assert_eq!(golden.conflicts[0].strategy, MergeStrategyKind::MostRecent);
        assert!(!golden.conflicts[0].requires_manual_review);
    }

    #[test]
    fn source_priority_beats_recency() {
        let config = config(
            r#"
[merge]
default_strategy = "source_priority_list"
source_priority = ["erp", "crm"]
"#,
        );
        let (golden, _) = run_merge(
            &config,
            vec![
                record("r1", "erp", 1, &[("company_name", text("From ERP"))]),
                record("r2", "crm", 20, &[("company_name", text("From CRM"))]),
            ],
        );
        assert_eq!(golden.fields["company_name"], text("From ERP"));
    }

    #[test]
    fn manual_review_never_resolves() {
        let config = config(
            r#"
[merge.fields]
email = "manual_review"
"#,
        );
        let (golden, _) = run_merge(
            &config,
            vec![
                record("r1", "crm", 1, &[("company_name", text("Acme")), ("email", text("a@acme.test"))]),
                record("r2", "erp", 5, &[("company_name", text("Acme")), ("email", text("b@acme.test"))]),
            ],
        );
        assert!(!golden.fields.contains_key("email"));
        let conflict = golden.conflicts.iter().find(|c| c.field == "email").unwrap();
        assert!(conflict.requires_manual_review);
        assert!(conflict.resolved.is_none());
        assert_eq!(conflict.candidates.len(), 2);
    }

    #[test]
    fn longest_value_picks_longest_text() {
        let config = config(
            r#"
[merge.fields]
company_name = "longest_value"
"#,
        );
        let (golden, _) = run_merge(
            &config,
            vec![
                record("r1", "crm", 9, &[("company_name", text("Acme"))]),
                record("r2", "erp", 1, &[("company_name", text("Acme Corporation"))]),
            ],
        );
        assert_eq!(golden.fields["company_name"], text("Acme Corporation"));
    }

    #[test]
    fn most_frequent_wins_by_count() {
        let config = config(
            r#"
[merge.fields]
company_name = "most_frequent_value"
"#,
        );
        let (golden, _) = run_merge(
            &config,
            vec![
                record("r1", "crm", 1, &[("company_name", text("Acme"))]),
                record("r2", "erp", 2, &[("company_name", text("Acme"))]),
                record("r3", "web", 9, &[("company_name", text("Acme Inc"))]),
            ],
        );
        assert_eq!(golden.fields["company_name"], text("Acme"));
    }

    #[test]
    fn agreement_produces_no_conflict() {
        let config = config("");
        let (golden, _) = run_merge(
            &config,
            vec![
                record("r1", "crm", 1, &[("company_name", text("Acme"))]),
                record("r2", "erp", 5, &[("company_name", text("Acme"))]),
            ],
        );
        assert!(golden.conflicts.is_empty());
        assert_eq!(golden.fields["company_name"], text("Acme"));
    }

    #[test]
    fn unresolved_required_field_is_surfaced() {
        let config = config("");
        let (golden, warnings) = run_merge(
            &config,
            vec![
                record("r1", "crm", 1, &[("email", text("a@acme.test"))]),
                record("r2", "erp", 5, &[("company_name", FieldValue::Null)]),
            ],
        );
        assert_eq!(golden.unresolved_fields, vec!["company_name".to_string()]);
        assert!(!golden.fields.contains_key("company_name"));
        assert!(warnings
            .iter()
            .any(|w| matches!(w, RunWarning::UnresolvedRequiredField { field, .. } if field == "company_name")));
    }

    #[test]
    fn golden_id_is_deterministic_and_provenance_complete() {
        let config = config("");
        let members = vec![
            record("r1", "crm", 1, &[("company_name", text("Acme"))]),
            record("r2", "erp", 5, &[("company_name", text("Acme"))]),
        ];
        let (g1, _) = run_merge(&config, members.clone());
        let (g2, _) = run_merge(&config, members);
        assert_eq!(g1.id, g2.id);
        assert_eq!(g1.source_record_ids, vec!["r1".to_string(), "r2".to_string()]);
        assert_eq!(g1.version, 1);
        assert!(g1.superseded_by.is_none());
    }
}
