use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::config::{ConsistencyKind, FieldFormat, QualityConfig};
use crate::model::{EntityRecord, FieldValue, QualityScore};

/// Compiled format checks. Built once by the caller and shared read-only
/// across a run; the scorer itself holds no state.
pub struct Validators {
    email: Regex,
}

impl Validators {
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("literal email pattern"),
        }
    }
}

impl Default for Validators {
    fn default() -> Self {
        Self::new()
    }
}

/// Score one record in isolation. Used for merge tie-breaking, never as a
/// match signal.
pub fn score_quality(
    record: &EntityRecord,
    config: &QualityConfig,
    validators: &Validators,
    now: DateTime<Utc>,
) -> QualityScore {
    let completeness = completeness(record, config);
    let validity = validity(record, config, validators);
    let freshness = freshness(record, config, now);
    let consistency = consistency(record, config);

    let w = &config.weights;
    let sum = w.completeness + w.validity + w.freshness + w.consistency;
    let overall = ((completeness * w.completeness
        + validity * w.validity
        + freshness * w.freshness
        + consistency * w.consistency)
        / sum)
        .clamp(0.0, 1.0);

    QualityScore { overall, completeness, validity, freshness, consistency }
}

fn completeness(record: &EntityRecord, config: &QualityConfig) -> f64 {
    if config.required_fields.is_empty() {
        return 1.0;
    }
    let present = config
        .required_fields
        .iter()
        .filter(|f| record.present_field(f).is_some())
        .count();
    present as f64 / config.required_fields.len() as f64
}

fn validity(record: &EntityRecord, config: &QualityConfig, validators: &Validators) -> f64 {
    let mut checked = 0usize;
    let mut passed = 0usize;

    for (field, format) in &config.formats {
        let Some(value) = record.present_field(field) else {
            continue;
        };
        checked += 1;
        if format_ok(value, *format, validators) {
            passed += 1;
        }
    }

    if checked == 0 {
        1.0
    } else {
        passed as f64 / checked as f64
    }
}

fn format_ok(value: &FieldValue, format: FieldFormat, validators: &Validators) -> bool {
    match format {
        FieldFormat::Email => value
            .as_text()
            .map(|s| validators.email.is_match(s.trim()))
            .unwrap_or(false),
        FieldFormat::Phone => {
            let Some(text) = value.as_text() else {
                return false;
            };
            let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
            (7..=15).contains(&digits)
        }
        FieldFormat::Date => match value {
            FieldValue::Date(_) => true,
            FieldValue::Text(s) => parse_date(s).is_some(),
            _ => false,
        },
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

fn freshness(record: &EntityRecord, config: &QualityConfig, now: DateTime<Utc>) -> f64 {
    let age_days = (now - record.observed_at).num_seconds().max(0) as f64 / 86_400.0;
    0.5f64
        .powf(age_days / config.freshness_half_life_days)
        .clamp(0.0, 1.0)
}

fn consistency(record: &EntityRecord, config: &QualityConfig) -> f64 {
    let mut checked = 0usize;
    let mut violated = 0usize;

    for rule in &config.consistency_rules {
        match rule.kind {
            ConsistencyKind::DateOrder => {
                let earlier = rule.earlier.as_deref().and_then(|f| date_of(record, f));
                let later = rule.later.as_deref().and_then(|f| date_of(record, f));
                if let (Some(earlier), Some(later)) = (earlier, later) {
                    checked += 1;
                    if earlier > later {
                        violated += 1;
                    }
                }
            }
            ConsistencyKind::NonNegative => {
                let value = rule.field.as_deref().and_then(|f| record.present_field(f));
                if let Some(FieldValue::Number(n)) = value {
                    checked += 1;
                    if *n < 0.0 {
                        violated += 1;
                    }
                }
            }
        }
    }

    if checked == 0 {
        1.0
    } else {
        1.0 - violated as f64 / checked as f64
    }
}

fn date_of(record: &EntityRecord, field: &str) -> Option<NaiveDate> {
    match record.present_field(field)? {
        FieldValue::Date(d) => Some(*d),
        FieldValue::Text(s) => parse_date(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsistencyRule, QualityWeights};
    use crate::model::EntityType;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn record(fields: &[(&str, FieldValue)], observed_at: DateTime<Utc>) -> EntityRecord {
        EntityRecord {
            id: "r1".into(),
            entity_type: EntityType::Company,
            source_system: "crm".into(),
            tenant_id: "t1".into(),
            observed_at,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn config() -> QualityConfig {
        QualityConfig {
            required_fields: vec!["name".into(), "email".into()],
            formats: [("email".to_string(), FieldFormat::Email)].into_iter().collect(),
            ..QualityConfig::default()
        }
    }

    #[test]
    fn completeness_counts_required_fields() {
        let full = record(
            &[
                ("name", FieldValue::Text("Acme".into())),
                ("email", FieldValue::Text("info@acme.test".into())),
            ],
            now(),
        );
        let partial = record(&[("name", FieldValue::Text("Acme".into()))], now());
        let blank = record(&[("name", FieldValue::Text("  ".into()))], now());

        let c = config();
        let v = Validators::new();
        assert_eq!(score_quality(&full, &c, &v, now()).completeness, 1.0);
        assert_eq!(score_quality(&partial, &c, &v, now()).completeness, 0.5);
        assert_eq!(score_quality(&blank, &c, &v, now()).completeness, 0.0);
    }

    #[test]
    fn validity_checks_formats() {
        let good = record(&[("email", FieldValue::Text("a@b.test".into()))], now());
        let bad = record(&[("email", FieldValue::Text("not-an-email".into()))], now());
        let missing = record(&[("name", FieldValue::Text("Acme".into()))], now());

        let c = config();
        let v = Validators::new();
        assert_eq!(score_quality(&good, &c, &v, now()).validity, 1.0);
        assert_eq!(score_quality(&bad, &c, &v, now()).validity, 0.0);
        // nothing to check → vacuously valid
        assert_eq!(score_quality(&missing, &c, &v, now()).validity, 1.0);
    }

    #[test]
    fn freshness_decays_with_half_life() {
        let c = QualityConfig { freshness_half_life_days: 180.0, ..QualityConfig::default() };
        let v = Validators::new();

        let today = record(&[], now());
        let half_life_old = record(&[], now() - chrono::Duration::days(180));
        let ancient = record(&[], now() - chrono::Duration::days(1800));

        assert_eq!(score_quality(&today, &c, &v, now()).freshness, 1.0);
        let half = score_quality(&half_life_old, &c, &v, now()).freshness;
        assert!((half - 0.5).abs() < 1e-9);
        assert!(score_quality(&ancient, &c, &v, now()).freshness < 0.01);
    }

    #[test]
    fn consistency_penalizes_inverted_dates() {
        let c = QualityConfig {
            consistency_rules: vec![ConsistencyRule {
                kind: ConsistencyKind::DateOrder,
                field: None,
                earlier: Some("start_date".into()),
                later: Some("end_date".into()),
            }],
            ..QualityConfig::default()
        };
        let v = Validators::new();

        let ok = record(
            &[
                ("start_date", FieldValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())),
                ("end_date", FieldValue::Date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())),
            ],
            now(),
        );
        let inverted = record(
            &[
                ("start_date", FieldValue::Date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())),
                ("end_date", FieldValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())),
            ],
            now(),
        );

        assert_eq!(score_quality(&ok, &c, &v, now()).consistency, 1.0);
        assert_eq!(score_quality(&inverted, &c, &v, now()).consistency, 0.0);
    }

    #[test]
    fn overall_stays_in_range() {
        let c = QualityConfig {
            required_fields: vec!["name".into()],
            weights: QualityWeights {
                completeness: 1.0,
                validity: 1.0,
                freshness: 1.0,
                consistency: 1.0,
            },
            ..QualityConfig::default()
        };
        let v = Validators::new();
        let empty = record(&[], now() - chrono::Duration::days(10_000));
        let q = score_quality(&empty, &c, &v, now());
        assert!(q.overall >= 0.0 && q.overall <= 1.0);
        assert!(q.overall < 0.6, "empty stale record should score low, got {}", q.overall);
    }
}
