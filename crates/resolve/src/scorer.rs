use crate::config::{AlgorithmKind, ResolveConfig};
use crate::model::{
    EntityRecord, Explain, FieldContribution, FieldScore, FieldValue, MatchDecision, MatchResult,
};
use crate::normalize::normalize;
use crate::similarity::similarity;

/// How many fields the explain block lists on each side.
const EXPLAIN_TOP: usize = 3;

/// Compare two records field-by-field per the configured algorithms and
/// aggregate into a weighted match decision.
pub fn score_pair(a: &EntityRecord, b: &EntityRecord, config: &ResolveConfig) -> MatchResult {
    let mut field_scores = Vec::with_capacity(config.fields.len());
    let mut included: Vec<(usize, f64, f64)> = Vec::new(); // (idx into field_scores, weight, score)
    let mut notes = Vec::new();
    let mut veto: Option<String> = None;

    for fc in &config.fields {
        let va = a.present_field(&fc.field);
        let vb = b.present_field(&fc.field);

        let (score, note, include) = match (va, vb) {
            (Some(va), Some(vb)) => match compare(va, vb, fc.algorithm, config) {
                Ok(score) => (score, None, true),
                Err(anomaly) => {
                    notes.push(format!("field '{}': {anomaly}", fc.field));
                    (0.0, Some(anomaly), true)
                }
            },
            _ if fc.required => (0.0, Some("missing value".to_string()), true),
            _ => (0.0, Some("not compared (missing value)".to_string()), false),
        };

        if include && fc.required && score < fc.threshold && veto.is_none() {
            veto = Some(fc.field.clone());
        }

        let idx = field_scores.len();
        field_scores.push(FieldScore {
            field: fc.field.clone(),
            algorithm: fc.algorithm,
            score,
            note,
        });
        if include {
            included.push((idx, fc.weight, score));
        }
    }

    let weight_sum: f64 = included.iter().map(|(_, w, _)| w).sum();
    let aggregate_score = if weight_sum > 0.0 {
        included.iter().map(|(_, w, s)| w * s).sum::<f64>() / weight_sum
    } else {
        notes.push("no comparable fields".to_string());
        0.0
    };

    let decision = if let Some(ref field) = veto {
        notes.push(format!("required field '{field}' below its threshold (hard veto)"));
        MatchDecision::NoMatch
    } else if aggregate_score >= config.thresholds.auto_match {
        MatchDecision::Match
    } else if aggregate_score >= config.thresholds.possible {
        MatchDecision::PossibleMatch
    } else {
        MatchDecision::NoMatch
    };

    let explain = build_explain(&field_scores, &included, weight_sum, notes);

    MatchResult {
        record_a: a.id.clone(),
        record_b: b.id.clone(),
        field_scores,
        aggregate_score,
        decision,
        explain,
    }
}

/// Field-level comparison; `Err` is a comparison anomaly (incompatible
/// value types for the algorithm), which scores 0 with a note.
fn compare(
    a: &FieldValue,
    b: &FieldValue,
    algorithm: AlgorithmKind,
    config: &ResolveConfig,
) -> Result<f64, String> {
    if algorithm == AlgorithmKind::Exact {
        // Typed equality where both sides agree on the type; punctuation
        // stripping must not conflate 1200.5 with 12005.
        let equal = match (a, b) {
            (FieldValue::Number(x), FieldValue::Number(y)) => x == y,
            (FieldValue::Date(x), FieldValue::Date(y)) => x == y,
            _ => {
                normalize(&a.render(), &config.normalization)
                    == normalize(&b.render(), &config.normalization)
            }
        };
        return Ok(if equal { 1.0 } else { 0.0 });
    }

    for v in [a, b] {
        if v.as_text().is_none() {
            return Err(format!(
                "{algorithm} is not applicable to a {} value",
                v.type_name()
            ));
        }
    }

    let na = normalize(&a.render(), &config.normalization);
    let nb = normalize(&b.render(), &config.normalization);
    Ok(similarity(&na, &nb, algorithm, &config.similarity))
}

fn build_explain(
    field_scores: &[FieldScore],
    included: &[(usize, f64, f64)],
    weight_sum: f64,
    notes: Vec<String>,
) -> Explain {
    if weight_sum <= 0.0 {
        return Explain { contributing: Vec::new(), penalizing: Vec::new(), notes };
    }

    let mut contributing: Vec<FieldContribution> = included
        .iter()
        .filter(|(_, _, s)| *s > 0.0)
        .map(|(idx, w, s)| FieldContribution {
            field: field_scores[*idx].field.clone(),
            weighted_contribution: w * s / weight_sum,
        })
        .collect();
    contributing.sort_by(|x, y| {
        y.weighted_contribution
            .partial_cmp(&x.weighted_contribution)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.field.cmp(&y.field))
    });
    contributing.truncate(EXPLAIN_TOP);

    let mut penalizing: Vec<FieldContribution> = included
        .iter()
        .filter(|(_, _, s)| *s < 1.0)
        .map(|(idx, w, s)| FieldContribution {
            field: field_scores[*idx].field.clone(),
            weighted_contribution: w * (1.0 - s) / weight_sum,
        })
        .collect();
    penalizing.sort_by(|x, y| {
        y.weighted_contribution
            .partial_cmp(&x.weighted_contribution)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.field.cmp(&y.field))
    });
    penalizing.truncate(EXPLAIN_TOP);

    Explain { contributing, penalizing, notes }
}
