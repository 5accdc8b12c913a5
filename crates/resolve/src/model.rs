use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::config::{AlgorithmKind, MergeStrategyKind};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Typed field value. Dispatch over this is exhaustive; a value that doesn't
/// fit the configured algorithm is a comparison anomaly, never a panic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Empty text counts as absent for completeness and merging.
    pub fn is_present(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Text(s) => !s.trim().is_empty(),
            _ => true,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Date(_) => "date",
            Self::Null => "null",
        }
    }

    /// Canonical rendering used for grouping identical values and for
    /// length comparison in `longest_value`.
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::Date(d) => d.to_string(),
            Self::Null => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Company,
    Address,
    Product,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Person => write!(f, "person"),
            Self::Company => write!(f, "company"),
            Self::Address => write!(f, "address"),
            Self::Product => write!(f, "product"),
        }
    }
}

/// One observation of an entity from one source system. Immutable; the
/// engine only ever reads these.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub id: String,
    pub entity_type: EntityType,
    pub source_system: String,
    pub tenant_id: String,
    pub observed_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl EntityRecord {
    /// Present (non-null, non-blank) value for a field, if any.
    pub fn present_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).filter(|v| v.is_present())
    }
}

// ---------------------------------------------------------------------------
// Pair scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    Match,
    PossibleMatch,
    NoMatch,
}

impl std::fmt::Display for MatchDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::PossibleMatch => write!(f, "possible_match"),
            Self::NoMatch => write!(f, "no_match"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldScore {
    pub field: String,
    pub algorithm: AlgorithmKind,
    pub score: f64,
    /// Set when the field was excluded, vetoed, or scored 0 for an
    /// anomalous reason (e.g. type mismatch with the algorithm).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldContribution {
    pub field: String,
    pub weighted_contribution: f64,
}

/// Audit trail for one compared pair: which fields pushed the score up,
/// which pulled it down, and anything unusual that happened on the way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Explain {
    pub contributing: Vec<FieldContribution>,
    pub penalizing: Vec<FieldContribution>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub record_a: String,
    pub record_b: String,
    pub field_scores: Vec<FieldScore>,
    pub aggregate_score: f64,
    pub decision: MatchDecision,
    pub explain: Explain,
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterFlag {
    /// The component contained an internal no_match edge and was split on
    /// its lowest-aggregate match edges. Downstream review recommended.
    NonTransitiveSplit,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCluster {
    /// Sorted member record ids.
    pub record_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ClusterFlag>,
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QualityScore {
    pub overall: f64,
    pub completeness: f64,
    pub validity: f64,
    pub freshness: f64,
    pub consistency: f64,
}

// ---------------------------------------------------------------------------
// Merge output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CandidateValue {
    pub value: FieldValue,
    pub record_id: String,
    pub quality: f64,
}

/// Recorded whenever source values disagreed for a field, whether or not a
/// strategy auto-resolved the disagreement.
#[derive(Debug, Clone, Serialize)]
pub struct MergeConflict {
    pub field: String,
    pub candidates: Vec<CandidateValue>,
    pub resolved: Option<FieldValue>,
    pub strategy: MergeStrategyKind,
    pub requires_manual_review: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoldenRecord {
    pub id: String,
    pub entity_type: EntityType,
    pub tenant_id: String,
    pub version: u32,
    pub fields: BTreeMap<String, FieldValue>,
    /// Required fields with no usable value in any source. Explicitly
    /// surfaced rather than silently guessed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_fields: Vec<String>,
    pub source_record_ids: Vec<String>,
    pub conflicts: Vec<MergeConflict>,
    pub quality_score: f64,
    pub merged_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

/// Result of re-merging against a prior golden record: the prior is never
/// mutated, only returned with its supersession pointer set.
#[derive(Debug, Clone, Serialize)]
pub struct Remerge {
    pub golden: GoldenRecord,
    pub superseded: GoldenRecord,
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingId,
    EntityTypeMismatch,
    DuplicateId,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId => write!(f, "missing_id"),
            Self::EntityTypeMismatch => write!(f, "entity_type_mismatch"),
            Self::DuplicateId => write!(f, "duplicate_id"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    /// Blank when the record had no id at all.
    pub record_id: String,
    pub source_system: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// Bucket over the hard cap: processed in full, but the blocking key
    /// is probably too coarse for this data.
    OversizedBucket { key: String, size: usize, hard_cap: usize },
    /// A connected component held an internal no_match edge and was split.
    SplitCluster { record_ids: Vec<String> },
    /// No source in the cluster had a usable value for a required field.
    UnresolvedRequiredField { golden_id: String, field: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input_records: usize,
    pub skipped_records: usize,
    pub buckets: usize,
    pub candidate_pairs: usize,
    pub compared_pairs: usize,
    pub pruned_pairs: usize,
    pub matches: usize,
    pub possible_matches: usize,
    pub no_matches: usize,
    pub clusters: usize,
    pub golden_records: usize,
    pub conflicts: usize,
    pub manual_review_fields: usize,
    pub decision_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub entity_type: EntityType,
    pub engine_version: String,
    pub run_at: String,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionOutcome {
    pub meta: RunMeta,
    pub summary: RunSummary,
    pub golden_records: Vec<GoldenRecord>,
    pub match_results: Vec<MatchResult>,
    pub clusters: Vec<DuplicateCluster>,
    pub skipped: Vec<SkippedRecord>,
    pub warnings: Vec<RunWarning>,
}

impl ResolutionOutcome {
    /// Conflicts the surrounding application must route to a human review
    /// queue. How that queue is presented is the caller's concern.
    pub fn manual_review_conflicts(&self) -> Vec<&MergeConflict> {
        self.golden_records
            .iter()
            .flat_map(|g| &g.conflicts)
            .filter(|c| c.requires_manual_review)
            .collect()
    }
}
