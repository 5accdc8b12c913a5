use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::model::EntityType;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ResolveConfig {
    pub name: String,
    pub entity_type: EntityType,
    pub fields: Vec<FieldMatchConfig>,
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub thresholds: DecisionThresholds,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Field matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlgorithmKind {
    Exact,
    Levenshtein,
    DamerauLevenshtein,
    JaroWinkler,
    Phonetic,
    TokenJaroWinkler,
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Levenshtein => write!(f, "levenshtein"),
            Self::DamerauLevenshtein => write!(f, "damerau-levenshtein"),
            Self::JaroWinkler => write!(f, "jaro-winkler"),
            Self::Phonetic => write!(f, "phonetic"),
            Self::TokenJaroWinkler => write!(f, "token-jaro-winkler"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMatchConfig {
    pub field: String,
    pub algorithm: AlgorithmKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Per-field floor. On a `required` field a score below this is a hard
    /// veto for the whole pair.
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub required: bool,
}

fn default_weight() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Decision thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DecisionThresholds {
    #[serde(rename = "match", default = "default_match_threshold")]
    pub auto_match: f64,
    #[serde(default = "default_possible_threshold")]
    pub possible: f64,
}

fn default_match_threshold() -> f64 {
    0.90
}

fn default_possible_threshold() -> f64 {
    0.60
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            auto_match: default_match_threshold(),
            possible: default_possible_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BlockingConfig {
    pub keys: Vec<BlockingKeyConfig>,
    /// Buckets above this size run the length pre-filter before scoring.
    #[serde(default = "default_max_bucket_size")]
    pub max_bucket_size: usize,
    /// Buckets above this size are still processed but flagged as a
    /// blocking-key quality problem.
    #[serde(default = "default_hard_cap")]
    pub hard_cap: usize,
}

fn default_max_bucket_size() -> usize {
    64
}

fn default_hard_cap() -> usize {
    512
}

/// One blocking pass. The key is the joined output of all components over
/// the normalized field values; an empty component suppresses the key.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockingKeyConfig {
    pub name: String,
    pub components: Vec<KeyComponent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyComponent {
    pub field: String,
    #[serde(default = "default_transform")]
    pub transform: KeyTransform,
    /// Character count for `prefix`/`suffix`, digit count for `digits`.
    #[serde(default)]
    pub length: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTransform {
    Full,
    Prefix,
    Suffix,
    Digits,
    Phonetic,
}

fn default_transform() -> KeyTransform {
    KeyTransform::Full
}

// ---------------------------------------------------------------------------
// Similarity options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default)]
    pub edit: EditCosts,
    #[serde(default)]
    pub winkler: WinklerConfig,
    #[serde(default)]
    pub phonetic: PhoneticConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EditCosts {
    #[serde(default = "default_cost")]
    pub insert: f64,
    #[serde(default = "default_cost")]
    pub delete: f64,
    #[serde(default = "default_cost")]
    pub substitute: f64,
}

fn default_cost() -> f64 {
    1.0
}

impl Default for EditCosts {
    fn default() -> Self {
        Self { insert: 1.0, delete: 1.0, substitute: 1.0 }
    }
}

impl EditCosts {
    pub fn max_single(&self) -> f64 {
        self.insert.max(self.delete).max(self.substitute)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WinklerConfig {
    /// Prefix bonus scale; values above 0.25 can push scores past 1.0 and
    /// are rejected at validation.
    #[serde(default = "default_prefix_scale")]
    pub prefix_scale: f64,
    #[serde(default = "default_max_prefix")]
    pub max_prefix: usize,
}

fn default_prefix_scale() -> f64 {
    0.1
}

fn default_max_prefix() -> usize {
    4
}

impl Default for WinklerConfig {
    fn default() -> Self {
        Self {
            prefix_scale: default_prefix_scale(),
            max_prefix: default_max_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneticEncoder {
    Soundex,
    Cologne,
    Metaphone,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PhoneticConfig {
    #[serde(default = "default_encoder")]
    pub encoder: PhoneticEncoder,
    /// When codes differ, fall back to edit distance over the codes for
    /// partial credit instead of scoring 0.
    #[serde(default)]
    pub code_fallback: bool,
}

fn default_encoder() -> PhoneticEncoder {
    PhoneticEncoder::Soundex
}

impl Default for PhoneticConfig {
    fn default() -> Self {
        Self { encoder: default_encoder(), code_fallback: false }
    }
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub weights: QualityWeights,
    #[serde(default = "default_half_life")]
    pub freshness_half_life_days: f64,
    /// Per-field format checks feeding the validity dimension.
    #[serde(default)]
    pub formats: HashMap<String, FieldFormat>,
    #[serde(default)]
    pub consistency_rules: Vec<ConsistencyRule>,
}

fn default_half_life() -> f64 {
    180.0
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            required_fields: Vec::new(),
            weights: QualityWeights::default(),
            freshness_half_life_days: default_half_life(),
            formats: HashMap::new(),
            consistency_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QualityWeights {
    #[serde(default = "default_q_completeness")]
    pub completeness: f64,
    #[serde(default = "default_q_validity")]
    pub validity: f64,
    #[serde(default = "default_q_freshness")]
    pub freshness: f64,
    #[serde(default = "default_q_consistency")]
    pub consistency: f64,
}

fn default_q_completeness() -> f64 {
    0.35
}

fn default_q_validity() -> f64 {
    0.30
}

fn default_q_freshness() -> f64 {
    0.20
}

fn default_q_consistency() -> f64 {
    0.15
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: default_q_completeness(),
            validity: default_q_validity(),
            freshness: default_q_freshness(),
            consistency: default_q_consistency(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    Email,
    Phone,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyKind {
    /// `earlier` must not be after `later` when both are dates.
    DateOrder,
    /// `field` must be a non-negative number.
    NonNegative,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsistencyRule {
    pub kind: ConsistencyKind,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub earlier: Option<String>,
    #[serde(default)]
    pub later: Option<String>,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategyKind {
    MostRecent,
    HighestQualitySource,
    LongestValue,
    MostFrequentValue,
    SourcePriorityList,
    ManualReview,
}

impl std::fmt::Display for MergeStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MostRecent => write!(f, "most_recent"),
            Self::HighestQualitySource => write!(f, "highest_quality_source"),
            Self::LongestValue => write!(f, "longest_value"),
            Self::MostFrequentValue => write!(f, "most_frequent_value"),
            Self::SourcePriorityList => write!(f, "source_priority_list"),
            Self::ManualReview => write!(f, "manual_review"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    #[serde(default = "default_merge_strategy")]
    pub default_strategy: MergeStrategyKind,
    #[serde(default)]
    pub fields: HashMap<String, MergeStrategyKind>,
    /// Ranked source-system names for `source_priority_list`.
    #[serde(default)]
    pub source_priority: Vec<String>,
}

fn default_merge_strategy() -> MergeStrategyKind {
    MergeStrategyKind::MostRecent
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_merge_strategy(),
            fields: HashMap::new(),
            source_priority: Vec::new(),
        }
    }
}

impl MergeConfig {
    pub fn strategy_for(&self, field: &str) -> MergeStrategyKind {
        self.fields.get(field).copied().unwrap_or(self.default_strategy)
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NormalizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub strip_diacritics: bool,
    #[serde(default = "default_true")]
    pub strip_punctuation: bool,
    #[serde(default = "default_true")]
    pub case_fold: bool,
    #[serde(default = "default_true")]
    pub collapse_whitespace: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strip_diacritics: true,
            strip_punctuation: true,
            case_fold: true,
            collapse_whitespace: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Sources (CSV ingestion adapter) + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    pub id_column: String,
    pub observed_at_column: String,
    /// Engine field name → CSV column name.
    pub fields: HashMap<String, String>,
    /// Engine field name → parse kind; unlisted fields load as text.
    #[serde(default)]
    pub types: HashMap<String, FieldKind>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub json: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ResolveConfig {
    pub fn from_toml(input: &str) -> Result<Self, ResolveError> {
        let config: ResolveConfig =
            toml::from_str(input).map_err(|e| ResolveError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ResolveError> {
        if self.fields.is_empty() {
            return Err(ResolveError::ConfigValidation(
                "at least one field match config is required".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for fc in &self.fields {
            if !seen.insert(fc.field.as_str()) {
                return Err(ResolveError::ConfigValidation(format!(
                    "duplicate field config for '{}'",
                    fc.field
                )));
            }
            if !(fc.weight.is_finite() && fc.weight > 0.0) {
                return Err(ResolveError::ConfigValidation(format!(
                    "field '{}': weight must be a positive number, got {}",
                    fc.field, fc.weight
                )));
            }
            if !(0.0..=1.0).contains(&fc.threshold) {
                return Err(ResolveError::ConfigValidation(format!(
                    "field '{}': threshold must be in [0,1], got {}",
                    fc.field, fc.threshold
                )));
            }
        }

        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.auto_match) || !(0.0..=1.0).contains(&t.possible) {
            return Err(ResolveError::ConfigValidation(format!(
                "decision thresholds must be in [0,1], got match={} possible={}",
                t.auto_match, t.possible
            )));
        }
        if t.possible > t.auto_match {
            return Err(ResolveError::ConfigValidation(format!(
                "possible threshold {} exceeds match threshold {}",
                t.possible, t.auto_match
            )));
        }

        // Merge strategies must point at configured fields.
        for field in self.merge.fields.keys() {
            if !seen.contains(field.as_str()) {
                return Err(ResolveError::ConfigValidation(format!(
                    "merge strategy references unknown field '{field}'"
                )));
            }
        }
        let uses_priority = self.merge.default_strategy == MergeStrategyKind::SourcePriorityList
            || self
                .merge
                .fields
                .values()
                .any(|s| *s == MergeStrategyKind::SourcePriorityList);
        if uses_priority && self.merge.source_priority.is_empty() {
            return Err(ResolveError::ConfigValidation(
                "source_priority_list strategy requires merge.source_priority".into(),
            ));
        }

        // Blocking
        if self.blocking.keys.is_empty() {
            return Err(ResolveError::ConfigValidation(
                "at least one blocking key is required".into(),
            ));
        }
        if self.blocking.hard_cap < self.blocking.max_bucket_size {
            return Err(ResolveError::ConfigValidation(format!(
                "blocking hard_cap {} is below max_bucket_size {}",
                self.blocking.hard_cap, self.blocking.max_bucket_size
            )));
        }
        for key in &self.blocking.keys {
            if key.components.is_empty() {
                return Err(ResolveError::ConfigValidation(format!(
                    "blocking key '{}' has no components",
                    key.name
                )));
            }
            for comp in &key.components {
                match comp.transform {
                    KeyTransform::Prefix | KeyTransform::Suffix => {
                        if comp.length.unwrap_or(0) == 0 {
                            return Err(ResolveError::ConfigValidation(format!(
                                "blocking key '{}': {} transform on '{}' requires length >= 1",
                                key.name,
                                if comp.transform == KeyTransform::Prefix { "prefix" } else { "suffix" },
                                comp.field
                            )));
                        }
                    }
                    KeyTransform::Digits => {
                        if comp.length == Some(0) {
                            return Err(ResolveError::ConfigValidation(format!(
                                "blocking key '{}': digits length on '{}' must be >= 1",
                                key.name, comp.field
                            )));
                        }
                    }
                    KeyTransform::Full | KeyTransform::Phonetic => {}
                }
            }
        }

        // Similarity options
        let edit = &self.similarity.edit;
        for (name, cost) in [
            ("insert", edit.insert),
            ("delete", edit.delete),
            ("substitute", edit.substitute),
        ] {
            if !(cost.is_finite() && cost > 0.0) {
                return Err(ResolveError::ConfigValidation(format!(
                    "edit cost '{name}' must be positive, got {cost}"
                )));
            }
        }
        let w = &self.similarity.winkler;
        if !(w.prefix_scale > 0.0 && w.prefix_scale <= 0.25) {
            return Err(ResolveError::ConfigValidation(format!(
                "winkler prefix_scale must be in (0, 0.25], got {}",
                w.prefix_scale
            )));
        }
        if w.max_prefix == 0 {
            return Err(ResolveError::ConfigValidation(
                "winkler max_prefix must be >= 1".into(),
            ));
        }

        // Quality
        let qw = &self.quality.weights;
        let sum = qw.completeness + qw.validity + qw.freshness + qw.consistency;
        if [qw.completeness, qw.validity, qw.freshness, qw.consistency]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
            || sum <= 0.0
        {
            return Err(ResolveError::ConfigValidation(
                "quality weights must be non-negative with a positive sum".into(),
            ));
        }
        if !(self.quality.freshness_half_life_days.is_finite()
            && self.quality.freshness_half_life_days > 0.0)
        {
            return Err(ResolveError::ConfigValidation(format!(
                "freshness_half_life_days must be positive, got {}",
                self.quality.freshness_half_life_days
            )));
        }
        for rule in &self.quality.consistency_rules {
            match rule.kind {
                ConsistencyKind::DateOrder => {
                    if rule.earlier.is_none() || rule.later.is_none() {
                        return Err(ResolveError::ConfigValidation(
                            "date_order rule requires 'earlier' and 'later' fields".into(),
                        ));
                    }
                }
                ConsistencyKind::NonNegative => {
                    if rule.field.is_none() {
                        return Err(ResolveError::ConfigValidation(
                            "non_negative rule requires 'field'".into(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
