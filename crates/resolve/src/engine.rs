use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use crossbeam_channel::{bounded, unbounded};

use crate::blocking;
use crate::cluster::build_clusters;
use crate::config::{FieldKind, ResolveConfig, SourceConfig};
use crate::error::ResolveError;
use crate::merge::merge_cluster;
use crate::model::{
    DuplicateCluster, EntityRecord, FieldValue, MatchDecision, MatchResult, QualityScore, Remerge,
    ResolutionOutcome, RunMeta, RunSummary, SkipReason, SkippedRecord,
};
use crate::quality::{score_quality, Validators};
use crate::scorer::score_pair;

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

/// Cooperative cancellation token. Checked between buckets, never
/// mid-bucket, so a cancelled run discards partial work cleanly.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker threads for pairwise scoring; 0 means available parallelism.
    pub workers: usize,
    pub cancel: CancelToken,
    /// Fixed clock for reproducible freshness scoring; defaults to now.
    pub now: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Resolve one tenant's records of one entity type into golden records.
pub fn run(config: &ResolveConfig, input: &[EntityRecord]) -> Result<ResolutionOutcome, ResolveError> {
    run_with(config, input, &RunOptions::default())
}

pub fn run_with(
    config: &ResolveConfig,
    input: &[EntityRecord],
    options: &RunOptions,
) -> Result<ResolutionOutcome, ResolveError> {
    // Programmatically-built configs take the same validation gate as TOML.
    config.validate()?;

    let now = options.now.unwrap_or_else(Utc::now);
    let workers = if options.workers == 0 {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        options.workers
    };

    // Malformed records are excluded and reported, never fatal.
    let mut skipped = Vec::new();
    let mut valid: Vec<EntityRecord> = Vec::with_capacity(input.len());
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for record in input {
        let reason = if record.id.trim().is_empty() {
            Some(SkipReason::MissingId)
        } else if record.entity_type != config.entity_type {
            Some(SkipReason::EntityTypeMismatch)
        } else if !seen_ids.insert(record.id.as_str()) {
            Some(SkipReason::DuplicateId)
        } else {
            None
        };
        match reason {
            Some(reason) => skipped.push(SkippedRecord {
                record_id: record.id.clone(),
                source_system: record.source_system.clone(),
                reason,
            }),
            None => valid.push(record.clone()),
        }
    }

    let validators = Validators::new();
    let qualities: BTreeMap<&str, QualityScore> = valid
        .iter()
        .map(|r| (r.id.as_str(), score_quality(r, &config.quality, &validators, now)))
        .collect();

    let plan = blocking::plan(&valid, config);
    let mut warnings = plan.warnings.clone();

    if options.cancel.is_cancelled() {
        return Err(ResolveError::Cancelled);
    }

    let match_results = score_buckets(&valid, &plan.buckets, config, workers, &options.cancel)?;

    let record_ids: Vec<String> = valid.iter().map(|r| r.id.clone()).collect();
    let (clusters, cluster_warnings) = build_clusters(&record_ids, &match_results);
    warnings.extend(cluster_warnings);

    let records_by_id: BTreeMap<&str, &EntityRecord> =
        valid.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut golden_records = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
        let (golden, merge_warnings) =
            merge_cluster(cluster, &records_by_id, &qualities, config, &validators, 1, now);
        warnings.extend(merge_warnings);
        golden_records.push(golden);
    }

    let summary = summarize(&valid, &skipped, &plan, &match_results, &clusters, &golden_records);

    Ok(ResolutionOutcome {
        meta: RunMeta {
            config_name: config.name.clone(),
            entity_type: config.entity_type,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: now.to_rfc3339(),
            workers,
        },
        summary,
        golden_records,
        match_results,
        clusters,
        skipped,
        warnings,
    })
}

/// Score every bucket's pairs on a bounded worker pool. Buckets are
/// independent, so this is lock-free fan-out; results are reassembled in
/// bucket order so the output never depends on scheduling.
fn score_buckets(
    records: &[EntityRecord],
    buckets: &[blocking::BucketPlan],
    config: &ResolveConfig,
    workers: usize,
    cancel: &CancelToken,
) -> Result<Vec<MatchResult>, ResolveError> {
    if buckets.is_empty() {
        return Ok(Vec::new());
    }

    let workers = workers.max(1).min(buckets.len());
    let (job_tx, job_rx) = bounded::<usize>(workers * 2);
    let (result_tx, result_rx) = unbounded::<(usize, Vec<MatchResult>)>();

    let mut by_bucket: Vec<Option<Vec<MatchResult>>> = Vec::new();
    by_bucket.resize_with(buckets.len(), || None);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok(bucket_idx) = job_rx.recv() {
                    if cancel.is_cancelled() {
                        // Drain without scoring; the dispatcher stops feeding.
                        continue;
                    }
                    let scored: Vec<MatchResult> = buckets[bucket_idx]
                        .pairs
                        .iter()
                        .map(|&(a, b)| score_pair(&records[a], &records[b], config))
                        .collect();
                    let _ = result_tx.send((bucket_idx, scored));
                }
            });
        }
        drop(result_tx);

        for idx in 0..buckets.len() {
            if cancel.is_cancelled() {
                break;
            }
            if job_tx.send(idx).is_err() {
                break;
            }
        }
        drop(job_tx);

        for (idx, scored) in result_rx {
            by_bucket[idx] = Some(scored);
        }
    });

    if cancel.is_cancelled() {
        return Err(ResolveError::Cancelled);
    }

    Ok(by_bucket.into_iter().flatten().flatten().collect())
}

fn summarize(
    valid: &[EntityRecord],
    skipped: &[SkippedRecord],
    plan: &blocking::BlockingPlan,
    match_results: &[MatchResult],
    clusters: &[DuplicateCluster],
    golden_records: &[crate::model::GoldenRecord],
) -> RunSummary {
    let mut decision_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut matches = 0;
    let mut possible_matches = 0;
    let mut no_matches = 0;
    for r in match_results {
        *decision_counts.entry(r.decision.to_string()).or_insert(0) += 1;
        match r.decision {
            MatchDecision::Match => matches += 1,
            MatchDecision::PossibleMatch => possible_matches += 1,
            MatchDecision::NoMatch => no_matches += 1,
        }
    }

    let conflicts: usize = golden_records.iter().map(|g| g.conflicts.len()).sum();
    let manual_review_fields: usize = golden_records
        .iter()
        .flat_map(|g| &g.conflicts)
        .filter(|c| c.requires_manual_review)
        .count();

    RunSummary {
        input_records: valid.len() + skipped.len(),
        skipped_records: skipped.len(),
        buckets: plan.bucket_count,
        candidate_pairs: plan.candidate_pairs,
        compared_pairs: match_results.len(),
        pruned_pairs: plan.pruned_pairs,
        matches,
        possible_matches,
        no_matches,
        clusters: clusters.len(),
        golden_records: golden_records.len(),
        conflicts,
        manual_review_fields,
        decision_counts,
    }
}

// ---------------------------------------------------------------------------
// Re-merge
// ---------------------------------------------------------------------------

/// Re-merge after new observations arrive for an existing golden record.
/// `sources` must contain every record behind `prior` plus the new ones.
/// The prior record is never mutated: a new version is produced and the
/// prior comes back with `superseded_by` pointing at it.
pub fn remerge(
    config: &ResolveConfig,
    prior: &crate::model::GoldenRecord,
    sources: &[EntityRecord],
    options: &RunOptions,
) -> Result<Remerge, ResolveError> {
    config.validate()?;
    let now = options.now.unwrap_or_else(Utc::now);

    let mut record_ids: Vec<String> = sources.iter().map(|r| r.id.clone()).collect();
    record_ids.sort();
    record_ids.dedup();
    let cluster = DuplicateCluster { record_ids, flags: Vec::new() };

    let validators = Validators::new();
    let records_by_id: BTreeMap<&str, &EntityRecord> =
        sources.iter().map(|r| (r.id.as_str(), r)).collect();
    let qualities: BTreeMap<&str, QualityScore> = sources
        .iter()
        .map(|r| (r.id.as_str(), score_quality(r, &config.quality, &validators, now)))
        .collect();

    let (golden, _) = merge_cluster(
        &cluster,
        &records_by_id,
        &qualities,
        config,
        &validators,
        prior.version + 1,
        now,
    );

    let mut superseded = prior.clone();
    superseded.superseded_by = Some(golden.id.clone());

    Ok(Remerge { golden, superseded })
}

// ---------------------------------------------------------------------------
// CSV ingestion adapter
// ---------------------------------------------------------------------------

/// Load one source's CSV into records, applying the configured column
/// mapping and per-field parse kinds.
pub fn load_csv_records(
    source_name: &str,
    csv_data: &str,
    source: &SourceConfig,
    entity_type: crate::model::EntityType,
) -> Result<Vec<EntityRecord>, ResolveError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ResolveError::Io(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let idx = |name: &str| -> Result<usize, ResolveError> {
        headers.iter().position(|h| h == name).ok_or_else(|| ResolveError::MissingColumn {
            source: source_name.into(),
            column: name.into(),
        })
    };

    let id_idx = idx(&source.id_column)?;
    let observed_idx = idx(&source.observed_at_column)?;

    let mut field_cols: Vec<(&str, usize, FieldKind)> = Vec::with_capacity(source.fields.len());
    for (field, column) in &source.fields {
        let kind = source.types.get(field).copied().unwrap_or(FieldKind::Text);
        field_cols.push((field.as_str(), idx(column)?, kind));
    }
    field_cols.sort_by(|a, b| a.0.cmp(b.0));

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| ResolveError::Io(e.to_string()))?;
        let record_id = row.get(id_idx).unwrap_or("").to_string();

        let observed_raw = row.get(observed_idx).unwrap_or("");
        let observed_at = parse_observed_at(observed_raw).ok_or_else(|| ResolveError::DateParse {
            source: source_name.into(),
            record_id: record_id.clone(),
            value: observed_raw.into(),
        })?;

        let mut fields = BTreeMap::new();
        for &(field, col, kind) in &field_cols {
            let raw = row.get(col).unwrap_or("").trim();
            let value = if raw.is_empty() {
                FieldValue::Null
            } else {
                match kind {
                    FieldKind::Text => FieldValue::Text(raw.to_string()),
                    FieldKind::Number => FieldValue::Number(raw.parse().map_err(|_| {
                        ResolveError::NumberParse {
                            source: source_name.into(),
                            record_id: record_id.clone(),
                            value: raw.into(),
                        }
                    })?),
                    FieldKind::Date => FieldValue::Date(
                        chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                            ResolveError::DateParse {
                                source: source_name.into(),
                                record_id: record_id.clone(),
                                value: raw.into(),
                            }
                        })?,
                    ),
                }
            };
            fields.insert(field.to_string(), value);
        }

        records.push(EntityRecord {
            id: record_id,
            entity_type,
            source_system: source_name.to_string(),
            tenant_id: source.tenant_id.clone(),
            observed_at,
            fields,
        });
    }

    Ok(records)
}

fn parse_observed_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}
