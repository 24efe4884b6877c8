use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cli::SyncArgs;
use crate::model::{DropCounts, RawRun, SyncCounts, SyncPaths, SyncRunManifest};
use crate::pipeline::aggregate::dedup_latest;
use crate::pipeline::{Pipeline, parse_raw_run};
use crate::store::EvaluationStore;
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: SyncArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("sync-{}", utc_compact_string(started_ts));

    let state_root = args.state_root.clone();
    ensure_directory(&state_root)?;

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| state_root.join("evaluations.sqlite"));
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        state_root
            .join("manifests")
            .join(format!("sync_run_{}.json", utc_compact_string(started_ts)))
    });

    info!(
        run_id = %run_id,
        input = %args.input.display(),
        db = %db_path.display(),
        "starting sync"
    );

    let store = EvaluationStore::open(&db_path)?;
    if let Some(watermark) = store.max_start_time()? {
        info!(resume_from = %watermark, "store watermark before sync");
    }

    let (runs, malformed) = load_raw_runs(&args.input)?;
    let fetched = runs.len() + malformed;
    if malformed > 0 {
        warn!(malformed, "skipped records that failed to deserialize");
    }

    let pipeline = Pipeline::new()?;
    let mut drops = DropCounts::default();
    let mut classified = Vec::new();
    for run in &runs {
        match pipeline.classify_run(run) {
            Ok(record) => classified.push(record),
            Err(reason) => {
                debug!(run_id = %run.id, reason = ?reason, "dropped run");
                drops.record(reason);
            }
        }
    }
    let classified_count = classified.len();

    let winners = dedup_latest(classified);
    let deduplicated = winners.len();

    let mut applied = 0_usize;
    let mut skipped_stale = 0_usize;
    let mut failed = 0_usize;
    for record in &winners {
        match store.upsert_if_newer(record) {
            Ok(true) => applied += 1,
            Ok(false) => skipped_stale += 1,
            Err(err) => {
                // Per-record failure: the batch keeps going, a rerun is safe.
                warn!(
                    error = %err,
                    date = %record.date,
                    ticket_id = %record.ticket_id,
                    "failed to upsert record"
                );
                failed += 1;
            }
        }
    }

    let counts = SyncCounts {
        fetched,
        malformed,
        classified: classified_count,
        deduplicated,
        applied,
        skipped_stale,
        failed,
        drops,
    };

    let manifest = SyncRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: if failed == 0 { "completed" } else { "completed_with_failures" }.to_string(),
        started_at,
        updated_at: now_utc_string(),
        paths: SyncPaths {
            state_root: state_root.display().to_string(),
            input_path: args.input.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        counts: counts.clone(),
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote sync run manifest");
    info!(
        fetched = counts.fetched,
        malformed = counts.malformed,
        classified = counts.classified,
        dropped = counts.drops.total(),
        not_evaluator = counts.drops.not_evaluator,
        missing_output = counts.drops.missing_output,
        unparseable_output = counts.drops.unparseable_output,
        unrecognized_experiment = counts.drops.unrecognized_experiment,
        no_identifier = counts.drops.no_identifier,
        deduplicated = counts.deduplicated,
        applied = counts.applied,
        skipped_stale = counts.skipped_stale,
        failed = counts.failed,
        "sync completed"
    );

    Ok(())
}

/// Parse a JSON export into raw runs. The export must be an array; individual
/// records that fail to deserialize are counted, not fatal.
fn load_raw_runs(path: &Path) -> Result<(Vec<RawRun>, usize)> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let values: Vec<Value> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse run export {}", path.display()))?;

    let mut runs = Vec::with_capacity(values.len());
    let mut malformed = 0_usize;
    for value in values {
        match parse_raw_run(value) {
            Some(run) => runs.push(run),
            None => malformed += 1,
        }
    }

    Ok((runs, malformed))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_raw_runs_counts_malformed_records() {
        let file = tempfile_path("runs.json");
        let data = r#"[
            {"id": "r1", "name": "detailed_similarity_evaluator", "outputs": {"quality": "high_quality"}},
            {"name": "missing id"},
            {"id": "r2", "name": "other_evaluator"}
        ]"#;
        fs::File::create(&file)
            .unwrap()
            .write_all(data.as_bytes())
            .unwrap();

        let (runs, malformed) = load_raw_runs(&file).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(malformed, 1);

        fs::remove_file(&file).ok();
    }

    #[test]
    fn load_raw_runs_rejects_non_array_export() {
        let file = tempfile_path("bad.json");
        fs::write(&file, b"{\"runs\": []}").unwrap();
        assert!(load_raw_runs(&file).is_err());
        fs::remove_file(&file).ok();
    }

    fn tempfile_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("evalsync-test-{}-{name}", std::process::id()));
        path
    }
}
