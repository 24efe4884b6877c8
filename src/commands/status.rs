use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::EvaluationStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.state_root.join("evaluations.sqlite"));

    info!(state_root = %args.state_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = EvaluationStore::open(&db_path)?;
    let totals = store.totals()?;

    info!(
        path = %db_path.display(),
        records = totals.records,
        distinct_dates = totals.distinct_dates,
        earliest_date = %totals.earliest_date.map(|d| d.to_string()).unwrap_or_default(),
        latest_date = %totals.latest_date.map(|d| d.to_string()).unwrap_or_default(),
        "database status"
    );

    for (ticket_type, count) in &totals.by_ticket_type {
        info!(ticket_type = %ticket_type, count = *count, "ticket type count");
    }

    match store.max_start_time()? {
        Some(watermark) => info!(watermark = %watermark, "latest persisted run start time"),
        None => info!("no persisted run start times"),
    }

    Ok(())
}
