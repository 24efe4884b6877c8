use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{EvaluationRecord, TicketId};

/// Keep exactly one record per `(date, ticket_id)`: the one with the latest
/// start time. Records without a timestamp lose to any timestamped record;
/// a group with no timestamps at all keeps the first record encountered.
/// Output is sorted by key so batch application is deterministic.
pub fn dedup_latest(records: Vec<EvaluationRecord>) -> Vec<EvaluationRecord> {
    let mut winners: HashMap<(NaiveDate, TicketId), EvaluationRecord> = HashMap::new();

    for record in records {
        match winners.entry((record.date, record.ticket_id.clone())) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                if is_newer(record.start_time, slot.get().start_time) {
                    slot.insert(record);
                }
            }
        }
    }

    let mut deduped: Vec<EvaluationRecord> = winners.into_values().collect();
    deduped.sort_by(|a, b| (a.date, &a.ticket_id).cmp(&(b.date, &b.ticket_id)));
    deduped
}

/// Strict-newer comparison shared by the in-batch dedup and the store's
/// monotonic upsert guard. Ties and missing candidate timestamps never win,
/// which is what makes re-applying a batch idempotent.
pub fn is_newer(candidate: Option<DateTime<Utc>>, incumbent: Option<DateTime<Utc>>) -> bool {
    match (candidate, incumbent) {
        (Some(c), Some(i)) => c > i,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
