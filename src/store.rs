use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, ToSql, params};

use crate::model::{EvaluationRecord, QualityCategory, TicketId, TicketType};
use crate::pipeline::aggregate::is_newer;
use crate::util::{format_start_time, parse_start_time};

/// Legacy rows imported from older databases occasionally carry free-form
/// date strings; the shape filter keeps them out of every reporting query.
const DATE_SHAPE_GLOB: &str = "[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]";

impl ToSql for TicketId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Number(num) => Ok(ToSqlOutput::from(*num)),
            Self::Text(text) => Ok(ToSqlOutput::from(text.as_str())),
        }
    }
}

impl FromSql for TicketId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(num) => Ok(Self::Number(num)),
            ValueRef::Text(raw) => match std::str::from_utf8(raw) {
                Ok(text) => Ok(Self::Text(text.to_owned())),
                Err(err) => Err(FromSqlError::Other(Box::new(err))),
            },
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QualityCount {
    pub date: NaiveDate,
    pub ticket_type: TicketType,
    pub quality: Option<QualityCategory>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LowQualityTicket {
    pub date: NaiveDate,
    pub ticket_id: TicketId,
    pub ticket_type: TicketType,
}

#[derive(Debug, Clone)]
pub struct StoreTotals {
    pub records: i64,
    pub distinct_dates: i64,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub by_ticket_type: Vec<(TicketType, i64)>,
}

/// Persistent keyed table of canonical evaluation records, unique per
/// `(date, ticket_id)`. Single-record atomicity only; batches rely on the
/// pipeline's idempotence rather than a wrapping transaction.
pub struct EvaluationStore {
    conn: Connection,
}

impl EvaluationStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        configure_connection(&conn)?;
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Insert or fully overwrite the record for its `(date, ticket_id)` key.
    pub fn upsert(&self, record: &EvaluationRecord) -> Result<()> {
        self.conn
            .execute(
                "
                INSERT INTO ticket_evaluations
                  (date, ticket_id, ticket_type, quality, comment, evaluation_key,
                   experiment_name, start_time)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(date, ticket_id) DO UPDATE SET
                  ticket_type=excluded.ticket_type,
                  quality=excluded.quality,
                  comment=excluded.comment,
                  evaluation_key=excluded.evaluation_key,
                  experiment_name=excluded.experiment_name,
                  start_time=excluded.start_time
                ",
                params![
                    record.date.format("%Y-%m-%d").to_string(),
                    record.ticket_id,
                    record.ticket_type.as_str(),
                    record.quality.map(QualityCategory::as_str),
                    record.comment,
                    record.evaluation_key,
                    record.experiment_name,
                    record.start_time.map(format_start_time),
                ],
            )
            .with_context(|| {
                format!(
                    "failed to upsert evaluation {} / {}",
                    record.date, record.ticket_id
                )
            })?;
        Ok(())
    }

    /// Monotonic upsert guard: write only when the candidate is strictly newer
    /// than the persisted row (a missing row always writes). Returns whether
    /// the write happened, so callers can count stale skips.
    pub fn upsert_if_newer(&self, record: &EvaluationRecord) -> Result<bool> {
        match self.stored_start_time(record.date, &record.ticket_id)? {
            None => {
                self.upsert(record)?;
                Ok(true)
            }
            Some(existing) => {
                if is_newer(record.start_time, existing) {
                    self.upsert(record)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Persisted start time for a key. Outer `None` means no row exists;
    /// `Some(None)` is a stored row without a usable timestamp.
    fn stored_start_time(
        &self,
        date: NaiveDate,
        ticket_id: &TicketId,
    ) -> Result<Option<Option<DateTime<Utc>>>> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT start_time FROM ticket_evaluations WHERE date = ?1 AND ticket_id = ?2",
                params![date.format("%Y-%m-%d").to_string(), ticket_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read stored start_time")?;

        Ok(raw.map(|value| value.as_deref().and_then(parse_start_time)))
    }

    /// Inclusive range scan ordered by `(date, ticket_id)`.
    pub fn query_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<EvaluationRecord>> {
        let mut statement = self
            .conn
            .prepare(
                "
                SELECT date, ticket_id, ticket_type, quality, comment, evaluation_key,
                       experiment_name, start_time
                FROM ticket_evaluations
                WHERE date >= ?1 AND date <= ?2 AND date GLOB ?3
                ORDER BY date, ticket_id
                ",
            )
            .context("failed to prepare range query")?;

        let rows = statement
            .query_map(
                params![
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string(),
                    DATE_SHAPE_GLOB,
                ],
                |row| {
                    let date: String = row.get(0)?;
                    let ticket_id: TicketId = row.get(1)?;
                    let ticket_type: String = row.get(2)?;
                    let quality: Option<String> = row.get(3)?;
                    let comment: Option<String> = row.get(4)?;
                    let evaluation_key: Option<String> = row.get(5)?;
                    let experiment_name: Option<String> = row.get(6)?;
                    let start_time: Option<String> = row.get(7)?;
                    Ok((
                        date,
                        ticket_id,
                        ticket_type,
                        quality,
                        comment,
                        evaluation_key,
                        experiment_name,
                        start_time,
                    ))
                },
            )
            .context("failed to run range query")?;

        let mut records = Vec::new();
        for row in rows {
            let (date, ticket_id, ticket_type, quality, comment, evaluation_key, experiment, ts) =
                row.context("failed to read evaluation row")?;
            // The GLOB filter guarantees the shape; a row that still fails to
            // parse is legacy garbage and is excluded the same way.
            let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
                continue;
            };
            records.push(EvaluationRecord {
                date,
                ticket_id,
                ticket_type: TicketType::parse(&ticket_type),
                quality: quality.as_deref().map(QualityCategory::parse),
                comment,
                evaluation_key: evaluation_key.unwrap_or_default(),
                experiment_name: experiment.unwrap_or_default(),
                start_time: ts.as_deref().and_then(parse_start_time),
            });
        }

        Ok(records)
    }

    /// Latest persisted run start time; seeds the incremental fetch window for
    /// whatever collaborator pulls new raw runs.
    pub fn max_start_time(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(start_time) FROM ticket_evaluations WHERE start_time IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .context("failed to read max start_time")?;

        Ok(raw.as_deref().and_then(parse_start_time))
    }

    /// Counts grouped by `(date, ticket_type, quality)` over an inclusive
    /// range. A null quality group is reported as `None`.
    pub fn aggregate_by(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<QualityCount>> {
        let mut statement = self
            .conn
            .prepare(
                "
                SELECT date, ticket_type, quality, COUNT(*)
                FROM ticket_evaluations
                WHERE date >= ?1 AND date <= ?2 AND date GLOB ?3
                GROUP BY date, ticket_type, quality
                ORDER BY date, ticket_type, quality
                ",
            )
            .context("failed to prepare aggregate query")?;

        let rows = statement
            .query_map(
                params![
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string(),
                    DATE_SHAPE_GLOB,
                ],
                |row| {
                    let date: String = row.get(0)?;
                    let ticket_type: String = row.get(1)?;
                    let quality: Option<String> = row.get(2)?;
                    let count: i64 = row.get(3)?;
                    Ok((date, ticket_type, quality, count))
                },
            )
            .context("failed to run aggregate query")?;

        let mut counts = Vec::new();
        for row in rows {
            let (date, ticket_type, quality, count) =
                row.context("failed to read aggregate row")?;
            let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
                continue;
            };
            counts.push(QualityCount {
                date,
                ticket_type: TicketType::parse(&ticket_type),
                quality: quality.as_deref().map(QualityCategory::parse),
                count,
            });
        }

        Ok(counts)
    }

    pub fn low_quality_tickets(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LowQualityTicket>> {
        let mut statement = self
            .conn
            .prepare(
                "
                SELECT date, ticket_id, ticket_type
                FROM ticket_evaluations
                WHERE date >= ?1 AND date <= ?2 AND date GLOB ?3 AND quality = 'low_quality'
                ORDER BY date, ticket_id
                ",
            )
            .context("failed to prepare low-quality query")?;

        let rows = statement
            .query_map(
                params![
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string(),
                    DATE_SHAPE_GLOB,
                ],
                |row| {
                    let date: String = row.get(0)?;
                    let ticket_id: TicketId = row.get(1)?;
                    let ticket_type: String = row.get(2)?;
                    Ok((date, ticket_id, ticket_type))
                },
            )
            .context("failed to run low-quality query")?;

        let mut tickets = Vec::new();
        for row in rows {
            let (date, ticket_id, ticket_type) = row.context("failed to read low-quality row")?;
            let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
                continue;
            };
            tickets.push(LowQualityTicket {
                date,
                ticket_id,
                ticket_type: TicketType::parse(&ticket_type),
            });
        }

        Ok(tickets)
    }

    pub fn totals(&self) -> Result<StoreTotals> {
        let records: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ticket_evaluations", [], |row| {
                row.get(0)
            })
            .context("failed to count evaluations")?;

        let distinct_dates: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(DISTINCT date) FROM ticket_evaluations",
                [],
                |row| row.get(0),
            )
            .context("failed to count distinct dates")?;

        let (earliest, latest): (Option<String>, Option<String>) = self
            .conn
            .query_row(
                "SELECT MIN(date), MAX(date) FROM ticket_evaluations WHERE date GLOB ?1",
                params![DATE_SHAPE_GLOB],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("failed to read date bounds")?;

        let mut statement = self
            .conn
            .prepare(
                "SELECT ticket_type, COUNT(*) FROM ticket_evaluations
                 GROUP BY ticket_type ORDER BY ticket_type",
            )
            .context("failed to prepare ticket-type counts")?;
        let type_rows = statement
            .query_map([], |row| {
                let ticket_type: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((ticket_type, count))
            })
            .context("failed to run ticket-type counts")?;

        let mut by_ticket_type = Vec::new();
        for row in type_rows {
            let (ticket_type, count) = row.context("failed to read ticket-type row")?;
            by_ticket_type.push((TicketType::parse(&ticket_type), count));
        }

        Ok(StoreTotals {
            records,
            distinct_dates,
            earliest_date: earliest
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            latest_date: latest
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            by_ticket_type,
        })
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS ticket_evaluations (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          date TEXT NOT NULL,
          ticket_id NOT NULL,
          ticket_type TEXT NOT NULL DEFAULT 'homeowner',
          quality TEXT,
          comment TEXT,
          evaluation_key TEXT,
          experiment_name TEXT,
          start_time TEXT,
          created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
          UNIQUE(date, ticket_id)
        );

        CREATE INDEX IF NOT EXISTS idx_date_ticket
          ON ticket_evaluations(date, ticket_id);
        CREATE INDEX IF NOT EXISTS idx_evaluations_date
          ON ticket_evaluations(date);
        ",
    )
    .context("failed to initialize evaluation schema")?;

    Ok(())
}
