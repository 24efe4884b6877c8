use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::cli::ReportArgs;
use crate::model::{EvaluationRecord, QualityCategory, TicketType};
use crate::pipeline::classify::CUTOFF_DATE;
use crate::store::{EvaluationStore, LowQualityTicket, QualityCount};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub ticket_type: TicketType,
    pub total_tickets: i64,
    pub total_evaluated: i64,
    pub high_quality: i64,
    pub low_quality: i64,
    pub copy_paste: i64,
    pub skipped: i64,
    pub unknown: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionRow {
    pub quality: Option<QualityCategory>,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
struct Report {
    start_date: NaiveDate,
    end_date: NaiveDate,
    daily: Vec<DailyRow>,
    distribution: Vec<DistributionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    low_quality_tickets: Option<Vec<LowQualityTicket>>,
}

pub fn run(args: ReportArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.state_root.join("evaluations.sqlite"));

    let end_date = args.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let start_date = args.start_date.unwrap_or(end_date - Duration::days(30));
    if start_date > end_date {
        bail!("start date {start_date} is after end date {end_date}");
    }

    info!(
        db = %db_path.display(),
        start = %start_date,
        end = %end_date,
        "building report"
    );

    let store = EvaluationStore::open(&db_path)?;
    let records = store.query_range(start_date, end_date)?;
    let daily = build_daily_breakdown(&records);
    let distribution = build_distribution(&store.aggregate_by(start_date, end_date)?);
    let low_quality_tickets = if args.list_low_quality {
        Some(store.low_quality_tickets(start_date, end_date)?)
    } else {
        None
    };

    let report = Report {
        start_date,
        end_date,
        daily,
        distribution,
        low_quality_tickets,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_text(&report);
    }

    Ok(())
}

/// Fold canonical records into one row per (date, ticket type).
///
/// The "evaluated" rule is regime-dependent and deliberately not unified:
/// on dates before the labeling cutoff, management tickets and skip-flagged
/// tickets are excluded from `total_evaluated` (they are tracked but were
/// never judged under the legacy scheme); from the cutoff onward every record
/// counts. Records with no quality tag count as evaluated in both regimes but
/// land in no quality bucket.
pub fn build_daily_breakdown(records: &[EvaluationRecord]) -> Vec<DailyRow> {
    let mut rows: BTreeMap<(NaiveDate, TicketType), DailyRow> = BTreeMap::new();

    for record in records {
        let row = rows
            .entry((record.date, record.ticket_type))
            .or_insert_with(|| DailyRow {
                date: record.date,
                ticket_type: record.ticket_type,
                total_tickets: 0,
                total_evaluated: 0,
                high_quality: 0,
                low_quality: 0,
                copy_paste: 0,
                skipped: 0,
                unknown: 0,
            });

        row.total_tickets += 1;

        match record.quality {
            Some(QualityCategory::HighQuality) => row.high_quality += 1,
            Some(QualityCategory::LowQuality) => row.low_quality += 1,
            Some(QualityCategory::CopyPaste) => row.copy_paste += 1,
            Some(QualityCategory::Skipped) => row.skipped += 1,
            Some(QualityCategory::Unknown) => row.unknown += 1,
            None => {}
        }

        let evaluated = if record.date < CUTOFF_DATE {
            record.ticket_type != TicketType::Management
                && record.quality != Some(QualityCategory::Skipped)
        } else {
            true
        };
        if evaluated {
            row.total_evaluated += 1;
        }
    }

    rows.into_values().collect()
}

fn build_distribution(counts: &[QualityCount]) -> Vec<DistributionRow> {
    let mut by_quality: BTreeMap<Option<QualityCategory>, i64> = BTreeMap::new();
    let mut total = 0_i64;
    for count in counts {
        *by_quality.entry(count.quality).or_default() += count.count;
        total += count.count;
    }

    by_quality
        .into_iter()
        .map(|(quality, count)| DistributionRow {
            quality,
            count,
            percentage: if total > 0 {
                (count as f64 * 100.0 / total as f64 * 100.0).round() / 100.0
            } else {
                0.0
            },
        })
        .collect()
}

fn render_text(report: &Report) {
    println!(
        "Evaluation report {} .. {}",
        report.start_date, report.end_date
    );
    println!();

    if report.daily.is_empty() {
        println!("No evaluations in range.");
    } else {
        println!(
            "{:<12} {:<15} {:>7} {:>10} {:>6} {:>6} {:>6} {:>8} {:>8}",
            "date", "type", "total", "evaluated", "high", "low", "copy", "skipped", "unknown"
        );
        for row in &report.daily {
            println!(
                "{:<12} {:<15} {:>7} {:>10} {:>6} {:>6} {:>6} {:>8} {:>8}",
                row.date.to_string(),
                row.ticket_type.as_str(),
                row.total_tickets,
                row.total_evaluated,
                row.high_quality,
                row.low_quality,
                row.copy_paste,
                row.skipped,
                row.unknown
            );
        }
    }

    if !report.distribution.is_empty() {
        println!();
        println!("Quality distribution:");
        for row in &report.distribution {
            let label = row
                .quality
                .map(QualityCategory::as_str)
                .unwrap_or("(no tag)");
            println!("  {:<14} {:>6}  {:>6.2}%", label, row.count, row.percentage);
        }
    }

    if let Some(tickets) = &report.low_quality_tickets {
        println!();
        println!("Low-quality tickets ({}):", tickets.len());
        for ticket in tickets {
            println!(
                "  {}  {}  {}",
                ticket.date,
                ticket.ticket_id,
                ticket.ticket_type.as_str()
            );
        }
    }
}
