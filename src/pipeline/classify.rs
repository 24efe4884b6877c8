use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;

use crate::model::TicketType;

/// Experiment labels switched naming schemes on this date: before it, a single
/// `zendesk-evaluation-*` batch covered everything and the ticket type had to
/// be recovered from the evaluation key; from it onward each ticket type runs
/// as its own `*-evaluation-*` batch. Reporting also selects its "evaluated"
/// counting rule by comparing record dates against this boundary.
pub const CUTOFF_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2025, 8, 15) {
    Some(date) => date,
    None => panic!("invalid cutoff date"),
};

/// Which labeling scheme produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// `zendesk-evaluation-*`: ticket type deferred to key/comment inspection.
    Legacy,
    /// Typed `*-evaluation-*` batches: ticket type fixed by the label prefix.
    Grouped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub date: NaiveDate,
    pub regime: Regime,
    pub ticket_type: TicketType,
}

struct LabelRule {
    pattern: Regex,
    regime: Regime,
    ticket_type: TicketType,
}

/// Maps experiment labels to a batch date and ticket category. Patterns are
/// compiled once per pipeline invocation; there is no global state.
pub struct ExperimentClassifier {
    rules: Vec<LabelRule>,
}

impl ExperimentClassifier {
    pub fn new() -> Result<Self> {
        let specs = [
            ("zendesk-evaluation-", Regime::Legacy, TicketType::Homeowner),
            (
                "implementation-evaluation-",
                Regime::Grouped,
                TicketType::Implementation,
            ),
            (
                "homeowner-pay-evaluation-",
                Regime::Grouped,
                TicketType::Homeowner,
            ),
            (
                "management-pay-evaluation-",
                Regime::Grouped,
                TicketType::Management,
            ),
        ];

        let mut rules = Vec::with_capacity(specs.len());
        for (prefix, regime, ticket_type) in specs {
            let pattern = Regex::new(&format!(r"^{prefix}(\d{{4}}-\d{{2}}-\d{{2}})"))
                .with_context(|| format!("failed to compile label pattern for {prefix}"))?;
            rules.push(LabelRule {
                pattern,
                regime,
                ticket_type,
            });
        }

        Ok(Self { rules })
    }

    /// First matching prefix wins. Returns `None` when no prefix matches or
    /// the embedded date is not a real calendar date, so a malformed date can
    /// never reach the store through this path.
    pub fn classify(&self, label: &str) -> Option<Classification> {
        for rule in &self.rules {
            if let Some(captures) = rule.pattern.captures(label) {
                let date = NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").ok()?;
                return Some(Classification {
                    date,
                    regime: rule.regime,
                    ticket_type: rule.ticket_type,
                });
            }
        }
        None
    }
}
