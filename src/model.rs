use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One evaluator invocation record as exported from the run-tracing project.
/// Payload shapes vary across export vintages, so `inputs` and `outputs` stay
/// untyped until the pipeline normalizes them.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRun {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub inputs: Option<Value>,
    #[serde(default)]
    pub outputs: Option<Value>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

impl RawRun {
    pub fn experiment_label(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("experiment"))
            .and_then(Value::as_str)
    }
}

/// Evaluator output normalized at the ingestion boundary: either a structured
/// result mapping (possibly decoded from a JSON-encoded string) or opaque data
/// the pipeline cannot use.
#[derive(Debug, Clone)]
pub enum ParsedOutput {
    Structured(Map<String, Value>),
    Unparseable,
}

impl ParsedOutput {
    pub fn from_raw(outputs: &Value) -> Self {
        match outputs {
            Value::Object(map) => Self::Structured(map.clone()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Self::Structured(map),
                _ => Self::Unparseable,
            },
            _ => Self::Unparseable,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self {
            Self::Structured(map) => map.get(key).and_then(Value::as_str),
            Self::Unparseable => None,
        }
    }
}

/// Ticket identifiers arrive as integers or strings depending on the producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum TicketId {
    Number(i64),
    Text(String),
}

impl TicketId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(num) => num.as_i64().map(Self::Number),
            Value::String(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(num) => write!(f, "{num}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl Ord for TicketId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for TicketId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    Homeowner,
    Management,
    Implementation,
    Unknown,
}

impl TicketType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Homeowner => "homeowner",
            Self::Management => "management",
            Self::Implementation => "implementation",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "homeowner" => Self::Homeowner,
            "management" => Self::Management,
            "implementation" => Self::Implementation,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCategory {
    HighQuality,
    LowQuality,
    CopyPaste,
    Skipped,
    Unknown,
}

impl QualityCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighQuality => "high_quality",
            Self::LowQuality => "low_quality",
            Self::CopyPaste => "copy_paste",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "high_quality" => Self::HighQuality,
            "low_quality" => Self::LowQuality,
            "copy_paste" => Self::CopyPaste,
            "skipped" => Self::Skipped,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical evaluation row: exactly one per `(date, ticket_id)`.
/// `quality` stays `None` when the evaluator reported no quality tag; that is
/// distinct from `Unknown`, which marks an unrecognized tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub date: NaiveDate,
    pub ticket_id: TicketId,
    pub ticket_type: TicketType,
    pub quality: Option<QualityCategory>,
    pub comment: Option<String>,
    pub evaluation_key: String,
    pub experiment_name: String,
    pub start_time: Option<DateTime<Utc>>,
}

/// Why a raw run was excluded from the batch. Exclusion is a data-quality
/// filter, never an error: drops are counted, not raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotEvaluator,
    MissingOutput,
    UnparseableOutput,
    UnrecognizedExperiment,
    NoIdentifier,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DropCounts {
    pub not_evaluator: usize,
    pub missing_output: usize,
    pub unparseable_output: usize,
    pub unrecognized_experiment: usize,
    pub no_identifier: usize,
}

impl DropCounts {
    pub fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::NotEvaluator => self.not_evaluator += 1,
            DropReason::MissingOutput => self.missing_output += 1,
            DropReason::UnparseableOutput => self.unparseable_output += 1,
            DropReason::UnrecognizedExperiment => self.unrecognized_experiment += 1,
            DropReason::NoIdentifier => self.no_identifier += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.not_evaluator
            + self.missing_output
            + self.unparseable_output
            + self.unrecognized_experiment
            + self.no_identifier
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncCounts {
    pub fetched: usize,
    pub malformed: usize,
    pub classified: usize,
    pub deduplicated: usize,
    pub applied: usize,
    pub skipped_stale: usize,
    pub failed: usize,
    pub drops: DropCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncPaths {
    pub state_root: String,
    pub input_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub paths: SyncPaths,
    pub counts: SyncCounts,
}
