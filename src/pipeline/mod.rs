pub mod aggregate;
pub mod categorize;
pub mod classify;
pub mod extract;

#[cfg(test)]
mod tests;

use anyhow::Result;
use serde_json::Value;

use crate::model::{DropReason, EvaluationRecord, ParsedOutput, RawRun};

use self::classify::{ExperimentClassifier, Regime};

/// Only runs produced by this evaluator carry classifiable results.
pub const EVALUATOR_NAME: &str = "detailed_similarity_evaluator";

/// Per-record classification driver. Pure with respect to the store: it turns
/// one raw run into one canonical record or a countable drop reason, and the
/// caller owns batching, dedup, and persistence.
pub struct Pipeline {
    classifier: ExperimentClassifier,
}

impl Pipeline {
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: ExperimentClassifier::new()?,
        })
    }

    pub fn classify_run(&self, run: &RawRun) -> Result<EvaluationRecord, DropReason> {
        if run.name != EVALUATOR_NAME {
            return Err(DropReason::NotEvaluator);
        }

        let outputs = run.outputs.as_ref().ok_or(DropReason::MissingOutput)?;
        let output = ParsedOutput::from_raw(outputs);
        if matches!(output, ParsedOutput::Unparseable) {
            return Err(DropReason::UnparseableOutput);
        }

        let label = run
            .experiment_label()
            .ok_or(DropReason::UnrecognizedExperiment)?;
        let classification = self
            .classifier
            .classify(label)
            .ok_or(DropReason::UnrecognizedExperiment)?;

        let ticket_id = extract::extract_ticket_id(run.inputs.as_ref(), &output)
            .ok_or(DropReason::NoIdentifier)?;

        let quality = output.get_str("quality");
        let comment = output.get_str("comment");
        let evaluation_key = output.get_str("key").unwrap_or_default();

        let ticket_type = match classification.regime {
            Regime::Legacy => categorize::legacy_ticket_type(evaluation_key, comment),
            Regime::Grouped => classification.ticket_type,
        };

        Ok(EvaluationRecord {
            date: classification.date,
            ticket_id,
            ticket_type,
            quality: categorize::categorize_quality(quality, comment),
            comment: comment.map(str::to_owned),
            evaluation_key: evaluation_key.to_owned(),
            experiment_name: label.to_owned(),
            start_time: run.start_time,
        })
    }
}

/// Deserialize one exported run, tolerating records whose shape has drifted.
/// Returns `None` for anything that is not a run object; the caller counts
/// these as malformed instead of aborting the batch.
pub fn parse_raw_run(value: Value) -> Option<RawRun> {
    serde_json::from_value(value).ok()
}
