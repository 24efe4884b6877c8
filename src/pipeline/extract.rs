use serde_json::Value;

use crate::model::{ParsedOutput, TicketId};

/// Locate the ticket identifier for a run. Input payloads nest the id at
/// different depths depending on how the evaluation was invoked (direct,
/// wrapped, or replayed); the parsed output carries it as a last resort.
/// Fixed priority order, first usable value wins; a location holding null or
/// a non-scalar falls through to the next one.
pub fn extract_ticket_id(inputs: Option<&Value>, output: &ParsedOutput) -> Option<TicketId> {
    if let Some(Value::Object(inputs)) = inputs {
        if let Some(id) = inputs.get("ticket_id").and_then(TicketId::from_value) {
            return Some(id);
        }

        if let Some(Value::Object(x)) = inputs.get("x") {
            if let Some(id) = x.get("ticket_id").and_then(TicketId::from_value) {
                return Some(id);
            }
        }

        // Replayed runs wrap the original run one level down.
        if let Some(Value::Object(run)) = inputs.get("run") {
            if let Some(Value::Object(inner_inputs)) = run.get("inputs") {
                if let Some(Value::Object(x)) = inner_inputs.get("x") {
                    if let Some(id) = x.get("ticket_id").and_then(TicketId::from_value) {
                        return Some(id);
                    }
                }
            }
        }
    }

    match output {
        ParsedOutput::Structured(map) => map.get("ticket_id").and_then(TicketId::from_value),
        ParsedOutput::Unparseable => None,
    }
}
