use crate::model::{QualityCategory, TicketType};

pub const KEY_MANAGEMENT: &str = "management_ticket_evaluation";

/// Map the evaluator's quality tag and free-text comment to a quality bucket.
/// Comment-based skip conditions outrank the quality tag: an evaluator that
/// tags `copy_paste` but comments `empty_bot_answer` produced nothing to
/// judge, so the record is skipped. A missing tag yields `None`, not
/// `Unknown` — the record still counts as evaluated downstream.
pub fn categorize_quality(quality: Option<&str>, comment: Option<&str>) -> Option<QualityCategory> {
    if let Some(comment) = comment {
        if comment == "empty_bot_answer"
            || comment.contains("management_company_ticket")
            || comment.contains("empty_human_answer")
        {
            return Some(QualityCategory::Skipped);
        }
    }

    match quality {
        Some("copy_paste") => Some(QualityCategory::CopyPaste),
        Some("low_quality") => Some(QualityCategory::LowQuality),
        Some("high_quality") => Some(QualityCategory::HighQuality),
        Some(_) => Some(QualityCategory::Unknown),
        None => None,
    }
}

/// Legacy-regime ticket typing. Only positive management signals flip the
/// default: the `management_ticket_evaluation` key, or `management` appearing
/// anywhere in the comment (case-insensitive substring, matching what the
/// legacy sync scripts did). `bot_evaluation` is the homeowner marker but its
/// absence alone implies nothing.
pub fn legacy_ticket_type(evaluation_key: &str, comment: Option<&str>) -> TicketType {
    if evaluation_key == KEY_MANAGEMENT {
        return TicketType::Management;
    }
    if comment.is_some_and(|c| c.to_lowercase().contains("management")) {
        return TicketType::Management;
    }
    TicketType::Homeowner
}
