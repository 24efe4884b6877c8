use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;

use super::aggregate::{dedup_latest, is_newer};
use super::categorize::{categorize_quality, legacy_ticket_type};
use super::classify::{CUTOFF_DATE, ExperimentClassifier, Regime};
use super::extract::extract_ticket_id;
use super::*;
use crate::model::{DropReason, ParsedOutput, QualityCategory, TicketId, TicketType};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn raw_run(value: serde_json::Value) -> RawRun {
    serde_json::from_value(value).unwrap()
}

fn classifier() -> ExperimentClassifier {
    ExperimentClassifier::new().unwrap()
}

#[test]
fn classify_zendesk_label_uses_legacy_regime_on_cutoff_eve() {
    let c = classifier()
        .classify("zendesk-evaluation-2025-08-14-run1")
        .unwrap();
    assert_eq!(c.regime, Regime::Legacy);
    assert_eq!(c.date, date("2025-08-14"));
    assert_eq!(c.ticket_type, TicketType::Homeowner);
    assert!(c.date < CUTOFF_DATE);
}

#[test]
fn classify_implementation_label_uses_grouped_regime_on_cutoff_day() {
    let c = classifier()
        .classify("implementation-evaluation-2025-08-15-6e065ee8")
        .unwrap();
    assert_eq!(c.regime, Regime::Grouped);
    assert_eq!(c.date, date("2025-08-15"));
    assert_eq!(c.ticket_type, TicketType::Implementation);
    assert!(c.date >= CUTOFF_DATE);
}

#[test]
fn classify_typed_prefixes_fix_ticket_type() {
    let c = classifier();
    assert_eq!(
        c.classify("homeowner-pay-evaluation-2025-08-20-ab").unwrap().ticket_type,
        TicketType::Homeowner
    );
    assert_eq!(
        c.classify("management-pay-evaluation-2025-08-20-ab").unwrap().ticket_type,
        TicketType::Management
    );
}

#[test]
fn classify_rejects_unknown_prefix_and_bad_dates() {
    let c = classifier();
    assert!(c.classify("nightly-regression-2025-08-20").is_none());
    assert!(c.classify("zendesk-evaluation-").is_none());
    assert!(c.classify("zendesk-evaluation-2025-13-40-x").is_none());
}

#[test]
fn classify_is_deterministic() {
    let c = classifier();
    let label = "homeowner-pay-evaluation-2025-08-22-f00";
    assert_eq!(c.classify(label), c.classify(label));
}

#[test]
fn categorize_maps_quality_tags() {
    assert_eq!(
        categorize_quality(Some("high_quality"), None),
        Some(QualityCategory::HighQuality)
    );
    assert_eq!(
        categorize_quality(Some("low_quality"), None),
        Some(QualityCategory::LowQuality)
    );
    assert_eq!(
        categorize_quality(Some("copy_paste"), None),
        Some(QualityCategory::CopyPaste)
    );
}

#[test]
fn categorize_comment_skips_outrank_quality_tag() {
    assert_eq!(
        categorize_quality(Some("copy_paste"), Some("empty_bot_answer")),
        Some(QualityCategory::Skipped)
    );
    assert_eq!(
        categorize_quality(Some("high_quality"), Some("flagged as management_company_ticket")),
        Some(QualityCategory::Skipped)
    );
    assert_eq!(
        categorize_quality(Some("low_quality"), Some("empty_human_answer on thread")),
        Some(QualityCategory::Skipped)
    );
}

#[test]
fn categorize_distinguishes_unknown_from_absent() {
    assert_eq!(
        categorize_quality(Some("mediocre"), None),
        Some(QualityCategory::Unknown)
    );
    assert_eq!(categorize_quality(None, None), None);
    assert_eq!(categorize_quality(None, Some("looks fine")), None);
}

#[test]
fn legacy_type_flips_on_management_key() {
    assert_eq!(
        legacy_ticket_type("management_ticket_evaluation", None),
        TicketType::Management
    );
}

#[test]
fn legacy_type_flips_on_management_comment_substring() {
    assert_eq!(
        legacy_ticket_type("bot_evaluation", Some("forwarded to Management team")),
        TicketType::Management
    );
}

#[test]
fn legacy_type_defaults_to_homeowner() {
    assert_eq!(legacy_ticket_type("bot_evaluation", None), TicketType::Homeowner);
    assert_eq!(legacy_ticket_type("", Some("no issues")), TicketType::Homeowner);
}

#[test]
fn extract_probes_locations_in_priority_order() {
    let output = ParsedOutput::Structured(serde_json::Map::new());

    let direct = json!({"ticket_id": 7});
    assert_eq!(
        extract_ticket_id(Some(&direct), &output),
        Some(TicketId::Number(7))
    );

    let nested = json!({"x": {"ticket_id": "T-9"}});
    assert_eq!(
        extract_ticket_id(Some(&nested), &output),
        Some(TicketId::Text("T-9".to_string()))
    );

    let wrapped = json!({"run": {"inputs": {"x": {"ticket_id": 42}}}});
    assert_eq!(
        extract_ticket_id(Some(&wrapped), &output),
        Some(TicketId::Number(42))
    );

    // Direct location wins even when deeper ones are present.
    let both = json!({"ticket_id": 1, "x": {"ticket_id": 2}});
    assert_eq!(
        extract_ticket_id(Some(&both), &output),
        Some(TicketId::Number(1))
    );
}

#[test]
fn extract_falls_back_to_parsed_output() {
    let output = ParsedOutput::from_raw(&json!({"ticket_id": 314}));
    let inputs = json!({"x": {"other": true}});
    assert_eq!(
        extract_ticket_id(Some(&inputs), &output),
        Some(TicketId::Number(314))
    );
}

#[test]
fn extract_null_value_falls_through_to_next_location() {
    let output = ParsedOutput::Structured(serde_json::Map::new());
    let inputs = json!({"ticket_id": null, "x": {"ticket_id": 5}});
    assert_eq!(
        extract_ticket_id(Some(&inputs), &output),
        Some(TicketId::Number(5))
    );
}

#[test]
fn extract_returns_none_when_no_location_matches() {
    let output = ParsedOutput::Structured(serde_json::Map::new());
    let inputs = json!({"x": {"payload": "data"}});
    assert_eq!(extract_ticket_id(Some(&inputs), &output), None);
    assert_eq!(extract_ticket_id(None, &ParsedOutput::Unparseable), None);
}

#[test]
fn classify_run_legacy_bot_evaluation() {
    let pipeline = Pipeline::new().unwrap();
    let run = raw_run(json!({
        "id": "r1",
        "name": "detailed_similarity_evaluator",
        "metadata": {"experiment": "zendesk-evaluation-2025-07-10-abc"},
        "inputs": {"x": {"ticket_id": 42}},
        "outputs": {"quality": "low_quality", "key": "bot_evaluation"},
        "start_time": "2025-07-10T12:00:00Z"
    }));

    let record = pipeline.classify_run(&run).unwrap();
    assert_eq!(record.date, date("2025-07-10"));
    assert_eq!(record.ticket_id, TicketId::Number(42));
    assert_eq!(record.ticket_type, TicketType::Homeowner);
    assert_eq!(record.quality, Some(QualityCategory::LowQuality));
    assert_eq!(record.evaluation_key, "bot_evaluation");
}

#[test]
fn classify_run_legacy_management_key() {
    let pipeline = Pipeline::new().unwrap();
    let run = raw_run(json!({
        "id": "r2",
        "name": "detailed_similarity_evaluator",
        "metadata": {"experiment": "zendesk-evaluation-2025-07-10-abc"},
        "inputs": {"x": {"ticket_id": 42}},
        "outputs": {"quality": "low_quality", "key": "management_ticket_evaluation"}
    }));

    let record = pipeline.classify_run(&run).unwrap();
    assert_eq!(record.ticket_type, TicketType::Management);
}

#[test]
fn classify_run_grouped_ignores_evaluation_key() {
    let pipeline = Pipeline::new().unwrap();
    let run = raw_run(json!({
        "id": "r3",
        "name": "detailed_similarity_evaluator",
        "metadata": {"experiment": "implementation-evaluation-2025-08-20-xyz"},
        "inputs": {"ticket_id": 9},
        "outputs": {"quality": "high_quality", "key": "management_ticket_evaluation"}
    }));

    let record = pipeline.classify_run(&run).unwrap();
    assert_eq!(record.ticket_type, TicketType::Implementation);
    assert_eq!(record.quality, Some(QualityCategory::HighQuality));
}

#[test]
fn classify_run_decodes_json_string_outputs() {
    let pipeline = Pipeline::new().unwrap();
    let run = raw_run(json!({
        "id": "r4",
        "name": "detailed_similarity_evaluator",
        "metadata": {"experiment": "homeowner-pay-evaluation-2025-08-21-a1"},
        "inputs": {},
        "outputs": "{\"quality\": \"copy_paste\", \"ticket_id\": 77}"
    }));

    let record = pipeline.classify_run(&run).unwrap();
    assert_eq!(record.ticket_id, TicketId::Number(77));
    assert_eq!(record.quality, Some(QualityCategory::CopyPaste));
}

#[test]
fn classify_run_drop_reasons() {
    let pipeline = Pipeline::new().unwrap();

    let wrong_name = raw_run(json!({
        "id": "d1",
        "name": "pairwise_evaluator",
        "outputs": {"quality": "high_quality"}
    }));
    assert_eq!(
        pipeline.classify_run(&wrong_name),
        Err(DropReason::NotEvaluator)
    );

    let no_output = raw_run(json!({
        "id": "d2",
        "name": "detailed_similarity_evaluator",
        "metadata": {"experiment": "zendesk-evaluation-2025-07-10"}
    }));
    assert_eq!(
        pipeline.classify_run(&no_output),
        Err(DropReason::MissingOutput)
    );

    let garbage_output = raw_run(json!({
        "id": "d3",
        "name": "detailed_similarity_evaluator",
        "metadata": {"experiment": "zendesk-evaluation-2025-07-10"},
        "outputs": "plain text verdict"
    }));
    assert_eq!(
        pipeline.classify_run(&garbage_output),
        Err(DropReason::UnparseableOutput)
    );

    let foreign_experiment = raw_run(json!({
        "id": "d4",
        "name": "detailed_similarity_evaluator",
        "metadata": {"experiment": "smoke-test-2025-08-20"},
        "outputs": {"quality": "high_quality"}
    }));
    assert_eq!(
        pipeline.classify_run(&foreign_experiment),
        Err(DropReason::UnrecognizedExperiment)
    );

    let no_ticket = raw_run(json!({
        "id": "d5",
        "name": "detailed_similarity_evaluator",
        "metadata": {"experiment": "zendesk-evaluation-2025-07-10-abc"},
        "inputs": {"x": {"other": 1}},
        "outputs": {"quality": "high_quality"}
    }));
    assert_eq!(
        pipeline.classify_run(&no_ticket),
        Err(DropReason::NoIdentifier)
    );
}

fn record(day: &str, id: i64, quality: Option<QualityCategory>, hour: Option<u32>) -> EvaluationRecord {
    EvaluationRecord {
        date: date(day),
        ticket_id: TicketId::Number(id),
        ticket_type: TicketType::Homeowner,
        quality,
        comment: None,
        evaluation_key: "bot_evaluation".to_string(),
        experiment_name: format!("zendesk-evaluation-{day}"),
        start_time: hour.map(|h| Utc.with_ymd_and_hms(2025, 7, 10, h, 0, 0).unwrap()),
    }
}

#[test]
fn dedup_latest_keeps_newest_regardless_of_arrival_order() {
    let older = record("2025-07-10", 42, Some(QualityCategory::LowQuality), Some(9));
    let newer = record("2025-07-10", 42, Some(QualityCategory::HighQuality), Some(17));

    for batch in [
        vec![older.clone(), newer.clone()],
        vec![newer.clone(), older.clone()],
    ] {
        let deduped = dedup_latest(batch);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].quality, Some(QualityCategory::HighQuality));
    }
}

#[test]
fn dedup_latest_timestamped_beats_untimestamped() {
    let untimestamped = record("2025-07-10", 42, Some(QualityCategory::LowQuality), None);
    let timestamped = record("2025-07-10", 42, Some(QualityCategory::CopyPaste), Some(8));

    let deduped = dedup_latest(vec![timestamped.clone(), untimestamped]);
    assert_eq!(deduped.len(), 1);
    assert_eq!(deduped[0].quality, Some(QualityCategory::CopyPaste));
}

#[test]
fn dedup_latest_all_untimestamped_keeps_first_arrival() {
    let first = record("2025-07-10", 42, Some(QualityCategory::LowQuality), None);
    let second = record("2025-07-10", 42, Some(QualityCategory::HighQuality), None);

    let deduped = dedup_latest(vec![first.clone(), second]);
    assert_eq!(deduped.len(), 1);
    assert_eq!(deduped[0].quality, Some(QualityCategory::LowQuality));
}

#[test]
fn dedup_latest_preserves_distinct_keys_in_sorted_order() {
    let a = record("2025-07-11", 2, None, Some(9));
    let b = record("2025-07-10", 5, None, Some(9));
    let c = record("2025-07-10", 3, None, Some(9));

    let deduped = dedup_latest(vec![a, b, c]);
    assert_eq!(deduped.len(), 3);
    assert_eq!(deduped[0].ticket_id, TicketId::Number(3));
    assert_eq!(deduped[1].ticket_id, TicketId::Number(5));
    assert_eq!(deduped[2].date, date("2025-07-11"));
}

#[test]
fn is_newer_never_accepts_ties_or_missing_candidates() {
    let t = Utc.with_ymd_and_hms(2025, 7, 10, 9, 0, 0).unwrap();
    assert!(!is_newer(Some(t), Some(t)));
    assert!(!is_newer(None, Some(t)));
    assert!(!is_newer(None, None));
    assert!(is_newer(Some(t), None));
}

#[test]
fn parse_raw_run_tolerates_shape_drift() {
    assert!(parse_raw_run(json!({"id": "x", "name": "detailed_similarity_evaluator"})).is_some());
    assert!(parse_raw_run(json!({"name": "missing id"})).is_none());
    assert!(parse_raw_run(json!("not an object")).is_none());
}
