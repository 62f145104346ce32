use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use studyforge::generation::parse::decode_item;
use studyforge::generation::prompt::{build_unit_prompt, rotated_topic};
use studyforge::generation::GenerationError;
use studyforge::identity::Plan;
use studyforge::models::{BatchParameters, Difficulty, GenerationKind, ItemStyle};
use studyforge::orchestrator::{MarkerStore, ResumptionMarker};
use studyforge::quota::{limit_for, period_start, Period, Resource, UNLIMITED};

fn mc_payload() -> String {
    json!({
        "question": "Which gas do plants absorb during photosynthesis?",
        "options": ["Carbon dioxide", "Oxygen", "Nitrogen", "Hydrogen"],
        "answer": "Carbon dioxide",
        "explanation": "Carbon fixation consumes CO2 from the air."
    })
    .to_string()
}

fn parameters(topics: &[&str]) -> BatchParameters {
    BatchParameters {
        subject: "Biology".to_string(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        difficulty: Difficulty::Core,
        style: ItemStyle::MultipleChoice,
    }
}

// ── Decoding model output ───────────────────────────────────────

#[test]
fn decodes_strict_json() {
    let payload = decode_item(
        GenerationKind::Practice,
        ItemStyle::MultipleChoice,
        &mc_payload(),
    )
    .unwrap();

    assert_eq!(
        payload.question,
        "Which gas do plants absorb during photosynthesis?"
    );
    assert_eq!(payload.options.len(), 4);
    assert_eq!(payload.answer, "Carbon dioxide");
}

#[test]
fn decodes_fenced_json() {
    let raw = format!("Sure, here is the item:\n```json\n{}\n```\n", mc_payload());
    let payload =
        decode_item(GenerationKind::Practice, ItemStyle::MultipleChoice, &raw).unwrap();
    assert_eq!(payload.answer, "Carbon dioxide");
}

#[test]
fn decodes_json_embedded_in_prose() {
    let raw = format!("Of course! {} Hope that helps.", mc_payload());
    let payload =
        decode_item(GenerationKind::Practice, ItemStyle::MultipleChoice, &raw).unwrap();
    assert_eq!(payload.options.len(), 4);
}

#[test]
fn rejects_plain_prose() {
    let err = decode_item(
        GenerationKind::Practice,
        ItemStyle::MultipleChoice,
        "Plants absorb carbon dioxide.",
    )
    .unwrap_err();

    match err {
        GenerationError::MalformedOutput(msg) => {
            assert!(msg.contains("not a JSON item"), "{msg}");
        }
        other => panic!("expected malformed output, got {other:?}"),
    }
}

#[test]
fn rejects_json_without_required_fields() {
    let raw = json!({ "answer": "Carbon dioxide" }).to_string();
    let err = decode_item(GenerationKind::Practice, ItemStyle::MultipleChoice, &raw).unwrap_err();
    assert!(matches!(err, GenerationError::MalformedOutput(_)));
}

#[test]
fn rejects_blank_question() {
    let raw = json!({
        "question": "   ",
        "options": ["A", "B"],
        "answer": "A"
    })
    .to_string();

    let err = decode_item(GenerationKind::Practice, ItemStyle::MultipleChoice, &raw).unwrap_err();
    match err {
        GenerationError::MalformedOutput(msg) => assert!(msg.contains("empty question"), "{msg}"),
        other => panic!("expected malformed output, got {other:?}"),
    }
}

#[test]
fn rejects_answer_outside_options() {
    let raw = json!({
        "question": "Pick one.",
        "options": ["Oxygen", "Nitrogen"],
        "answer": "Carbon dioxide"
    })
    .to_string();

    let err = decode_item(GenerationKind::Practice, ItemStyle::MultipleChoice, &raw).unwrap_err();
    match err {
        GenerationError::MalformedOutput(msg) => {
            assert!(msg.contains("not one of the options"), "{msg}");
        }
        other => panic!("expected malformed output, got {other:?}"),
    }
}

#[test]
fn rejects_sparse_options() {
    let raw = json!({
        "question": "Pick one.",
        "options": ["Oxygen"],
        "answer": "Oxygen"
    })
    .to_string();

    let err = decode_item(GenerationKind::Practice, ItemStyle::MultipleChoice, &raw).unwrap_err();
    assert!(matches!(err, GenerationError::MalformedOutput(_)));
}

#[test]
fn true_false_accepts_mixed_case_answer() {
    let raw = json!({
        "question": "Osmosis requires energy input.",
        "answer": " False "
    })
    .to_string();

    let payload = decode_item(GenerationKind::Practice, ItemStyle::TrueFalse, &raw).unwrap();
    assert!(payload.options.is_empty());
    assert_eq!(payload.answer, " False ");
}

#[test]
fn true_false_rejects_non_boolean_answer() {
    let raw = json!({
        "question": "Osmosis requires energy input.",
        "answer": "sometimes"
    })
    .to_string();

    let err = decode_item(GenerationKind::Practice, ItemStyle::TrueFalse, &raw).unwrap_err();
    match err {
        GenerationError::MalformedOutput(msg) => assert!(msg.contains("true"), "{msg}"),
        other => panic!("expected malformed output, got {other:?}"),
    }
}

#[test]
fn short_answer_needs_no_options() {
    let raw = json!({
        "question": "Name the organelle that carries out photosynthesis.",
        "answer": "Chloroplast"
    })
    .to_string();

    let payload = decode_item(GenerationKind::Practice, ItemStyle::ShortAnswer, &raw).unwrap();
    assert!(payload.options.is_empty());
    assert_eq!(payload.explanation, "");
}

#[test]
fn exam_items_require_a_section() {
    let err = decode_item(GenerationKind::Exam, ItemStyle::MultipleChoice, &mc_payload())
        .unwrap_err();
    match err {
        GenerationError::MalformedOutput(msg) => assert!(msg.contains("section"), "{msg}"),
        other => panic!("expected malformed output, got {other:?}"),
    }

    let raw = json!({
        "question": "Which gas do plants absorb during photosynthesis?",
        "options": ["Carbon dioxide", "Oxygen"],
        "answer": "Carbon dioxide",
        "section": "Plant Physiology"
    })
    .to_string();

    let payload = decode_item(GenerationKind::Exam, ItemStyle::MultipleChoice, &raw).unwrap();
    assert_eq!(payload.section.as_deref(), Some("Plant Physiology"));
}

// ── Prompt construction ─────────────────────────────────────────

#[test]
fn prompts_are_deterministic_per_attempt() {
    let params = parameters(&["photosynthesis", "osmosis"]);

    let first = build_unit_prompt(GenerationKind::Practice, &params, 3);
    let second = build_unit_prompt(GenerationKind::Practice, &params, 3);
    assert_eq!(first.system, second.system);
    assert_eq!(first.user, second.user);
}

#[test]
fn topics_rotate_across_attempts() {
    let params = parameters(&["photosynthesis", "osmosis", "mitosis"]);

    assert_eq!(rotated_topic(&params, 0), "photosynthesis");
    assert_eq!(rotated_topic(&params, 1), "osmosis");
    assert_eq!(rotated_topic(&params, 2), "mitosis");
    assert_eq!(rotated_topic(&params, 3), "photosynthesis");

    // Same topic, different framing: consecutive laps still vary.
    let lap_one = build_unit_prompt(GenerationKind::Practice, &params, 0);
    let lap_two = build_unit_prompt(GenerationKind::Practice, &params, 3);
    assert!(lap_one.user.contains("photosynthesis"));
    assert!(lap_two.user.contains("photosynthesis"));
    assert_ne!(lap_one.user, lap_two.user);
}

#[test]
fn exam_prompts_ask_for_a_section() {
    let params = parameters(&["photosynthesis"]);

    let exam = build_unit_prompt(GenerationKind::Exam, &params, 0);
    assert!(exam.user.contains("\"section\""));
    assert!(exam.system.contains("examiner"));

    let practice = build_unit_prompt(GenerationKind::Practice, &params, 0);
    assert!(!practice.user.contains("\"section\""));
    assert!(practice.system.contains("tutor"));
}

// ── Quota windows ───────────────────────────────────────────────

#[test]
fn period_keys_roll_over() {
    let noon = Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap();
    let next_day = Utc.with_ymd_and_hms(2026, 8, 26, 0, 30, 0).unwrap();
    let next_month = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();

    assert_eq!(period_start(Period::Daily, noon), "2026-08-25");
    assert_eq!(period_start(Period::Daily, next_day), "2026-08-26");

    assert_eq!(period_start(Period::Monthly, noon), "2026-08-01");
    assert_eq!(period_start(Period::Monthly, next_day), "2026-08-01");
    assert_eq!(period_start(Period::Monthly, next_month), "2026-09-01");
}

#[test]
fn plan_limits_match_product_tiers() {
    assert_eq!(limit_for(Plan::Free, Resource::PracticeItems), 10);
    assert_eq!(limit_for(Plan::Free, Resource::ExamItems), 1);
    assert_eq!(limit_for(Plan::Plus, Resource::PracticeItems), 100);
    assert_eq!(limit_for(Plan::Plus, Resource::ExamItems), 10);
    assert_eq!(limit_for(Plan::Pro, Resource::PracticeItems), UNLIMITED);
    assert_eq!(limit_for(Plan::Pro, Resource::ExamItems), UNLIMITED);
}

#[test]
fn resources_map_to_kinds() {
    assert_eq!(
        Resource::for_kind(GenerationKind::Practice),
        Resource::PracticeItems
    );
    assert_eq!(Resource::for_kind(GenerationKind::Exam), Resource::ExamItems);
    assert_eq!(Resource::PracticeItems.period(), Period::Daily);
    assert_eq!(Resource::ExamItems.period(), Period::Monthly);
}

// ── Resumption markers ──────────────────────────────────────────

#[test]
fn marker_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = MarkerStore::new(dir.path());
    let owner = Uuid::now_v7();

    let marker = ResumptionMarker {
        queue_record_id: Uuid::now_v7(),
        owner_id: owner,
        kind: GenerationKind::Practice,
        last_known_produced_count: 7,
        paused: true,
    };
    store.save(&marker).unwrap();

    let loaded = store.load(owner, GenerationKind::Practice).unwrap();
    assert_eq!(loaded.queue_record_id, marker.queue_record_id);
    assert_eq!(loaded.last_known_produced_count, 7);
    assert!(loaded.paused);

    // Kinds have separate files.
    assert!(store.load(owner, GenerationKind::Exam).is_none());

    store.clear(owner, GenerationKind::Practice);
    assert!(store.load(owner, GenerationKind::Practice).is_none());
}

#[test]
fn corrupted_marker_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let store = MarkerStore::new(dir.path());
    let owner = Uuid::now_v7();

    let path = store.path(owner, GenerationKind::Practice);
    std::fs::write(&path, "{ this is not json").unwrap();

    assert!(store.load(owner, GenerationKind::Practice).is_none());
    assert!(!path.exists());
}

#[test]
fn mismatched_marker_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let store = MarkerStore::new(dir.path());
    let owner = Uuid::now_v7();

    // A marker written for someone else lands at this owner's path.
    let foreign = ResumptionMarker {
        queue_record_id: Uuid::now_v7(),
        owner_id: Uuid::now_v7(),
        kind: GenerationKind::Practice,
        last_known_produced_count: 0,
        paused: false,
    };
    let path = store.path(owner, GenerationKind::Practice);
    std::fs::write(&path, serde_json::to_vec(&foreign).unwrap()).unwrap();

    assert!(store.load(owner, GenerationKind::Practice).is_none());
    assert!(!path.exists());
}
