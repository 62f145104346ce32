use std::sync::LazyLock;

use regex::Regex;

use super::GenerationError;
use crate::models::{GenerationKind, ItemPayload, ItemStyle};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("code fence regex is valid")
});

/// Decode one model response into a validated item payload. Tries a strict
/// parse of the whole response first; when the model wraps the object in
/// code fences or prose, a recovery pass extracts the JSON before giving up.
pub fn decode_item(
    kind: GenerationKind,
    style: ItemStyle,
    raw: &str,
) -> Result<ItemPayload, GenerationError> {
    let trimmed = raw.trim();

    let payload = match serde_json::from_str::<ItemPayload>(trimmed) {
        Ok(payload) => payload,
        Err(strict_err) => {
            let candidate = recover_json(trimmed).ok_or_else(|| {
                GenerationError::MalformedOutput(format!("output is not a JSON item: {strict_err}"))
            })?;
            serde_json::from_str::<ItemPayload>(candidate).map_err(|e| {
                GenerationError::MalformedOutput(format!("recovered JSON is not a valid item: {e}"))
            })?
        }
    };

    validate(kind, style, &payload).map_err(GenerationError::MalformedOutput)?;

    Ok(payload)
}

/// Best-effort extraction of a JSON object from a noisy response: a fenced
/// block wins, otherwise the span from the first `{` to the last `}`.
fn recover_json(raw: &str) -> Option<&str> {
    if let Some(caps) = CODE_FENCE.captures(raw) {
        return Some(caps.get(1)?.as_str());
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn validate(kind: GenerationKind, style: ItemStyle, payload: &ItemPayload) -> Result<(), String> {
    if payload.question.trim().is_empty() {
        return Err("item has an empty question".to_string());
    }
    if payload.answer.trim().is_empty() {
        return Err("item has an empty answer".to_string());
    }

    match style {
        ItemStyle::MultipleChoice => {
            if payload.options.len() < 2 {
                return Err(format!(
                    "multiple choice item needs at least 2 options, got {}",
                    payload.options.len()
                ));
            }
            if !payload.options.iter().any(|o| o == &payload.answer) {
                return Err("answer is not one of the options".to_string());
            }
        }
        ItemStyle::TrueFalse => {
            let answer = payload.answer.trim().to_ascii_lowercase();
            if answer != "true" && answer != "false" {
                return Err(format!(
                    "true/false answer must be \"true\" or \"false\", got \"{}\"",
                    payload.answer
                ));
            }
        }
        ItemStyle::ShortAnswer => {}
    }

    if kind == GenerationKind::Exam
        && payload.section.as_deref().map(str::trim).unwrap_or("").is_empty()
    {
        return Err("exam item is missing its section".to_string());
    }

    Ok(())
}
