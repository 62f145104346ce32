use crate::models::{BatchParameters, Difficulty, GenerationKind, ItemStyle};

/// A fully rendered request for one unit of generation.
#[derive(Debug, Clone)]
pub struct GenerationPrompt {
    pub system: String,
    pub user: String,
}

/// Framings rotated across a batch so consecutive items on the same topic
/// do not read alike. Selection is positional: replaying an attempt index
/// yields the same framing.
const FRAMINGS: [&str; 5] = [
    "grounded in a realistic everyday scenario",
    "testing the precise definition of the concept",
    "contrasting the concept with a closely related one",
    "requiring the concept to be applied step by step",
    "built around a misconception students commonly hold",
];

/// Topic for the attempt at `attempt_index`, cycling through the requested
/// topics in order. Topics are validated non-empty at batch creation.
pub fn rotated_topic(parameters: &BatchParameters, attempt_index: i64) -> &str {
    &parameters.topics[attempt_index as usize % parameters.topics.len()]
}

fn framing(attempt_index: i64) -> &'static str {
    FRAMINGS[attempt_index as usize % FRAMINGS.len()]
}

pub fn build_unit_prompt(
    kind: GenerationKind,
    parameters: &BatchParameters,
    attempt_index: i64,
) -> GenerationPrompt {
    let topic = rotated_topic(parameters, attempt_index);

    let difficulty = match parameters.difficulty {
        Difficulty::Intro => "introductory, a single concept with no traps",
        Difficulty::Core => "core, the standard of a course exam",
        Difficulty::Stretch => "stretch, demanding multi-step reasoning or subtle distinctions",
    };

    let style_rules = match parameters.style {
        ItemStyle::MultipleChoice => {
            "\"options\" must contain exactly 4 distinct choices and \"answer\" must repeat one of them verbatim"
        }
        ItemStyle::TrueFalse => {
            "\"answer\" must be exactly \"true\" or \"false\"; omit \"options\""
        }
        ItemStyle::ShortAnswer => {
            "omit \"options\"; \"answer\" is the expected short response"
        }
    };

    let system = match kind {
        GenerationKind::Practice => {
            "You are a tutor writing practice questions. \
             Respond with a single JSON object and no other text."
        }
        GenerationKind::Exam => {
            "You are an examiner writing items for a simulated exam. \
             Respond with a single JSON object and no other text."
        }
    }
    .to_string();

    let mut user = format!(
        "Write one {style} study item on the subject \"{subject}\", topic \"{topic}\".\n\
         Difficulty is {difficulty}. Make the item {framing}.\n\
         Respond with exactly this JSON shape:\n\
         {{\"question\": \"...\", \"options\": [\"...\"], \"answer\": \"...\", \"explanation\": \"...\"}}\n\
         Rules: {style_rules}.",
        style = parameters.style.as_str(),
        subject = parameters.subject,
        topic = topic,
        difficulty = difficulty,
        framing = framing(attempt_index),
        style_rules = style_rules,
    );

    if kind == GenerationKind::Exam {
        user.push_str(
            "\nInclude a \"section\" field naming the exam section this item belongs to.",
        );
    }

    GenerationPrompt { system, user }
}
