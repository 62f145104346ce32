use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Which product surface a batch produces items for. The two kinds share
/// one queue core but draw on separate quota resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum GenerationKind {
    Practice,
    Exam,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Practice => "practice",
            GenerationKind::Exam => "exam",
        }
    }
}

/// Batch lifecycle. `pending` and `processing` are live; `completed` and
/// `cancelled` are terminal and absorb any further unit calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Difficulty {
    Intro,
    Core,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ItemStyle {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl ItemStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStyle::MultipleChoice => "multiple_choice",
            ItemStyle::TrueFalse => "true_false",
            ItemStyle::ShortAnswer => "short_answer",
        }
    }
}

/// What the user asked for, fixed at batch creation. Stored as JSON on the
/// queue record and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchParameters {
    pub subject: String,
    pub topics: Vec<String>,
    pub difficulty: Difficulty,
    pub style: ItemStyle,
}

/// Durable batch state, the single source of truth for progress. Counters
/// only ever grow; all writes are conditional single-row updates.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: GenerationKind,
    pub parameters: Json<BatchParameters>,
    pub target_count: i64,
    pub produced_count: i64,
    pub error_count: i64,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
