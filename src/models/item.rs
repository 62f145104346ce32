use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::queue_record::{Difficulty, GenerationKind, ItemStyle};

/// The validated content of one generated study item. Shape varies by
/// style: multiple choice and exam items carry options, exam items carry a
/// section label, short answers carry neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPayload {
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// A persisted study item. Items do not reference the batch that produced
/// them; the queue record tracks only counts.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct GeneratedItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: GenerationKind,
    pub subject: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub style: ItemStyle,
    pub payload: Json<ItemPayload>,
    pub created_at: DateTime<Utc>,
}
