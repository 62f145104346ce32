use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{Difficulty, GeneratedItem, GenerationKind, ItemPayload, ItemStyle};

/// Runs inside the same transaction as the queue bookkeeping so an item is
/// never visible without its count.
#[allow(clippy::too_many_arguments)]
pub async fn insert(
    conn: &mut SqliteConnection,
    id: Uuid,
    owner_id: Uuid,
    kind: GenerationKind,
    subject: &str,
    topic: &str,
    difficulty: Difficulty,
    style: ItemStyle,
    payload: &ItemPayload,
    now: DateTime<Utc>,
) -> Result<GeneratedItem, sqlx::Error> {
    sqlx::query_as::<_, GeneratedItem>(
        r#"
        INSERT INTO generated_items
            (id, owner_id, kind, subject, topic, difficulty, style, payload, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(kind)
    .bind(subject)
    .bind(topic)
    .bind(difficulty)
    .bind(style)
    .bind(sqlx::types::Json(payload))
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn list(
    pool: &SqlitePool,
    owner_id: Uuid,
    kind: Option<GenerationKind>,
    limit: i64,
) -> Result<Vec<GeneratedItem>, sqlx::Error> {
    match kind {
        Some(kind) => {
            sqlx::query_as::<_, GeneratedItem>(
                r#"
                SELECT * FROM generated_items
                WHERE owner_id = ?1 AND kind = ?2
                ORDER BY created_at DESC
                LIMIT ?3
                "#,
            )
            .bind(owner_id)
            .bind(kind)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, GeneratedItem>(
                r#"
                SELECT * FROM generated_items
                WHERE owner_id = ?1
                ORDER BY created_at DESC
                LIMIT ?2
                "#,
            )
            .bind(owner_id)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    }
}

/// Denormalized per-topic tally, bumped in the same transaction as the item
/// insert.
pub async fn bump_topic_stat(
    conn: &mut SqliteConnection,
    owner_id: Uuid,
    kind: GenerationKind,
    subject: &str,
    topic: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO topic_stats (owner_id, kind, subject, topic, item_count, updated_at)
        VALUES (?1, ?2, ?3, ?4, 1, ?5)
        ON CONFLICT(owner_id, kind, subject, topic)
        DO UPDATE SET item_count = item_count + 1, updated_at = ?5
        "#,
    )
    .bind(owner_id)
    .bind(kind)
    .bind(subject)
    .bind(topic)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}
