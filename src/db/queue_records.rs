use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{BatchParameters, GenerationKind, QueueRecord};

/// Insert a new pending record. The partial unique index on
/// (owner_id, kind) for non-terminal rows rejects a second active batch;
/// callers translate that violation into a conflict response.
pub async fn create(
    pool: &SqlitePool,
    owner_id: Uuid,
    kind: GenerationKind,
    parameters: &BatchParameters,
    target_count: i64,
) -> Result<QueueRecord, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        r#"
        INSERT INTO queue_records
            (id, owner_id, kind, parameters, target_count, produced_count, error_count, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 'pending', ?6)
        RETURNING *
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(owner_id)
    .bind(kind)
    .bind(sqlx::types::Json(parameters))
    .bind(target_count)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn find_by_id_scoped(
    pool: &SqlitePool,
    id: Uuid,
    owner_id: Uuid,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        "SELECT * FROM queue_records WHERE id = ?1 AND owner_id = ?2",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_active(
    pool: &SqlitePool,
    owner_id: Uuid,
    kind: GenerationKind,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        r#"
        SELECT * FROM queue_records
        WHERE owner_id = ?1 AND kind = ?2 AND status IN ('pending', 'processing')
        "#,
    )
    .bind(owner_id)
    .bind(kind)
    .fetch_optional(pool)
    .await
}

/// First unit call moves a pending record to processing. started_at is set
/// once and kept on any later call.
pub async fn mark_processing(
    pool: &SqlitePool,
    id: Uuid,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE queue_records
        SET status = 'processing', started_at = COALESCE(started_at, ?3)
        WHERE id = ?1 AND owner_id = ?2 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Attribute one produced item to the record. Completes the batch when every
/// attempt is accounted for; a record cancelled mid-flight keeps its
/// cancelled status but still gains the count. Returns None when the guard
/// matched no row (record already completed or fully attempted), in which
/// case the caller must roll back the item it inserted alongside.
pub async fn record_success(
    conn: &mut SqliteConnection,
    id: Uuid,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        r#"
        UPDATE queue_records
        SET produced_count = produced_count + 1,
            status = CASE
                WHEN status = 'cancelled' THEN 'cancelled'
                WHEN produced_count + 1 + error_count >= target_count THEN 'completed'
                ELSE 'processing'
            END,
            completed_at = CASE
                WHEN status = 'cancelled' THEN completed_at
                WHEN produced_count + 1 + error_count >= target_count THEN ?3
                ELSE completed_at
            END
        WHERE id = ?1 AND owner_id = ?2
          AND status != 'completed'
          AND produced_count + error_count < target_count
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(now)
    .fetch_optional(conn)
    .await
}

/// Count one failed attempt. Only non-terminal records accept failures; a
/// failure that lands after cancellation is dropped (None).
pub async fn record_failure(
    pool: &SqlitePool,
    id: Uuid,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        r#"
        UPDATE queue_records
        SET error_count = error_count + 1,
            status = CASE
                WHEN produced_count + error_count + 1 >= target_count THEN 'completed'
                ELSE 'processing'
            END,
            completed_at = CASE
                WHEN produced_count + error_count + 1 >= target_count THEN ?3
                ELSE completed_at
            END
        WHERE id = ?1 AND owner_id = ?2
          AND status IN ('pending', 'processing')
          AND produced_count + error_count < target_count
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Repair pass for a non-terminal record whose attempts are already fully
/// accounted for. Returns None when another caller got there first.
pub async fn complete_exhausted(
    pool: &SqlitePool,
    id: Uuid,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        r#"
        UPDATE queue_records
        SET status = 'completed', completed_at = COALESCE(completed_at, ?3)
        WHERE id = ?1 AND owner_id = ?2
          AND status IN ('pending', 'processing')
          AND produced_count + error_count >= target_count
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Cancel a pending or processing record. Returns None when the record was
/// already terminal (or does not exist); callers re-fetch to tell a repeat
/// cancel from an attempt to cancel a completed batch.
pub async fn cancel(
    pool: &SqlitePool,
    id: Uuid,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(
        r#"
        UPDATE queue_records
        SET status = 'cancelled', completed_at = COALESCE(completed_at, ?3)
        WHERE id = ?1 AND owner_id = ?2 AND status IN ('pending', 'processing')
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(now)
    .fetch_optional(pool)
    .await
}
