use sqlx::SqlitePool;
use uuid::Uuid;

/// Atomically add `amount` to the owner's counter for the current period,
/// but only if the result stays within `limit`. Returns the new total when
/// the consumption was recorded, None when it would exceed the limit (the
/// counter is left untouched). A negative limit means unlimited: usage is
/// still recorded but never denied.
pub async fn try_consume(
    pool: &SqlitePool,
    owner_id: Uuid,
    resource: &str,
    period_start: &str,
    amount: i64,
    limit: i64,
) -> Result<Option<i64>, sqlx::Error> {
    if limit < 0 {
        let used = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO usage_counters (owner_id, resource, period_start, used)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(owner_id, resource, period_start)
            DO UPDATE SET used = used + ?4
            RETURNING used
            "#,
        )
        .bind(owner_id)
        .bind(resource)
        .bind(period_start)
        .bind(amount)
        .fetch_one(pool)
        .await?;

        return Ok(Some(used));
    }

    // Covers zero limits: the fresh-insert arm below would not check them.
    if amount > limit {
        return Ok(None);
    }

    let used = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO usage_counters (owner_id, resource, period_start, used)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(owner_id, resource, period_start)
        DO UPDATE SET used = used + ?4
        WHERE used + ?4 <= ?5
        RETURNING used
        "#,
    )
    .bind(owner_id)
    .bind(resource)
    .bind(period_start)
    .bind(amount)
    .bind(limit)
    .fetch_optional(pool)
    .await?;

    Ok(used)
}

/// Current usage without consuming anything. Absent rows read as zero.
pub async fn peek(
    pool: &SqlitePool,
    owner_id: Uuid,
    resource: &str,
    period_start: &str,
) -> Result<i64, sqlx::Error> {
    let used = sqlx::query_scalar::<_, i64>(
        "SELECT used FROM usage_counters WHERE owner_id = ?1 AND resource = ?2 AND period_start = ?3",
    )
    .bind(owner_id)
    .bind(resource)
    .bind(period_start)
    .fetch_optional(pool)
    .await?;

    Ok(used.unwrap_or(0))
}
