use sqlx::SqlitePool;

/// Create tables and indexes if they do not exist yet. Runs at startup;
/// every statement is idempotent.
pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS queue_records (
            id BLOB PRIMARY KEY,
            owner_id BLOB NOT NULL,
            kind TEXT NOT NULL,
            parameters TEXT NOT NULL,
            target_count INTEGER NOT NULL,
            produced_count INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )",
    )
    .execute(pool)
    .await?;

    // One live batch per owner per kind, enforced at the storage layer so
    // concurrent create requests cannot both slip through.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_records_one_active
         ON queue_records(owner_id, kind)
         WHERE status IN ('pending', 'processing')",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_records_owner
         ON queue_records(owner_id, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS generated_items (
            id BLOB PRIMARY KEY,
            owner_id BLOB NOT NULL,
            kind TEXT NOT NULL,
            subject TEXT NOT NULL,
            topic TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            style TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_generated_items_owner
         ON generated_items(owner_id, kind, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS topic_stats (
            owner_id BLOB NOT NULL,
            kind TEXT NOT NULL,
            subject TEXT NOT NULL,
            topic TEXT NOT NULL,
            item_count INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (owner_id, kind, subject, topic)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS usage_counters (
            owner_id BLOB NOT NULL,
            resource TEXT NOT NULL,
            period_start TEXT NOT NULL,
            used INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (owner_id, resource, period_start)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
