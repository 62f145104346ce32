pub mod items;
pub mod queue_records;
pub mod schema;
pub mod usage;

/// True when the error is a UNIQUE-index violation. SQLite reports these as
/// database errors with a "UNIQUE constraint failed" message.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("UNIQUE constraint failed"),
        _ => false,
    }
}
