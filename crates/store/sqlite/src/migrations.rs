use sqlx::SqlitePool;

use crate::config::SqliteConfig;

/// Run database migrations, creating required tables if they do not exist.
///
/// Creates the batches, stats, unique-users, and retraction-jobs tables with
/// the configured table prefix. All statements are idempotent.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &SqlitePool, config: &SqliteConfig) -> Result<(), sqlx::Error> {
    let batches_table = config.batches_table();
    let stats_table = config.stats_table();
    let unique_users_table = config.unique_users_table();
    let jobs_table = config.jobs_table();

    // One row per item; `seq` preserves upload order within the batch.
    let create_batches = format!(
        "CREATE TABLE IF NOT EXISTS {batches_table} (
            batch_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            source_chat INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            caption TEXT,
            PRIMARY KEY (batch_id, seq)
        )"
    );

    let create_stats = format!(
        "CREATE TABLE IF NOT EXISTS {stats_table} (
            batch_id TEXT PRIMARY KEY,
            opens INTEGER NOT NULL DEFAULT 0
        )"
    );

    let create_unique_users = format!(
        "CREATE TABLE IF NOT EXISTS {unique_users_table} (
            batch_id TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            PRIMARY KEY (batch_id, user_id)
        )"
    );

    // Handles stored as a JSON array; completed_at doubles as the terminal
    // marker so the recovery pass can filter on NULL.
    let create_jobs = format!(
        "CREATE TABLE IF NOT EXISTS {jobs_table} (
            job_id TEXT PRIMARY KEY,
            chat INTEGER NOT NULL,
            handles TEXT NOT NULL,
            fire_at TEXT NOT NULL,
            completed_at TEXT
        )"
    );

    let create_jobs_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}jobs_fire_at_idx ON {jobs_table} (fire_at)",
        config.table_prefix
    );

    sqlx::query(&create_batches).execute(pool).await?;
    sqlx::query(&create_stats).execute(pool).await?;
    sqlx::query(&create_unique_users).execute(pool).await?;
    sqlx::query(&create_jobs).execute(pool).await?;
    sqlx::query(&create_jobs_idx).execute(pool).await?;

    Ok(())
}
