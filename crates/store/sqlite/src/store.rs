use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use dropgate_core::{
    AccessStats, ArchiveReport, BatchId, BatchRecord, BatchUsage, ChatId, JobId, MessageId,
    RetractionJob, StoredItemRef, UserId,
};
use dropgate_store::error::StoreError;
use dropgate_store::store::ArchiveStore;

use crate::config::SqliteConfig;
use crate::migrations;

/// SQLite-backed implementation of [`ArchiveStore`].
///
/// Uses `sqlx::SqlitePool` for connection pooling. Open-count increments are
/// a single `ON CONFLICT DO UPDATE SET opens = opens + 1` statement, so
/// concurrent `record_access` calls serialize inside SQLite and no
/// increments are lost.
pub struct SqliteArchiveStore {
    pool: SqlitePool,
    config: Arc<SqliteConfig>,
}

impl SqliteArchiveStore {
    /// Create a new `SqliteArchiveStore` from the provided configuration.
    ///
    /// Opens (creating the file if missing), builds the connection pool, and
    /// runs migrations so the required tables exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if pool creation fails, or
    /// [`StoreError::Backend`] if migrations fail.
    pub async fn new(config: SqliteConfig) -> Result<Self, StoreError> {
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a `SqliteArchiveStore` from an existing pool and config.
    /// Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if migrations fail.
    pub async fn from_pool(pool: SqlitePool, config: SqliteConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    fn count_from_row(value: i64) -> u64 {
        u64::try_from(value).unwrap_or_default()
    }
}

#[async_trait]
impl ArchiveStore for SqliteArchiveStore {
    async fn create_batch(
        &self,
        items: &[StoredItemRef],
        caption: Option<&str>,
    ) -> Result<BatchId, StoreError> {
        let id = BatchId::generate();
        let batches_table = self.config.batches_table();
        let stats_table = self.config.stats_table();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // The stats row's primary key doubles as the duplicate-id check;
        // the transaction is dropped unwritten on conflict.
        let insert_stats = format!("INSERT INTO {stats_table} (batch_id, opens) VALUES (?, 0)");
        if let Err(e) = sqlx::query(&insert_stats)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
        {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return Err(StoreError::DuplicateId(id.to_string()));
                }
            }
            return Err(StoreError::Backend(e.to_string()));
        }

        let insert_item = format!(
            "INSERT INTO {batches_table} (batch_id, seq, source_chat, message_id, caption) \
             VALUES (?, ?, ?, ?, ?)"
        );
        for (seq, item) in items.iter().enumerate() {
            sqlx::query(&insert_item)
                .bind(id.as_str())
                .bind(i64::try_from(seq).unwrap_or(i64::MAX))
                .bind(item.source_chat.get())
                .bind(item.message_id.get())
                .bind(caption)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(id)
    }

    async fn get_batch(&self, id: &BatchId) -> Result<Option<BatchRecord>, StoreError> {
        let batches_table = self.config.batches_table();
        let query = format!(
            "SELECT source_chat, message_id, caption FROM {batches_table} \
             WHERE batch_id = ? ORDER BY seq"
        );

        let rows: Vec<(i64, i64, Option<String>)> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let caption = rows.first().and_then(|(_, _, c)| c.clone());
        let items = rows
            .into_iter()
            .map(|(chat, msg, _)| StoredItemRef::new(ChatId::new(chat), MessageId::new(msg)))
            .collect();

        Ok(Some(BatchRecord {
            id: id.clone(),
            items,
            caption,
        }))
    }

    async fn record_access(
        &self,
        id: &BatchId,
        requester: UserId,
    ) -> Result<AccessStats, StoreError> {
        let stats_table = self.config.stats_table();
        let unique_users_table = self.config.unique_users_table();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let increment = format!(
            "INSERT INTO {stats_table} (batch_id, opens) VALUES (?, 1) \
             ON CONFLICT (batch_id) DO UPDATE SET opens = opens + 1"
        );
        sqlx::query(&increment)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let insert_visitor = format!(
            "INSERT OR IGNORE INTO {unique_users_table} (batch_id, user_id) VALUES (?, ?)"
        );
        sqlx::query(&insert_visitor)
            .bind(id.as_str())
            .bind(requester.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let snapshot = format!(
            "SELECT s.opens, \
             (SELECT COUNT(*) FROM {unique_users_table} u WHERE u.batch_id = s.batch_id) \
             FROM {stats_table} s WHERE s.batch_id = ?"
        );
        let (opens, uniques): (i64, i64) = sqlx::query_as(&snapshot)
            .bind(id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(AccessStats {
            opens: Self::count_from_row(opens),
            unique_visitors: Self::count_from_row(uniques),
        })
    }

    async fn get_stats(&self, id: &BatchId) -> Result<Option<AccessStats>, StoreError> {
        let stats_table = self.config.stats_table();
        let unique_users_table = self.config.unique_users_table();

        let query = format!(
            "SELECT s.opens, \
             (SELECT COUNT(*) FROM {unique_users_table} u WHERE u.batch_id = s.batch_id) \
             FROM {stats_table} s WHERE s.batch_id = ?"
        );
        let row: Option<(i64, i64)> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row.map(|(opens, uniques)| AccessStats {
            opens: Self::count_from_row(opens),
            unique_visitors: Self::count_from_row(uniques),
        }))
    }

    async fn report(&self) -> Result<ArchiveReport, StoreError> {
        let batches_table = self.config.batches_table();
        let stats_table = self.config.stats_table();
        let unique_users_table = self.config.unique_users_table();

        let query = format!(
            "SELECT s.batch_id, s.opens, \
             (SELECT COUNT(*) FROM {batches_table} b WHERE b.batch_id = s.batch_id), \
             (SELECT COUNT(*) FROM {unique_users_table} u WHERE u.batch_id = s.batch_id) \
             FROM {stats_table} s ORDER BY s.opens DESC, s.batch_id ASC"
        );
        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let batches: Vec<BatchUsage> = rows
            .into_iter()
            .map(|(batch_id, opens, item_count, uniques)| BatchUsage {
                id: BatchId::new(batch_id),
                item_count: Self::count_from_row(item_count),
                opens: Self::count_from_row(opens),
                unique_visitors: Self::count_from_row(uniques),
            })
            .collect();

        Ok(ArchiveReport {
            total_batches: batches.len() as u64,
            total_items: batches.iter().map(|b| b.item_count).sum(),
            total_opens: batches.iter().map(|b| b.opens).sum(),
            batches,
        })
    }

    async fn put_job(&self, job: &RetractionJob) -> Result<(), StoreError> {
        let jobs_table = self.config.jobs_table();

        let handles = serde_json::to_string(&job.handles)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let query = format!(
            "INSERT INTO {jobs_table} (job_id, chat, handles, fire_at, completed_at) \
             VALUES (?, ?, ?, ?, NULL)"
        );
        sqlx::query(&query)
            .bind(job.id.as_str())
            .bind(job.chat.get())
            .bind(&handles)
            .bind(job.fire_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn complete_job(&self, id: &JobId) -> Result<bool, StoreError> {
        let jobs_table = self.config.jobs_table();

        let query = format!(
            "UPDATE {jobs_table} SET completed_at = ? \
             WHERE job_id = ? AND completed_at IS NULL"
        );
        let result = sqlx::query(&query)
            .bind(Utc::now().to_rfc3339())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn pending_jobs(&self) -> Result<Vec<RetractionJob>, StoreError> {
        let jobs_table = self.config.jobs_table();

        let query = format!(
            "SELECT job_id, chat, handles, fire_at FROM {jobs_table} \
             WHERE completed_at IS NULL ORDER BY fire_at"
        );
        let rows: Vec<(String, i64, String, String)> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|(job_id, chat, handles, fire_at)| {
                let handles: Vec<MessageId> = serde_json::from_str(&handles)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let fire_at = DateTime::parse_from_rfc3339(&fire_at)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?
                    .with_timezone(&Utc);
                Ok(RetractionJob {
                    id: JobId::new(job_id),
                    chat: ChatId::new(chat),
                    handles,
                    fire_at,
                })
            })
            .collect()
    }
}
