use async_trait::async_trait;

use dropgate_core::{
    AccessStats, ArchiveReport, BatchId, BatchRecord, JobId, RetractionJob, StoredItemRef, UserId,
};

use crate::error::StoreError;

/// Trait for persisting batches, access statistics, and retraction jobs.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Each method is atomic on its own; in particular, concurrent
/// [`record_access`](Self::record_access) calls for the same batch must not
/// lose increments.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Commit a new batch: mint a fresh id, write all item rows and the
    /// zeroed stats row in one transaction, and return the id.
    ///
    /// Returns [`StoreError::DuplicateId`] if the minted id already exists;
    /// the caller retries with nothing written.
    async fn create_batch(
        &self,
        items: &[StoredItemRef],
        caption: Option<&str>,
    ) -> Result<BatchId, StoreError>;

    /// Fetch a committed batch. Returns `None` for an unknown id.
    /// Read-only and idempotent.
    async fn get_batch(&self, id: &BatchId) -> Result<Option<BatchRecord>, StoreError>;

    /// Record one access: increment the open count and insert the requester
    /// into the unique-visitor set if absent. Returns the post-increment
    /// snapshot.
    ///
    /// Counters are created lazily, so recording against a batch with no
    /// stats row yet starts from zero rather than failing.
    async fn record_access(
        &self,
        id: &BatchId,
        requester: UserId,
    ) -> Result<AccessStats, StoreError>;

    /// Current counters for a batch. Returns `None` for an unknown id.
    async fn get_stats(&self, id: &BatchId) -> Result<Option<AccessStats>, StoreError>;

    /// Aggregate usage report: totals across the archive plus per-batch
    /// rows sorted by opens descending.
    async fn report(&self) -> Result<ArchiveReport, StoreError>;

    /// Persist a retraction job so a restart can recover it.
    async fn put_job(&self, job: &RetractionJob) -> Result<(), StoreError>;

    /// Mark a job complete (every handle has had a retraction attempt).
    /// Returns `false` if the job was unknown or already complete.
    async fn complete_job(&self, id: &JobId) -> Result<bool, StoreError>;

    /// All jobs not yet marked complete, in fire-time order.
    async fn pending_jobs(&self) -> Result<Vec<RetractionJob>, StoreError>;
}
