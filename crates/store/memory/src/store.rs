use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;

use dropgate_core::{
    AccessStats, ArchiveReport, BatchId, BatchRecord, BatchUsage, JobId, RetractionJob,
    StoredItemRef, UserId,
};
use dropgate_store::error::StoreError;
use dropgate_store::store::ArchiveStore;

/// Counters for one batch.
#[derive(Debug, Default)]
struct StatsEntry {
    opens: u64,
    visitors: HashSet<UserId>,
}

impl StatsEntry {
    fn snapshot(&self) -> AccessStats {
        AccessStats {
            opens: self.opens,
            unique_visitors: self.visitors.len() as u64,
        }
    }
}

/// A persisted retraction job plus its completion flag.
#[derive(Debug)]
struct JobEntry {
    job: RetractionJob,
    completed: bool,
}

/// In-memory [`ArchiveStore`] backed by [`DashMap`]s.
///
/// Mutations go through the `DashMap` entry API, which holds the shard lock
/// for the duration of the closure, so concurrent `record_access` calls for
/// the same batch cannot lose increments.
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    batches: DashMap<String, BatchRecord>,
    stats: DashMap<String, StatsEntry>,
    jobs: DashMap<String, JobEntry>,
}

impl MemoryArchiveStore {
    /// Create a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn create_batch(
        &self,
        items: &[StoredItemRef],
        caption: Option<&str>,
    ) -> Result<BatchId, StoreError> {
        let id = BatchId::generate();

        match self.batches.entry(id.as_str().to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::DuplicateId(id.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(BatchRecord {
                    id: id.clone(),
                    items: items.to_vec(),
                    caption: caption.map(str::to_owned),
                });
            }
        }
        self.stats
            .entry(id.as_str().to_owned())
            .or_insert_with(StatsEntry::default);

        Ok(id)
    }

    async fn get_batch(&self, id: &BatchId) -> Result<Option<BatchRecord>, StoreError> {
        Ok(self.batches.get(id.as_str()).map(|r| r.value().clone()))
    }

    async fn record_access(
        &self,
        id: &BatchId,
        requester: UserId,
    ) -> Result<AccessStats, StoreError> {
        let mut entry = self
            .stats
            .entry(id.as_str().to_owned())
            .or_insert_with(StatsEntry::default);
        entry.opens += 1;
        entry.visitors.insert(requester);
        Ok(entry.snapshot())
    }

    async fn get_stats(&self, id: &BatchId) -> Result<Option<AccessStats>, StoreError> {
        Ok(self.stats.get(id.as_str()).map(|e| e.snapshot()))
    }

    async fn report(&self) -> Result<ArchiveReport, StoreError> {
        let mut batches: Vec<BatchUsage> = self
            .batches
            .iter()
            .map(|entry| {
                let stats = self
                    .stats
                    .get(entry.key())
                    .map(|e| e.snapshot())
                    .unwrap_or_default();
                BatchUsage {
                    id: entry.value().id.clone(),
                    item_count: entry.value().items.len() as u64,
                    opens: stats.opens,
                    unique_visitors: stats.unique_visitors,
                }
            })
            .collect();
        batches.sort_by(|a, b| {
            b.opens
                .cmp(&a.opens)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });

        Ok(ArchiveReport {
            total_batches: batches.len() as u64,
            total_items: batches.iter().map(|b| b.item_count).sum(),
            total_opens: batches.iter().map(|b| b.opens).sum(),
            batches,
        })
    }

    async fn put_job(&self, job: &RetractionJob) -> Result<(), StoreError> {
        self.jobs.insert(
            job.id.as_str().to_owned(),
            JobEntry {
                job: job.clone(),
                completed: false,
            },
        );
        Ok(())
    }

    async fn complete_job(&self, id: &JobId) -> Result<bool, StoreError> {
        match self.jobs.get_mut(id.as_str()) {
            Some(mut entry) if !entry.completed => {
                entry.completed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_jobs(&self) -> Result<Vec<RetractionJob>, StoreError> {
        let mut jobs: Vec<RetractionJob> = self
            .jobs
            .iter()
            .filter(|entry| !entry.completed)
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by_key(|job| job.fire_at);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropgate_core::{ChatId, MessageId};
    use std::sync::Arc;
    use std::time::Duration;

    fn item(msg: i64) -> StoredItemRef {
        StoredItemRef::new(ChatId::new(-100), MessageId::new(msg))
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = MemoryArchiveStore::new();
        let items = vec![item(1), item(2), item(3)];
        let id = store.create_batch(&items, Some("c")).await.unwrap();

        let batch = store.get_batch(&id).await.unwrap().unwrap();
        assert_eq!(batch.items, items);
        assert_eq!(batch.caption.as_deref(), Some("c"));

        // Stats row is created with the batch.
        let stats = store.get_stats(&id).await.unwrap().unwrap();
        assert_eq!(stats, AccessStats::default());
    }

    #[tokio::test]
    async fn unknown_batch_is_none() {
        let store = MemoryArchiveStore::new();
        let id = BatchId::new("nope");
        assert!(store.get_batch(&id).await.unwrap().is_none());
        assert!(store.get_stats(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_access_counts_opens_and_uniques() {
        let store = MemoryArchiveStore::new();
        let id = store.create_batch(&[item(1)], None).await.unwrap();

        store.record_access(&id, UserId::new(1)).await.unwrap();
        store.record_access(&id, UserId::new(1)).await.unwrap();
        let stats = store.record_access(&id, UserId::new(2)).await.unwrap();

        assert_eq!(stats.opens, 3);
        assert_eq!(stats.unique_visitors, 2);
    }

    #[tokio::test]
    async fn concurrent_access_loses_no_increments() {
        let store = Arc::new(MemoryArchiveStore::new());
        let id = store.create_batch(&[item(1)], None).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..50i64 {
            let store = Arc::clone(&store);
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                // 10 distinct requesters, 5 accesses each.
                store.record_access(&id, UserId::new(i % 10)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stats = store.get_stats(&id).await.unwrap().unwrap();
        assert_eq!(stats.opens, 50);
        assert_eq!(stats.unique_visitors, 10);
    }

    #[tokio::test]
    async fn report_sorts_by_opens_descending() {
        let store = MemoryArchiveStore::new();
        let cold = store.create_batch(&[item(1)], None).await.unwrap();
        let hot = store.create_batch(&[item(2), item(3)], None).await.unwrap();

        for user in 0..3 {
            store.record_access(&hot, UserId::new(user)).await.unwrap();
        }
        store.record_access(&cold, UserId::new(9)).await.unwrap();

        let report = store.report().await.unwrap();
        assert_eq!(report.total_batches, 2);
        assert_eq!(report.total_items, 3);
        assert_eq!(report.total_opens, 4);
        assert_eq!(report.batches[0].id, hot);
        assert_eq!(report.batches[0].unique_visitors, 3);
        assert_eq!(report.batches[1].id, cold);
    }

    #[tokio::test]
    async fn job_lifecycle() {
        let store = MemoryArchiveStore::new();
        let job = RetractionJob::new(
            ChatId::new(5),
            vec![MessageId::new(1), MessageId::new(2)],
            Duration::from_secs(60),
        );
        store.put_job(&job).await.unwrap();

        let pending = store.pending_jobs().await.unwrap();
        assert_eq!(pending, vec![job.clone()]);

        assert!(store.complete_job(&job.id).await.unwrap());
        assert!(!store.complete_job(&job.id).await.unwrap());
        assert!(store.pending_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_jobs_sorted_by_fire_time() {
        let store = MemoryArchiveStore::new();
        let late = RetractionJob::new(ChatId::new(1), vec![], Duration::from_secs(600));
        let soon = RetractionJob::new(ChatId::new(1), vec![], Duration::from_secs(10));
        store.put_job(&late).await.unwrap();
        store.put_job(&soon).await.unwrap();

        let pending = store.pending_jobs().await.unwrap();
        assert_eq!(pending[0].id, soon.id);
        assert_eq!(pending[1].id, late.id);
    }
}
