use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use dropgate_core::{ChatId, JobId, MessageId, RetractionJob};
use dropgate_store::ArchiveStore;

use crate::error::EngineError;
use crate::transport::Transport;

/// Durable timed bulk retraction of delivered messages.
///
/// [`schedule`](Self::schedule) persists the job before arming its timer, so
/// a process restart cannot silently drop a pending retraction: the startup
/// [`recover`](Self::recover) pass re-arms everything not yet complete,
/// firing overdue jobs immediately.
///
/// Retraction is best-effort cleanup, not a transaction: a delete failure on
/// one handle is logged and the rest of the job proceeds, and the job then
/// completes either way. Deleting an already-gone message counts as success
/// (the transport contract), so firing twice is harmless.
pub struct RetractionScheduler {
    store: Arc<dyn ArchiveStore>,
    transport: Arc<dyn Transport>,
    tracker: TaskTracker,
}

impl RetractionScheduler {
    /// Create a scheduler persisting jobs into `store` and deleting through
    /// `transport`.
    pub fn new(store: Arc<dyn ArchiveStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            tracker: TaskTracker::new(),
        }
    }

    /// Register a retraction of `handles` in `chat` after `delay`.
    ///
    /// The job id and fire time are fixed and persisted before any
    /// suspension; the call returns as soon as the job is durable. Jobs for
    /// different deliveries are independent and fire concurrently.
    pub async fn schedule(
        &self,
        chat: ChatId,
        handles: Vec<MessageId>,
        delay: Duration,
    ) -> Result<JobId, EngineError> {
        let job = RetractionJob::new(chat, handles, delay);
        self.store.put_job(&job).await?;

        debug!(job = %job.id, %chat, handles = job.handles.len(), fire_at = %job.fire_at, "retraction scheduled");
        let id = job.id.clone();
        self.arm(job);
        Ok(id)
    }

    /// Re-arm every job not yet complete. Jobs whose fire time passed while
    /// the process was down fire immediately: the content has already been
    /// exposed longer than intended, so deleting late beats never. Returns
    /// the number of jobs re-armed.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let jobs = self.store.pending_jobs().await?;
        let count = jobs.len();
        let now = Utc::now();
        let overdue = jobs.iter().filter(|job| job.is_due(now)).count();

        if count > 0 {
            info!(count, overdue, "re-arming persisted retraction jobs");
        }
        for job in jobs {
            self.arm(job);
        }
        Ok(count)
    }

    /// Stop accepting new jobs and wait for armed jobs that are already
    /// firing. Jobs still waiting on their timer remain persisted and are
    /// picked up by the next recovery pass.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Spawn the timer task for a job.
    fn arm(&self, job: RetractionJob) {
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        self.tracker.spawn(async move {
            let wait = job.remaining(Utc::now());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            Self::fire(&*store, &*transport, &job).await;
        });
    }

    /// Delete every handle in the job, then mark the job complete.
    async fn fire(store: &dyn ArchiveStore, transport: &dyn Transport, job: &RetractionJob) {
        let mut failed = 0usize;
        for handle in &job.handles {
            if let Err(e) = transport.delete_message(job.chat, *handle).await {
                // Best effort: a stray undeleted message is acceptable,
                // abandoning the rest of the job is not.
                warn!(job = %job.id, chat = %job.chat, %handle, error = %e, "retraction of one handle failed");
                failed += 1;
            }
        }

        match store.complete_job(&job.id).await {
            Ok(true) => info!(
                job = %job.id,
                retracted = job.handles.len() - failed,
                failed,
                "retraction job complete"
            ),
            Ok(false) => debug!(job = %job.id, "job already marked complete"),
            Err(e) => error!(job = %job.id, error = %e, "failed to mark retraction job complete"),
        }
    }
}
