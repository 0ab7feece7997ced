use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use dropgate_core::{AccessStats, BatchId, ChatId, JobId, MessageId, UserId};
use dropgate_store::ArchiveStore;

use crate::error::EngineError;
use crate::retraction::RetractionScheduler;
use crate::transport::Transport;

/// Everything a completed delivery produced.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Handles of the banner plus every copied item, in send order.
    pub handles: Vec<MessageId>,
    /// Post-increment stats snapshot for the batch.
    pub stats: AccessStats,
    /// The scheduled retraction job.
    pub job: JobId,
}

/// Delivers a batch into a requester's chat and schedules its retraction.
///
/// Gating happens before this component: `deliver` assumes the requester
/// already passed the membership check.
pub struct DeliveryOrchestrator {
    store: Arc<dyn ArchiveStore>,
    transport: Arc<dyn Transport>,
    scheduler: Arc<RetractionScheduler>,
    banner_text: String,
    retraction_delay: Duration,
}

impl DeliveryOrchestrator {
    /// Create an orchestrator.
    ///
    /// `banner_text` is the warning message sent ahead of the items;
    /// `retraction_delay` is how long delivered copies live.
    pub fn new(
        store: Arc<dyn ArchiveStore>,
        transport: Arc<dyn Transport>,
        scheduler: Arc<RetractionScheduler>,
        banner_text: impl Into<String>,
        retraction_delay: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            scheduler,
            banner_text: banner_text.into(),
            retraction_delay,
        }
    }

    /// Deliver `batch` to `target_chat` on behalf of `requester`.
    ///
    /// Sends the banner, copies every item in stored order with the batch
    /// caption, registers all handles with the retraction scheduler, and
    /// returns the handles plus a stats snapshot.
    ///
    /// A copy failure aborts the delivery and is surfaced to the caller;
    /// whatever was already sent is still scheduled for retraction so
    /// nothing lingers past the delay.
    #[instrument(skip(self), fields(batch = %batch, %requester, chat = %target_chat))]
    pub async fn deliver(
        &self,
        batch: &BatchId,
        requester: UserId,
        target_chat: ChatId,
    ) -> Result<DeliveryReceipt, EngineError> {
        let record = self
            .store
            .get_batch(batch)
            .await?
            .ok_or_else(|| EngineError::BatchNotFound(batch.to_string()))?;

        let stats = self.store.record_access(batch, requester).await?;

        let banner = self
            .transport
            .send_message(target_chat, &self.banner_text)
            .await?;
        let mut handles = vec![banner];

        for item in &record.items {
            match self
                .transport
                .copy_message(
                    item.source_chat,
                    item.message_id,
                    target_chat,
                    record.caption.as_deref(),
                )
                .await
            {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Don't leave the partial delivery lingering in the chat.
                    warn!(error = %e, sent = handles.len(), "copy failed mid-delivery, scheduling cleanup of partial delivery");
                    self.scheduler
                        .schedule(target_chat, handles, self.retraction_delay)
                        .await?;
                    return Err(e.into());
                }
            }
        }

        let job = self
            .scheduler
            .schedule(target_chat, handles.clone(), self.retraction_delay)
            .await?;

        Ok(DeliveryReceipt {
            handles,
            stats,
            job,
        })
    }
}
