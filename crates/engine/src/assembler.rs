use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use dropgate_core::{BatchId, StoredItemRef, UserId};
use dropgate_store::{ArchiveStore, StoreError};

use crate::error::EngineError;

/// Attempts at minting a fresh batch id before giving up on collisions.
const MAX_ID_ATTEMPTS: u32 = 3;

/// An uploader's staged items since the last finalize or reset.
#[derive(Debug, Default)]
struct PendingBatch {
    items: Vec<StoredItemRef>,
    caption: Option<String>,
}

/// Per-uploader staging area for batch assembly.
///
/// Each uploader owns one [`PendingBatch`] behind its own mutex, so
/// concurrent uploads from the same uploader serialize (item order stays
/// intact) while distinct uploaders never contend. Nothing here is
/// persisted until [`finalize`](Self::finalize) commits the batch.
pub struct BatchAssembler {
    store: Arc<dyn ArchiveStore>,
    pending: DashMap<UserId, Arc<Mutex<PendingBatch>>>,
}

impl BatchAssembler {
    /// Create an assembler committing into the given store.
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self {
            store,
            pending: DashMap::new(),
        }
    }

    /// Return this uploader's staging slot, creating it if absent.
    ///
    /// The `Arc` is cloned out so the map shard lock is released before the
    /// per-uploader mutex is awaited.
    fn slot(&self, uploader: UserId) -> Arc<Mutex<PendingBatch>> {
        self.pending.entry(uploader).or_default().value().clone()
    }

    /// Append an item to the uploader's pending batch, creating the batch
    /// if absent. A provided caption replaces the stored one (last caption
    /// wins). Returns the staged item count.
    pub async fn add_item(
        &self,
        uploader: UserId,
        item: StoredItemRef,
        caption: Option<String>,
    ) -> usize {
        let slot = self.slot(uploader);
        let mut pending = slot.lock().await;

        pending.items.push(item);
        if caption.is_some() {
            pending.caption = caption;
        }

        debug!(%uploader, count = pending.items.len(), "item staged");
        pending.items.len()
    }

    /// Commit the uploader's pending batch and return its id.
    ///
    /// Fails with [`EngineError::EmptyBatch`] when nothing is staged. On a
    /// storage failure the pending batch is left intact so the uploader can
    /// retry without re-uploading anything.
    pub async fn finalize(&self, uploader: UserId) -> Result<BatchId, EngineError> {
        let Some(slot) = self.pending.get(&uploader).map(|entry| entry.value().clone()) else {
            return Err(EngineError::EmptyBatch);
        };
        let mut pending = slot.lock().await;

        if pending.items.is_empty() {
            return Err(EngineError::EmptyBatch);
        }

        let id = self
            .commit(&pending.items, pending.caption.as_deref())
            .await?;

        info!(%uploader, batch = %id, items = pending.items.len(), "batch committed");
        pending.items.clear();
        pending.caption = None;

        Ok(id)
    }

    /// Discard the uploader's pending batch without persisting. Returns
    /// `true` if anything was staged.
    pub async fn reset(&self, uploader: UserId) -> bool {
        let Some(slot) = self.pending.get(&uploader).map(|entry| entry.value().clone()) else {
            return false;
        };
        let mut pending = slot.lock().await;

        let had_items = !pending.items.is_empty();
        pending.items.clear();
        pending.caption = None;
        had_items
    }

    /// Number of items currently staged for the uploader.
    pub async fn pending_len(&self, uploader: UserId) -> usize {
        match self.pending.get(&uploader).map(|entry| entry.value().clone()) {
            Some(slot) => slot.lock().await.items.len(),
            None => 0,
        }
    }

    /// Write the batch, retrying with a fresh id on the (vanishingly rare)
    /// token collision.
    async fn commit(
        &self,
        items: &[StoredItemRef],
        caption: Option<&str>,
    ) -> Result<BatchId, EngineError> {
        let mut attempt = 0;
        loop {
            match self.store.create_batch(items, caption).await {
                Ok(id) => return Ok(id),
                Err(StoreError::DuplicateId(id)) if attempt + 1 < MAX_ID_ATTEMPTS => {
                    attempt += 1;
                    warn!(%id, attempt, "batch id collision, retrying with a fresh id");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
