use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, ChatId, MessageId};

/// Locator for one archived item: enough for the transport to re-copy the
/// canonical copy out of the archive channel. Owned by exactly one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredItemRef {
    /// Chat holding the canonical copy (the archive channel).
    pub source_chat: ChatId,
    /// Message id of the canonical copy within that chat.
    pub message_id: MessageId,
}

impl StoredItemRef {
    /// Create a new locator.
    #[must_use]
    pub const fn new(source_chat: ChatId, message_id: MessageId) -> Self {
        Self {
            source_chat,
            message_id,
        }
    }
}

/// A committed batch: an ordered set of archived items plus one shared
/// caption, addressable by a single link. Immutable once written; batches
/// are archival and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: BatchId,
    /// Items in upload order; delivery preserves this order.
    pub items: Vec<StoredItemRef>,
    /// Caption applied to every item when the batch is delivered.
    pub caption: Option<String>,
}

/// Access counters for one batch. Append/increment only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStats {
    /// Total number of deliveries of this batch.
    pub opens: u64,
    /// Number of distinct requester identities observed.
    pub unique_visitors: u64,
}

/// Per-batch row in the aggregate report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUsage {
    pub id: BatchId,
    pub item_count: u64,
    pub opens: u64,
    pub unique_visitors: u64,
}

/// Aggregate usage report across the whole archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub total_batches: u64,
    pub total_items: u64,
    pub total_opens: u64,
    /// Per-batch rows, sorted by opens descending.
    pub batches: Vec<BatchUsage>,
}
