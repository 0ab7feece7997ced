use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, JobId, MessageId};

/// A durable retraction job: a set of delivered message handles in one chat
/// that must be deleted once the fire time is reached.
///
/// Identity and fire time are fixed at creation, before the job is handed to
/// any timer, so a recovery pass after a restart can re-arm the job from its
/// persisted form. A job is terminal once every handle has had a retraction
/// attempt; partial per-handle failures still complete the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetractionJob {
    pub id: JobId,
    /// Chat the messages were delivered to.
    pub chat: ChatId,
    /// Handles to retract, in delivery order.
    pub handles: Vec<MessageId>,
    /// Wall-clock time at which the retraction fires.
    pub fire_at: DateTime<Utc>,
}

impl RetractionJob {
    /// Build a job firing `delay` from now.
    #[must_use]
    pub fn new(chat: ChatId, handles: Vec<MessageId>, delay: std::time::Duration) -> Self {
        // Out-of-range delays saturate to the calendar maximum; adding an
        // unclamped delta to now() would overflow and panic.
        let delay = Duration::from_std(delay).unwrap_or(Duration::MAX);
        let fire_at = Utc::now()
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: JobId::generate(),
            chat,
            handles,
            fire_at,
        }
    }

    /// Whether the fire time has already passed.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }

    /// Time remaining until the fire time, zero if already due.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.fire_at - now).to_std().unwrap_or_default()
    }
}
