//! Test doubles for the transport traits.
//!
//! Used by the engine's own tests and by downstream crates that want to
//! exercise delivery and retraction without a live messaging platform.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use dropgate_core::{ChatId, MessageId, UserId};

use crate::transport::{MembershipChecker, Transport, TransportError};

/// A message the [`RecordingTransport`] has "sent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    /// Plain text message (the delivery banner).
    Text {
        to_chat: ChatId,
        handle: MessageId,
        text: String,
    },
    /// A copy of an archived item.
    Copy {
        from_chat: ChatId,
        source: MessageId,
        to_chat: ChatId,
        handle: MessageId,
        caption: Option<String>,
    },
}

impl SentMessage {
    /// Handle assigned to this message.
    #[must_use]
    pub fn handle(&self) -> MessageId {
        match self {
            Self::Text { handle, .. } | Self::Copy { handle, .. } => *handle,
        }
    }
}

/// In-memory [`Transport`] that records every call and can be scripted to
/// fail specific operations.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    next_handle: AtomicI64,
    sent: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<(ChatId, MessageId)>>,
    deletes_to_fail: Mutex<HashSet<i64>>,
    copies_to_fail: Mutex<HashSet<i64>>,
}

impl RecordingTransport {
    /// Create a transport that succeeds on everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `delete_message` of this handle return an error.
    pub fn fail_delete_of(&self, handle: MessageId) {
        self.deletes_to_fail
            .lock()
            .expect("lock poisoned")
            .insert(handle.get());
    }

    /// Make every future `copy_message` of this source message fail.
    pub fn fail_copy_of(&self, source: MessageId) {
        self.copies_to_fail
            .lock()
            .expect("lock poisoned")
            .insert(source.get());
    }

    /// Everything sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    /// Every `(chat, handle)` pair deleted so far, in order of the attempt.
    #[must_use]
    pub fn deleted(&self) -> Vec<(ChatId, MessageId)> {
        self.deleted.lock().expect("lock poisoned").clone()
    }

    fn mint_handle(&self) -> MessageId {
        MessageId::new(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn copy_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
        caption: Option<&str>,
    ) -> Result<MessageId, TransportError> {
        if self
            .copies_to_fail
            .lock()
            .expect("lock poisoned")
            .contains(&message_id.get())
        {
            return Err(TransportError::Api("copy failed".into()));
        }
        let handle = self.mint_handle();
        self.sent.lock().expect("lock poisoned").push(SentMessage::Copy {
            from_chat,
            source: message_id,
            to_chat,
            handle,
            caption: caption.map(str::to_owned),
        });
        Ok(handle)
    }

    async fn send_message(&self, to_chat: ChatId, text: &str) -> Result<MessageId, TransportError> {
        let handle = self.mint_handle();
        self.sent.lock().expect("lock poisoned").push(SentMessage::Text {
            to_chat,
            handle,
            text: text.to_owned(),
        });
        Ok(handle)
    }

    async fn delete_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        if self
            .deletes_to_fail
            .lock()
            .expect("lock poisoned")
            .contains(&message_id.get())
        {
            return Err(TransportError::Api("delete failed".into()));
        }
        self.deleted
            .lock()
            .expect("lock poisoned")
            .push((chat, message_id));
        Ok(())
    }
}

/// Scriptable [`MembershipChecker`].
#[derive(Debug, Default)]
pub struct StaticMembership {
    members: Mutex<HashSet<i64>>,
    failing: Mutex<bool>,
}

impl StaticMembership {
    /// Create a checker with no members.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member.
    pub fn add(&self, user: UserId) {
        self.members
            .lock()
            .expect("lock poisoned")
            .insert(user.get());
    }

    /// Remove a member.
    pub fn remove(&self, user: UserId) {
        self.members
            .lock()
            .expect("lock poisoned")
            .remove(&user.get());
    }

    /// Make every membership lookup return an error until unset. Callers
    /// are expected to fail closed.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("lock poisoned") = failing;
    }
}

#[async_trait]
impl MembershipChecker for StaticMembership {
    async fn is_member(&self, user: UserId) -> Result<bool, TransportError> {
        if *self.failing.lock().expect("lock poisoned") {
            return Err(TransportError::Network("lookup failed".into()));
        }
        Ok(self
            .members
            .lock()
            .expect("lock poisoned")
            .contains(&user.get()))
    }
}
