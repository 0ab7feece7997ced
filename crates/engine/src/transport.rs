use async_trait::async_trait;
use thiserror::Error;

use dropgate_core::{ChatId, MessageId, UserId};

use crate::error::EngineError;

/// Errors from the messaging transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The platform rejected the request (bad chat, missing permission, ...).
    #[error("api error: {0}")]
    Api(String),

    /// The request never completed (connection refused, DNS, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The bounded connect/read timeout elapsed. Treated like any other
    /// transient per-call failure.
    #[error("request timed out")]
    Timeout,
}

/// Narrow interface to the messaging platform.
///
/// Everything the engine needs from the transport: sending a text message,
/// re-copying an archived item into a chat, and deleting a delivered copy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Copy a message between chats, optionally replacing its caption.
    /// Returns the handle of the new copy.
    async fn copy_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
        caption: Option<&str>,
    ) -> Result<MessageId, TransportError>;

    /// Send a plain text message. Returns its handle.
    async fn send_message(&self, to_chat: ChatId, text: &str) -> Result<MessageId, TransportError>;

    /// Delete a previously delivered message.
    ///
    /// Implementations must treat an already-absent message as success, so
    /// retraction is at-most-once logically even when attempted twice.
    async fn delete_message(&self, chat: ChatId, message_id: MessageId)
        -> Result<(), TransportError>;
}

/// Membership lookup against the gating channel.
///
/// Callers treat `Err` as not-a-member (fail closed); the error is logged
/// but never propagated to the requester.
#[async_trait]
pub trait MembershipChecker: Send + Sync {
    async fn is_member(&self, user: UserId) -> Result<bool, TransportError>;
}

/// Decides who may upload and view statistics.
pub trait AuthorizationPolicy: Send + Sync {
    fn is_uploader(&self, user: UserId) -> bool;

    /// Gate an uploader-only operation.
    fn authorize(&self, user: UserId) -> Result<(), EngineError> {
        if self.is_uploader(user) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized(user.get()))
        }
    }
}

/// Allow-list backed [`AuthorizationPolicy`], the only policy the service
/// ships with.
#[derive(Debug, Clone, Default)]
pub struct StaticUploaderList {
    allowed: Vec<UserId>,
}

impl StaticUploaderList {
    /// Build from the configured uploader ids.
    #[must_use]
    pub fn new(allowed: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl AuthorizationPolicy for StaticUploaderList {
    fn is_uploader(&self, user: UserId) -> bool {
        self.allowed.contains(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_list_allows_only_listed_users() {
        let policy = StaticUploaderList::new([UserId::new(1), UserId::new(2)]);
        assert!(policy.is_uploader(UserId::new(1)));
        assert!(policy.is_uploader(UserId::new(2)));
        assert!(!policy.is_uploader(UserId::new(3)));
    }

    #[test]
    fn empty_list_allows_nobody() {
        let policy = StaticUploaderList::default();
        assert!(!policy.is_uploader(UserId::new(1)));
    }

    #[test]
    fn authorize_rejects_unlisted_users() {
        let policy = StaticUploaderList::new([UserId::new(1)]);
        assert!(policy.authorize(UserId::new(1)).is_ok());
        assert!(matches!(
            policy.authorize(UserId::new(3)),
            Err(EngineError::Unauthorized(3))
        ));
    }
}
