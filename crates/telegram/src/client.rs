use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use dropgate_core::{ChatId, MessageId, UserId};
use dropgate_engine::{MembershipChecker, Transport, TransportError};

use crate::error::TelegramError;
use crate::types::{
    ApiResponse, ChatMember, InlineKeyboardMarkup, Message, MessageIdResult, Update,
};

/// Configuration for the Bot API client.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot credential token.
    pub token: String,
    /// API base URL; overridable for tests and local API servers.
    pub api_base_url: String,
    /// Connect timeout for every request.
    pub connect_timeout: Duration,
    /// Read timeout for every request. Long-poll requests extend this by
    /// the poll duration.
    pub read_timeout: Duration,
}

impl TelegramConfig {
    /// Standard configuration for a bot token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base_url: String::from("https://api.telegram.org"),
            connect_timeout: Duration::from_secs(20),
            read_timeout: Duration::from_secs(20),
        }
    }
}

/// Typed client for the handful of Bot API methods the relay uses.
pub struct TelegramApi {
    config: TelegramConfig,
    client: Client,
}

impl TelegramApi {
    /// Create a new client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TelegramError::Network`] if the HTTP client cannot be
    /// built.
    pub fn new(config: TelegramConfig) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| TelegramError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Create a client with a caller-supplied `reqwest::Client`.
    #[must_use]
    pub fn with_client(config: TelegramConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base_url, self.config.token
        )
    }

    /// POST one Bot API method and unwrap the response envelope.
    async fn call<T, B>(&self, method: &str, body: &B) -> Result<T, TelegramError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        self.call_with_timeout(method, body, None).await
    }

    async fn call_with_timeout<T, B>(
        &self,
        method: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        let envelope: ApiResponse<T> = response.json().await?;
        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| String::from("unknown error"));
            return Err(TelegramError::Api(description));
        }
        envelope
            .result
            .ok_or_else(|| TelegramError::MissingResult(method.to_owned()))
    }

    /// `sendMessage`.
    #[instrument(skip(self, text))]
    pub async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
    ) -> Result<Message, TelegramError> {
        self.call("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await
    }

    /// `sendMessage` with an inline keyboard.
    #[instrument(skip(self, text, keyboard))]
    pub async fn send_message_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &InlineKeyboardMarkup,
    ) -> Result<Message, TelegramError> {
        self.call(
            "sendMessage",
            &json!({ "chat_id": chat_id, "text": text, "reply_markup": keyboard }),
        )
        .await
    }

    /// `copyMessage`: re-send an existing message into another chat,
    /// optionally replacing the caption.
    #[instrument(skip(self, caption))]
    pub async fn copy_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
        caption: Option<&str>,
    ) -> Result<MessageId, TelegramError> {
        let mut body = json!({
            "chat_id": to_chat,
            "from_chat_id": from_chat,
            "message_id": message_id,
        });
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }
        let result: MessageIdResult = self.call("copyMessage", &body).await?;
        Ok(result.message_id)
    }

    /// `deleteMessage`. Surfaces API errors as-is; the [`Transport`] impl
    /// maps "already gone" to success.
    #[instrument(skip(self))]
    pub async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<bool, TelegramError> {
        self.call(
            "deleteMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
    }

    /// `getChatMember` against a public channel username.
    #[instrument(skip(self))]
    pub async fn get_chat_member(
        &self,
        channel: &str,
        user: UserId,
    ) -> Result<ChatMember, TelegramError> {
        self.call(
            "getChatMember",
            &json!({ "chat_id": format!("@{channel}"), "user_id": user }),
        )
        .await
    }

    /// `getUpdates` long polling. `offset` is one past the last confirmed
    /// update id.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        self.call_with_timeout(
            "getUpdates",
            &json!({ "offset": offset, "timeout": poll.as_secs() }),
            Some(self.config.read_timeout + poll),
        )
        .await
    }

    /// `answerCallbackQuery`: acknowledge a button press.
    pub async fn answer_callback_query(&self, id: &str) -> Result<bool, TelegramError> {
        self.call("answerCallbackQuery", &json!({ "callback_query_id": id }))
            .await
    }
}

/// Whether a `deleteMessage` API error means the message was already gone.
fn is_already_deleted(description: &str) -> bool {
    let lowered = description.to_lowercase();
    lowered.contains("message to delete not found") || lowered.contains("message can't be deleted")
}

#[async_trait]
impl Transport for TelegramApi {
    async fn copy_message(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        to_chat: ChatId,
        caption: Option<&str>,
    ) -> Result<MessageId, TransportError> {
        Self::copy_message(self, from_chat, message_id, to_chat, caption)
            .await
            .map_err(Into::into)
    }

    async fn send_message(&self, to_chat: ChatId, text: &str) -> Result<MessageId, TransportError> {
        let message = Self::send_message(self, to_chat, text).await?;
        Ok(message.message_id)
    }

    async fn delete_message(
        &self,
        chat: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        match Self::delete_message(self, chat, message_id).await {
            Ok(_) => Ok(()),
            // Retraction contract: an already-absent message is success.
            Err(TelegramError::Api(desc)) if is_already_deleted(&desc) => {
                debug!(%chat, %message_id, "message already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Membership lookups against the gating channel.
///
/// Gate failures are surfaced as errors; the engine's gate treats them as
/// not-a-member (fail closed).
pub struct ChannelMembership {
    api: Arc<TelegramApi>,
    channel: String,
}

impl ChannelMembership {
    /// Create a checker for a public channel username (without `@`).
    pub fn new(api: Arc<TelegramApi>, channel: impl Into<String>) -> Self {
        Self {
            api,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl MembershipChecker for ChannelMembership {
    async fn is_member(&self, user: UserId) -> Result<bool, TransportError> {
        match self.api.get_chat_member(&self.channel, user).await {
            Ok(member) => Ok(member.is_member()),
            Err(e) => {
                warn!(%user, channel = %self.channel, error = %e, "membership lookup failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_includes_token() {
        let api = TelegramApi::new(TelegramConfig::new("123:abc")).unwrap();
        assert_eq!(
            api.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn already_deleted_detection() {
        assert!(is_already_deleted(
            "Bad Request: message to delete not found"
        ));
        assert!(is_already_deleted("Bad Request: message can't be deleted"));
        assert!(!is_already_deleted("Forbidden: bot was blocked by the user"));
    }

    #[test]
    fn default_config_timeouts() {
        let cfg = TelegramConfig::new("t");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(20));
        assert_eq!(cfg.read_timeout, Duration::from_secs(20));
        assert_eq!(cfg.api_base_url, "https://api.telegram.org");
    }
}
