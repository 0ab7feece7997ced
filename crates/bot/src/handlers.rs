use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use dropgate_core::{BatchId, ChatId, StoredItemRef, UserId};
use dropgate_engine::{
    AccessGate, AuthorizationPolicy, BatchAssembler, DeliveryOrchestrator, EngineError,
    GateDecision, StaticUploaderList,
};
use dropgate_store::ArchiveStore;
use dropgate_telegram::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update};
use dropgate_telegram::{TelegramApi, TelegramError};

use crate::config::BotConfig;

/// Errors inside one update's handling. Logged and dropped at the loop
/// boundary; never fatal for the process.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Telegram(#[from] TelegramError),
}

/// The relay front-end: routes incoming updates to the engine.
pub struct Relay {
    api: Arc<TelegramApi>,
    store: Arc<dyn ArchiveStore>,
    assembler: BatchAssembler,
    gate: AccessGate,
    orchestrator: DeliveryOrchestrator,
    policy: StaticUploaderList,
    config: BotConfig,
}

impl Relay {
    pub fn new(
        api: Arc<TelegramApi>,
        store: Arc<dyn ArchiveStore>,
        assembler: BatchAssembler,
        gate: AccessGate,
        orchestrator: DeliveryOrchestrator,
        config: BotConfig,
    ) -> Self {
        let policy =
            StaticUploaderList::new(config.uploaders.iter().copied().map(UserId::new));
        Self {
            api,
            store,
            assembler,
            gate,
            orchestrator,
            policy,
            config,
        }
    }

    /// Handle one update in isolation: errors are logged, never propagated.
    pub async fn handle_update(&self, update: Update) {
        let update_id = update.update_id;
        if let Err(e) = self.dispatch(update).await {
            warn!(update_id, error = %e, "update handling failed");
        }
    }

    async fn dispatch(&self, update: Update) -> Result<(), BotError> {
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        if let Some(query) = update.callback_query {
            return self.handle_callback(query).await;
        }
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<(), BotError> {
        let Some(from) = message.from.clone() else {
            return Ok(());
        };
        let user = from.id;
        let chat = message.chat.id;

        if let Some(text) = message.text.clone() {
            if let Some(arg) = text.strip_prefix("/start") {
                return self.handle_start(user, chat, arg.trim()).await;
            }
            if text.trim() == "/stats" {
                return self.handle_stats(user, chat).await;
            }
            return Ok(());
        }

        if message.has_media() {
            return self.handle_upload(user, chat, &message).await;
        }
        Ok(())
    }

    /// `/start` without an argument is the upload prompt; with an argument
    /// it is a batch link follow.
    async fn handle_start(
        &self,
        user: UserId,
        chat: ChatId,
        arg: &str,
    ) -> Result<(), BotError> {
        if arg.is_empty() {
            self.api
                .send_message(chat, "Upload files with an optional caption.")
                .await?;
            return Ok(());
        }

        match self.gate.request(BatchId::new(arg), user).await {
            GateDecision::Granted(batch) => self.deliver(&batch, user, chat).await,
            GateDecision::MustJoin => {
                self.api
                    .send_message_with_keyboard(
                        chat,
                        "Please join the channel to access these files.",
                        &self.join_keyboard(),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    async fn handle_stats(&self, user: UserId, chat: ChatId) -> Result<(), BotError> {
        if let Err(e) = self.policy.authorize(user) {
            debug!(error = %e, "stats request rejected");
            self.api
                .send_message(chat, "You are not allowed to view stats.")
                .await?;
            return Ok(());
        }

        let report = self.store.report().await.map_err(EngineError::from)?;

        let mut text = format!(
            "Relay statistics\n\nLinks: {}\nFiles: {}\nOpens: {}\n",
            report.total_batches, report.total_items, report.total_opens
        );
        if report.batches.is_empty() {
            text.push_str("\nNo opens yet.");
        } else {
            for usage in &report.batches {
                text.push_str(&format!(
                    "\n{}\n  files: {}  opens: {}  unique: {}\n",
                    usage.id, usage.item_count, usage.opens, usage.unique_visitors
                ));
            }
        }

        self.api.send_message(chat, &text).await?;
        Ok(())
    }

    /// A media message from an allow-listed uploader: copy into the archive
    /// first, then stage the archived locator (write-ahead order — the
    /// batch row must never reference content that is not in the archive).
    async fn handle_upload(
        &self,
        user: UserId,
        chat: ChatId,
        message: &Message,
    ) -> Result<(), BotError> {
        if !self.policy.is_uploader(user) {
            // Silently ignored, matching the upload surface's contract.
            return Ok(());
        }

        let archive = ChatId::new(self.config.archive_chat);
        let archived = self
            .api
            .copy_message(chat, message.message_id, archive, None)
            .await?;

        let count = self
            .assembler
            .add_item(
                user,
                StoredItemRef::new(archive, archived),
                message.caption.clone(),
            )
            .await;

        self.api
            .send_message_with_keyboard(
                chat,
                &format!("Stored. Files staged: {count}"),
                &self.batch_keyboard(),
            )
            .await?;
        Ok(())
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<(), BotError> {
        if let Err(e) = self.api.answer_callback_query(&query.id).await {
            warn!(error = %e, "failed to answer callback query");
        }

        let user = query.from.id;
        let chat = query
            .message
            .as_ref()
            .map_or(ChatId::new(user.get()), |m| m.chat.id);

        match query.data.as_deref() {
            Some("check_join") => match self.gate.confirm(user).await {
                Some(batch) => self.deliver(&batch, user, chat).await,
                None => {
                    self.api
                        .send_message_with_keyboard(
                            chat,
                            "You haven't joined the channel yet.",
                            &self.join_keyboard(),
                        )
                        .await?;
                    Ok(())
                }
            },
            Some("add_more") if self.policy.is_uploader(user) => {
                self.api.send_message(chat, "Send more files.").await?;
                Ok(())
            }
            Some("done") if self.policy.is_uploader(user) => {
                match self.assembler.finalize(user).await {
                    Ok(batch) => {
                        info!(%user, %batch, "batch finalized");
                        let link = self.config.batch_link(batch.as_str());
                        self.api
                            .send_message(chat, &format!("Here is your file link:\n{link}"))
                            .await?;
                        Ok(())
                    }
                    Err(EngineError::EmptyBatch) => {
                        self.api.send_message(chat, "No files staged.").await?;
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            _ => Ok(()),
        }
    }

    async fn deliver(&self, batch: &BatchId, user: UserId, chat: ChatId) -> Result<(), BotError> {
        match self.orchestrator.deliver(batch, user, chat).await {
            Ok(receipt) => {
                info!(%batch, %user, handles = receipt.handles.len(), opens = receipt.stats.opens, "batch delivered");
                Ok(())
            }
            Err(EngineError::BatchNotFound(_)) => {
                self.api.send_message(chat, "Files not found.").await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn join_keyboard(&self) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup {
            inline_keyboard: vec![vec![
                InlineKeyboardButton::url("Join the channel", &self.config.gate_channel_url),
                InlineKeyboardButton::callback("I already joined", "check_join"),
            ]],
        }
    }

    fn batch_keyboard(&self) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup {
            inline_keyboard: vec![
                vec![InlineKeyboardButton::callback("Add more files", "add_more")],
                vec![InlineKeyboardButton::callback("Done (get link)", "done")],
            ],
        }
    }
}
