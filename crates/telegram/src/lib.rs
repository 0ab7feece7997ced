//! Telegram Bot API transport for Dropgate.
//!
//! [`TelegramApi`] is a thin typed client over the Bot API HTTP endpoints
//! the relay needs (`sendMessage`, `copyMessage`, `deleteMessage`,
//! `getChatMember`, `getUpdates`, `answerCallbackQuery`). It implements the
//! engine's [`Transport`](dropgate_engine::Transport) trait;
//! [`ChannelMembership`] implements
//! [`MembershipChecker`](dropgate_engine::MembershipChecker) against the
//! gating channel.

mod client;
mod error;
pub mod types;

pub use client::{ChannelMembership, TelegramApi, TelegramConfig};
pub use error::TelegramError;
