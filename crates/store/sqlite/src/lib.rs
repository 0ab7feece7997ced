//! SQLite [`ArchiveStore`] backend.
//!
//! The production default: a single local database file holding the batch
//! rows, access counters, unique-visitor set, and pending retraction jobs.
//! Tables are created by idempotent migrations at connect time.
//!
//! [`ArchiveStore`]: dropgate_store::ArchiveStore

mod config;
mod migrations;
mod store;

pub use config::SqliteConfig;
pub use store::SqliteArchiveStore;
