//! Core domain types for the Dropgate file relay.
//!
//! Everything here is transport-agnostic: identifiers, batch records,
//! access statistics, and retraction jobs. The store and engine crates
//! build on these types; nothing in this crate performs I/O.

pub mod batch;
pub mod ids;
pub mod job;

pub use batch::{AccessStats, ArchiveReport, BatchRecord, BatchUsage, StoredItemRef};
pub use ids::{BatchId, ChatId, JobId, MessageId, UserId};
pub use job::RetractionJob;
