//! Archive store abstraction.
//!
//! The store is the only shared durable resource in the system: batches,
//! access statistics, and pending retraction jobs all live behind the
//! [`ArchiveStore`] trait. Backends provide per-call atomicity; callers
//! never get cross-call transactions.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::ArchiveStore;
