//! In-memory [`ArchiveStore`] backend.
//!
//! Backs every engine test and doubles as a throwaway dev backend. Nothing
//! here survives a restart; the sqlite backend is the production default.

mod store;

pub use store::MemoryArchiveStore;
