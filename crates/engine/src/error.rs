use thiserror::Error;

use dropgate_store::StoreError;

use crate::transport::TransportError;

/// Errors surfaced by the engine's public operations.
///
/// None of these are process-fatal: the service keeps serving other batches
/// and uploaders after any single failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested batch id has no rows. User-visible "not found".
    #[error("batch not found: {0}")]
    BatchNotFound(String),

    /// Finalize was called with nothing staged. State is unchanged.
    #[error("no items staged for this uploader")]
    EmptyBatch,

    /// A non-allow-listed identity attempted an uploader-only operation.
    #[error("user {0} is not an allow-listed uploader")]
    Unauthorized(i64),

    /// Durable-write failure. On the upload path the pending batch is
    /// preserved so the uploader can retry without re-uploading.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Transport failure during delivery. Partial deliveries are not
    /// masked; already-sent messages are still scheduled for retraction.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
