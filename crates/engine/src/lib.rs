//! The Dropgate engine: batch assembly, gated delivery, and delayed
//! retraction.
//!
//! The engine owns all the bookkeeping between the archive store and the
//! messaging transport:
//!
//! - [`BatchAssembler`] accumulates an uploader's pending items and commits
//!   them as an immutable batch on finalize.
//! - [`AccessGate`] enforces the channel-membership gate, remembering the
//!   intended batch for requesters who still need to join.
//! - [`DeliveryOrchestrator`] fetches a batch, updates statistics, sends the
//!   copies, and hands the resulting handles to the scheduler.
//! - [`RetractionScheduler`] durably records and executes timed bulk
//!   deletion of delivered copies, surviving restarts via a recovery pass.
//!
//! The transport itself (send, copy, delete, membership lookup) sits behind
//! the narrow traits in [`transport`].

pub mod assembler;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod retraction;
pub mod testing;
pub mod transport;

pub use assembler::BatchAssembler;
pub use delivery::{DeliveryOrchestrator, DeliveryReceipt};
pub use error::EngineError;
pub use gate::{AccessGate, GateDecision};
pub use retraction::RetractionScheduler;
pub use transport::{
    AuthorizationPolicy, MembershipChecker, StaticUploaderList, Transport, TransportError,
};
