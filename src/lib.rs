//! This crate implements the stateful decode-session manager used on the receive side of a
//! HARQ-based link: a long-lived dispatcher object hands out, reuses, and reclaims per-session
//! soft-combining buffers across repeated stateless invocations. A generational handle store maps
//! opaque 64-bit handles to buffer pools; each pool owns a bounded collection of combining buffers
//! keyed by (RNTI, HARQ process) with LRU eviction and slot-based expiration; a session facade
//! ties one pool store to an external decode engine and exposes the `new`/`step`/`reset_crcs`/
//! `release` operations through a name-keyed command dispatcher.

#![warn(
    clippy::complexity,
    clippy::pedantic,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_allocation,
    unused_import_braces,
    unused_qualifications
)]

use thiserror::Error;

mod dispatch;
mod engine;
pub mod ldpc;
mod pool;
mod session;
pub mod sim;
mod store;
pub mod utils;

pub use dispatch::{Callback, Dispatcher};
pub use engine::{
    codeblock_layout, segment_transport_block, ChaseDecoder, CodeblockLayout, DecodeConfig,
    DecodeEngine, DecodeOutput,
};
pub use pool::{BufferPool, CombiningBuffer, PoolConfig, SessionId};
pub use session::{
    BufferRequest, DecodeSession, DecodeStats, DecoderContext, Reply, Request, SegmentConfig,
};
pub use store::{Handle, HandleStore};

/// Custom error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration or call argument
    #[error("{0}")]
    InvalidArgument(String),
    /// Handle absent from the store or failed its generation check (the two cases are
    /// deliberately not distinguished)
    #[error("No buffer pool found for handle {0:#018x}")]
    UnknownHandle(u64),
    /// No live combining buffer exists for the given session identifier
    #[error("No live combining buffer for session {0}")]
    BufferNotFound(SessionId),
    /// Pool cannot honor a reservation within its codeblock budget
    #[error("Reservation of {requested} codeblocks exceeds the pool budget of {budget}")]
    CapacityExceeded {
        /// Number of codeblocks requested
        requested: usize,
        /// Total codeblock budget of the pool
        budget: usize,
    },
    /// Caller-declared codeblock count disagrees with the stored or independently computed one
    #[error("Declared codeblock count {declared} does not match expected count {expected}")]
    CodeblockCountMismatch {
        /// Codeblock count declared by the caller
        declared: usize,
        /// Codeblock count stored in the buffer or computed from the segmentation
        expected: usize,
    },
    /// Buffer pool construction failure
    #[error("Cannot create buffer pool: {0}")]
    ResourceCreationFailed(String),
    /// Action name already registered with the dispatcher
    #[error("Action {0} already exists")]
    DuplicateAction(String),
    /// Action name not registered with the dispatcher
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    /// File read/write error
    #[error("{0}")]
    FileReadWriteError(#[from] std::io::Error),
    /// Serde read/write error
    #[error("{0}")]
    SerdeReadWriteError(#[from] serde_json::Error),
}

/// Enumeration of binary symbol values
#[derive(Clone, Eq, PartialEq, Debug, Copy)]
pub enum Bit {
    /// Binary symbol `0`
    Zero = 0,
    /// Binary symbol `1`
    One = 1,
}
