//! Error taxonomy shared by both storage engines and the request processor.
//!
//! Mirrors the outcome codes a memcached-ASCII front end needs to report:
//! hits/misses, CAS conflicts, capacity failures, and non-numeric INCR/DECR
//! operands. Parser-level failures are reported as
//! [`crate::protocol::ParseOutcome::Invalid`] instead, since malformed input
//! is a distinct failure domain from a well-formed request the engine could
//! not satisfy.

use thiserror::Error;

/// Outcome of an engine operation that did not return a value.
///
/// `Ok` results carry their own payload (an `Item`, a count, ...); this type
/// only enumerates the ways an operation can fail or be conditionally
/// refused, so the request processor can map it onto a wire response
/// without engine-specific knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Key does not exist (GET miss treated separately; this is for
    /// operations like DELETE, CAS, INCR/DECR that require presence).
    #[error("not found")]
    NotFound,
    /// CAS token mismatch, or ADD collided with a live key.
    #[error("exists")]
    Exists,
    /// A conditional store's precondition failed (ADD/REPLACE/APPEND/PREPEND).
    #[error("not stored")]
    NotStored,
    /// Value exceeds what the engine can ever store (slot size / max chunk).
    #[error("oversized")]
    Oversized,
    /// Allocation failed after the eviction budget was exhausted.
    #[error("out of memory")]
    NoMem,
    /// INCR/DECR attempted on a value that is not an unsigned decimal integer.
    #[error("non-numeric value")]
    NonNumeric,
}

/// Convenience alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
