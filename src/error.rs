//! Error taxonomy for interception bookkeeping
//!
//! None of these are ever surfaced to the caller of a wrapped creation
//! operation: the registry swallows them after logging, so the real resource
//! creation always succeeds independent of diagnostic bookkeeping.

use thiserror::Error;

/// Failure modes of provenance bookkeeping inside the interception layer.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// A collaborator-supplied key probe (descriptor or identity closure)
    /// panicked while inspecting the created resource.
    #[error("key probe panicked during {surface} interception")]
    KeyProbePanicked { surface: &'static str },

    /// The provenance store mutex was poisoned by an earlier panic.
    #[error("provenance store lock poisoned")]
    StorePoisoned,

    /// A connection ticket was resolved twice, or never issued by this store.
    #[error("pending connection {0} already resolved or unknown")]
    UnknownPendingConnection(u64),
}
