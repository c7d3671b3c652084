//! Live handle model supplied by the runtime collaborator
//!
//! Velador never creates or destroys handles; it only observes snapshots of
//! them. A snapshot carries the capability probe results the classifier needs
//! (does it fire after a delay? is it readable and writable? does it have a
//! pid?) plus the structural facts the report prints (descriptor, address,
//! request method and path).

use serde::{Deserialize, Serialize};

/// Stable identity token for a live handle, assigned by the handle source.
///
/// Used to correlate child-process stdio streams back to the spawn that
/// created them; the token only has to be unique for the life of the handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u64);

/// Outbound-request association attached to a stream handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpAssociation {
    /// Destination host, if the request specified one
    pub host: Option<String>,
    /// Request method (e.g., "GET")
    pub method: Option<String>,
    /// Request path
    pub path: Option<String>,
}

/// Snapshot of one outstanding handle, as observed by the runtime.
///
/// `Option` fields encode capability *presence*: a timer handle has
/// `delay_ms: Some(..)` even for a zero delay, and a stream handle has both
/// `readable` and `writable` set even when neither side is currently open.
#[derive(Debug, Clone, Default)]
pub struct HandleSnapshot {
    /// Identity token, unique among currently-live handles
    pub id: HandleId,
    /// Configured delay; present only on handles that fire after a delay
    pub delay_ms: Option<u64>,
    /// Whether the timer reschedules itself after firing
    pub repeats: bool,
    /// Name of the scheduled callback, when the runtime knows it
    pub callback_name: Option<String>,
    /// Readable capability (presence marks the handle as stream-like)
    pub readable: Option<bool>,
    /// Writable capability (presence marks the handle as stream-like)
    pub writable: Option<bool>,
    /// OS-level descriptor, once known
    pub fd: Option<i32>,
    /// Local address, for handles that are bound
    pub local_address: Option<String>,
    /// Attached outbound-request association, if any
    pub http: Option<HttpAssociation>,
    /// Half-open connection configuration; only plain TCP streams carry it
    pub allow_half_open: Option<bool>,
    /// Process id, for child-process handles
    pub pid: Option<i32>,
    /// Raw debug dump for handles nothing else explains
    pub raw: Option<String>,
}

/// Collaborator boundary: the runtime facility that enumerates outstanding
/// work. Velador consumes the lists as supplied and never reorders them.
pub trait LiveHandleSource {
    /// Ordered list of currently-outstanding handles.
    fn active_handles(&self) -> Vec<HandleSnapshot>;

    /// Number of pending requests (in-flight operations that are not yet
    /// handles). Only the count is reported.
    fn pending_request_count(&self) -> usize;
}
