//! Provenance store: creation records keyed per handle kind
//!
//! Four independent mappings, one per handle kind. Socket records are keyed
//! by descriptor, timers by requested delay, outbound requests by destination
//! host, child processes by identity token. Timer and host keys aggregate:
//! multiple creation events sharing a key collapse into one group, which is a
//! known-imprecise correlation, not a bug. The store is append-only and is
//! reclaimed with process exit.

use std::collections::HashMap;

use crate::error::InterceptError;
use crate::handle::HandleId;
use crate::stack::CapturedStack;

/// Which creation surface produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Socket,
    Timer,
    HttpRequest,
    ChildProcess,
}

/// Kind-specific metadata for child-process records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnMetadata {
    pub command: String,
    pub args: Vec<String>,
}

/// One creation event: the captured stack plus kind-specific metadata.
/// Immutable after insertion.
#[derive(Debug, Clone)]
pub struct ProvenanceRecord {
    pub kind: RecordKind,
    pub stack: CapturedStack,
    /// Present only for `RecordKind::ChildProcess`
    pub spawn: Option<SpawnMetadata>,
}

impl ProvenanceRecord {
    fn plain(kind: RecordKind, stack: CapturedStack) -> Self {
        Self {
            kind,
            stack,
            spawn: None,
        }
    }
}

/// Two-state lifecycle for a socket whose descriptor is not known at
/// creation time: `Pending` until the connection-established event supplies
/// the descriptor, then `Keyed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketProvenance {
    Pending(CapturedStack),
    Keyed { fd: i32, stack: CapturedStack },
}

impl SocketProvenance {
    /// Transition on the connection-established event. Already-keyed entries
    /// keep their first descriptor.
    pub fn establish(self, fd: i32) -> Self {
        match self {
            SocketProvenance::Pending(stack) => SocketProvenance::Keyed { fd, stack },
            keyed @ SocketProvenance::Keyed { .. } => keyed,
        }
    }

    pub fn fd(&self) -> Option<i32> {
        match self {
            SocketProvenance::Pending(_) => None,
            SocketProvenance::Keyed { fd, .. } => Some(*fd),
        }
    }
}

/// Ticket for a connection awaiting its descriptor. One-shot: resolving it
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingConnectionId(pub(crate) u64);

/// Process-wide keyed storage of creation records.
///
/// Written only by the interception layer, read only by the attribution
/// resolver; append-only with no eviction.
#[derive(Debug, Default)]
pub struct ProvenanceStore {
    sockets: HashMap<i32, Vec<ProvenanceRecord>>,
    pending_connections: HashMap<u64, SocketProvenance>,
    next_pending: u64,
    timers: HashMap<u64, Vec<ProvenanceRecord>>,
    requests: HashMap<String, Vec<ProvenanceRecord>>,
    children: HashMap<HandleId, ProvenanceRecord>,
    child_streams: HashMap<HandleId, HandleId>,
}

impl ProvenanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a socket creation whose descriptor was available synchronously.
    pub fn record_socket(&mut self, fd: i32, stack: CapturedStack) {
        tracing::debug!(fd, "recording socket provenance");
        self.sockets
            .entry(fd)
            .or_default()
            .push(ProvenanceRecord::plain(RecordKind::Socket, stack));
    }

    /// Begin tracking a socket whose descriptor is not yet known. The
    /// returned ticket must be resolved at the connection-established event.
    pub fn begin_pending_connection(&mut self, stack: CapturedStack) -> PendingConnectionId {
        let id = self.next_pending;
        self.next_pending += 1;
        self.pending_connections
            .insert(id, SocketProvenance::Pending(stack));
        tracing::debug!(ticket = id, "connection pending descriptor");
        PendingConnectionId(id)
    }

    /// Resolve a pending connection with the descriptor observed at the
    /// "became ready" event.
    pub fn establish_connection(
        &mut self,
        ticket: PendingConnectionId,
        fd: i32,
    ) -> Result<(), InterceptError> {
        let state = self
            .pending_connections
            .remove(&ticket.0)
            .ok_or(InterceptError::UnknownPendingConnection(ticket.0))?;

        if let SocketProvenance::Keyed { fd, stack } = state.establish(fd) {
            tracing::debug!(ticket = ticket.0, fd, "connection established");
            self.record_socket(fd, stack);
        }
        Ok(())
    }

    pub fn record_timer(&mut self, delay_ms: u64, stack: CapturedStack) {
        tracing::debug!(delay_ms, "recording timer provenance");
        self.timers
            .entry(delay_ms)
            .or_default()
            .push(ProvenanceRecord::plain(RecordKind::Timer, stack));
    }

    pub fn record_request(&mut self, host: &str, stack: CapturedStack) {
        tracing::debug!(host, "recording request provenance");
        self.requests
            .entry(host.to_string())
            .or_default()
            .push(ProvenanceRecord::plain(RecordKind::HttpRequest, stack));
    }

    /// Record a spawned child process, keyed by its identity token. Child
    /// keys are 1:1; a duplicate token keeps the first record.
    pub fn record_child(
        &mut self,
        child: HandleId,
        command: &str,
        args: &[String],
        stack: CapturedStack,
    ) {
        tracing::debug!(?child, command, "recording child process provenance");
        self.children.entry(child).or_insert(ProvenanceRecord {
            kind: RecordKind::ChildProcess,
            stack,
            spawn: Some(SpawnMetadata {
                command: command.to_string(),
                args: args.to_vec(),
            }),
        });
    }

    /// Index a stdio stream handle as belonging to a spawned child.
    pub fn register_child_stream(&mut self, stream: HandleId, child: HandleId) {
        self.child_streams.insert(stream, child);
    }

    pub fn socket_records(&self, fd: i32) -> &[ProvenanceRecord] {
        self.sockets.get(&fd).map_or(&[], Vec::as_slice)
    }

    pub fn timer_records(&self, delay_ms: u64) -> &[ProvenanceRecord] {
        self.timers.get(&delay_ms).map_or(&[], Vec::as_slice)
    }

    pub fn request_records(&self, host: &str) -> &[ProvenanceRecord] {
        self.requests.get(host).map_or(&[], Vec::as_slice)
    }

    pub fn child_record(&self, child: HandleId) -> Option<&ProvenanceRecord> {
        self.children.get(&child)
    }

    /// Which child, if any, owns this stdio stream handle.
    pub fn child_owner(&self, stream: HandleId) -> Option<HandleId> {
        self.child_streams.get(&stream).copied()
    }

    pub fn is_child_stream(&self, stream: HandleId) -> bool {
        self.child_streams.contains_key(&stream)
    }

    /// Number of connections still awaiting a descriptor.
    pub fn pending_connection_count(&self) -> usize {
        self.pending_connections.len()
    }
}
