//! Structural handle classification
//!
//! The runtime does not label handle kinds, so kind is inferred from a fixed
//! table of capability probes, ordered from most specific to most generic.
//! An HTTP stream is also a TCP stream; probing the request association first
//! keeps it in the variant that carries more attribution detail.

use crate::handle::HandleSnapshot;
use crate::registry::INSPECT_LOOP_DELAY_MS;

/// The classifier's verdict for one live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Timer whose delay equals the reserved inspect-loop sentinel;
    /// reported with suppressed detail
    InspectLoopTimer,
    /// Repeating timer
    Interval,
    /// Single-shot timer
    Timeout,
    /// Stdio stream of a spawned child process
    ChildProcessStream,
    /// Stream with an attached outbound-request association
    HttpStream,
    /// Stream with a half-open connection configuration
    TcpStream,
    /// Readable+writable handle matching no more specific stream probe
    GenericStream,
    /// Handle exposing a process id
    ChildProcess,
    /// Escape hatch: no probe matched; reported verbatim
    Unknown,
}

/// Capability probe results for one handle. A pure input to [`classify`]:
/// the renderer fills in `child_process_stream` from the provenance store's
/// child stream index so classification itself never touches shared state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleCapabilities {
    /// Configured delay, for handles that fire after a delay
    pub timer_delay_ms: Option<u64>,
    /// Timer reschedules itself after firing
    pub repeats: bool,
    /// Exposes a readable capability
    pub readable: bool,
    /// Exposes a writable capability
    pub writable: bool,
    /// Registered in the child-process stream provenance index
    pub child_process_stream: bool,
    /// Carries an outbound-request association
    pub http_association: bool,
    /// Exposes a boolean half-open connection configuration
    pub half_open_config: bool,
    /// Exposes a process id
    pub process_id: bool,
}

impl HandleCapabilities {
    /// Derive the probe inputs from a snapshot. `child_process_stream` is
    /// store knowledge, so the caller supplies it.
    pub fn of(snapshot: &HandleSnapshot, child_process_stream: bool) -> Self {
        Self {
            timer_delay_ms: snapshot.delay_ms,
            repeats: snapshot.repeats,
            readable: snapshot.readable.is_some(),
            writable: snapshot.writable.is_some(),
            child_process_stream,
            http_association: snapshot.http.is_some(),
            half_open_config: snapshot.allow_half_open.is_some(),
            process_id: snapshot.pid.is_some(),
        }
    }
}

/// Classify one handle. Total and deterministic: every input maps to exactly
/// one kind, with `Unknown` as the explicit escape hatch. First match wins.
pub fn classify(caps: &HandleCapabilities) -> HandleKind {
    if let Some(delay) = caps.timer_delay_ms {
        if delay == INSPECT_LOOP_DELAY_MS {
            return HandleKind::InspectLoopTimer;
        }
        if caps.repeats {
            return HandleKind::Interval;
        }
        return HandleKind::Timeout;
    }

    if caps.readable && caps.writable {
        if caps.child_process_stream {
            return HandleKind::ChildProcessStream;
        }
        if caps.http_association {
            return HandleKind::HttpStream;
        }
        if caps.half_open_config {
            return HandleKind::TcpStream;
        }
        return HandleKind::GenericStream;
    }

    if caps.process_id {
        return HandleKind::ChildProcess;
    }

    HandleKind::Unknown
}
