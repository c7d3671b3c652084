//! Instrumentation registry: the interception layer
//!
//! A process-wide service owning wrapped versions of the resource-creation
//! surfaces. Each wrapper captures the current call stack before delegating
//! to the real operation, returns the operation's result unchanged, derives
//! the provenance key, and appends a record to the store. Bookkeeping
//! failures are logged and swallowed: the real resource creation must always
//! succeed independent of diagnostic bookkeeping.
//!
//! `install()` is the one-way, process-wide entry point; tests construct
//! their own `InstrumentationRegistry` instead so interception state stays
//! per test case.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, OnceLock};

use crate::error::InterceptError;
use crate::handle::{HandleId, LiveHandleSource};
use crate::provenance::{PendingConnectionId, ProvenanceStore};
use crate::report::{self, LogSink};
use crate::stack;

/// Reserved delay identifying the internal periodic handle-inspection loop.
/// Timers with this delay are reported with suppressed detail; collaborators
/// scheduling such a loop should align on this constant.
pub const INSPECT_LOOP_DELAY_MS: u64 = 5001;

/// Sentinel host under which outbound requests with no destination host are
/// grouped.
pub const UNSPECIFIED_HOST: &str = "void";

/// One-shot ticket for a connection whose descriptor becomes known only at
/// the "became ready" event. The instrumented surface attaches a one-time
/// observer to the created socket and resolves the ticket from it.
#[derive(Debug)]
pub struct ConnectionTicket {
    id: PendingConnectionId,
}

/// Identity of a spawned child as probed from the spawn result: the process
/// handle's token plus the tokens of its stdio stream handles.
#[derive(Debug, Clone)]
pub struct ChildIdentity {
    pub process: HandleId,
    pub stdio: Vec<HandleId>,
}

/// Process-wide owner of the provenance store and the creation wrappers.
#[derive(Debug, Default)]
pub struct InstrumentationRegistry {
    store: Mutex<ProvenanceStore>,
}

impl InstrumentationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run bookkeeping against the store, swallowing every failure mode.
    fn with_store_mut<F>(&self, surface: &'static str, f: F)
    where
        F: FnOnce(&mut ProvenanceStore) -> Result<(), InterceptError>,
    {
        match self.store.lock() {
            Ok(mut store) => {
                if let Err(err) = f(&mut store) {
                    tracing::warn!(surface, %err, "provenance bookkeeping failed");
                }
            }
            Err(_) => {
                let err = InterceptError::StorePoisoned;
                tracing::warn!(surface, %err, "provenance bookkeeping failed");
            }
        }
    }

    /// Read-only store access for the resolver and renderer. `None` if the
    /// store lock is poisoned.
    pub fn read_store<R>(&self, f: impl FnOnce(&ProvenanceStore) -> R) -> Option<R> {
        self.store.lock().ok().map(|store| f(&store))
    }

    /// Wrap a connection-establishment call.
    ///
    /// `connect` performs the real operation; its result is returned
    /// unchanged. `descriptor` probes the result for a synchronously-ready
    /// descriptor. When the probe yields one the record is keyed
    /// immediately and no ticket is issued; otherwise the returned
    /// [`ConnectionTicket`] must be resolved via
    /// [`connection_established`](Self::connection_established) once the
    /// connect event fires. A panicking probe degrades to an unticketed,
    /// unrecorded connection.
    pub fn wrap_connection<T, C, D>(&self, connect: C, descriptor: D) -> (T, Option<ConnectionTicket>)
    where
        C: FnOnce() -> T,
        D: FnOnce(&T) -> Option<i32>,
    {
        let stack = stack::capture();
        let value = connect();

        match catch_unwind(AssertUnwindSafe(|| descriptor(&value))) {
            Ok(Some(fd)) => {
                self.with_store_mut("connection", |store| {
                    store.record_socket(fd, stack);
                    Ok(())
                });
                (value, None)
            }
            Ok(None) => {
                let mut ticket = None;
                self.with_store_mut("connection", |store| {
                    ticket = Some(ConnectionTicket {
                        id: store.begin_pending_connection(stack),
                    });
                    Ok(())
                });
                (value, ticket)
            }
            Err(_) => {
                let err = InterceptError::KeyProbePanicked {
                    surface: "connection",
                };
                tracing::warn!(%err, "provenance bookkeeping failed");
                (value, None)
            }
        }
    }

    /// Resolve a pending connection with the descriptor observed at the
    /// connect event.
    pub fn connection_established(&self, ticket: ConnectionTicket, fd: i32) {
        self.with_store_mut("connection", |store| {
            store.establish_connection(ticket.id, fd)
        });
    }

    /// Wrap a single-shot timer scheduling call. The key is the requested
    /// delay, known synchronously.
    pub fn wrap_timeout<T>(&self, delay_ms: u64, schedule: impl FnOnce() -> T) -> T {
        let stack = stack::capture();
        let value = schedule();
        self.with_store_mut("timer", |store| {
            store.record_timer(delay_ms, stack);
            Ok(())
        });
        value
    }

    /// Wrap a repeating timer scheduling call. Repeating and single-shot
    /// timers share the delay-keyed mapping.
    pub fn wrap_interval<T>(&self, delay_ms: u64, schedule: impl FnOnce() -> T) -> T {
        self.wrap_timeout(delay_ms, schedule)
    }

    /// Wrap an outbound request issuance. The key is the destination host,
    /// or [`UNSPECIFIED_HOST`] when the request names none.
    pub fn wrap_request<T>(&self, host: Option<&str>, issue: impl FnOnce() -> T) -> T {
        let stack = stack::capture();
        let value = issue();
        let host = host.unwrap_or(UNSPECIFIED_HOST).to_string();
        self.with_store_mut("request", |store| {
            store.record_request(&host, stack);
            Ok(())
        });
        value
    }

    /// Wrap a child-process spawn. `identify` probes the spawn result for
    /// the child's identity token and its stdio stream tokens; a panicking
    /// probe leaves the spawn unrecorded.
    pub fn wrap_spawn<T, S, I>(&self, command: &str, args: &[String], spawn: S, identify: I) -> T
    where
        S: FnOnce() -> T,
        I: FnOnce(&T) -> ChildIdentity,
    {
        let stack = stack::capture();
        let value = spawn();

        match catch_unwind(AssertUnwindSafe(|| identify(&value))) {
            Ok(identity) => {
                self.with_store_mut("spawn", |store| {
                    store.record_child(identity.process, command, args, stack);
                    for stream in identity.stdio {
                        store.register_child_stream(stream, identity.process);
                    }
                    Ok(())
                });
            }
            Err(_) => {
                let err = InterceptError::KeyProbePanicked { surface: "spawn" };
                tracing::warn!(%err, "provenance bookkeeping failed");
            }
        }

        value
    }

    /// Render the leak report for the current live handles to `sink`.
    pub fn report(&self, sink: &mut dyn LogSink, source: &dyn LiveHandleSource) {
        if self
            .read_store(|store| report::print_handles(sink, source, store))
            .is_none()
        {
            tracing::warn!("provenance store poisoned; skipping report");
        }
    }
}

/// Install the process-wide registry. Idempotent: every call returns the
/// same instance, and installation is a one-way state transition with no
/// uninstall path.
pub fn install() -> &'static InstrumentationRegistry {
    static REGISTRY: OnceLock<InstrumentationRegistry> = OnceLock::new();
    REGISTRY.get_or_init(InstrumentationRegistry::new)
}
