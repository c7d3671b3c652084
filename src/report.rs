//! Leak report renderer
//!
//! Thin glue over the classifier and resolver: walks the live-handle list in
//! the order the runtime supplied it and emits one block per handle with its
//! kind, structural facts (as a JSON object), and attribution when a
//! provenance record resolves. An attribution miss degrades to the
//! structural facts alone; nothing here is fatal.

use std::fmt;
use std::io::Write;

use anyhow::Context;
use serde::Serialize;

use crate::classify::{classify, HandleCapabilities, HandleKind};
use crate::handle::{HandleSnapshot, LiveHandleSource};
use crate::provenance::ProvenanceStore;
use crate::resolve::{AttributionResolver, ResolverOptions};

/// Console-like sink the report is written to, one line at a time.
pub trait LogSink {
    fn log_line(&mut self, line: &str);
}

impl<W: Write> LogSink for W {
    fn log_line(&mut self, line: &str) {
        if let Err(err) = writeln!(self, "{}", line) {
            tracing::warn!(%err, "log sink write failed");
        }
    }
}

/// Report configuration.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub resolver: ResolverOptions,
}

#[derive(Debug, Serialize)]
struct StreamFacts<'a> {
    fd: Option<i32>,
    readable: Option<bool>,
    writable: Option<bool>,
    address: Option<&'a str>,
}

impl<'a> StreamFacts<'a> {
    fn of(snapshot: &'a HandleSnapshot) -> Self {
        Self {
            fd: snapshot.fd,
            readable: snapshot.readable,
            writable: snapshot.writable,
            address: snapshot.local_address.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HttpStreamFacts<'a> {
    fd: Option<i32>,
    readable: Option<bool>,
    writable: Option<bool>,
    address: Option<&'a str>,
    method: Option<&'a str>,
    path: Option<&'a str>,
    host: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChildProcessFacts<'a> {
    pid: Option<i32>,
    command: Option<&'a str>,
}

/// Render the leak report with default options.
pub fn print_handles(
    sink: &mut dyn LogSink,
    source: &dyn LiveHandleSource,
    store: &ProvenanceStore,
) {
    print_handles_with(sink, source, store, &ReportOptions::default());
}

/// Render the leak report. Handles appear in the order the source supplied
/// them; the pending-request count line is printed only when nonzero.
pub fn print_handles_with(
    sink: &mut dyn LogSink,
    source: &dyn LiveHandleSource,
    store: &ProvenanceStore,
    options: &ReportOptions,
) {
    let resolver = AttributionResolver::new(options.resolver.clone());

    let requests = source.pending_request_count();
    if requests > 0 {
        sink.log_line(&format!("no of requests {}", requests));
    }

    sink.log_line("");
    sink.log_line("");

    let handles = source.active_handles();
    sink.log_line(&format!("no of handles {}", handles.len()));
    for snapshot in &handles {
        print_handle(sink, store, &resolver, snapshot);
    }

    sink.log_line("");
    sink.log_line("");
}

fn print_handle(
    sink: &mut dyn LogSink,
    store: &ProvenanceStore,
    resolver: &AttributionResolver,
    snapshot: &HandleSnapshot,
) {
    let caps = HandleCapabilities::of(snapshot, store.is_child_stream(snapshot.id));
    match classify(&caps) {
        HandleKind::InspectLoopTimer => sink.log_line("timer handle (inspect loop)"),
        HandleKind::Interval => print_timer(sink, store, resolver, snapshot, "interval"),
        HandleKind::Timeout => print_timer(sink, store, resolver, snapshot, "timeout"),
        HandleKind::ChildProcessStream => print_child_stream(sink, store, resolver, snapshot),
        HandleKind::HttpStream => print_http_stream(sink, store, resolver, snapshot),
        HandleKind::TcpStream => print_tcp_stream(sink, store, resolver, snapshot),
        HandleKind::GenericStream => {
            sink.log_line(&render_facts("stream handle", &StreamFacts::of(snapshot)));
        }
        HandleKind::ChildProcess => print_child_process(sink, store, resolver, snapshot),
        HandleKind::Unknown => {
            let raw = snapshot.raw.as_deref().unwrap_or("<no debug info>");
            sink.log_line(&format!("unknown handle {}", raw));
        }
    }
}

fn print_timer(
    sink: &mut dyn LogSink,
    store: &ProvenanceStore,
    resolver: &AttributionResolver,
    snapshot: &HandleSnapshot,
    name: &str,
) {
    // Classification guarantees the delay is present
    let delay = snapshot.delay_ms.unwrap_or_default();
    let callback = snapshot.callback_name.as_deref().unwrap_or("fn");

    sink.log_line("");
    sink.log_line(&format!("timer handle (`{}({}, {})`)", name, callback, delay));

    if let Some(block) = resolver.attribution_block("timer handle", store.timer_records(delay)) {
        sink.log_line(&block);
    }

    if let Some(callback) = &snapshot.callback_name {
        sink.log_line(&format!("timer listener `{}`", callback));
    } else if let Some(raw) = &snapshot.raw {
        sink.log_line(raw);
    }

    sink.log_line("");
}

fn print_tcp_stream(
    sink: &mut dyn LogSink,
    store: &ProvenanceStore,
    resolver: &AttributionResolver,
    snapshot: &HandleSnapshot,
) {
    if let Some(fd) = snapshot.fd {
        if let Some(block) = resolver.attribution_block("tcp handle", store.socket_records(fd)) {
            sink.log_line(&block);
        }
    }
    sink.log_line(&render_facts("tcp stream", &StreamFacts::of(snapshot)));
}

fn print_http_stream(
    sink: &mut dyn LogSink,
    store: &ProvenanceStore,
    resolver: &AttributionResolver,
    snapshot: &HandleSnapshot,
) {
    let http = snapshot.http.as_ref();
    let host = http.and_then(|h| h.host.as_deref());

    // Host-keyed attribution first; fall back to the socket mapping
    let block = host
        .and_then(|host| resolver.attribution_block("http handle", store.request_records(host)))
        .or_else(|| {
            snapshot
                .fd
                .and_then(|fd| resolver.attribution_block("tcp handle", store.socket_records(fd)))
        });
    if let Some(block) = block {
        sink.log_line(&block);
    }

    let facts = HttpStreamFacts {
        fd: snapshot.fd,
        readable: snapshot.readable,
        writable: snapshot.writable,
        address: snapshot.local_address.as_deref(),
        method: http.and_then(|h| h.method.as_deref()),
        path: http.and_then(|h| h.path.as_deref()),
        host,
    };
    sink.log_line(&render_facts("http stream", &facts));
}

fn print_child_stream(
    sink: &mut dyn LogSink,
    store: &ProvenanceStore,
    resolver: &AttributionResolver,
    snapshot: &HandleSnapshot,
) {
    if let Some(record) = store
        .child_owner(snapshot.id)
        .and_then(|owner| store.child_record(owner))
    {
        if let Some(block) =
            resolver.attribution_block("child process handle", std::slice::from_ref(record))
        {
            sink.log_line(&block);
        }
    }
    sink.log_line(&render_facts(
        "child process stdio stream handle",
        &StreamFacts::of(snapshot),
    ));
}

fn print_child_process(
    sink: &mut dyn LogSink,
    store: &ProvenanceStore,
    resolver: &AttributionResolver,
    snapshot: &HandleSnapshot,
) {
    let record = store.child_record(snapshot.id);

    if let Some(record) = record {
        if let Some(block) =
            resolver.attribution_block("child process handle", std::slice::from_ref(record))
        {
            sink.log_line(&block);
        }
    }

    let facts = ChildProcessFacts {
        pid: snapshot.pid,
        command: record
            .and_then(|r| r.spawn.as_ref())
            .map(|spawn| spawn.command.as_str()),
    };
    sink.log_line(&render_facts("child process handle", &facts));
}

fn render_facts<T: Serialize + fmt::Debug>(label: &str, facts: &T) -> String {
    match serde_json::to_string(facts).context("failed to serialize structural facts") {
        Ok(json) => format!("{} {}", label, json),
        Err(err) => {
            tracing::warn!(%err, "falling back to debug formatting");
            format!("{} {:?}", label, facts)
        }
    }
}
