//! Interception layer integration: wrapping is transparent, keys land in the
//! right mapping, and the process-wide install path stays idempotent.

use serial_test::serial;
use velador::handle::{HandleId, HandleSnapshot, LiveHandleSource};
use velador::registry::{install, ChildIdentity, InstrumentationRegistry};

struct FakeSource {
    handles: Vec<HandleSnapshot>,
    requests: usize,
}

impl LiveHandleSource for FakeSource {
    fn active_handles(&self) -> Vec<HandleSnapshot> {
        self.handles.clone()
    }

    fn pending_request_count(&self) -> usize {
        self.requests
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

#[test]
fn wrapped_operations_return_their_results_unchanged() {
    init_tracing();
    let registry = InstrumentationRegistry::new();

    assert_eq!(registry.wrap_timeout(100, || "timer token"), "timer token");
    assert_eq!(registry.wrap_interval(100, || 7u64), 7);
    assert_eq!(registry.wrap_request(Some("example.com"), || vec![1, 2]), vec![1, 2]);

    let (socket, _) = registry.wrap_connection(|| "socket".to_string(), |_| Some(3));
    assert_eq!(socket, "socket");

    let child = registry.wrap_spawn("ls", &[], || 99, |_| ChildIdentity {
        process: HandleId(1),
        stdio: vec![],
    });
    assert_eq!(child, 99);
}

#[test]
fn synchronous_descriptor_keys_immediately() {
    let registry = InstrumentationRegistry::new();
    let (_, ticket) = registry.wrap_connection(|| (), |_| Some(21));
    assert!(ticket.is_none());
    assert_eq!(
        registry.read_store(|s| s.socket_records(21).len()),
        Some(1)
    );
}

#[test]
fn asynchronous_descriptor_keys_at_the_connect_event() {
    let registry = InstrumentationRegistry::new();
    let (_, ticket) = registry.wrap_connection(|| (), |_| None);
    let ticket = ticket.expect("pending connection must issue a ticket");

    // The record is retrievable only after the connect event fires
    assert_eq!(registry.read_store(|s| s.socket_records(34).len()), Some(0));
    registry.connection_established(ticket, 34);
    assert_eq!(registry.read_store(|s| s.socket_records(34).len()), Some(1));
}

#[test]
fn panicking_probes_never_reach_the_wrapped_caller() {
    init_tracing();
    let registry = InstrumentationRegistry::new();

    let (value, ticket) =
        registry.wrap_connection(|| 11, |_| -> Option<i32> { panic!("descriptor probe") });
    assert_eq!(value, 11);
    assert!(ticket.is_none());

    let value = registry.wrap_spawn(
        "git",
        &[],
        || 12,
        |_| -> ChildIdentity { panic!("identity probe") },
    );
    assert_eq!(value, 12);
}

#[test]
fn interception_feeds_the_report() {
    let registry = InstrumentationRegistry::new();
    registry.wrap_timeout(500, || ());

    let source = FakeSource {
        handles: vec![HandleSnapshot {
            delay_ms: Some(500),
            callback_name: Some("tick".to_string()),
            ..Default::default()
        }],
        requests: 0,
    };

    let mut sink: Vec<u8> = Vec::new();
    registry.report(&mut sink, &source);
    let out = String::from_utf8(sink).unwrap();

    assert!(out.contains("no of handles 1"));
    assert!(out.contains("timer handle (`timeout(tick, 500)`)"));
    assert!(out.contains("timer listener `tick`"));
}

#[test]
#[serial]
fn install_is_idempotent_and_process_wide() {
    let first = install() as *const InstrumentationRegistry;
    let second = install() as *const InstrumentationRegistry;
    assert_eq!(first, second);

    install().wrap_timeout(77, || ());
    let count = install()
        .read_store(|s| s.timer_records(77).len())
        .unwrap();
    assert!(count >= 1);
}
