//! Attribution scenarios: grouping, dedup, and fallback behavior
//!
//! These drive the resolver and renderer through the provenance store with
//! synthetic stacks, so the expected call-site frames are deterministic.

use velador::handle::{HandleId, HandleSnapshot, HttpAssociation, LiveHandleSource};
use velador::provenance::ProvenanceStore;
use velador::report::print_handles;
use velador::stack::CapturedStack;

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

fn render(source: &FakeSource, store: &ProvenanceStore) -> String {
    let mut sink: Vec<u8> = Vec::new();
    print_handles(&mut sink, source, store);
    String::from_utf8(sink).unwrap()
}

/// Stack whose second attribution-relevant frame is the given call site.
fn stack_from(site: &str) -> CapturedStack {
    CapturedStack::from_frames([
        "at velador::registry::wrap (/src/registry.rs:80)".to_string(),
        "at app::schedule_wrapper (/src/util.rs:5)".to_string(),
        format!("at {}", site),
        "at app::main (/src/main.rs:3)".to_string(),
    ])
}

fn timer_handle(delay_ms: u64) -> HandleSnapshot {
    HandleSnapshot {
        delay_ms: Some(delay_ms),
        ..Default::default()
    }
}

#[test]
fn two_timers_same_delay_group_under_one_key_with_both_sites() {
    let mut store = ProvenanceStore::new();
    store.record_timer(500, stack_from("site_a (/src/a.rs:10)"));
    store.record_timer(500, stack_from("site_b (/src/b.rs:20)"));

    let source = FakeSource {
        handles: vec![timer_handle(500), timer_handle(500)],
        requests: 0,
    };
    let out = render(&source, &store);

    let expected_block = "timer handle leaked at one of:\n\
                          at site_a (/src/a.rs:10)\n\
                          at site_b (/src/b.rs:20)";
    // Both live timers resolve to the same group, each site listed once
    assert_eq!(out.matches(expected_block).count(), 2);
}

#[test]
fn repeated_requests_from_one_site_attribute_the_site_once() {
    let mut store = ProvenanceStore::new();
    store.record_request("api.example.com", stack_from("issue_req (/src/http.rs:44)"));
    store.record_request("api.example.com", stack_from("issue_req (/src/http.rs:44)"));

    let source = FakeSource {
        handles: vec![HandleSnapshot {
            id: HandleId(1),
            readable: Some(true),
            writable: Some(true),
            http: Some(HttpAssociation {
                host: Some("api.example.com".to_string()),
                method: Some("GET".to_string()),
                path: Some("/v1".to_string()),
            }),
            ..Default::default()
        }],
        requests: 0,
    };
    let out = render(&source, &store);

    assert!(out.contains("http handle leaked at one of:"));
    assert_eq!(out.matches("at issue_req (/src/http.rs:44)").count(), 1);
}

#[test]
fn http_stream_without_host_record_falls_back_to_socket_mapping() {
    let mut store = ProvenanceStore::new();
    store.record_socket(12, stack_from("dial (/src/net.rs:8)"));

    let source = FakeSource {
        handles: vec![HandleSnapshot {
            id: HandleId(1),
            readable: Some(true),
            writable: Some(true),
            fd: Some(12),
            http: Some(HttpAssociation {
                host: Some("unrecorded.example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }],
        requests: 0,
    };
    let out = render(&source, &store);

    assert!(out.contains("tcp handle leaked at one of:\nat dial (/src/net.rs:8)"));
    assert!(out.contains("http stream "));
}

#[test]
fn attribution_miss_degrades_to_structural_facts() {
    // Handle predates interception: no record for its descriptor
    let source = FakeSource {
        handles: vec![HandleSnapshot {
            id: HandleId(1),
            readable: Some(true),
            writable: Some(true),
            fd: Some(99),
            allow_half_open: Some(false),
            local_address: Some("127.0.0.1:4040".to_string()),
            ..Default::default()
        }],
        requests: 0,
    };
    let out = render(&source, &ProvenanceStore::new());

    assert!(!out.contains("leaked at one of"));
    assert!(out.contains(r#"tcp stream {"fd":99,"readable":true,"writable":true,"address":"127.0.0.1:4040"}"#));
}

#[test]
fn child_process_and_stdio_streams_attribute_to_the_spawn_site() {
    let mut store = ProvenanceStore::new();
    let child = HandleId(7);
    store.record_child(
        child,
        "git",
        &["fetch".to_string()],
        stack_from("spawn_git (/src/vcs.rs:31)"),
    );
    store.register_child_stream(HandleId(8), child);

    let source = FakeSource {
        handles: vec![
            HandleSnapshot {
                id: HandleId(8),
                readable: Some(true),
                writable: Some(true),
                ..Default::default()
            },
            HandleSnapshot {
                id: child,
                pid: Some(4242),
                ..Default::default()
            },
        ],
        requests: 0,
    };
    let out = render(&source, &store);

    // Both the stdio stream and the process itself resolve to the spawn site
    assert_eq!(
        out.matches("child process handle leaked at one of:\nat spawn_git (/src/vcs.rs:31)")
            .count(),
        2
    );
    assert!(out.contains("child process stdio stream handle "));
    assert!(out.contains(r#"child process handle {"pid":4242,"command":"git"}"#));
}

#[test]
fn resolving_twice_yields_identical_output() {
    let mut store = ProvenanceStore::new();
    store.record_timer(250, stack_from("site_a (/src/a.rs:10)"));
    store.record_timer(250, stack_from("site_b (/src/b.rs:20)"));

    let source = FakeSource {
        handles: vec![timer_handle(250)],
        requests: 0,
    };

    assert_eq!(render(&source, &store), render(&source, &store));
}
