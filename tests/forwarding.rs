mod common;

use std::time::Duration;

use common::{FakeAiderDesk, LspTestHarness};
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_files_are_forwarded() {
    let mut server = FakeAiderDesk::start().await;
    let mut harness = LspTestHarness::spawn(server.port);

    harness
        .initialize("file:///proj")
        .expect("Failed to initialize");
    harness.did_open("file:///proj/a.ts");
    harness.did_open("file:///other/c.ts");
    harness.initialized();

    assert_eq!(
        server.next_message().await,
        Some(json!({
            "action": "init",
            "baseDir": "/proj",
            "contextFiles": [{"path": "a.ts", "sourceType": "editor"}],
        }))
    );

    harness.did_open("file:///outside/d.ts");
    harness.did_open("file:///proj/src/b.ts");
    assert_eq!(
        server.next_message().await,
        Some(json!({"action": "add-file", "path": "src/b.ts", "sourceType": "editor"}))
    );

    harness.did_close("file:///proj/a.ts");
    assert_eq!(
        server.next_message().await,
        Some(json!({"action": "drop-file", "path": "a.ts", "sourceType": "editor"}))
    );

    harness.shutdown();
    assert!(
        server.closed_cleanly().await,
        "Socket should be closed with a close frame on exit"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_disconnect_stops_forwarding() {
    let mut server = FakeAiderDesk::start().await;
    let mut harness = LspTestHarness::spawn(server.port);

    harness
        .initialize("file:///proj")
        .expect("Failed to initialize");
    harness.initialized();
    assert!(server.next_message().await.is_some(), "Should receive init");

    server.disconnect_clients();
    tokio::time::sleep(Duration::from_millis(300)).await;

    harness.did_open("file:///proj/a.ts");
    assert!(
        server.stays_quiet(Duration::from_millis(500)).await,
        "No events after the server disconnected"
    );

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_untitled_buffers_are_ignored() {
    let mut server = FakeAiderDesk::start().await;
    let mut harness = LspTestHarness::spawn(server.port);

    harness
        .initialize("file:///proj")
        .expect("Failed to initialize");
    harness.initialized();
    assert!(server.next_message().await.is_some(), "Should receive init");

    harness.did_open("untitled:Untitled-1");
    harness.did_open("file:///proj/a.ts");
    assert_eq!(
        server.next_message().await,
        Some(json!({"action": "add-file", "path": "a.ts", "sourceType": "editor"}))
    );

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrapped_server_session_exits_cleanly() {
    let mut server = FakeAiderDesk::start().await;
    let mut harness = LspTestHarness::spawn_wrapping(server.port);

    let response = harness
        .initialize("file:///proj")
        .expect("Failed to initialize through the wrapped server");
    assert!(response.contains("capabilities"), "Wrapped server should answer");

    harness.did_open("file:///proj/a.ts");
    harness.initialized();
    assert_eq!(
        server.next_message().await,
        Some(json!({
            "action": "init",
            "baseDir": "/proj",
            "contextFiles": [{"path": "a.ts", "sourceType": "editor"}],
        }))
    );

    harness.did_close("file:///proj/a.ts");
    assert_eq!(
        server.next_message().await,
        Some(json!({"action": "drop-file", "path": "a.ts", "sourceType": "editor"}))
    );

    let response = harness.shutdown().expect("Failed to get shutdown response");
    assert!(!response.contains("\"error\""), "Shutdown should succeed");

    let status = harness
        .wait_for_exit(Duration::from_secs(10))
        .expect("Process should exit after the wrapped server does");
    assert!(status.success(), "Proxy should exit cleanly, got {status:?}");
    assert!(server.closed_cleanly().await, "Socket should be closed cleanly");
}
