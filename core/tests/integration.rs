//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server, either on a random TCP port or on a
//! fresh Unix socket under the system temp directory, then drives the real
//! transports through `LxdClient`. Every test gets fresh server state.

use std::path::PathBuf;
use std::time::Duration;

use lxd_client::{
    Address, ClientConfig, Error, ErrorOrigin, HttpRequest, LxdClient, TransportError, WaitMode,
};
use tokio::net::{TcpListener, UnixListener};
use uuid::Uuid;

async fn start_tcp() -> Address {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run(listener));
    Address::parse(&format!("http://{addr}")).unwrap()
}

/// Socket path is removed when the guard drops.
struct SocketGuard(PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

async fn start_unix() -> (Address, SocketGuard) {
    let path = std::env::temp_dir().join(format!("lxd-mock-{}.sock", Uuid::new_v4()));
    let listener = UnixListener::bind(&path).unwrap();
    tokio::spawn(mock_server::run_unix(listener));
    (Address::Unix(path.clone()), SocketGuard(path))
}

fn client(address: Address, wait_mode: WaitMode) -> LxdClient {
    let config = ClientConfig::builder()
        .address(address)
        .wait_mode(wait_mode)
        .open_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(5))
        .wait_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    LxdClient::new(config).unwrap()
}

fn client_error(err: Error) -> lxd_client::ClientError {
    match err {
        Error::Client(client) => client,
        other => panic!("expected a ClientError, got {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn container_lifecycle_over_unix_socket() {
    let (address, _guard) = start_unix().await;
    let client = client(address, WaitMode::Block);

    // Step 1: list.
    assert_eq!(client.containers().await.unwrap(), vec!["db", "web"]);

    // Step 2: inspect.
    let web = client.container("web").await.unwrap();
    assert_eq!(web["status"], "Running");

    // Step 3: stop blocks until the operation finishes and returns the async envelope.
    let envelope = client.container_stop("web", false, false, 30).await.unwrap();
    assert!(envelope.is_async());
    assert!(envelope.operation_id().is_some());
    let state = client.container_state("web").await.unwrap();
    assert_eq!(state["status"], "Stopped");

    // Step 4: stopping again is accepted by HTTP but fails as an operation.
    let err = client_error(client.container_stop("web", false, false, 30).await.unwrap_err());
    assert_eq!(err.origin(), ErrorOrigin::Operation);
    assert_eq!(err.error_code(), 400);
    assert_eq!(
        err.to_string(),
        "Received response with error_code 400 : 'The container is already stopped'"
    );

    // Step 5: start it back up.
    client.container_start("web").await.unwrap();
    assert_eq!(client.container_state("web").await.unwrap()["status"], "Running");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_container_over_tcp_reports_server_message() {
    let client = client(start_tcp().await, WaitMode::Block);

    let err = client_error(client.container("cont-ub17").await.unwrap_err());
    assert_eq!(err.origin(), ErrorOrigin::Response);
    assert_eq!(err.envelope().status_code(), 404);
    assert_eq!(err.to_string(), "Received response with error_code 404 : 'not found'");
}

#[tokio::test(flavor = "multi_thread")]
async fn freezing_a_stopped_container_surfaces_failed_operation() {
    let client = client(start_tcp().await, WaitMode::Block);

    let change = lxd_client::StateChange::new(lxd_client::StateAction::Freeze);
    client.container_state_change("web", &change).await.unwrap();

    // db is stopped, so freezing it fails inside the operation
    let err = client_error(client.container_state_change("db", &change).await.unwrap_err());
    assert_eq!(err.origin(), ErrorOrigin::Operation);
    assert_eq!(err.error_message(), "The container isn't running");
}

#[tokio::test(flavor = "multi_thread")]
async fn fire_and_forget_leaves_waiting_to_the_caller() {
    let client = client(start_tcp().await, WaitMode::FireAndForget);

    let envelope = client.container_restart("web").await.unwrap();
    assert!(envelope.is_async());
    let id = envelope.operation_id().unwrap();

    let waited = client
        .operation_wait(&id, Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert!(waited.is_sync());
    assert!(!waited.operation_failed());

    let operation = client.operation(&id).await.unwrap();
    assert_eq!(operation.id, id);
    assert!(operation.is_success());

    assert_eq!(client.operations().await.unwrap(), vec![id]);
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_lifecycle_over_tcp() {
    let client = client(start_tcp().await, WaitMode::Block);

    assert!(client.snapshots("web").await.unwrap().is_empty());

    client.snapshot_create("web", "snap0", false).await.unwrap();
    assert_eq!(client.snapshots("web").await.unwrap(), vec!["snap0"]);
    assert_eq!(client.snapshot("web", "snap0").await.unwrap()["name"], "snap0");

    // duplicate name fails inside the operation
    let err = client_error(client.snapshot_create("web", "snap0", false).await.unwrap_err());
    assert_eq!(err.origin(), ErrorOrigin::Operation);

    client.snapshot_delete("web", "snap0").await.unwrap();
    assert!(client.snapshots("web").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn profile_lifecycle_over_unix_socket() {
    let (address, _guard) = start_unix().await;
    let client = client(address, WaitMode::Block);

    client
        .profile_create(&serde_json::json!({ "name": "test", "config": { "limits.cpu": "1" } }))
        .await
        .unwrap();

    let err = client_error(
        client
            .profile_create(&serde_json::json!({ "name": "test" }))
            .await
            .unwrap_err(),
    );
    assert_eq!(
        err.to_string(),
        "Received response with error_code 400 : 'The profile already exists'"
    );

    client
        .profile_update("test", &serde_json::json!({ "description": "patched" }))
        .await
        .unwrap();
    let profile = client.profile("test").await.unwrap();
    assert_eq!(profile["description"], "patched");
    assert_eq!(profile["config"]["limits.cpu"], "1");

    client
        .profile_replace("test", &serde_json::json!({ "config": {} }))
        .await
        .unwrap();
    assert_eq!(client.profile("test").await.unwrap()["description"], "");

    client.profile_rename("test", "renamed").await.unwrap();
    assert_eq!(client.profiles().await.unwrap(), vec!["default", "renamed"]);

    client.profile_delete("renamed").await.unwrap();
    assert_eq!(client.profiles().await.unwrap(), vec!["default"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn raw_request_through_dispatcher() {
    let client = client(start_tcp().await, WaitMode::Block);

    let envelope = client.execute(HttpRequest::get("/1.0")).await.unwrap();
    assert!(envelope.is_sync());
    assert_eq!(envelope.metadata()["api_version"], "1.0");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_socket_is_a_transport_error() {
    let path = std::env::temp_dir().join(format!("lxd-absent-{}.sock", Uuid::new_v4()));
    let client = client(Address::Unix(path), WaitMode::Block);

    let err = client.containers().await.unwrap_err();
    assert!(
        matches!(err, Error::Transport(TransportError::Connect { .. })),
        "{err}"
    );
}
