//! In-memory stand-in for the LXD daemon's REST API.
//!
//! Answers with the daemon's response envelopes: `sync` for reads, `async`
//! plus an operation for state changes and snapshot work, `error` for
//! failures. Operations finish the moment they are created, so a wait on
//! one returns immediately with its terminal state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{
    net::{TcpListener, UnixListener},
    sync::RwLock,
};
use uuid::Uuid;

pub const OPERATION_RUNNING: i64 = 103;
pub const OPERATION_SUCCESS: i64 = 200;
pub const OPERATION_FAILURE: i64 = 400;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerState {
    Running,
    Stopped,
    Frozen,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Frozen => "Frozen",
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Running => 103,
            Self::Stopped => 102,
            Self::Frozen => 110,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub stateful: bool,
}

#[derive(Clone, Debug)]
pub struct Container {
    pub state: PowerState,
    pub snapshots: BTreeMap<String, Snapshot>,
}

impl Container {
    pub fn new(state: PowerState) -> Self {
        Self {
            state,
            snapshots: BTreeMap::new(),
        }
    }

    /// Apply a state action, or explain why it cannot be applied.
    pub fn apply(&mut self, action: &str) -> Result<(), String> {
        let next = match (action, self.state) {
            ("start", PowerState::Running) => return Err("The container is already running".into()),
            ("start", _) => PowerState::Running,
            ("stop", PowerState::Stopped) => return Err("The container is already stopped".into()),
            ("stop", _) => PowerState::Stopped,
            ("restart", PowerState::Stopped) => return Err("The container isn't running".into()),
            ("restart", _) => PowerState::Running,
            ("freeze", PowerState::Running) => PowerState::Frozen,
            ("freeze", _) => return Err("The container isn't running".into()),
            ("unfreeze", PowerState::Frozen) => PowerState::Running,
            ("unfreeze", _) => return Err("The container is not frozen".into()),
            (other, _) => return Err(format!("Unknown state action '{other}'")),
        };
        self.state = next;
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OperationRecord {
    pub id: Uuid,
    pub class: String,
    pub description: String,
    pub status: String,
    pub status_code: i64,
    pub resources: Value,
    pub metadata: Value,
    pub may_cancel: bool,
    pub err: String,
}

impl OperationRecord {
    /// A task that has already run to completion with `outcome`.
    pub fn finished(description: impl Into<String>, resources: Value, outcome: Result<(), String>) -> Self {
        let (status, status_code, err) = match outcome {
            Ok(()) => ("Success", OPERATION_SUCCESS, String::new()),
            Err(err) => ("Failure", OPERATION_FAILURE, err),
        };
        Self {
            id: Uuid::new_v4(),
            class: "task".to_string(),
            description: description.into(),
            status: status.to_string(),
            status_code,
            resources,
            metadata: Value::Null,
            may_cancel: false,
            err,
        }
    }

    /// How the operation looked when it was handed out.
    fn as_created(&self) -> Self {
        Self {
            status: "Running".to_string(),
            status_code: OPERATION_RUNNING,
            err: String::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub containers: BTreeMap<String, Container>,
    pub profiles: BTreeMap<String, Value>,
    pub operations: HashMap<Uuid, OperationRecord>,
}

impl MockState {
    /// `web` running, `db` stopped, and the `default` profile.
    pub fn seeded() -> Self {
        Self::default()
            .with_container("web", PowerState::Running)
            .with_container("db", PowerState::Stopped)
            .with_profile(
                "default",
                &json!({ "description": "Default LXD profile" }),
            )
    }

    pub fn with_container(mut self, name: &str, state: PowerState) -> Self {
        self.containers.insert(name.to_string(), Container::new(state));
        self
    }

    pub fn with_profile(mut self, name: &str, values: &Value) -> Self {
        self.profiles.insert(name.to_string(), profile_record(name, values));
        self
    }

    fn record(&mut self, operation: OperationRecord) -> OperationRecord {
        self.operations.insert(operation.id, operation.clone());
        operation
    }
}

#[derive(Deserialize)]
pub struct StateRequest {
    pub action: String,
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub stateful: bool,
}

#[derive(Deserialize)]
pub struct SnapshotRequest {
    pub name: String,
    #[serde(default)]
    pub stateful: bool,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct WaitQuery {
    pub timeout: Option<i64>,
}

pub type Db = Arc<RwLock<MockState>>;

type ApiResponse = (StatusCode, Json<Value>);

pub fn app() -> Router {
    app_with(MockState::seeded())
}

pub fn app_with(state: MockState) -> Router {
    let db: Db = Arc::new(RwLock::new(state));
    Router::new()
        .route("/1.0", get(server_info))
        .route("/1.0/containers", get(list_containers))
        .route("/1.0/containers/{name}", get(get_container))
        .route(
            "/1.0/containers/{name}/state",
            get(get_container_state).put(change_container_state),
        )
        .route(
            "/1.0/containers/{name}/snapshots",
            get(list_snapshots).post(create_snapshot),
        )
        .route(
            "/1.0/containers/{name}/snapshots/{snapshot}",
            get(get_snapshot).delete(delete_snapshot),
        )
        .route("/1.0/operations", get(list_operations))
        .route("/1.0/operations/{id}", get(get_operation))
        .route("/1.0/operations/{id}/wait", get(wait_operation))
        .route("/1.0/profiles", get(list_profiles).post(create_profile))
        .route(
            "/1.0/profiles/{name}",
            get(get_profile)
                .put(replace_profile)
                .patch(update_profile)
                .post(rename_profile)
                .delete(delete_profile),
        )
        .fallback(fallback)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_unix(listener: UnixListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// --- envelopes ---

fn sync_response(metadata: Value) -> ApiResponse {
    sync_with(StatusCode::OK, metadata)
}

fn sync_with(status: StatusCode, metadata: Value) -> ApiResponse {
    (
        status,
        Json(json!({
            "type": "sync",
            "status": "Success",
            "status_code": 200,
            "metadata": metadata,
        })),
    )
}

fn async_response(operation: &OperationRecord) -> ApiResponse {
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "type": "async",
            "status": "Operation created",
            "status_code": 100,
            "operation": format!("/1.0/operations/{}", operation.id),
            "metadata": operation.as_created(),
        })),
    )
}

fn error_response(status: StatusCode, message: &str) -> ApiResponse {
    (
        status,
        Json(json!({
            "type": "error",
            "error": message,
            "error_code": status.as_u16(),
        })),
    )
}

fn not_found() -> ApiResponse {
    error_response(StatusCode::NOT_FOUND, "not found")
}

fn paths<'a>(prefix: &str, names: impl Iterator<Item = &'a String>) -> Value {
    Value::Array(
        names
            .map(|name| Value::String(format!("{prefix}/{name}")))
            .collect(),
    )
}

async fn fallback() -> ApiResponse {
    not_found()
}

async fn server_info() -> ApiResponse {
    sync_response(json!({
        "api_version": "1.0",
        "auth": "trusted",
        "api_extensions": [],
    }))
}

// --- containers ---

fn container_resources(name: &str) -> Value {
    json!({ "containers": [format!("/1.0/containers/{name}")] })
}

async fn list_containers(State(db): State<Db>) -> ApiResponse {
    let state = db.read().await;
    sync_response(paths("/1.0/containers", state.containers.keys()))
}

async fn get_container(State(db): State<Db>, Path(name): Path<String>) -> ApiResponse {
    let state = db.read().await;
    let Some(container) = state.containers.get(&name) else {
        return not_found();
    };
    sync_response(json!({
        "name": name,
        "status": container.state.as_str(),
        "status_code": container.state.code(),
        "ephemeral": false,
        "profiles": ["default"],
        "config": {},
    }))
}

async fn get_container_state(State(db): State<Db>, Path(name): Path<String>) -> ApiResponse {
    let state = db.read().await;
    let Some(container) = state.containers.get(&name) else {
        return not_found();
    };
    sync_response(json!({
        "status": container.state.as_str(),
        "status_code": container.state.code(),
    }))
}

async fn change_container_state(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(input): Json<StateRequest>,
) -> ApiResponse {
    let mut state = db.write().await;
    let Some(container) = state.containers.get_mut(&name) else {
        return not_found();
    };
    let outcome = container.apply(&input.action);
    let operation = OperationRecord::finished(
        format!("Changing container state: {}", input.action),
        container_resources(&name),
        outcome,
    );
    tracing::info!(
        container = %name,
        action = %input.action,
        force = input.force,
        stateful = input.stateful,
        timeout = input.timeout,
        status = %operation.status,
        "State change"
    );
    async_response(&state.record(operation))
}

// --- snapshots ---

async fn list_snapshots(State(db): State<Db>, Path(name): Path<String>) -> ApiResponse {
    let state = db.read().await;
    let Some(container) = state.containers.get(&name) else {
        return not_found();
    };
    sync_response(paths(
        &format!("/1.0/containers/{name}/snapshots"),
        container.snapshots.keys(),
    ))
}

async fn get_snapshot(
    State(db): State<Db>,
    Path((name, snapshot)): Path<(String, String)>,
) -> ApiResponse {
    let state = db.read().await;
    match state
        .containers
        .get(&name)
        .and_then(|container| container.snapshots.get(&snapshot))
    {
        Some(snapshot) => sync_response(json!(snapshot)),
        None => not_found(),
    }
}

async fn create_snapshot(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(input): Json<SnapshotRequest>,
) -> ApiResponse {
    let mut state = db.write().await;
    let Some(container) = state.containers.get_mut(&name) else {
        return not_found();
    };
    let outcome = if container.snapshots.contains_key(&input.name) {
        Err(format!("Snapshot '{}' already exists", input.name))
    } else {
        container.snapshots.insert(
            input.name.clone(),
            Snapshot {
                name: input.name.clone(),
                stateful: input.stateful,
            },
        );
        Ok(())
    };
    let operation = OperationRecord::finished("Snapshotting container", container_resources(&name), outcome);
    tracing::info!(container = %name, snapshot = %input.name, status = %operation.status, "Snapshot create");
    async_response(&state.record(operation))
}

async fn delete_snapshot(
    State(db): State<Db>,
    Path((name, snapshot)): Path<(String, String)>,
) -> ApiResponse {
    let mut state = db.write().await;
    let removed = state
        .containers
        .get_mut(&name)
        .and_then(|container| container.snapshots.remove(&snapshot));
    if removed.is_none() {
        return not_found();
    }
    let operation = OperationRecord::finished("Deleting snapshot", container_resources(&name), Ok(()));
    tracing::info!(container = %name, %snapshot, "Snapshot delete");
    async_response(&state.record(operation))
}

// --- operations ---

fn find_operation<'a>(state: &'a MockState, id: &str) -> Option<&'a OperationRecord> {
    id.parse::<Uuid>()
        .ok()
        .and_then(|id| state.operations.get(&id))
}

async fn list_operations(State(db): State<Db>) -> ApiResponse {
    let state = db.read().await;
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for operation in state.operations.values() {
        groups
            .entry(operation.status.to_lowercase())
            .or_default()
            .push(Value::String(format!("/1.0/operations/{}", operation.id)));
    }
    sync_response(json!(groups))
}

async fn get_operation(State(db): State<Db>, Path(id): Path<String>) -> ApiResponse {
    let state = db.read().await;
    match find_operation(&state, &id) {
        Some(operation) => sync_response(json!(operation)),
        None => not_found(),
    }
}

async fn wait_operation(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> ApiResponse {
    // operations are already terminal, so the timeout never comes into play
    tracing::debug!(operation = %id, timeout = ?query.timeout, "Wait");
    let state = db.read().await;
    match find_operation(&state, &id) {
        Some(operation) => sync_response(json!(operation)),
        None => not_found(),
    }
}

// --- profiles ---

/// Stored form of a profile: defaults overlaid with `values`, `name` forced.
fn profile_record(name: &str, values: &Value) -> Value {
    let mut record = Map::new();
    record.insert("name".into(), json!(name));
    record.insert("description".into(), json!(""));
    record.insert("config".into(), json!({}));
    record.insert("devices".into(), json!({}));
    merge(&mut record, values);
    record.insert("name".into(), json!(name));
    Value::Object(record)
}

/// Shallow merge of the top-level keys of `patch`.
fn merge(target: &mut Map<String, Value>, patch: &Value) {
    if let Value::Object(fields) = patch {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
}

async fn list_profiles(State(db): State<Db>) -> ApiResponse {
    let state = db.read().await;
    sync_response(paths("/1.0/profiles", state.profiles.keys()))
}

async fn get_profile(State(db): State<Db>, Path(name): Path<String>) -> ApiResponse {
    let state = db.read().await;
    match state.profiles.get(&name) {
        Some(profile) => sync_response(profile.clone()),
        None => not_found(),
    }
}

async fn create_profile(State(db): State<Db>, Json(input): Json<Value>) -> ApiResponse {
    let Some(name) = input.get("name").and_then(Value::as_str).map(str::to_string) else {
        return error_response(StatusCode::BAD_REQUEST, "No name provided");
    };
    let mut state = db.write().await;
    if state.profiles.contains_key(&name) {
        return error_response(StatusCode::BAD_REQUEST, "The profile already exists");
    }
    state.profiles.insert(name.clone(), profile_record(&name, &input));
    tracing::info!(profile = %name, "Profile created");
    sync_with(StatusCode::CREATED, Value::Null)
}

async fn replace_profile(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(input): Json<Value>,
) -> ApiResponse {
    let mut state = db.write().await;
    let Some(profile) = state.profiles.get_mut(&name) else {
        return not_found();
    };
    *profile = profile_record(&name, &input);
    sync_response(Value::Null)
}

async fn update_profile(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(input): Json<Value>,
) -> ApiResponse {
    let mut state = db.write().await;
    let Some(Value::Object(profile)) = state.profiles.get_mut(&name) else {
        return not_found();
    };
    merge(profile, &input);
    profile.insert("name".into(), json!(name));
    sync_response(Value::Null)
}

async fn rename_profile(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(input): Json<RenameRequest>,
) -> ApiResponse {
    let mut state = db.write().await;
    if state.profiles.contains_key(&input.name) {
        return error_response(
            StatusCode::CONFLICT,
            &format!("Name '{}' already in use", input.name),
        );
    }
    let Some(mut profile) = state.profiles.remove(&name) else {
        return not_found();
    };
    profile["name"] = json!(input.name);
    state.profiles.insert(input.name.clone(), profile);
    tracing::info!(from = %name, to = %input.name, "Profile renamed");
    sync_response(Value::Null)
}

async fn delete_profile(State(db): State<Db>, Path(name): Path<String>) -> ApiResponse {
    if name == "default" {
        return error_response(StatusCode::FORBIDDEN, "The 'default' profile cannot be deleted");
    }
    let mut state = db.write().await;
    match state.profiles.remove(&name) {
        Some(_) => sync_response(Value::Null),
        None => not_found(),
    }
}
