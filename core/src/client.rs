//! Resource methods for containers, snapshots, operations and profiles.
//!
//! # Design
//! Each endpoint is split in two. A `build_*` method produces the
//! `HttpRequest` as plain data and never fails on I/O; the async method of
//! the same name sends it through the [`Dispatcher`] and shapes the result.
//! Collections come back as resource names, single resources as their raw
//! `metadata`, and mutations as the resolved [`Envelope`].

use serde_json::Value;

use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::envelope::{trailing_segment, Envelope};
use crate::error::{Error, Result};
use crate::http::{api_path, HttpMethod, HttpRequest};
use crate::types::{CreateSnapshot, Operation, Rename, StateAction, StateChange};

/// Client for the LXD REST API.
///
/// Holds only immutable settings; clone it freely across tasks.
#[derive(Clone)]
pub struct LxdClient {
    dispatcher: Dispatcher,
    config: ClientConfig,
}

impl LxdClient {
    /// Build a client. TLS material is loaded here, before any request.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new(&config)?;
        Ok(Self { dispatcher, config })
    }

    /// Build a client from `LXD_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Use an existing dispatcher, e.g. one over a custom transport.
    pub fn with_dispatcher(dispatcher: Dispatcher, config: ClientConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Dispatch an arbitrary request.
    pub async fn execute(&self, request: HttpRequest) -> Result<Envelope> {
        self.dispatcher.execute(request).await
    }

    // ---------------------------------------------------------------------
    // Containers
    // ---------------------------------------------------------------------

    pub fn build_containers(&self) -> HttpRequest {
        HttpRequest::get(api_path(&["containers"]))
    }

    pub fn build_container(&self, name: &str) -> HttpRequest {
        HttpRequest::get(api_path(&["containers", name]))
    }

    pub fn build_container_state(&self, name: &str) -> HttpRequest {
        HttpRequest::get(api_path(&["containers", name, "state"]))
    }

    pub fn build_container_state_change(&self, name: &str, change: &StateChange) -> Result<HttpRequest> {
        HttpRequest::json(
            HttpMethod::Put,
            api_path(&["containers", name, "state"]),
            change,
        )
    }

    /// Names of all containers.
    pub async fn containers(&self) -> Result<Vec<String>> {
        let envelope = self.execute(self.build_containers()).await?;
        parse_names(&envelope)
    }

    pub async fn container(&self, name: &str) -> Result<Value> {
        let envelope = self.execute(self.build_container(name)).await?;
        Ok(envelope.into_metadata())
    }

    pub async fn container_state(&self, name: &str) -> Result<Value> {
        let envelope = self.execute(self.build_container_state(name)).await?;
        Ok(envelope.into_metadata())
    }

    pub async fn container_state_change(&self, name: &str, change: &StateChange) -> Result<Envelope> {
        self.execute(self.build_container_state_change(name, change)?)
            .await
    }

    /// Stop a container. `timeout` is in seconds, enforced by the server.
    pub async fn container_stop(
        &self,
        name: &str,
        stateful: bool,
        force: bool,
        timeout: i64,
    ) -> Result<Envelope> {
        let change = StateChange {
            action: StateAction::Stop,
            timeout,
            force,
            stateful,
        };
        self.container_state_change(name, &change).await
    }

    pub async fn container_start(&self, name: &str) -> Result<Envelope> {
        self.container_state_change(name, &StateChange::new(StateAction::Start))
            .await
    }

    pub async fn container_restart(&self, name: &str) -> Result<Envelope> {
        self.container_state_change(name, &StateChange::new(StateAction::Restart))
            .await
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    pub fn build_snapshots(&self, container: &str) -> HttpRequest {
        HttpRequest::get(api_path(&["containers", container, "snapshots"]))
    }

    pub fn build_snapshot(&self, container: &str, snapshot: &str) -> HttpRequest {
        HttpRequest::get(api_path(&["containers", container, "snapshots", snapshot]))
    }

    pub fn build_snapshot_create(
        &self,
        container: &str,
        name: &str,
        stateful: bool,
    ) -> Result<HttpRequest> {
        HttpRequest::json(
            HttpMethod::Post,
            api_path(&["containers", container, "snapshots"]),
            &CreateSnapshot {
                name: name.to_string(),
                stateful,
            },
        )
    }

    pub fn build_snapshot_delete(&self, container: &str, snapshot: &str) -> HttpRequest {
        HttpRequest::delete(api_path(&["containers", container, "snapshots", snapshot]))
    }

    pub async fn snapshots(&self, container: &str) -> Result<Vec<String>> {
        let envelope = self.execute(self.build_snapshots(container)).await?;
        parse_names(&envelope)
    }

    pub async fn snapshot(&self, container: &str, snapshot: &str) -> Result<Value> {
        let envelope = self.execute(self.build_snapshot(container, snapshot)).await?;
        Ok(envelope.into_metadata())
    }

    pub async fn snapshot_create(&self, container: &str, name: &str, stateful: bool) -> Result<Envelope> {
        self.execute(self.build_snapshot_create(container, name, stateful)?)
            .await
    }

    pub async fn snapshot_delete(&self, container: &str, snapshot: &str) -> Result<Envelope> {
        self.execute(self.build_snapshot_delete(container, snapshot))
            .await
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    pub fn build_operations(&self) -> HttpRequest {
        HttpRequest::get(api_path(&["operations"]))
    }

    pub fn build_operation(&self, id: &str) -> HttpRequest {
        HttpRequest::get(api_path(&["operations", id]))
    }

    /// Ids of all operations, whatever their status.
    pub async fn operations(&self) -> Result<Vec<String>> {
        let envelope = self.execute(self.build_operations()).await?;
        parse_names(&envelope)
    }

    pub async fn operation(&self, id: &str) -> Result<Operation> {
        self.execute(self.build_operation(id)).await?.operation()
    }

    /// Wait on an operation and return the raw operation envelope.
    ///
    /// Unlike the dispatcher's own wait, nothing is judged here: a failed
    /// operation comes back as data.
    pub async fn operation_wait(&self, id: &str, timeout: Option<std::time::Duration>) -> Result<Envelope> {
        self.dispatcher.waiter().wait(id, timeout).await
    }

    // ---------------------------------------------------------------------
    // Profiles
    // ---------------------------------------------------------------------

    pub fn build_profiles(&self) -> HttpRequest {
        HttpRequest::get(api_path(&["profiles"]))
    }

    pub fn build_profile(&self, name: &str) -> HttpRequest {
        HttpRequest::get(api_path(&["profiles", name]))
    }

    pub fn build_profile_create(&self, values: &Value) -> Result<HttpRequest> {
        HttpRequest::json(HttpMethod::Post, api_path(&["profiles"]), values)
    }

    pub fn build_profile_replace(&self, name: &str, values: &Value) -> Result<HttpRequest> {
        HttpRequest::json(HttpMethod::Put, api_path(&["profiles", name]), values)
    }

    pub fn build_profile_update(&self, name: &str, values: &Value) -> Result<HttpRequest> {
        HttpRequest::json(HttpMethod::Patch, api_path(&["profiles", name]), values)
    }

    pub fn build_profile_rename(&self, name: &str, new_name: &str) -> Result<HttpRequest> {
        HttpRequest::json(
            HttpMethod::Post,
            api_path(&["profiles", name]),
            &Rename {
                name: new_name.to_string(),
            },
        )
    }

    pub fn build_profile_delete(&self, name: &str) -> HttpRequest {
        HttpRequest::delete(api_path(&["profiles", name]))
    }

    pub async fn profiles(&self) -> Result<Vec<String>> {
        let envelope = self.execute(self.build_profiles()).await?;
        parse_names(&envelope)
    }

    pub async fn profile(&self, name: &str) -> Result<Value> {
        let envelope = self.execute(self.build_profile(name)).await?;
        Ok(envelope.into_metadata())
    }

    pub async fn profile_create(&self, values: &Value) -> Result<Envelope> {
        self.execute(self.build_profile_create(values)?).await
    }

    pub async fn profile_replace(&self, name: &str, values: &Value) -> Result<Envelope> {
        self.execute(self.build_profile_replace(name, values)?).await
    }

    pub async fn profile_update(&self, name: &str, values: &Value) -> Result<Envelope> {
        self.execute(self.build_profile_update(name, values)?).await
    }

    pub async fn profile_rename(&self, name: &str, new_name: &str) -> Result<Envelope> {
        self.execute(self.build_profile_rename(name, new_name)?).await
    }

    pub async fn profile_delete(&self, name: &str) -> Result<Envelope> {
        self.execute(self.build_profile_delete(name)).await
    }
}

/// Trailing identifiers of a collection listing.
///
/// Accepts an array of resource paths, or an object mapping a status to such
/// an array (newer servers group operations that way).
pub fn parse_names(envelope: &Envelope) -> Result<Vec<String>> {
    match envelope.metadata() {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => names_of(items),
        Value::Object(groups) => {
            let mut names = Vec::new();
            for (group, items) in groups {
                match items {
                    Value::Array(items) => names.extend(names_of(items)?),
                    Value::Null => {}
                    other => {
                        return Err(Error::UnexpectedMetadata(format!(
                            "expected a list under '{group}', got {other}"
                        )))
                    }
                }
            }
            Ok(names)
        }
        other => Err(Error::UnexpectedMetadata(format!(
            "expected a list of resource paths, got {other}"
        ))),
    }
}

fn names_of(items: &[Value]) -> Result<Vec<String>> {
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|path| trailing_segment(path).to_string())
                .ok_or_else(|| {
                    Error::UnexpectedMetadata(format!("expected a resource path, got {item}"))
                })
        })
        .collect()
}
