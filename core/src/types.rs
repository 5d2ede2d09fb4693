//! Request payloads and the operation record.
//!
//! # Design
//! Container, profile and snapshot bodies stay as `serde_json::Value`; only
//! the payloads the client itself shapes and the operation record it reads
//! are typed here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operation status code: created.
pub const OPERATION_CREATED: i64 = 100;
/// Operation status code: running.
pub const OPERATION_RUNNING: i64 = 103;
/// Operation status code: success.
pub const OPERATION_SUCCESS: i64 = 200;
/// Operation status code: failure.
pub const OPERATION_FAILURE: i64 = 400;
/// Operation status code: cancelled.
pub const OPERATION_CANCELLED: i64 = 401;

/// A server-side asynchronous task as reported under `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Operation {
    pub id: String,
    /// `task`, `websocket` or `token`.
    pub class: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: String,
    pub status_code: i64,
    pub resources: Value,
    /// Task-specific payload, e.g. a `secret` token.
    pub metadata: Value,
    pub may_cancel: bool,
    pub err: String,
}

impl Operation {
    pub fn is_running(&self) -> bool {
        matches!(self.status_code, OPERATION_CREATED | OPERATION_RUNNING)
    }

    pub fn is_success(&self) -> bool {
        self.status_code == OPERATION_SUCCESS
    }
}

/// Container state actions accepted by `PUT /containers/{name}/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateAction {
    Start,
    Stop,
    Restart,
    Freeze,
    Unfreeze,
}

/// Body of a container state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub action: StateAction,
    /// Seconds the server waits for the change before giving up.
    pub timeout: i64,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub stateful: bool,
}

impl StateChange {
    pub fn new(action: StateAction) -> Self {
        Self {
            action,
            timeout: 30,
            force: false,
            stateful: false,
        }
    }
}

/// Body of `POST /containers/{name}/snapshots`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSnapshot {
    pub name: String,
    #[serde(default)]
    pub stateful: bool,
}

/// Body of a rename (`POST` on the resource itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rename {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_decodes_with_missing_fields() {
        let op: Operation = serde_json::from_value(serde_json::json!({
            "id": "b8d84888-1dc2-44fd-b386-7f679e171ba5",
            "class": "token",
            "status": "Running",
            "status_code": 103,
            "metadata": { "secret": "c9209bee" },
            "may_cancel": true
        }))
        .unwrap();
        assert_eq!(op.id, "b8d84888-1dc2-44fd-b386-7f679e171ba5");
        assert_eq!(op.metadata["secret"], "c9209bee");
        assert!(op.is_running());
        assert!(!op.is_success());
        assert!(op.err.is_empty());
    }

    #[test]
    fn state_change_serializes_lowercase_action() {
        let body = serde_json::to_value(StateChange {
            force: true,
            ..StateChange::new(StateAction::Stop)
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "action": "stop", "timeout": 30, "force": true, "stateful": false })
        );
    }
}
