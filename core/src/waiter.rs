//! Blocking wait on a server-side operation.
//!
//! The server holds `GET /1.0/operations/{id}/wait` open until the operation
//! reaches a terminal state or the `timeout` query parameter elapses, then
//! answers with the operation record. The waiter returns that envelope as-is:
//! the outer HTTP status describes the wait call, the operation's own
//! `metadata.status_code` describes the task, and judging either is the
//! dispatcher's job.

use std::sync::Arc;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::error::Result;
use crate::http::{api_path, HttpRequest};
use crate::transport::Transport;

/// Issues operation wait calls over a transport.
#[derive(Clone)]
pub struct OperationWaiter {
    transport: Arc<dyn Transport>,
}

impl OperationWaiter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Request for waiting on `operation_id`.
    ///
    /// `timeout` is sent in whole seconds, rounded up so that a sub-second
    /// deadline never becomes "no timeout".
    pub fn build_wait(operation_id: &str, timeout: Option<Duration>) -> HttpRequest {
        let request = HttpRequest::get(api_path(&["operations", operation_id, "wait"]));
        match timeout {
            Some(timeout) => request.with_query("timeout", whole_seconds(timeout)),
            None => request,
        }
    }

    /// Wait for `operation_id` and return the operation envelope unjudged.
    ///
    /// No retry: a timed-out wait yields whatever state the server reports.
    pub async fn wait(&self, operation_id: &str, timeout: Option<Duration>) -> Result<Envelope> {
        let request = Self::build_wait(operation_id, timeout);
        tracing::debug!(operation = %operation_id, timeout_secs = ?timeout.map(whole_seconds), "Waiting for operation");

        let response = self.transport.send(request).await?;
        let envelope = Envelope::from_response(&response)?;

        tracing::debug!(
            operation = %operation_id,
            http_status = envelope.status_code(),
            operation_status = ?envelope.operation_status_code(),
            "Operation wait returned"
        );
        Ok(envelope)
    }
}

fn whole_seconds(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    #[test]
    fn wait_request_targets_operation_endpoint() {
        let req = OperationWaiter::build_wait("op-1", Some(Duration::from_secs(30)));
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "/1.0/operations/op-1/wait?timeout=30");
        assert!(req.body.is_none());
    }

    #[test]
    fn wait_request_without_timeout_has_no_query() {
        let req = OperationWaiter::build_wait("op-1", None);
        assert_eq!(req.path, "/1.0/operations/op-1/wait");
    }

    #[test]
    fn sub_second_timeouts_round_up() {
        assert_eq!(whole_seconds(Duration::from_millis(1)), 1);
        assert_eq!(whole_seconds(Duration::from_millis(2500)), 3);
        assert_eq!(whole_seconds(Duration::from_secs(2)), 2);
        assert_eq!(whole_seconds(Duration::MAX), u64::MAX);

        let req = OperationWaiter::build_wait("op-1", Some(Duration::MAX));
        assert_eq!(req.path, "/1.0/operations/op-1/wait?timeout=18446744073709551615");
    }
}
