//! One logical API call, from request to resolved envelope.
//!
//! # Design
//! `execute` walks a fixed state machine:
//!
//! 1. send the request over the transport and parse the envelope;
//! 2. error status: fail with [`ClientError`];
//! 3. unrecognized status: fail with [`Error::UnrecognizedStatus`];
//! 4. success + `sync`: return the envelope;
//! 5. success + `async`: in fire-and-forget mode return it at once,
//!    otherwise wait on `metadata.id` and fail if the wait call's status is
//!    not a success code or the operation's own `metadata.status_code` is an
//!    error code. On
//!    success the *original* async envelope is returned;
//! 6. success + any other `type`: fail with [`Error::UnknownResponseType`].
//!
//! There are no retries; every failure is terminal for the call. The
//! dispatcher holds only immutable settings and a shared transport, so it can
//! be cloned and used from concurrent tasks.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClientConfig, WaitMode};
use crate::envelope::{Envelope, ResponseType, StatusClass};
use crate::error::{ClientError, Error, Result};
use crate::http::HttpRequest;
use crate::transport::{self, Transport};
use crate::waiter::OperationWaiter;

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    waiter: OperationWaiter,
    wait_mode: WaitMode,
    wait_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Select a transport for `config` and build a dispatcher over it.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = transport::select(config)?;
        Ok(Self::with_transport(
            transport,
            config.wait_mode,
            config.wait_timeout,
        ))
    }

    /// Use an existing transport.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        wait_mode: WaitMode,
        wait_timeout: Option<Duration>,
    ) -> Self {
        Self {
            waiter: OperationWaiter::new(Arc::clone(&transport)),
            transport,
            wait_mode,
            wait_timeout,
        }
    }

    pub fn wait_mode(&self) -> WaitMode {
        self.wait_mode
    }

    pub fn waiter(&self) -> &OperationWaiter {
        &self.waiter
    }

    /// Send `request` and resolve the response.
    pub async fn execute(&self, request: HttpRequest) -> Result<Envelope> {
        let method = request.method;
        let path = request.path.clone();
        tracing::debug!(%method, %path, "Sending request");
        tracing::trace!(body = ?request.body, "Request body");

        let response = self.transport.send(request).await.map_err(|e| {
            tracing::warn!(%method, %path, error = %e, "Transport failure");
            e
        })?;
        tracing::trace!(status = response.status, body = %response.body, "Response body");

        let envelope = Envelope::from_response(&response)?;
        tracing::debug!(
            %method,
            %path,
            status = envelope.status_code(),
            response_type = envelope.response_type().as_str(),
            "Received response"
        );

        self.resolve(envelope).await
    }

    async fn resolve(&self, envelope: Envelope) -> Result<Envelope> {
        match envelope.class() {
            StatusClass::Error => Err(ClientError::from_response(envelope).into()),
            StatusClass::Unrecognized => Err(Error::UnrecognizedStatus(Box::new(envelope))),
            StatusClass::Success => match envelope.response_type() {
                ResponseType::Sync => Ok(envelope),
                ResponseType::Async => self.resolve_async(envelope).await,
                other => Err(Error::UnknownResponseType {
                    response_type: other.as_str().to_string(),
                    envelope: Box::new(envelope),
                }),
            },
        }
    }

    async fn resolve_async(&self, envelope: Envelope) -> Result<Envelope> {
        if self.wait_mode == WaitMode::FireAndForget {
            tracing::debug!(operation = ?envelope.operation_id(), "Returning async response without waiting");
            return Ok(envelope);
        }

        let Some(operation_id) = envelope.operation_id() else {
            return Err(Error::MissingOperationId(Box::new(envelope)));
        };

        let operation = self.waiter.wait(&operation_id, self.wait_timeout).await?;

        match operation.class() {
            StatusClass::Success => {}
            StatusClass::Error => {
                tracing::warn!(operation = %operation_id, status = operation.status_code(), "Operation wait call failed");
                return Err(ClientError::from_response(operation).into());
            }
            StatusClass::Unrecognized => {
                tracing::warn!(operation = %operation_id, status = operation.status_code(), "Operation wait returned unrecognized status");
                return Err(Error::UnrecognizedStatus(Box::new(operation)));
            }
        }
        if operation.operation_failed() {
            tracing::warn!(
                operation = %operation_id,
                status_code = ?operation.operation_status_code(),
                "Operation failed"
            );
            return Err(ClientError::from_operation(operation).into());
        }

        tracing::info!(
            operation = %operation_id,
            status_code = ?operation.operation_status_code(),
            "Operation finished"
        );
        Ok(envelope)
    }
}
