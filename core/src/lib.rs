//! Client core for the LXD container REST API.
//!
//! # Overview
//! Every call goes through the same pipeline: a resource method builds an
//! `HttpRequest`, the [`Transport`] carries it over a Unix socket or
//! HTTP(S), and the [`Dispatcher`] classifies the response envelope. Success
//! returns the envelope, failure becomes a [`ClientError`] carrying the
//! server's message, and asynchronous responses are optionally waited on
//! until the server-side operation finishes.
//!
//! # Design
//! - Requests and responses are plain data; building a request never does
//!   I/O, so every endpoint can be checked without a server.
//! - `LxdClient`, `Dispatcher` and the transports hold only immutable
//!   configuration and can be shared across tasks.
//! - Each request opens its own connection; there is no pooling or retry.
//! - An [`Envelope`] keeps the response body exactly as received, so new
//!   server fields reach the caller.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;
pub mod waiter;

pub use client::{parse_names, LxdClient};
pub use config::{Address, ClientConfig, ClientConfigBuilder, WaitMode};
pub use dispatcher::Dispatcher;
pub use envelope::{Envelope, ResponseType, StatusClass};
pub use error::{ClientError, ConfigError, Error, ErrorOrigin, Result, TransportError};
pub use http::{api_path, HttpMethod, HttpRequest, HttpResponse};
pub use transport::{HttpTransport, Transport, UnixTransport};
pub use types::{CreateSnapshot, Operation, Rename, StateAction, StateChange};
pub use waiter::OperationWaiter;
