//! # Transport Abstraction
//!
//! Moving commands between processes.
//!
//! ## Philosophy
//!
//! - **Command-Oriented**: A transport moves whole `Command`s. It knows headers and request
//!   ids, nothing about services or methods.
//! - **Request-Response**: The fundamental interaction is "send a request, await its response".
//!   Correlation, back-pressure and timeouts live below this trait, not above it.

use std::net::SocketAddr;
use std::sync::Arc;

use microrpc::Command;

use crate::config::ServerConfig;
use crate::endpoint::Endpoint;
use crate::handler::HandlerRegistry;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An endpoint string lacks a scheme, host or port.
    InvalidEndpoint(String),
    /// The server could not bind its listening address.
    BindFailed(String),
    /// Connection setup exceeded the connect timeout.
    ConnectTimeout(String),
    /// The peer refused or reset the connection attempt.
    ConnectRefused(String),
    /// Writing a frame failed; the connection is closed.
    WriteFailed(String),
    /// Reading a frame failed; the connection is closed.
    ReadFailed(String),
    /// The peer closed the connection, or it was closed under an outstanding request.
    ConnectionLost(String),
    /// A frame could not be decoded; the connection is closed.
    MalformedFrame(String),
    /// No in-flight slot became free within the submit timeout.
    SubmitTimeout,
    /// The request was reaped after outliving the request timeout.
    InflightTimeout,
    /// The client or its table was closed.
    ClientClosed,
    /// A request id is already outstanding on this connection.
    DuplicateRequestId(i32),
    /// A server received a command type it has no handler for.
    UnknownHandlerType(i32),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEndpoint(msg) => write!(f, "Invalid endpoint: {}", msg),
            Self::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            Self::ConnectTimeout(ep) => write!(f, "Connect to {} timed out", ep),
            Self::ConnectRefused(msg) => write!(f, "Connect refused: {}", msg),
            Self::WriteFailed(msg) => write!(f, "Write failed: {}", msg),
            Self::ReadFailed(msg) => write!(f, "Read failed: {}", msg),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::MalformedFrame(msg) => write!(f, "Malformed frame: {}", msg),
            Self::SubmitTimeout => write!(f, "Timed out waiting for an in-flight slot"),
            Self::InflightTimeout => write!(f, "Request timed out awaiting its response"),
            Self::ClientClosed => write!(f, "Client closed"),
            Self::DuplicateRequestId(id) => write!(f, "Request id {} is already in flight", id),
            Self::UnknownHandlerType(kind) => write!(f, "No handler for command type {}", kind),
        }
    }
}

impl std::error::Error for Error {}

impl From<microrpc::Error> for Error {
    fn from(e: microrpc::Error) -> Self {
        match e {
            microrpc::Error::Io(msg) => Self::ReadFailed(msg),
            other => Self::MalformedFrame(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to send a request command and receive its response.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and waits for the response carrying the same request id.
    ///
    /// # invariants
    /// - Must return the response whose `request_id` equals the request's.
    /// - Must return `Err` rather than block forever if the peer goes away.
    async fn send(&self, request: Command) -> Result<Command>;
}

/// Creates transports bound to remote endpoints.
#[async_trait::async_trait]
pub trait TransportClient: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>>;

    /// Closes every connection; their outstanding requests fail with `ClientClosed`.
    async fn close(&self);
}

/// Accepts connections and routes requests to handlers.
#[async_trait::async_trait]
pub trait TransportServer: Send + Sync + 'static {
    /// Starts serving. Calling again while running returns the bound address.
    async fn start(&self, handlers: Arc<HandlerRegistry>, config: &ServerConfig) -> Result<SocketAddr>;

    /// Stops accepting and closes all accepted connections.
    async fn stop(&self);

    fn local_addr(&self) -> Option<SocketAddr>;
}
