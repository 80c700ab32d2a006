//! # Microrun
//!
//! Runtime for the microrpc protocol: connects stubs on one process to service
//! providers on another.
//!
//! ## Call Path
//!
//! ```text
//! Stub::invoke -> RpcRequest -> Command -> Connection (in-flight table, writer lock)
//!     -> TcpTransportServer -> HandlerRegistry -> RpcRequestHandler -> ServiceProvider
//!     -> response Command -> Connection reader pump -> waiter -> Stub::invoke
//! ```
//!
//! ## Layout
//!
//! - [`transport`], [`client`], [`server`], [`inflight`]: moving commands over TCP.
//! - [`handler`], [`provider`]: server-side dispatch.
//! - [`stub`] and the [`service!`] macro: client-side proxies.
//! - [`loader`]: explicit registration of pluggable implementations.
//! - [`naming`]: name services mapping service names to endpoints.
//! - [`access`]: the facade tying the pieces together.

#[macro_use]
mod macros;

pub mod access;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod handler;
pub mod inflight;
pub mod loader;
pub mod naming;
pub mod provider;
pub mod server;
pub mod stub;
pub mod transport;

#[cfg(test)]
mod mock_transport;

pub use access::RpcAccessPoint;
pub use client::TcpTransportClient;
pub use config::ClientConfig;
pub use config::InflightConfig;
pub use config::ServerConfig;
pub use endpoint::Endpoint;
pub use handler::HandlerRegistry;
pub use handler::RequestHandler;
pub use loader::Scope;
pub use loader::ServiceLoader;
pub use naming::NameService;
pub use provider::RpcRequestHandler;
pub use provider::ServiceProvider;
pub use provider::ServiceProviderRegistry;
pub use server::TcpTransportServer;
pub use stub::RemoteService;
pub use stub::ServiceInterface;
pub use stub::Stub;
pub use stub::StubFactory;
pub use transport::Transport;
pub use transport::TransportClient;
pub use transport::TransportServer;

#[doc(hidden)]
pub use async_trait::async_trait;
