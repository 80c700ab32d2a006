//! # Service Providers
//!
//! The server side of a call: a registry of local service implementations, and the
//! request handler that unpacks an `RpcRequest` and invokes one of them.
//!
//! ## Invariants
//! - **Always Answers**: Every request gets a response. Missing providers answer
//!   `NO_PROVIDER`; parse failures, provider errors and provider panics answer
//!   `UNKNOWN_ERROR` with the error text and an empty payload.
//! - **Latest Wins**: Registering a provider under an existing name replaces it; readers
//!   see whichever registration committed last.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::RwLock;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use micropack::RpcRequest;
use microrpc::Code;
use microrpc::Command;
use microrpc::Header;
use microrpc::ResponseHeader;
use microrpc::TYPE_RPC_REQUEST;

use crate::handler::RequestHandler;

/// Error text of a `NO_PROVIDER` response.
pub const NO_PROVIDER_MESSAGE: &str = "No provider!";

/// Any error a provider method may fail with.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Failures raised by the dispatch machinery rather than by provider code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    UnknownMethod(String),
    Panicked(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMethod(m) => write!(f, "Unknown method: {}", m),
            Self::Panicked(msg) => write!(f, "Provider panicked: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// A local implementation of a service, dispatched by wire method name.
///
/// Every method takes one string and returns one string.
#[async_trait::async_trait]
pub trait ServiceProvider: Send + Sync + 'static {
    async fn invoke(&self, method: &str, argument: String) -> Result<String, ProviderError>;
}

type Method = Box<dyn Fn(String) -> BoxFuture<'static, Result<String, ProviderError>> + Send + Sync>;

/// A provider assembled from closures, one per method.
#[derive(Default)]
pub struct MethodMap {
    methods: HashMap<String, Method>,
}

impl MethodMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ProviderError>> + Send + 'static,
    {
        self.methods.insert(name.into(), Box::new(move |arg| f(arg).boxed()));
        self
    }
}

#[async_trait::async_trait]
impl ServiceProvider for MethodMap {
    async fn invoke(&self, method: &str, argument: String) -> Result<String, ProviderError> {
        match self.methods.get(method) {
            Some(f) => f(argument).await,
            None => Err(Box::new(Error::UnknownMethod(method.to_string()))),
        }
    }
}

/// Accepts provider registrations.
pub trait ServiceProviderRegistry: Send + Sync + 'static {
    fn add_service_provider(&self, interface: &str, provider: Arc<dyn ServiceProvider>);
}

/// Handles type-1 commands by invoking registered providers.
#[derive(Default)]
pub struct RpcRequestHandler {
    providers: RwLock<HashMap<String, Arc<dyn ServiceProvider>>>,
}

impl RpcRequestHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self, interface: &str) -> Option<Arc<dyn ServiceProvider>> {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.get(interface).cloned()
    }

    async fn dispatch(&self, header: &Header, payload: &[u8]) -> Command {
        let request: RpcRequest = match micropack::parse(payload) {
            Ok(request) => request,
            Err(e) => return Command::failure(header, Code::UnknownError, e.to_string()),
        };

        let Some(provider) = self.provider(&request.interface_name) else {
            tracing::warn!(
                request_id = header.request_id,
                interface = %request.interface_name,
                "no provider registered"
            );
            return Command::failure(header, Code::NoProvider, NO_PROVIDER_MESSAGE);
        };

        let argument: String = match micropack::parse(&request.serialized_arguments) {
            Ok(argument) => argument,
            Err(e) => return Command::failure(header, Code::UnknownError, e.to_string()),
        };

        let call = AssertUnwindSafe(provider.invoke(&request.method_name, argument));
        let result = match call.catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::debug!(
                    request_id = header.request_id,
                    method = %request.method_name,
                    error = %e,
                    "provider returned an error"
                );
                return Command::failure(header, Code::UnknownError, e.to_string());
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(request_id = header.request_id, method = %request.method_name, %message, "provider panicked");
                return Command::failure(header, Code::UnknownError, Error::Panicked(message).to_string());
            }
        };

        match micropack::serialize(&result) {
            Ok(bytes) => Command::response(ResponseHeader::success(header), Bytes::from(bytes)),
            Err(e) => Command::failure(header, Code::UnknownError, e.to_string()),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = panic.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".into()
}

impl ServiceProviderRegistry for RpcRequestHandler {
    fn add_service_provider(&self, interface: &str, provider: Arc<dyn ServiceProvider>) {
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        if providers.insert(interface.to_string(), provider).is_some() {
            tracing::warn!(interface, "replacing existing service provider");
        } else {
            tracing::info!(interface, "service provider registered");
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for RpcRequestHandler {
    fn kind(&self) -> i32 {
        TYPE_RPC_REQUEST
    }

    async fn handle(&self, request: Command) -> Option<Command> {
        Some(self.dispatch(request.header(), request.payload()).await)
    }
}
