//! # Client Stubs
//!
//! A stub turns a method call on a service descriptor into an RPC round trip:
//! serialize the argument, wrap it in an `RpcRequest`, send it as a type-1 command with a
//! fresh request id, await the response, and parse the result.
//!
//! Only `(String) -> String` methods are supported on the wire. Descriptors naming any
//! other signature are rejected when the stub is built, not when it is called.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use micropack::RpcRequest;
use microrpc::Code;
use microrpc::Command;
use microrpc::Header;

use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Transport(transport::Error),
    Serialization(micropack::Error),
    /// The server answered with a non-success code.
    Remote { code: Code, message: String },
    UnsupportedSignature { interface: String, method: String },
    UnknownMethod { interface: String, method: String },
    /// The transport returned something other than a response to our request.
    UnexpectedResponse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::Remote { code, message } => write!(f, "Remote failure {}: {}", code, message),
            Self::UnsupportedSignature { interface, method } => {
                write!(f, "{}.{} is not a (String) -> String method", interface, method)
            }
            Self::UnknownMethod { interface, method } => {
                write!(f, "{} has no method {}", interface, method)
            }
            Self::UnexpectedResponse(msg) => write!(f, "Unexpected response: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<micropack::Error> for Error {
    fn from(e: micropack::Error) -> Self {
        Self::Serialization(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Value types a method signature may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Unit,
    Bool,
    I32,
    I64,
    String,
    Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<ValueType>,
    pub result: ValueType,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, result: ValueType) -> Self {
        Self {
            name: name.into(),
            params,
            result,
        }
    }

    /// A `(String) -> String` method.
    pub fn unary(name: impl Into<String>) -> Self {
        Self::new(name, vec![ValueType::String], ValueType::String)
    }

    pub fn is_wire_compatible(&self) -> bool {
        self.params == [ValueType::String] && self.result == ValueType::String
    }
}

/// Describes a service interface: its wire name and its methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInterface {
    pub name: String,
    pub methods: Vec<MethodSignature>,
}

impl ServiceInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: MethodSignature) -> Self {
        self.methods.push(method);
        self
    }
}

/// A typed client generated for one service interface.
pub trait RemoteService: Sized {
    fn interface() -> ServiceInterface;
    fn from_stub(stub: Stub) -> Self;
}

/// Builds stubs bound to a transport.
pub trait StubFactory: Send + Sync + 'static {
    fn create_stub(&self, transport: Arc<dyn Transport>, interface: &ServiceInterface) -> Result<Stub>;
}

/// The stock factory: validates the descriptor and builds a [`Stub`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorStubFactory;

impl StubFactory for DescriptorStubFactory {
    fn create_stub(&self, transport: Arc<dyn Transport>, interface: &ServiceInterface) -> Result<Stub> {
        Stub::new(transport, interface)
    }
}

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(0);

/// A process-wide request id. Wraps from `i32::MAX` to `i32::MIN`.
pub fn next_request_id() -> i32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// An untyped client proxy for one service on one transport.
#[derive(Clone)]
pub struct Stub {
    interface: Arc<str>,
    methods: Arc<HashSet<String>>,
    transport: Arc<dyn Transport>,
}

impl Stub {
    pub fn new(transport: Arc<dyn Transport>, interface: &ServiceInterface) -> Result<Self> {
        if let Some(bad) = interface.methods.iter().find(|m| !m.is_wire_compatible()) {
            return Err(Error::UnsupportedSignature {
                interface: interface.name.clone(),
                method: bad.name.clone(),
            });
        }

        Ok(Self {
            interface: Arc::from(interface.name.as_str()),
            methods: Arc::new(interface.methods.iter().map(|m| m.name.clone()).collect()),
            transport,
        })
    }

    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    /// Calls `method` remotely with one string argument.
    pub async fn invoke(&self, method: &str, argument: &str) -> Result<String> {
        if !self.methods.contains(method) {
            return Err(Error::UnknownMethod {
                interface: self.interface.to_string(),
                method: method.to_string(),
            });
        }

        let arguments = micropack::serialize(&argument.to_string())?;
        let request = RpcRequest::new(&*self.interface, method, arguments);
        let payload = micropack::serialize(&request)?;

        let request_id = next_request_id();
        let command = Command::request(Header::rpc_request(request_id), Bytes::from(payload));

        tracing::debug!(request_id, interface = %self.interface, method, "sending request");
        let response = self.transport.send(command).await?;

        let Some(header) = response.response_header() else {
            return Err(Error::UnexpectedResponse("request-shaped reply".into()));
        };
        if header.header.request_id != request_id {
            return Err(Error::UnexpectedResponse(format!(
                "reply for request {} while awaiting {}",
                header.header.request_id, request_id
            )));
        }
        if !header.code.is_success() {
            return Err(Error::Remote {
                code: header.code,
                message: header.error.clone(),
            });
        }

        Ok(micropack::parse(response.payload())?)
    }
}
