//! # Name Services
//!
//! Directories mapping a logical service name to the endpoints serving it.
//!
//! ## Invariants
//! - **Idempotent**: Registering the same (name, endpoint) twice stores it once.
//! - **Uniform**: With several endpoints under one name, `lookup_service` picks one uniformly
//!   at random.

pub mod file;
pub mod memory;

use rand::seq::SliceRandom;
use url::Url;

use crate::endpoint::Endpoint;
use crate::loader::ServiceLoader;
use crate::transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No registered name service handles this URI scheme.
    UnsupportedScheme(String),
    /// The URI does not name a usable location for this name service.
    InvalidUri(String),
    /// An operation ran before `connect`.
    NotConnected,
    /// A stored endpoint could not be parsed.
    InvalidEndpoint(String),
    /// The backing store could not be read or written.
    Io(String),
    /// The backing store's contents could not be decoded or encoded.
    Serialization(micropack::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedScheme(s) => write!(f, "No name service supports scheme {:?}", s),
            Self::InvalidUri(msg) => write!(f, "Invalid name service URI: {}", msg),
            Self::NotConnected => write!(f, "Name service is not connected"),
            Self::InvalidEndpoint(msg) => write!(f, "Invalid endpoint in name service: {}", msg),
            Self::Io(msg) => write!(f, "Name service I/O error: {}", msg),
            Self::Serialization(e) => write!(f, "Name service data error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<micropack::Error> for Error {
    fn from(e: micropack::Error) -> Self {
        Self::Serialization(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::InvalidEndpoint(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[async_trait::async_trait]
pub trait NameService: Send + Sync + 'static {
    /// URI schemes this implementation handles, e.g. `["file"]`.
    fn supported_schemes(&self) -> &'static [&'static str];

    /// Binds this instance to the directory at `uri`.
    async fn connect(&self, uri: &Url) -> Result<()>;

    async fn register_service(&self, name: &str, endpoint: &Endpoint) -> Result<()>;

    /// A random endpoint registered under `name`, or `None` if there is none.
    async fn lookup_service(&self, name: &str) -> Result<Option<Endpoint>>;
}

/// Picks one of `uris` uniformly at random and parses it.
pub(crate) fn pick(uris: &[String]) -> Result<Option<Endpoint>> {
    match uris.choose(&mut rand::thread_rng()) {
        Some(uri) => Ok(Some(Endpoint::parse(uri)?)),
        None => Ok(None),
    }
}

/// Connects the first name service in `loader` whose schemes include `uri`'s scheme.
pub async fn get_name_service(loader: &ServiceLoader, uri: &Url) -> Result<std::sync::Arc<dyn NameService>> {
    let scheme = uri.scheme();
    let Some(service) = loader
        .load_all::<dyn NameService>()
        .into_iter()
        .find(|s| s.supported_schemes().iter().any(|supported| *supported == scheme))
    else {
        return Err(Error::UnsupportedScheme(scheme.to_string()));
    };

    service.connect(uri).await?;
    tracing::info!(%uri, "name service connected");
    Ok(service)
}
