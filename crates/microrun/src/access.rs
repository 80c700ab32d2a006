//! # Access Point
//!
//! The facade an application talks to. On the client side it hands out typed stubs for
//! remote services; on the server side it registers providers and runs the transport
//! server. Every collaborator comes from a [`ServiceLoader`], so any of them can be
//! swapped by registering a different implementation first.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use url::Url;

use crate::config::ClientConfig;
use crate::config::ServerConfig;
use crate::endpoint::Endpoint;
use crate::handler::HandlerRegistry;
use crate::loader;
use crate::loader::ServiceLoader;
use crate::naming;
use crate::naming::NameService;
use crate::provider::ServiceProvider;
use crate::provider::ServiceProviderRegistry;
use crate::stub;
use crate::stub::RemoteService;
use crate::stub::ServiceInterface;
use crate::stub::Stub;
use crate::stub::StubFactory;
use crate::transport;
use crate::transport::Transport;
use crate::transport::TransportClient;
use crate::transport::TransportServer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The loader has no implementation for a required capability.
    MissingCapability(&'static str),
    Transport(transport::Error),
    Stub(stub::Error),
    Naming(naming::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCapability(c) => write!(f, "No implementation registered for {}", c),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Stub(e) => write!(f, "Stub error: {}", e),
            Self::Naming(e) => write!(f, "Name service error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<stub::Error> for Error {
    fn from(e: stub::Error) -> Self {
        Self::Stub(e)
    }
}

impl From<naming::Error> for Error {
    fn from(e: naming::Error) -> Self {
        Self::Naming(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn require<C: ?Sized + 'static>(loader: &ServiceLoader) -> Result<Arc<C>> {
    loader
        .load::<C>()
        .ok_or(Error::MissingCapability(std::any::type_name::<C>()))
}

pub struct RpcAccessPoint {
    loader: Arc<ServiceLoader>,
    server_config: ServerConfig,
    client: Arc<dyn TransportClient>,
    server: Arc<dyn TransportServer>,
    stub_factory: Arc<dyn StubFactory>,
    providers: Arc<dyn ServiceProviderRegistry>,
    transports: DashMap<Endpoint, Arc<dyn Transport>>,
}

impl RpcAccessPoint {
    /// An access point over a fresh loader holding the stock implementations.
    pub fn new(client: ClientConfig, server: ServerConfig) -> Result<Self> {
        let loader = ServiceLoader::new();
        loader::register_defaults(&loader, client);
        Self::with_loader(Arc::new(loader), server)
    }

    pub fn with_loader(loader: Arc<ServiceLoader>, server_config: ServerConfig) -> Result<Self> {
        Ok(Self {
            client: require::<dyn TransportClient>(&loader)?,
            server: require::<dyn TransportServer>(&loader)?,
            stub_factory: require::<dyn StubFactory>(&loader)?,
            providers: require::<dyn ServiceProviderRegistry>(&loader)?,
            loader,
            server_config,
            transports: DashMap::new(),
        })
    }

    pub fn loader(&self) -> &Arc<ServiceLoader> {
        &self.loader
    }

    async fn transport(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = self.transports.get(endpoint).map(|t| t.value().clone()) {
            return Ok(transport);
        }
        let transport = self.client.connect(endpoint).await?;
        Ok(self
            .transports
            .entry(endpoint.clone())
            .or_insert(transport)
            .value()
            .clone())
    }

    /// An untyped stub for `interface` at `endpoint`.
    pub async fn get_remote_stub(&self, endpoint: &Endpoint, interface: &ServiceInterface) -> Result<Stub> {
        let transport = self.transport(endpoint).await?;
        Ok(self.stub_factory.create_stub(transport, interface)?)
    }

    /// A typed client for service `S` at `endpoint`.
    pub async fn get_remote_service<S: RemoteService>(&self, endpoint: &Endpoint) -> Result<S> {
        let stub = self.get_remote_stub(endpoint, &S::interface()).await?;
        Ok(S::from_stub(stub))
    }

    /// Registers `provider` under `interface`. Returns the endpoint clients should use.
    pub fn add_service_provider(&self, interface: &str, provider: Arc<dyn ServiceProvider>) -> Endpoint {
        self.providers.add_service_provider(interface, provider);
        self.advertised_endpoint()
    }

    pub fn advertised_endpoint(&self) -> Endpoint {
        let bound = self.server.local_addr().map(|addr| addr.port());
        self.server_config.advertised_endpoint(bound)
    }

    /// Starts the transport server. Idempotent; returns the bound address.
    pub async fn start_server(&self) -> Result<SocketAddr> {
        let handlers = Arc::new(HandlerRegistry::from_loader(&self.loader));
        Ok(self.server.start(handlers, &self.server_config).await?)
    }

    pub async fn stop_server(&self) {
        self.server.stop().await;
    }

    /// Connects the first name service supporting `uri`'s scheme.
    pub async fn get_name_service(&self, uri: &Url) -> Result<Arc<dyn NameService>> {
        Ok(naming::get_name_service(&self.loader, uri).await?)
    }

    /// Stops the server and closes every client connection.
    pub async fn close(&self) {
        self.server.stop().await;
        self.client.close().await;
        self.transports.clear();
    }
}
