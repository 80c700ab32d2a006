//! # Service Loader
//!
//! An explicit registry of implementations per capability. A capability is any type,
//! usually a trait object such as `dyn TransportClient`. Nothing is discovered at runtime:
//! implementations are registered by calling [`ServiceLoader::register`].
//!
//! ## Invariants
//! - **Ordered**: `load` returns the first registration for a capability, `load_all` all of
//!   them in registration order.
//! - **One Singleton per Type**: A `Singleton` implementation is instantiated at most once
//!   per loader, keyed by its concrete type. Registering it under several capabilities
//!   yields the same instance from each (first instantiation wins a race).

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::RwLock;

use dashmap::DashMap;

use crate::client::TcpTransportClient;
use crate::config::ClientConfig;
use crate::handler::RequestHandler;
use crate::naming::NameService;
use crate::naming::file::FileNameService;
use crate::naming::memory::MemoryNameService;
use crate::provider::RpcRequestHandler;
use crate::provider::ServiceProviderRegistry;
use crate::server::TcpTransportServer;
use crate::stub::DescriptorStubFactory;
use crate::stub::StubFactory;
use crate::transport::TransportClient;
use crate::transport::TransportServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One instance per loader, shared by every capability the type is registered under.
    Singleton,
    /// A fresh instance on every load.
    Prototype,
}

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn() -> Instance + Send + Sync>;
type Cast<C> = Arc<dyn Fn(Instance) -> Option<Arc<C>> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    impl_type: TypeId,
    impl_name: &'static str,
    scope: Scope,
    factory: Factory,
    /// A `Cast<C>` for the capability this registration sits under.
    cast: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct ServiceLoader {
    capabilities: RwLock<HashMap<TypeId, Vec<Registration>>>,
    singletons: DashMap<TypeId, Instance>,
}

impl ServiceLoader {
    /// An empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader holding the stock implementations, with a default client config.
    pub fn with_defaults() -> Self {
        let loader = Self::new();
        register_defaults(&loader, ClientConfig::default());
        loader
    }

    /// Registers `T` as an implementation of capability `C`.
    ///
    /// `cast` converts the concrete instance into the capability, typically `|t| t`.
    pub fn register<C, T>(
        &self,
        scope: Scope,
        factory: impl Fn() -> T + Send + Sync + 'static,
        cast: impl Fn(Arc<T>) -> Arc<C> + Send + Sync + 'static,
    ) where
        C: ?Sized + 'static,
        T: Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Instance);
        let cast: Cast<C> = Arc::new(move |instance: Instance| instance.downcast::<T>().ok().map(&cast));

        let registration = Registration {
            impl_type: TypeId::of::<T>(),
            impl_name: std::any::type_name::<T>(),
            scope,
            factory,
            cast: Arc::new(cast),
        };

        let mut capabilities = self.capabilities.write().unwrap_or_else(|e| e.into_inner());
        capabilities.entry(TypeId::of::<C>()).or_default().push(registration);
        tracing::debug!(
            capability = std::any::type_name::<C>(),
            implementation = std::any::type_name::<T>(),
            ?scope,
            "registered implementation"
        );
    }

    fn registrations<C: ?Sized + 'static>(&self) -> Vec<Registration> {
        let capabilities = self.capabilities.read().unwrap_or_else(|e| e.into_inner());
        capabilities.get(&TypeId::of::<C>()).cloned().unwrap_or_default()
    }

    fn instantiate<C: ?Sized + 'static>(&self, registration: &Registration) -> Option<Arc<C>> {
        let instance = match registration.scope {
            Scope::Prototype => (registration.factory)(),
            Scope::Singleton => match self.singletons.get(&registration.impl_type) {
                Some(existing) => existing.value().clone(),
                None => {
                    // built outside the map lock so factories may themselves use the loader
                    let fresh = (registration.factory)();
                    self.singletons
                        .entry(registration.impl_type)
                        .or_insert(fresh)
                        .value()
                        .clone()
                }
            },
        };

        let cast = registration.cast.downcast_ref::<Cast<C>>()?;
        let out = cast(instance);
        if out.is_none() {
            tracing::error!(implementation = registration.impl_name, "implementation failed to cast to its capability");
        }
        out
    }

    /// The first implementation registered for `C`.
    pub fn load<C: ?Sized + 'static>(&self) -> Option<Arc<C>> {
        self.registrations::<C>()
            .iter()
            .find_map(|r| self.instantiate::<C>(r))
    }

    /// Every implementation registered for `C`, in registration order.
    pub fn load_all<C: ?Sized + 'static>(&self) -> Vec<Arc<C>> {
        self.registrations::<C>()
            .iter()
            .filter_map(|r| self.instantiate::<C>(r))
            .collect()
    }
}

/// Registers the stock transport, stub, handler and name-service implementations.
pub fn register_defaults(loader: &ServiceLoader, client: ClientConfig) {
    loader.register::<dyn TransportClient, _>(
        Scope::Singleton,
        move || TcpTransportClient::with_config(client.clone()),
        |t| t,
    );
    loader.register::<dyn TransportServer, _>(Scope::Singleton, TcpTransportServer::new, |t| t);
    loader.register::<dyn StubFactory, _>(Scope::Singleton, || DescriptorStubFactory, |t| t);
    loader.register::<dyn RequestHandler, _>(Scope::Singleton, RpcRequestHandler::new, |t| t);
    loader.register::<dyn ServiceProviderRegistry, _>(Scope::Singleton, RpcRequestHandler::new, |t| t);
    loader.register::<dyn NameService, _>(Scope::Prototype, FileNameService::new, |t| t);
    loader.register::<dyn NameService, _>(Scope::Prototype, MemoryNameService::new, |t| t);
}

static GLOBAL: OnceLock<Arc<ServiceLoader>> = OnceLock::new();

/// The process-wide loader, holding the stock implementations.
pub fn global() -> Arc<ServiceLoader> {
    GLOBAL.get_or_init(|| Arc::new(ServiceLoader::with_defaults())).clone()
}
