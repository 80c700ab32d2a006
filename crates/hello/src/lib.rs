//! # Hello
//!
//! A sample service shared by the `hello-server` and `hello-client` binaries.
//!
//! ## Environment
//!
//! - `MICRORPC_NAMESERVICE`: name-service URI. Defaults to a file in the temp directory.
//! - `MICRORPC_BIND`: server listen address. Defaults to `0.0.0.0:9999`.
//! - `RUST_LOG`: log filter. Defaults to `info`.

use std::net::SocketAddr;

use microrun::ServerConfig;
use microrun::provider::ProviderError;
use tracing_subscriber::EnvFilter;
use url::Url;

microrun::service! {
    /// Greets whoever calls it.
    pub trait HelloService: "HelloService" {
        client HelloServiceClient;
        provider HelloServiceProvider;

        fn say_hello(name: String) -> String;
    }
}

pub struct HelloServiceImpl;

#[microrun::async_trait]
impl HelloService for HelloServiceImpl {
    async fn say_hello(&self, name: String) -> Result<String, ProviderError> {
        tracing::info!(%name, "saying hello");
        Ok(format!("hello world @{}", name))
    }
}

pub const NAME_SERVICE_ENV: &str = "MICRORPC_NAMESERVICE";
pub const BIND_ENV: &str = "MICRORPC_BIND";

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

pub fn name_service_uri() -> anyhow::Result<Url> {
    if let Ok(uri) = std::env::var(NAME_SERVICE_ENV) {
        return Ok(Url::parse(&uri)?);
    }
    let path = std::env::temp_dir().join("microrpc_name_service.data");
    Url::from_file_path(&path).map_err(|_| anyhow::anyhow!("temp path {} is not absolute", path.display()))
}

pub fn server_config() -> anyhow::Result<ServerConfig> {
    let config = ServerConfig::default();
    match std::env::var(BIND_ENV) {
        Ok(addr) => Ok(config.with_bind_addr(addr.parse::<SocketAddr>()?)),
        Err(_) => Ok(config),
    }
}
