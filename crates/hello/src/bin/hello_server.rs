//! Serves `HelloService` and registers it with the name service.

use std::sync::Arc;

use hello::HelloServiceClient;
use hello::HelloServiceImpl;
use hello::HelloServiceProvider;
use microrun::ClientConfig;
use microrun::RpcAccessPoint;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hello::init_tracing();

    let access = RpcAccessPoint::new(ClientConfig::default(), hello::server_config()?)?;
    let addr = access.start_server().await?;
    let endpoint = access.add_service_provider(
        HelloServiceClient::NAME,
        Arc::new(HelloServiceProvider::new(HelloServiceImpl)),
    );

    let ns_uri = hello::name_service_uri()?;
    let ns = access.get_name_service(&ns_uri).await?;
    ns.register_service(HelloServiceClient::NAME, &endpoint).await?;

    tracing::info!(%addr, %endpoint, name_service = %ns_uri, "serving, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    access.close().await;
    tracing::info!("bye");
    Ok(())
}
