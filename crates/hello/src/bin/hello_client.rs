//! Looks up `HelloService` and calls it from ten concurrent tasks.

use hello::HelloServiceClient;
use microrun::ClientConfig;
use microrun::RpcAccessPoint;
use microrun::ServerConfig;

const CALLERS: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hello::init_tracing();

    let access = RpcAccessPoint::new(ClientConfig::default(), ServerConfig::default())?;
    let ns = access.get_name_service(&hello::name_service_uri()?).await?;
    let endpoint = ns
        .lookup_service(HelloServiceClient::NAME)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{} is not registered", HelloServiceClient::NAME))?;
    tracing::info!(%endpoint, "found service");

    let hello: HelloServiceClient = access.get_remote_service(&endpoint).await?;

    let mut tasks = Vec::with_capacity(CALLERS);
    for i in 0..CALLERS {
        let hello = hello.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("caller-{}", i);
            hello.say_hello(&name).await
        }));
    }

    for task in tasks {
        match task.await? {
            Ok(answer) => tracing::info!(%answer, "received"),
            Err(e) => tracing::error!(error = %e, "call failed"),
        }
    }

    access.close().await;
    Ok(())
}
