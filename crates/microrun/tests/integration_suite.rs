//! Integration tests for microrun over real TCP sockets.

use std::collections::HashMap;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use url::Url;

use microrpc::Code;
use microrpc::Command;
use microrpc::CommandCodec;
use microrpc::Header;
use microrpc::ResponseHeader;
use microrun::ClientConfig;
use microrun::Endpoint;
use microrun::InflightConfig;
use microrun::RpcAccessPoint;
use microrun::ServerConfig;
use microrun::TcpTransportClient;
use microrun::Transport;
use microrun::TransportClient;
use microrun::provider::ProviderError;
use microrun::stub;
use microrun::transport;

microrun::service! {
    pub trait Hello: "test.Hello" {
        client HelloClient;
        provider HelloProvider;

        fn say_hello(name: String) -> String;
        fn fail(reason: String) -> String;
        fn slow(name: String) -> String;
    }
}

struct HelloImpl;

#[microrun::async_trait]
impl Hello for HelloImpl {
    async fn say_hello(&self, name: String) -> Result<String, ProviderError> {
        Ok(format!("hello world @{}", name))
    }

    async fn fail(&self, reason: String) -> Result<String, ProviderError> {
        Err(reason.into())
    }

    async fn slow(&self, name: String) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(name)
    }
}

fn loopback_server() -> ServerConfig {
    ServerConfig::default().with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
}

/// Starts an access point serving `HelloImpl` on an ephemeral port.
async fn hello_server() -> anyhow::Result<(RpcAccessPoint, Endpoint)> {
    let server = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    server.add_service_provider(HelloClient::NAME, Arc::new(HelloProvider::new(HelloImpl)));
    let addr = server.start_server().await?;
    Ok((server, Endpoint::localhost(addr.port())))
}

fn request(id: i32, payload: &'static [u8]) -> Command {
    Command::request(Header::rpc_request(id), Bytes::from_static(payload))
}

fn echo_response(req: &Command) -> Command {
    Command::response(ResponseHeader::success(req.header()), req.payload().clone())
}

// --- S1: happy path ---

#[tokio::test]
async fn test_happy_path() -> anyhow::Result<()> {
    let (server, endpoint) = hello_server().await?;
    let client = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;

    let hello: HelloClient = client.get_remote_service(&endpoint).await?;
    assert_eq!(hello.say_hello("bob").await?, "hello world @bob");

    client.close().await;
    server.close().await;
    Ok(())
}

// --- S2: no provider ---

#[tokio::test]
async fn test_no_provider() -> anyhow::Result<()> {
    let server = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    let addr = server.start_server().await?;
    let client = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;

    let hello: HelloClient = client.get_remote_service(&Endpoint::localhost(addr.port())).await?;
    let err = hello.say_hello("bob").await.unwrap_err();
    assert_eq!(
        err,
        stub::Error::Remote {
            code: Code::NoProvider,
            message: "No provider!".into()
        }
    );

    client.close().await;
    server.close().await;
    Ok(())
}

// --- S3: handler error, connection stays usable ---

#[tokio::test]
async fn test_handler_error_keeps_connection() -> anyhow::Result<()> {
    let (server, endpoint) = hello_server().await?;
    let client = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    let hello: HelloClient = client.get_remote_service(&endpoint).await?;

    let err = hello.fail("db down").await.unwrap_err();
    assert_eq!(
        err,
        stub::Error::Remote {
            code: Code::UnknownError,
            message: "db down".into()
        }
    );
    assert_eq!(hello.say_hello("again").await?, "hello world @again");

    client.close().await;
    server.close().await;
    Ok(())
}

// --- S4: back-pressure ---

/// Accepts connections and reads requests without ever answering.
async fn silent_server() -> anyhow::Result<Endpoint> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, CommandCodec::requests());
                while let Some(Ok(_)) = framed.next().await {}
            });
        }
    });
    Ok(Endpoint::localhost(port))
}

#[tokio::test]
async fn test_back_pressure_caps_inflight() -> anyhow::Result<()> {
    let endpoint = silent_server().await?;
    let config = ClientConfig::default().with_inflight(
        InflightConfig::default()
            .with_capacity(10)
            .with_submit_timeout(Duration::from_millis(200))
            .with_request_timeout(Duration::from_secs(30)),
    );
    let client = TcpTransportClient::with_config(config);
    let conn = client.connection(&endpoint).await?;

    let mut pending = Vec::new();
    for id in 0..10 {
        let conn = conn.clone();
        pending.push(tokio::spawn(async move { conn.send(request(id, b"")).await }));
    }
    while conn.inflight() < 10 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let err = conn.send(request(10, b"")).await.unwrap_err();
    assert_eq!(err, transport::Error::SubmitTimeout);
    assert_eq!(conn.inflight(), 10);

    client.close().await;
    for task in pending {
        assert_eq!(task.await?.unwrap_err(), transport::Error::ClientClosed);
    }
    Ok(())
}

// --- S5: concurrent calls are correlated ---

#[tokio::test]
async fn test_concurrent_calls_get_their_own_answers() -> anyhow::Result<()> {
    let (server, endpoint) = hello_server().await?;
    let client = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    let hello: HelloClient = client.get_remote_service(&endpoint).await?;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let hello = hello.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("user-{}", i);
            let answer = hello.slow(&name).await;
            (name, answer)
        }));
    }
    for task in tasks {
        let (name, answer) = task.await?;
        assert_eq!(answer?, name);
    }

    client.close().await;
    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_responses_correlated_regardless_of_order() -> anyhow::Result<()> {
    const N: usize = 5;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = Endpoint::localhost(listener.local_addr()?.port());

    // answers a batch of N in reverse arrival order
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut framed = Framed::new(stream, CommandCodec::requests());
        let mut batch = Vec::new();
        while batch.len() < N {
            match framed.next().await {
                Some(Ok(req)) => batch.push(req),
                _ => return Ok::<_, anyhow::Error>(()),
            }
        }
        for req in batch.iter().rev() {
            framed.send(echo_response(req)).await?;
        }
        Ok(())
    });

    let client = TcpTransportClient::new();
    let transport = client.connect(&endpoint).await?;

    let payloads: [&'static [u8]; N] = [b"a", b"b", b"c", b"d", b"e"];
    let mut tasks = Vec::new();
    for (i, payload) in payloads.into_iter().enumerate() {
        let transport = transport.clone();
        let req = request(100 + i as i32, payload);
        tasks.push(tokio::spawn(async move { transport.send(req).await }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        let response = task.await??;
        assert_eq!(response.request_id(), 100 + i as i32);
        assert_eq!(&response.payload()[..], payloads[i]);
    }

    client.close().await;
    Ok(())
}

// --- S6: name service round trip ---

#[tokio::test]
async fn test_name_service_round_trip() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("microrun-it-ns-{}.bin", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let uri = Url::from_file_path(&path).map_err(|_| anyhow::anyhow!("bad temp path"))?;

    let access = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    let ns = access.get_name_service(&uri).await?;

    let e1 = Endpoint::parse("rpc://h1:1")?;
    let e2 = Endpoint::parse("rpc://h2:2")?;
    ns.register_service("S", &e1).await?;
    ns.register_service("S", &e2).await?;
    ns.register_service("S", &e1).await?;

    let mut hits: HashMap<Endpoint, usize> = HashMap::new();
    for _ in 0..1000 {
        if let Some(ep) = ns.lookup_service("S").await? {
            *hits.entry(ep).or_default() += 1;
        }
    }
    assert_eq!(hits.keys().cloned().collect::<HashSet<_>>(), HashSet::from([e1, e2]));
    for (ep, count) in &hits {
        assert!((400..=600).contains(count), "{} picked {} times out of 1000", ep, count);
    }
    assert_eq!(ns.lookup_service("missing").await?, None);

    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[tokio::test]
async fn test_advertised_endpoint_reaches_provider() -> anyhow::Result<()> {
    let server = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    server.start_server().await?;
    let advertised = server.add_service_provider(HelloClient::NAME, Arc::new(HelloProvider::new(HelloImpl)));
    assert_eq!(advertised.port(), server.start_server().await?.port());

    let ns_uri = Url::parse(&format!("memory://advertise-{}", std::process::id()))?;
    server.get_name_service(&ns_uri).await?.register_service(HelloClient::NAME, &advertised).await?;

    let client = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    let found = client
        .get_name_service(&ns_uri)
        .await?
        .lookup_service(HelloClient::NAME)
        .await?
        .ok_or_else(|| anyhow::anyhow!("not registered"))?;
    let hello: HelloClient = client.get_remote_service(&found).await?;
    assert_eq!(hello.say_hello("ns").await?, "hello world @ns");

    client.close().await;
    server.close().await;
    Ok(())
}

// --- Protocol edges ---

#[tokio::test]
async fn test_unsupported_version_rejected() -> anyhow::Result<()> {
    let (server, endpoint) = hello_server().await?;
    let stream = TcpStream::connect(endpoint.authority()).await?;
    let mut framed = Framed::new(stream, CommandCodec::responses());

    framed.send(Command::request(Header::new(1, 2, 77), Bytes::new())).await?;
    let response = framed.next().await.ok_or_else(|| anyhow::anyhow!("closed"))??;
    let header = response.response_header().ok_or_else(|| anyhow::anyhow!("not a response"))?;
    assert_eq!(header.code, Code::UnsupportedVersion);
    assert_eq!(header.header.request_id, 77);

    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_handler_type_closes_connection() -> anyhow::Result<()> {
    let (server, endpoint) = hello_server().await?;
    let stream = TcpStream::connect(endpoint.authority()).await?;
    let mut framed = Framed::new(stream, CommandCodec::responses());

    framed.send(Command::request(Header::new(42, 1, 1), Bytes::new())).await?;
    let next = tokio::time::timeout(Duration::from_secs(5), framed.next()).await?;
    assert!(matches!(next, None | Some(Err(_))));

    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_unanswered_request_is_reaped() -> anyhow::Result<()> {
    let endpoint = silent_server().await?;
    let config = ClientConfig::default().with_inflight(
        InflightConfig::default().with_request_timeout(Duration::from_millis(100)),
    );
    let client = TcpTransportClient::with_config(config);
    let transport = client.connect(&endpoint).await?;

    let started = std::time::Instant::now();
    let err = transport.send(request(1, b"x")).await.unwrap_err();
    assert_eq!(err, transport::Error::InflightTimeout);
    assert!(started.elapsed() < Duration::from_secs(2));

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_connection_loss_fails_pending_then_reconnects() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = Endpoint::localhost(listener.local_addr()?.port());

    tokio::spawn(async move {
        // first connection: read one request, then hang up
        let (stream, _) = listener.accept().await?;
        let mut framed = Framed::new(stream, CommandCodec::requests());
        let _ = framed.next().await;
        drop(framed);

        // second connection: echo everything
        let (stream, _) = listener.accept().await?;
        let mut framed = Framed::new(stream, CommandCodec::requests());
        while let Some(Ok(req)) = framed.next().await {
            framed.send(echo_response(&req)).await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let client = TcpTransportClient::new();
    let transport = client.connect(&endpoint).await?;

    let err = transport.send(request(1, b"lost")).await.unwrap_err();
    assert!(matches!(
        err,
        transport::Error::ConnectionLost(_) | transport::Error::ReadFailed(_)
    ));

    let response = transport.send(request(2, b"back")).await?;
    assert_eq!(&response.payload()[..], b"back");

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_write_failure_fails_every_waiter_and_closes() -> anyhow::Result<()> {
    let endpoint = silent_server().await?;
    let client = TcpTransportClient::with_config(ClientConfig::default().with_max_frame_size(256));
    let conn = client.connection(&endpoint).await?;

    // parked: the silent server never answers
    let parked = tokio::spawn({
        let conn = conn.clone();
        async move { conn.send(request(1, b"small")).await }
    });
    while conn.inflight() < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    static OVERSIZED: [u8; 1024] = [0u8; 1024];
    let err = conn.send(request(2, &OVERSIZED)).await.unwrap_err();
    assert!(matches!(err, transport::Error::WriteFailed(_)));

    let parked = parked.await?.unwrap_err();
    assert_eq!(parked, err);
    assert_eq!(conn.inflight(), 0);
    assert!(conn.is_closed());

    // the next call gets a fresh connection
    let fresh = client.connection(&endpoint).await?;
    assert!(!Arc::ptr_eq(&conn, &fresh));

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_connect_refused() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = Endpoint::localhost(listener.local_addr()?.port());
    drop(listener);

    let client = TcpTransportClient::new();
    let err = client.connect(&endpoint).await.err().ok_or_else(|| anyhow::anyhow!("connected"))?;
    assert!(matches!(err, transport::Error::ConnectRefused(_)));
    Ok(())
}

#[tokio::test]
async fn test_closed_client_refuses_calls() -> anyhow::Result<()> {
    let (server, endpoint) = hello_server().await?;
    let client = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    let hello: HelloClient = client.get_remote_service(&endpoint).await?;
    assert_eq!(hello.say_hello("once").await?, "hello world @once");

    client.close().await;
    assert_eq!(
        hello.say_hello("twice").await.unwrap_err(),
        stub::Error::Transport(transport::Error::ClientClosed)
    );

    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_start_server_is_idempotent() -> anyhow::Result<()> {
    let server = RpcAccessPoint::new(ClientConfig::default(), loopback_server())?;
    let a = server.start_server().await?;
    let b = server.start_server().await?;
    assert_eq!(a, b);

    server.stop_server().await;
    assert!(TcpStream::connect(a).await.is_err());
    Ok(())
}
