//! # TCP Transport Client
//!
//! One cached connection per endpoint, each with its own in-flight table and reader pump.
//!
//! ## Invariants
//! - **Ordered Writes**: Frames on a connection go out in the order senders take the writer lock.
//! - **One Reader**: Each connection has exactly one pump task demultiplexing responses.
//! - **Fail Loudly**: When the pump stops, every outstanding request on that connection
//!   fails with the pump's error and the connection is marked closed. The next call to the
//!   same endpoint opens a fresh connection.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use futures::SinkExt;
use futures::StreamExt;
use microrpc::Command;
use microrpc::CommandCodec;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::inflight::InflightTable;
use crate::transport;
use crate::transport::Error;
use crate::transport::Transport;
use crate::transport::TransportClient;

/// A live connection to one endpoint.
pub struct Connection {
    endpoint: Endpoint,
    writer: Mutex<FramedWrite<OwnedWriteHalf, CommandCodec>>,
    inflight: Arc<InflightTable>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Dials `endpoint` and spawns the reader pump.
    pub async fn open(endpoint: &Endpoint, config: &ClientConfig) -> transport::Result<Arc<Self>> {
        let stream = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(endpoint.authority())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::ConnectRefused(format!("{}: {}", endpoint, e))),
            Err(_) => return Err(Error::ConnectTimeout(endpoint.to_string())),
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(endpoint = %endpoint, error = %e, "could not set TCP_NODELAY");
        }

        let (read, write) = stream.into_split();
        let codec = CommandCodec::responses().with_max_frame_size(config.max_frame_size);

        let conn = Arc::new(Self {
            endpoint: endpoint.clone(),
            writer: Mutex::new(FramedWrite::new(write, codec.clone())),
            inflight: InflightTable::new(config.inflight.clone()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Self::pump(
            conn.endpoint.clone(),
            FramedRead::new(read, codec),
            conn.inflight.clone(),
            conn.shutdown.clone(),
        ));

        tracing::info!(endpoint = %endpoint, "connection opened");
        Ok(conn)
    }

    async fn pump(
        endpoint: Endpoint,
        mut reader: FramedRead<OwnedReadHalf, CommandCodec>,
        inflight: Arc<InflightTable>,
        shutdown: CancellationToken,
    ) {
        let error = loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break Error::ClientClosed,
                next = reader.next() => next,
            };

            match next {
                Some(Ok(response)) => Self::dispatch(&endpoint, &inflight, response),
                Some(Err(microrpc::Error::Io(msg))) => break Error::ReadFailed(msg),
                Some(Err(e)) => break Error::MalformedFrame(e.to_string()),
                None => break Error::ConnectionLost("closed by peer".into()),
            }
        };

        if error != Error::ClientClosed {
            tracing::warn!(endpoint = %endpoint, error = %error, "connection reader stopped");
        }

        shutdown.cancel();
        inflight.fail_all(error);
        inflight.close();
    }

    fn dispatch(endpoint: &Endpoint, inflight: &InflightTable, response: Command) {
        let request_id = response.request_id();
        match inflight.take(request_id) {
            Some(pending) => pending.complete(Ok(response)),
            None => tracing::warn!(endpoint = %endpoint, request_id, "dropping response with no pending request"),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Outstanding requests on this connection.
    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// Writes `request` and waits for the response with the same id.
    pub async fn send(&self, request: Command) -> transport::Result<Command> {
        if self.is_closed() {
            return Err(Error::ConnectionLost(format!("{} is closed", self.endpoint)));
        }

        let request_id = request.request_id();
        let waiter = self.inflight.put(request_id).await?;

        let written = {
            let mut writer = self.writer.lock().await;
            writer.send(request).await
        };

        if let Err(e) = written {
            let error = Error::WriteFailed(e.to_string());
            self.inflight.take(request_id);
            tracing::warn!(endpoint = %self.endpoint, request_id, error = %e, "write failed, closing connection");
            self.fail(error.clone()).await;
            return Err(error);
        }

        match waiter.await {
            Ok(result) => result,
            Err(_) => Err(Error::ClientClosed),
        }
    }

    /// Closes the socket and fails outstanding requests with `ClientClosed`.
    pub async fn close(&self) {
        self.fail(Error::ClientClosed).await;
    }

    /// Closes the connection, failing every outstanding request with `error`.
    async fn fail(&self, error: Error) {
        // before cancelling, so the pump's own fail_all finds nothing left
        self.inflight.fail_all(error);
        self.shutdown.cancel();
        self.inflight.close();
        let mut writer = self.writer.lock().await;
        let _ = writer.close().await;
    }
}

struct ClientInner {
    config: ClientConfig,
    connections: DashMap<Endpoint, Arc<Connection>>,
    connect_locks: DashMap<Endpoint, Arc<Mutex<()>>>,
    closed: AtomicBool,
}

impl ClientInner {
    /// Returns the cached connection for `endpoint`, reconnecting if it has closed.
    async fn connection(&self, endpoint: &Endpoint) -> transport::Result<Arc<Connection>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ClientClosed);
        }
        if let Some(conn) = self.live(endpoint) {
            return Ok(conn);
        }

        let lock = self.connect_lock(endpoint);
        let _guard = lock.lock().await;
        if let Some(conn) = self.live(endpoint) {
            return Ok(conn);
        }

        let conn = Connection::open(endpoint, &self.config).await?;
        self.connections.insert(endpoint.clone(), conn.clone());
        Ok(conn)
    }

    /// Serializes connects to one endpoint without blocking connects to others.
    fn connect_lock(&self, endpoint: &Endpoint) -> Arc<Mutex<()>> {
        self.connect_locks.entry(endpoint.clone()).or_default().value().clone()
    }

    fn live(&self, endpoint: &Endpoint) -> Option<Arc<Connection>> {
        self.connections
            .get(endpoint)
            .map(|c| c.value().clone())
            .filter(|c| !c.is_closed())
    }
}

/// Creates `RemoteTransport`s over pooled TCP connections.
#[derive(Clone)]
pub struct TcpTransportClient {
    inner: Arc<ClientInner>,
}

impl TcpTransportClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                connections: DashMap::new(),
                connect_locks: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The live connection to `endpoint`, opening one if needed.
    pub async fn connection(&self, endpoint: &Endpoint) -> transport::Result<Arc<Connection>> {
        self.inner.connection(endpoint).await
    }

    pub fn transport(&self, endpoint: &Endpoint) -> RemoteTransport {
        RemoteTransport {
            client: self.inner.clone(),
            endpoint: endpoint.clone(),
        }
    }
}

impl Default for TcpTransportClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TransportClient for TcpTransportClient {
    async fn connect(&self, endpoint: &Endpoint) -> transport::Result<Arc<dyn Transport>> {
        self.connection(endpoint).await?;
        Ok(Arc::new(self.transport(endpoint)))
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let conns: Vec<Arc<Connection>> = self.inner.connections.iter().map(|c| c.value().clone()).collect();
        self.inner.connections.clear();
        for conn in conns {
            conn.close().await;
            tracing::info!(endpoint = %conn.endpoint(), "connection closed");
        }
    }
}

/// A transport bound to one endpoint. Resolves the live connection on every call,
/// so it survives a dropped connection by reconnecting.
pub struct RemoteTransport {
    client: Arc<ClientInner>,
    endpoint: Endpoint,
}

impl RemoteTransport {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Transport for RemoteTransport {
    async fn send(&self, request: Command) -> transport::Result<Command> {
        let conn = self.client.connection(&self.endpoint).await?;
        conn.send(request).await
    }
}
