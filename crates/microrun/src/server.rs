//! # TCP Transport Server
//!
//! An accept loop plus one task per connection. Requests on a connection are handled in
//! arrival order, inline on that connection's task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use futures::SinkExt;
use futures::StreamExt;
use microrpc::Code;
use microrpc::Command;
use microrpc::CommandCodec;
use microrpc::VERSION;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::handler::HandlerRegistry;
use crate::transport;
use crate::transport::Error;
use crate::transport::TransportServer;

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

pub struct TcpTransportServer {
    running: tokio::sync::Mutex<Option<Running>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TcpTransportServer {
    pub fn new() -> Self {
        Self {
            running: tokio::sync::Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    async fn accept_loop(
        listener: TcpListener,
        handlers: Arc<HandlerRegistry>,
        shutdown: CancellationToken,
        max_frame_size: usize,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            tracing::debug!(%peer, "connection accepted");
            let handlers = handlers.clone();
            let shutdown = shutdown.child_token();
            tokio::spawn(async move {
                match serve_connection(stream, handlers, shutdown, max_frame_size).await {
                    Ok(()) => tracing::debug!(%peer, "connection closed"),
                    Err(e) => tracing::warn!(%peer, error = %e, "closing connection"),
                }
            });
        }
    }
}

impl Default for TcpTransportServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads requests until EOF, shutdown, or a connection-fatal error.
async fn serve_connection(
    stream: TcpStream,
    handlers: Arc<HandlerRegistry>,
    shutdown: CancellationToken,
    max_frame_size: usize,
) -> transport::Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "could not set TCP_NODELAY");
    }
    let (read, write) = stream.into_split();
    let codec = CommandCodec::requests().with_max_frame_size(max_frame_size);
    let mut reader = FramedRead::new(read, codec.clone());
    let mut writer = FramedWrite::new(write, codec);

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            next = reader.next() => next,
        };

        let request = match next {
            None => return Ok(()),
            Some(Ok(request)) => request,
            Some(Err(e)) => return Err(e.into()),
        };

        let request_id = request.request_id();
        let response = if request.version() != VERSION {
            tracing::warn!(request_id, version = request.version(), "rejecting unsupported version");
            let message = format!("Unsupported version {}, expected {}", request.version(), VERSION);
            Some(Command::failure(request.header(), Code::UnsupportedVersion, message))
        } else {
            let kind = request.kind();
            let Some(handler) = handlers.get(kind) else {
                return Err(Error::UnknownHandlerType(kind));
            };
            handler.handle(request).await
        };

        let Some(response) = response else {
            tracing::warn!(request_id, "handler produced no response");
            continue;
        };

        writer
            .send(response)
            .await
            .map_err(|e| Error::WriteFailed(e.to_string()))?;
    }
}

#[async_trait::async_trait]
impl TransportServer for TcpTransportServer {
    async fn start(&self, handlers: Arc<HandlerRegistry>, config: &ServerConfig) -> transport::Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(running) = running.as_ref() {
            return Ok(running.local_addr);
        }

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| Error::BindFailed(format!("{}: {}", config.bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::BindFailed(e.to_string()))?;

        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(Self::accept_loop(
            listener,
            handlers,
            shutdown.clone(),
            config.max_frame_size,
        ));

        tracing::info!(%local_addr, "server listening");
        *running = Some(Running { local_addr, shutdown, accept_task });
        if let Ok(mut addr) = self.local_addr.lock() {
            *addr = Some(local_addr);
        }
        Ok(local_addr)
    }

    async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.shutdown.cancel();
        let _ = running.accept_task.await;
        if let Ok(mut addr) = self.local_addr.lock() {
            *addr = None;
        }
        tracing::info!(local_addr = %running.local_addr, "server stopped");
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }
}
