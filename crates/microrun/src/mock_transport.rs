//! Mock transports for testing.
//!
//! These are used internally by the test suite and are not part of the public API.

use std::sync::Arc;
use std::sync::Mutex;

use microrpc::Command;

use crate::handler::HandlerRegistry;
use crate::transport;
use crate::transport::Transport;

/// Routes every request straight into a handler registry, skipping the network.
pub struct LoopbackTransport {
    handlers: Arc<HandlerRegistry>,
}

impl LoopbackTransport {
    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, request: Command) -> transport::Result<Command> {
        let kind = request.kind();
        let handler = self
            .handlers
            .get(kind)
            .ok_or(transport::Error::UnknownHandlerType(kind))?;
        handler
            .handle(request)
            .await
            .ok_or_else(|| transport::Error::ConnectionLost("handler produced no response".into()))
    }
}

/// Answers each request with a closure and records what it saw.
pub struct ScriptedTransport<F>
where
    F: Fn(&Command) -> transport::Result<Command> + Send + Sync + 'static,
{
    handler: F,
    seen: Mutex<Vec<Command>>,
}

impl<F> ScriptedTransport<F>
where
    F: Fn(&Command) -> transport::Result<Command> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Command> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl<F> Transport for ScriptedTransport<F>
where
    F: Fn(&Command) -> transport::Result<Command> + Send + Sync + 'static,
{
    async fn send(&self, request: Command) -> transport::Result<Command> {
        self.seen.lock().unwrap().push(request.clone());
        (self.handler)(&request)
    }
}
