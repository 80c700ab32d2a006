//! Server-side request handlers, keyed by command type.

use std::collections::HashMap;
use std::sync::Arc;

use microrpc::Command;

use crate::loader::ServiceLoader;

/// A server-side callable bound to one command type.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// The command type this handler answers.
    fn kind(&self) -> i32;

    /// Handles a request. `None` means no response is written.
    async fn handle(&self, request: Command) -> Option<Command>;
}

/// Immutable map from command type to handler.
pub struct HandlerRegistry {
    handlers: HashMap<i32, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    /// Builds the registry. A later handler for an already-seen type replaces the earlier one.
    pub fn new(handlers: impl IntoIterator<Item = Arc<dyn RequestHandler>>) -> Self {
        let mut map: HashMap<i32, Arc<dyn RequestHandler>> = HashMap::new();
        for handler in handlers {
            let kind = handler.kind();
            if map.insert(kind, handler).is_some() {
                tracing::warn!(kind, "duplicate request handler, replacing earlier registration");
            }
        }
        Self { handlers: map }
    }

    /// Builds the registry from every `RequestHandler` registered with `loader`.
    pub fn from_loader(loader: &ServiceLoader) -> Self {
        Self::new(loader.load_all::<dyn RequestHandler>())
    }

    pub fn get(&self, kind: i32) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
