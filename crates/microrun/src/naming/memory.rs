//! A process-local name service. Instances connected to the same `memory://<name>` URI
//! share one directory.

use std::sync::Arc;
use std::sync::OnceLock;

use dashmap::DashMap;
use micropack::Metadata;
use tokio::sync::RwLock;
use url::Url;

use crate::endpoint::Endpoint;
use crate::naming::Error;
use crate::naming::NameService;
use crate::naming::Result;
use crate::naming::pick;

pub const MEMORY_SCHEME: &str = "memory";

type Directory = Arc<RwLock<Metadata>>;

fn directories() -> &'static DashMap<String, Directory> {
    static DIRECTORIES: OnceLock<DashMap<String, Directory>> = OnceLock::new();
    DIRECTORIES.get_or_init(DashMap::new)
}

#[derive(Default)]
pub struct MemoryNameService {
    directory: RwLock<Option<Directory>>,
}

impl MemoryNameService {
    pub fn new() -> Self {
        Self::default()
    }

    async fn directory(&self) -> Result<Directory> {
        self.directory.read().await.clone().ok_or(Error::NotConnected)
    }
}

#[async_trait::async_trait]
impl NameService for MemoryNameService {
    fn supported_schemes(&self) -> &'static [&'static str] {
        &[MEMORY_SCHEME]
    }

    async fn connect(&self, uri: &Url) -> Result<()> {
        let key = format!("{}{}", uri.host_str().unwrap_or_default(), uri.path());
        let directory = directories().entry(key).or_default().value().clone();
        *self.directory.write().await = Some(directory);
        Ok(())
    }

    async fn register_service(&self, name: &str, endpoint: &Endpoint) -> Result<()> {
        let directory = self.directory().await?;
        if directory.write().await.add(name, &endpoint.to_string()) {
            tracing::info!(service = name, %endpoint, "registered endpoint");
        }
        Ok(())
    }

    async fn lookup_service(&self, name: &str) -> Result<Option<Endpoint>> {
        let directory = self.directory().await?;
        let metadata = directory.read().await;
        pick(metadata.get(name).unwrap_or_default())
    }
}
