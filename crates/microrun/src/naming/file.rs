//! A name service persisted to a single local file as a `Metadata` blob.
//!
//! Each registration reads the whole file, merges, and rewrites it. All instances in this
//! process that point at the same path share one lock, held by lookups and registrations
//! alike. The file is replaced by renaming a fully written sibling, so readers never see a
//! truncated blob. Writers in other processes are not coordinated.

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use dashmap::DashMap;
use micropack::Metadata;
use tokio::sync::Mutex;
use url::Url;

use crate::endpoint::Endpoint;
use crate::naming::Error;
use crate::naming::NameService;
use crate::naming::Result;
use crate::naming::pick;

pub const FILE_SCHEME: &str = "file";

/// The process-wide lock guarding `path`.
fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<DashMap<PathBuf, Arc<Mutex<()>>>> = OnceLock::new();
    LOCKS
        .get_or_init(DashMap::new)
        .entry(path.to_path_buf())
        .or_default()
        .value()
        .clone()
}

struct Location {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

#[derive(Default)]
pub struct FileNameService {
    location: std::sync::RwLock<Option<Arc<Location>>>,
}

impl FileNameService {
    pub fn new() -> Self {
        Self::default()
    }

    fn location(&self) -> Result<Arc<Location>> {
        let location = self.location.read().unwrap_or_else(|e| e.into_inner());
        location.clone().ok_or(Error::NotConnected)
    }
}

/// Reads the directory at `path`. A missing or empty file is an empty directory.
async fn read_metadata(path: &Path) -> Result<Metadata> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Metadata::new()),
        Err(e) => return Err(e.into()),
    };
    if bytes.is_empty() {
        return Ok(Metadata::new());
    }
    Ok(micropack::parse(&bytes)?)
}

/// Replaces the file at `path` with `metadata` via write-then-rename.
async fn write_metadata(path: &Path, metadata: &Metadata) -> Result<()> {
    let bytes = micropack::serialize(metadata)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidUri(path.display().to_string()))?;
    let mut staged = file_name.to_os_string();
    staged.push(format!(".{}.tmp", std::process::id()));
    let staged = path.with_file_name(staged);

    tokio::fs::write(&staged, bytes).await?;
    if let Err(e) = tokio::fs::rename(&staged, path).await {
        let _ = tokio::fs::remove_file(&staged).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait::async_trait]
impl NameService for FileNameService {
    fn supported_schemes(&self) -> &'static [&'static str] {
        &[FILE_SCHEME]
    }

    async fn connect(&self, uri: &Url) -> Result<()> {
        let path = uri
            .to_file_path()
            .map_err(|_| Error::InvalidUri(uri.to_string()))?;
        let lock = path_lock(&path);
        let mut location = self.location.write().unwrap_or_else(|e| e.into_inner());
        *location = Some(Arc::new(Location { path, lock }));
        Ok(())
    }

    async fn register_service(&self, name: &str, endpoint: &Endpoint) -> Result<()> {
        let location = self.location()?;
        let _guard = location.lock.lock().await;

        let mut metadata = read_metadata(&location.path).await?;
        if !metadata.add(name, &endpoint.to_string()) {
            tracing::debug!(service = name, %endpoint, "endpoint already registered");
            return Ok(());
        }

        write_metadata(&location.path, &metadata).await?;
        tracing::info!(service = name, %endpoint, path = %location.path.display(), "registered endpoint");
        Ok(())
    }

    async fn lookup_service(&self, name: &str) -> Result<Option<Endpoint>> {
        let location = self.location()?;
        let metadata = {
            let _guard = location.lock.lock().await;
            read_metadata(&location.path).await?
        };
        pick(metadata.get(name).unwrap_or_default())
    }
}
