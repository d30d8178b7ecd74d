//! Application Directories using `dirs`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    log::strip_path,
    storage::PathProvider,
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Desktop path provider
///
/// Resolves the platform's cache, documents and data directories through
/// `dirs` and namespaces the application-owned ones under `app_name`:
///
/// | Location | Linux | macOS |
/// |----------|-------|-------|
/// | temporary | `~/.cache/<app>` | `~/Library/Caches/<app>` |
/// | documents | `~/Documents` | `~/Documents` |
/// | support | `~/.local/share/<app>` | `~/Library/Application Support/<app>` |
///
/// Desktop has no external storage; [`PathProvider::external_storage_directory`]
/// keeps its default of `None`.
#[derive(Debug, Clone)]
pub struct DesktopPathProvider {
    temporary: PathBuf,
    documents: Option<PathBuf>,
    support: PathBuf,
}

impl DesktopPathProvider {
    pub fn new(app_name: &str) -> Self {
        let temporary = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(app_name);

        let support = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join(app_name);

        Self {
            temporary,
            documents: dirs::document_dir(),
            support,
        }
    }

    /// Use explicit directories (tests, sandboxed hosts)
    pub fn with_directories(temporary: PathBuf, documents: Option<PathBuf>, support: PathBuf) -> Self {
        Self {
            temporary,
            documents,
            support,
        }
    }

    /// Support directory path, without creating it
    pub fn support_path(&self) -> &Path {
        &self.support
    }

    async fn ensure(dir: &Path) -> Result<PathBuf> {
        if !fs::try_exists(dir).await.map_err(BridgeError::Io)? {
            fs::create_dir_all(dir).await.map_err(BridgeError::Io)?;
            let path = dir.to_string_lossy();
            debug!(dir = %strip_path(&path), "Created directory");
        }
        Ok(dir.to_path_buf())
    }
}

#[async_trait]
impl PathProvider for DesktopPathProvider {
    async fn temporary_directory(&self) -> Result<Option<PathBuf>> {
        Self::ensure(&self.temporary).await.map(Some)
    }

    async fn documents_directory(&self) -> Result<Option<PathBuf>> {
        match &self.documents {
            Some(dir) => Self::ensure(dir).await.map(Some),
            None => Ok(None),
        }
    }

    async fn support_directory(&self) -> Result<Option<PathBuf>> {
        Self::ensure(&self.support).await.map(Some)
    }
}
