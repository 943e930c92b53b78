//! Access to the binary dataset, model and index files.
//!
//! The binary formats themselves are opaque to this crate; workers
//! write them and publish derived counts in a `<file>.stats.json`
//! sidecar next to each triple store they produce. This module only
//! creates empty backing files, reads sidecars and hands out search
//! index handles.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

/// Errors that can occur while touching dataset binaries.
#[derive(Debug, Error)]
pub enum FilesError {
    /// The referenced binary does not exist.
    #[error("Binary file '{0}' not found")]
    Missing(String),

    /// The referenced binary exists but holds no data.
    #[error("Binary file '{0}' is empty")]
    Empty(String),

    /// A stats sidecar exists but could not be parsed.
    #[error("Malformed stats sidecar for '{path}': {source}")]
    MalformedSidecar {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counts derived from a binary triple store.
///
/// Never persisted by this crate; a missing sidecar reads as all
/// zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryStats {
    #[serde(default)]
    pub entities: u64,
    #[serde(default)]
    pub relations: u64,
    #[serde(default)]
    pub triples: u64,
}

/// Opaque handle to a loaded search index.
///
/// The index data structure lives with the workers; this handle only
/// proves the file is present and records how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchIndex {
    /// Resolved filesystem path of the index file.
    pub path: String,
    /// Embedding vector width the index was built for.
    pub embedding_size: u32,
    /// Index size on disk.
    pub size_bytes: u64,
}

/// Filesystem seam for dataset binaries.
///
/// All names are relative to one binaries directory; the lifecycle
/// controller never builds paths itself.
#[async_trait]
pub trait DatasetFiles: Send + Sync {
    /// Creates the empty backing file for a fresh dataset.
    async fn create_empty(&self, name: &str) -> Result<(), FilesError>;

    /// Derives entity/relation/triple counts for a triple store.
    async fn load_metadata(&self, name: &str) -> Result<BinaryStats, FilesError>;

    /// Loads a search index handle, verifying the file is usable.
    async fn load_search_index(
        &self,
        name: &str,
        embedding_size: u32,
    ) -> Result<SearchIndex, FilesError>;
}

/// [`DatasetFiles`] rooted at a local directory.
pub struct LocalDatasetFiles {
    root: PathBuf,
}

impl LocalDatasetFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn sidecar(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.stats.json", name))
    }
}

#[async_trait]
impl DatasetFiles for LocalDatasetFiles {
    async fn create_empty(&self, name: &str) -> Result<(), FilesError> {
        fs::create_dir_all(&self.root).await?;
        fs::write(self.resolve(name), b"").await?;
        tracing::debug!(name = name, "Empty dataset binary created");
        Ok(())
    }

    async fn load_metadata(&self, name: &str) -> Result<BinaryStats, FilesError> {
        let sidecar = self.sidecar(name);
        match fs::read_to_string(&sidecar).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| FilesError::MalformedSidecar {
                    path: sidecar.display().to_string(),
                    source,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BinaryStats::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_search_index(
        &self,
        name: &str,
        embedding_size: u32,
    ) -> Result<SearchIndex, FilesError> {
        if name.is_empty() {
            return Err(FilesError::Missing(name.to_string()));
        }

        let path = self.resolve(name);
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FilesError::Missing(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if meta.len() == 0 {
            return Err(FilesError::Empty(name.to_string()));
        }

        Ok(SearchIndex {
            path: path.display().to_string(),
            embedding_size,
            size_bytes: meta.len(),
        })
    }
}
