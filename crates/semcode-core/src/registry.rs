//! Durable record of which repositories are ingested.
//!
//! The registry is a single JSON object keyed by repository name. Every
//! mutation rewrites the whole file through a temp file in the same directory
//! followed by an atomic rename, so readers never observe a torn write.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    /// Remote URL or local path, as submitted.
    pub source: String,
    pub is_remote: bool,
    pub local_path: PathBuf,
    pub files_processed: usize,
    #[serde(default)]
    pub language_histogram: BTreeMap<String, usize>,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub embedding_model: String,
    /// `None` when no file has been embedded yet.
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,
    pub processed_at: DateTime<Utc>,
}

pub struct RepoRegistry {
    path: PathBuf,
    records: RwLock<BTreeMap<String, RepositoryRecord>>,
    // Serializes writers; the map is swapped only after the file is renamed.
    write_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for RepoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoRegistry")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RepoRegistry {
    /// Open the registry at `path`. A missing or empty file is an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Corrupt`] if the file exists but is not a valid
    /// registry, or an I/O error if it cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| {
                RegistryError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), repos = records.len(), "opened registry");
        Ok(Self {
            path,
            records: RwLock::new(records),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<RepositoryRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All records, ordered by name.
    #[must_use]
    pub fn list_all(&self) -> Vec<RepositoryRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Insert or replace the record for `record.name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry file cannot be rewritten. The in-memory
    /// view is unchanged in that case.
    pub async fn put(&self, record: RepositoryRecord) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.snapshot();
        let name = record.name.clone();
        next.insert(name.clone(), record);
        self.commit(next).await?;
        tracing::debug!(repo = %name, "registry record written");
        Ok(())
    }

    /// Remove the record for `name`. Returns whether a record was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry file cannot be rewritten.
    pub async fn delete(&self, name: &str) -> Result<bool, RegistryError> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.snapshot();
        if next.remove(name).is_none() {
            return Ok(false);
        }
        self.commit(next).await?;
        tracing::debug!(repo = %name, "registry record removed");
        Ok(true)
    }

    fn snapshot(&self) -> BTreeMap<String, RepositoryRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn commit(&self, next: BTreeMap<String, RepositoryRecord>) -> Result<(), RegistryError> {
        let path = self.path.clone();
        let next = tokio::task::spawn_blocking(move || {
            write_json_atomic(&path, &next).map(|()| next)
        })
        .await
        .map_err(std::io::Error::other)??;
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }
}

/// Serialize `value` to `path` via a synced temp file and an atomic rename.
///
/// # Errors
///
/// Returns an error if serialization, writing, syncing or renaming fails.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
