use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ArtifactEntry, ArtifactError, ArtifactName, ArtifactStore, Result};

/// In-memory artifact store for tests.
///
/// `path_of` returns a relative path under a virtual root; nothing is written to disk.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    root: PathBuf,
    entries: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::with_root("memory")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of distinct names currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> ArtifactError {
    ArtifactError::Io(std::io::Error::other("artifact store lock poisoned"))
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn write(&self, name: &ArtifactName, data: &[u8]) -> Result<PathBuf> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.insert(name.file_name().to_string(), (data.to_vec(), Utc::now()));
        Ok(self.path_of(name))
    }

    async fn read(&self, name: &ArtifactName) -> Result<Vec<u8>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        entries
            .get(name.file_name())
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }

    async fn exists(&self, name: &ArtifactName) -> Result<bool> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.contains_key(name.file_name()))
    }

    async fn list(&self) -> Result<Vec<ArtifactEntry>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries
            .iter()
            .map(|(name, (data, created_at))| ArtifactEntry {
                name: name.clone(),
                size: data.len() as u64,
                created_at: *created_at,
            })
            .collect())
    }

    fn path_of(&self, name: &ArtifactName) -> PathBuf {
        self.root.join(name.file_name())
    }
}
