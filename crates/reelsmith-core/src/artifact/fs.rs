use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use super::{ArtifactEntry, ArtifactError, ArtifactName, ArtifactStore, Result};

/// Filesystem-backed artifact store: one flat directory per run.
///
/// Layout: `<root>/<canonical file name>`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// A store for one run's namespace: `<root>/<run_id>`.
    pub fn scoped(&self, run_id: &str) -> Result<Self> {
        ArtifactName::custom(run_id)?;
        Self::new(self.root.join(run_id))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    // Write to a temp file in the same directory, then rename over the target.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn entry_for(path: &Path) -> Option<ArtifactEntry> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    let created = meta.created().or_else(|_| meta.modified()).ok()?;
    Some(ArtifactEntry {
        name: path.file_name()?.to_string_lossy().into_owned(),
        size: meta.len(),
        created_at: DateTime::<Utc>::from(created),
    })
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write(&self, name: &ArtifactName, data: &[u8]) -> Result<PathBuf> {
        let dir = self.root.clone();
        let path = self.path_of(name);
        let target = path.clone();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&dir)?;
            write_atomic(&dir, &target, &data)
        })
        .await
        .map_err(|e| ArtifactError::Io(std::io::Error::other(e)))??;
        Ok(path)
    }

    async fn read(&self, name: &ArtifactName) -> Result<Vec<u8>> {
        let path = self.path_of(name);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(name.to_string())
            } else {
                ArtifactError::Io(e)
            }
        })
    }

    async fn exists(&self, name: &ArtifactName) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_of(name)).await?)
    }

    async fn list(&self) -> Result<Vec<ArtifactEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            if let Some(entry) = entry_for(&item.path()) {
                if !entry.name.starts_with('.') {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn path_of(&self, name: &ArtifactName) -> PathBuf {
        self.root.join(name.file_name())
    }
}
