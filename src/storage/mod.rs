use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::artifact::{ArtifactId, ArtifactIdError, IdMinter};
use thiserror::Error;

mod memory;

pub use memory::MemoryArtifactStore;

const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {id}")]
    NotFound { id: ArtifactId },
    #[error("cannot mint artifact id: {0}")]
    Id(#[from] ArtifactIdError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Default, Clone)]
pub struct PruneReport {
    pub removed_files: usize,
}

/// Durable, append-only storage of immutable capture artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Persists `bytes` under a freshly minted id. The artifact is durable
    /// once this returns `Ok`.
    fn put(&self, bytes: &[u8]) -> StoreResult<ArtifactId>;
    fn get(&self, id: &ArtifactId) -> StoreResult<Vec<u8>>;
    /// Every stored id, ascending.
    fn list_all(&self) -> StoreResult<Vec<ArtifactId>>;
}

/// Flat directory of `<id>.png` files.
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
    minter: Mutex<IdMinter>,
}

impl FsArtifactStore {
    /// Creates the directory if needed, clears crash leftovers and seeds the
    /// id minter from the newest stored artifact.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let report = prune_stale_temp_files(&root)?;
        if report.removed_files > 0 {
            tracing::info!(
                root = %root.display(),
                removed = report.removed_files,
                "removed unfinished artifact writes"
            );
        }

        let existing = list_artifacts(&root)?;
        tracing::debug!(
            root = %root.display(),
            count = existing.len(),
            "opened artifact store"
        );
        Ok(Self {
            minter: Mutex::new(IdMinter::seeded(existing.last())),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(id.file_name())
    }

    fn temp_path_for(&self, id: &ArtifactId) -> PathBuf {
        self.root
            .join(format!("{TEMP_PREFIX}{}{TEMP_SUFFIX}", id.file_name()))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, bytes: &[u8]) -> StoreResult<ArtifactId> {
        // Held across the write so puts are single-writer and ids land in order.
        let mut minter = self.minter.lock().unwrap_or_else(|err| err.into_inner());
        let id = minter.mint()?;
        let temp = self.temp_path_for(&id);
        let target = self.path_for(&id);

        if let Err(err) = write_durably(&temp, &target, bytes) {
            if let Err(cleanup_err) = fs::remove_file(&temp) {
                if cleanup_err.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %temp.display(),
                        ?cleanup_err,
                        "failed to remove unfinished artifact write"
                    );
                }
            }
            return Err(StoreError::Io(err));
        }
        sync_committed(&self.root, &id);

        tracing::debug!(id = %id, size = bytes.len(), "persisted artifact");
        Ok(id)
    }

    fn get(&self, id: &ArtifactId) -> StoreResult<Vec<u8>> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound { id: id.clone() })
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn list_all(&self) -> StoreResult<Vec<ArtifactId>> {
        list_artifacts(&self.root)
    }
}

fn write_durably(temp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp, target)
}

/// The rename is the commit point: once it lands the artifact is listed, so
/// a failed directory sync is logged and `put` still succeeds.
fn sync_committed(root: &Path, id: &ArtifactId) -> bool {
    match sync_directory(root) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(
                root = %root.display(),
                id = %id,
                ?err,
                "artifact committed but directory sync failed"
            );
            false
        }
    }
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn list_artifacts(root: &Path) -> StoreResult<Vec<ArtifactId>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(id) = entry.file_name().to_str().and_then(ArtifactId::from_file_name) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

fn prune_stale_temp_files(root: &Path) -> StoreResult<PruneReport> {
    let mut report = PruneReport::default();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        if path
            .file_name()
            .and_then(|name| name.to_str())
            .is_none_or(|name| !(name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)))
        {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                report.removed_files += 1;
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    ?err,
                    "failed to remove stale artifact temp file"
                );
            }
        }
    }

    Ok(report)
}
