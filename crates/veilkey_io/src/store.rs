use crate::error::{Result, StorageError};
use crate::handle::{ArtifactKind, Handle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use veilkey_core::io::write_atomic;

/// Directories backing each artifact kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRoots {
    pub uploads: PathBuf,
    pub keys: PathBuf,
    pub recovered: PathBuf,
}

impl StoreRoots {
    /// The conventional `uploads/`, `keys/` and `recovered/` layout under `base`.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            uploads: base.join("uploads"),
            keys: base.join("keys"),
            recovered: base.join("recovered"),
        }
    }
}

/// A freshly allocated handle and the path its file should be written to.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub handle: Handle,
    pub path: PathBuf,
}

/// File storage confined to one allow-listed root per artifact kind.
///
/// The store holds no state besides the canonical root paths, so any number
/// of threads or processes may share the same directories.
#[derive(Debug, Clone)]
pub struct ScopedStore {
    uploads: PathBuf,
    keys: PathBuf,
    recovered: PathBuf,
}

impl ScopedStore {
    /// Creates the root directories if needed and pins their canonical paths.
    pub fn open(roots: &StoreRoots) -> Result<Self> {
        let canonical = |dir: &Path| -> Result<PathBuf> {
            fs::create_dir_all(dir)?;
            Ok(fs::canonicalize(dir)?)
        };

        let store = Self {
            uploads: canonical(&roots.uploads)?,
            keys: canonical(&roots.keys)?,
            recovered: canonical(&roots.recovered)?,
        };
        debug!(
            uploads = %store.uploads.display(),
            keys = %store.keys.display(),
            recovered = %store.recovered.display(),
            "opened artifact store"
        );
        Ok(store)
    }

    pub fn root(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Upload => &self.uploads,
            ArtifactKind::Key => &self.keys,
            ArtifactKind::Recovered => &self.recovered,
        }
    }

    /// Reserves a new handle. Nothing is written until the caller writes to
    /// `Allocation::path`.
    pub fn allocate(&self, kind: ArtifactKind) -> Allocation {
        let handle = Handle::generate(kind);
        let path = self.root(kind).join(handle.file_name());
        Allocation { handle, path }
    }

    /// Stores `bytes` under a new handle.
    pub fn write(&self, kind: ArtifactKind, bytes: &[u8]) -> Result<Handle> {
        let Allocation { handle, path } = self.allocate(kind);
        write_atomic(&path, bytes)?;
        debug!(%handle, size = bytes.len(), "stored artifact");
        Ok(handle)
    }

    /// Maps a handle to the existing regular file it names.
    pub fn resolve(&self, handle: &Handle) -> Result<PathBuf> {
        let root = self.root(handle.kind());
        let candidate = root.join(handle.file_name());

        let resolved = match fs::canonicalize(&candidate) {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(handle.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if !is_descendant(root, &resolved) {
            warn!(%handle, path = %resolved.display(), "artifact escapes its root");
            return Err(StorageError::AccessDenied(handle.to_string()));
        }
        if !resolved.is_file() {
            return Err(StorageError::NotFound(handle.to_string()));
        }

        Ok(resolved)
    }

    /// Parses an externally supplied handle string and resolves it, refusing
    /// kinds that are not meant to leave the server.
    pub fn resolve_download(&self, text: &str) -> Result<(Handle, PathBuf)> {
        let handle: Handle = text.parse().inspect_err(|_| {
            warn!(requested = %text.escape_debug(), "rejected download handle");
        })?;

        if !handle.kind().is_downloadable() {
            warn!(%handle, "download of internal artifact refused");
            return Err(StorageError::NotDownloadable(handle.kind()));
        }

        let path = self.resolve(&handle)?;
        Ok((handle, path))
    }
}

/// `true` if `candidate` lies strictly inside `root`. Comparison is by path
/// component, so `/data/keys-old` is not inside `/data/keys`.
pub(crate) fn is_descendant(root: &Path, candidate: &Path) -> bool {
    candidate != root && candidate.starts_with(root)
}
