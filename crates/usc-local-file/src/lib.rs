#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-local-file** – Platform file handle wrapper. Two
//! [`LocalFileBacking`] implementations: [`NativeFileBacking`], which gets
//! real atomic-replace semantics from the filesystem, and
//! [`DownloadOnlyBacking`], which models a platform that cannot grant
//! durable local file access — `write` still "succeeds" (as a one-shot
//! download) but `read` always fails with
//! [`usc_types::CoreError::NotSupported`], which is exactly the signal the
//! Universe Manager uses to force `sourceOfTruth = git`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use usc_types::{CoreError, Result};
use uuid::Uuid;

/// An opaque reference to a local file, previously obtained from
/// [`LocalFileBacking::pick`].
///
/// Serializes to the string carried in [`usc_types::LocalFile::handle`] so
/// it can be persisted in the registry and resolved back to a live handle
/// on the same platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handle {
    /// A real path this process can read and atomically overwrite.
    Native(PathBuf),
    /// A download-only placeholder; `read` is never supported for these.
    DownloadOnly {
        /// The file name the one-shot download was offered under.
        name: String,
    },
}

impl Handle {
    /// Serialize this handle to the opaque token stored in
    /// [`usc_types::LocalFile::handle`].
    pub fn token(&self) -> String {
        match self {
            Handle::Native(path) => format!("native:{}", path.display()),
            Handle::DownloadOnly { name } => format!("download:{name}"),
        }
    }

    /// Parse a handle back out of its stored token.
    pub fn from_token(token: &str) -> Result<Self> {
        if let Some(path) = token.strip_prefix("native:") {
            Ok(Handle::Native(PathBuf::from(path)))
        } else if let Some(name) = token.strip_prefix("download:") {
            Ok(Handle::DownloadOnly { name: name.to_string() })
        } else {
            Err(CoreError::BadRequest(format!("'{token}' is not a recognized file handle")))
        }
    }
}

/// Capability to pick, write, and read a local file.
#[async_trait]
pub trait LocalFileBacking: Send + Sync {
    /// Obtain a handle for `name_hint`, either a real writable path or a
    /// download-only placeholder, depending on what the platform grants.
    async fn pick(&self, name_hint: &str) -> Result<Handle>;

    /// Replace the contents addressed by `handle` with `bytes`.
    ///
    /// Atomic where the backing supports it; always succeeds for a
    /// download-only handle (the "write" is the one-shot download itself).
    async fn write(&self, handle: &Handle, bytes: Vec<u8>) -> Result<()>;

    /// Read the current contents addressed by `handle`.
    ///
    /// Fails with [`CoreError::NotSupported`] for a download-only handle —
    /// there is nothing durable to read back.
    async fn read(&self, handle: &Handle) -> Result<Vec<u8>>;

    /// Whether this backing can durably read back what it writes. `false`
    /// tells a caller up front that `localFile.enabled` cannot be honored on
    /// this platform, without having to round-trip through `pick`/`read`
    /// first.
    fn is_durable(&self) -> bool {
        true
    }
}

/// [`LocalFileBacking`] backed by real files under a base directory, using
/// write-temp-then-rename for atomic replacement (the same crash-safety
/// pattern the durable store drivers use for their own writes).
pub struct NativeFileBacking {
    base_dir: PathBuf,
}

impl NativeFileBacking {
    /// Root directory every picked handle is resolved relative to.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn resolve(&self, name_hint: &str) -> PathBuf {
        self.base_dir.join(name_hint)
    }
}

#[async_trait]
impl LocalFileBacking for NativeFileBacking {
    async fn pick(&self, name_hint: &str) -> Result<Handle> {
        let path = self.resolve(name_hint);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Server(format!("could not create '{}': {e}", parent.display())))?;
        }
        Ok(Handle::Native(path))
    }

    async fn write(&self, handle: &Handle, bytes: Vec<u8>) -> Result<()> {
        let Handle::Native(path) = handle else {
            return Err(CoreError::NotSupported("write on a download-only handle always succeeds without a durable write".into()));
        };

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = parent.join(format!(".{}.tmp-{}", file_name(path), Uuid::new_v4()));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| CoreError::Server(format!("could not create temp file: {e}")))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| CoreError::Server(format!("could not write temp file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| CoreError::Server(format!("could not fsync temp file: {e}")))?;
        drop(file);

        fs::rename(&temp_path, path).await.map_err(|e| {
            warn!(error = %e, path = %path.display(), "atomic rename failed, write not durable");
            CoreError::Server(format!("could not rename into place: {e}"))
        })?;

        debug!(path = %path.display(), bytes = bytes.len(), "wrote local file atomically");
        Ok(())
    }

    async fn read(&self, handle: &Handle) -> Result<Vec<u8>> {
        let Handle::Native(path) = handle else {
            return Err(CoreError::NotSupported("download-only handles cannot be read back".into()));
        };
        fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.display().to_string()),
            _ => CoreError::Server(format!("could not read '{}': {e}", path.display())),
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

/// [`LocalFileBacking`] for platforms that cannot grant durable local file
/// access. `pick` always returns a download-only handle; `write` succeeds
/// (modeling the one-shot download); `read` always fails with
/// [`CoreError::NotSupported`].
#[derive(Debug, Default)]
pub struct DownloadOnlyBacking;

#[async_trait]
impl LocalFileBacking for DownloadOnlyBacking {
    async fn pick(&self, name_hint: &str) -> Result<Handle> {
        Ok(Handle::DownloadOnly { name: name_hint.to_string() })
    }

    async fn write(&self, handle: &Handle, bytes: Vec<u8>) -> Result<()> {
        match handle {
            Handle::DownloadOnly { name } => {
                debug!(name, bytes = bytes.len(), "offered one-shot download");
                Ok(())
            }
            Handle::Native(_) => Err(CoreError::NotSupported(
                "this platform has no durable local file access".into(),
            )),
        }
    }

    async fn read(&self, _handle: &Handle) -> Result<Vec<u8>> {
        Err(CoreError::NotSupported(
            "this platform has no durable local file access".into(),
        ))
    }

    fn is_durable(&self) -> bool {
        false
    }
}
