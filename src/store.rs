//! Filesystem collaborator: where files live and how user ids are minted.
//!
//! A [`FileStore`] is rooted at two directories. Shared content lives
//! directly under the Dlc root; each user owns `UserRoot/<user id>/`. The
//! numeric directory names under the User root double as the registry of
//! allocated user ids.

use std::{
    ffi::OsStr,
    io,
    path::{Component, Path, PathBuf},
};

use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::{debug, info};

use crate::packet::FileKind;

/// Subdirectories created under the Dlc root by [`FileStore::bootstrap`].
pub const DLC_SUBDIRS: [&str; 4] = ["bg", "ecg", "scg", "scripts"];

/// Errors raised by [`FileStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The name is not a single plain path component.
    #[error("invalid file name: {name:?}")]
    InvalidName {
        /// Rejected name.
        name: String,
    },
    /// The file kind does not map to a storage area.
    #[error("file kind {0:?} has no storage area")]
    UnsupportedKind(FileKind),
    /// The file or its directory does not exist.
    #[error("not found: {}", path.display())]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },
    /// The file is larger than a `FileInfo` can describe.
    #[error("file is too large to describe: {len} bytes")]
    TooLarge {
        /// File length in bytes.
        len: u64,
    },
    /// Every user id is taken or the registry could not be read.
    #[error("no more user ids available")]
    NoMoreIds,
    /// Any other filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Resolves file locations and allocates user ids.
#[derive(Debug)]
pub struct FileStore {
    dlc_root: PathBuf,
    user_root: PathBuf,
    allocation: Mutex<()>,
}

impl FileStore {
    /// Create a store over existing directories without touching the disk.
    pub fn new(dlc_root: impl Into<PathBuf>, user_root: impl Into<PathBuf>) -> Self {
        Self {
            dlc_root: dlc_root.into(),
            user_root: user_root.into(),
            allocation: Mutex::new(()),
        }
    }

    /// Create a store after checking that both roots are directories.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] naming the first missing root.
    pub async fn open(
        dlc_root: impl Into<PathBuf>,
        user_root: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let store = Self::new(dlc_root, user_root);
        for root in [&store.dlc_root, &store.user_root] {
            if !is_dir(root).await {
                return Err(StoreError::NotFound { path: root.clone() });
            }
        }
        Ok(store)
    }

    /// Create the standard layout under `base` and open a store over it.
    ///
    /// Creates `base/dlc` with its content subdirectories and `base/user/0`
    /// when missing. Existing directories are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if a directory cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use filewire::store::FileStore;
    ///
    /// # async fn demo() -> std::io::Result<()> {
    /// let store = FileStore::bootstrap("/srv/filewire").await?;
    /// assert!(store.dlc_root().ends_with("dlc"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bootstrap(base: impl AsRef<Path>) -> io::Result<Self> {
        let base = base.as_ref();
        let dlc_root = base.join("dlc");
        let user_root = base.join("user");
        if !is_dir(&dlc_root).await {
            info!(path = %dlc_root.display(), "creating dlc directory");
        }
        for sub in DLC_SUBDIRS {
            fs::create_dir_all(dlc_root.join(sub)).await?;
        }
        if !is_dir(&user_root).await {
            info!(path = %user_root.display(), "creating user directory");
        }
        fs::create_dir_all(user_root.join("0")).await?;
        Ok(Self::new(dlc_root, user_root))
    }

    /// Root of shared content.
    #[must_use]
    pub fn dlc_root(&self) -> &Path { &self.dlc_root }

    /// Root of per-user directories.
    #[must_use]
    pub fn user_root(&self) -> &Path { &self.user_root }

    /// Directory holding files of `kind` for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedKind`] for kinds without a storage
    /// area.
    pub fn directory(&self, kind: FileKind, user_id: u32) -> Result<PathBuf, StoreError> {
        match kind {
            FileKind::Dlc => Ok(self.dlc_root.clone()),
            FileKind::User => Ok(self.user_root.join(user_id.to_string())),
            other => Err(StoreError::UnsupportedKind(other)),
        }
    }

    /// Full path of `name` of `kind` for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] when `name` is not a single plain
    /// component and [`StoreError::UnsupportedKind`] for kinds without a
    /// storage area.
    pub fn resolve(&self, kind: FileKind, user_id: u32, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.directory(kind, user_id)?.join(name))
    }

    /// Open a file for streaming and report its length.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the file does not exist,
    /// [`StoreError::TooLarge`] when its length does not fit in a `u32`, and
    /// any error of [`resolve`](Self::resolve).
    pub async fn open_file(
        &self,
        kind: FileKind,
        user_id: u32,
        name: &str,
    ) -> Result<(fs::File, u32), StoreError> {
        let path = self.resolve(kind, user_id, name)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or(e, &path))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound { path });
        }
        let len = u32::try_from(metadata.len()).map_err(|_| StoreError::TooLarge {
            len: metadata.len(),
        })?;
        debug!(path = %path.display(), len, "opened file for download");
        Ok((file, len))
    }

    /// Write `data` to `name`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the target directory does not
    /// exist, and any error of [`resolve`](Self::resolve) or the write.
    pub async fn save(
        &self,
        kind: FileKind,
        user_id: u32,
        name: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let path = self.resolve(kind, user_id, name)?;
        let directory = self.directory(kind, user_id)?;
        if !is_dir(&directory).await {
            return Err(StoreError::NotFound { path: directory });
        }
        fs::write(&path, data).await?;
        debug!(path = %path.display(), len = data.len(), "saved upload");
        Ok(())
    }

    /// Allocate a fresh user id and create its directory.
    ///
    /// The new id is one more than the largest numeric directory name under
    /// the User root; other entries are ignored. Allocation is serialised
    /// within this store and uses exclusive directory creation, so ids are
    /// unique even if another process creates directories concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoMoreIds`] when the User root cannot be read or
    /// the id space is exhausted, and [`StoreError::Io`] if the directory
    /// cannot be created.
    pub async fn allocate_user_id(&self) -> Result<u32, StoreError> {
        let _guard = self.allocation.lock().await;
        let mut candidate = self
            .highest_user_id()
            .await?
            .checked_add(1)
            .ok_or(StoreError::NoMoreIds)?;
        loop {
            match fs::create_dir(self.user_root.join(candidate.to_string())).await {
                Ok(()) => {
                    info!(user_id = candidate, "allocated user id");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    candidate = candidate.checked_add(1).ok_or(StoreError::NoMoreIds)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn highest_user_id(&self) -> Result<u32, StoreError> {
        let mut entries = fs::read_dir(&self.user_root)
            .await
            .map_err(|_| StoreError::NoMoreIds)?;
        let mut highest = 0u32;
        while let Some(entry) = entries.next_entry().await.map_err(|_| StoreError::NoMoreIds)? {
            let id = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok());
            if let Some(id) = id
                && entry.file_type().await.is_ok_and(|t| t.is_dir())
            {
                highest = highest.max(id);
            }
        }
        Ok(highest)
    }
}

/// Check that `name` is a single plain path component.
///
/// # Errors
///
/// Returns [`StoreError::InvalidName`] for empty names, names containing a
/// separator and the special components `.` and `..`.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == OsStr::new(name)
    );
    if single && !name.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            name: name.to_owned(),
        })
    }
}

async fn is_dir(path: &Path) -> bool { fs::metadata(path).await.is_ok_and(|m| m.is_dir()) }

fn not_found_or(error: io::Error, path: &Path) -> StoreError {
    if error.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        StoreError::Io(error)
    }
}
