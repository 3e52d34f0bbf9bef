//! Temporary storage trees for server tests.

use std::{fs, path::PathBuf, sync::Arc};

use filewire::store::FileStore;
use rstest::fixture;
use tempfile::TempDir;

/// A Dlc and User tree inside a temporary directory.
///
/// The directory is removed when the value is dropped, so keep it alive for
/// as long as a server uses the store.
#[derive(Debug)]
pub struct TestStore {
    dir: TempDir,
    store: Arc<FileStore>,
}

impl TestStore {
    /// Create `dlc/` and `user/0/` in a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directories cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let dlc = dir.path().join("dlc");
        let user = dir.path().join("user");
        fs::create_dir_all(&dlc).expect("create dlc root");
        fs::create_dir_all(user.join("0")).expect("create user root");
        Self {
            store: Arc::new(FileStore::new(dlc, user)),
            dir,
        }
    }

    /// Shared handle to the store, as a server would hold it.
    #[must_use]
    pub fn store(&self) -> Arc<FileStore> { Arc::clone(&self.store) }

    /// Path of `name` in `user_id`'s directory.
    #[must_use]
    pub fn user_path(&self, user_id: u32, name: &str) -> PathBuf {
        self.store.user_root().join(user_id.to_string()).join(name)
    }

    /// Write `data` to `name` in `user_id`'s directory, creating it.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_user_file(&self, user_id: u32, name: &str, data: &[u8]) {
        let path = self.user_path(user_id, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create user directory");
        }
        fs::write(path, data).expect("write user file");
    }

    /// Write `data` to `name` under the Dlc root.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_dlc_file(&self, name: &str, data: &[u8]) {
        fs::write(self.store.dlc_root().join(name), data).expect("write dlc file");
    }

    /// Read `name` from `user_id`'s directory, or `None` if it is missing.
    #[must_use]
    pub fn read_user_file(&self, user_id: u32, name: &str) -> Option<Vec<u8>> {
        fs::read(self.user_path(user_id, name)).ok()
    }

    /// Numeric user directories currently present, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the User root cannot be listed.
    #[must_use]
    pub fn user_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = fs::read_dir(self.store.user_root())
            .expect("list user root")
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Root of the temporary tree.
    #[must_use]
    pub fn path(&self) -> &std::path::Path { self.dir.path() }
}

impl Default for TestStore {
    fn default() -> Self { Self::new() }
}

/// rstest fixture yielding a fresh [`TestStore`].
#[fixture]
pub fn test_store() -> TestStore { TestStore::new() }
