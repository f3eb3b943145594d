//! Directory-backed object store

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{Fetch, ObjectStore};
use crate::error::{Error, Result};

/// Object store over a local directory tree: `<root>/<bucket>/<key>`
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                Error::Storage(format!(
                    "Failed to create store root {}: {}",
                    root.display(),
                    e
                ))
            })?;
            info!("Created store root: {}", root.display());
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

impl ObjectStore for LocalStore {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Fetch> {
        match fs::read(self.object_path(bucket, key)) {
            Ok(bytes) => Ok(Fetch::Found(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Fetch::Missing),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read {}/{}: {}",
                bucket, key, e
            ))),
        }
    }

    fn store(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create bucket {}: {}", bucket, e))
            })?;
        }
        fs::write(&path, bytes)
            .map_err(|e| Error::Storage(format!("Failed to write {}/{}: {}", bucket, key, e)))
    }
}
