//! Flat-file storage collaborator
//!
//! The engine consumes and produces tabular artifacts through one minimal
//! contract: fetch an object, store an object (full overwrite, no partial
//! or conditional writes). A missing object is an ordinary outcome, not an
//! error — the Category Store treats it as cold start — so `fetch` returns
//! an explicit `Fetch::Missing` rather than folding it into the error type.
//!
//! # Architecture
//!
//! - `ObjectStore` trait defines the interface for storage backends
//! - `LocalStore` keeps objects in a directory tree (one subdir per bucket)
//! - `MemoryStore` backs tests and dry runs

mod local;
mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::error::Result;

/// Outcome of a fetch: the object's bytes, or an explicit miss
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch {
    Found(Vec<u8>),
    Missing,
}

impl Fetch {
    /// Bytes if found, `None` on a miss
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Fetch::Found(bytes) => Some(bytes),
            Fetch::Missing => None,
        }
    }
}

/// Storage collaborator contract
///
/// Writes are last-writer-wins over the whole object. Concurrent runs over
/// the same company's artifacts are a data race the caller must serialize.
pub trait ObjectStore {
    /// Fetch an object. A missing key is `Ok(Fetch::Missing)`; `Err` is
    /// reserved for genuine I/O failure.
    fn fetch(&self, bucket: &str, key: &str) -> Result<Fetch>;

    /// Store an object, fully replacing any prior content
    fn store(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()>;
}
