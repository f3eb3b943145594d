//! In-memory object store for tests and dry runs

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Fetch, ObjectStore};
use crate::error::Result;

/// Object store backed by a map. Interior mutability keeps the trait's
/// `&self` signatures.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present in a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.lock().unwrap();
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl ObjectStore for MemoryStore {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Fetch> {
        let objects = self.objects.lock().unwrap();
        Ok(match objects.get(&(bucket.to_string(), key.to_string())) {
            Some(bytes) => Fetch::Found(bytes.clone()),
            None => Fetch::Missing,
        })
    }

    fn store(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_listing() {
        let store = MemoryStore::new();
        assert_eq!(store.fetch("b", "k").unwrap(), Fetch::Missing);
        store.store("b", "k", b"data").unwrap();
        store.store("b", "a", b"more").unwrap();
        assert_eq!(store.fetch("b", "k").unwrap(), Fetch::Found(b"data".to_vec()));
        assert_eq!(store.keys("b"), vec!["a".to_string(), "k".to_string()]);
    }
}
