//! Persisted keyword -> hierarchy mapping (the Category Store)
//!
//! One CSV object holds every company's records plus shared, unclaimed ones.
//! A run loads the whole object, works on its own company's partition
//! (owned-or-unclaimed), and writes the union back in full. There is no
//! row-level locking or versioning: concurrent runs over the same company
//! must be serialized by the caller.

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::CategoryRecord;
use crate::storage::{Fetch, ObjectStore};

/// One company's view of the store: its own (or unclaimed) records vs.
/// everyone else's
#[derive(Debug, Default)]
pub struct StorePartition {
    pub mine: Vec<CategoryRecord>,
    pub others: Vec<CategoryRecord>,
}

impl StorePartition {
    pub fn is_empty(&self) -> bool {
        self.mine.is_empty() && self.others.is_empty()
    }

    /// Next free integer index across the whole store
    pub fn next_index(&self) -> i64 {
        self.mine
            .iter()
            .chain(self.others.iter())
            .map(|r| r.index)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0)
    }
}

/// Category Store bound to one persisted object
pub struct CategoryStore<'a> {
    storage: &'a dyn ObjectStore,
    bucket: String,
    key: String,
}

impl<'a> CategoryStore<'a> {
    pub fn new(storage: &'a dyn ObjectStore, bucket: &str, key: &str) -> Self {
        Self {
            storage,
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Load and partition the store for one company.
    ///
    /// A missing object is a cold start, not an error: both partitions come
    /// back empty and the first `save` creates the object.
    pub fn load(&self, company: &str) -> Result<StorePartition> {
        let bytes = match self.storage.fetch(&self.bucket, &self.key)? {
            Fetch::Found(bytes) => bytes,
            Fetch::Missing => {
                info!(
                    "Category store {}/{} not found, starting cold",
                    self.bucket, self.key
                );
                return Ok(StorePartition::default());
            }
        };

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let mut partition = StorePartition::default();
        for result in rdr.deserialize() {
            let record: CategoryRecord = result?;
            let mine = match record.company.as_deref() {
                None => true,
                Some(c) => c.eq_ignore_ascii_case(company),
            };
            if mine {
                partition.mine.push(record);
            } else {
                partition.others.push(record);
            }
        }

        debug!(
            "Loaded category store: {} records for {}, {} owned elsewhere",
            partition.mine.len(),
            company,
            partition.others.len()
        );
        Ok(partition)
    }

    /// Flip ownership of unclaimed records this run actually used.
    ///
    /// Only records whose `found` flag was set get claimed, and only if no
    /// company owns them yet (first-claim-wins). Returns how many were
    /// claimed.
    pub fn claim(records: &mut [CategoryRecord], company: &str) -> usize {
        let mut claimed = 0;
        for record in records.iter_mut() {
            if record.found && record.company.is_none() {
                record.company = Some(company.to_string());
                claimed += 1;
            }
        }
        if claimed > 0 {
            debug!("{} claimed {} previously shared records", company, claimed);
        }
        claimed
    }

    /// Persist the union back, fully replacing the prior object.
    ///
    /// Failures propagate: silently losing the merged cache would regress
    /// every future run's match rate.
    pub fn save(&self, partition: &StorePartition) -> Result<()> {
        let mut wtr = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(Vec::new());
        for record in partition.mine.iter().chain(partition.others.iter()) {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        let bytes = wtr
            .into_inner()
            .map_err(|e| Error::InvalidData(format!("CSV write failed: {}", e)))?;

        self.storage.store(&self.bucket, &self.key, &bytes)?;
        info!(
            "Saved category store {}/{} ({} records)",
            self.bucket,
            self.key,
            partition.mine.len() + partition.others.len()
        );
        Ok(())
    }
}

/// Order records for the matcher: longest key first so a more specific key
/// is never shadowed by a broader one. Ties break on the key itself to keep
/// runs deterministic.
pub fn sorted_for_matching(mut records: Vec<CategoryRecord>) -> Vec<CategoryRecord> {
    records.sort_by(|a, b| {
        b.search_key
            .len()
            .cmp(&a.search_key.len())
            .then_with(|| a.search_key.cmp(&b.search_key))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn record(index: i64, company: Option<&str>, key: &str) -> CategoryRecord {
        CategoryRecord {
            index,
            company: company.map(|s| s.to_string()),
            search_key: key.to_string(),
            common_name: format!("Name {}", key),
            level1: Some("L1".to_string()),
            level2: None,
            level3: None,
            level4: None,
            level5: None,
            parent_name: None,
            found: false,
        }
    }

    #[test]
    fn test_cold_start_is_empty_not_error() {
        let storage = MemoryStore::new();
        let store = CategoryStore::new(&storage, "cache", "categories.csv");
        let partition = store.load("ACME").unwrap();
        assert!(partition.is_empty());
        assert_eq!(partition.next_index(), 0);
    }

    #[test]
    fn test_load_partitions_by_company_and_unclaimed() {
        let storage = MemoryStore::new();
        let store = CategoryStore::new(&storage, "cache", "categories.csv");

        let partition = StorePartition {
            mine: vec![record(0, Some("ACME"), "WIRE"), record(1, None, "PIPE")],
            others: vec![record(2, Some("GLOBEX"), "BOLT")],
        };
        store.save(&partition).unwrap();

        let loaded = store.load("ACME").unwrap();
        assert_eq!(loaded.mine.len(), 2);
        assert_eq!(loaded.others.len(), 1);
        assert_eq!(loaded.others[0].company.as_deref(), Some("GLOBEX"));
        assert_eq!(loaded.next_index(), 3);

        // The same object viewed by the other company flips the partition
        let loaded = store.load("GLOBEX").unwrap();
        assert_eq!(loaded.mine.len(), 2); // BOLT plus unclaimed PIPE
        assert_eq!(loaded.others.len(), 1);
    }

    #[test]
    fn test_found_flag_is_transient() {
        let storage = MemoryStore::new();
        let store = CategoryStore::new(&storage, "cache", "categories.csv");

        let mut rec = record(0, Some("ACME"), "WIRE");
        rec.found = true;
        store
            .save(&StorePartition {
                mine: vec![rec],
                others: vec![],
            })
            .unwrap();

        let loaded = store.load("ACME").unwrap();
        assert!(!loaded.mine[0].found);
    }

    #[test]
    fn test_claim_only_touches_found_unclaimed() {
        let mut records = vec![
            record(0, None, "FOUND-UNCLAIMED"),
            record(1, None, "UNFOUND-UNCLAIMED"),
            record(2, Some("GLOBEX"), "FOUND-OWNED"),
        ];
        records[0].found = true;
        records[2].found = true;

        let claimed = CategoryStore::claim(&mut records, "ACME");
        assert_eq!(claimed, 1);
        assert_eq!(records[0].company.as_deref(), Some("ACME"));
        assert_eq!(records[1].company, None);
        // First claim wins: a record another company owns is never re-claimed
        assert_eq!(records[2].company.as_deref(), Some("GLOBEX"));
    }

    #[test]
    fn test_sorted_for_matching_longest_first() {
        let sorted = sorted_for_matching(vec![
            record(0, None, "AB"),
            record(1, None, "ABC"),
            record(2, None, "A"),
        ]);
        let keys: Vec<&str> = sorted.iter().map(|r| r.search_key.as_str()).collect();
        assert_eq!(keys, vec!["ABC", "AB", "A"]);
    }
}
