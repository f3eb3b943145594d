//! LedgerLift Core Library
//!
//! Shared functionality for the LedgerLift entity classification and
//! reconciliation engine:
//! - Category Store: shared flat-file keyword/hierarchy records partitioned
//!   by company, with first-claim-wins ownership
//! - Keyword matcher applying the most specific search key first
//! - TF-IDF + random-forest fallback classifier for unmatched entities
//! - Enrichment orchestrator tying matching, prediction, and persistence
//!   together for cold-start and incremental runs
//! - Reconciliation validator pruning transactions whose lines do not sum
//!   to the header total
//! - QuickBooks IIF extraction and frame hygiene with quarantine

pub mod classifier;
pub mod clean;
pub mod enrich;
pub mod error;
pub mod frame;
pub mod iif;
pub mod matcher;
pub mod models;
pub mod reconcile;
pub mod storage;
pub mod store;

pub use classifier::{FallbackClassifier, TrainReport, PREDICTED_MARKER};
pub use clean::{AddressParser, CleanOptions, Cleaner};
pub use enrich::{
    entities_from_csv, entities_to_csv, merge_into_master, Enricher, EnrichmentContext,
    EnrichmentRun,
};
pub use error::{Error, Result};
pub use frame::Frame;
pub use matcher::{match_entities, MatchOutcome};
pub use models::{
    CategoryRecord, Entity, EntityKind, Erp, MatchMode, TxnHeader, TxnLine, MISSING_SENTINEL,
    OTHER_SENTINEL,
};
pub use reconcile::{
    table_from_csv, table_to_csv, validate, ReconcileReport, DEFAULT_TOLERANCE,
};
pub use storage::{Fetch, LocalStore, MemoryStore, ObjectStore};
pub use store::{CategoryStore, StorePartition};
