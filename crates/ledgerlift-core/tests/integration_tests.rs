//! Integration tests for ledgerlift-core
//!
//! These tests exercise the full extract → enrich → reconcile workflow.

use ledgerlift_core::{
    enrich::{entities_from_csv, Enricher, EnrichmentContext},
    iif::{extract_list, extract_transactions, read_iif},
    models::{CategoryRecord, EntityKind, Erp},
    reconcile::{validate, DEFAULT_TOLERANCE},
    storage::{Fetch, MemoryStore, ObjectStore},
    store::{CategoryStore, StorePartition},
    OTHER_SENTINEL,
};

/// A small QuickBooks export: an item list plus two invoices. Invoice 100
/// reconciles within tolerance (diff 0.09); invoice 101 does not (0.11).
fn quickbooks_iif() -> &'static str {
    "!INVITEM\tNAME\tDESC\tREFNUM\n\
     INVITEM\t10AWG COPPER WIRE\tSOLID COPPER WIRE 10AWG\t1\n\
     INVITEM\tWIDGET\t\t2\n\
     !TRNS\tTRNSID\tTRNSTYPE\tDATE\tACCNT\tNAME\tAMOUNT\n\
     !SPL\tSPLID\tTRNSTYPE\tDATE\tACCNT\tINVITEM\tAMOUNT\n\
     !ENDTRNS\n\
     TRNS\t100\tINVOICE\t01/15/2024\tAR\tACME\t100.00\n\
     SPL\t\tINVOICE\t\tSales\t10AWG COPPER WIRE\t50.00\n\
     SPL\t\tINVOICE\t\tSales\tWIDGET\t49.91\n\
     ENDTRNS\n\
     TRNS\t101\tINVOICE\t01/16/2024\tAR\tACME\t100.00\n\
     SPL\t\tINVOICE\t\tSales\t10AWG COPPER WIRE\t99.89\n\
     ENDTRNS\n"
}

fn wire_record() -> CategoryRecord {
    CategoryRecord {
        index: 0,
        company: None,
        search_key: "WIRE".to_string(),
        common_name: "Wire".to_string(),
        level1: Some("ELEC".to_string()),
        level2: Some("OTHER".to_string()),
        level3: Some("OTHER".to_string()),
        level4: Some("OTHER".to_string()),
        level5: Some("OTHER".to_string()),
        parent_name: None,
        found: false,
    }
}

fn seed_store(storage: &MemoryStore, records: Vec<CategoryRecord>) {
    let store = CategoryStore::new(storage, "cache", "categories.csv");
    store
        .save(&StorePartition {
            mine: records,
            others: vec![],
        })
        .expect("Failed to seed store");
}

fn context<'a>(storage: &'a MemoryStore, company: &str) -> EnrichmentContext<'a> {
    EnrichmentContext {
        storage,
        company: company.to_string(),
        store_bucket: "cache".to_string(),
        store_key: "categories.csv".to_string(),
        output_bucket: "out".to_string(),
        output_key: "items_enriched.csv".to_string(),
        seed: 7,
    }
}

// =============================================================================
// Extract → Enrich → Reconcile
// =============================================================================

#[test]
fn test_full_quickbooks_workflow() {
    let raw = read_iif(quickbooks_iif().as_bytes()).expect("Failed to read IIF");
    let mapping = Erp::QuickBooks.mapping();

    // Item list
    let items = extract_list(&raw, "INVITEM").expect("Failed to extract items");
    let entities = mapping
        .entities_from_frame(&items, EntityKind::Item)
        .expect("Failed to map entities");
    assert_eq!(entities.len(), 2);

    // Enrichment: keyword hit for the wire item, sentinels for the widget
    let storage = MemoryStore::new();
    seed_store(&storage, vec![wire_record()]);
    let ctx = context(&storage, "ACME");
    let (enriched, run) = Enricher::new(&ctx)
        .cold_start(entities, EntityKind::Item)
        .expect("Enrichment failed");

    assert_eq!(run.matched_by_keyword, 1);
    assert_eq!(run.claimed, 1);

    let wire = enriched
        .iter()
        .find(|e| e.id == "10AWG COPPER WIRE")
        .expect("wire item missing from output");
    assert_eq!(wire.level(0), Some("ELEC"));
    assert_eq!(wire.common_name.as_deref(), Some("Wire"));

    let widget = enriched
        .iter()
        .find(|e| e.id == "WIDGET")
        .expect("widget missing from output");
    assert_eq!(widget.common_name.as_deref(), Some("WIDGET"));
    assert_eq!(widget.level(0), Some(OTHER_SENTINEL));

    // Transactions: the mismatched invoice disappears from both tables
    let (header_frame, line_frame) =
        extract_transactions(&raw, "INVOICE").expect("Failed to extract transactions");
    let headers = mapping
        .headers_from_frame(&header_frame)
        .expect("Failed to map headers");
    let lines = mapping
        .lines_from_frame(&line_frame)
        .expect("Failed to map lines");
    assert_eq!(headers.len(), 2);
    assert_eq!(lines.len(), 3);

    let (clean_headers, clean_lines, report) = validate(headers, lines, DEFAULT_TOLERANCE);
    assert_eq!(report.mismatched_ids, vec!["101".to_string()]);
    assert_eq!(clean_headers.len(), 1);
    assert_eq!(clean_headers[0].txn_id, "100");
    assert!(clean_lines.iter().all(|l| l.txn_id == "100"));
}

#[test]
fn test_cold_start_rerun_is_idempotent() {
    let storage = MemoryStore::new();
    seed_store(&storage, vec![wire_record()]);
    let ctx = context(&storage, "ACME");

    let entities = || {
        let raw = read_iif(quickbooks_iif().as_bytes()).expect("Failed to read IIF");
        let items = extract_list(&raw, "INVITEM").expect("Failed to extract items");
        Erp::QuickBooks
            .mapping()
            .entities_from_frame(&items, EntityKind::Item)
            .expect("Failed to map entities")
    };

    Enricher::new(&ctx)
        .cold_start(entities(), EntityKind::Item)
        .expect("First run failed");
    let store_snapshot = storage.fetch("cache", "categories.csv").expect("fetch");
    let output_snapshot = storage.fetch("out", "items_enriched.csv").expect("fetch");

    Enricher::new(&ctx)
        .cold_start(entities(), EntityKind::Item)
        .expect("Second run failed");
    assert_eq!(
        storage.fetch("cache", "categories.csv").expect("fetch"),
        store_snapshot
    );
    assert_eq!(
        storage.fetch("out", "items_enriched.csv").expect("fetch"),
        output_snapshot
    );
}

#[test]
fn test_incremental_runs_update_the_master_in_place() {
    let storage = MemoryStore::new();
    seed_store(&storage, vec![wire_record()]);
    let ctx = context(&storage, "ACME");

    let raw = read_iif(quickbooks_iif().as_bytes()).expect("Failed to read IIF");
    let items = extract_list(&raw, "INVITEM").expect("Failed to extract items");
    let mut entities = Erp::QuickBooks
        .mapping()
        .entities_from_frame(&items, EntityKind::Item)
        .expect("Failed to map entities");

    // First batch carries only the wire item, the second only the widget
    let widget = entities
        .iter()
        .position(|e| e.id == "WIDGET")
        .map(|i| entities.remove(i))
        .expect("widget missing from export");
    Enricher::new(&ctx)
        .incremental(entities, EntityKind::Item)
        .expect("First run failed");
    let (master, _) = Enricher::new(&ctx)
        .incremental(vec![widget], EntityKind::Item)
        .expect("Second run failed");

    // The second batch extends the master; the first run's row survives
    // with its keyword-derived hierarchy intact
    assert!(master.iter().any(|e| e.id == "WIDGET"));
    let wire = master
        .iter()
        .find(|e| e.id == "10AWG COPPER WIRE")
        .expect("wire item dropped from master");
    assert_eq!(wire.common_name.as_deref(), Some("Wire"));
    assert_eq!(wire.level(0), Some("ELEC"));

    let bytes = match storage.fetch("out", "items_enriched.csv").expect("fetch") {
        Fetch::Found(bytes) => bytes,
        Fetch::Missing => panic!("master was not persisted"),
    };
    let persisted = entities_from_csv(&bytes).expect("Failed to parse master");
    assert_eq!(persisted, master);
}

#[test]
fn test_store_is_shared_but_claims_are_exclusive() {
    let storage = MemoryStore::new();
    seed_store(&storage, vec![wire_record()]);

    // First company to use the record claims it
    let ctx_a = context(&storage, "ALPHA");
    let raw = read_iif(quickbooks_iif().as_bytes()).expect("Failed to read IIF");
    let items = extract_list(&raw, "INVITEM").expect("Failed to extract items");
    let entities = Erp::QuickBooks
        .mapping()
        .entities_from_frame(&items, EntityKind::Item)
        .expect("Failed to map entities");
    Enricher::new(&ctx_a)
        .cold_start(entities.clone(), EntityKind::Item)
        .expect("Run failed");

    // The second company sees the record as foreign and cannot match it
    let ctx_b = context(&storage, "BETA");
    let (enriched, run) = Enricher::new(&ctx_b)
        .cold_start(entities, EntityKind::Item)
        .expect("Run failed");
    assert_eq!(run.matched_by_keyword, 0);
    let wire = enriched
        .iter()
        .find(|e| e.id == "10AWG COPPER WIRE")
        .expect("wire item missing");
    assert_eq!(wire.level(0), Some(OTHER_SENTINEL));

    let store = CategoryStore::new(&storage, "cache", "categories.csv");
    let partition = store.load("ALPHA").expect("load");
    assert_eq!(partition.mine.len(), 1);
    assert_eq!(partition.mine[0].company.as_deref(), Some("ALPHA"));
}

#[test]
fn test_enriched_output_is_readable() {
    let storage = MemoryStore::new();
    seed_store(&storage, vec![wire_record()]);
    let ctx = context(&storage, "ACME");
    let raw = read_iif(quickbooks_iif().as_bytes()).expect("Failed to read IIF");
    let items = extract_list(&raw, "INVITEM").expect("Failed to extract items");
    let entities = Erp::QuickBooks
        .mapping()
        .entities_from_frame(&items, EntityKind::Item)
        .expect("Failed to map entities");
    let (enriched, _) = Enricher::new(&ctx)
        .cold_start(entities, EntityKind::Item)
        .expect("Run failed");

    let bytes = match storage.fetch("out", "items_enriched.csv").expect("fetch") {
        Fetch::Found(bytes) => bytes,
        Fetch::Missing => panic!("output artifact was not written"),
    };
    let parsed = entities_from_csv(&bytes).expect("Failed to parse output");
    assert_eq!(parsed, enriched);
}
