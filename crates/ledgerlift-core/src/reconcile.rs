//! Reconciliation validator
//!
//! Checks that the per-line amounts of each transaction sum to the total its
//! header declares, within a numeric tolerance. Transactions that fail the
//! check are removed from both the header and line tables so no orphaned
//! header or orphaned line set survives into the output. Mismatches are
//! surfaced and logged, never fatal.

use std::collections::{HashMap, HashSet};

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{TxnHeader, TxnLine};

/// Legacy ERP exports round header subtotals and per-line extended prices
/// independently, so sub-cent to low-cent drift between the two is expected.
/// Exact equality would reject otherwise-valid transactions.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Transaction ids present on both sides and compared
    pub checked: usize,
    /// Ids removed because line sums disagreed with the header total
    pub mismatched_ids: Vec<String>,
}

/// Compare header totals against summed line totals and drop every
/// transaction id whose absolute difference exceeds `tolerance`.
///
/// Only ids present in both tables are compared (inner join). A header with
/// several rows is expected to repeat the same total; the maximum is used so
/// a stray zero-total continuation row cannot mask the declared amount.
pub fn validate(
    headers: Vec<TxnHeader>,
    lines: Vec<TxnLine>,
    tolerance: f64,
) -> (Vec<TxnHeader>, Vec<TxnLine>, ReconcileReport) {
    let mut header_totals: HashMap<&str, f64> = HashMap::new();
    for header in &headers {
        header_totals
            .entry(header.txn_id.as_str())
            .and_modify(|t| *t = t.max(header.total))
            .or_insert(header.total);
    }

    let mut line_sums: HashMap<&str, f64> = HashMap::new();
    for line in &lines {
        *line_sums.entry(line.txn_id.as_str()).or_insert(0.0) += line.total;
    }

    let mut report = ReconcileReport::default();
    for (txn_id, header_total) in &header_totals {
        let Some(line_sum) = line_sums.get(txn_id) else {
            continue;
        };
        report.checked += 1;
        let diff = (header_total - line_sum).abs();
        if diff > tolerance {
            debug!(
                "Transaction {} does not reconcile: header {:.2}, lines {:.2}, diff {:.2}",
                txn_id, header_total, line_sum, diff
            );
            report.mismatched_ids.push(txn_id.to_string());
        }
    }
    report.mismatched_ids.sort();

    if report.mismatched_ids.is_empty() {
        info!("Reconciled {} transactions, all within tolerance", report.checked);
    } else {
        warn!(
            "Reconciled {} transactions, excluding {} mismatches",
            report.checked,
            report.mismatched_ids.len()
        );
    }

    let flagged: HashSet<&str> = report.mismatched_ids.iter().map(|s| s.as_str()).collect();
    let headers = headers
        .into_iter()
        .filter(|h| !flagged.contains(h.txn_id.as_str()))
        .collect();
    let lines = lines
        .into_iter()
        .filter(|l| !flagged.contains(l.txn_id.as_str()))
        .collect();
    (headers, lines, report)
}

/// Serialize canonical header or line tables (quote-all CSV)
pub fn table_to_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    wtr.into_inner()
        .map_err(|e| Error::InvalidData(format!("CSV write failed: {}", e)))
}

/// Parse a canonical header or line table
pub fn table_from_csv<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(txn_id: &str, total: f64) -> TxnHeader {
        TxnHeader {
            txn_id: txn_id.to_string(),
            total,
            date: None,
        }
    }

    fn line(txn_id: &str, total: f64) -> TxnLine {
        TxnLine {
            txn_id: txn_id.to_string(),
            item_id: "I1".to_string(),
            account: "Sales".to_string(),
            total,
        }
    }

    #[test]
    fn test_within_tolerance_is_kept() {
        let (headers, lines, report) = validate(
            vec![header("T1", 100.00)],
            vec![line("T1", 50.00), line("T1", 49.91)],
            DEFAULT_TOLERANCE,
        );
        assert_eq!(headers.len(), 1);
        assert_eq!(lines.len(), 2);
        assert!(report.mismatched_ids.is_empty());
    }

    #[test]
    fn test_outside_tolerance_removed_from_both_tables() {
        let (headers, lines, report) = validate(
            vec![header("T1", 100.00), header("T2", 25.00)],
            vec![
                line("T1", 50.00),
                line("T1", 49.89),
                line("T2", 25.00),
            ],
            DEFAULT_TOLERANCE,
        );
        assert_eq!(report.mismatched_ids, vec!["T1".to_string()]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].txn_id, "T2");
        assert!(lines.iter().all(|l| l.txn_id == "T2"));
    }

    #[test]
    fn test_orphans_pass_through_unchecked() {
        // A header with no lines and lines with no header are not compared
        let (headers, lines, report) = validate(
            vec![header("T1", 10.0)],
            vec![line("T2", 99.0)],
            DEFAULT_TOLERANCE,
        );
        assert_eq!(report.checked, 0);
        assert_eq!(headers.len(), 1);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_repeated_header_rows_use_max_total() {
        // Continuation rows often carry a zero total; the declared amount wins
        let (headers, _, report) = validate(
            vec![header("T1", 0.0), header("T1", 75.0)],
            vec![line("T1", 75.0)],
            DEFAULT_TOLERANCE,
        );
        assert!(report.mismatched_ids.is_empty());
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_canonical_table_round_trip() {
        let headers = vec![header("T1", 12.5)];
        let bytes = table_to_csv(&headers).unwrap();
        let parsed: Vec<TxnHeader> = table_from_csv(&bytes).unwrap();
        assert_eq!(parsed, headers);
    }

    #[test]
    fn test_negative_amounts_reconcile() {
        let (headers, _, report) = validate(
            vec![header("T1", -42.50)],
            vec![line("T1", -40.00), line("T1", -2.50)],
            DEFAULT_TOLERANCE,
        );
        assert!(report.mismatched_ids.is_empty());
        assert_eq!(headers.len(), 1);
        assert_eq!(report.checked, 1);
    }
}
