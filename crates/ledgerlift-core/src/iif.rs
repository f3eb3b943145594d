//! QuickBooks IIF extraction
//!
//! IIF exports are tab-delimited files that interleave several tables.
//! Schema rows start with a bang marker (`!CUST`, `!TRNS`, `!SPL`) and carry
//! the column names for the data rows of that table; data rows repeat the
//! marker without the bang. Transactions additionally split into header
//! (`TRNS`) and line (`SPL`) rows, where each `TRNS` row is followed by its
//! `SPL` rows and `ENDTRNS` closes the group.

use std::io::Read;

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Read a raw IIF file into a frame with positional placeholder headers.
///
/// Rows are ragged across tables, so the frame is sized to the widest row
/// and every column is named `Column1..ColumnN` until a bang row promotes
/// real names during extraction.
pub fn read_iif<R: Read>(reader: R) -> Result<Frame> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b'\t')
        .quoting(false)
        .from_reader(reader);

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut width = 0;
    for result in rdr.records() {
        let record = result?;
        width = width.max(record.len());
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    let headers = (1..=width.max(1)).map(|i| format!("Column{}", i)).collect();
    Ok(Frame::new(headers, rows))
}

/// Extract one list table (`CUST`, `VEND`, `INVITEM`, ...) from a raw IIF
/// frame: promote the bang row's names to headers, keep the table's data
/// rows, and drop positions the bang row left unnamed.
pub fn extract_list(raw: &Frame, table: &str) -> Result<Frame> {
    let bang = bang_row(raw, table)?;
    let named = named_columns(&bang);

    let row_indices: Vec<usize> = raw
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.first().map(|s| s.as_str()) == Some(table))
        .map(|(i, _)| i)
        .collect();
    debug!("Extracted {} {} rows", row_indices.len(), table);

    Ok(project(raw.take_rows(&row_indices), &named))
}

/// Split one transaction type out of a raw IIF frame into header and line
/// frames.
///
/// Transaction ids and dates only appear on `TRNS` rows; they are forward-
/// filled onto the `SPL` rows that follow so lines can be joined back to
/// their header. Duplicate header ids keep their first occurrence, and the
/// lines of a dropped duplicate are dropped with it.
pub fn extract_transactions(raw: &Frame, trns_type: &str) -> Result<(Frame, Frame)> {
    let header_bang = bang_row(raw, "TRNS")?;
    let line_bang = bang_row(raw, "SPL")?;

    let type_col = column_of(&header_bang, "TRNSTYPE")?;
    let id_col = column_of(&header_bang, "TRNSID")?;
    let date_col = header_bang.iter().position(|h| h == "DATE");

    let mut header_rows: Vec<Vec<String>> = Vec::new();
    let mut line_rows: Vec<Vec<String>> = Vec::new();
    let mut seen_ids: Vec<String> = Vec::new();
    let mut current_id: Option<String> = None;
    let mut current_date = String::new();
    let mut keep_current = false;

    for row in &raw.rows {
        let marker = row.first().map(|s| s.as_str()).unwrap_or("");
        if row.get(type_col).map(|s| s.as_str()) != Some(trns_type) {
            if marker == "TRNS" {
                // A header of another type ends any group we were filling
                current_id = None;
                keep_current = false;
            }
            continue;
        }
        match marker {
            "TRNS" => {
                let id = normalize_id(row.get(id_col).map(|s| s.as_str()).unwrap_or(""));
                keep_current = !seen_ids.contains(&id);
                if keep_current {
                    seen_ids.push(id.clone());
                    let mut row = row.clone();
                    if let Some(cell) = row.get_mut(id_col) {
                        *cell = id.clone();
                    }
                    current_date = date_col
                        .and_then(|c| row.get(c))
                        .cloned()
                        .unwrap_or_default();
                    header_rows.push(row);
                }
                current_id = Some(id);
            }
            "SPL" => {
                if !keep_current {
                    continue;
                }
                let Some(id) = &current_id else {
                    continue;
                };
                let mut row = row.clone();
                if let Some(cell) = row.get_mut(id_col) {
                    *cell = id.clone();
                }
                if let Some(c) = date_col {
                    if let Some(cell) = row.get_mut(c) {
                        if cell.is_empty() {
                            *cell = current_date.clone();
                        }
                    }
                }
                line_rows.push(row);
            }
            _ => {}
        }
    }
    debug!(
        "Extracted {} {} headers and {} lines",
        header_rows.len(),
        trns_type,
        line_rows.len()
    );

    let headers = project(
        Frame {
            headers: raw.headers.clone(),
            rows: header_rows,
        },
        &named_columns(&header_bang),
    );
    // The id position carries forward-filled transaction ids, not per-line
    // split ids, so the line frame takes the header schema's name for it
    let mut line_named = named_columns(&line_bang);
    match line_named.iter_mut().find(|(i, _)| *i == id_col) {
        Some((_, name)) => *name = header_bang[id_col].clone(),
        None => {
            line_named.push((id_col, header_bang[id_col].clone()));
            line_named.sort_by_key(|(i, _)| *i);
        }
    }
    let lines = project(
        Frame {
            headers: raw.headers.clone(),
            rows: line_rows,
        },
        &line_named,
    );
    Ok((headers, lines))
}

/// Ids exported through intermediate tooling arrive as floats ("1001.0");
/// strip the fractional suffix so joins line up.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(stem) if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) => {
            stem.to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// The schema row for a table: first cell is `!TABLE`, the rest are names
fn bang_row(raw: &Frame, table: &str) -> Result<Vec<String>> {
    let marker = format!("!{}", table);
    raw.rows
        .iter()
        .find(|row| row.first().map(|s| s.as_str()) == Some(marker.as_str()))
        .cloned()
        .ok_or_else(|| Error::Extract(format!("No {} schema row in IIF file", marker)))
}

/// (index, name) for every position the bang row names, skipping the marker
fn named_columns(bang: &[String]) -> Vec<(usize, String)> {
    bang.iter()
        .enumerate()
        .skip(1)
        .filter(|(_, name)| !name.trim().is_empty())
        .map(|(i, name)| (i, name.trim().to_string()))
        .collect()
}

/// Keep the named positions and rename them
fn project(frame: Frame, named: &[(usize, String)]) -> Frame {
    let indices: Vec<usize> = named.iter().map(|(i, _)| *i).collect();
    let mut out = frame.select_columns(&indices);
    out.headers = named.iter().map(|(_, name)| name.clone()).collect();
    out
}

fn column_of(bang: &[String], name: &str) -> Result<usize> {
    bang.iter()
        .position(|h| h == name)
        .ok_or_else(|| Error::Extract(format!("IIF schema row is missing {}", name)))
}
