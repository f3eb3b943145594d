//! Frame hygiene and quarantine
//!
//! Raw ERP extracts arrive with inconsistent casing, embedded newlines,
//! float-formatted ids, free-form postal fields, and columns that never vary.
//! The cleaner normalizes what it can and quarantines what it cannot: rows
//! failing a validation are written to a sibling `<bucket>-c` quarantine
//! bucket as CSV artifacts, named after the table and the failed check, so
//! nothing is silently discarded. Validation failures surface in the
//! artifacts and logs; they never abort the run.

use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, info};

use crate::error::Result;
use crate::frame::Frame;
use crate::models::parse_date;
use crate::storage::ObjectStore;

const US_STATES: &[(&str, &str)] = &[
    ("DISTRICT OF COLUMBIA", "DC"),
    ("ALABAMA", "AL"),
    ("ALASKA", "AK"),
    ("ARIZONA", "AZ"),
    ("ARKANSAS", "AR"),
    ("CALIFORNIA", "CA"),
    ("COLORADO", "CO"),
    ("CONNECTICUT", "CT"),
    ("DELAWARE", "DE"),
    ("FLORIDA", "FL"),
    ("GEORGIA", "GA"),
    ("HAWAII", "HI"),
    ("IDAHO", "ID"),
    ("ILLINOIS", "IL"),
    ("INDIANA", "IN"),
    ("IOWA", "IA"),
    ("KANSAS", "KS"),
    ("KENTUCKY", "KY"),
    ("LOUISIANA", "LA"),
    ("MAINE", "ME"),
    ("MARYLAND", "MD"),
    ("MASSACHUSETTS", "MA"),
    ("MICHIGAN", "MI"),
    ("MINNESOTA", "MN"),
    ("MISSISSIPPI", "MS"),
    ("MISSOURI", "MO"),
    ("MONTANA", "MT"),
    ("NEBRASKA", "NE"),
    ("NEVADA", "NV"),
    ("NEW HAMPSHIRE", "NH"),
    ("NEW JERSEY", "NJ"),
    ("NEW MEXICO", "NM"),
    ("NEW YORK", "NY"),
    ("NORTH CAROLINA", "NC"),
    ("NORTH DAKOTA", "ND"),
    ("OHIO", "OH"),
    ("OKLAHOMA", "OK"),
    ("OREGON", "OR"),
    ("PENNSYLVANIA", "PA"),
    ("RHODE ISLAND", "RI"),
    ("SOUTH CAROLINA", "SC"),
    ("SOUTH DAKOTA", "SD"),
    ("TENNESSEE", "TN"),
    ("TEXAS", "TX"),
    ("UTAH", "UT"),
    ("VERMONT", "VT"),
    ("VIRGINIA", "VA"),
    ("WASHINGTON", "WA"),
    ("WEST VIRGINIA", "WV"),
    ("WISCONSIN", "WI"),
    ("WYOMING", "WY"),
];

const CA_PROVINCES: &[(&str, &str)] = &[
    ("ALBERTA", "AB"),
    ("BRITISH COLUMBIA", "BC"),
    ("MANITOBA", "MB"),
    ("NEW BRUNSWICK", "NB"),
    ("NEWFOUNDLAND AND LABRADOR", "NL"),
    ("NOVA SCOTIA", "NS"),
    ("ONTARIO", "ON"),
    ("PRINCE EDWARD ISLAND", "PE"),
    ("QUEBEC", "QC"),
    ("SASKATCHEWAN", "SK"),
    ("NORTHWEST TERRITORIES", "NT"),
    ("NUNAVUT", "NU"),
    ("YUKON", "YT"),
];

const US_ZIP: &str = r"^\d{5}(\d{4})?$";
const CA_ZIP: &str = r"^[A-Za-z]\d[A-Za-z](\d[A-Za-z]\d)?$";

fn state_codes() -> HashSet<&'static str> {
    US_STATES
        .iter()
        .chain(CA_PROVINCES.iter())
        .map(|(_, code)| *code)
        .collect()
}

/// What to validate in one table
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Columns forming the row identity; invalid/duplicate ids quarantine
    pub id_columns: Vec<String>,
    /// Require id columns to be all digits
    pub numeric_ids: bool,
    /// Date columns beyond those whose header already contains "date"
    pub extra_date_columns: Vec<String>,
    pub zip_columns: Vec<String>,
    pub state_columns: Vec<String>,
    /// Re-admit rows with a bad zip/state, with the offending cell blanked,
    /// instead of dropping them
    pub keep_invalid_as_null: bool,
    /// Drop columns that are entirely blank or never vary
    pub just_useful_columns: bool,
}

/// Cleans frames and routes rejects to the quarantine bucket
pub struct Cleaner<'a> {
    storage: &'a dyn ObjectStore,
    quarantine_bucket: String,
}

impl<'a> Cleaner<'a> {
    /// Quarantine artifacts land next to the data in `<bucket>-c`
    pub fn new(storage: &'a dyn ObjectStore, bucket: &str) -> Self {
        Self {
            storage,
            quarantine_bucket: format!("{}-c", bucket),
        }
    }

    pub fn clean(&self, mut frame: Frame, name: &str, opts: &CleanOptions) -> Result<Frame> {
        let id_cols: Vec<usize> = opts
            .id_columns
            .iter()
            .filter_map(|c| frame.col(c))
            .collect();

        normalize_text(&mut frame, &id_cols);
        normalize_dates(&mut frame, &opts.extra_date_columns);

        if !id_cols.is_empty() {
            if opts.numeric_ids {
                let invalid = split_off(&mut frame, |row| {
                    id_cols
                        .iter()
                        .any(|&c| !row[c].chars().all(|ch| ch.is_ascii_digit()) || row[c].is_empty())
                });
                info!("{}: {} rows with non-numeric ids removed", name, invalid.len());
                if !invalid.is_empty() {
                    self.quarantine(name, &ids_suffix("invalid", &opts.id_columns), &invalid)?;
                }
            }

            let mut seen: HashSet<Vec<String>> = HashSet::new();
            let duplicated = split_off(&mut frame, |row| {
                let key: Vec<String> = id_cols.iter().map(|&c| row[c].clone()).collect();
                !seen.insert(key)
            });
            info!("{}: {} rows with duplicated ids removed", name, duplicated.len());
            if !duplicated.is_empty() {
                self.quarantine(name, &ids_suffix("duplicated", &opts.id_columns), &duplicated)?;
            }
        }

        if !opts.zip_columns.is_empty() {
            let rejected = self.validate_zips(&mut frame, opts)?;
            self.quarantine(name, "invalid_zip_codes", &rejected)?;
            if opts.keep_invalid_as_null {
                readmit(&mut frame, rejected);
            }
        }

        if !opts.state_columns.is_empty() {
            let rejected = self.validate_states(&mut frame, opts)?;
            self.quarantine(name, "invalid_states", &rejected)?;
            if opts.keep_invalid_as_null {
                readmit(&mut frame, rejected);
            }
        }

        if opts.just_useful_columns {
            frame = useful_columns(&frame);
            debug!("{}: {} useful columns kept", name, frame.headers.len());
        }
        Ok(frame)
    }

    /// Normalize zip columns in place; returns rejected rows with the bad
    /// cell blanked, ready for quarantine or re-admission
    fn validate_zips(&self, frame: &mut Frame, opts: &CleanOptions) -> Result<Frame> {
        let us = Regex::new(US_ZIP)?;
        let ca = Regex::new(CA_ZIP)?;
        let mut rejected = Frame::empty(frame.headers.clone());

        for col_name in &opts.zip_columns {
            let Some(col) = frame.col(col_name) else {
                continue;
            };
            for row in &mut frame.rows {
                row[col] = row[col].replace([' ', '-'], "");
            }
            let mut bad = split_off(frame, |row| {
                !row[col].is_empty() && !us.is_match(&row[col]) && !ca.is_match(&row[col])
            });
            for row in &mut bad.rows {
                row[col].clear();
            }
            rejected.rows.append(&mut bad.rows);

            for row in &mut frame.rows {
                let zip = &row[col];
                if zip.len() == 9 && us.is_match(zip) {
                    row[col] = format!("{}-{}", &zip[0..5], &zip[5..9]);
                } else if zip.len() == 6 && ca.is_match(zip) {
                    row[col] = format!("{} {}", &zip[0..3], &zip[3..6]).to_uppercase();
                }
            }
        }
        info!("{} invalid zip codes found", rejected.len());
        Ok(rejected)
    }

    fn validate_states(&self, frame: &mut Frame, opts: &CleanOptions) -> Result<Frame> {
        let codes = state_codes();
        let mut rejected = Frame::empty(frame.headers.clone());

        for col_name in &opts.state_columns {
            let Some(col) = frame.col(col_name) else {
                continue;
            };
            for row in &mut frame.rows {
                row[col] = row[col].replace([' ', '-'], "");
            }
            let mut bad = split_off(frame, |row| {
                !row[col].is_empty() && !codes.contains(row[col].as_str())
            });
            for row in &mut bad.rows {
                row[col].clear();
            }
            rejected.rows.append(&mut bad.rows);
        }
        info!("{} invalid states found", rejected.len());
        Ok(rejected)
    }

    fn quarantine(&self, name: &str, suffix: &str, rows: &Frame) -> Result<()> {
        let key = format!("{}_{}.csv", name, suffix);
        self.storage
            .store(&self.quarantine_bucket, &key, &rows.to_csv_bytes()?)
    }
}

/// Collapse embedded newlines and uppercase every cell outside id columns
fn normalize_text(frame: &mut Frame, id_cols: &[usize]) {
    for row in &mut frame.rows {
        for (i, cell) in row.iter_mut().enumerate() {
            let flat = cell.replace(['\r', '\n'], " ");
            *cell = if id_cols.contains(&i) {
                flat.trim().to_string()
            } else {
                flat.trim().to_uppercase()
            };
        }
    }
}

/// Rewrite recognizable dates as ISO; unparseable values are blanked
fn normalize_dates(frame: &mut Frame, extra: &[String]) {
    let cols: Vec<usize> = frame
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            h.to_lowercase().contains("date") || extra.iter().any(|e| e == *h)
        })
        .map(|(i, _)| i)
        .collect();
    for row in &mut frame.rows {
        for &col in &cols {
            if row[col].is_empty() {
                continue;
            }
            row[col] = match parse_date(&row[col]) {
                Ok(date) => date.format("%Y-%m-%d").to_string(),
                Err(_) => String::new(),
            };
        }
    }
}

/// Remove rows matching the predicate, returning them as their own frame
fn split_off<F: FnMut(&Vec<String>) -> bool>(frame: &mut Frame, mut pred: F) -> Frame {
    let mut removed = Vec::new();
    let mut kept = Vec::new();
    for row in frame.rows.drain(..) {
        if pred(&row) {
            removed.push(row);
        } else {
            kept.push(row);
        }
    }
    frame.rows = kept;
    Frame {
        headers: frame.headers.clone(),
        rows: removed,
    }
}

fn readmit(frame: &mut Frame, mut rejected: Frame) {
    frame.rows.append(&mut rejected.rows);
}

fn ids_suffix(kind: &str, id_columns: &[String]) -> String {
    let joined = id_columns.join("_");
    let sanitized: String = joined
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", kind, sanitized)
}

/// Keep columns that are neither entirely blank nor constant
fn useful_columns(frame: &Frame) -> Frame {
    let keep: Vec<usize> = (0..frame.headers.len())
        .filter(|&col| {
            let mut values = frame.rows.iter().map(|row| row[col].as_str());
            match values.next() {
                Some(first) => values.any(|v| v != first),
                None => false,
            }
        })
        .collect();
    frame.select_columns(&keep)
}

/// Parsed pieces of a one-line address block
#[derive(Debug, Clone, PartialEq)]
pub struct AddressParts {
    pub name: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Parses free-form address blocks of the shape
/// `NAME, STREET, CITY, STATE ZIP` as ERP exports concatenate them
pub struct AddressParser {
    zip_us: Regex,
    zip_ca: Regex,
    state_names: Regex,
    state_code: Regex,
}

impl AddressParser {
    pub fn new() -> Result<Self> {
        let names: Vec<String> = US_STATES
            .iter()
            .chain(CA_PROVINCES.iter())
            .map(|(name, _)| regex::escape(name))
            .collect();
        Ok(Self {
            zip_us: Regex::new(r"\b\d{5}\b")?,
            zip_ca: Regex::new(r"[A-Za-z]\d[A-Za-z]\s?\d[A-Za-z]\d")?,
            state_names: Regex::new(&format!(r"\b({})\b", names.join("|")))?,
            state_code: Regex::new(r"\b[A-Za-z]{2}\b")?,
        })
    }

    /// None when any piece cannot be located; callers keep the raw block
    pub fn parse(&self, block: &str) -> Option<AddressParts> {
        let mut addr = block.trim().to_uppercase();

        // Zip is the rightmost match; everything after it is discarded
        let zip = last_match(&self.zip_us, &addr).or_else(|| last_match(&self.zip_ca, &addr))?;
        addr.truncate(zip.0);
        let zip = zip.1;

        // Spelled-out states collapse to their code, then the rightmost
        // two-letter word is taken as the state
        addr = self
            .state_names
            .replace_all(&addr, |caps: &regex::Captures| {
                code_for(caps.get(0).map(|m| m.as_str()).unwrap_or(""))
            })
            .into_owned();
        let state = last_match(&self.state_code, &addr)?;
        addr.truncate(state.0);
        let state = state.1;

        let parts: Vec<&str> = addr
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        let city = (*parts.last()?).to_string();
        let name = (*parts.first()?).to_string();
        Some(AddressParts {
            name,
            city,
            state,
            zip,
        })
    }
}

/// Join per-part address columns (`BADDR1..BADDR5`, block exports) into one
/// column per address role and derive Name/City/State/Zip columns from it
pub fn extract_address_blocks(frame: &mut Frame, parser: &AddressParser) -> Result<()> {
    let roles: &[(&str, &str)] = &[
        ("BillAddressBlockAddr", "BillingAddress"),
        ("ShipAddressBlockAddr", "ShippingAddress"),
        ("BADDR", "BillingAddress"),
        ("SADDR", "ShippingAddress"),
        ("ADDR", "Address"),
    ];

    for (prefix, role) in roles {
        let part_cols: Vec<usize> = frame
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.contains(prefix))
            .map(|(i, _)| i)
            .collect();
        if part_cols.is_empty() {
            continue;
        }

        let blocks: Vec<String> = frame
            .rows
            .iter()
            .map(|row| {
                part_cols
                    .iter()
                    .map(|&c| row[c].trim())
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect();

        let keep: Vec<usize> = (0..frame.headers.len())
            .filter(|i| !part_cols.contains(i))
            .collect();
        *frame = frame.select_columns(&keep);

        let parsed: Vec<Option<AddressParts>> =
            blocks.iter().map(|b| parser.parse(b)).collect();
        frame.push_column(role, blocks);
        frame.push_column(
            &format!("{}Name", role),
            parsed
                .iter()
                .map(|p| p.as_ref().map(|a| a.name.clone()).unwrap_or_default())
                .collect(),
        );
        frame.push_column(
            &format!("{}City", role),
            parsed
                .iter()
                .map(|p| p.as_ref().map(|a| a.city.clone()).unwrap_or_default())
                .collect(),
        );
        frame.push_column(
            &format!("{}State", role),
            parsed
                .iter()
                .map(|p| p.as_ref().map(|a| a.state.clone()).unwrap_or_default())
                .collect(),
        );
        frame.push_column(
            &format!("{}Zip", role),
            parsed
                .iter()
                .map(|p| p.as_ref().map(|a| a.zip.clone()).unwrap_or_default())
                .collect(),
        );
    }
    Ok(())
}

fn last_match(re: &Regex, text: &str) -> Option<(usize, String)> {
    re.find_iter(text)
        .last()
        .map(|m| (m.start(), m.as_str().to_string()))
}

fn code_for(name: &str) -> String {
    US_STATES
        .iter()
        .chain(CA_PROVINCES.iter())
        .find(|(full, _)| full.eq_ignore_ascii_case(name))
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| name.to_string())
}
