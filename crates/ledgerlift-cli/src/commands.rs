//! CLI command implementations
//!
//! - `cmd_extract_iif` - split an IIF export into per-table CSVs
//! - `cmd_enrich` - run one enrichment pass for a company
//! - `cmd_reconcile` - prune transactions that fail reconciliation

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;
use ledgerlift_core::{
    clean::{extract_address_blocks, AddressParser, CleanOptions, Cleaner},
    enrich::{Enricher, EnrichmentContext},
    iif::{extract_list, extract_transactions, read_iif},
    models::{EntityKind, Erp},
    reconcile::{table_to_csv, validate},
    storage::LocalStore,
    Frame,
};

pub fn cmd_extract_iif(
    file: &Path,
    lists: &[String],
    trns_types: &[String],
    out: Option<&Path>,
) -> Result<()> {
    if lists.is_empty() && trns_types.is_empty() {
        bail!("Nothing to extract; pass at least one --list or --trns-type");
    }

    println!("Reading {}...", file.display());
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    // Legacy exports are often Windows-1252; stray high bytes become U+FFFD
    // rather than aborting the extract
    let text = String::from_utf8_lossy(&bytes);
    let raw = read_iif(text.as_bytes()).context("Failed to parse IIF file")?;

    let out_dir = output_dir(file, out);
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("export");

    let parser = AddressParser::new().context("Failed to build address parser")?;
    for table in lists {
        let mut frame = extract_list(&raw, table)
            .with_context(|| format!("Failed to extract {} list", table))?;
        // Per-part address columns collapse into one block plus parsed
        // Name/City/State/Zip, as list exports spread them across BADDR1..N
        extract_address_blocks(&mut frame, &parser)?;
        let path = out_dir.join(format!("{}_{}.csv", stem, table.to_lowercase()));
        write_frame(&frame, &path)?;
        println!("  {} rows of {} -> {}", frame.len(), table, path.display());
    }

    for trns_type in trns_types {
        let (headers, lines) = extract_transactions(&raw, trns_type)
            .with_context(|| format!("Failed to extract {} transactions", trns_type))?;
        let header_path = out_dir.join(format!("{}_{}_headers.csv", stem, trns_type.to_lowercase()));
        let line_path = out_dir.join(format!("{}_{}_lines.csv", stem, trns_type.to_lowercase()));
        write_frame(&headers, &header_path)?;
        write_frame(&lines, &line_path)?;
        println!(
            "  {} {} headers, {} lines -> {}, {}",
            headers.len(),
            trns_type,
            lines.len(),
            header_path.display(),
            line_path.display()
        );
    }

    println!("Done.");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_enrich(
    data_dir: &Path,
    file: &Path,
    erp: &str,
    kind: &str,
    company: &str,
    incremental: bool,
    seed: u64,
    json: bool,
) -> Result<()> {
    let erp = parse_erp(erp)?;
    let Some(kind) = EntityKind::from_str(kind) else {
        bail!("Unknown entity kind '{}'; expected item, customer, or vendor", kind);
    };

    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let frame = Frame::from_csv(bytes.as_slice()).context("Failed to parse entity CSV")?;
    let entities = erp
        .mapping()
        .entities_from_frame(&frame, kind)
        .context("Failed to map entities")?;
    println!(
        "Enriching {} {} entities for {}...",
        entities.len(),
        kind.as_str().to_lowercase(),
        company
    );

    debug!("Using data dir {}", data_dir.display());
    let storage = LocalStore::new(data_dir)
        .with_context(|| format!("Failed to open data dir {}", data_dir.display()))?;
    let ctx = EnrichmentContext {
        storage: &storage,
        company: company.to_string(),
        store_bucket: "store".to_string(),
        store_key: "categories.csv".to_string(),
        output_bucket: "enriched".to_string(),
        output_key: format!(
            "{}_{}.csv",
            sanitize(company),
            kind.as_str().to_lowercase()
        ),
        seed,
    };
    let enricher = Enricher::new(&ctx);
    let (enriched, run) = if incremental {
        enricher.incremental(entities, kind)
    } else {
        enricher.cold_start(entities, kind)
    }
    .context("Enrichment failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("  matched by keyword: {}", run.matched_by_keyword);
        println!("  predicted:          {}", run.predicted);
        println!("  defaulted:          {}", run.defaulted);
        println!("  records claimed:    {}", run.claimed);
        println!(
            "Wrote {} enriched rows to {}/enriched/{}",
            enriched.len(),
            data_dir.display(),
            ctx.output_key
        );
    }
    Ok(())
}

pub fn cmd_clean(
    data_dir: &Path,
    file: &Path,
    opts: &CleanOptions,
    out: Option<&Path>,
) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let frame = Frame::from_csv(bytes.as_slice()).context("Failed to parse CSV")?;
    let before = frame.len();

    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("table");
    let storage = LocalStore::new(data_dir)
        .with_context(|| format!("Failed to open data dir {}", data_dir.display()))?;
    let cleaner = Cleaner::new(&storage, "raw");
    let cleaned = cleaner
        .clean(frame, stem, opts)
        .context("Cleaning failed")?;

    let out_path = match out {
        Some(path) => path.to_path_buf(),
        None => output_dir(file, None).join(format!("{}_clean.csv", stem)),
    };
    write_frame(&cleaned, &out_path)?;
    println!(
        "Cleaned {}: {} rows in, {} rows out -> {}",
        file.display(),
        before,
        cleaned.len(),
        out_path.display()
    );
    println!(
        "Quarantined rows (if any) are under {}/raw-c/",
        data_dir.display()
    );
    Ok(())
}

pub fn cmd_reconcile(
    headers_file: &Path,
    lines_file: &Path,
    erp: &str,
    tolerance: f64,
    out: Option<&Path>,
) -> Result<()> {
    let mapping = parse_erp(erp)?.mapping();

    let bytes = fs::read(headers_file)
        .with_context(|| format!("Failed to read {}", headers_file.display()))?;
    let headers = mapping
        .headers_from_frame(&Frame::from_csv(bytes.as_slice())?)
        .context("Failed to map headers")?;
    let bytes = fs::read(lines_file)
        .with_context(|| format!("Failed to read {}", lines_file.display()))?;
    let lines = mapping
        .lines_from_frame(&Frame::from_csv(bytes.as_slice())?)
        .context("Failed to map lines")?;

    println!(
        "Reconciling {} headers against {} lines (tolerance {})...",
        headers.len(),
        lines.len(),
        tolerance
    );
    let (clean_headers, clean_lines, report) = validate(headers, lines, tolerance);

    if report.mismatched_ids.is_empty() {
        println!("  all {} joined transactions reconcile", report.checked);
    } else {
        println!(
            "  {} of {} transactions excluded: {}",
            report.mismatched_ids.len(),
            report.checked,
            report.mismatched_ids.join(", ")
        );
    }

    let out_dir = output_dir(headers_file, out);
    let header_path = reconciled_path(&out_dir, headers_file);
    let line_path = reconciled_path(&out_dir, lines_file);
    fs::write(&header_path, table_to_csv(&clean_headers)?)
        .with_context(|| format!("Failed to write {}", header_path.display()))?;
    fs::write(&line_path, table_to_csv(&clean_lines)?)
        .with_context(|| format!("Failed to write {}", line_path.display()))?;
    println!(
        "Wrote {} headers -> {}, {} lines -> {}",
        clean_headers.len(),
        header_path.display(),
        clean_lines.len(),
        line_path.display()
    );
    Ok(())
}

fn parse_erp(s: &str) -> Result<Erp> {
    match Erp::from_str(s) {
        Some(erp) => Ok(erp),
        None => bail!(
            "Unknown ERP '{}'; expected quickbooks, sage50, or dynamicsgp",
            s
        ),
    }
}

fn output_dir(input: &Path, out: Option<&Path>) -> PathBuf {
    match out {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
    }
}

fn reconciled_path(out_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("table");
    out_dir.join(format!("{}_reconciled.csv", stem))
}

fn write_frame(frame: &Frame, path: &Path) -> Result<()> {
    fs::write(path, frame.to_csv_bytes()?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn sanitize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
