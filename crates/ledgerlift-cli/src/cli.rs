//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// LedgerLift - Classify and reconcile ERP accounting exports
#[derive(Parser)]
#[command(name = "ledgerlift")]
#[command(about = "Entity classification and reconciliation for ERP exports", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory holding the flat-file store (one subdirectory per bucket)
    #[arg(long, default_value = "ledgerlift-data", global = true)]
    pub data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a QuickBooks IIF export into per-table CSV files
    ExtractIif {
        /// IIF file to read
        #[arg(short, long)]
        file: PathBuf,

        /// List table to extract (CUST, VEND, INVITEM, ...); repeatable
        #[arg(long = "list")]
        lists: Vec<String>,

        /// Transaction type to extract (INVOICE, BILL, ...); repeatable
        #[arg(long = "trns-type")]
        trns_types: Vec<String>,

        /// Output directory (defaults to the input file's directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Enrich an extracted entity table against the category store
    Enrich {
        /// Extracted entity CSV (as produced by extract-iif or an ODBC dump)
        #[arg(short, long)]
        file: PathBuf,

        /// Source ERP: quickbooks, sage50, dynamicsgp
        #[arg(long, default_value = "quickbooks")]
        erp: String,

        /// Entity kind: item, customer, vendor
        #[arg(short, long, default_value = "item")]
        kind: String,

        /// Company the run belongs to; scopes store claims
        #[arg(short, long)]
        company: String,

        /// Use the incremental mode (classifier fallback) instead of
        /// cold-start sentinels
        #[arg(long)]
        incremental: bool,

        /// Classifier RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate and normalize a raw table, quarantining rejected rows
    Clean {
        /// CSV file to clean
        #[arg(short, long)]
        file: PathBuf,

        /// Identity column; repeatable for composite ids
        #[arg(long = "id-column")]
        id_columns: Vec<String>,

        /// Require id columns to be all digits
        #[arg(long)]
        numeric_ids: bool,

        /// Zip code column to validate; repeatable
        #[arg(long = "zip-column")]
        zip_columns: Vec<String>,

        /// State/province column to validate; repeatable
        #[arg(long = "state-column")]
        state_columns: Vec<String>,

        /// Drop rows with invalid zip/state instead of blanking the cell
        #[arg(long)]
        drop_invalid: bool,

        /// Drop columns that are entirely blank or never vary
        #[arg(long)]
        just_useful_columns: bool,

        /// Output path (defaults to `<input>_clean.csv`)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Drop transactions whose lines do not sum to the header total
    Reconcile {
        /// Extracted header CSV
        #[arg(long)]
        headers: PathBuf,

        /// Extracted line CSV
        #[arg(long)]
        lines: PathBuf,

        /// Source ERP: quickbooks, sage50, dynamicsgp
        #[arg(long, default_value = "quickbooks")]
        erp: String,

        /// Maximum allowed |header total - line sum|
        #[arg(short, long, default_value = "0.1")]
        tolerance: f64,

        /// Output directory (defaults to the header file's directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
