//! LedgerLift CLI - ERP export classification and reconciliation
//!
//! Usage:
//!   ledgerlift extract-iif --file export.iif --list INVITEM --trns-type INVOICE
//!   ledgerlift enrich --file items.csv --company ACME --kind item
//!   ledgerlift reconcile --headers h.csv --lines l.csv --tolerance 0.1

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::ExtractIif {
            file,
            lists,
            trns_types,
            out,
        } => commands::cmd_extract_iif(&file, &lists, &trns_types, out.as_deref()),
        Commands::Enrich {
            file,
            erp,
            kind,
            company,
            incremental,
            seed,
            json,
        } => commands::cmd_enrich(
            &cli.data_dir,
            &file,
            &erp,
            &kind,
            &company,
            incremental,
            seed,
            json,
        ),
        Commands::Clean {
            file,
            id_columns,
            numeric_ids,
            zip_columns,
            state_columns,
            drop_invalid,
            just_useful_columns,
            out,
        } => {
            let opts = ledgerlift_core::CleanOptions {
                id_columns,
                numeric_ids,
                extra_date_columns: Vec::new(),
                zip_columns,
                state_columns,
                keep_invalid_as_null: !drop_invalid,
                just_useful_columns,
            };
            commands::cmd_clean(&cli.data_dir, &file, &opts, out.as_deref())
        }
        Commands::Reconcile {
            headers,
            lines,
            erp,
            tolerance,
            out,
        } => commands::cmd_reconcile(&headers, &lines, &erp, tolerance, out.as_deref()),
    }
}
