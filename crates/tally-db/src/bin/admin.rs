//! # Tally Administration Tool
//!
//! Installs the schema, lists taxes and reconciles numbering sequences.
//!
//! ## Usage
//! ```bash
//! # Create or migrate the database, then print the installed taxes
//! cargo run -p tally-db --bin tally-admin -- install --db ./tally.db
//!
//! # List taxes
//! cargo run -p tally-db --bin tally-admin -- taxes
//!
//! # Create missing fiscal year / series sequence records
//! cargo run -p tally-db --bin tally-admin -- check-sequences --config ./tally.toml
//! ```
//!
//! Logging follows `RUST_LOG`; the default is `info,tally=debug,sqlx=warn`.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use tally_core::Tax;
use tally_db::migrations::migration_status;
use tally_db::{Database, TallyConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Install,
    Taxes,
    CheckSequences,
}

#[derive(Debug)]
struct Args {
    command: Command,
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

fn print_help() {
    println!("Tally administration tool");
    println!();
    println!("Usage: tally-admin <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  install            Create/migrate the schema and list default taxes");
    println!("  taxes              List taxes, highest rate first");
    println!("  check-sequences    Create missing numbering sequence records");
    println!();
    println!("Options:");
    println!("  -d, --db <PATH>        Database file path (overrides config)");
    println!("  -c, --config <PATH>    Config file (default: platform config dir tally.toml)");
    println!("  -h, --help             Show this help message");
}

/// Parses the command line. `Ok(None)` means help was printed.
fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut command = None;
    let mut db_path = None;
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                let value = args.get(i + 1).ok_or("--db needs a path")?;
                db_path = Some(PathBuf::from(value));
                i += 1;
            }
            "--config" | "-c" => {
                let value = args.get(i + 1).ok_or("--config needs a path")?;
                config_path = Some(PathBuf::from(value));
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "install" => command = Some(Command::Install),
            "taxes" => command = Some(Command::Taxes),
            "check-sequences" => command = Some(Command::CheckSequences),
            other => return Err(format!("unknown argument: {}", other)),
        }
        i += 1;
    }

    let command = command.ok_or("missing command")?;
    Ok(Some(Args {
        command,
        db_path,
        config_path,
    }))
}

/// Initializes the tracing subscriber for logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_taxes(taxes: &[Tax], default_code: &str) {
    println!("{:<10} {:>8} {:>10}  DESCRIPTION", "CODE", "RATE", "SURCHARGE");
    for tax in taxes {
        let marker = if tax.is_default(default_code) { " (default)" } else { "" };
        println!(
            "{:<10} {:>8.2} {:>10.2}  {}{}",
            tax.code, tax.rate, tax.surcharge, tax.description, marker
        );
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = TallyConfig::load(args.config_path)?;
    if let Some(path) = args.db_path {
        config.database.path = path;
    }

    info!(path = %config.database.path.display(), command = ?args.command, "Opening database");
    let db = Database::from_config(&config).await?;

    match args.command {
        Command::Install => {
            let (total, applied) = migration_status(db.pool()).await?;
            println!(
                "✓ Schema installed at {} ({}/{} migrations applied)",
                config.database.path.display(),
                applied,
                total
            );
            print_taxes(&db.taxes().all().await?, &config.records.default_tax);
        }
        Command::Taxes => {
            print_taxes(&db.taxes().all().await?, &config.records.default_tax);
        }
        Command::CheckSequences => {
            let report = db.sequences().check().await?;
            println!(
                "✓ Examined {} fiscal year/series pairs, created {} records",
                report.examined, report.created
            );
            for failure in &report.failures {
                println!(
                    "⚠ {} / {}: {}",
                    failure.fiscal_year, failure.series, failure.reason
                );
            }
        }
    }

    db.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    let args = match parse_args(&args) {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!();
            print_help();
            return ExitCode::from(2);
        }
    };

    init_tracing();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
