//! ControlForge - Multi-format compliance framework importer
//!
//! Imports compliance frameworks (Excel, JSON, CSV, XML, ZIP) into a
//! SQLite database with idempotent natural-key upserts.

use anyhow::Result;
use controlforge::cli::{delete, init, seed, sources, validate, Cli, Commands};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let db_path = Path::new(&cli.db);

    match cli.command {
        Commands::Init(args) => {
            init(db_path, &args)?;
        }

        Commands::Seed(args) => {
            if !seed(db_path, &args)? {
                std::process::exit(1);
            }
        }

        Commands::Validate(args) => {
            if !validate(&args)? {
                std::process::exit(1);
            }
        }

        Commands::Sources(args) => {
            sources(db_path, &args)?;
        }

        Commands::Delete(args) => {
            delete(db_path, &args)?;
        }
    }

    Ok(())
}
