//! CLI interface using clap
//!
//! Provides the command-line interface for ControlForge

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand};

use crate::adapters::FormatHint;

/// ControlForge - Multi-format compliance framework importer
#[derive(Parser, Debug)]
#[command(name = "controlforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true, default_value = "controlforge.db")]
    pub db: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database schema
    Init(InitArgs),

    /// Import a compliance framework from a source file
    Seed(SeedArgs),

    /// Validate a source file without writing anything
    Validate(ValidateArgs),

    /// List compliance sources, or toggle one active/inactive
    Sources(SourcesArgs),

    /// Delete a compliance source and all of its rows
    Delete(DeleteArgs),
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Drop and recreate all tables
    #[arg(long)]
    pub force: bool,
}

/// Arguments for seed command
#[derive(Parser, Debug)]
pub struct SeedArgs {
    /// Path to the source file or CSV folder
    #[arg(short, long)]
    pub source: String,

    /// Force recreate the database schema first
    #[arg(long)]
    pub force: bool,

    /// Source format (default: detect from extension)
    #[arg(long, value_enum, default_value_t = FormatHint::Auto)]
    pub format: FormatHint,

    /// Excel main controls sheet name
    #[arg(long)]
    pub sheet_main: Option<String>,

    /// Excel guidance sheet name
    #[arg(long)]
    pub sheet_guidance: Option<String>,

    /// Excel evidence sheet name
    #[arg(long)]
    pub sheet_evidence: Option<String>,

    /// Path to a column-mappings config file (JSON or YAML)
    #[arg(long)]
    pub config: Option<String>,

    /// Name for this compliance source
    #[arg(long)]
    pub source_name: Option<String>,

    /// Short name (e.g. CCF, SCF)
    #[arg(long)]
    pub source_short: Option<String>,

    /// Description of this compliance source
    #[arg(long)]
    pub source_desc: Option<String>,

    /// Version of this compliance framework
    #[arg(long)]
    pub source_version: Option<String>,
}

/// Arguments for validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the source file or CSV folder
    #[arg(short, long)]
    pub source: String,

    /// Source format (default: detect from extension)
    #[arg(long, value_enum, default_value_t = FormatHint::Auto)]
    pub format: FormatHint,

    /// Excel main controls sheet name
    #[arg(long)]
    pub sheet_main: Option<String>,

    /// Excel guidance sheet name
    #[arg(long)]
    pub sheet_guidance: Option<String>,

    /// Excel evidence sheet name
    #[arg(long)]
    pub sheet_evidence: Option<String>,

    /// Path to a column-mappings config file (JSON or YAML)
    #[arg(long)]
    pub config: Option<String>,
}

/// Arguments for sources command
#[derive(Parser, Debug)]
pub struct SourcesArgs {
    /// Toggle the named source active/inactive instead of listing
    #[arg(long)]
    pub toggle: Option<String>,
}

/// Arguments for delete command
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Name of the compliance source to delete
    pub name: String,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
