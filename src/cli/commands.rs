//! Command implementations

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::adapters::ValidationReport;
use crate::cli::{DeleteArgs, InitArgs, SeedArgs, SourcesArgs, ValidateArgs};
use crate::ingest::mapping::CustomMappings;
use crate::seed::{run_seed, SeedOutcome, SeedRequest, SourceIdentity};
use crate::storage::Database;

/// Create (or force-recreate) the database schema
pub fn init(db_path: &Path, args: &InitArgs) -> Result<()> {
    let db = Database::open(db_path)?;
    if args.force {
        db.recreate()?;
        println!("✓ Recreated database schema at {:?}", db_path);
    } else {
        println!("✓ Database ready at {:?}", db_path);
    }
    Ok(())
}

/// Import a source file. Returns false when the import did not complete.
pub fn seed(db_path: &Path, args: &SeedArgs) -> Result<bool> {
    let custom_mappings = match &args.config {
        Some(path) => load_custom_mappings(Path::new(path))?,
        None => None,
    };

    let request = SeedRequest {
        source: PathBuf::from(&args.source),
        db_path: db_path.to_path_buf(),
        force_recreate: args.force,
        format: args.format,
        sheet_main: args.sheet_main.clone(),
        sheet_guidance: args.sheet_guidance.clone(),
        sheet_evidence: args.sheet_evidence.clone(),
        validate_only: false,
        custom_mappings,
        identity: SourceIdentity {
            name: args.source_name.clone(),
            short_name: args.source_short.clone(),
            description: args.source_desc.clone(),
            version: args.source_version.clone(),
            source_file: Some(args.source.clone()),
        },
    };

    let outcome = run_seed(&request);
    print_outcome(&outcome);
    Ok(outcome.success)
}

/// Validate a source without touching the database.
pub fn validate(args: &ValidateArgs) -> Result<bool> {
    let custom_mappings = match &args.config {
        Some(path) => load_custom_mappings(Path::new(path))?,
        None => None,
    };

    let request = SeedRequest {
        source: PathBuf::from(&args.source),
        db_path: PathBuf::new(),
        force_recreate: false,
        format: args.format,
        sheet_main: args.sheet_main.clone(),
        sheet_guidance: args.sheet_guidance.clone(),
        sheet_evidence: args.sheet_evidence.clone(),
        validate_only: true,
        custom_mappings,
        identity: SourceIdentity::default(),
    };

    let outcome = run_seed(&request);
    print_outcome(&outcome);
    Ok(outcome.success)
}

/// List sources, or toggle one active/inactive.
pub fn sources(db_path: &Path, args: &SourcesArgs) -> Result<()> {
    let db = Database::open(db_path)?;

    if let Some(name) = &args.toggle {
        let source = db
            .find_source_by_name(name)?
            .with_context(|| format!("No compliance source named '{name}'"))?;
        db.set_source_active(source.id, !source.is_active)?;
        let state = if source.is_active { "inactive" } else { "active" };
        println!("✓ Source '{}' is now {}", source.name, state);
        return Ok(());
    }

    let sources = db.list_sources()?;
    if sources.is_empty() {
        println!("No compliance sources imported yet.");
        return Ok(());
    }

    println!(
        "{:<4} {:<30} {:<10} {:>9} {:>9}  {}",
        "ID", "Name", "Version", "Controls", "Evidence", "Active"
    );
    for source in sources {
        println!(
            "{:<4} {:<30} {:<10} {:>9} {:>9}  {}",
            source.id,
            source.name,
            source.version.as_deref().unwrap_or("-"),
            source.control_count,
            source.evidence_count,
            if source.is_active { "yes" } else { "no" }
        );
    }
    Ok(())
}

/// Delete a source and everything that belongs to it.
pub fn delete(db_path: &Path, args: &DeleteArgs) -> Result<()> {
    let db = Database::open(db_path)?;
    let source = db
        .find_source_by_name(&args.name)?
        .with_context(|| format!("No compliance source named '{}'", args.name))?;

    db.delete_source(source.id)?;
    println!(
        "✓ Deleted source '{}' ({} controls, {} evidence items)",
        source.name, source.control_count, source.evidence_count
    );
    Ok(())
}

/// Load custom column mappings from a JSON or YAML file.
pub fn load_custom_mappings(path: &Path) -> Result<Option<CustomMappings>> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "yaml" | "yml" => {
            let mappings: CustomMappings = serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {:?}", path))?;
            Ok(Some(mappings))
        }
        "json" => {
            let mappings: CustomMappings = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {:?}", path))?;
            Ok(Some(mappings))
        }
        other => {
            warn!("unsupported config file format: {other}");
            Ok(None)
        }
    }
}

fn print_report(label: &str, report: &ValidationReport) {
    for error in &report.errors {
        println!("  ✗ [{label}] {error}");
    }
    for warning in &report.warnings {
        println!("  ⚠ [{label}] {warning}");
    }
    for info in &report.info {
        println!("    [{label}] {info}");
    }
}

fn print_outcome(outcome: &SeedOutcome) {
    if let Some(report) = &outcome.source_validation {
        print_report("source", report);
    }
    if let Some(full) = &outcome.data_validation {
        print_report("controls", &full.controls);
        print_report("evidence", &full.evidence);
        print_report("references", &full.references);
    }
    if let Some(quality) = &outcome.quality {
        println!("  Data quality score: {:.1}%", quality.overall_score);
        for recommendation in &quality.recommendations {
            println!("    - {recommendation}");
        }
    }
    if let Some(stats) = &outcome.stats {
        println!("✓ Import complete:");
        println!("  Controls:       {}", stats.controls_imported);
        println!("  Evidence:       {}", stats.evidence_imported);
        println!("  Domains:        {}", stats.domains_created);
        println!("  Evidence links: {}", stats.evidence_links);
    }
    if !outcome.success {
        for error in &outcome.errors {
            println!("✗ {error}");
        }
    }
}
