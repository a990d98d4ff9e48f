//! Seeding pipeline
//!
//! Drives a source file through adapter load, validation, and the natural-key
//! upsert passes into the database. The whole write phase runs inside one
//! transaction; denormalized counts are recomputed from actual rows and the
//! history row is written only after both passes complete.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::adapters::{adapter_for, AdapterOptions, FormatHint, ValidationReport};
use crate::ingest::clean::split_list_string;
use crate::ingest::mapping::CustomMappings;
use crate::ingest::{ControlsFrame, EvidenceFrame};
use crate::storage::{ControlFields, Database, ImportRecord, NewSource};
use crate::validate::{full_validation, generate_quality_report, FullReport, QualityReport};

/// Naming metadata for the compliance source being imported.
#[derive(Debug, Clone, Default)]
pub struct SourceIdentity {
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub source_file: Option<String>,
}

impl SourceIdentity {
    /// Resolve the source name: explicit override, else derived from the
    /// file name, else a timestamped fallback.
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(file) = &self.source_file {
            if let Some(stem) = Path::new(file).file_stem().and_then(|s| s.to_str()) {
                let derived = title_case(&stem.replace(['_', '-'], " "));
                if !derived.is_empty() {
                    return derived;
                }
            }
        }
        format!("Import {}", chrono::Local::now().format("%Y-%m-%d %H:%M"))
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Counters from one seeding run.
#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub source_id: i64,
    pub controls_imported: usize,
    pub evidence_imported: usize,
    pub domains_created: usize,
    pub evidence_links: usize,
}

/// Upsert both frames into the database for one compliance source.
///
/// Evidence goes first so the controls pass can resolve artifact references
/// against a complete `ref_id -> row id` lookup. Duplicate natural ids
/// within a frame overwrite in row order.
pub fn seed_frames(
    db: &Database,
    controls: &ControlsFrame,
    evidence: &EvidenceFrame,
    identity: &SourceIdentity,
) -> Result<ImportStats> {
    db.begin()?;
    match seed_frames_inner(db, controls, evidence, identity) {
        Ok(stats) => {
            db.commit()?;
            Ok(stats)
        }
        Err(e) => {
            db.rollback()?;
            Err(e)
        }
    }
}

fn seed_frames_inner(
    db: &Database,
    controls: &ControlsFrame,
    evidence: &EvidenceFrame,
    identity: &SourceIdentity,
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    let source_name = identity.resolved_name();

    let source_id = db.get_or_create_source(&NewSource {
        name: source_name.clone(),
        short_name: identity.short_name.clone(),
        description: identity.description.clone(),
        version: identity.version.clone(),
        source_file: identity.source_file.clone(),
        color: None,
    })?;
    stats.source_id = source_id;
    info!(source = %source_name, source_id, "using compliance source");

    // Evidence pass
    if !evidence.is_empty() {
        info!("inserting {} evidence items", evidence.len());
        for record in &evidence.records {
            db.upsert_evidence(
                source_id,
                &record.ref_id,
                record.title.as_deref(),
                record.domain.as_deref(),
            )?;
            stats.evidence_imported += 1;
        }
    }
    let evidence_lookup = db.evidence_lookup(source_id)?;

    // Controls pass
    info!("inserting {} controls", controls.len());
    let mut domain_cache: HashMap<String, String> = HashMap::new();

    for record in &controls.records {
        let domain_id = match &record.domain {
            Some(domain_name) => match domain_cache.get(domain_name) {
                Some(id) => Some(id.clone()),
                None => {
                    let (id, created) = db.get_or_create_domain(source_id, domain_name)?;
                    if created {
                        stats.domains_created += 1;
                    }
                    domain_cache.insert(domain_name.clone(), id.clone());
                    Some(id)
                }
            },
            None => None,
        };

        let fields = ControlFields {
            domain_id,
            title: record.title.clone(),
            description: record.description.clone(),
            control_type: record.control_type.clone(),
            theme: record.theme.clone(),
            guidance: record.guidance.clone(),
            testing: record.testing.clone(),
            mappings_json: record.mappings.to_json_string(),
        };

        let ctrl_id = match db.find_control(source_id, &record.ccf_id)? {
            Some(id) => {
                db.update_control(&id, &fields)?;
                id
            }
            None => db.insert_control(source_id, &record.ccf_id, &fields)?,
        };
        stats.controls_imported += 1;

        if let Some(artifacts) = &record.artifacts {
            for reference in split_list_string(artifacts) {
                if let Some(ev_id) = evidence_lookup.get(&reference) {
                    db.link_evidence(&ctrl_id, ev_id)?;
                    stats.evidence_links += 1;
                }
            }
        }
    }

    db.update_source_counts(source_id)?;
    db.record_import(&ImportRecord {
        source_id,
        source_file: identity
            .source_file
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        source_type: "seed".to_string(),
        controls_imported: stats.controls_imported as i64,
        evidence_imported: stats.evidence_imported as i64,
        domains_created: stats.domains_created as i64,
        notes: format!("Evidence links created: {}", stats.evidence_links),
    })?;

    info!(
        controls = stats.controls_imported,
        evidence = stats.evidence_imported,
        domains = stats.domains_created,
        links = stats.evidence_links,
        "import complete"
    );

    Ok(stats)
}

// ==================== Import stage machine ====================

/// Stages of one import run. `Validate` only advances to `Import` when the
/// validation verdict allows it; any stage can abort back to `Upload`
/// (validation never writes, so aborting before `Import` leaves no partial
/// state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportStage {
    #[default]
    Upload,
    Validate,
    Import,
    Done,
}

#[derive(Debug, Default)]
pub struct ImportSession {
    stage: ImportStage,
}

impl ImportSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> ImportStage {
        self.stage
    }

    /// Move to the next stage. Leaving `Validate` requires a passing
    /// verdict; all other transitions are unconditional.
    pub fn advance(&mut self, validation_passed: bool) -> ImportStage {
        self.stage = match self.stage {
            ImportStage::Upload => ImportStage::Validate,
            ImportStage::Validate if validation_passed => ImportStage::Import,
            ImportStage::Validate => ImportStage::Validate,
            ImportStage::Import => ImportStage::Done,
            ImportStage::Done => ImportStage::Done,
        };
        self.stage
    }

    pub fn abort(&mut self) {
        self.stage = ImportStage::Upload;
    }
}

// ==================== Top-level orchestration ====================

/// Everything `run_seed` needs, mirroring the CLI flags.
#[derive(Debug, Clone, Default)]
pub struct SeedRequest {
    pub source: PathBuf,
    pub db_path: PathBuf,
    pub force_recreate: bool,
    pub format: FormatHint,
    pub sheet_main: Option<String>,
    pub sheet_guidance: Option<String>,
    pub sheet_evidence: Option<String>,
    pub validate_only: bool,
    pub custom_mappings: Option<CustomMappings>,
    pub identity: SourceIdentity,
}

/// Structured result of one seeding invocation. Never panics through;
/// every failure lands in `errors`.
#[derive(Debug, Default)]
pub struct SeedOutcome {
    pub success: bool,
    pub source_validation: Option<ValidationReport>,
    pub data_validation: Option<FullReport>,
    pub quality: Option<QualityReport>,
    pub stats: Option<ImportStats>,
    pub errors: Vec<String>,
}

pub fn run_seed(request: &SeedRequest) -> SeedOutcome {
    let mut outcome = SeedOutcome::default();
    let mut session = ImportSession::new();

    match run_seed_inner(request, &mut outcome, &mut session) {
        Ok(()) => outcome,
        Err(e) => {
            session.abort();
            error!(error = %format!("{e:#}"), "seeding failed");
            outcome.errors.push(format!("{e:#}"));
            outcome.success = false;
            outcome
        }
    }
}

fn run_seed_inner(
    request: &SeedRequest,
    outcome: &mut SeedOutcome,
    session: &mut ImportSession,
) -> Result<()> {
    info!(source = %request.source.display(), format = ?request.format, "loading source");

    let options = AdapterOptions {
        sheet_main: request.sheet_main.clone(),
        sheet_guidance: request.sheet_guidance.clone(),
        sheet_evidence: request.sheet_evidence.clone(),
        custom_mappings: request.custom_mappings.clone(),
    };
    let mut adapter =
        adapter_for(&request.source, request.format, options).context("Unsupported source")?;

    session.advance(false); // Upload -> Validate

    let source_validation = adapter.validate();
    let source_valid = source_validation.valid;
    for warning in &source_validation.warnings {
        warn!("source validation: {warning}");
    }
    outcome.source_validation = Some(source_validation.clone());

    if !source_valid {
        outcome.errors.extend(source_validation.errors);
        return Ok(());
    }

    let (controls, evidence) = adapter.load().context("Failed to load source")?;
    if controls.is_empty() {
        outcome.errors.push("No controls found in source".to_string());
        return Ok(());
    }
    info!(
        controls = controls.len(),
        evidence = evidence.len(),
        "loaded frames"
    );

    let data_validation = full_validation(&controls, &evidence);
    for err in &data_validation.controls.errors {
        error!("control validation: {err}");
    }
    for warning in &data_validation.controls.warnings {
        warn!("control validation: {warning}");
    }

    let quality = generate_quality_report(&controls, &evidence);
    info!("data quality score: {:.1}%", quality.overall_score);
    outcome.quality = Some(quality);

    let data_valid = data_validation.valid;
    outcome.data_validation = Some(data_validation);

    if request.validate_only {
        info!("validation complete (validate-only mode)");
        outcome.success = true;
        return Ok(());
    }

    if !data_valid {
        outcome
            .errors
            .push("Data validation failed with critical errors".to_string());
        if let Some(report) = &outcome.data_validation {
            outcome.errors.extend(report.controls.errors.clone());
        }
        return Ok(());
    }

    session.advance(true); // Validate -> Import

    let db = Database::open(&request.db_path)?;
    if request.force_recreate {
        db.recreate()?;
        info!(db = %request.db_path.display(), "recreated database schema");
    }

    let mut identity = request.identity.clone();
    if identity.source_file.is_none() {
        identity.source_file = Some(request.source.display().to_string());
    }

    let stats = seed_frames(&db, &controls, &evidence, &identity)?;
    outcome.stats = Some(stats);
    outcome.success = true;

    session.advance(false); // Import -> Done
    Ok(())
}
