//! SQLite storage layer for ControlForge
//!
//! This module handles persistent storage of:
//! - Compliance sources (imported frameworks)
//! - Controls, domains, and evidence rows
//! - Control-to-evidence links
//! - Import history

mod schema;

pub use schema::{DROP_ALL, SCHEMA};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Default colors assigned round-robin to new compliance sources.
pub const SOURCE_COLORS: &[&str] = &[
    "#667eea", "#f093fb", "#4facfe", "#43e97b", "#fa709a",
    "#a8edea", "#fed6e3", "#d299c2", "#fef9d7", "#d4fc79",
];

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

/// One compliance source row.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub id: i64,
    pub name: String,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub source_file: Option<String>,
    pub control_count: i64,
    pub evidence_count: i64,
    pub is_active: bool,
    pub color: String,
}

/// Fields for resolving or creating a compliance source.
#[derive(Debug, Clone, Default)]
pub struct NewSource {
    pub name: String,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub source_file: Option<String>,
    pub color: Option<String>,
}

/// Scalar control fields written on insert or update.
#[derive(Debug, Clone, Default)]
pub struct ControlFields {
    pub domain_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub control_type: Option<String>,
    pub theme: Option<String>,
    pub guidance: Option<String>,
    pub testing: Option<String>,
    pub mappings_json: String,
}

/// A control row as persisted.
#[derive(Debug, Clone)]
pub struct StoredControl {
    pub id: String,
    pub ccf_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub control_type: Option<String>,
    pub theme: Option<String>,
    pub guidance: Option<String>,
    pub testing: Option<String>,
    pub mappings_json: String,
}

/// One import history row.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub source_id: i64,
    pub source_file: String,
    pub source_type: String,
    pub controls_imported: i64,
    pub evidence_imported: i64,
    pub domains_created: i64,
    pub notes: String,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    /// Drop and recreate all tables
    pub fn recreate(&self) -> Result<()> {
        self.conn
            .execute_batch(DROP_ALL)
            .context("Failed to drop tables")?;
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to recreate database schema")?;
        Ok(())
    }

    // ==================== Transactions ====================

    pub fn begin(&self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .context("Failed to begin transaction")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("Failed to commit transaction")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .context("Failed to roll back transaction")?;
        Ok(())
    }

    // ==================== Compliance Sources ====================

    /// Resolve a source by exact name, creating it if absent. Creation
    /// assigns the next round-robin palette color unless one is given.
    pub fn get_or_create_source(&self, source: &NewSource) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM compliance_sources WHERE name = ?1",
                params![source.name],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up compliance source")?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let color = match &source.color {
            Some(color) => color.clone(),
            None => {
                let count: i64 = self
                    .conn
                    .query_row("SELECT COUNT(*) FROM compliance_sources", [], |row| {
                        row.get(0)
                    })
                    .context("Failed to count compliance sources")?;
                SOURCE_COLORS[count as usize % SOURCE_COLORS.len()].to_string()
            }
        };

        let short_name = source
            .short_name
            .clone()
            .unwrap_or_else(|| source.name.chars().take(15).collect());

        self.conn
            .execute(
                "INSERT INTO compliance_sources (name, short_name, description, version, source_file, color)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source.name,
                    short_name,
                    source.description,
                    source.version,
                    source.source_file,
                    color
                ],
            )
            .context("Failed to create compliance source")?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_source_by_name(&self, name: &str) -> Result<Option<SourceRow>> {
        self.conn
            .query_row(
                "SELECT id, name, short_name, description, version, source_file,
                        control_count, evidence_count, is_active, color
                 FROM compliance_sources WHERE name = ?1",
                params![name],
                row_to_source,
            )
            .optional()
            .context("Failed to find compliance source")
    }

    pub fn list_sources(&self) -> Result<Vec<SourceRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, short_name, description, version, source_file,
                        control_count, evidence_count, is_active, color
                 FROM compliance_sources ORDER BY name",
            )
            .context("Failed to prepare source listing")?;

        let rows = stmt
            .query_map([], row_to_source)
            .context("Failed to list compliance sources")?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }

    pub fn set_source_active(&self, source_id: i64, active: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE compliance_sources
                 SET is_active = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![active as i64, source_id],
            )
            .context("Failed to update source active flag")?;
        Ok(())
    }

    /// Delete a source and every row that belongs to it, in dependency
    /// order, within one transaction.
    pub fn delete_source(&self, source_id: i64) -> Result<()> {
        self.begin()?;
        let result = (|| -> Result<()> {
            self.conn.execute(
                "DELETE FROM control_evidence WHERE control_id IN
                 (SELECT id FROM controls WHERE source_id = ?1)",
                params![source_id],
            )?;
            self.conn
                .execute("DELETE FROM controls WHERE source_id = ?1", params![source_id])?;
            self.conn
                .execute("DELETE FROM evidence WHERE source_id = ?1", params![source_id])?;
            self.conn
                .execute("DELETE FROM domains WHERE source_id = ?1", params![source_id])?;
            self.conn.execute(
                "DELETE FROM import_history WHERE source_id = ?1",
                params![source_id],
            )?;
            self.conn.execute(
                "DELETE FROM compliance_sources WHERE id = ?1",
                params![source_id],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => self.commit(),
            Err(e) => {
                self.rollback()?;
                Err(e).context("Failed to delete compliance source")
            }
        }
    }

    /// Recompute the denormalized control/evidence counts from actual rows.
    pub fn update_source_counts(&self, source_id: i64) -> Result<()> {
        let control_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM controls WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .context("Failed to count controls")?;

        let evidence_count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM evidence WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .context("Failed to count evidence")?;

        self.conn
            .execute(
                "UPDATE compliance_sources
                 SET control_count = ?1, evidence_count = ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?3",
                params![control_count, evidence_count, source_id],
            )
            .context("Failed to update source counts")?;
        Ok(())
    }

    // ==================== Evidence ====================

    /// Upsert one evidence row by `(source_id, ref_id)`. Existing rows keep
    /// their primary key and get refreshed title/domain.
    pub fn upsert_evidence(
        &self,
        source_id: i64,
        ref_id: &str,
        title: Option<&str>,
        domain: Option<&str>,
    ) -> Result<String> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM evidence WHERE source_id = ?1 AND ref_id = ?2",
                params![source_id, ref_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up evidence")?;

        match existing {
            Some(id) => {
                self.conn
                    .execute(
                        "UPDATE evidence SET title = ?1, domain = ?2, updated_at = CURRENT_TIMESTAMP
                         WHERE id = ?3",
                        params![title, domain, id],
                    )
                    .context("Failed to update evidence")?;
                Ok(id)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                self.conn
                    .execute(
                        "INSERT INTO evidence (id, source_id, ref_id, title, domain)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![id, source_id, ref_id, title, domain],
                    )
                    .context("Failed to insert evidence")?;
                Ok(id)
            }
        }
    }

    /// Map of `ref_id -> row id` for every evidence row of a source.
    pub fn evidence_lookup(&self, source_id: i64) -> Result<HashMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT ref_id, id FROM evidence WHERE source_id = ?1")
            .context("Failed to prepare evidence lookup")?;

        let rows = stmt
            .query_map(params![source_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("Failed to build evidence lookup")?;

        let mut lookup = HashMap::new();
        for row in rows {
            let (ref_id, id) = row?;
            lookup.insert(ref_id, id);
        }
        Ok(lookup)
    }

    // ==================== Domains ====================

    /// Resolve or create a domain for a source. Returns the domain id and
    /// whether a new row was created.
    pub fn get_or_create_domain(&self, source_id: i64, name: &str) -> Result<(String, bool)> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM domains WHERE source_id = ?1 AND name = ?2",
                params![source_id, name],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up domain")?;

        if let Some(id) = existing {
            return Ok((id, false));
        }

        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO domains (id, source_id, name) VALUES (?1, ?2, ?3)",
                params![id, source_id, name],
            )
            .context("Failed to insert domain")?;
        Ok((id, true))
    }

    // ==================== Controls ====================

    pub fn find_control(&self, source_id: i64, ccf_id: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT id FROM controls WHERE source_id = ?1 AND ccf_id = ?2",
                params![source_id, ccf_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up control")
    }

    pub fn insert_control(
        &self,
        source_id: i64,
        ccf_id: &str,
        fields: &ControlFields,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO controls
                 (id, source_id, ccf_id, domain_id, title, description, type, theme, guidance, testing, mappings)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    source_id,
                    ccf_id,
                    fields.domain_id,
                    fields.title,
                    fields.description,
                    fields.control_type,
                    fields.theme,
                    fields.guidance,
                    fields.testing,
                    fields.mappings_json
                ],
            )
            .context("Failed to insert control")?;
        Ok(id)
    }

    /// Rewrite a control's scalar fields, dropping its evidence links first
    /// so the caller can relink from the incoming row.
    pub fn update_control(&self, control_id: &str, fields: &ControlFields) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM control_evidence WHERE control_id = ?1",
                params![control_id],
            )
            .context("Failed to clear control evidence links")?;

        self.conn
            .execute(
                "UPDATE controls SET
                     domain_id = ?1, title = ?2, description = ?3, type = ?4, theme = ?5,
                     guidance = ?6, testing = ?7, mappings = ?8, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?9",
                params![
                    fields.domain_id,
                    fields.title,
                    fields.description,
                    fields.control_type,
                    fields.theme,
                    fields.guidance,
                    fields.testing,
                    fields.mappings_json,
                    control_id
                ],
            )
            .context("Failed to update control")?;
        Ok(())
    }

    pub fn get_control(&self, source_id: i64, ccf_id: &str) -> Result<Option<StoredControl>> {
        self.conn
            .query_row(
                "SELECT id, ccf_id, title, description, type, theme, guidance, testing, mappings
                 FROM controls WHERE source_id = ?1 AND ccf_id = ?2",
                params![source_id, ccf_id],
                |row| {
                    Ok(StoredControl {
                        id: row.get(0)?,
                        ccf_id: row.get(1)?,
                        title: row.get(2)?,
                        description: row.get(3)?,
                        control_type: row.get(4)?,
                        theme: row.get(5)?,
                        guidance: row.get(6)?,
                        testing: row.get(7)?,
                        mappings_json: row.get(8)?,
                    })
                },
            )
            .optional()
            .context("Failed to read control")
    }

    pub fn count_controls(&self, source_id: i64) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM controls WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .context("Failed to count controls")
    }

    // ==================== Links & History ====================

    /// Insert-if-absent junction row between a control and evidence.
    pub fn link_evidence(&self, control_id: &str, evidence_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO control_evidence (control_id, evidence_id) VALUES (?1, ?2)",
                params![control_id, evidence_id],
            )
            .context("Failed to link evidence")?;
        Ok(())
    }

    pub fn count_links(&self, control_id: &str) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM control_evidence WHERE control_id = ?1",
                params![control_id],
                |row| row.get(0),
            )
            .context("Failed to count evidence links")
    }

    pub fn record_import(&self, record: &ImportRecord) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO import_history
                 (id, source_id, source_file, source_type, controls_imported, evidence_imported, domains_created, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    record.source_id,
                    record.source_file,
                    record.source_type,
                    record.controls_imported,
                    record.evidence_imported,
                    record.domains_created,
                    record.notes
                ],
            )
            .context("Failed to record import history")?;
        Ok(())
    }

    /// Total rows per table for a source, in dependency order. Used by
    /// tests and the sources listing.
    pub fn source_row_counts(&self, source_id: i64) -> Result<(i64, i64, i64, i64)> {
        let controls = self.count_controls(source_id)?;
        let evidence: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM evidence WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        let domains: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM domains WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        let history: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM import_history WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok((controls, evidence, domains, history))
    }
}

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRow> {
    Ok(SourceRow {
        id: row.get(0)?,
        name: row.get(1)?,
        short_name: row.get(2)?,
        description: row.get(3)?,
        version: row.get(4)?,
        source_file: row.get(5)?,
        control_count: row.get(6)?,
        evidence_count: row.get(7)?,
        is_active: row.get::<_, i64>(8)? != 0,
        color: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_named(name: &str) -> NewSource {
        NewSource {
            name: name.to_string(),
            ..NewSource::default()
        }
    }

    #[test]
    fn test_source_creation_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let a = db.get_or_create_source(&source_named("SCF 2024")).unwrap();
        let b = db.get_or_create_source(&source_named("SCF 2024")).unwrap();
        assert_eq!(a, b);
        assert_eq!(db.list_sources().unwrap().len(), 1);
    }

    #[test]
    fn test_round_robin_colors() {
        let db = Database::open_in_memory().unwrap();
        db.get_or_create_source(&source_named("First")).unwrap();
        db.get_or_create_source(&source_named("Second")).unwrap();

        let sources = db.list_sources().unwrap();
        let first = sources.iter().find(|s| s.name == "First").unwrap();
        let second = sources.iter().find(|s| s.name == "Second").unwrap();
        assert_eq!(first.color, SOURCE_COLORS[0]);
        assert_eq!(second.color, SOURCE_COLORS[1]);
    }

    #[test]
    fn test_short_name_defaults_to_prefix() {
        let db = Database::open_in_memory().unwrap();
        db.get_or_create_source(&source_named("A Very Long Compliance Framework Name"))
            .unwrap();
        let source = db
            .find_source_by_name("A Very Long Compliance Framework Name")
            .unwrap()
            .unwrap();
        assert_eq!(source.short_name.as_deref(), Some("A Very Long Com"));
    }

    #[test]
    fn test_evidence_upsert_keeps_id() {
        let db = Database::open_in_memory().unwrap();
        let source_id = db.get_or_create_source(&source_named("SCF")).unwrap();

        let first = db
            .upsert_evidence(source_id, "E-1", Some("Old title"), None)
            .unwrap();
        let second = db
            .upsert_evidence(source_id, "E-1", Some("New title"), Some("Access"))
            .unwrap();
        assert_eq!(first, second);

        let lookup = db.evidence_lookup(source_id).unwrap();
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup["E-1"], first);
    }

    #[test]
    fn test_control_upsert_and_link_idempotence() {
        let db = Database::open_in_memory().unwrap();
        let source_id = db.get_or_create_source(&source_named("SCF")).unwrap();
        let ev_id = db.upsert_evidence(source_id, "E-1", None, None).unwrap();

        let fields = ControlFields {
            title: Some("Access Policy".to_string()),
            mappings_json: "{}".to_string(),
            ..ControlFields::default()
        };
        let ctrl_id = db.insert_control(source_id, "AC-1", &fields).unwrap();

        db.link_evidence(&ctrl_id, &ev_id).unwrap();
        db.link_evidence(&ctrl_id, &ev_id).unwrap();
        assert_eq!(db.count_links(&ctrl_id).unwrap(), 1);

        // Update clears links and keeps the row id stable
        db.update_control(&ctrl_id, &fields).unwrap();
        assert_eq!(db.count_links(&ctrl_id).unwrap(), 0);
        assert_eq!(
            db.find_control(source_id, "AC-1").unwrap().as_deref(),
            Some(ctrl_id.as_str())
        );
    }

    #[test]
    fn test_domain_cache_key() {
        let db = Database::open_in_memory().unwrap();
        let source_id = db.get_or_create_source(&source_named("SCF")).unwrap();

        let (a, created_a) = db.get_or_create_domain(source_id, "Access Control").unwrap();
        let (b, created_b) = db.get_or_create_domain(source_id, "Access Control").unwrap();
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_delete_source_isolation() {
        let db = Database::open_in_memory().unwrap();
        let keep = db.get_or_create_source(&source_named("Keep")).unwrap();
        let drop = db.get_or_create_source(&source_named("Drop")).unwrap();

        for source_id in [keep, drop] {
            let ev = db.upsert_evidence(source_id, "E-1", None, None).unwrap();
            let (domain_id, _) = db.get_or_create_domain(source_id, "Access Control").unwrap();
            let fields = ControlFields {
                domain_id: Some(domain_id),
                mappings_json: "{}".to_string(),
                ..ControlFields::default()
            };
            let ctrl = db.insert_control(source_id, "AC-1", &fields).unwrap();
            db.link_evidence(&ctrl, &ev).unwrap();
            db.record_import(&ImportRecord {
                source_id,
                source_file: "test.xlsx".to_string(),
                source_type: "seed".to_string(),
                controls_imported: 1,
                evidence_imported: 1,
                domains_created: 1,
                notes: String::new(),
            })
            .unwrap();
        }

        db.delete_source(drop).unwrap();

        assert!(db.find_source_by_name("Drop").unwrap().is_none());
        assert_eq!(db.source_row_counts(drop).unwrap(), (0, 0, 0, 0));
        assert_eq!(db.source_row_counts(keep).unwrap(), (1, 1, 1, 1));
    }

    #[test]
    fn test_recreate_drops_rows() {
        let db = Database::open_in_memory().unwrap();
        db.get_or_create_source(&source_named("SCF")).unwrap();
        db.recreate().unwrap();
        assert!(db.list_sources().unwrap().is_empty());
    }
}
