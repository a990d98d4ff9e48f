//! Database schema definition

/// SQL schema for the ControlForge database
pub const SCHEMA: &str = r#"
-- Imported compliance frameworks; one row per named source
CREATE TABLE IF NOT EXISTS compliance_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    short_name TEXT,
    description TEXT,
    version TEXT,
    source_file TEXT,
    control_count INTEGER DEFAULT 0,
    evidence_count INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    color TEXT DEFAULT '#667eea',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

-- Control domains, scoped per source
CREATE TABLE IF NOT EXISTS domains (
    id TEXT PRIMARY KEY,
    source_id INTEGER,
    name TEXT NOT NULL,
    description TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(source_id) REFERENCES compliance_sources(id),
    UNIQUE(source_id, name)
);

-- Evidence / audit artifact catalog
CREATE TABLE IF NOT EXISTS evidence (
    id TEXT PRIMARY KEY,
    source_id INTEGER,
    ref_id TEXT NOT NULL,
    title TEXT,
    domain TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(source_id) REFERENCES compliance_sources(id),
    UNIQUE(source_id, ref_id)
);

-- Controls; mappings is JSON text ({framework: [refs]})
CREATE TABLE IF NOT EXISTS controls (
    id TEXT PRIMARY KEY,
    source_id INTEGER,
    ccf_id TEXT NOT NULL,
    domain_id TEXT,
    title TEXT,
    description TEXT,
    type TEXT,
    theme TEXT,
    guidance TEXT,
    testing TEXT,
    mappings TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(source_id) REFERENCES compliance_sources(id),
    FOREIGN KEY(domain_id) REFERENCES domains(id),
    UNIQUE(source_id, ccf_id)
);

-- Control-to-evidence junction
CREATE TABLE IF NOT EXISTS control_evidence (
    control_id TEXT,
    evidence_id TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (control_id, evidence_id),
    FOREIGN KEY(control_id) REFERENCES controls(id) ON DELETE CASCADE,
    FOREIGN KEY(evidence_id) REFERENCES evidence(id) ON DELETE CASCADE
);

-- One row per completed import run
CREATE TABLE IF NOT EXISTS import_history (
    id TEXT PRIMARY KEY,
    source_id INTEGER,
    source_file TEXT,
    source_type TEXT,
    controls_imported INTEGER,
    evidence_imported INTEGER,
    domains_created INTEGER,
    imported_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    notes TEXT,
    FOREIGN KEY(source_id) REFERENCES compliance_sources(id)
);

CREATE INDEX IF NOT EXISTS idx_controls_source ON controls(source_id);
CREATE INDEX IF NOT EXISTS idx_controls_domain ON controls(domain_id);
CREATE INDEX IF NOT EXISTS idx_controls_type ON controls(type);
CREATE INDEX IF NOT EXISTS idx_controls_theme ON controls(theme);
CREATE INDEX IF NOT EXISTS idx_evidence_source ON evidence(source_id);
CREATE INDEX IF NOT EXISTS idx_evidence_domain ON evidence(domain);
CREATE INDEX IF NOT EXISTS idx_domains_source ON domains(source_id);
CREATE INDEX IF NOT EXISTS idx_control_evidence_control ON control_evidence(control_id);
CREATE INDEX IF NOT EXISTS idx_control_evidence_evidence ON control_evidence(evidence_id);
"#;

/// Drop statements in dependency order, for forced recreation.
pub const DROP_ALL: &str = r#"
DROP TABLE IF EXISTS control_evidence;
DROP TABLE IF EXISTS controls;
DROP TABLE IF EXISTS evidence;
DROP TABLE IF EXISTS domains;
DROP TABLE IF EXISTS import_history;
DROP TABLE IF EXISTS compliance_sources;
"#;
