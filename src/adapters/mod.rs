//! Source adapters
//!
//! Each adapter turns one input format into the canonical
//! `(ControlsFrame, EvidenceFrame)` pair. Adapters share a two-phase
//! contract: `validate()` inspects structure without loading data,
//! `load()` materializes the frames and fails if validation did not pass.

mod archive;
mod csv_dir;
mod excel;
mod json;
mod xml;

pub use archive::ZipAdapter;
pub use csv_dir::CsvFolderAdapter;
pub use excel::ExcelAdapter;
pub use json::JsonAdapter;
pub use xml::XmlAdapter;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ingest::clean::{clean_opt, split_list_string};
use crate::ingest::mapping::{ColumnMapper, CustomMappings, MappingProfile};
use crate::ingest::{ControlRecord, ControlsFrame, EvidenceFrame, EvidenceRecord, Mappings, Table};

/// Fatal adapter failures, distinct from the warnings a validation report
/// carries.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("source not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("no resolvable natural-id column: {0}")]
    MissingNaturalId(String),

    #[error("archive member escapes extraction root: {0}")]
    UnsafeArchivePath(String),

    #[error("unsupported source format: {0}")]
    Unsupported(String),

    #[error("validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structural validation report.
///
/// Recoverable ambiguity (missing optional sheet, auto-detected structure)
/// lands in `warnings`/`info`; fatal conditions set `valid = false` and
/// populate `errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        ValidationReport {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            info: Vec::new(),
        }
    }
}

impl ValidationReport {
    pub fn error(&mut self, msg: impl Into<String>) {
        self.valid = false;
        self.errors.push(msg.into());
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        self.info.push(msg.into());
    }
}

/// Polymorphic adapter contract.
pub trait SourceAdapter {
    /// Inspect the source structurally without materializing data.
    fn validate(&mut self) -> ValidationReport;

    /// Materialize the canonical frames. Runs `validate()` first when it has
    /// not been run, and fails with [`AdapterError::Invalid`] when it did
    /// not pass.
    fn load(&mut self) -> Result<(ControlsFrame, EvidenceFrame), AdapterError>;
}

/// Explicit format selection for the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FormatHint {
    #[default]
    Auto,
    Excel,
    Json,
    Csv,
    Xml,
    Zip,
}

/// Options shared across adapter constructors.
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    pub sheet_main: Option<String>,
    pub sheet_guidance: Option<String>,
    pub sheet_evidence: Option<String>,
    pub custom_mappings: Option<CustomMappings>,
}

/// Pick the adapter for a source path, by explicit hint or by extension.
/// Directories are treated as CSV folders.
pub fn adapter_for(
    source: &Path,
    hint: FormatHint,
    options: AdapterOptions,
) -> Result<Box<dyn SourceAdapter>, AdapterError> {
    let hint = if hint == FormatHint::Auto {
        if source.is_dir() {
            FormatHint::Csv
        } else {
            match source
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .as_deref()
            {
                Some("xls") | Some("xlsx") | Some("xlsm") => FormatHint::Excel,
                Some("json") => FormatHint::Json,
                Some("csv") => FormatHint::Csv,
                Some("xml") => FormatHint::Xml,
                Some("zip") => FormatHint::Zip,
                other => {
                    return Err(AdapterError::Unsupported(
                        other.unwrap_or("<no extension>").to_string(),
                    ))
                }
            }
        }
    } else {
        hint
    };

    Ok(match hint {
        FormatHint::Excel => Box::new(ExcelAdapter::new(source, options)),
        FormatHint::Json => Box::new(JsonAdapter::new(source, options)),
        FormatHint::Csv => {
            // A single .csv path resolves to its containing folder
            let folder = if source.is_dir() {
                source.to_path_buf()
            } else {
                source
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."))
            };
            Box::new(CsvFolderAdapter::new(&folder, options))
        }
        FormatHint::Xml => Box::new(XmlAdapter::new(source, options)),
        FormatHint::Zip => Box::new(ZipAdapter::new(source, options)),
        FormatHint::Auto => unreachable!("auto hint resolved above"),
    })
}

// ==================== Shared frame builders ====================

/// Per-control detail supplied by a guidance sheet or file. Guidance values
/// take priority over same-field values on the main sheet.
#[derive(Debug, Clone, Default)]
pub(crate) struct GuidanceEntry {
    pub control_type: Option<String>,
    pub theme: Option<String>,
    pub guidance: Option<String>,
    pub testing: Option<String>,
    pub artifacts: Option<String>,
}

pub(crate) type GuidanceLookup = HashMap<String, GuidanceEntry>;

/// Build the per-control guidance lookup from a guidance table, keyed by
/// the cleaned natural id. A guidance table without a resolvable id column
/// yields an empty lookup (the caller reports the warning).
pub(crate) fn guidance_lookup_from_table(
    table: &Table,
    mapper: &ColumnMapper,
) -> GuidanceLookup {
    let col_map = mapper.map_columns(&table.columns, MappingProfile::Controls);
    let mut lookup = GuidanceLookup::new();

    let Some(id_col) = col_map.get("ccf_id") else {
        return lookup;
    };

    for row in &table.rows {
        let Some(ccf_id) = clean_opt(table.cell(row, id_col)) else {
            continue;
        };
        let field = |name: &str| {
            col_map
                .get(name)
                .and_then(|c| clean_opt(table.cell(row, c)))
        };
        lookup.insert(
            ccf_id,
            GuidanceEntry {
                control_type: field("type"),
                theme: field("theme"),
                guidance: field("guidance"),
                testing: field("testing"),
                artifacts: field("artifacts"),
            },
        );
    }

    lookup
}

/// Strip case-insensitive "ref" tokens (with surrounding whitespace and an
/// optional trailing '#') from a mapping column header, leaving the
/// framework name.
pub(crate) fn framework_key_from_column(column: &str) -> Option<String> {
    let mut s = column.to_string();
    loop {
        // "ref" is ASCII, so match it in place rather than searching a
        // lowercased copy whose byte offsets can diverge from the original
        // (e.g. 'İ' lowercases to a longer byte sequence).
        let Some(pos) = s.char_indices().find_map(|(i, _)| {
            let mut it = s[i..].chars();
            let matches = it.next().is_some_and(|c| c.eq_ignore_ascii_case(&'r'))
                && it.next().is_some_and(|c| c.eq_ignore_ascii_case(&'e'))
                && it.next().is_some_and(|c| c.eq_ignore_ascii_case(&'f'));
            matches.then_some(i)
        }) else {
            break;
        };

        let bytes = s.as_bytes();
        let mut start = pos;
        while start > 0 && bytes[start - 1].is_ascii_whitespace() {
            start -= 1;
        }
        let mut end = pos + 3;
        while end < s.len() && bytes[end].is_ascii_whitespace() {
            end += 1;
        }
        if end < s.len() && bytes[end] == b'#' {
            end += 1;
        }
        while end < s.len() && bytes[end].is_ascii_whitespace() {
            end += 1;
        }
        s.replace_range(start..end, "");
    }

    let key = s.trim().replace(' ', "_");
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Build the canonical controls frame from a main table, merging guidance
/// detail and extracting framework-mapping columns.
///
/// Any column whose name contains "ref" and is not claimed by the canonical
/// mapping is treated as a framework-mapping column: its header (with the
/// "ref" token stripped) becomes the framework key and its cell values are
/// split into reference lists. `row_mappings`, when given, is parallel to
/// `table.rows` and carries mapping values an adapter captured before
/// flattening (JSON/XML); a non-absent captured value wins over extracted
/// columns.
pub(crate) fn controls_frame_from_table(
    table: &Table,
    mapper: &ColumnMapper,
    guidance: &GuidanceLookup,
    row_mappings: Option<&[Mappings]>,
) -> Result<ControlsFrame, AdapterError> {
    let col_map = mapper.map_columns(&table.columns, MappingProfile::Controls);

    let Some(id_col) = col_map.get("ccf_id") else {
        return Err(AdapterError::MissingNaturalId(
            "could not find a control id column in the main table".to_string(),
        ));
    };

    let claimed: Vec<&String> = col_map.values().collect();
    let mapping_cols: Vec<&String> = table
        .columns
        .iter()
        .filter(|c| c.to_lowercase().contains("ref") && !claimed.contains(c))
        .collect();

    let mut frame = ControlsFrame::default();

    for (row_idx, row) in table.rows.iter().enumerate() {
        let Some(ccf_id) = clean_opt(table.cell(row, id_col)) else {
            frame.rows_skipped += 1;
            continue;
        };

        let mut mappings = std::collections::BTreeMap::new();
        for col in &mapping_cols {
            let Some(value) = table.cell(row, col) else {
                continue;
            };
            let refs = split_list_string(value);
            if refs.is_empty() {
                continue;
            }
            if let Some(key) = framework_key_from_column(col) {
                mappings.insert(key, refs);
            }
        }

        let captured = row_mappings
            .and_then(|m| m.get(row_idx))
            .filter(|m| !m.is_absent());

        let guide = guidance.get(&ccf_id);
        let field = |name: &str| {
            col_map
                .get(name)
                .and_then(|c| clean_opt(table.cell(row, c)))
        };
        let merged = |from_guide: Option<&String>, name: &str| {
            from_guide.cloned().or_else(|| field(name))
        };

        frame.records.push(ControlRecord {
            ccf_id,
            domain: field("domain"),
            title: field("title"),
            description: field("description"),
            control_type: merged(guide.and_then(|g| g.control_type.as_ref()), "type"),
            theme: merged(guide.and_then(|g| g.theme.as_ref()), "theme"),
            guidance: merged(guide.and_then(|g| g.guidance.as_ref()), "guidance"),
            testing: merged(guide.and_then(|g| g.testing.as_ref()), "testing"),
            artifacts: merged(guide.and_then(|g| g.artifacts.as_ref()), "artifacts"),
            mappings: match captured {
                Some(m) => m.clone(),
                None if mappings.is_empty() => Mappings::Absent,
                None => Mappings::Map(mappings),
            },
        });
    }

    Ok(frame)
}

/// Build the canonical evidence frame from a table. A table without a
/// resolvable ref id column yields an empty frame.
pub(crate) fn evidence_frame_from_table(table: &Table, mapper: &ColumnMapper) -> EvidenceFrame {
    let col_map = mapper.map_columns(&table.columns, MappingProfile::Evidence);
    let mut frame = EvidenceFrame::default();

    let Some(id_col) = col_map.get("ref_id") else {
        return frame;
    };

    for row in &table.rows {
        let Some(ref_id) = clean_opt(table.cell(row, id_col)) else {
            frame.rows_skipped += 1;
            continue;
        };
        let field = |name: &str| {
            col_map
                .get(name)
                .and_then(|c| clean_opt(table.cell(row, c)))
        };
        frame.records.push(EvidenceRecord {
            ref_id,
            title: field("title"),
            domain: field("domain"),
        });
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> ColumnMapper {
        ColumnMapper::new(None)
    }

    fn controls_table() -> Table {
        Table::new(
            vec![
                "Control ID".to_string(),
                "Control Domain".to_string(),
                "Control Name".to_string(),
                "NIST Ref #".to_string(),
                "ISO Ref".to_string(),
            ],
            vec![
                vec![
                    Some("AC-1".to_string()),
                    Some("Access Control".to_string()),
                    Some("Access Policy".to_string()),
                    Some("AC-1, AC-2".to_string()),
                    Some("A.9.1".to_string()),
                ],
                vec![
                    None,
                    Some("Access Control".to_string()),
                    Some("Dropped".to_string()),
                    None,
                    None,
                ],
            ],
        )
    }

    #[test]
    fn test_controls_frame_basics() {
        let frame =
            controls_frame_from_table(&controls_table(), &mapper(), &GuidanceLookup::new(), None)
                .unwrap();

        assert_eq!(frame.len(), 1);
        assert_eq!(frame.rows_skipped, 1);

        let rec = &frame.records[0];
        assert_eq!(rec.ccf_id, "AC-1");
        assert_eq!(rec.domain.as_deref(), Some("Access Control"));
        assert_eq!(rec.title.as_deref(), Some("Access Policy"));

        let Mappings::Map(map) = &rec.mappings else {
            panic!("expected framework mappings");
        };
        assert_eq!(map["NIST"], vec!["AC-1", "AC-2"]);
        assert_eq!(map["ISO"], vec!["A.9.1"]);
    }

    #[test]
    fn test_controls_frame_requires_id_column() {
        let table = Table::new(
            vec!["Widget".to_string(), "Gadget".to_string()],
            vec![vec![Some("a".to_string()), Some("b".to_string())]],
        );
        let err = controls_frame_from_table(&table, &mapper(), &GuidanceLookup::new(), None)
            .unwrap_err();
        assert!(matches!(err, AdapterError::MissingNaturalId(_)));
    }

    #[test]
    fn test_guidance_merge_priority() {
        let guidance_table = Table::new(
            vec![
                "Control ID".to_string(),
                "Implementation Guidance".to_string(),
                "Audit Artifacts".to_string(),
            ],
            vec![vec![
                Some("AC-1".to_string()),
                Some("Do the thing".to_string()),
                Some("E-1; E-2".to_string()),
            ]],
        );
        let lookup = guidance_lookup_from_table(&guidance_table, &mapper());
        assert_eq!(lookup["AC-1"].guidance.as_deref(), Some("Do the thing"));

        let main = Table::new(
            vec!["Control ID".to_string(), "Guidance".to_string()],
            vec![vec![
                Some("AC-1".to_string()),
                Some("main-sheet guidance".to_string()),
            ]],
        );
        let frame = controls_frame_from_table(&main, &mapper(), &lookup, None).unwrap();
        // Guidance sheet wins over the main sheet's same-field value
        assert_eq!(frame.records[0].guidance.as_deref(), Some("Do the thing"));
        assert_eq!(frame.records[0].artifacts.as_deref(), Some("E-1; E-2"));
    }

    #[test]
    fn test_framework_key_stripping() {
        assert_eq!(framework_key_from_column("NIST Ref #"), Some("NIST".to_string()));
        assert_eq!(framework_key_from_column("ISO Ref"), Some("ISO".to_string()));
        assert_eq!(
            framework_key_from_column("PCI DSS Ref #"),
            Some("PCI_DSS".to_string())
        );
        assert_eq!(framework_key_from_column("Ref #"), None);
    }

    #[test]
    fn test_framework_key_non_ascii_header() {
        // 'İ' grows when lowercased; stripping must not panic on headers
        // whose lowercase form has different byte offsets.
        assert_eq!(framework_key_from_column("İSO Ref"), Some("İSO".to_string()));
        assert_eq!(
            framework_key_from_column("Straße Ref #"),
            Some("Straße".to_string())
        );
    }

    #[test]
    fn test_evidence_frame() {
        let table = Table::new(
            vec!["Reference #".to_string(), "Evidence Title".to_string()],
            vec![
                vec![Some("E-1".to_string()), Some("Policy doc".to_string())],
                vec![Some("  ".to_string()), Some("dropped".to_string())],
            ],
        );
        let frame = evidence_frame_from_table(&table, &mapper());
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.rows_skipped, 1);
        assert_eq!(frame.records[0].ref_id, "E-1");
        assert_eq!(frame.records[0].title.as_deref(), Some("Policy doc"));
    }

    #[test]
    fn test_evidence_frame_without_id_column_is_empty() {
        let table = Table::new(
            vec!["Widget".to_string()],
            vec![vec![Some("a".to_string())]],
        );
        let frame = evidence_frame_from_table(&table, &mapper());
        assert!(frame.is_empty());
    }
}
