//! CSV folder adapter
//!
//! A source split across a directory of CSV files: one main controls file,
//! plus optional guidance and evidence files. Files are identified first by
//! filename keywords, then by sniffing headers of whatever is left.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{
    controls_frame_from_table, evidence_frame_from_table, guidance_lookup_from_table,
    AdapterError, AdapterOptions, GuidanceLookup, SourceAdapter, ValidationReport,
};
use crate::ingest::mapping::ColumnMapper;
use crate::ingest::{ControlsFrame, EvidenceFrame, Table};

const CONTROLS_KEYWORDS: &[&str] = &["controls", "control", "main", "ccf"];
const GUIDANCE_KEYWORDS: &[&str] = &["guidance", "guide", "implementation"];
const EVIDENCE_KEYWORDS: &[&str] = &["evidence", "artifacts", "audit"];

pub struct CsvFolderAdapter {
    dir: PathBuf,
    mapper: ColumnMapper,
    report: Option<ValidationReport>,
}

#[derive(Debug, Default)]
struct FolderLayout {
    controls: Option<PathBuf>,
    guidance: Option<PathBuf>,
    evidence: Option<PathBuf>,
}

impl CsvFolderAdapter {
    pub fn new(dir: &Path, options: AdapterOptions) -> Self {
        CsvFolderAdapter {
            dir: dir.to_path_buf(),
            mapper: ColumnMapper::new(options.custom_mappings.as_ref()),
            report: None,
        }
    }

    fn csv_files(&self) -> Result<Vec<PathBuf>, AdapterError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Assign each CSV a role: filename keywords first, then header
    /// sniffing for a controls file among whatever remains unassigned.
    fn classify(&self, files: &[PathBuf]) -> FolderLayout {
        let mut layout = FolderLayout::default();
        let mut unassigned = Vec::new();

        for path in files {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_lowercase();

            if layout.controls.is_none() && CONTROLS_KEYWORDS.iter().any(|k| stem.contains(k)) {
                layout.controls = Some(path.clone());
            } else if layout.guidance.is_none()
                && GUIDANCE_KEYWORDS.iter().any(|k| stem.contains(k))
            {
                layout.guidance = Some(path.clone());
            } else if layout.evidence.is_none()
                && EVIDENCE_KEYWORDS.iter().any(|k| stem.contains(k))
            {
                layout.evidence = Some(path.clone());
            } else {
                unassigned.push(path.clone());
            }
        }

        if layout.controls.is_none() {
            for path in &unassigned {
                if let Ok(table) = read_csv_table(path) {
                    let looks_like_controls = table.columns.iter().any(|c| {
                        let lower = c.to_lowercase();
                        lower.contains("control") || lower.contains("ccf")
                    });
                    if looks_like_controls {
                        layout.controls = Some(path.clone());
                        break;
                    }
                }
            }
        }

        layout
    }
}

impl SourceAdapter for CsvFolderAdapter {
    fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !self.dir.is_dir() {
            report.error(format!("Not a directory: {}", self.dir.display()));
            self.report = Some(report.clone());
            return report;
        }

        match self.csv_files() {
            Ok(files) if files.is_empty() => {
                report.error(format!("No CSV files found in {}", self.dir.display()));
            }
            Ok(files) => {
                report.info(format!("Found {} CSV file(s)", files.len()));
                let layout = self.classify(&files);
                match &layout.controls {
                    Some(path) => report.info(format!(
                        "Controls file: {}",
                        path.file_name().and_then(|n| n.to_str()).unwrap_or("?")
                    )),
                    None => report.error("Could not identify a controls CSV file"),
                }
                if layout.guidance.is_none() {
                    report.warning("No guidance CSV found (type/theme/guidance fields may be empty)");
                }
                if layout.evidence.is_none() {
                    report.warning("No evidence CSV found (no evidence will be imported)");
                }
            }
            Err(e) => report.error(format!("Cannot read directory: {e}")),
        }

        self.report = Some(report.clone());
        report
    }

    fn load(&mut self) -> Result<(ControlsFrame, EvidenceFrame), AdapterError> {
        if self.report.is_none() {
            self.validate();
        }
        if let Some(report) = &self.report {
            if !report.valid {
                return Err(AdapterError::Invalid(report.errors.clone()));
            }
        }

        let files = self.csv_files()?;
        let layout = self.classify(&files);
        let controls_path = layout.controls.ok_or_else(|| {
            AdapterError::NotFound(self.dir.join("controls.csv"))
        })?;

        let guidance = match &layout.guidance {
            Some(path) => match read_csv_table(path) {
                Ok(table) => guidance_lookup_from_table(&table, &self.mapper),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable guidance CSV");
                    GuidanceLookup::new()
                }
            },
            None => GuidanceLookup::new(),
        };

        let evidence = match &layout.evidence {
            Some(path) => match read_csv_table(path) {
                Ok(table) => evidence_frame_from_table(&table, &self.mapper),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable evidence CSV");
                    EvidenceFrame::default()
                }
            },
            None => EvidenceFrame::default(),
        };

        let main_table = read_csv_table(&controls_path)?;
        let controls = controls_frame_from_table(&main_table, &self.mapper, &guidance, None)?;

        info!(
            controls = controls.len(),
            evidence = evidence.len(),
            dir = %self.dir.display(),
            "loaded from CSV folder"
        );
        Ok((controls, evidence))
    }
}

/// Read one CSV file into a table. Short rows pad with empty cells; long
/// rows truncate to the header width.
fn read_csv_table(path: &Path) -> Result<Table, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| AdapterError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| AdapterError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let width = columns.len();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AdapterError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut row: Vec<Option<String>> = record.iter().map(|c| Some(c.to_string())).collect();
        row.truncate(width);
        row.resize(width, None);
        rows.push(row);
    }

    Ok(Table::new(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_csv(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_folder_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "controls.csv",
            "Control ID,Control Name,Control Domain\nAC-1,Access Policy,Access Control\n",
        );
        write_csv(
            dir.path(),
            "guidance.csv",
            "Control ID,Implementation Guidance\nAC-1,Write the policy down\n",
        );
        write_csv(
            dir.path(),
            "evidence.csv",
            "Reference #,Evidence Title\nE-1,Policy document\n",
        );

        let mut adapter = CsvFolderAdapter::new(dir.path(), AdapterOptions::default());
        let report = adapter.validate();
        assert!(report.valid);

        let (controls, evidence) = adapter.load().unwrap();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls.records[0].ccf_id, "AC-1");
        assert_eq!(
            controls.records[0].guidance.as_deref(),
            Some("Write the policy down")
        );
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence.records[0].ref_id, "E-1");
    }

    #[test]
    fn test_content_sniffing_fallback() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "framework_export.csv",
            "CCF ID,Control Name\nAC-1,Access Policy\n",
        );

        let mut adapter = CsvFolderAdapter::new(dir.path(), AdapterOptions::default());
        let (controls, evidence) = adapter.load().unwrap();
        assert_eq!(controls.len(), 1);
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_empty_folder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = CsvFolderAdapter::new(dir.path(), AdapterOptions::default());
        let report = adapter.validate();
        assert!(!report.valid);
        assert!(adapter.load().is_err());
    }

    #[test]
    fn test_short_rows_pad() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "controls.csv",
            "Control ID,Control Name,Control Description\nAC-1,Access Policy\n",
        );

        let mut adapter = CsvFolderAdapter::new(dir.path(), AdapterOptions::default());
        let (controls, _) = adapter.load().unwrap();
        assert_eq!(controls.len(), 1);
        assert!(controls.records[0].description.is_none());
    }
}
