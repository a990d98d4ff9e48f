//! Excel workbook adapter
//!
//! Handles multi-sheet .xls/.xlsx exports: discovers (or accepts explicit)
//! sheet names for the main controls, guidance, and evidence sheets,
//! locates the header row in the main sheet, and merges guidance-sheet
//! detail into the controls frame.

use calamine::{open_workbook_auto, Data, Reader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{
    controls_frame_from_table, evidence_frame_from_table, guidance_lookup_from_table,
    AdapterError, AdapterOptions, GuidanceLookup, SourceAdapter, ValidationReport,
};
use crate::ingest::detect::{detect_header_row, detect_sheet_roles, HEADER_MARKERS};
use crate::ingest::mapping::ColumnMapper;
use crate::ingest::{ControlsFrame, EvidenceFrame, Table};

/// Rows read per sheet when probing structure.
const PREVIEW_ROWS: usize = 5;

pub struct ExcelAdapter {
    path: PathBuf,
    mapper: ColumnMapper,
    sheet_main: Option<String>,
    sheet_guidance: Option<String>,
    sheet_evidence: Option<String>,
    report: Option<ValidationReport>,
}

impl ExcelAdapter {
    pub fn new(path: &Path, options: AdapterOptions) -> Self {
        ExcelAdapter {
            path: path.to_path_buf(),
            mapper: ColumnMapper::new(options.custom_mappings.as_ref()),
            sheet_main: options.sheet_main,
            sheet_guidance: options.sheet_guidance,
            sheet_evidence: options.sheet_evidence,
            report: None,
        }
    }

    fn parse_error(&self, err: impl std::fmt::Display) -> AdapterError {
        AdapterError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }

    fn read_sheet_rows(
        &self,
        sheet: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Vec<Option<String>>>, AdapterError> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|e| self.parse_error(e))?;
        let range = workbook
            .worksheet_range(sheet)
            .map_err(|e| self.parse_error(e))?;

        let rows = range
            .rows()
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        Ok(rows)
    }

    /// Read a sheet as a table with its first row as the header.
    fn read_sheet_table(&self, sheet: &str) -> Result<Table, AdapterError> {
        let mut rows = self.read_sheet_rows(sheet, None)?;
        if rows.is_empty() {
            return Ok(Table::default());
        }
        let headers = rows
            .remove(0)
            .into_iter()
            .map(|c| c.unwrap_or_default())
            .collect();
        Ok(Table::new(headers, rows))
    }
}

/// Convert one cell to a text value; empty and error cells become `None`.
/// Whole-number floats render without the trailing `.0` so numeric ids keep
/// their source form.
fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::Error(_) => None,
        other => Some(other.to_string()),
    }
}

impl SourceAdapter for ExcelAdapter {
    fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !self.path.exists() {
            report.error(format!("File not found: {}", self.path.display()));
            self.report = Some(report.clone());
            return report;
        }

        let workbook = match open_workbook_auto(&self.path) {
            Ok(wb) => wb,
            Err(e) => {
                report.error(format!("Failed to read Excel file: {e}"));
                self.report = Some(report.clone());
                return report;
            }
        };

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        report.info(format!(
            "Found {} sheets: {}",
            sheet_names.len(),
            sheet_names.join(", ")
        ));
        drop(workbook);

        // Auto-detect roles for any sheet not explicitly named
        if self.sheet_main.is_none()
            || self.sheet_guidance.is_none()
            || self.sheet_evidence.is_none()
        {
            let mut previews = Vec::new();
            for name in &sheet_names {
                match self.read_sheet_rows(name, Some(PREVIEW_ROWS)) {
                    Ok(rows) => {
                        let string_rows = rows
                            .into_iter()
                            .map(|r| r.into_iter().map(|c| c.unwrap_or_default()).collect())
                            .collect();
                        previews.push((name.clone(), string_rows));
                    }
                    Err(e) => debug!(sheet = %name, error = %e, "could not preview sheet"),
                }
            }

            let roles = detect_sheet_roles(&previews);
            report.info(format!(
                "Auto-detected sheets: main={:?} guidance={:?} evidence={:?}",
                roles.main, roles.guidance, roles.evidence
            ));

            if self.sheet_main.is_none() {
                self.sheet_main = roles.main;
            }
            if self.sheet_guidance.is_none() {
                self.sheet_guidance = roles.guidance;
            }
            if self.sheet_evidence.is_none() {
                self.sheet_evidence = roles.evidence;
            }
        }

        match &self.sheet_main {
            Some(main) => report.info(format!("Using main sheet: {main}")),
            None => report.error("Could not determine main controls sheet"),
        }
        if self.sheet_guidance.is_none() {
            report.warning("No guidance sheet detected - controls may lack implementation details");
        }
        if self.sheet_evidence.is_none() {
            report.warning("No evidence sheet detected - evidence linking will be limited");
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

        // Evidence sheet (optional)
        let mut evidence = EvidenceFrame::default();
        if let Some(sheet) = self.sheet_evidence.clone() {
            match self.read_sheet_table(&sheet) {
                Ok(table) => {
                    evidence = evidence_frame_from_table(&table, &self.mapper);
                    info!(count = evidence.len(), "loaded evidence items");
                }
                Err(e) => warn!(sheet = %sheet, error = %e, "error loading evidence sheet"),
            }
        }

        // Guidance sheet (optional)
        let mut guidance = GuidanceLookup::new();
        if let Some(sheet) = self.sheet_guidance.clone() {
            match self.read_sheet_table(&sheet) {
                Ok(table) => {
                    guidance = guidance_lookup_from_table(&table, &self.mapper);
                    info!(count = guidance.len(), "loaded guidance entries");
                }
                Err(e) => warn!(sheet = %sheet, error = %e, "error loading guidance sheet"),
            }
        }

        // Main sheet: locate the header row first, then read below it
        let main_sheet = self
            .sheet_main
            .clone()
            .ok_or_else(|| AdapterError::Invalid(vec!["no main sheet".to_string()]))?;

        let mut all_rows = self.read_sheet_rows(&main_sheet, None)?;
        let preview: Vec<Vec<String>> = all_rows
            .iter()
            .take(crate::ingest::detect::HEADER_SCAN_ROWS)
            .map(|r| r.iter().map(|c| c.clone().unwrap_or_default()).collect())
            .collect();
        let header_row = detect_header_row(&preview, HEADER_MARKERS);
        debug!(header_row, "detected header row");

        if header_row >= all_rows.len() {
            return Ok((ControlsFrame::default(), evidence));
        }
        let data_rows = all_rows.split_off(header_row + 1);
        let headers = all_rows
            .pop()
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.unwrap_or_default())
            .collect();
        let table = Table::new(headers, data_rows);

        let controls = controls_frame_from_table(&table, &self.mapper, &guidance, None)?;
        info!(count = controls.len(), skipped = controls.rows_skipped, "loaded controls");

        Ok((controls, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Mappings;
    use rust_xlsxwriter::{Workbook, Worksheet};

    fn write_rows(sheet: &mut Worksheet, rows: &[&[&str]]) {
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if !cell.is_empty() {
                    sheet.write_string(r as u32, c as u16, *cell).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_load_workbook_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framework.xlsx");

        let mut workbook = Workbook::new();
        let main = workbook.add_worksheet().set_name("Controls").unwrap();
        write_rows(
            main,
            &[
                &["Common Controls Framework v5"],
                &[],
                &[
                    "CCF ID",
                    "Control Name",
                    "Control Domain",
                    "Control Description",
                    "NIST Ref #",
                    "ISO Ref",
                ],
                &[
                    "AC-1",
                    "Access Control Policy",
                    "Access Control",
                    "Maintain an access policy",
                    "AC-1(1), AC-1(2)",
                    "A.9.1",
                ],
                &[
                    "AC-2",
                    "Account Management",
                    "Access Control",
                    "Manage accounts",
                    "AC-2",
                    "",
                ],
                &["", "Orphan row", "", "", "", ""],
            ],
        );
        let guidance = workbook.add_worksheet().set_name("Guidance").unwrap();
        write_rows(
            guidance,
            &[
                &["CCF ID", "Implementation Guidance", "Testing Procedure"],
                &["AC-1", "Write and publish the policy", "Inspect the published policy"],
            ],
        );
        let evidence = workbook.add_worksheet().set_name("Evidence").unwrap();
        write_rows(
            evidence,
            &[
                &["Reference #", "Evidence Title", "Evidence Domain"],
                &["E-1", "Access policy document", "Access Control"],
            ],
        );
        workbook.save(&path).unwrap();

        let mut adapter = ExcelAdapter::new(&path, AdapterOptions::default());
        let report = adapter.validate();
        assert!(report.valid);
        assert!(report
            .info
            .iter()
            .any(|m| m.contains("Using main sheet: Controls")));

        let (controls, evidence) = adapter.load().unwrap();
        assert_eq!(controls.len(), 2);
        assert_eq!(controls.rows_skipped, 1);

        let ac1 = &controls.records[0];
        assert_eq!(ac1.ccf_id, "AC-1");
        assert_eq!(ac1.title.as_deref(), Some("Access Control Policy"));
        assert_eq!(ac1.domain.as_deref(), Some("Access Control"));
        assert_eq!(ac1.description.as_deref(), Some("Maintain an access policy"));
        assert_eq!(ac1.guidance.as_deref(), Some("Write and publish the policy"));
        assert_eq!(ac1.testing.as_deref(), Some("Inspect the published policy"));
        match &ac1.mappings {
            Mappings::Map(map) => {
                assert_eq!(
                    map.get("NIST"),
                    Some(&vec!["AC-1(1)".to_string(), "AC-1(2)".to_string()])
                );
                assert_eq!(map.get("ISO"), Some(&vec!["A.9.1".to_string()]));
            }
            Mappings::Absent => panic!("expected extracted framework mappings"),
        }
        assert!(controls.records[1].guidance.is_none());

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence.records[0].ref_id, "E-1");
        assert_eq!(
            evidence.records[0].title.as_deref(),
            Some("Access policy document")
        );
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Empty), None);
        assert_eq!(cell_to_string(&Data::String("AC-1".into())), Some("AC-1".into()));
        assert_eq!(cell_to_string(&Data::Float(3.0)), Some("3".into()));
        assert_eq!(cell_to_string(&Data::Float(3.5)), Some("3.5".into()));
        assert_eq!(cell_to_string(&Data::Int(7)), Some("7".into()));
    }

    #[test]
    fn test_validate_missing_file() {
        let mut adapter = ExcelAdapter::new(
            Path::new("/nonexistent/controls.xlsx"),
            AdapterOptions::default(),
        );
        let report = adapter.validate();
        assert!(!report.valid);
        assert!(report.errors[0].contains("File not found"));
    }

    #[test]
    fn test_load_fails_after_invalid_validation() {
        let mut adapter = ExcelAdapter::new(
            Path::new("/nonexistent/controls.xlsx"),
            AdapterOptions::default(),
        );
        let err = adapter.load().unwrap_err();
        assert!(matches!(err, AdapterError::Invalid(_)));
    }
}
