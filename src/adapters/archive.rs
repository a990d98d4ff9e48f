//! ZIP archive adapter
//!
//! Extracts the archive into a temporary directory and delegates to the
//! adapter for the best inner format found (Excel, then JSON, then CSV,
//! then XML). Member paths that would escape the extraction directory are
//! rejected during validation, before anything is written to disk.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

use super::{
    AdapterError, AdapterOptions, CsvFolderAdapter, ExcelAdapter, JsonAdapter, SourceAdapter,
    ValidationReport, XmlAdapter,
};
use crate::ingest::{ControlsFrame, EvidenceFrame};

pub struct ZipAdapter {
    path: PathBuf,
    options: AdapterOptions,
    report: Option<ValidationReport>,
}

#[derive(Debug, Default)]
struct ArchiveContents {
    excel: Vec<String>,
    json: Vec<String>,
    csv: Vec<String>,
    xml: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InnerFormat {
    Excel,
    Json,
    Csv,
    Xml,
}

impl ArchiveContents {
    /// Pick the best available inner format.
    fn best(&self) -> Option<InnerFormat> {
        if !self.excel.is_empty() {
            Some(InnerFormat::Excel)
        } else if !self.json.is_empty() {
            Some(InnerFormat::Json)
        } else if !self.csv.is_empty() {
            Some(InnerFormat::Csv)
        } else if !self.xml.is_empty() {
            Some(InnerFormat::Xml)
        } else {
            None
        }
    }
}

impl ZipAdapter {
    pub fn new(path: &Path, options: AdapterOptions) -> Self {
        ZipAdapter {
            path: path.to_path_buf(),
            options,
            report: None,
        }
    }

    fn open(&self) -> Result<ZipArchive<File>, AdapterError> {
        let file = File::open(&self.path)?;
        ZipArchive::new(file).map_err(|e| AdapterError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Scan member names, rejecting any path that could escape the
    /// extraction directory and skipping macOS resource-fork noise.
    fn scan(&self, archive: &mut ZipArchive<File>) -> Result<ArchiveContents, AdapterError> {
        let mut contents = ArchiveContents::default();

        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| AdapterError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
            let name = entry.name().to_string();

            if !is_safe_member_path(&name) {
                return Err(AdapterError::UnsafeArchivePath(name));
            }
            if entry.is_dir() || name.starts_with("__MACOSX") {
                continue;
            }

            let ext = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();
            match ext.as_str() {
                "xlsx" | "xls" | "xlsm" => contents.excel.push(name),
                "json" => contents.json.push(name),
                "csv" => contents.csv.push(name),
                "xml" => contents.xml.push(name),
                _ => debug!(member = %name, "ignoring archive member"),
            }
        }

        Ok(contents)
    }

    /// Extract the members relevant to `format` into `dest` and return the
    /// path to hand to the inner adapter.
    fn extract(
        &self,
        archive: &mut ZipArchive<File>,
        contents: &ArchiveContents,
        format: InnerFormat,
        dest: &Path,
    ) -> Result<PathBuf, AdapterError> {
        let members: &[String] = match format {
            InnerFormat::Excel => &contents.excel,
            InnerFormat::Json => &contents.json,
            InnerFormat::Csv => &contents.csv,
            InnerFormat::Xml => &contents.xml,
        };

        let mut first: Option<PathBuf> = None;
        for name in members {
            let mut entry = archive.by_name(name).map_err(|e| AdapterError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
            // Keep the archive's folder structure so same-named members in
            // different folders cannot overwrite each other; `scan` already
            // rejected anything that could step outside `dest`
            let out_path = dest.join(name);
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)?;
            io::copy(&mut entry, &mut out)?;
            first.get_or_insert(out_path);
        }

        let first = first.ok_or_else(|| AdapterError::NotFound(self.path.clone()))?;
        match format {
            // CSV delegates on the folder holding the first CSV member,
            // the rest on one file
            InnerFormat::Csv => Ok(first
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dest.to_path_buf())),
            _ => Ok(first),
        }
    }
}

impl SourceAdapter for ZipAdapter {
    fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !self.path.exists() {
            report.error(format!("File not found: {}", self.path.display()));
            self.report = Some(report.clone());
            return report;
        }

        let contents = match self.open().and_then(|mut a| self.scan(&mut a)) {
            Ok(contents) => contents,
            Err(AdapterError::UnsafeArchivePath(name)) => {
                report.error(format!("Archive member path is unsafe: {name}"));
                self.report = Some(report.clone());
                return report;
            }
            Err(e) => {
                report.error(format!("Cannot read archive: {e}"));
                self.report = Some(report.clone());
                return report;
            }
        };

        match contents.best() {
            Some(InnerFormat::Excel) => {
                report.info(format!("Using Excel workbook: {}", contents.excel[0]))
            }
            Some(InnerFormat::Json) => report.info(format!("Using JSON file: {}", contents.json[0])),
            Some(InnerFormat::Csv) => {
                report.info(format!("Using {} CSV file(s)", contents.csv.len()))
            }
            Some(InnerFormat::Xml) => report.info(format!("Using XML file: {}", contents.xml[0])),
            None => report.error("Archive contains no importable files"),
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

        let mut archive = self.open()?;
        let contents = self.scan(&mut archive)?;
        let format = contents
            .best()
            .ok_or_else(|| AdapterError::Unsupported("empty archive".to_string()))?;

        let dir = tempfile::tempdir()?;
        let target = self.extract(&mut archive, &contents, format, dir.path())?;

        info!(archive = %self.path.display(), ?format, "extracted archive");

        // Frames are fully materialized before `dir` drops and cleans up
        let frames = match format {
            InnerFormat::Excel => {
                ExcelAdapter::new(&target, self.options.clone()).load()?
            }
            InnerFormat::Json => JsonAdapter::new(&target, self.options.clone()).load()?,
            InnerFormat::Csv => CsvFolderAdapter::new(&target, self.options.clone()).load()?,
            InnerFormat::Xml => XmlAdapter::new(&target, self.options.clone()).load()?,
        };

        Ok(frames)
    }
}

/// A member path is safe when it is relative and never steps upward.
fn is_safe_member_path(name: &str) -> bool {
    let path = Path::new(name);
    !path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(members: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".zip").tempfile().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        for (name, content) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn test_member_path_safety() {
        assert!(is_safe_member_path("data/controls.csv"));
        assert!(!is_safe_member_path("../escape.csv"));
        assert!(!is_safe_member_path("/etc/passwd"));
        assert!(!is_safe_member_path("data/../../escape.csv"));
    }

    #[test]
    fn test_unsafe_member_rejected_in_validation() {
        let file = build_zip(&[("../evil.csv", "Control ID\nAC-1\n")]);
        let mut adapter = ZipAdapter::new(file.path(), AdapterOptions::default());
        let report = adapter.validate();
        assert!(!report.valid);
        assert!(report.errors[0].contains("unsafe"));
    }

    #[test]
    fn test_json_preferred_over_csv() {
        let file = build_zip(&[
            ("notes.csv", "a,b\n1,2\n"),
            (
                "controls.json",
                r#"[{"control_id": "AC-1", "title": "Access Policy"}]"#,
            ),
        ]);
        let mut adapter = ZipAdapter::new(file.path(), AdapterOptions::default());
        let (controls, _) = adapter.load().unwrap();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls.records[0].ccf_id, "AC-1");
    }

    #[test]
    fn test_csv_folder_inside_archive() {
        let file = build_zip(&[
            (
                "export/controls.csv",
                "Control ID,Control Name\nAC-1,Access Policy\n",
            ),
            (
                "export/evidence.csv",
                "Reference #,Evidence Title\nE-1,Policy document\n",
            ),
        ]);
        let mut adapter = ZipAdapter::new(file.path(), AdapterOptions::default());
        let (controls, evidence) = adapter.load().unwrap();
        assert_eq!(controls.len(), 1);
        assert_eq!(evidence.len(), 1);
    }

    #[test]
    fn test_same_named_members_in_different_folders() {
        // Extraction must keep folder structure: with flattening, b/ would
        // overwrite a/ and the wrong records would load
        let file = build_zip(&[
            (
                "a/controls.json",
                r#"[{"control_id": "AC-1", "title": "First"}]"#,
            ),
            (
                "b/controls.json",
                r#"[{"control_id": "ZZ-9", "title": "Second"}]"#,
            ),
        ]);
        let mut adapter = ZipAdapter::new(file.path(), AdapterOptions::default());
        let (controls, _) = adapter.load().unwrap();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls.records[0].ccf_id, "AC-1");
    }

    #[test]
    fn test_macosx_entries_skipped() {
        let file = build_zip(&[
            ("__MACOSX/._controls.csv", "junk"),
            ("controls.csv", "Control ID,Control Name\nAC-1,Access Policy\n"),
        ]);
        let mut adapter = ZipAdapter::new(file.path(), AdapterOptions::default());
        let (controls, _) = adapter.load().unwrap();
        assert_eq!(controls.len(), 1);
    }

    #[test]
    fn test_empty_archive_fails() {
        let file = build_zip(&[("readme.txt", "nothing to see")]);
        let mut adapter = ZipAdapter::new(file.path(), AdapterOptions::default());
        let report = adapter.validate();
        assert!(!report.valid);
        assert!(adapter.load().is_err());
    }
}
