//! JSON adapter
//!
//! Accepts either a root list (all items are controls, no evidence) or a
//! root object with optional `controls` / `evidence` keys. Nested objects
//! are flattened into dotted column names before column mapping, the same
//! normalization path the XML adapter feeds into.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{
    controls_frame_from_table, evidence_frame_from_table, AdapterError, AdapterOptions,
    GuidanceLookup, SourceAdapter, ValidationReport,
};
use crate::ingest::mapping::ColumnMapper;
use crate::ingest::{ControlsFrame, EvidenceFrame, Mappings, Table};

pub struct JsonAdapter {
    path: PathBuf,
    mapper: ColumnMapper,
    report: Option<ValidationReport>,
}

impl JsonAdapter {
    pub fn new(path: &Path, options: AdapterOptions) -> Self {
        JsonAdapter {
            path: path.to_path_buf(),
            mapper: ColumnMapper::new(options.custom_mappings.as_ref()),
            report: None,
        }
    }

    fn read_root(&self) -> Result<Value, AdapterError> {
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| AdapterError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}

impl SourceAdapter for JsonAdapter {
    fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !self.path.exists() {
            report.error(format!("File not found: {}", self.path.display()));
            self.report = Some(report.clone());
            return report;
        }

        match self.read_root() {
            Ok(Value::Array(items)) => {
                report.info(format!(
                    "JSON is a list with {} items (assuming controls)",
                    items.len()
                ));
            }
            Ok(Value::Object(obj)) => {
                match obj.get("controls").and_then(Value::as_array) {
                    Some(controls) => {
                        report.info(format!("Found 'controls' key with {} items", controls.len()))
                    }
                    None => report.warning("No 'controls' key found in JSON object"),
                }
                if let Some(evidence) = obj.get("evidence").and_then(Value::as_array) {
                    report.info(format!("Found 'evidence' key with {} items", evidence.len()));
                }
            }
            Ok(_) => report.error("JSON root must be a list or object"),
            Err(e) => report.error(format!("Invalid JSON: {e}")),
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

        let root = self.read_root()?;
        let (controls_data, evidence_data) = match root {
            Value::Array(items) => (items, Vec::new()),
            Value::Object(mut obj) => {
                let controls = match obj.remove("controls") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                let evidence = match obj.remove("evidence") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                (controls, evidence)
            }
            _ => (Vec::new(), Vec::new()),
        };

        let (controls, evidence) =
            frames_from_records(&controls_data, &evidence_data, &self.mapper)?;

        info!(
            controls = controls.len(),
            evidence = evidence.len(),
            "loaded from JSON"
        );
        Ok((controls, evidence))
    }
}

/// Build both canonical frames from lists of record values. Shared by the
/// JSON and XML adapters: each record is flattened to a flat key/value row,
/// the union of keys becomes the column set, and the normal column-mapping
/// path takes over.
pub(crate) fn frames_from_records(
    controls_data: &[Value],
    evidence_data: &[Value],
    mapper: &ColumnMapper,
) -> Result<(ControlsFrame, EvidenceFrame), AdapterError> {
    let mut invalid_mappings = 0usize;
    let mut row_mappings = Vec::with_capacity(controls_data.len());
    let controls_table = records_to_table(controls_data, |record| {
        // Mapping objects are captured before flattening so structure
        // survives; malformed values coerce to Absent and are counted
        let captured = record
            .as_object()
            .and_then(|obj| {
                obj.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("mappings"))
                    .map(|(_, v)| v)
            })
            .map(|v| match Mappings::from_value(v) {
                Ok(m) => m,
                Err(()) => {
                    invalid_mappings += 1;
                    Mappings::Absent
                }
            })
            .unwrap_or_default();
        row_mappings.push(captured);
    });

    let mut controls = if controls_table.is_empty() {
        ControlsFrame::default()
    } else {
        controls_frame_from_table(
            &controls_table,
            mapper,
            &GuidanceLookup::new(),
            Some(&row_mappings),
        )?
    };
    controls.invalid_mappings = invalid_mappings;

    let evidence_table = records_to_table(evidence_data, |_| {});
    let evidence = evidence_frame_from_table(&evidence_table, mapper);

    Ok((controls, evidence))
}

/// Flatten a list of record values into a table. `inspect` is called once
/// per record before flattening, in order.
fn records_to_table(records: &[Value], mut inspect: impl FnMut(&Value)) -> Table {
    let mut columns: Vec<String> = Vec::new();
    let mut flat_rows: Vec<Vec<(String, String)>> = Vec::with_capacity(records.len());

    for record in records {
        inspect(record);
        let mut flat = Vec::new();
        flatten_value("", record, &mut flat);
        for (key, _) in &flat {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        flat_rows.push(flat);
    }

    let rows = flat_rows
        .into_iter()
        .map(|flat| {
            columns
                .iter()
                .map(|col| {
                    flat.iter()
                        .find(|(k, _)| k == col)
                        .map(|(_, v)| v.clone())
                })
                .collect()
        })
        .collect();

    Table::new(columns, rows)
}

/// Flatten a JSON value into `(dotted_key, text)` pairs.
///
/// Scalar arrays join with commas so downstream list splitting still works;
/// arrays of objects serialize as JSON text.
pub(crate) fn flatten_value(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(obj) => {
            for (key, v) in obj {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_value(&key, v, out);
            }
        }
        Value::Null => {}
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Number(n) => out.push((prefix.to_string(), n.to_string())),
        Value::Bool(b) => out.push((prefix.to_string(), b.to_string())),
        Value::Array(items) => {
            if items.iter().all(|i| !matches!(i, Value::Object(_) | Value::Array(_))) {
                let joined = items
                    .iter()
                    .map(|i| match i {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push((prefix.to_string(), joined));
            } else {
                out.push((
                    prefix.to_string(),
                    serde_json::to_string(items).unwrap_or_default(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_json(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_root_list_is_controls() {
        let file = write_json(
            r#"[
                {"control_id": "AC-1", "title": "Access Policy", "domain": "Access Control"},
                {"control_id": null, "title": "dropped"}
            ]"#,
        );
        let mut adapter = JsonAdapter::new(file.path(), AdapterOptions::default());
        let (controls, evidence) = adapter.load().unwrap();

        assert_eq!(controls.len(), 1);
        assert_eq!(controls.rows_skipped, 1);
        assert_eq!(controls.records[0].ccf_id, "AC-1");
        assert!(evidence.is_empty());
    }

    #[test]
    fn test_object_root_with_controls_and_evidence() {
        let file = write_json(
            r#"{
                "controls": [
                    {"id": "AC-1", "name": "Access Policy",
                     "mappings": {"NIST": ["AC-1", "AC-2"], "ISO": ["A.9.1"]}}
                ],
                "evidence": [
                    {"ref_id": "E-1", "title": "Policy document"}
                ]
            }"#,
        );
        let mut adapter = JsonAdapter::new(file.path(), AdapterOptions::default());
        let (controls, evidence) = adapter.load().unwrap();

        assert_eq!(controls.len(), 1);
        let Mappings::Map(map) = &controls.records[0].mappings else {
            panic!("expected mappings");
        };
        assert_eq!(map["NIST"], vec!["AC-1", "AC-2"]);
        assert_eq!(map["ISO"], vec!["A.9.1"]);

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence.records[0].ref_id, "E-1");
    }

    #[test]
    fn test_nested_objects_flatten() {
        let file = write_json(
            r#"[{"control": {"control_id": "AC-1", "control name": "Nested"}}]"#,
        );
        let mut adapter = JsonAdapter::new(file.path(), AdapterOptions::default());
        let (controls, _) = adapter.load().unwrap();

        // "control.control_id" maps to ccf_id by containment, and
        // "control.control name" to title
        assert_eq!(controls.len(), 1);
        assert_eq!(controls.records[0].ccf_id, "AC-1");
        assert_eq!(controls.records[0].title.as_deref(), Some("Nested"));
    }

    #[test]
    fn test_malformed_mappings_counted() {
        let file = write_json(r#"[{"control_id": "AC-1", "mappings": "not valid json"}]"#,
        );
        let mut adapter = JsonAdapter::new(file.path(), AdapterOptions::default());
        let (controls, _) = adapter.load().unwrap();

        assert_eq!(controls.invalid_mappings, 1);
        assert!(controls.records[0].mappings.is_absent());
    }

    #[test]
    fn test_invalid_json_fails_validation() {
        let file = write_json("{ not json");
        let mut adapter = JsonAdapter::new(file.path(), AdapterOptions::default());
        let report = adapter.validate();
        assert!(!report.valid);
        assert!(report.errors[0].contains("Invalid JSON"));
    }

    #[test]
    fn test_scalar_root_rejected() {
        let file = write_json("42");
        let mut adapter = JsonAdapter::new(file.path(), AdapterOptions::default());
        let report = adapter.validate();
        assert!(!report.valid);
    }
}
