//! XML adapter
//!
//! Record elements convert to JSON values (attributes and child elements
//! become keys, repeated child names become arrays, mixed content lands
//! under `_text`) and then flow through the same flatten/map path as JSON.

use roxmltree::{Document, Node};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use super::json::frames_from_records;
use super::{AdapterError, AdapterOptions, SourceAdapter, ValidationReport};
use crate::ingest::mapping::ColumnMapper;
use crate::ingest::{ControlsFrame, EvidenceFrame};

pub struct XmlAdapter {
    path: PathBuf,
    mapper: ColumnMapper,
    report: Option<ValidationReport>,
}

impl XmlAdapter {
    pub fn new(path: &Path, options: AdapterOptions) -> Self {
        XmlAdapter {
            path: path.to_path_buf(),
            mapper: ColumnMapper::new(options.custom_mappings.as_ref()),
            report: None,
        }
    }

    fn read_records(&self) -> Result<(Vec<Value>, Vec<Value>), AdapterError> {
        let content = std::fs::read_to_string(&self.path)?;
        let doc = Document::parse(&content).map_err(|e| AdapterError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let root = doc.root_element();

        let controls_container = find_container(root, "controls");
        let evidence_container = find_container(root, "evidence");

        // Without an explicit <controls> container the root's own children
        // are the control records (skipping the evidence container if any)
        let controls = match controls_container {
            Some(container) => child_records(container),
            None => root
                .children()
                .filter(|n| n.is_element())
                .filter(|n| !n.tag_name().name().eq_ignore_ascii_case("evidence"))
                .map(|n| element_to_value(n))
                .collect(),
        };
        let evidence = match evidence_container {
            Some(container) => child_records(container),
            None => Vec::new(),
        };

        Ok((controls, evidence))
    }
}

impl SourceAdapter for XmlAdapter {
    fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !self.path.exists() {
            report.error(format!("File not found: {}", self.path.display()));
            self.report = Some(report.clone());
            return report;
        }

        match self.read_records() {
            Ok((controls, evidence)) => {
                if controls.is_empty() {
                    report.error("No control records found in XML");
                } else {
                    report.info(format!("Found {} control record(s)", controls.len()));
                }
                if evidence.is_empty() {
                    report.warning("No evidence records found in XML");
                } else {
                    report.info(format!("Found {} evidence record(s)", evidence.len()));
                }
            }
            Err(e) => report.error(format!("Invalid XML: {e}")),
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

        let (controls_data, evidence_data) = self.read_records()?;
        let (controls, evidence) =
            frames_from_records(&controls_data, &evidence_data, &self.mapper)?;

        info!(
            controls = controls.len(),
            evidence = evidence.len(),
            "loaded from XML"
        );
        Ok((controls, evidence))
    }
}

/// Find a direct child of the root whose tag matches `name`
/// case-insensitively, or the root itself when its own tag matches.
fn find_container<'a, 'd>(root: Node<'a, 'd>, name: &str) -> Option<Node<'a, 'd>> {
    if root.tag_name().name().eq_ignore_ascii_case(name) {
        return Some(root);
    }
    root.children()
        .filter(|n| n.is_element())
        .find(|n| n.tag_name().name().eq_ignore_ascii_case(name))
}

fn child_records(container: Node) -> Vec<Value> {
    container
        .children()
        .filter(|n| n.is_element())
        .map(element_to_value)
        .collect()
}

/// Convert one element into a JSON value. Leaf elements become strings,
/// everything else an object; repeated child tags collapse into arrays.
fn element_to_value(node: Node) -> Value {
    let element_children: Vec<Node> = node.children().filter(|n| n.is_element()).collect();
    let text = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string();

    if element_children.is_empty() && node.attributes().len() == 0 {
        return Value::String(text);
    }

    let mut obj = Map::new();
    for attr in node.attributes() {
        obj.insert(attr.name().to_string(), Value::String(attr.value().to_string()));
    }
    for child in element_children {
        let key = child.tag_name().name().to_string();
        let value = element_to_value(child);
        match obj.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                obj.insert(key, value);
            }
        }
    }
    if !text.is_empty() {
        obj.insert("_text".to_string(), Value::String(text));
    }

    Value::Object(obj)
}
