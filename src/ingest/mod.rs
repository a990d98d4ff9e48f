//! Canonical in-memory representation of imported compliance data
//!
//! Every source adapter, regardless of input format, produces one
//! [`ControlsFrame`] and one [`EvidenceFrame`]. These are the only shapes
//! the validator and seeder ever see.

pub mod clean;
pub mod detect;
pub mod mapping;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-framework mapping value for a control.
///
/// Source data is loose here: sometimes a JSON object, sometimes a JSON
/// string, sometimes missing. Adapters resolve that ambiguity into this
/// variant so the seeder never has to re-guess.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mappings {
    /// No mapping data for this control
    #[default]
    Absent,
    /// Framework name -> ordered list of reference strings
    Map(BTreeMap<String, Vec<String>>),
}

impl Mappings {
    /// Serialize to the JSON-text form stored in the database.
    /// `Absent` serializes as an empty object.
    pub fn to_json_string(&self) -> String {
        match self {
            Mappings::Absent => "{}".to_string(),
            Mappings::Map(map) => {
                serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
            }
        }
    }

    /// Parse a raw JSON value into a mapping.
    ///
    /// Accepts an object of string -> list-of-strings (scalar values are
    /// promoted to single-element lists) or a JSON string encoding such an
    /// object. Anything else is rejected so the adapter can count it as
    /// malformed and coerce to `Absent`.
    pub fn from_value(value: &serde_json::Value) -> Result<Mappings, ()> {
        match value {
            serde_json::Value::Null => Ok(Mappings::Absent),
            serde_json::Value::Object(obj) => {
                let mut map = BTreeMap::new();
                for (key, v) in obj {
                    let refs = match v {
                        serde_json::Value::String(s) => clean::split_list_string(s),
                        serde_json::Value::Array(items) => items
                            .iter()
                            .filter_map(|i| i.as_str().and_then(clean::clean_text))
                            .collect(),
                        _ => return Err(()),
                    };
                    if !refs.is_empty() {
                        map.insert(key.clone(), refs);
                    }
                }
                if map.is_empty() {
                    Ok(Mappings::Absent)
                } else {
                    Ok(Mappings::Map(map))
                }
            }
            serde_json::Value::String(s) => {
                let parsed: serde_json::Value = serde_json::from_str(s).map_err(|_| ())?;
                match parsed {
                    serde_json::Value::Object(_) => Mappings::from_value(&parsed),
                    _ => Err(()),
                }
            }
            _ => Err(()),
        }
    }

    /// True when no mapping data is present.
    pub fn is_absent(&self) -> bool {
        matches!(self, Mappings::Absent)
    }
}

/// One normalized control row.
///
/// The natural id is guaranteed non-empty: rows whose id cleans to blank
/// are dropped at frame construction time, never carried as a null key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlRecord {
    pub ccf_id: String,
    pub domain: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub control_type: Option<String>,
    pub theme: Option<String>,
    pub guidance: Option<String>,
    pub testing: Option<String>,
    /// Delimited evidence reference list, resolved against the evidence
    /// frame during seeding
    pub artifacts: Option<String>,
    pub mappings: Mappings,
}

/// One normalized evidence row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub ref_id: String,
    pub title: Option<String>,
    pub domain: Option<String>,
}

/// Canonical controls output of an adapter.
#[derive(Debug, Clone, Default)]
pub struct ControlsFrame {
    pub records: Vec<ControlRecord>,
    /// Rows dropped because the natural id cleaned to blank
    pub rows_skipped: usize,
    /// Mapping cells that could not be parsed and were coerced to Absent
    pub invalid_mappings: usize,
}

impl ControlsFrame {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Canonical evidence output of an adapter.
#[derive(Debug, Clone, Default)]
pub struct EvidenceFrame {
    pub records: Vec<EvidenceRecord>,
    /// Rows dropped because the natural id cleaned to blank
    pub rows_skipped: usize,
}

impl EvidenceFrame {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Raw tabular intermediate produced by adapters before column mapping.
///
/// Column names are cleaned on construction; cell values are cleaned to
/// `None` when blank.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Build a table from raw headers and rows, cleaning column names.
    ///
    /// A header that cleans to blank keeps a positional placeholder name so
    /// row indexing stays aligned.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(i, h)| clean::clean_text(&h).unwrap_or_else(|| format!("column_{i}")))
            .collect();
        Table { columns, rows }
    }

    /// Index of a column by its (cleaned) name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value by row and column name.
    pub fn cell<'a>(&'a self, row: &'a [Option<String>], column: &str) -> Option<&'a str> {
        self.column_index(column)
            .and_then(|i| row.get(i))
            .and_then(|v| v.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
