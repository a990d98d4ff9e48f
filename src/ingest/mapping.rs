//! Column name mapping
//!
//! Source exports name their columns however they like ("SCF #",
//! "Control Identification Number", "Audit Artifacts"). The mapper resolves
//! those raw names to canonical field names using a ranked alias table per
//! field: exact match first, then substring containment, then fuzzy
//! similarity against the field's highest-priority alias.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ingest::clean::clean_text;

/// Fuzzy-similarity acceptance threshold.
const FUZZY_THRESHOLD: f64 = 0.6;

/// Minimum normalized length for a containment match. Keeps noise aliases
/// like "#", "no", "id", or "control" from claiming unrelated columns by
/// substring; short aliases still match exactly.
const MIN_CONTAINMENT_LEN: usize = 8;

/// Which alias table to map against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingProfile {
    Controls,
    Evidence,
}

/// User-supplied alias overrides, loaded from a JSON or YAML config file.
///
/// Aliases listed here are prepended (given priority) ahead of the built-in
/// aliases for an existing field, or define a wholly new field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomMappings {
    #[serde(default)]
    pub controls: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub evidence: BTreeMap<String, Vec<String>>,
}

/// Maps raw source column names to canonical field names.
#[derive(Debug, Clone)]
pub struct ColumnMapper {
    control_aliases: Vec<(String, Vec<String>)>,
    evidence_aliases: Vec<(String, Vec<String>)>,
}

fn default_control_aliases() -> Vec<(String, Vec<String>)> {
    let table: &[(&str, &[&str])] = &[
        (
            "ccf_id",
            &[
                "ccf_id", "ccf id", "control id", "control_id", "id", "ref", "reference",
                "scf #", "scf#", "scf id", "control #", "control#", "identifier",
                "scf control", "control identifier", "ctrl id", "#", "no", "number",
                "control number", "ctrl", "control ref",
            ],
        ),
        (
            "domain",
            &[
                "control domain", "domain", "category", "control category", "scf domain",
                "security domain", "control family", "family", "domains & principles",
                "security function", "function",
            ],
        ),
        (
            "title",
            &[
                "control name", "title", "name", "control title", "scf control", "control",
                "short description", "control short name", "control summary", "summary",
            ],
        ),
        (
            "description",
            &[
                "control description", "description", "desc", "details", "control objective",
                "objective", "full description", "control text", "scf control description",
                "control question", "long description", "control detail", "control details",
            ],
        ),
        (
            "type",
            &[
                "control type", "type", "control_type", "category type", "classification",
                "control classification",
            ],
        ),
        (
            "theme",
            &[
                "control theme", "theme", "control_theme", "control category", "subcategory",
                "sub-category",
            ],
        ),
        (
            "guidance",
            &[
                "control implementation guidance", "implementation guidance", "guidance",
                "implementation", "implementation notes", "notes", "control guidance",
                "implementation details", "how to implement", "supplemental guidance",
                "implementation instructions",
            ],
        ),
        (
            "testing",
            &[
                "control testing procedure", "testing procedure", "testing", "test procedure",
                "audit procedure", "assessment", "assessment procedure", "test", "audit",
                "assessment objectives", "testing guidance", "audit steps", "test steps",
                "verification", "validation",
            ],
        ),
        (
            "artifacts",
            &[
                "audit artifacts", "artifacts", "evidence", "evidence refs",
                "evidence references", "required evidence", "evidence required",
                "evidence request", "erl", "evidence list", "documentation",
                "required documentation",
            ],
        ),
    ];

    table
        .iter()
        .map(|(field, aliases)| {
            (
                field.to_string(),
                aliases.iter().map(|a| a.to_string()).collect(),
            )
        })
        .collect()
}

fn default_evidence_aliases() -> Vec<(String, Vec<String>)> {
    let table: &[(&str, &[&str])] = &[
        (
            "ref_id",
            &[
                "reference #", "reference", "ref_id", "ref", "id", "evidence id",
                "evidence_id", "erl #", "erl#", "erl id", "artifact id", "artifact #",
                "#", "no", "number", "evidence number", "evidence ref",
                "evidence reference",
            ],
        ),
        (
            "title",
            &[
                "evidence title", "title", "name", "evidence name", "description",
                "artifact name", "artifact title", "evidence description",
                "artifact description", "evidence summary",
            ],
        ),
        (
            "domain",
            &[
                "evidence domain", "domain", "category", "evidence category",
                "artifact domain", "artifact category",
            ],
        ),
    ];

    table
        .iter()
        .map(|(field, aliases)| {
            (
                field.to_string(),
                aliases.iter().map(|a| a.to_string()).collect(),
            )
        })
        .collect()
}

/// Normalize a name for matching: clean, lowercase, treat `_` and `-` as
/// spaces.
fn normalize(name: &str) -> String {
    let cleaned = clean_text(name).unwrap_or_default();
    cleaned
        .to_lowercase()
        .replace(['_', '-'], " ")
        .trim()
        .to_string()
}

fn merge_custom(
    defaults: &mut Vec<(String, Vec<String>)>,
    custom: &BTreeMap<String, Vec<String>>,
) {
    for (field, aliases) in custom {
        if let Some((_, existing)) = defaults.iter_mut().find(|(f, _)| f == field) {
            let mut merged = aliases.clone();
            merged.extend(existing.drain(..));
            *existing = merged;
        } else {
            defaults.push((field.clone(), aliases.clone()));
        }
    }
}

impl ColumnMapper {
    pub fn new(custom: Option<&CustomMappings>) -> Self {
        let mut control_aliases = default_control_aliases();
        let mut evidence_aliases = default_evidence_aliases();

        if let Some(custom) = custom {
            merge_custom(&mut control_aliases, &custom.controls);
            merge_custom(&mut evidence_aliases, &custom.evidence);
        }

        ColumnMapper {
            control_aliases,
            evidence_aliases,
        }
    }

    /// Map source column names to canonical field names.
    ///
    /// Every mapped field is optional from the caller's point of view except
    /// the natural id, whose absence the adapter must treat as fatal.
    pub fn map_columns(
        &self,
        columns: &[String],
        profile: MappingProfile,
    ) -> BTreeMap<String, String> {
        let aliases = match profile {
            MappingProfile::Controls => &self.control_aliases,
            MappingProfile::Evidence => &self.evidence_aliases,
        };

        let normalized: Vec<(String, &String)> =
            columns.iter().map(|c| (normalize(c), c)).collect();

        let mut result = BTreeMap::new();
        let mut claimed: Vec<&String> = Vec::new();

        for (field, field_aliases) in aliases {
            let matched = match_field(field_aliases, &normalized, &claimed);
            if let Some(col) = matched {
                claimed.push(col);
                result.insert(field.clone(), col.clone());
            }
        }

        result
    }
}

/// Resolve one canonical field against the column list: exact, then
/// containment, then fuzzy against the first alias. First hit wins.
fn match_field<'a>(
    field_aliases: &[String],
    columns: &'a [(String, &'a String)],
    claimed: &[&String],
) -> Option<&'a String> {
    let available = |col: &&String| !claimed.iter().any(|c| *c == *col);

    // Exact case-insensitive match, in alias priority order
    for alias in field_aliases {
        let alias_norm = normalize(alias);
        if let Some((_, col)) = columns
            .iter()
            .find(|(norm, col)| *norm == alias_norm && available(col))
        {
            return Some(col);
        }
    }

    // Substring containment in either direction, alias priority order
    for alias in field_aliases {
        let alias_norm = normalize(alias);
        for (col_norm, col) in columns {
            if !available(col) {
                continue;
            }
            let alias_in_col =
                alias_norm.len() >= MIN_CONTAINMENT_LEN && col_norm.contains(&alias_norm);
            let col_in_alias =
                col_norm.len() >= MIN_CONTAINMENT_LEN && alias_norm.contains(col_norm);
            if alias_in_col || col_in_alias {
                return Some(col);
            }
        }
    }

    // Fuzzy similarity against the highest-priority alias only
    let first = normalize(field_aliases.first()?);
    let mut best: Option<(f64, &String)> = None;
    for (col_norm, col) in columns {
        if !available(col) {
            continue;
        }
        let score = strsim::normalized_levenshtein(&first, col_norm);
        if score > FUZZY_THRESHOLD && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, col));
        }
    }

    best.map(|(_, col)| col)
}
