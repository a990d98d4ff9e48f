//! Structure detection heuristics
//!
//! Spreadsheet exports rarely put their header row at row zero, and
//! multi-sheet workbooks rarely label which sheet holds what. These
//! functions score marker phrases against raw previews so that structural
//! guesses are explicit and inspectable, never silent.

use crate::ingest::clean::clean_text;

/// Marker phrases that identify a main controls sheet.
pub const MAIN_MARKERS: &[&str] = &[
    "ccf id",
    "control id",
    "control name",
    "control domain",
    "scf #",
    "scf control",
];

/// Marker phrases that identify a guidance sheet.
pub const GUIDANCE_MARKERS: &[&str] = &[
    "implementation guidance",
    "testing procedure",
    "control guidance",
];

/// Marker phrases that identify an evidence sheet.
pub const EVIDENCE_MARKERS: &[&str] = &["evidence title", "reference #", "evidence domain", "erl"];

/// Markers used for header-row detection in a main controls sheet.
pub const HEADER_MARKERS: &[&str] =
    &["ccf id", "control id", "control name", "control domain", "scf #"];

/// Maximum number of leading rows scanned for a header.
pub const HEADER_SCAN_ROWS: usize = 15;

/// Locate the header row within a headerless preview.
///
/// A row qualifies when at least `max(2, markers - 2)` marker phrases appear
/// as substrings of its cells. Best effort: when no row qualifies, row 0 is
/// used.
pub fn detect_header_row(preview: &[Vec<String>], markers: &[&str]) -> usize {
    let threshold = std::cmp::max(2, markers.len().saturating_sub(2));

    for (i, row) in preview.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| {
                clean_text(cell)
                    .map(|c| c.to_lowercase())
                    .unwrap_or_default()
            })
            .collect();

        let matches = markers
            .iter()
            .filter(|m| cells.iter().any(|cell| cell.contains(*m)))
            .count();

        if matches >= threshold {
            return i;
        }
    }

    0
}

/// Sheet roles discovered in a multi-sheet workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRoles {
    pub main: Option<String>,
    pub guidance: Option<String>,
    pub evidence: Option<String>,
}

/// Classify sheets by scoring preview text against the role marker sets.
///
/// Takes `(sheet_name, preview_rows)` pairs in workbook order. The first
/// sheet scoring at least 2 on a role's marker set takes that role; later
/// sheets scoring well for an already-assigned role are ignored.
pub fn detect_sheet_roles(previews: &[(String, Vec<Vec<String>>)]) -> SheetRoles {
    let mut roles = SheetRoles::default();

    for (name, rows) in previews {
        let all_text = rows
            .iter()
            .flat_map(|row| row.iter())
            .filter_map(|cell| clean_text(cell))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let score = |markers: &[&str]| markers.iter().filter(|m| all_text.contains(*m)).count();

        if roles.main.is_none() && score(MAIN_MARKERS) >= 2 {
            roles.main = Some(name.clone());
        } else if roles.guidance.is_none() && score(GUIDANCE_MARKERS) >= 2 {
            roles.guidance = Some(name.clone());
        } else if roles.evidence.is_none() && score(EVIDENCE_MARKERS) >= 2 {
            roles.evidence = Some(name.clone());
        }
    }

    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_header_row_skips_decorative_rows() {
        // Row 0 decorative, row 1 blank, row 2 has 4 of 5 markers;
        // threshold is max(2, 5 - 2) = 3
        let preview = vec![
            row(&["Adobe Common Controls Framework", "", ""]),
            row(&["", "", ""]),
            row(&["CCF ID", "Control Name", "Control Domain", "SCF #"]),
            row(&["AC-1", "Access Control Policy", "Access Control", "1"]),
        ];
        assert_eq!(detect_header_row(&preview, HEADER_MARKERS), 2);
    }

    #[test]
    fn test_header_row_defaults_to_zero() {
        let preview = vec![row(&["a", "b"]), row(&["c", "d"])];
        assert_eq!(detect_header_row(&preview, HEADER_MARKERS), 0);
    }

    #[test]
    fn test_header_row_with_whitespace_noise() {
        let preview = vec![
            row(&["notes", ""]),
            row(&["CCF\u{00a0}ID", "Control\u{00a0}Name", "Control Domain"]),
        ];
        assert_eq!(detect_header_row(&preview, HEADER_MARKERS), 1);
    }

    #[test]
    fn test_sheet_role_detection() {
        let previews = vec![
            ("Cover".to_string(), vec![row(&["Framework Export v3"])]),
            (
                "Controls".to_string(),
                vec![row(&["CCF ID", "Control Name", "Control Domain"])],
            ),
            (
                "Guidance".to_string(),
                vec![row(&["CCF ID", "Implementation Guidance", "Testing Procedure"])],
            ),
            (
                "Evidence".to_string(),
                vec![row(&["Reference #", "Evidence Title"])],
            ),
        ];

        let roles = detect_sheet_roles(&previews);
        assert_eq!(roles.main.as_deref(), Some("Controls"));
        assert_eq!(roles.guidance.as_deref(), Some("Guidance"));
        assert_eq!(roles.evidence.as_deref(), Some("Evidence"));
    }

    #[test]
    fn test_sheet_role_first_match_wins() {
        let previews = vec![
            (
                "Sheet1".to_string(),
                vec![row(&["Control ID", "Control Name"])],
            ),
            (
                "Sheet2".to_string(),
                vec![row(&["Control ID", "Control Name", "Control Domain"])],
            ),
        ];

        let roles = detect_sheet_roles(&previews);
        assert_eq!(roles.main.as_deref(), Some("Sheet1"));
    }
}
