//! Frame validation and data-quality scoring
//!
//! Validation runs between adapter load and seeding. Errors are fatal and
//! block the import; warnings and info lines are surfaced to the operator
//! but never stop processing.

use std::collections::HashSet;

use crate::adapters::ValidationReport;
use crate::ingest::clean::split_list_string;
use crate::ingest::{ControlsFrame, EvidenceFrame};

/// Identifier characters permitted without a warning: word characters
/// plus dot and hyphen.
fn is_usual_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Combined report across both frames plus the cross-reference check.
#[derive(Debug, Clone)]
pub struct FullReport {
    pub valid: bool,
    pub controls: ValidationReport,
    pub evidence: ValidationReport,
    pub references: ValidationReport,
}

impl FullReport {
    pub fn total_errors(&self) -> usize {
        self.controls.errors.len() + self.evidence.errors.len() + self.references.errors.len()
    }

    pub fn total_warnings(&self) -> usize {
        self.controls.warnings.len()
            + self.evidence.warnings.len()
            + self.references.warnings.len()
    }
}

pub fn validate_controls(frame: &ControlsFrame) -> ValidationReport {
    let mut report = ValidationReport::default();

    if frame.is_empty() && frame.rows_skipped == 0 {
        report.error("No control rows found");
        return report;
    }

    report.info(format!("Validating {} controls", frame.len()));

    if frame.rows_skipped > 0 {
        report.warning(format!(
            "{} rows have empty control IDs (will be skipped)",
            frame.rows_skipped
        ));
    }

    let (dup_count, dup_examples) = duplicate_ids(frame.records.iter().map(|r| r.ccf_id.as_str()));
    if dup_count > 0 {
        report.warning(format!(
            "{dup_count} duplicate control IDs found (first few: {dup_examples:?})"
        ));
    }

    let total = frame.len();
    if total > 0 {
        // >50% missing is a warning, anything less is informational
        let important: [(&str, usize); 3] = [
            ("title", missing(frame, |r| r.title.is_none())),
            ("description", missing(frame, |r| r.description.is_none())),
            ("domain", missing(frame, |r| r.domain.is_none())),
        ];
        for (field, count) in important {
            if count > 0 {
                let pct = count as f64 / total as f64 * 100.0;
                let msg = format!("{count} ({pct:.1}%) controls missing {field}");
                if pct > 50.0 {
                    report.warning(msg);
                } else {
                    report.info(msg);
                }
            }
        }

        let informational: [(&str, usize); 2] = [
            ("guidance", missing(frame, |r| r.guidance.is_none())),
            ("testing", missing(frame, |r| r.testing.is_none())),
        ];
        for (field, count) in informational {
            if count > 0 {
                let pct = count as f64 / total as f64 * 100.0;
                report.info(format!("{count} ({pct:.1}%) controls missing {field}"));
            }
        }
    }

    let unusual = frame
        .records
        .iter()
        .filter(|r| !is_usual_id(&r.ccf_id))
        .count();
    if unusual > 0 {
        report.warning(format!("{unusual} control IDs contain unusual characters"));
    }

    if frame.invalid_mappings > 0 {
        report.warning(format!(
            "{} controls have invalid mapping format",
            frame.invalid_mappings
        ));
    }

    report
}

pub fn validate_evidence(frame: &EvidenceFrame) -> ValidationReport {
    let mut report = ValidationReport::default();

    if frame.is_empty() && frame.rows_skipped == 0 {
        report.info("Evidence frame is empty (this may be intentional)");
        return report;
    }

    report.info(format!("Validating {} evidence items", frame.len()));

    if frame.rows_skipped > 0 {
        report.warning(format!(
            "{} evidence items have empty ref IDs (will be skipped)",
            frame.rows_skipped
        ));
    }

    let (dup_count, dup_examples) = duplicate_ids(frame.records.iter().map(|r| r.ref_id.as_str()));
    if dup_count > 0 {
        report.warning(format!(
            "{dup_count} duplicate evidence ref IDs found (first few: {dup_examples:?})"
        ));
    }

    let total = frame.len();
    if total > 0 {
        let missing_title = frame.records.iter().filter(|r| r.title.is_none()).count();
        if missing_title > 0 {
            let pct = missing_title as f64 / total as f64 * 100.0;
            report.info(format!(
                "{missing_title} ({pct:.1}%) evidence items missing title"
            ));
        }
    }

    report
}

/// Check that every evidence reference cited by a control's `artifacts`
/// field exists as an evidence ref id. Always non-fatal.
pub fn validate_artifact_references(
    controls: &ControlsFrame,
    evidence: &EvidenceFrame,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if controls.is_empty() {
        report.info("No controls to validate artifact references");
        return report;
    }

    if evidence.is_empty() {
        let has_artifacts = controls
            .records
            .iter()
            .filter(|r| r.artifacts.is_some())
            .count();
        if has_artifacts > 0 {
            report.warning(format!(
                "{has_artifacts} controls have artifact references but no evidence data provided"
            ));
        }
        return report;
    }

    let evidence_refs: HashSet<&str> = evidence
        .records
        .iter()
        .map(|r| r.ref_id.as_str())
        .collect();

    let mut missing_refs: Vec<String> = Vec::new();
    let mut controls_with_missing = 0usize;

    for record in &controls.records {
        let Some(artifacts) = &record.artifacts else {
            continue;
        };
        let refs = split_list_string(artifacts);
        let row_missing: Vec<&String> = refs
            .iter()
            .filter(|r| !evidence_refs.contains(r.as_str()))
            .collect();
        if !row_missing.is_empty() {
            for r in row_missing {
                if !missing_refs.contains(r) {
                    missing_refs.push(r.clone());
                }
            }
            controls_with_missing += 1;
        }
    }

    if missing_refs.is_empty() {
        report.info("All artifact references found in evidence data");
    } else {
        let examples: Vec<&String> = missing_refs.iter().take(10).collect();
        report.warning(format!(
            "{} unique artifact references not found in evidence (affects {} controls). First few: {:?}",
            missing_refs.len(),
            controls_with_missing,
            examples
        ));
    }

    report
}

pub fn full_validation(controls: &ControlsFrame, evidence: &EvidenceFrame) -> FullReport {
    let controls_report = validate_controls(controls);
    let evidence_report = validate_evidence(evidence);
    let references_report = validate_artifact_references(controls, evidence);

    FullReport {
        valid: controls_report.valid && evidence_report.valid && references_report.valid,
        controls: controls_report,
        evidence: evidence_report,
        references: references_report,
    }
}

fn missing(frame: &ControlsFrame, pred: impl Fn(&crate::ingest::ControlRecord) -> bool) -> usize {
    frame.records.iter().filter(|r| pred(r)).count()
}

/// Count occurrences beyond the first per id, and collect up to 10 example
/// ids that repeat.
fn duplicate_ids<'a>(ids: impl Iterator<Item = &'a str>) -> (usize, Vec<String>) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut examples: Vec<String> = Vec::new();
    let mut count = 0usize;

    for id in ids {
        if !seen.insert(id) {
            count += 1;
            if examples.len() < 10 && !examples.iter().any(|e| e == id) {
                examples.push(id.to_string());
            }
        }
    }

    (count, examples)
}

// ==================== Quality scoring ====================

#[derive(Debug, Clone)]
pub struct FieldCompleteness {
    pub field: &'static str,
    pub filled: usize,
    pub total: usize,
    pub percentage: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    pub controls: Vec<FieldCompleteness>,
    pub evidence: Vec<FieldCompleteness>,
    /// Weighted average of per-field fill percentages, 0-100.
    pub overall_score: f64,
    pub recommendations: Vec<String>,
}

/// Fixed importance weights for controls fields, natural id highest.
const CONTROL_FIELD_WEIGHTS: &[(&str, f64)] = &[
    ("ccf_id", 1.0),
    ("title", 0.9),
    ("description", 0.9),
    ("domain", 0.8),
    ("type", 0.5),
    ("theme", 0.5),
    ("guidance", 0.7),
    ("testing", 0.7),
    ("mappings", 0.6),
];

pub fn generate_quality_report(
    controls: &ControlsFrame,
    evidence: &EvidenceFrame,
) -> QualityReport {
    let mut report = QualityReport::default();

    if !controls.is_empty() {
        let total = controls.len();
        for &(field, weight) in CONTROL_FIELD_WEIGHTS {
            let filled = controls
                .records
                .iter()
                .filter(|r| match field {
                    "ccf_id" => true,
                    "title" => r.title.is_some(),
                    "description" => r.description.is_some(),
                    "domain" => r.domain.is_some(),
                    "type" => r.control_type.is_some(),
                    "theme" => r.theme.is_some(),
                    "guidance" => r.guidance.is_some(),
                    "testing" => r.testing.is_some(),
                    "mappings" => !r.mappings.is_absent(),
                    _ => false,
                })
                .count();
            report.controls.push(FieldCompleteness {
                field,
                filled,
                total,
                percentage: filled as f64 / total as f64 * 100.0,
                weight,
            });
        }

        for fc in &report.controls {
            if fc.percentage < 50.0 && fc.weight >= 0.7 {
                report.recommendations.push(format!(
                    "Consider adding {} to more controls ({:.0}% complete)",
                    fc.field, fc.percentage
                ));
            }
        }

        let total_weight: f64 = report.controls.iter().map(|fc| fc.weight).sum();
        if total_weight > 0.0 {
            report.overall_score = report
                .controls
                .iter()
                .map(|fc| fc.percentage * fc.weight)
                .sum::<f64>()
                / total_weight;
        }
    }

    if !evidence.is_empty() {
        let total = evidence.len();
        let fields: [(&'static str, usize); 3] = [
            ("ref_id", total),
            (
                "title",
                evidence.records.iter().filter(|r| r.title.is_some()).count(),
            ),
            (
                "domain",
                evidence.records.iter().filter(|r| r.domain.is_some()).count(),
            ),
        ];
        for (field, filled) in fields {
            report.evidence.push(FieldCompleteness {
                field,
                filled,
                total,
                percentage: filled as f64 / total as f64 * 100.0,
                weight: 1.0,
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ControlRecord, EvidenceRecord, Mappings};

    fn control(id: &str) -> ControlRecord {
        ControlRecord {
            ccf_id: id.to_string(),
            domain: Some("Access Control".to_string()),
            title: Some("Access Policy".to_string()),
            description: Some("Limit access".to_string()),
            control_type: None,
            theme: None,
            guidance: None,
            testing: None,
            artifacts: None,
            mappings: Mappings::Absent,
        }
    }

    fn evidence_item(id: &str) -> EvidenceRecord {
        EvidenceRecord {
            ref_id: id.to_string(),
            title: Some("Policy document".to_string()),
            domain: None,
        }
    }

    #[test]
    fn test_empty_controls_is_fatal() {
        let report = validate_controls(&ControlsFrame::default());
        assert!(!report.valid);
    }

    #[test]
    fn test_duplicate_ids_warn() {
        let frame = ControlsFrame {
            records: vec![control("AC-1"), control("AC-1"), control("AC-2")],
            rows_skipped: 0,
            invalid_mappings: 0,
        };
        let report = validate_controls(&frame);
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("1 duplicate")));
    }

    #[test]
    fn test_unusual_id_characters_warn() {
        let mut bad = control("AC 1 (draft)");
        bad.title = None;
        let frame = ControlsFrame {
            records: vec![control("AC-1.2"), bad],
            rows_skipped: 0,
            invalid_mappings: 0,
        };
        let report = validate_controls(&frame);
        assert!(report.valid);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("unusual characters")));
    }

    #[test]
    fn test_missing_field_threshold() {
        let mut missing_desc = control("AC-2");
        missing_desc.description = None;
        let frame = ControlsFrame {
            records: vec![control("AC-1"), missing_desc],
            rows_skipped: 0,
            invalid_mappings: 0,
        };
        // 50% missing is not >50%, so informational
        let report = validate_controls(&frame);
        assert!(report.info.iter().any(|i| i.contains("missing description")));
        assert!(!report
            .warnings
            .iter()
            .any(|w| w.contains("missing description")));
    }

    #[test]
    fn test_empty_evidence_is_informational() {
        let report = validate_evidence(&EvidenceFrame::default());
        assert!(report.valid);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_artifact_cross_reference() {
        let mut c = control("AC-1");
        c.artifacts = Some("E-1, E-9".to_string());
        let controls = ControlsFrame {
            records: vec![c],
            rows_skipped: 0,
            invalid_mappings: 0,
        };
        let evidence = EvidenceFrame {
            records: vec![evidence_item("E-1")],
            rows_skipped: 0,
        };
        let report = validate_artifact_references(&controls, &evidence);
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("E-9")));
    }

    #[test]
    fn test_full_validation_combines() {
        let controls = ControlsFrame {
            records: vec![control("AC-1")],
            rows_skipped: 0,
            invalid_mappings: 0,
        };
        let evidence = EvidenceFrame {
            records: vec![evidence_item("E-1")],
            rows_skipped: 0,
        };
        let report = full_validation(&controls, &evidence);
        assert!(report.valid);
        assert_eq!(report.total_errors(), 0);
    }

    #[test]
    fn test_quality_recommendations() {
        let frame = ControlsFrame {
            records: vec![control("AC-1"), control("AC-2")],
            rows_skipped: 0,
            invalid_mappings: 0,
        };
        let quality = generate_quality_report(&frame, &EvidenceFrame::default());
        // guidance and testing are entirely empty and weighted >= 0.7
        assert!(quality
            .recommendations
            .iter()
            .any(|r| r.contains("guidance")));
        assert!(quality.overall_score > 0.0);
        assert!(quality.overall_score < 100.0);
    }
}
