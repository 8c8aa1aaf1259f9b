//! Report data model: checklist items, sections and the aggregate report
//! pushed to the fleet controller and rendered by the dashboard.

use crate::utils::time::now_rfc3339;
use serde::{Deserialize, Serialize};

/// Outcome of one verification. The checker never produces `skip`; probes that
/// cannot run report `unknown` with an explanatory message instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    Warning,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// How the evidence behind an item was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMethod {
    /// Local inspection of the process or host.
    Direct,
    /// External API call.
    Api,
    /// Network probe.
    Probe,
    /// Inherited from a provider's validation.
    Inherited,
    /// Self-reported by a peer.
    Reported,
}

/// One verification outcome. `id` is stable across runs so reports can be
/// diffed; the free-form fields are authoritative for UI display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub severity: Severity,
    pub verification_method: VerificationMethod,
    pub what: String,
    pub why: String,
    pub remediation: String,
    pub nist_ref: String,
}

impl ChecklistItem {
    pub fn new(id: &str, name: &str, severity: Severity, method: VerificationMethod) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: Status::Unknown,
            severity,
            verification_method: method,
            what: String::new(),
            why: String::new(),
            remediation: String::new(),
            nist_ref: String::new(),
        }
    }

    pub fn with_status(self, status: Status, what: impl Into<String>) -> Self {
        Self {
            status,
            what: what.into(),
            ..self
        }
    }

    pub fn with_why(self, why: impl Into<String>) -> Self {
        Self {
            why: why.into(),
            ..self
        }
    }

    pub fn with_remediation(self, remediation: impl Into<String>) -> Self {
        Self {
            remediation: remediation.into(),
            ..self
        }
    }

    pub fn with_nist_ref(self, nist_ref: impl Into<String>) -> Self {
        Self {
            nist_ref: nist_ref.into(),
            ..self
        }
    }
}

/// A named group of checklist items. `id` is stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub description: String,
    pub items: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub unknown: usize,
}

/// Aggregate compliance report. The summary is always derivable from the
/// items; [Checker::generate_report] computes it by tallying every item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub timestamp: String,
    pub sections: Vec<Section>,
    pub summary: ReportSummary,
}

/// Holds an ordered list of sections and derives reports from them.
/// Report generation is side-effect-free: generating twice yields identical
/// bodies except for the timestamp.
#[derive(Debug, Default)]
pub struct Checker {
    sections: Vec<Section>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn generate_report(&self) -> ComplianceReport {
        let mut summary = ReportSummary::default();
        for item in self.sections.iter().flat_map(|s| s.items.iter()) {
            summary.total += 1;
            match item.status {
                Status::Pass => summary.passed += 1,
                Status::Fail => summary.failed += 1,
                Status::Warning => summary.warnings += 1,
                Status::Unknown => summary.unknown += 1,
            }
        }
        ComplianceReport {
            timestamp: now_rfc3339(),
            sections: self.sections.clone(),
            summary,
        }
    }

    /// Worst status across all items, ordered fail > warning > unknown > pass.
    /// Returns early on the first failure.
    pub fn overall_status(&self) -> Status {
        let mut worst = Status::Pass;
        for item in self.sections.iter().flat_map(|s| s.items.iter()) {
            match item.status {
                Status::Fail => return Status::Fail,
                Status::Warning => worst = Status::Warning,
                Status::Unknown => {
                    if worst != Status::Warning {
                        worst = Status::Unknown;
                    }
                }
                Status::Pass => {}
            }
        }
        worst
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn item_with_status(id: &str, status: Status) -> ChecklistItem {
        ChecklistItem::new(id, id, Severity::Medium, VerificationMethod::Direct)
            .with_status(status, "test")
    }

    fn section_with(items: Vec<ChecklistItem>) -> Section {
        Section {
            id: "s-test".to_string(),
            name: "Test".to_string(),
            description: String::new(),
            items,
        }
    }

    #[test]
    fn summary_matches_item_tally() {
        let mut checker = Checker::new();
        checker.add_section(section_with(vec![
            item_with_status("a", Status::Pass),
            item_with_status("b", Status::Fail),
        ]));
        checker.add_section(section_with(vec![
            item_with_status("c", Status::Warning),
            item_with_status("d", Status::Unknown),
            item_with_status("e", Status::Pass),
        ]));

        let report = checker.generate_report();
        assert_eq!(report.summary.total, 5);
        assert_eq!(report.summary.passed, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.summary.unknown, 1);
        assert_eq!(
            report.summary.total,
            report.sections.iter().map(|s| s.items.len()).sum::<usize>()
        );
    }

    #[test]
    fn overall_status_ordering() {
        let mut checker = Checker::new();
        checker.add_section(section_with(vec![item_with_status("a", Status::Pass)]));
        assert_eq!(checker.overall_status(), Status::Pass);

        checker.add_section(section_with(vec![item_with_status("b", Status::Unknown)]));
        assert_eq!(checker.overall_status(), Status::Unknown);

        checker.add_section(section_with(vec![item_with_status("c", Status::Warning)]));
        assert_eq!(checker.overall_status(), Status::Warning);

        checker.add_section(section_with(vec![item_with_status("d", Status::Fail)]));
        assert_eq!(checker.overall_status(), Status::Fail);
    }

    #[test]
    fn report_generation_is_idempotent_except_timestamp() {
        let mut checker = Checker::new();
        checker.add_section(section_with(vec![
            item_with_status("a", Status::Pass),
            item_with_status("b", Status::Warning),
        ]));

        let first = checker.generate_report();
        let second = checker.generate_report();
        assert_eq!(first.sections, second.sections);
        assert_eq!(first.summary, second.summary);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Pass).unwrap(), "\"pass\"");
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(
            serde_json::to_string(&VerificationMethod::Probe).unwrap(),
            "\"probe\""
        );
    }
}
