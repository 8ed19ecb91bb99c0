//! Engine warning classification
//!
//! MATLAB only exposes its single most recent warning (`lastwarn`), so one
//! run yields at most one warning entry: earlier warnings from the same run
//! are overwritten before they can be read.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Issue, IssueDetail, IssueKind, Severity, ValidationReport, WarningEntry};
use crate::engine::Engine;
use crate::error::IntrospectionFailure;

/// Message fragments that mean the numeric result is likely invalid
pub const CRITICAL_KEYWORDS: &[&str] = &[
    "singular",
    "rank deficient",
    "badly scaled",
    "ill-conditioned",
    "not positive definite",
];

/// Warning identifiers that mean the numeric result is likely invalid
pub const CRITICAL_IDS: &[&str] = &[
    "MATLAB:singularMatrix",
    "MATLAB:nearlySingularMatrix",
    "MATLAB:illConditionedMatrix",
    "MATLAB:rankDeficientMatrix",
];

/// Message fragments worth surfacing without failing the run
pub const WARNING_KEYWORDS: &[&str] = &[
    "divide by zero",
    "imaginary parts",
    "negative",
    "overflow",
    "underflow",
];

/// Keyword/identifier tables mapping a warning to a severity tier.
///
/// Defaults to the built-in tables; extend them with the `with_*` builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningClassifier {
    critical_keywords: Vec<String>,
    critical_ids: Vec<String>,
    warning_keywords: Vec<String>,
}

impl Default for WarningClassifier {
    fn default() -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            critical_keywords: owned(CRITICAL_KEYWORDS),
            critical_ids: owned(CRITICAL_IDS),
            warning_keywords: owned(WARNING_KEYWORDS),
        }
    }
}

impl WarningClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_critical_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.critical_keywords.push(keyword.into().to_lowercase());
        self
    }

    pub fn with_critical_id(mut self, id: impl Into<String>) -> Self {
        self.critical_ids.push(id.into());
        self
    }

    pub fn with_warning_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.warning_keywords.push(keyword.into().to_lowercase());
        self
    }

    /// Severity of a warning and whether it must fail the run.
    ///
    /// Critical keywords, then critical identifiers, then warning keywords.
    /// Keywords match case-insensitively anywhere in the message; identifiers
    /// match exactly.
    pub fn classify(&self, message: &str, id: &str) -> (Severity, bool) {
        let message = message.to_lowercase();

        if self.critical_keywords.iter().any(|k| message.contains(k.as_str())) {
            return (Severity::Critical, true);
        }
        if self.critical_ids.iter().any(|i| i == id) {
            return (Severity::Critical, true);
        }
        if self.warning_keywords.iter().any(|k| message.contains(k.as_str())) {
            return (Severity::Warning, false);
        }
        (Severity::Info, false)
    }
}

/// Read and classify the engine's last warning
pub async fn try_check_warnings(
    engine: &mut dyn Engine,
    classifier: &WarningClassifier,
) -> Result<Option<WarningEntry>, IntrospectionFailure> {
    let last = engine
        .last_warning()
        .await
        .map_err(|e| IntrospectionFailure::new("last warning", e))?;

    if !last.is_set() {
        return Ok(None);
    }

    let (severity, _) = classifier.classify(&last.message, &last.id);
    Ok(Some(WarningEntry {
        message: last.message,
        id: last.id,
        severity,
    }))
}

/// Add the last warning (or the failure to read it) to `report`
pub async fn check_warnings(
    engine: &mut dyn Engine,
    classifier: &WarningClassifier,
    report: &mut ValidationReport,
) {
    match try_check_warnings(engine, classifier).await {
        Ok(Some(entry)) => {
            report.push_issue(
                Issue::new(IssueKind::MatlabWarning, entry.severity, entry.message.clone())
                    .with_detail(IssueDetail::WarningId(entry.id.clone())),
            );
            report.warnings.push(entry);
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "warning check failed");
            report.push_issue(Issue::new(
                IssueKind::WarningCheckFailed,
                Severity::Info,
                format!("Could not check warnings: {}", e.source),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    #[test]
    fn test_critical_keywords() {
        let c = WarningClassifier::default();
        assert_eq!(
            c.classify("Matrix is singular to working precision.", ""),
            (Severity::Critical, true)
        );
        assert_eq!(
            c.classify("Matrix is close to singular or BADLY SCALED.", ""),
            (Severity::Critical, true)
        );
    }

    #[test]
    fn test_critical_ids() {
        let c = WarningClassifier::default();
        assert_eq!(
            c.classify("Results may be inaccurate.", "MATLAB:nearlySingularMatrix"),
            (Severity::Critical, true)
        );
        // identifiers match exactly
        assert_eq!(
            c.classify("Results may be inaccurate.", "matlab:nearlysingularmatrix"),
            (Severity::Info, false)
        );
    }

    #[test]
    fn test_warning_and_info_tiers() {
        let c = WarningClassifier::default();
        assert_eq!(c.classify("Warning: divide by zero", ""), (Severity::Warning, false));
        assert_eq!(
            c.classify("Imaginary parts of complex X and/or Y arguments ignored.", ""),
            (Severity::Warning, false)
        );
        assert_eq!(c.classify("Some other notice", "Custom:id"), (Severity::Info, false));
    }

    #[test]
    fn test_critical_checked_before_warning() {
        let c = WarningClassifier::default();
        // contains both "singular" and "negative"
        assert_eq!(
            c.classify("negative pivot, matrix singular", ""),
            (Severity::Critical, true)
        );
    }

    #[test]
    fn test_tables_are_extensible() {
        let c = WarningClassifier::new()
            .with_critical_keyword("Did Not Converge")
            .with_warning_keyword("polyfit");
        assert_eq!(
            c.classify("Iteration did not converge", ""),
            (Severity::Critical, true)
        );
        assert_eq!(c.classify("polyfit is badly conditioned", ""), (Severity::Warning, false));
    }

    #[tokio::test]
    async fn test_check_warnings_records_entry_and_issue() {
        let mut engine = MockEngine::new();
        engine
            .eval("warning('MATLAB:singularMatrix', 'Matrix is singular to working precision.')", true)
            .await
            .unwrap();

        let mut report = ValidationReport::new();
        check_warnings(&mut engine, &WarningClassifier::default(), &mut report).await;

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].severity, Severity::Critical);
        assert_eq!(report.issues[0].kind, IssueKind::MatlabWarning);
    }

    #[tokio::test]
    async fn test_only_last_warning_is_seen() {
        let mut engine = MockEngine::new();
        engine
            .eval("warning('first is singular'); warning('second is harmless')", true)
            .await
            .unwrap();

        let entry = try_check_warnings(&mut engine, &WarningClassifier::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.message, "second is harmless");
        assert_eq!(entry.severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_no_warning_adds_nothing() {
        let mut engine = MockEngine::new();
        let mut report = ValidationReport::new();
        check_warnings(&mut engine, &WarningClassifier::default(), &mut report).await;
        assert!(report.issues.is_empty());
        assert!(report.warnings.is_empty());
    }
}
