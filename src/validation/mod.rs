//! Result validation
//!
//! After a run, the orchestrator collects evidence that the output can be
//! trusted: the engine's last warning ([`warnings`]), whether each new figure
//! actually shows something ([`content`]), and optionally whether workspace
//! variables hold NaN/Inf/empty values ([`health`]). Everything lands in a
//! [`ValidationReport`].
//!
//! Severity decides the outcome: any `critical` issue (or, in strict mode,
//! any `warning` issue) turns a successful run into a failed one.

mod content;
mod health;
mod warnings;

pub use content::{try_inspect_figure, validate_figure, AxisDetail, ContentStatus, FigureValidation};
pub use health::{check_workspace_health, HEALTH_CHECK_LIMIT};
pub use warnings::{
    check_warnings, try_check_warnings, WarningClassifier, CRITICAL_IDS, CRITICAL_KEYWORDS,
    WARNING_KEYWORDS,
};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::Handle;

/// Severity tier of a warning or issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MatlabWarning,
    WarningCheckFailed,
    BlankFigure,
    NanDetected,
    InfDetected,
    EmptyVariable,
}

/// Structured context attached to an issue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueDetail {
    WarningId(String),
    Figure(Box<FigureValidation>),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<IssueDetail>,
}

impl Issue {
    pub fn new(kind: IssueKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: IssueDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Issue raised for a figure that has no plotted content
    pub fn blank_figure(figure: &FigureValidation) -> Self {
        Self::new(
            IssueKind::BlankFigure,
            Severity::Warning,
            format!("Figure {} appears to be empty or blank", figure.handle),
        )
        .with_detail(IssueDetail::Figure(Box::new(figure.clone())))
    }
}

/// A captured engine warning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarningEntry {
    pub message: String,
    /// May be empty
    pub id: String,
    pub severity: Severity,
}

/// Everything validation found for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub has_errors: bool,
    pub has_warnings: bool,
    pub warnings: Vec<WarningEntry>,
    pub figures: Vec<FigureValidation>,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_issue(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    /// Record a figure check, adding a blank-figure issue when it is confirmed empty
    pub fn push_figure(&mut self, figure: FigureValidation) {
        if !figure.is_valid {
            self.issues.push(Issue::blank_figure(&figure));
        }
        self.figures.push(figure);
    }

    /// Derive `has_errors` / `has_warnings` from the collected issues.
    ///
    /// In strict mode warning-tier issues count as errors.
    pub fn finalize(&mut self, strict: bool) {
        self.has_errors = self.issues.iter().any(|i| {
            i.severity == Severity::Critical || (strict && i.severity == Severity::Warning)
        });
        self.has_warnings = self.issues.iter().any(|i| i.severity != Severity::Critical);
    }

    pub fn critical_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Critical)
    }
}

/// Figures referenced by blank-figure issues
pub fn blank_figures(report: &ValidationReport) -> Vec<Handle> {
    report
        .figures
        .iter()
        .filter(|f| f.content == ContentStatus::Empty)
        .map(|f| f.handle)
        .collect()
}
