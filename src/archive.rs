//! Script archiving
//!
//! Submitted code can be kept as `<workspace>/scripts/script_<YYYYmmdd_HHMMSS>.m`
//! with a header recording when it ran, how many figures it made, the active
//! project and what validation found.
//!
//! Names have one-second resolution: two saves in the same second write the
//! same file and the later one wins.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::validation::ValidationReport;

/// Subdirectory of the workspace holding archived scripts
pub const SCRIPTS_DIR: &str = "scripts";

/// When submitted code is archived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoSaveMode {
    /// Every run
    Always,
    /// Only runs that created at least one figure
    #[default]
    OnFigures,
    Never,
}

impl AutoSaveMode {
    /// Whether a run that created `figures_created` figures is archived
    pub fn should_save(self, figures_created: usize) -> bool {
        match self {
            Self::Always => true,
            Self::OnFigures => figures_created > 0,
            Self::Never => false,
        }
    }
}

impl fmt::Display for AutoSaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::OnFigures => write!(f, "on_figures"),
            Self::Never => write!(f, "never"),
        }
    }
}

impl FromStr for AutoSaveMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "on_figures" | "on-figures" => Ok(Self::OnFigures),
            "never" => Ok(Self::Never),
            other => Err(format!(
                "unknown auto-save mode '{}' (expected always, on_figures or never)",
                other
            )),
        }
    }
}

/// Writes archived scripts under one workspace
#[derive(Debug, Clone)]
pub struct ScriptArchiver {
    scripts_dir: PathBuf,
}

impl ScriptArchiver {
    pub fn new(workspace_dir: &Path) -> Self {
        Self {
            scripts_dir: workspace_dir.join(SCRIPTS_DIR),
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Archive `code` if `mode` calls for it. Returns the written path.
    pub fn maybe_save(
        &self,
        code: &str,
        figures_created: usize,
        validation: Option<&ValidationReport>,
        mode: AutoSaveMode,
        project: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        if !mode.should_save(figures_created) {
            debug!(%mode, figures_created, "script not archived");
            return Ok(None);
        }
        self.save(code, figures_created, validation, project, Local::now())
            .map(Some)
    }

    /// Archive `code` unconditionally, stamped with `now`
    pub fn save(
        &self,
        code: &str,
        figures_created: usize,
        validation: Option<&ValidationReport>,
        project: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.scripts_dir).map_err(|source| HarnessError::ScriptWrite {
            path: self.scripts_dir.clone(),
            source,
        })?;

        let path = self
            .scripts_dir
            .join(format!("script_{}.m", now.format("%Y%m%d_%H%M%S")));
        let mut content = compose_header(now, figures_created, project, validation);
        content.push_str(code);

        fs::write(&path, content).map_err(|source| HarnessError::ScriptWrite {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "script archived");
        Ok(path)
    }
}

/// Comment header placed above archived code
pub fn compose_header(
    now: DateTime<Local>,
    figures_created: usize,
    project: Option<&str>,
    validation: Option<&ValidationReport>,
) -> String {
    let mut lines = vec![
        "% Auto-saved MATLAB script".to_string(),
        format!("% Generated: {}", now.format("%Y-%m-%d %H:%M:%S")),
        format!("% Figures created: {}", figures_created),
        format!("% Project: {}", project.unwrap_or("none")),
    ];

    if let Some(report) = validation {
        if !report.warnings.is_empty() {
            lines.push("%".to_string());
            lines.push("% MATLAB Warnings:".to_string());
            for warning in &report.warnings {
                lines.push(format!("%   - {}", warning.message));
            }
        }
        if !report.issues.is_empty() {
            lines.push("%".to_string());
            lines.push("% Issues detected:".to_string());
            for issue in &report.issues {
                lines.push(format!(
                    "%   [{}] {}",
                    issue.severity.as_str().to_uppercase(),
                    issue.message
                ));
            }
        }
    }

    lines.push("%".to_string());
    lines.push(String::new());
    lines.join("\n") + "\n"
}

/// Save `code` verbatim as a `.m` file, without a header.
///
/// `.m` is appended when missing; relative names resolve against `workspace_dir`.
pub fn save_script(workspace_dir: &Path, code: &str, filename: &str) -> Result<PathBuf> {
    let mut name = filename.to_string();
    if !name.ends_with(".m") {
        name.push_str(".m");
    }
    let path = resolve_in(workspace_dir, &name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| HarnessError::ScriptWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&path, code).map_err(|source| HarnessError::ScriptWrite {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Absolute paths are kept; relative ones are joined onto `base`
pub fn resolve_in(base: &Path, name: &str) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{Issue, IssueKind, Severity, WarningEntry};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_mode_policy() {
        assert!(AutoSaveMode::Always.should_save(0));
        assert!(!AutoSaveMode::OnFigures.should_save(0));
        assert!(AutoSaveMode::OnFigures.should_save(1));
        assert!(!AutoSaveMode::Never.should_save(3));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("on-figures".parse::<AutoSaveMode>().unwrap(), AutoSaveMode::OnFigures);
        assert_eq!("ALWAYS".parse::<AutoSaveMode>().unwrap(), AutoSaveMode::Always);
        assert!("sometimes".parse::<AutoSaveMode>().is_err());
        assert_eq!(AutoSaveMode::OnFigures.to_string(), "on_figures");
    }

    #[test]
    fn test_on_figures_without_figures_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let archiver = ScriptArchiver::new(dir.path());

        let saved = archiver
            .maybe_save("x = 1;", 0, None, AutoSaveMode::OnFigures, None)
            .unwrap();
        assert!(saved.is_none());
        assert!(!archiver.scripts_dir().exists());
    }

    #[test]
    fn test_on_figures_with_figure_writes_header() {
        let dir = TempDir::new().unwrap();
        let archiver = ScriptArchiver::new(dir.path());

        let path = archiver
            .maybe_save("plot(1:3)", 1, None, AutoSaveMode::OnFigures, Some("Foo"))
            .unwrap()
            .unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("% Figures created: 1"));
        assert!(content.contains("% Project: Foo"));
        assert!(content.ends_with("%\n\nplot(1:3)"));
        assert!(path.starts_with(dir.path().join("scripts")));
    }

    #[test]
    fn test_header_lists_warnings_and_issues() {
        let mut report = ValidationReport::new();
        report.warnings.push(WarningEntry {
            message: "Matrix is singular".into(),
            id: "MATLAB:singularMatrix".into(),
            severity: Severity::Critical,
        });
        report.push_issue(Issue::new(
            IssueKind::MatlabWarning,
            Severity::Critical,
            "Matrix is singular",
        ));

        let header = compose_header(fixed_time(), 0, None, Some(&report));
        assert_eq!(
            header,
            "% Auto-saved MATLAB script\n\
             % Generated: 2024-03-09 14:05:07\n\
             % Figures created: 0\n\
             % Project: none\n\
             %\n\
             % MATLAB Warnings:\n\
             %   - Matrix is singular\n\
             %\n\
             % Issues detected:\n\
             %   [CRITICAL] Matrix is singular\n\
             %\n\n"
        );
    }

    #[test]
    fn test_same_second_saves_overwrite() {
        let dir = TempDir::new().unwrap();
        let archiver = ScriptArchiver::new(dir.path());

        let first = archiver.save("a = 1;", 0, None, None, fixed_time()).unwrap();
        let second = archiver.save("a = 2;", 0, None, None, fixed_time()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap(), "script_20240309_140507.m");
        assert!(fs::read_to_string(&second).unwrap().ends_with("a = 2;"));
    }

    #[test]
    fn test_write_failure_is_error() {
        let dir = TempDir::new().unwrap();
        // a file where the scripts directory should be
        fs::write(dir.path().join(SCRIPTS_DIR), "").unwrap();
        let archiver = ScriptArchiver::new(dir.path());

        let err = archiver
            .maybe_save("x", 0, None, AutoSaveMode::Always, None)
            .unwrap_err();
        assert_eq!(err.code(), "MLH-040");
    }

    #[test]
    fn test_explicit_save_appends_extension() {
        let dir = TempDir::new().unwrap();
        let path = save_script(dir.path(), "disp(1)", "analysis").unwrap();
        assert_eq!(path, dir.path().join("analysis.m"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "disp(1)");

        let nested = save_script(dir.path(), "", "sub/keep.m").unwrap();
        assert!(nested.exists());
    }
}
