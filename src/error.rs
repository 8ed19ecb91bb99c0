//! Error types with error codes
//!
//! Error code ranges:
//! - MLH-000-009: Configuration errors
//! - MLH-010-019: Engine lifecycle errors
//! - MLH-020-029: Workspace errors
//! - MLH-030-039: Project errors
//! - MLH-040-049: Artifact (script/figure) errors

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;

pub type Result<T> = std::result::Result<T, HarnessError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum HarnessError {
    // ═══════════════════════════════════════════
    // CONFIG ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[MLH-001] Invalid configuration: {reason}")]
    Config { reason: String },

    // ═══════════════════════════════════════════
    // ENGINE ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[MLH-010] MATLAB engine is not running")]
    EngineNotRunning,

    #[error("[MLH-011] MATLAB engine is already running")]
    EngineAlreadyRunning,

    #[error("[MLH-012] Failed to start MATLAB engine: {reason}")]
    EngineStart { reason: String },

    #[error("[MLH-013] {0}")]
    Engine(#[from] EngineError),

    #[error("[MLH-014] Unknown engine '{name}'")]
    UnknownEngine { name: String },

    // ═══════════════════════════════════════════
    // WORKSPACE ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[MLH-020] Variable '{name}' does not exist in workspace")]
    VariableNotFound { name: String },

    #[error("[MLH-021] '{name}' is not a valid variable name")]
    InvalidVariableName { name: String },

    // ═══════════════════════════════════════════
    // PROJECT ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[MLH-030] Invalid project name '{name}'")]
    InvalidProjectName { name: String },

    #[error("[MLH-031] Failed to prepare project directory {path}: {source}")]
    ProjectDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════
    // ARTIFACT ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[MLH-040] Failed to write script {path}: {source}")]
    ScriptWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MLH-041] Figure export failed: {reason}")]
    ExportFailed { reason: String },

    #[error("[MLH-042] Unknown export format '{format}'")]
    UnknownFormat { format: String },

    #[error("[MLH-090] IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failed look at engine state (figures, axes, warnings, variables).
///
/// Never surfaced as an execution failure: callers fall back to a fail-soft
/// or fail-open answer and log it.
#[derive(Error, Debug, Clone)]
#[error("could not inspect {target}: {source}")]
pub struct IntrospectionFailure {
    pub target: String,
    #[source]
    pub source: EngineError,
}

impl IntrospectionFailure {
    pub fn new(target: impl Into<String>, source: EngineError) -> Self {
        Self {
            target: target.into(),
            source,
        }
    }
}

impl HarnessError {
    /// Get the error code (e.g., "MLH-010")
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "MLH-001",
            Self::EngineNotRunning => "MLH-010",
            Self::EngineAlreadyRunning => "MLH-011",
            Self::EngineStart { .. } => "MLH-012",
            Self::Engine(_) => "MLH-013",
            Self::UnknownEngine { .. } => "MLH-014",
            Self::VariableNotFound { .. } => "MLH-020",
            Self::InvalidVariableName { .. } => "MLH-021",
            Self::InvalidProjectName { .. } => "MLH-030",
            Self::ProjectDir { .. } => "MLH-031",
            Self::ScriptWrite { .. } => "MLH-040",
            Self::ExportFailed { .. } => "MLH-041",
            Self::UnknownFormat { .. } => "MLH-042",
            Self::Io(_) => "MLH-090",
        }
    }
}

impl FixSuggestion for HarnessError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::Config { .. } => Some("Check config.toml syntax and MATLAB_* environment values"),
            Self::EngineNotRunning => Some("Start the engine before submitting code"),
            Self::EngineAlreadyRunning => Some("Stop the current engine before attaching another"),
            Self::EngineStart { .. } => {
                Some("Check that MATLAB is installed and MATLAB_PATH points at the binary")
            }
            Self::Engine(EngineError::Execution { .. }) => Some("Fix the MATLAB code and retry"),
            Self::Engine(EngineError::Host(_)) => {
                Some("The engine connection failed; restart the session")
            }
            Self::UnknownEngine { .. } => Some("Use one of: matlab, mock"),
            Self::VariableNotFound { .. } => Some("List variables with :vars to see what exists"),
            Self::InvalidVariableName { .. } => {
                Some("Variable names start with a letter and contain only letters, digits, _")
            }
            Self::InvalidProjectName { .. } => {
                Some("Use a plain folder name without slashes, '.' or '..'")
            }
            Self::ProjectDir { .. } => Some("Check permissions on the projects root directory"),
            Self::ScriptWrite { .. } => Some("Check permissions on the workspace directory"),
            Self::ExportFailed { .. } => {
                Some("Check the figure handle is open and the target directory is writable")
            }
            Self::UnknownFormat { .. } => Some("Use one of: png, jpg, tiff, svg, pdf, eps"),
            Self::Io(_) => Some("Check file path and permissions"),
        }
    }
}
