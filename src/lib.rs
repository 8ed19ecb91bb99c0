//! matlab-harness - execution orchestration and result validation for MATLAB engine sessions

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod figures;
pub mod layout;
pub mod project;
pub mod render;
pub mod session;
pub mod validation;
pub mod workspace;

pub use archive::{AutoSaveMode, ScriptArchiver};
pub use config::SessionConfig;
pub use engine::{Engine, EngineError, EngineKind, EngineValue, Handle, MatlabProcess, MockEngine};
pub use error::{FixSuggestion, HarnessError, IntrospectionFailure, Result};
pub use executor::{ErrorKind, ExecutionRequest, ExecutionResult, Orchestrator};
pub use layout::{LayoutOutcome, LayoutStrategy, MonitorInfo};
pub use project::{CurrentProject, Project, ProjectListing, ProjectManager};
pub use render::render_execution;
pub use session::Session;
pub use validation::{Issue, IssueKind, Severity, ValidationReport, WarningClassifier};
pub use workspace::{ExportFormat, VariableInfo};
