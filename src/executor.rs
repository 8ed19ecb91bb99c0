//! Execution orchestrator
//!
//! Wraps one engine `eval` with everything needed to judge its result:
//!
//! 1. snapshot open figures (before any engine state is touched)
//! 2. reset the engine's last warning, when validating
//! 3. evaluate the code
//! 4. map execution / host failures to a failed result
//! 5. snapshot figures again; the set difference is the new figures
//! 6. validate: last warning, content of each new figure, optional workspace health
//! 7. archive the code according to the auto-save policy
//! 8. lay out open figures when new ones appeared
//!
//! Nothing escapes `execute` as an error: every failure becomes an
//! [`ExecutionResult`] with `success == false` and an [`ErrorKind`].

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::archive::{AutoSaveMode, ScriptArchiver};
use crate::config::SessionConfig;
use crate::engine::{EngineError, EvalOutput, Handle};
use crate::figures;
use crate::layout;
use crate::session::Session;
use crate::validation::{
    check_warnings, check_workspace_health, validate_figure, ValidationReport,
};

/// Message of a run the engine accepted but validation rejected
pub const VALIDATION_FAILED_MESSAGE: &str =
    "Execution completed but validation found critical issues";

/// Why an execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// No engine; nothing was evaluated
    EngineNotRunning,
    /// The code ran and raised
    EngineExecutionError,
    /// Transport or process failure
    HostError,
    /// The code ran cleanly but validation found critical issues
    ValidationFailed,
}

/// One code submission
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub code: String,
    pub capture_output: bool,
    pub auto_position: bool,
    pub validate: bool,
    /// Overrides the configured auto-save switch
    pub auto_save: Option<bool>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            capture_output: true,
            auto_position: true,
            validate: true,
            auto_save: None,
        }
    }

    /// Request with validation and positioning taken from `config`
    pub fn from_config(code: impl Into<String>, config: &SessionConfig) -> Self {
        Self {
            validate: config.validate_results,
            auto_position: config.auto_position,
            ..Self::new(code)
        }
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn auto_position(mut self, enabled: bool) -> Self {
        self.auto_position = enabled;
        self
    }

    pub fn validate(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    pub fn auto_save(mut self, save: Option<bool>) -> Self {
        self.auto_save = save;
        self
    }
}

/// Outcome of [`Orchestrator::execute`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub has_warnings: bool,
    pub figures_created: usize,
    pub new_figures: Vec<Handle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figures_positioned: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_saved: Option<PathBuf>,
}

impl ExecutionResult {
    fn failure(kind: ErrorKind, message: impl Into<String>, output: EvalOutput) -> Self {
        Self {
            success: false,
            stdout: output.stdout,
            stderr: output.stderr,
            error: Some(message.into()),
            error_kind: Some(kind),
            ..Self::default()
        }
    }

    fn not_running() -> Self {
        Self::failure(
            ErrorKind::EngineNotRunning,
            "MATLAB engine is not running. Start it first.",
            EvalOutput::default(),
        )
    }

    /// The engine accepted the code but validation rejected the result
    pub fn is_validation_failure(&self) -> bool {
        self.error_kind == Some(ErrorKind::ValidationFailed)
    }
}

/// Runs code against a session's engine, one request at a time
pub struct Orchestrator {
    session: Session,
}

impl Orchestrator {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Evaluate `request.code` and judge the result
    #[instrument(skip(self, request), fields(code_len = request.code.len(), validate = request.validate))]
    pub async fn execute(&mut self, request: ExecutionRequest) -> ExecutionResult {
        let config = self.session.config().clone();
        let classifier = self.session.classifier().clone();
        let archiver = ScriptArchiver::new(self.session.workspace_dir());
        let project = self.session.project().map(|p| p.name.clone());

        let Some(engine) = self.session.engine_mut() else {
            return ExecutionResult::not_running();
        };

        let before = figures::list_handles(engine).await;

        if request.validate {
            if let Err(e) = engine.clear_last_warning().await {
                warn!(error = %e, "could not reset last warning");
            }
        }

        let output = match engine.eval(&request.code, request.capture_output).await {
            Ok(output) => output,
            Err(EngineError::Execution { message, output }) => {
                info!(error = %message, "code raised an error");
                return ExecutionResult::failure(ErrorKind::EngineExecutionError, message, output);
            }
            Err(EngineError::Host(message)) => {
                warn!(error = %message, "engine host failure");
                return ExecutionResult::failure(ErrorKind::HostError, message, EvalOutput::default());
            }
        };

        let after = figures::list_handles(engine).await;
        let new_figures = figures::diff_new(before, after.iter().copied());
        debug!(new = new_figures.len(), open = after.len(), "figures diffed");

        let mut result = ExecutionResult {
            success: true,
            stdout: output.stdout,
            stderr: output.stderr,
            figures_created: new_figures.len(),
            new_figures: new_figures.iter().copied().collect(),
            ..ExecutionResult::default()
        };

        if request.validate {
            let mut report = ValidationReport::new();
            check_warnings(engine, &classifier, &mut report).await;
            for &figure in &new_figures {
                let validation = validate_figure(engine, figure).await;
                report.push_figure(validation);
            }
            if config.check_workspace_health {
                for issue in check_workspace_health(engine).await {
                    report.push_issue(issue);
                }
            }
            report.finalize(config.strict_validation);

            if report.has_errors {
                result.success = false;
                result.error = Some(VALIDATION_FAILED_MESSAGE.to_string());
                result.error_kind = Some(ErrorKind::ValidationFailed);
            } else {
                result.has_warnings = report.has_warnings;
            }
            result.validation = Some(report);
        }

        let mode = if request.auto_save.unwrap_or(config.auto_save) {
            config.auto_save_mode
        } else {
            AutoSaveMode::Never
        };
        match archiver.maybe_save(
            &request.code,
            result.figures_created,
            result.validation.as_ref(),
            mode,
            project.as_deref(),
        ) {
            Ok(path) => result.script_saved = path,
            Err(e) => warn!(error = %e, "script archive failed"),
        }

        if request.auto_position && !new_figures.is_empty() {
            let open: Vec<Handle> = after.into_iter().collect();
            let outcome = layout::position_figures(
                engine,
                &open,
                config.layout_strategy,
                config.monitor_index,
            )
            .await;
            result.figures_positioned = Some(outcome.positioned);
        }

        info!(
            success = result.success,
            figures_created = result.figures_created,
            "execution finished"
        );
        result
    }
}
