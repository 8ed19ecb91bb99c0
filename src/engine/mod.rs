//! # Engine Abstraction Layer
//!
//! Trait and implementations for the computation engine a session drives.
//!
//! ## Overview
//!
//! - [`Engine`] - capability interface every binding provides
//! - [`MatlabProcess`] - production binding driving a MATLAB child process
//! - [`MockEngine`] - simulated engine with a graphics tree, for tests and dry runs
//!
//! ## Engine Trait
//!
//! ```rust,ignore
//! pub trait Engine: Send {
//!     async fn eval(&mut self, code: &str, capture: bool) -> Result<EvalOutput, EngineError>;
//!     async fn eval_expression(&mut self, expr: &str) -> Result<EngineValue, EngineError>;
//!     async fn get_property(&mut self, handle: Handle, property: &str) -> Result<EngineValue, EngineError>;
//!     async fn set_property(&mut self, handle: Handle, property: &str, value: EngineValue) -> Result<(), EngineError>;
//!     async fn last_warning(&mut self) -> Result<LastWarning, EngineError>;
//!     // ...
//! }
//! ```
//!
//! An engine is a single stateful resource. Methods take `&mut self`, so a
//! session can never have two calls in flight against the same engine.
//!
//! ## Creating Engines
//!
//! ```rust
//! use matlab_harness::engine::EngineKind;
//!
//! assert_eq!("mock".parse::<EngineKind>().unwrap(), EngineKind::Mock);
//! assert!("octave".parse::<EngineKind>().is_err());
//! ```

mod matlab;
mod mock;
mod value;

pub use matlab::MatlabProcess;
pub use mock::MockEngine;
pub use value::{quote, EngineValue, Handle};

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionConfig;
use crate::error::HarnessError;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure reported by an engine binding
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// The submitted code ran and raised. Output produced before the error is kept.
    #[error("{message}")]
    Execution { message: String, output: EvalOutput },

    /// Anything else: process, transport or protocol failure
    #[error("engine host error: {0}")]
    Host(String),
}

impl EngineError {
    /// Execution error without captured output
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            output: EvalOutput::default(),
        }
    }

    pub fn host(message: impl Into<String>) -> Self {
        Self::Host(message.into())
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}

// ============================================================================
// REQUEST/RESPONSE TYPES
// ============================================================================

/// Streams captured while evaluating code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalOutput {
    pub stdout: String,
    pub stderr: String,
}

impl EvalOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// The engine's single most recent warning (`lastwarn`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastWarning {
    pub message: String,
    /// Engine-assigned identifier, may be empty
    pub id: String,
}

impl LastWarning {
    pub fn new(message: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            id: id.into(),
        }
    }

    /// Whether a warning was actually raised
    pub fn is_set(&self) -> bool {
        !self.message.trim().is_empty()
    }
}

// ============================================================================
// ENGINE TRAIT (ASYNC)
// ============================================================================

/// Capability interface of a computation engine session
#[async_trait]
pub trait Engine: Send {
    /// Binding name (e.g., "matlab", "mock")
    fn name(&self) -> &str;

    /// Engine version string
    async fn version(&mut self) -> Result<String, EngineError>;

    /// Evaluate code in the base workspace.
    ///
    /// With `capture` the engine's stdout/stderr for this call are returned;
    /// without it they are discarded.
    async fn eval(&mut self, code: &str, capture: bool) -> Result<EvalOutput, EngineError>;

    /// Evaluate a single expression and return its value
    async fn eval_expression(&mut self, expr: &str) -> Result<EngineValue, EngineError>;

    /// Read a variable from the base workspace
    async fn get_variable(&mut self, name: &str) -> Result<EngineValue, EngineError>;

    /// Clear the named variables, or everything when `names` is `None`
    async fn clear_variables(&mut self, names: Option<&[String]>) -> Result<(), EngineError>;

    /// Read a graphics object property
    async fn get_property(
        &mut self,
        handle: Handle,
        property: &str,
    ) -> Result<EngineValue, EngineError>;

    /// Write a graphics object property
    async fn set_property(
        &mut self,
        handle: Handle,
        property: &str,
        value: EngineValue,
    ) -> Result<(), EngineError>;

    /// Most recent warning message and identifier
    async fn last_warning(&mut self) -> Result<LastWarning, EngineError>;

    /// Reset the last-warning marker
    async fn clear_last_warning(&mut self) -> Result<(), EngineError>;

    /// Shut the engine down
    async fn quit(&mut self) -> Result<(), EngineError>;
}

// ============================================================================
// ENGINE FACTORY
// ============================================================================

/// Available engine bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Matlab,
    Mock,
}

impl FromStr for EngineKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "matlab" => Ok(Self::Matlab),
            "mock" => Ok(Self::Mock),
            _ => Err(HarnessError::UnknownEngine {
                name: s.to_string(),
            }),
        }
    }
}

/// Launch an engine of the given kind
///
/// | Kind | Description | Requires |
/// |------|-------------|----------|
/// | `matlab` | MATLAB child process | `matlab` on PATH or `MATLAB_PATH` |
/// | `mock` | Simulated engine | Nothing |
pub async fn launch_engine(
    kind: EngineKind,
    config: &SessionConfig,
) -> Result<Box<dyn Engine>, HarnessError> {
    match kind {
        EngineKind::Matlab => {
            let timeout = Duration::from_secs(config.startup_timeout_secs);
            let engine = MatlabProcess::launch(&config.matlab_binary, timeout)
                .await
                .map_err(|e| HarnessError::EngineStart {
                    reason: e.to_string(),
                })?;
            Ok(Box::new(engine))
        }
        EngineKind::Mock => Ok(Box::new(MockEngine::new())),
    }
}
