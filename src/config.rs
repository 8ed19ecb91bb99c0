//! Session Configuration
//!
//! Config is stored in `~/.config/matlab-harness/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (`MATLAB_WORKSPACE_DIR`, `MATLAB_AUTO_SAVE_MODE`, ...)
//! 3. Config file
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::archive::AutoSaveMode;
use crate::error::{HarnessError, Result};
use crate::layout::LayoutStrategy;

/// Name of the directory holding per-user projects
pub const PROJECTS_DIR_NAME: &str = "MATLAB_Projects";

/// Session configuration switches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Workspace root used until a project is selected
    pub workspace_dir: PathBuf,

    /// Override for `<Documents>/MATLAB_Projects`
    pub projects_root: Option<PathBuf>,

    /// MATLAB executable
    pub matlab_binary: PathBuf,

    /// How long to wait for MATLAB to boot
    pub startup_timeout_secs: u64,

    /// Default export resolution
    pub figure_dpi: u32,

    /// Validate results after each run
    pub validate_results: bool,

    /// Treat warning-tier issues as failures
    pub strict_validation: bool,

    /// Scan workspace variables for NaN/Inf/empty during validation
    pub check_workspace_health: bool,

    /// Reposition figure windows after runs that create figures
    pub auto_position: bool,

    pub layout_strategy: LayoutStrategy,

    /// Monitor used by the tile strategy (0 = primary)
    pub monitor_index: usize,

    /// Archive submitted code
    pub auto_save: bool,

    pub auto_save_mode: AutoSaveMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("./matlab_workspace"),
            projects_root: None,
            matlab_binary: PathBuf::from("matlab"),
            startup_timeout_secs: 120,
            figure_dpi: 300,
            validate_results: true,
            strict_validation: false,
            check_workspace_health: false,
            auto_position: true,
            layout_strategy: LayoutStrategy::Cascade,
            monitor_index: 0,
            auto_save: true,
            auto_save_mode: AutoSaveMode::OnFigures,
        }
    }
}

impl SessionConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/matlab-harness/` on Unix, `%APPDATA%/matlab-harness/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("matlab-harness")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from a file
    ///
    /// With no explicit path, a missing default file yields the defaults.
    /// An explicit path must exist. A malformed file is always an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = Self::config_path();
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = fs::read_to_string(&path).map_err(|e| HarnessError::Config {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HarnessError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Merge with values from an arbitrary variable lookup
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("MATLAB_WORKSPACE_DIR") {
            self.workspace_dir = PathBuf::from(dir);
        }
        if let Some(root) = var("MATLAB_PROJECTS_ROOT") {
            self.projects_root = Some(PathBuf::from(root));
        }
        if let Some(binary) = var("MATLAB_PATH") {
            self.matlab_binary = PathBuf::from(binary);
        }

        apply_parsed(&mut self.startup_timeout_secs, "MATLAB_STARTUP_TIMEOUT_SECS", &var);
        apply_parsed(&mut self.figure_dpi, "MATLAB_FIGURE_DPI", &var);
        apply_parsed(&mut self.monitor_index, "MATLAB_POSITION_MONITOR", &var);
        apply_parsed(&mut self.layout_strategy, "MATLAB_POSITION_STRATEGY", &var);
        apply_parsed(&mut self.auto_save_mode, "MATLAB_AUTO_SAVE_MODE", &var);

        apply_flag(&mut self.validate_results, var("MATLAB_VALIDATE_RESULTS"));
        apply_flag(&mut self.strict_validation, var("MATLAB_STRICT_VALIDATION"));
        apply_flag(&mut self.check_workspace_health, var("MATLAB_CHECK_WORKSPACE_HEALTH"));
        apply_flag(&mut self.auto_position, var("MATLAB_AUTO_POSITION"));
        apply_flag(&mut self.auto_save, var("MATLAB_AUTO_SAVE_SCRIPTS"));

        self
    }

    /// Directory that holds one subdirectory per project
    pub fn projects_root(&self) -> PathBuf {
        self.projects_root
            .clone()
            .unwrap_or_else(default_projects_root)
    }
}

/// `<home>/Documents/MATLAB_Projects`
pub fn default_projects_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Documents"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PROJECTS_DIR_NAME)
}

/// Booleans are on only for the literal text `true` (any case)
fn apply_flag(target: &mut bool, raw: Option<String>) {
    if let Some(raw) = raw {
        *target = raw.trim().eq_ignore_ascii_case("true");
    }
}

fn apply_parsed<T, F>(target: &mut T, key: &str, var: F)
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(e) => warn!(key, value = %raw, error = %e, "ignoring invalid environment value"),
        }
    }
}
