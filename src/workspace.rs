//! Workspace and figure operations outside the execution pipeline
//!
//! These talk to the engine directly instead of going through
//! [`Orchestrator::execute`](crate::executor::Orchestrator::execute), so they
//! never archive scripts or reposition windows as a side effect.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::archive::{self, resolve_in};
use crate::engine::{quote, EngineError, EngineValue, Handle};
use crate::error::{HarnessError, Result};
use crate::figures;
use crate::layout::{self, LayoutOutcome, LayoutStrategy, MonitorInfo};
use crate::session::Session;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,62}$").unwrap());

/// Scratch variable used while converting expressions to LaTeX
const LATEX_SCRATCH: &str = "mlh_latex";

// ============================================================================
// VARIABLES
// ============================================================================

/// A workspace variable and what is known about it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub value: EngineValue,
    /// MATLAB class, when it could be read
    pub class: Option<String>,
    /// Dimensions, when they could be read
    pub size: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceListing {
    pub variables: Vec<String>,
    /// `whos` output
    pub details: String,
}

fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(HarnessError::InvalidVariableName {
            name: name.to_string(),
        })
    }
}

/// Read a variable together with its class and size
pub async fn get_variable(session: &mut Session, name: &str) -> Result<VariableInfo> {
    check_identifier(name)?;
    let engine = session.require_engine()?;

    let exists = engine
        .eval_expression(&format!("exist({}, 'var')", quote(name)))
        .await?;
    if !exists.is_truthy() {
        return Err(HarnessError::VariableNotFound {
            name: name.to_string(),
        });
    }

    let value = engine.get_variable(name).await?;

    let class = match engine.eval_expression(&format!("class({})", name)).await {
        Ok(v) => v.as_str().map(String::from),
        Err(e) => {
            debug!(variable = name, error = %e, "class unavailable");
            None
        }
    };
    let size = match engine.eval_expression(&format!("size({})", name)).await {
        Ok(v) => v
            .scalars()
            .map(|dims| dims.into_iter().map(|d| d as usize).collect()),
        Err(e) => {
            debug!(variable = name, error = %e, "size unavailable");
            None
        }
    };

    Ok(VariableInfo {
        name: name.to_string(),
        value,
        class,
        size,
    })
}

/// Variable names plus the engine's `whos` table
pub async fn list_workspace(session: &mut Session) -> Result<WorkspaceListing> {
    let engine = session.require_engine()?;
    let variables = engine.eval_expression("who()").await?.texts();
    let details = engine.eval("whos", true).await?.stdout;
    Ok(WorkspaceListing { variables, details })
}

/// Clear the named variables, or all of them
pub async fn clear_workspace(session: &mut Session, names: Option<&[String]>) -> Result<()> {
    if let Some(names) = names {
        for name in names {
            check_identifier(name)?;
        }
    }
    let engine = session.require_engine()?;
    engine.clear_variables(names).await?;
    Ok(())
}

/// Convert a symbolic expression to LaTeX with `latex(...)`
pub async fn symbolic_latex(session: &mut Session, expression: &str) -> Result<String> {
    let engine = session.require_engine()?;
    engine
        .eval(&format!("{} = latex({});", LATEX_SCRATCH, expression), false)
        .await?;
    let value = engine.get_variable(LATEX_SCRATCH).await?;

    let scratch = [LATEX_SCRATCH.to_string()];
    if let Err(e) = engine.clear_variables(Some(&scratch)).await {
        warn!(error = %e, "could not clear LaTeX scratch variable");
    }

    Ok(value.as_str().map(String::from).unwrap_or_else(|| value.to_string()))
}

// ============================================================================
// FIGURE EXPORT
// ============================================================================

/// Export file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpg,
    Tiff,
    Svg,
    Pdf,
    Eps,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Tiff => "tiff",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
            Self::Eps => "eps",
        }
    }

    /// Raster formats honor the DPI setting; the rest export vector content
    pub fn is_raster(self) -> bool {
        matches!(self, Self::Png | Self::Jpg | Self::Tiff)
    }

    /// `print` device for the fallback path
    fn print_device(self) -> &'static str {
        match self {
            Self::Png => "-dpng",
            Self::Jpg => "-djpeg",
            Self::Tiff => "-dtiff",
            Self::Svg => "-dsvg",
            Self::Pdf => "-dpdf",
            Self::Eps => "-depsc",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = HarnessError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "tif" | "tiff" => Ok(Self::Tiff),
            "svg" => Ok(Self::Svg),
            "pdf" => Ok(Self::Pdf),
            "eps" => Ok(Self::Eps),
            _ => Err(HarnessError::UnknownFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Per-figure result of [`export_all_figures`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FigureExport {
    pub handle: Handle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn export_code(figure: &str, path: &Path, format: ExportFormat, dpi: u32) -> String {
    let target = quote(&path.to_string_lossy());
    let primary = if format.is_raster() {
        format!("exportgraphics({}, {}, 'Resolution', {});", figure, target, dpi)
    } else {
        format!("exportgraphics({}, {}, 'ContentType', 'vector');", figure, target)
    };
    format!(
        "try\n    {primary}\ncatch\n    print({figure}, '{device}', '-r{dpi}', {target});\nend\n",
        primary = primary,
        figure = figure,
        device = format.print_device(),
        dpi = dpi,
        target = target,
    )
}

fn default_export_name(prefix: &str, format: ExportFormat) -> String {
    format!("{}_{}.{}", prefix, chrono::Utc::now().timestamp(), format.extension())
}

/// Export one figure (the current one when `handle` is `None`)
pub async fn export_figure(
    session: &mut Session,
    handle: Option<Handle>,
    filename: Option<&str>,
    format: ExportFormat,
    dpi: Option<u32>,
) -> Result<PathBuf> {
    let dpi = dpi.unwrap_or(session.config().figure_dpi);
    let name = filename
        .map(String::from)
        .unwrap_or_else(|| default_export_name("figure", format));
    let path = resolve_in(session.workspace_dir(), &name);

    let engine = session.require_engine()?;
    let figure = match handle {
        Some(h) => {
            let open = figures::try_list_handles(engine)
                .await
                .map_err(|e| HarnessError::ExportFailed {
                    reason: e.to_string(),
                })?;
            if !open.contains(&h) {
                return Err(HarnessError::ExportFailed {
                    reason: format!("figure {} is not open", h),
                });
            }
            format!("figure({})", h)
        }
        None => "gcf".to_string(),
    };

    engine
        .eval(&export_code(&figure, &path, format, dpi), true)
        .await
        .map_err(|e| match e {
            EngineError::Execution { message, .. } => HarnessError::ExportFailed { reason: message },
            host => HarnessError::Engine(host),
        })?;

    if !path.exists() {
        return Err(HarnessError::ExportFailed {
            reason: format!("export ran but {} was not created", path.display()),
        });
    }
    Ok(path)
}

/// Export every open figure; failures are reported per figure
pub async fn export_all_figures(
    session: &mut Session,
    format: ExportFormat,
    dpi: Option<u32>,
) -> Result<Vec<FigureExport>> {
    let open = {
        let engine = session.require_engine()?;
        figures::try_list_handles(engine)
            .await
            .map_err(|e| HarnessError::ExportFailed {
                reason: e.to_string(),
            })?
    };

    let mut exports = Vec::with_capacity(open.len());
    for handle in open {
        let name = default_export_name(&format!("figure_{}", handle), format);
        let outcome = export_figure(session, Some(handle), Some(&name), format, dpi).await;
        exports.push(match outcome {
            Ok(path) => FigureExport {
                handle,
                path: Some(path),
                error: None,
            },
            Err(e) => FigureExport {
                handle,
                path: None,
                error: Some(e.to_string()),
            },
        });
    }
    Ok(exports)
}

// ============================================================================
// SCRIPTS & LAYOUT
// ============================================================================

/// Save code verbatim under the workspace root
pub fn save_script(session: &Session, code: &str, filename: &str) -> Result<PathBuf> {
    archive::save_script(session.workspace_dir(), code, filename)
}

/// Lay out every open figure now
pub async fn position_figures(
    session: &mut Session,
    strategy: Option<LayoutStrategy>,
) -> Result<LayoutOutcome> {
    let strategy = strategy.unwrap_or(session.config().layout_strategy);
    let monitor = session.config().monitor_index;
    let engine = session.require_engine()?;

    let open: Vec<Handle> = figures::list_handles(engine).await.into_iter().collect();
    Ok(layout::position_figures(engine, &open, strategy, monitor).await)
}

/// Connected monitors, primary first
pub async fn monitors(session: &mut Session) -> Result<Vec<MonitorInfo>> {
    let engine = session.require_engine()?;
    Ok(layout::monitors(engine).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_check() {
        assert!(check_identifier("x_1").is_ok());
        assert!(check_identifier("1x").is_err());
        assert!(check_identifier("a;delete").is_err());
        assert!(check_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JPEG".parse::<ExportFormat>().unwrap(), ExportFormat::Jpg);
        assert!(ExportFormat::Tiff.is_raster());
        assert!(!ExportFormat::Pdf.is_raster());
        assert_eq!("bmp".parse::<ExportFormat>().unwrap_err().code(), "MLH-042");
    }

    #[test]
    fn test_export_code_uses_fallback() {
        let code = export_code("gcf", Path::new("/tmp/out.pdf"), ExportFormat::Pdf, 300);
        assert!(code.contains("exportgraphics(gcf, '/tmp/out.pdf', 'ContentType', 'vector');"));
        assert!(code.contains("print(gcf, '-dpdf', '-r300', '/tmp/out.pdf');"));

        let raster = export_code("figure(2)", Path::new("a.png"), ExportFormat::Png, 150);
        assert!(raster.contains("'Resolution', 150"));
    }
}
