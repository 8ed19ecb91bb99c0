//! Workspace health scan: NaN, Inf and empty variables

use tracing::{debug, warn};

use super::{Issue, IssueDetail, IssueKind, Severity};
use crate::engine::{Engine, EngineError};

/// Variables inspected per scan, in `who()` order
pub const HEALTH_CHECK_LIMIT: usize = 10;

struct VariableHealth {
    has_nan: bool,
    has_inf: bool,
    is_empty: bool,
}

async fn inspect(engine: &mut dyn Engine, name: &str) -> Result<VariableHealth, EngineError> {
    let has_nan = engine
        .eval_expression(&format!("any(isnan({}(:)))", name))
        .await?
        .is_truthy();
    let has_inf = engine
        .eval_expression(&format!("any(isinf({}(:)))", name))
        .await?
        .is_truthy();
    let is_empty = engine
        .eval_expression(&format!("isempty({})", name))
        .await?
        .is_truthy();
    Ok(VariableHealth {
        has_nan,
        has_inf,
        is_empty,
    })
}

/// Scan the first [`HEALTH_CHECK_LIMIT`] workspace variables.
///
/// Variables that cannot be inspected (non-numeric types, say) are skipped.
/// None of the resulting issues is critical.
pub async fn check_workspace_health(engine: &mut dyn Engine) -> Vec<Issue> {
    let names = match engine.eval_expression("who()").await {
        Ok(value) => value.texts(),
        Err(e) => {
            warn!(error = %e, "workspace listing failed, skipping health check");
            return Vec::new();
        }
    };

    let mut issues = Vec::new();
    for name in names.iter().take(HEALTH_CHECK_LIMIT) {
        let health = match inspect(engine, name).await {
            Ok(health) => health,
            Err(e) => {
                debug!(variable = %name, error = %e, "variable not inspectable, skipped");
                continue;
            }
        };

        let variable = || Some(IssueDetail::Variable(name.clone()));
        if health.has_nan {
            issues.push(Issue {
                detail: variable(),
                ..Issue::new(
                    IssueKind::NanDetected,
                    Severity::Warning,
                    format!("Variable '{}' contains NaN values", name),
                )
            });
        }
        if health.has_inf {
            issues.push(Issue {
                detail: variable(),
                ..Issue::new(
                    IssueKind::InfDetected,
                    Severity::Warning,
                    format!("Variable '{}' contains Inf values", name),
                )
            });
        }
        if health.is_empty {
            issues.push(Issue {
                detail: variable(),
                ..Issue::new(
                    IssueKind::EmptyVariable,
                    Severity::Info,
                    format!("Variable '{}' is empty", name),
                )
            });
        }
    }

    issues
}
