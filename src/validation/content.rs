//! Figure content inspection
//!
//! Walks figure → axes → plotted children to tell a populated figure from a
//! blank one. Axes are found at any depth, so layouts and panels
//! (`tiledlayout`, `uipanel`, `uitab`) are searched too. An inspection
//! failure is never read as "blank": the figure is reported valid with
//! unknown counts.

use serde::Serialize;
use tracing::warn;

use crate::engine::{Engine, EngineError, EngineValue, Handle};
use crate::error::IntrospectionFailure;

/// What the inspection established about a figure's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    HasContent,
    Empty,
    /// Inspection failed; content is assumed present
    Unknown,
}

/// Plot objects found in one axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisDetail {
    /// 1-based position among the figure's axes
    pub index: usize,
    pub children_count: usize,
    pub plot_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FigureValidation {
    pub handle: Handle,
    pub is_valid: bool,
    pub content: ContentStatus,
    pub has_axes: Option<bool>,
    pub axes_count: Option<usize>,
    pub plot_object_count: Option<usize>,
    pub axes: Vec<AxisDetail>,
    pub issues: Vec<String>,
}

impl FigureValidation {
    pub fn no_axes(handle: Handle) -> Self {
        Self {
            handle,
            is_valid: false,
            content: ContentStatus::Empty,
            has_axes: Some(false),
            axes_count: Some(0),
            plot_object_count: Some(0),
            axes: Vec::new(),
            issues: vec!["Figure has no axes".to_string()],
        }
    }

    /// Fail-open result for a figure that could not be inspected
    pub fn unknown(handle: Handle, failure: &IntrospectionFailure) -> Self {
        Self {
            handle,
            is_valid: true,
            content: ContentStatus::Unknown,
            has_axes: None,
            axes_count: None,
            plot_object_count: None,
            axes: Vec::new(),
            issues: vec![format!("Could not validate figure: {}", failure.source)],
        }
    }

    fn from_axes(handle: Handle, axes: Vec<AxisDetail>) -> Self {
        let total: usize = axes.iter().map(|a| a.children_count).sum();
        let issues = axes
            .iter()
            .filter(|a| a.children_count == 0)
            .map(|a| format!("Axis {} is empty (no plot objects)", a.index))
            .collect();

        Self {
            handle,
            is_valid: total > 0,
            content: if total > 0 {
                ContentStatus::HasContent
            } else {
                ContentStatus::Empty
            },
            has_axes: Some(true),
            axes_count: Some(axes.len()),
            plot_object_count: Some(total),
            axes,
            issues,
        }
    }
}

async fn children(
    engine: &mut dyn Engine,
    handle: Handle,
    what: &str,
) -> Result<Vec<Handle>, IntrospectionFailure> {
    let value = engine
        .get_property(handle, "Children")
        .await
        .map_err(|e| IntrospectionFailure::new(format!("{} {}", what, handle), e))?;
    value.handles().ok_or_else(|| {
        IntrospectionFailure::new(
            format!("{} {}", what, handle),
            EngineError::host(format!("unexpected Children value: {}", value)),
        )
    })
}

async fn object_type(
    engine: &mut dyn Engine,
    handle: Handle,
) -> Result<String, IntrospectionFailure> {
    let value = engine
        .get_property(handle, "Type")
        .await
        .map_err(|e| IntrospectionFailure::new(format!("object {}", handle), e))?;
    Ok(match value {
        EngineValue::Text(kind) => kind,
        other => other.texts().into_iter().next().unwrap_or_default(),
    })
}

/// Objects attached to axes that never hold axes of their own
const ANNOTATION_TYPES: &[&str] = &["legend", "colorbar"];

/// Every axes below `figure`, depth first in `Children` order
async fn find_axes(
    engine: &mut dyn Engine,
    figure: Handle,
) -> Result<Vec<Handle>, IntrospectionFailure> {
    let mut found = Vec::new();
    let mut pending = children(engine, figure, "figure").await?;
    pending.reverse();

    while let Some(object) = pending.pop() {
        let kind = object_type(engine, object).await?;
        if kind == "axes" {
            found.push(object);
        } else if !ANNOTATION_TYPES.contains(&kind.as_str()) {
            let mut nested = children(engine, object, &kind).await?;
            nested.reverse();
            pending.extend(nested);
        }
    }
    Ok(found)
}

/// Inspect a figure, surfacing any introspection failure
pub async fn try_inspect_figure(
    engine: &mut dyn Engine,
    figure: Handle,
) -> Result<FigureValidation, IntrospectionFailure> {
    let axes_handles = find_axes(engine, figure).await?;

    if axes_handles.is_empty() {
        return Ok(FigureValidation::no_axes(figure));
    }

    let mut axes = Vec::with_capacity(axes_handles.len());
    for (i, axis) in axes_handles.into_iter().enumerate() {
        let plotted = children(engine, axis, "axes").await?;
        let mut plot_types = Vec::with_capacity(plotted.len());
        for object in &plotted {
            plot_types.push(object_type(engine, *object).await?);
        }
        axes.push(AxisDetail {
            index: i + 1,
            children_count: plotted.len(),
            plot_types,
        });
    }

    Ok(FigureValidation::from_axes(figure, axes))
}

/// Inspect a figure; an inspection failure yields a fail-open result
pub async fn validate_figure(engine: &mut dyn Engine, figure: Handle) -> FigureValidation {
    match try_inspect_figure(engine, figure).await {
        Ok(validation) => validation,
        Err(e) => {
            warn!(figure = %figure, error = %e, "figure inspection failed, assuming content");
            FigureValidation::unknown(figure, &e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_figure_without_axes_is_invalid() {
        let mut engine = MockEngine::new();
        engine.eval("figure", true).await.unwrap();

        let v = validate_figure(&mut engine, Handle::from(1)).await;
        assert!(!v.is_valid);
        assert_eq!(v.axes_count, Some(0));
        assert_eq!(v.plot_object_count, Some(0));
        assert!(v.issues[0].contains("no axes"));
        assert_eq!(v.content, ContentStatus::Empty);
    }

    #[tokio::test]
    async fn test_single_plot_is_valid_without_issues() {
        let mut engine = MockEngine::new();
        engine.eval("figure; plot(1:10)", true).await.unwrap();

        let v = validate_figure(&mut engine, Handle::from(1)).await;
        assert!(v.is_valid);
        assert_eq!(v.plot_object_count, Some(1));
        assert_eq!(v.axes[0].plot_types, vec!["line".to_string()]);
        assert!(v.issues.is_empty());
    }

    #[tokio::test]
    async fn test_empty_axes_are_reported() {
        let mut engine = MockEngine::new();
        engine
            .eval("figure; subplot(2,1,1); subplot(2,1,2); bar([1 2 3])", true)
            .await
            .unwrap();

        let v = validate_figure(&mut engine, Handle::from(1)).await;
        assert!(v.is_valid);
        assert_eq!(v.axes_count, Some(2));
        // children come newest first, so the populated subplot is axis 1
        assert_eq!(v.axes[0].children_count, 1);
        assert_eq!(v.issues, vec!["Axis 2 is empty (no plot objects)".to_string()]);

        engine.eval("figure; axes", true).await.unwrap();
        let blank = validate_figure(&mut engine, Handle::from(2)).await;
        assert!(!blank.is_valid);
        assert!(blank.issues[0].to_lowercase().contains("axis 1 is empty"));
    }

    #[tokio::test]
    async fn test_inspection_failure_fails_open() {
        let mut engine = MockEngine::new();
        engine.eval("figure; plot(1)", true).await.unwrap();
        engine.fail_property("Type");

        assert!(try_inspect_figure(&mut engine, Handle::from(1)).await.is_err());

        let v = validate_figure(&mut engine, Handle::from(1)).await;
        assert!(v.is_valid);
        assert_eq!(v.content, ContentStatus::Unknown);
        assert_eq!(v.axes_count, None);
        assert_eq!(v.plot_object_count, None);
        assert_eq!(v.issues.len(), 1);
        assert!(v.issues[0].starts_with("Could not validate figure"));
    }

    #[tokio::test]
    async fn test_axes_inside_layout_containers_are_found() {
        let mut engine = MockEngine::new();
        engine
            .eval("figure; tiledlayout(2,1); nexttile; plot(1:3); legend('a'); nexttile", true)
            .await
            .unwrap();

        let v = validate_figure(&mut engine, Handle::from(1)).await;
        assert!(v.is_valid);
        assert_eq!(v.content, ContentStatus::HasContent);
        assert_eq!(v.axes_count, Some(2));
        assert_eq!(v.plot_object_count, Some(1));
        assert_eq!(v.issues, vec!["Axis 1 is empty (no plot objects)".to_string()]);

        engine.eval("figure; uipanel; axes", true).await.unwrap();
        let panel = validate_figure(&mut engine, Handle::from(2)).await;
        assert_eq!(panel.axes_count, Some(1));
        assert_eq!(panel.issues, vec!["Axis 1 is empty (no plot objects)".to_string()]);
    }
}
