//! Figure window layout
//!
//! Two deterministic placement strategies:
//!
//! - **cascade**: fixed-size windows stepped 40px right and down from near the
//!   top-left of the screen, restarting at the first position whenever the next
//!   step would cross the 50px right or bottom margin
//! - **tile**: a `ceil(sqrt(n))`-column grid filling one monitor, minus margins
//!   and a band reserved for the taskbar
//!
//! Geometry is MATLAB's `[left, bottom, width, height]` in pixels, with the
//! origin at the bottom-left of the primary screen.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::{Engine, EngineError, EngineValue, Handle};

/// Step between successive cascaded windows
pub const CASCADE_OFFSET: i64 = 40;
/// Distance kept from the right and bottom screen edges
pub const CASCADE_MARGIN: i64 = 50;
const CASCADE_LEFT: i64 = 50;
const CASCADE_TOP_GAP: i64 = 100;
const MAX_WIDTH: i64 = 800;
const MAX_HEIGHT: i64 = 600;

/// Gap between tiles and around the grid
pub const TILE_MARGIN: i64 = 10;
/// Vertical space left for taskbar / menu chrome
pub const TASKBAR_RESERVE: i64 = 100;

/// Window placement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutStrategy {
    #[default]
    Cascade,
    Tile,
}

impl fmt::Display for LayoutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cascade => write!(f, "cascade"),
            Self::Tile => write!(f, "tile"),
        }
    }
}

impl FromStr for LayoutStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cascade" => Ok(Self::Cascade),
            "tile" => Ok(Self::Tile),
            other => Err(format!(
                "unknown layout strategy '{}' (expected cascade or tile)",
                other
            )),
        }
    }
}

/// Window geometry in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i64,
    pub bottom: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(left: i64, bottom: i64, width: i64, height: i64) -> Self {
        Self {
            left,
            bottom,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.left + self.width
    }

    /// `[left, bottom, width, height]` as an engine value
    pub fn to_position(self) -> EngineValue {
        EngineValue::from(vec![
            self.left as f64,
            self.bottom as f64,
            self.width as f64,
            self.height as f64,
        ])
    }
}

/// Where one figure goes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub handle: Handle,
    pub rect: Rect,
}

/// One display, as reported by `MonitorPositions`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorInfo {
    pub left: i64,
    pub bottom: i64,
    pub width: i64,
    pub height: i64,
    pub is_primary: bool,
}

impl MonitorInfo {
    fn from_row(row: &[f64], index: usize) -> Option<Self> {
        match row {
            [left, bottom, width, height, ..] => Some(Self {
                left: *left as i64,
                bottom: *bottom as i64,
                width: *width as i64,
                height: *height as i64,
                is_primary: index == 0,
            }),
            _ => None,
        }
    }
}

/// Result of positioning a set of figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutOutcome {
    pub strategy: LayoutStrategy,
    /// Figures whose position update succeeded
    pub positioned: usize,
    /// Monitor actually used (tile only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<usize>,
    /// Why positioning stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LayoutOutcome {
    fn empty(strategy: LayoutStrategy) -> Self {
        Self {
            strategy,
            positioned: 0,
            monitor: None,
            error: None,
        }
    }

    fn failed(strategy: LayoutStrategy, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(strategy)
        }
    }
}

// ============================================================================
// ALGORITHMS
// ============================================================================

/// Cascade placements for `handles` on a `width` x `height` screen
pub fn cascade(handles: &[Handle], screen_width: i64, screen_height: i64) -> Vec<Placement> {
    let width = MAX_WIDTH.min((screen_width as f64 * 0.6) as i64);
    let height = MAX_HEIGHT.min((screen_height as f64 * 0.6) as i64);
    let start = (CASCADE_LEFT, screen_height - height - CASCADE_TOP_GAP);

    let mut placements = Vec::with_capacity(handles.len());
    let mut cursor: Option<(i64, i64)> = None;

    for &handle in handles {
        let (mut x, mut y) = match cursor {
            None => start,
            Some((px, py)) => (px + CASCADE_OFFSET, py - CASCADE_OFFSET),
        };
        if x + width > screen_width - CASCADE_MARGIN || y < CASCADE_MARGIN {
            (x, y) = start;
        }
        cursor = Some((x, y));
        placements.push(Placement {
            handle,
            rect: Rect::new(x, y, width, height),
        });
    }

    placements
}

/// Grid placements for `handles` on one monitor
pub fn tile(handles: &[Handle], monitor: &MonitorInfo) -> Vec<Placement> {
    let n = handles.len() as i64;
    if n == 0 {
        return Vec::new();
    }

    let cols = (n as f64).sqrt().ceil() as i64;
    let rows = (n + cols - 1) / cols;

    let usable_width = monitor.width - (cols + 1) * TILE_MARGIN;
    let usable_height = monitor.height - (rows + 1) * TILE_MARGIN - TASKBAR_RESERVE;
    let width = usable_width.div_euclid(cols).max(1);
    let height = usable_height.div_euclid(rows).max(1);

    handles
        .iter()
        .enumerate()
        .map(|(i, &handle)| {
            let (row, col) = (i as i64 / cols, i as i64 % cols);
            let x = monitor.left + TILE_MARGIN + col * (width + TILE_MARGIN);
            let y = monitor.bottom + monitor.height
                - (row + 1) * (height + TILE_MARGIN)
                - TASKBAR_RESERVE;
            Placement {
                handle,
                rect: Rect::new(x, y, width, height),
            }
        })
        .collect()
}

/// Parse `MonitorPositions`: a single row for one monitor, a matrix for several
pub fn parse_monitors(value: &EngineValue) -> Option<Vec<MonitorInfo>> {
    let monitors: Option<Vec<MonitorInfo>> = value
        .rows()?
        .iter()
        .enumerate()
        .map(|(i, row)| MonitorInfo::from_row(row, i))
        .collect();
    monitors.filter(|m| !m.is_empty())
}

// ============================================================================
// ENGINE SIDE
// ============================================================================

/// Screen width and height from the graphics root
pub async fn screen_size(engine: &mut dyn Engine) -> Result<(i64, i64), EngineError> {
    let value = engine.get_property(Handle::ROOT, "ScreenSize").await?;
    match value.scalars().as_deref() {
        Some([_, _, width, height, ..]) => Ok((*width as i64, *height as i64)),
        _ => Err(EngineError::host(format!("unexpected ScreenSize value: {}", value))),
    }
}

/// All monitors, primary first
pub async fn monitors(engine: &mut dyn Engine) -> Result<Vec<MonitorInfo>, EngineError> {
    let value = engine.get_property(Handle::ROOT, "MonitorPositions").await?;
    parse_monitors(&value)
        .ok_or_else(|| EngineError::host(format!("unexpected MonitorPositions value: {}", value)))
}

/// Issue one position update per placement, stopping at the first failure.
///
/// Returns how many updates succeeded and the failure, if any.
pub async fn apply(
    engine: &mut dyn Engine,
    placements: &[Placement],
) -> (usize, Option<EngineError>) {
    let mut positioned = 0;
    for placement in placements {
        if let Err(e) = engine
            .set_property(placement.handle, "Position", placement.rect.to_position())
            .await
        {
            return (positioned, Some(e));
        }
        positioned += 1;
    }
    (positioned, None)
}

/// Compute and apply a layout for `handles`
pub async fn position_figures(
    engine: &mut dyn Engine,
    handles: &[Handle],
    strategy: LayoutStrategy,
    monitor_index: usize,
) -> LayoutOutcome {
    if handles.is_empty() {
        return LayoutOutcome::empty(strategy);
    }

    let (placements, monitor) = match strategy {
        LayoutStrategy::Cascade => match screen_size(engine).await {
            Ok((width, height)) => (cascade(handles, width, height), None),
            Err(e) => {
                warn!(error = %e, "could not read screen size; figures not positioned");
                return LayoutOutcome::failed(strategy, format!("Failed to position figures: {}", e));
            }
        },
        LayoutStrategy::Tile => match monitors(engine).await {
            Ok(monitors) => {
                let index = if monitor_index < monitors.len() {
                    monitor_index
                } else {
                    debug!(monitor_index, available = monitors.len(), "monitor out of range, using primary");
                    0
                };
                (tile(handles, &monitors[index]), Some(index))
            }
            Err(e) => {
                warn!(error = %e, "could not read monitor layout; figures not positioned");
                return LayoutOutcome::failed(strategy, format!("Failed to get monitor info: {}", e));
            }
        },
    };

    let (positioned, failure) = apply(engine, &placements).await;
    let error = failure.map(|e| {
        warn!(
            positioned,
            total = placements.len(),
            error = %e,
            "figure positioning aborted"
        );
        format!("Failed to position figures: {}", e)
    });

    LayoutOutcome {
        strategy,
        positioned,
        monitor,
        error,
    }
}
