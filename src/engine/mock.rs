//! Mock engine for testing
//!
//! Simulates a MATLAB session in memory: a graphics tree (root, figures,
//! axes, plot objects), a base workspace and a last-warning slot. Code is
//! interpreted statement by statement for a small MATLAB subset:
//!
//! - `figure`, `figure(n)`, `axes`, `subplot(...)`, `hold on|off`
//! - `tiledlayout(...)` / `uipanel` add a container; later axes and `nexttile` go inside it
//! - `legend` / `colorbar` add an annotation object next to the current axes
//! - plot commands (`plot`, `scatter`, `bar`, `surf`, ...) add a child to the current axes
//! - `disp`, `fprintf` write to stdout; `warning(...)` sets the last warning
//! - `error(...)` raises an execution error, keeping earlier output
//! - assignments of numbers, ranges, matrices and strings; `clear`, `close`
//! - `exportgraphics` / `print` / `saveas` write a placeholder file
//!
//! Anything else is accepted and ignored. Clones share state, so a test can
//! keep one handle while the session owns another.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use super::{Engine, EngineError, EngineValue, EvalOutput, Handle, LastWarning};

static FIGURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^figure\s*(?:\(\s*(\d*)\s*\))?$").unwrap());
static AXES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:axes|subplot|nexttile)\b").unwrap());
static CONTAINER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(tiledlayout|uipanel)\b").unwrap());
static ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(legend|colorbar)\b").unwrap());
static PLOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(plot3?|scatter3?|barh?|histogram|surf|mesh|line|area|stem|stairs|contourf?|imagesc|image|fill|patch|pie|errorbar|semilogx|semilogy|loglog|quiver)\s*\(",
    )
    .unwrap()
});
static HOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^hold\s*(?:\(\s*'?)?(on|off)").unwrap());
static DISP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^disp\s*\((.*)\)$").unwrap());
static FPRINTF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^fprintf\s*\(\s*'((?:[^']|'')*)'").unwrap());
static ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^error\s*\((.*)\)$").unwrap());
static WARNING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^warning\s*\((.*)\)$").unwrap());
static CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^close(?:\s+(all)|\s*\(\s*'?(all|\d+)'?\s*\))?$").unwrap());
static CLEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:clear|clearvars)(?:\s+(.*))?$").unwrap());
static EXPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:exportgraphics|print|saveas)\s*\(").unwrap());
static ASSIGN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]\w*)\s*=\s*([^=].*)$").unwrap());
static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]\w*$").unwrap());
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"'((?:[^']|'')*)'").unwrap());
static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?[\d.]+)\s*:\s*(?:(-?[\d.]+)\s*:\s*)?(-?[\d.]+)$").unwrap()
});
static DIVISION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?[\d.]+)\s*/\s*(-?[\d.]+)$").unwrap());
static LATEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^latex\s*\((.*)\)$").unwrap());

// Queries answered by eval_expression
static EXIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^exist\s*\(\s*'(\w+)'\s*(?:,\s*'var'\s*)?\)$").unwrap());
static QUERY_FN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(class|size|isempty)\s*\(\s*(\w+)\s*\)$").unwrap());
static ANY_NONFINITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^any\s*\(\s*(isnan|isinf)\s*\(\s*(\w+)\s*\(\s*:\s*\)\s*\)\s*\)$").unwrap());
static WHO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^who\s*(?:\(\s*\))?$").unwrap());

/// Statement keywords that are accepted without effect
const NO_OPS: &[&str] = &[
    "format", "clc", "drawnow", "grid", "title", "xlabel", "ylabel", "zlabel", "legend",
    "colorbar", "colormap", "axis", "try", "catch", "end", "else", "elseif", "if", "for",
    "while", "shg", "tic", "toc", "lastwarn", "rng",
];

const DEFAULT_SCREEN: [f64; 4] = [1.0, 1.0, 1920.0, 1080.0];

/// Mock engine backed by an in-memory MATLAB simulation
#[derive(Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug)]
struct MockState {
    objects: BTreeMap<Handle, GraphicsObject>,
    next_object: u32,
    current_figure: Option<Handle>,
    variables: BTreeMap<String, EngineValue>,
    last_warning: LastWarning,
    monitors: Vec<[f64; 4]>,
    failing_properties: BTreeSet<String>,
    /// Remaining successful `set_property` calls before failures start
    set_budget: Option<usize>,
    /// Host failure returned by the next `eval`
    eval_failure: Option<String>,
    calls: Vec<String>,
    evaluated: Vec<String>,
}

#[derive(Debug, Clone)]
struct GraphicsObject {
    kind: String,
    parent: Handle,
    children: Vec<Handle>,
    position: Option<Vec<f64>>,
    hold: bool,
    current_axes: Option<Handle>,
    /// Layout container new axes are placed in (figures only)
    container: Option<Handle>,
}

impl GraphicsObject {
    fn new(kind: &str, parent: Handle) -> Self {
        Self {
            kind: kind.to_string(),
            parent,
            children: Vec::new(),
            position: None,
            hold: false,
            current_axes: None,
            container: None,
        }
    }
}

impl MockEngine {
    /// Create a mock engine with a single 1920x1080 monitor
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                objects: BTreeMap::new(),
                next_object: 100,
                current_figure: None,
                variables: BTreeMap::new(),
                last_warning: LastWarning::default(),
                monitors: vec![DEFAULT_SCREEN],
                failing_properties: BTreeSet::new(),
                set_budget: None,
                eval_failure: None,
                calls: Vec::new(),
                evaluated: Vec::new(),
            })),
        }
    }

    /// Use a single monitor of the given size
    pub fn with_screen(self, width: f64, height: f64) -> Self {
        self.state.lock().monitors = vec![[1.0, 1.0, width, height]];
        self
    }

    /// Use several monitors (`[left, bottom, width, height]`, primary first)
    pub fn with_monitors(self, monitors: Vec<[f64; 4]>) -> Self {
        if !monitors.is_empty() {
            self.state.lock().monitors = monitors;
        }
        self
    }

    /// Make every read of `property` fail with a host error
    pub fn fail_property(&self, property: &str) {
        self.state.lock().failing_properties.insert(property.to_string());
    }

    /// Allow `count` successful property writes, then fail the rest
    pub fn fail_positioning_after(&self, count: usize) {
        self.state.lock().set_budget = Some(count);
    }

    /// Make the next `eval` fail with a host error
    pub fn fail_next_eval(&self, message: impl Into<String>) {
        self.state.lock().eval_failure = Some(message.into());
    }

    /// Define a workspace variable
    pub fn set_variable(&self, name: &str, value: EngineValue) {
        self.state.lock().variables.insert(name.to_string(), value);
    }

    /// Open figures, ascending
    pub fn figures(&self) -> Vec<Handle> {
        let state = self.state.lock();
        state.figure_handles()
    }

    /// Last position written to a figure
    pub fn position_of(&self, handle: Handle) -> Option<Vec<f64>> {
        let state = self.state.lock();
        state.objects.get(&handle).and_then(|o| o.position.clone())
    }

    /// Every engine call made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Code passed to `eval`, in order
    pub fn evaluated(&self) -> Vec<String> {
        self.state.lock().evaluated.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

impl MockState {
    fn figure_handles(&self) -> Vec<Handle> {
        self.objects
            .iter()
            .filter(|(_, o)| o.kind == "figure")
            .map(|(h, _)| *h)
            .collect()
    }

    fn next_object_handle(&mut self) -> Handle {
        self.next_object += 1;
        // fractional like real axes/line handles
        Handle::new(f64::from(self.next_object) + 0.000_122_070_312_5)
    }

    fn open_figure(&mut self, number: Option<u32>) -> Handle {
        if let Some(n) = number {
            let handle = Handle::from(n);
            if self.objects.contains_key(&handle) {
                self.current_figure = Some(handle);
                return handle;
            }
        }
        let number = number.unwrap_or_else(|| {
            (1..)
                .find(|n| !self.objects.contains_key(&Handle::from(*n)))
                .unwrap_or(1)
        });
        let handle = Handle::from(number);
        self.objects.insert(handle, GraphicsObject::new("figure", Handle::ROOT));
        self.current_figure = Some(handle);
        handle
    }

    fn current_figure(&mut self) -> Handle {
        match self.current_figure {
            Some(h) if self.objects.contains_key(&h) => h,
            _ => self.open_figure(None),
        }
    }

    /// Parent for new axes: the figure's layout container, else the figure
    fn axes_parent(&mut self) -> (Handle, Handle) {
        let figure = self.current_figure();
        let container = self
            .objects
            .get(&figure)
            .and_then(|f| f.container)
            .filter(|c| self.objects.contains_key(c));
        (figure, container.unwrap_or(figure))
    }

    fn add_child(&mut self, kind: &str, parent: Handle) -> Handle {
        let child = self.next_object_handle();
        self.objects.insert(child, GraphicsObject::new(kind, parent));
        if let Some(p) = self.objects.get_mut(&parent) {
            p.children.push(child);
        }
        child
    }

    fn add_axes(&mut self) -> Handle {
        let (figure, parent) = self.axes_parent();
        let axes = self.add_child("axes", parent);
        if let Some(fig) = self.objects.get_mut(&figure) {
            fig.current_axes = Some(axes);
        }
        axes
    }

    fn add_container(&mut self, kind: &str) -> Handle {
        let figure = self.current_figure();
        let container = self.add_child(kind, figure);
        if let Some(fig) = self.objects.get_mut(&figure) {
            fig.container = Some(container);
            fig.current_axes = None;
        }
        container
    }

    fn add_annotation(&mut self, kind: &str) -> Handle {
        self.current_axes();
        let (_, parent) = self.axes_parent();
        self.add_child(kind, parent)
    }

    fn current_axes(&mut self) -> Handle {
        let figure = self.current_figure();
        let existing = self.objects.get(&figure).and_then(|f| f.current_axes);
        match existing {
            Some(axes) if self.objects.contains_key(&axes) => axes,
            _ => self.add_axes(),
        }
    }

    fn add_plot(&mut self, kind: &str) -> Handle {
        let axes = self.current_axes();
        let hold = self.objects.get(&axes).map(|a| a.hold).unwrap_or(false);
        if !hold {
            let old: Vec<Handle> = self
                .objects
                .get_mut(&axes)
                .map(|a| std::mem::take(&mut a.children))
                .unwrap_or_default();
            for child in old {
                self.objects.remove(&child);
            }
        }
        let child = self.next_object_handle();
        self.objects.insert(child, GraphicsObject::new(kind, axes));
        if let Some(a) = self.objects.get_mut(&axes) {
            a.children.push(child);
        }
        child
    }

    fn remove_tree(&mut self, handle: Handle) {
        if let Some(object) = self.objects.remove(&handle) {
            for child in object.children {
                self.remove_tree(child);
            }
        }
        if self.current_figure == Some(handle) {
            self.current_figure = None;
        }
    }

    fn close(&mut self, target: Option<&str>) {
        match target {
            Some("all") => {
                for figure in self.figure_handles() {
                    self.remove_tree(figure);
                }
            }
            Some(number) => {
                if let Ok(n) = number.parse::<u32>() {
                    self.remove_tree(Handle::from(n));
                }
            }
            None => {
                if let Some(current) = self.current_figure {
                    self.remove_tree(current);
                }
            }
        }
    }

    fn run(&mut self, code: &str) -> Result<EvalOutput, EngineError> {
        let mut output = EvalOutput::default();
        for statement in split_statements(code) {
            if let Err(message) = self.exec_statement(&statement, &mut output) {
                return Err(EngineError::Execution { message, output });
            }
        }
        Ok(output)
    }

    /// Graphics constructors; returns the created object's handle
    fn exec_graphics(&mut self, stmt: &str) -> Option<Handle> {
        if let Some(caps) = FIGURE.captures(stmt) {
            let number = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            Some(self.open_figure(number))
        } else if AXES.is_match(stmt) {
            Some(self.add_axes())
        } else if let Some(caps) = CONTAINER.captures(stmt) {
            Some(self.add_container(&caps[1]))
        } else if let Some(caps) = ANNOTATION.captures(stmt) {
            Some(self.add_annotation(&caps[1]))
        } else if let Some(caps) = PLOT.captures(stmt) {
            Some(self.add_plot(plot_type(&caps[1])))
        } else {
            None
        }
    }

    fn exec_statement(&mut self, stmt: &str, out: &mut EvalOutput) -> Result<(), String> {
        if self.exec_graphics(stmt).is_some() {
            return Ok(());
        }
        if let Some(caps) = HOLD.captures(stmt) {
            let axes = self.current_axes();
            if let Some(a) = self.objects.get_mut(&axes) {
                a.hold = &caps[1] == "on";
            }
        } else if let Some(caps) = DISP.captures(stmt) {
            let arg = caps[1].trim();
            let text = match quoted_args(arg).first() {
                Some(s) if arg.starts_with('\'') => s.clone(),
                _ => self.evaluate(arg)?.to_string(),
            };
            out.stdout.push_str(&text);
            out.stdout.push('\n');
        } else if let Some(caps) = FPRINTF.captures(stmt) {
            out.stdout.push_str(&unescape_format(&caps[1]));
        } else if let Some(caps) = ERROR.captures(stmt) {
            let args = quoted_args(&caps[1]);
            return Err(message_from_args(&args).1);
        } else if let Some(caps) = WARNING.captures(stmt) {
            let args = quoted_args(&caps[1]);
            if matches!(args.first().map(String::as_str), Some("on" | "off" | "query")) {
                return Ok(());
            }
            let (id, message) = message_from_args(&args);
            out.stderr.push_str(&format!("Warning: {}\n", message));
            self.last_warning = LastWarning::new(message, id);
        } else if let Some(caps) = CLOSE.captures(stmt) {
            let target = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
            self.close(target);
        } else if let Some(caps) = CLEAR.captures(stmt) {
            let names: Vec<String> = caps
                .get(1)
                .map(|m| m.as_str().split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            self.clear(&names);
        } else if EXPORT.is_match(stmt) {
            export_placeholder(stmt)?;
        } else if let Some(caps) = ASSIGN.captures(stmt) {
            let rhs = caps[2].trim();
            let value = match self.exec_graphics(rhs) {
                Some(handle) => EngineValue::Scalar(handle.value()),
                None => self.evaluate(rhs).unwrap_or_else(|_| {
                    debug!(statement = stmt, "mock engine stored unevaluated assignment");
                    EngineValue::Absent
                }),
            };
            self.variables.insert(caps[1].to_string(), value);
        } else if IDENT.is_match(stmt) {
            if let Some(value) = self.variables.get(stmt) {
                out.stdout.push_str(&format!("{} = {}\n", stmt, value));
            }
        } else if !is_no_op(stmt) {
            debug!(statement = stmt, "mock engine ignored statement");
        }
        Ok(())
    }

    fn clear(&mut self, names: &[String]) {
        if names.is_empty() || names.iter().any(|n| n == "all") {
            self.variables.clear();
        } else {
            for name in names {
                self.variables.remove(name);
            }
        }
    }

    /// Evaluate a value expression: literal, range, matrix, variable
    fn evaluate(&self, expr: &str) -> Result<EngineValue, String> {
        let expr = expr.trim();
        if let Some(value) = parse_literal(expr) {
            return Ok(value);
        }
        if let Some(caps) = LATEX.captures(expr) {
            // the simulation has no symbolic toolbox; echo the expression
            return Ok(EngineValue::Text(caps[1].trim().to_string()));
        }
        if IDENT.is_match(expr) {
            return self
                .variables
                .get(expr)
                .cloned()
                .ok_or_else(|| format!("Unrecognized function or variable '{}'.", expr));
        }
        Err(format!("Unsupported expression '{}'", expr))
    }

    fn query(&self, expr: &str) -> Result<EngineValue, String> {
        let expr = expr.trim();
        if WHO.is_match(expr) {
            let names = self.variables.keys().map(|k| EngineValue::Text(k.clone()));
            return Ok(EngineValue::Sequence(names.collect()));
        }
        if expr == "version" {
            return Ok(EngineValue::Text(MOCK_VERSION.to_string()));
        }
        if let Some(caps) = EXIST.captures(expr) {
            let exists = self.variables.contains_key(&caps[1]);
            return Ok(EngineValue::Scalar(if exists { 1.0 } else { 0.0 }));
        }
        if let Some(caps) = QUERY_FN.captures(expr) {
            let value = self.variable(&caps[2])?;
            return Ok(match &caps[1] {
                "class" => EngineValue::Text(class_of(value).to_string()),
                "size" => EngineValue::from(size_of(value)),
                _ => bool_value(value.is_absent() || value.as_str() == Some("")),
            });
        }
        if let Some(caps) = ANY_NONFINITE.captures(expr) {
            let value = self.variable(&caps[2])?;
            let numbers = value.scalars().unwrap_or_default();
            let hit = if &caps[1] == "isnan" {
                numbers.iter().any(|x| x.is_nan())
            } else {
                numbers.iter().any(|x| x.is_infinite())
            };
            return Ok(bool_value(hit));
        }
        self.evaluate(expr)
    }

    fn variable(&self, name: &str) -> Result<&EngineValue, String> {
        self.variables
            .get(name)
            .ok_or_else(|| format!("Unrecognized function or variable '{}'.", name))
    }

    fn property(&self, handle: Handle, property: &str) -> Result<EngineValue, String> {
        if handle == Handle::ROOT {
            return match property {
                "Children" => {
                    // newest first, like get(groot, 'Children')
                    let mut figures = self.figure_handles();
                    figures.reverse();
                    Ok(handles_value(&figures))
                }
                "ScreenSize" => Ok(EngineValue::from(self.monitors[0].to_vec())),
                "MonitorPositions" => Ok(if self.monitors.len() == 1 {
                    EngineValue::from(self.monitors[0].to_vec())
                } else {
                    EngineValue::Sequence(
                        self.monitors.iter().map(|m| EngineValue::from(m.to_vec())).collect(),
                    )
                }),
                other => Err(format!("Unrecognized property '{}' for class 'Root'.", other)),
            };
        }

        let object = self
            .objects
            .get(&handle)
            .ok_or_else(|| "Invalid or deleted object.".to_string())?;
        match property {
            "Children" => {
                let mut children = object.children.clone();
                children.reverse();
                Ok(handles_value(&children))
            }
            "Type" => Ok(EngineValue::Text(object.kind.clone())),
            "Parent" => Ok(EngineValue::Scalar(object.parent.value())),
            "Number" if object.kind == "figure" => Ok(EngineValue::Scalar(handle.value())),
            "Position" => Ok(EngineValue::from(
                object
                    .position
                    .clone()
                    .unwrap_or_else(|| vec![680.0, 458.0, 560.0, 420.0]),
            )),
            other => Err(format!("Unrecognized property '{}'.", other)),
        }
    }
}

const MOCK_VERSION: &str = "mock (simulated MATLAB)";

fn handles_value(handles: &[Handle]) -> EngineValue {
    match handles {
        [] => EngineValue::Absent,
        [single] => EngineValue::Scalar(single.value()),
        many => EngineValue::Sequence(many.iter().map(|h| EngineValue::Scalar(h.value())).collect()),
    }
}

fn bool_value(flag: bool) -> EngineValue {
    EngineValue::Scalar(if flag { 1.0 } else { 0.0 })
}

fn class_of(value: &EngineValue) -> &'static str {
    match value {
        EngineValue::Text(_) => "char",
        EngineValue::Sequence(items) if items.iter().any(|i| matches!(i, EngineValue::Text(_))) => {
            "cell"
        }
        _ => "double",
    }
}

fn size_of(value: &EngineValue) -> Vec<f64> {
    match value {
        EngineValue::Absent => vec![0.0, 0.0],
        EngineValue::Scalar(_) => vec![1.0, 1.0],
        EngineValue::Text(s) => vec![1.0, s.chars().count() as f64],
        EngineValue::Sequence(items) => match value.rows() {
            Some(rows) if rows.len() > 1 => {
                vec![rows.len() as f64, rows.first().map(Vec::len).unwrap_or(0) as f64]
            }
            _ => vec![1.0, items.len() as f64],
        },
    }
}

fn plot_type(command: &str) -> &'static str {
    match command {
        "plot" | "plot3" | "semilogx" | "semilogy" | "loglog" | "line" => "line",
        "scatter" | "scatter3" => "scatter",
        "bar" | "barh" => "bar",
        "surf" | "mesh" => "surface",
        "contour" | "contourf" => "contour",
        "imagesc" | "image" => "image",
        "fill" | "patch" | "pie" => "patch",
        "errorbar" => "errorbar",
        "stem" => "stem",
        "stairs" => "stair",
        "area" => "area",
        "quiver" => "quiver",
        "histogram" => "histogram",
        _ => "line",
    }
}

fn is_no_op(stmt: &str) -> bool {
    let word = stmt
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or("");
    NO_OPS.contains(&word)
}

/// Split code into statements on `;`, `,` and newlines outside quotes and brackets.
/// `%` starts a comment that runs to the end of the line.
fn split_statements(code: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut in_comment = false;
    let mut depth: i32 = 0;

    for c in code.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                statements.push(std::mem::take(&mut current));
            }
            continue;
        }
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '%' if !in_quote => in_comment = true,
            '(' | '[' | '{' if !in_quote => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' if !in_quote => {
                depth -= 1;
                current.push(c);
            }
            ';' | ',' | '\n' if !in_quote && depth <= 0 => {
                statements.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    statements.push(current);

    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// All single-quoted arguments, with `''` unescaped
fn quoted_args(args: &str) -> Vec<String> {
    QUOTED
        .captures_iter(args)
        .map(|caps| caps[1].replace("''", "'"))
        .collect()
}

/// `(id, message)` from `error`/`warning` arguments
fn message_from_args(args: &[String]) -> (String, String) {
    match args {
        [id, message, ..] if looks_like_id(id) => (id.clone(), unescape_format(message)),
        [message, ..] => (String::new(), unescape_format(message)),
        [] => (String::new(), "Unspecified error".to_string()),
    }
}

fn looks_like_id(text: &str) -> bool {
    text.contains(':') && !text.contains(char::is_whitespace)
}

fn unescape_format(text: &str) -> String {
    text.replace("''", "'")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("%%", "%")
}

fn parse_number(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" | "nan" => Some(f64::NAN),
        "Inf" | "inf" => Some(f64::INFINITY),
        "-Inf" | "-inf" => Some(f64::NEG_INFINITY),
        "pi" => Some(std::f64::consts::PI),
        other => other.parse::<f64>().ok(),
    }
}

fn parse_literal(expr: &str) -> Option<EngineValue> {
    if let Some(x) = parse_number(expr) {
        return Some(EngineValue::Scalar(x));
    }
    if expr.starts_with('\'') && expr.ends_with('\'') && expr.len() >= 2 {
        return Some(EngineValue::Text(expr[1..expr.len() - 1].replace("''", "'")));
    }
    if let Some(caps) = DIVISION.captures(expr) {
        let (a, b) = (parse_number(&caps[1])?, parse_number(&caps[2])?);
        return Some(EngineValue::Scalar(a / b));
    }
    if let Some(caps) = RANGE.captures(expr) {
        let start = parse_number(&caps[1])?;
        let step = caps.get(2).map(|m| parse_number(m.as_str())).unwrap_or(Some(1.0))?;
        let stop = parse_number(&caps[3])?;
        if step == 0.0 {
            return Some(EngineValue::Absent);
        }
        let count = ((stop - start) / step).floor();
        if count < 0.0 {
            return Some(EngineValue::Absent);
        }
        let values: Vec<f64> = (0..=count as usize).map(|i| start + step * i as f64).collect();
        return Some(EngineValue::from(values));
    }
    if expr.starts_with('[') && expr.ends_with(']') {
        let body = &expr[1..expr.len() - 1];
        if body.trim().is_empty() {
            return Some(EngineValue::Absent);
        }
        let rows: Option<Vec<Vec<f64>>> = body
            .split(';')
            .map(|row| {
                row.split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|t| !t.is_empty())
                    .map(parse_number)
                    .collect()
            })
            .collect();
        let rows = rows?;
        return Some(if rows.len() == 1 {
            EngineValue::from(rows.into_iter().next().unwrap_or_default())
        } else {
            EngineValue::Sequence(rows.into_iter().map(EngineValue::from).collect())
        });
    }
    None
}

/// Write an empty file at the path argument of an export command
fn export_placeholder(stmt: &str) -> Result<(), String> {
    let path = quoted_args(stmt)
        .into_iter()
        .find(|arg| !arg.starts_with('-') && arg.contains('.'))
        .ok_or_else(|| "Export target file name is missing.".to_string())?;
    fs::write(&path, b"mock figure export")
        .map_err(|e| format!("Cannot create output file '{}': {}", path, e))
}

// ============================================================================
// ENGINE IMPLEMENTATION
// ============================================================================

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn version(&mut self) -> Result<String, EngineError> {
        Ok(MOCK_VERSION.to_string())
    }

    async fn eval(&mut self, code: &str, capture: bool) -> Result<EvalOutput, EngineError> {
        let mut state = self.state.lock();
        state.calls.push("eval".to_string());
        state.evaluated.push(code.to_string());
        if let Some(message) = state.eval_failure.take() {
            return Err(EngineError::Host(message));
        }

        match state.run(code) {
            Ok(output) if capture => Ok(output),
            Ok(_) => Ok(EvalOutput::default()),
            Err(EngineError::Execution { message, output }) => Err(EngineError::Execution {
                message,
                output: if capture { output } else { EvalOutput::default() },
            }),
            Err(other) => Err(other),
        }
    }

    async fn eval_expression(&mut self, expr: &str) -> Result<EngineValue, EngineError> {
        self.record(format!("eval_expression({})", expr));
        self.state.lock().query(expr).map_err(EngineError::execution)
    }

    async fn get_variable(&mut self, name: &str) -> Result<EngineValue, EngineError> {
        self.record(format!("get_variable({})", name));
        let state = self.state.lock();
        state.variable(name).cloned().map_err(EngineError::execution)
    }

    async fn clear_variables(&mut self, names: Option<&[String]>) -> Result<(), EngineError> {
        self.record("clear_variables".to_string());
        self.state.lock().clear(names.unwrap_or(&[]));
        Ok(())
    }

    async fn get_property(
        &mut self,
        handle: Handle,
        property: &str,
    ) -> Result<EngineValue, EngineError> {
        self.record(format!("get_property({}, {})", handle, property));
        let state = self.state.lock();
        if state.failing_properties.contains(property) {
            return Err(EngineError::host(format!(
                "simulated failure reading '{}'",
                property
            )));
        }
        state.property(handle, property).map_err(EngineError::execution)
    }

    async fn set_property(
        &mut self,
        handle: Handle,
        property: &str,
        value: EngineValue,
    ) -> Result<(), EngineError> {
        self.record(format!("set_property({}, {})", handle, property));
        let mut state = self.state.lock();
        if let Some(budget) = state.set_budget.as_mut() {
            if *budget == 0 {
                return Err(EngineError::host("simulated failure writing property"));
            }
            *budget -= 1;
        }
        let object = state
            .objects
            .get_mut(&handle)
            .ok_or_else(|| EngineError::execution("Invalid or deleted object."))?;
        match property {
            "Position" => {
                let position = value
                    .scalars()
                    .filter(|p| p.len() == 4)
                    .ok_or_else(|| EngineError::execution("Value must be a 4-element vector."))?;
                object.position = Some(position);
                Ok(())
            }
            other => Err(EngineError::execution(format!(
                "Unrecognized property '{}'.",
                other
            ))),
        }
    }

    async fn last_warning(&mut self) -> Result<LastWarning, EngineError> {
        self.record("last_warning".to_string());
        Ok(self.state.lock().last_warning.clone())
    }

    async fn clear_last_warning(&mut self) -> Result<(), EngineError> {
        self.record("clear_last_warning".to_string());
        self.state.lock().last_warning = LastWarning::default();
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), EngineError> {
        self.record("quit".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements_respects_quotes_and_brackets() {
        let stmts = split_statements("x = [1, 2; 3, 4]; disp('a, b; c')\nplot(x, x) % trailing, comment\n");
        assert_eq!(stmts, vec!["x = [1, 2; 3, 4]", "disp('a, b; c')", "plot(x, x)"]);
    }

    #[tokio::test]
    async fn test_plot_creates_figure_axes_and_line() {
        let mut engine = MockEngine::new();
        engine.eval("figure; plot(1:10)", true).await.unwrap();

        let figures = engine.figures();
        assert_eq!(figures, vec![Handle::from(1)]);

        let axes = engine.get_property(figures[0], "Children").await.unwrap();
        let axes = axes.handles().unwrap();
        assert_eq!(axes.len(), 1);
        assert_eq!(
            engine.get_property(axes[0], "Type").await.unwrap().as_str(),
            Some("axes")
        );
        let lines = engine.get_property(axes[0], "Children").await.unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn test_hold_keeps_previous_children() {
        let mut engine = MockEngine::new();
        engine
            .eval("plot(1:3); plot(1:4)", true)
            .await
            .unwrap();
        engine.eval("hold on; scatter(1, 2)", true).await.unwrap();

        let fig = engine.figures()[0];
        let axes = engine.get_property(fig, "Children").await.unwrap().handles().unwrap();
        let children = engine.get_property(axes[0], "Children").await.unwrap();
        assert_eq!(children.len(), 2);
    }

    #[tokio::test]
    async fn test_error_keeps_prior_output() {
        let mut engine = MockEngine::new();
        let err = engine
            .eval("disp('before'); error('Custom:boom', 'it broke'); disp('after')", true)
            .await
            .unwrap_err();

        match err {
            EngineError::Execution { message, output } => {
                assert_eq!(message, "it broke");
                assert_eq!(output.stdout, "before\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_warning_sets_last_warning() {
        let mut engine = MockEngine::new();
        let out = engine
            .eval("warning('MATLAB:singularMatrix', 'Matrix is singular to working precision.')", true)
            .await
            .unwrap();
        assert!(out.stderr.contains("Matrix is singular"));

        let warning = engine.last_warning().await.unwrap();
        assert_eq!(warning.id, "MATLAB:singularMatrix");

        engine.clear_last_warning().await.unwrap();
        assert!(!engine.last_warning().await.unwrap().is_set());
    }

    #[tokio::test]
    async fn test_uncaptured_output_is_discarded() {
        let mut engine = MockEngine::new();
        let out = engine.eval("disp('hidden')", false).await.unwrap();
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_assignments_and_queries() {
        let mut engine = MockEngine::new();
        engine
            .eval("a = [1 2; 3 4]; b = 'text'; c = 0/0; d = 1:5; e = []", true)
            .await
            .unwrap();

        let size = engine.eval_expression("size(a)").await.unwrap();
        assert_eq!(size.scalars().unwrap(), vec![2.0, 2.0]);
        assert_eq!(
            engine.eval_expression("class(b)").await.unwrap().as_str(),
            Some("char")
        );
        assert!(engine.eval_expression("any(isnan(c(:)))").await.unwrap().is_truthy());
        assert!(engine.eval_expression("isempty(e)").await.unwrap().is_truthy());
        assert!(engine.eval_expression("exist('d', 'var')").await.unwrap().is_truthy());
        assert!(!engine.eval_expression("exist('zz', 'var')").await.unwrap().is_truthy());
        assert_eq!(engine.eval_expression("who()").await.unwrap().texts().len(), 5);
    }

    #[tokio::test]
    async fn test_close_all_removes_figures() {
        let mut engine = MockEngine::new();
        engine.eval("figure; figure; plot(1)", true).await.unwrap();
        assert_eq!(engine.figures().len(), 2);
        engine.eval("close all", true).await.unwrap();
        assert!(engine.figures().is_empty());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let mut engine = MockEngine::new();
        engine.eval("figure", true).await.unwrap();
        let fig = engine.figures()[0];

        engine.fail_positioning_after(1);
        let pos = EngineValue::from(vec![1.0, 2.0, 3.0, 4.0]);
        engine.set_property(fig, "Position", pos.clone()).await.unwrap();
        assert!(engine.set_property(fig, "Position", pos).await.is_err());

        engine.fail_property("Children");
        assert!(matches!(
            engine.get_property(Handle::ROOT, "Children").await,
            Err(EngineError::Host(_))
        ));

        engine.fail_next_eval("pipe closed");
        assert!(matches!(engine.eval("x = 1", true).await, Err(EngineError::Host(_))));
        assert!(engine.eval("x = 1", true).await.is_ok());
    }

    #[tokio::test]
    async fn test_monitor_positions_shape() {
        let mut single = MockEngine::new().with_screen(1280.0, 800.0);
        let value = single.get_property(Handle::ROOT, "MonitorPositions").await.unwrap();
        assert_eq!(value.rows().unwrap(), vec![vec![1.0, 1.0, 1280.0, 800.0]]);

        let mut dual = MockEngine::new().with_monitors(vec![
            [1.0, 1.0, 1920.0, 1080.0],
            [1921.0, 1.0, 1280.0, 1024.0],
        ]);
        let value = dual.get_property(Handle::ROOT, "MonitorPositions").await.unwrap();
        assert_eq!(value.rows().unwrap().len(), 2);
    }
}
