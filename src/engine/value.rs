//! Engine boundary values
//!
//! MATLAB answers queries with whatever shape the data has: a scalar, a
//! char array, a (possibly nested) array, or nothing at all. Bindings convert
//! that into [`EngineValue`] exactly once so the rest of the crate never
//! branches on a dynamic type.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Graphics object identifier assigned by the engine.
///
/// Identity is the numeric value. Figures usually get small integers, while
/// axes and plot objects get arbitrary doubles, so the value is kept as `f64`
/// and compared by its total order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(f64);

impl Handle {
    /// The graphics root (`groot`, handle 0)
    pub const ROOT: Handle = Handle(0.0);

    pub fn new(value: f64) -> Self {
        // -0.0 and 0.0 are the same handle
        if value == 0.0 {
            Self(0.0)
        } else {
            Self(value)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<u32> for Handle {
    fn from(value: u32) -> Self {
        Self(f64::from(value))
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Handle {}

impl PartialOrd for Handle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Handle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // f64 Display is the shortest round-trip form, so fractional axes
        // handles survive being pasted back into MATLAB source
        write!(f, "{}", self.0)
    }
}

/// A value returned by (or sent to) the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum EngineValue {
    /// Empty result (`[]`, no output, missing variable)
    #[default]
    Absent,
    Scalar(f64),
    Text(String),
    Sequence(Vec<EngineValue>),
}

impl EngineValue {
    /// Convert a `jsonencode` payload into an engine value
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Absent,
            Value::Bool(b) => Self::Scalar(if b { 1.0 } else { 0.0 }),
            Value::Number(n) => n.as_f64().map(Self::Scalar).unwrap_or(Self::Absent),
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::Sequence(items.into_iter().map(Self::from_json).collect()),
            other @ Value::Object(_) => Self::Text(other.to_string()),
        }
    }

    pub fn is_absent(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Sequence(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Scalar(x) => Some(*x),
            Self::Sequence(items) if items.len() == 1 => items[0].as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Sequence(items) if items.len() == 1 => items[0].as_str(),
            _ => None,
        }
    }

    /// Truthiness of a logical answer (`exist`, `isempty`, `any(...)`)
    pub fn is_truthy(&self) -> bool {
        self.as_f64().map(|x| x != 0.0).unwrap_or(false)
    }

    /// All numbers in the value, flattened in order.
    ///
    /// Returns `None` if any element is text.
    pub fn scalars(&self) -> Option<Vec<f64>> {
        let mut out = Vec::new();
        self.collect_scalars(&mut out)?;
        Some(out)
    }

    fn collect_scalars(&self, out: &mut Vec<f64>) -> Option<()> {
        match self {
            Self::Absent => Some(()),
            Self::Scalar(x) => {
                out.push(*x);
                Some(())
            }
            Self::Text(_) => None,
            Self::Sequence(items) => items.iter().try_for_each(|item| item.collect_scalars(out)),
        }
    }

    /// Numeric matrix rows. A flat vector is a single row.
    pub fn rows(&self) -> Option<Vec<Vec<f64>>> {
        match self {
            Self::Absent => Some(vec![]),
            Self::Scalar(x) => Some(vec![vec![*x]]),
            Self::Text(_) => None,
            Self::Sequence(items) => {
                if items.iter().all(|item| matches!(item, Self::Sequence(_))) && !items.is_empty() {
                    items.iter().map(|row| row.scalars()).collect()
                } else {
                    self.scalars().map(|row| if row.is_empty() { vec![] } else { vec![row] })
                }
            }
        }
    }

    /// Text entries (a single char array or a cell array of them)
    pub fn texts(&self) -> Vec<String> {
        match self {
            Self::Absent | Self::Scalar(_) => vec![],
            Self::Text(s) => vec![s.clone()],
            Self::Sequence(items) => items.iter().flat_map(|item| item.texts()).collect(),
        }
    }

    /// Graphics handles contained in the value
    pub fn handles(&self) -> Option<Vec<Handle>> {
        self.scalars()
            .map(|xs| xs.into_iter().map(Handle::new).collect())
    }

    /// Number of top-level elements
    pub fn len(&self) -> usize {
        match self {
            Self::Absent => 0,
            Self::Scalar(_) | Self::Text(_) => 1,
            Self::Sequence(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the value as MATLAB source
    pub fn to_matlab_literal(&self) -> String {
        match self {
            Self::Absent => "[]".to_string(),
            Self::Scalar(x) => number_literal(*x),
            Self::Text(s) => quote(s),
            Self::Sequence(items) => {
                if items.iter().any(|item| matches!(item, Self::Text(_))) {
                    let cells: Vec<String> = items.iter().map(Self::to_matlab_literal).collect();
                    format!("{{{}}}", cells.join(", "))
                } else if !items.is_empty()
                    && items.iter().all(|item| matches!(item, Self::Sequence(_)))
                {
                    let rows: Vec<String> = items
                        .iter()
                        .map(|row| match row {
                            Self::Sequence(cols) => cols
                                .iter()
                                .map(Self::to_matlab_literal)
                                .collect::<Vec<_>>()
                                .join(", "),
                            other => other.to_matlab_literal(),
                        })
                        .collect();
                    format!("[{}]", rows.join("; "))
                } else {
                    let cols: Vec<String> = items.iter().map(Self::to_matlab_literal).collect();
                    format!("[{}]", cols.join(", "))
                }
            }
        }
    }
}

impl From<f64> for EngineValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for EngineValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<f64>> for EngineValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(values.into_iter().map(Self::Scalar).collect())
    }
}

impl fmt::Display for EngineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "[]"),
            Self::Scalar(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
            Self::Sequence(_) => write!(f, "{}", self.to_matlab_literal()),
        }
    }
}

/// Quote text as a MATLAB char literal
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn number_literal(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x.is_infinite() {
        let text = if x > 0.0 { "Inf" } else { "-Inf" };
        text.to_string()
    } else {
        x.to_string()
    }
}
