use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Severity of a captured record.
///
/// Ordered from least to most severe so it can be compared against a
/// minimum threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Display category understood by the browser console.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Trace | Severity::Debug => "",
            Severity::Info => "info",
            Severity::Warning => "warn",
            Severity::Error | Severity::Critical => "error",
        }
    }

    /// Parse a level name, case-insensitively. Returns `None` for names
    /// outside the known set.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" | "notset" => Some(Severity::Trace),
            "debug" => Some(Severity::Debug),
            "info" => Some(Severity::Info),
            "warn" | "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            "critical" | "fatal" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Label for a level given by name; unknown names get the plain label.
pub fn label_for_name(name: &str) -> &'static str {
    Severity::from_name(name).map(Severity::label).unwrap_or("")
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Severity::Trace,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A single value inside a formatted entry: either a literal slice of the
/// template or one of the log arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Str(String),
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    I128(i128),
    U128(u128),
    /// Already-structured JSON, e.g. a keyword-argument mapping.
    Json(Value),
    /// Debug representation of a value with no JSON form.
    Debug(String),
}

impl LogValue {
    pub fn debug(value: &dyn fmt::Debug) -> Self {
        LogValue::Debug(format!("{:?}", value))
    }

    /// JSON form of the value, falling back to its debug representation
    /// when JSON cannot represent it.
    pub fn to_json(&self) -> Value {
        match self {
            LogValue::Str(s) | LogValue::Debug(s) => Value::String(s.clone()),
            LogValue::Bool(b) => Value::Bool(*b),
            LogValue::I64(n) => Value::from(*n),
            LogValue::U64(n) => Value::from(*n),
            LogValue::F64(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(format!("{:?}", f))),
            LogValue::I128(n) => i64::try_from(*n)
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(n.to_string())),
            LogValue::U128(n) => u64::try_from(*n)
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(n.to_string())),
            LogValue::Json(v) => v.clone(),
        }
    }
}

impl Serialize for LogValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LogValue::Str(s) | LogValue::Debug(s) => serializer.serialize_str(s),
            LogValue::Bool(b) => serializer.serialize_bool(*b),
            LogValue::I64(n) => serializer.serialize_i64(*n),
            LogValue::U64(n) => serializer.serialize_u64(*n),
            LogValue::Json(v) => v.serialize(serializer),
            other => other.to_json().serialize(serializer),
        }
    }
}

impl From<&str> for LogValue {
    fn from(s: &str) -> Self {
        LogValue::Str(s.to_string())
    }
}

impl From<String> for LogValue {
    fn from(s: String) -> Self {
        LogValue::Str(s)
    }
}

impl From<bool> for LogValue {
    fn from(b: bool) -> Self {
        LogValue::Bool(b)
    }
}

impl From<i64> for LogValue {
    fn from(n: i64) -> Self {
        LogValue::I64(n)
    }
}

impl From<u64> for LogValue {
    fn from(n: u64) -> Self {
        LogValue::U64(n)
    }
}

impl From<f64> for LogValue {
    fn from(f: f64) -> Self {
        LogValue::F64(f)
    }
}

impl From<Value> for LogValue {
    fn from(v: Value) -> Self {
        LogValue::Json(v)
    }
}

/// Arguments accompanying a message template.
#[derive(Debug, Clone, PartialEq)]
pub enum LogArgs {
    Positional(Vec<LogValue>),
    /// Named arguments. Treated as one opaque value, never spread.
    Mapping(Vec<(String, LogValue)>),
}

impl LogArgs {
    pub fn none() -> Self {
        LogArgs::Positional(Vec::new())
    }

    /// Flatten into the queue consumed by the formatter.
    pub fn into_queue(self) -> Vec<LogValue> {
        match self {
            LogArgs::Positional(values) => values,
            LogArgs::Mapping(pairs) => vec![mapping_value(pairs)],
        }
    }
}

impl Default for LogArgs {
    fn default() -> Self {
        LogArgs::none()
    }
}

/// Collapse named pairs into a single JSON object value.
pub fn mapping_value(pairs: Vec<(String, LogValue)>) -> LogValue {
    let map: Map<String, Value> = pairs
        .into_iter()
        .map(|(name, value)| (name, value.to_json()))
        .collect();
    LogValue::Json(Value::Object(map))
}

/// Template interleaved with its arguments.
pub type FormattedEntry = Vec<LogValue>;

/// One captured record as it appears on the wire:
/// `[log_entry, backtrace_or_null, type_label]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub entry: FormattedEntry,
    pub backtrace: Option<String>,
    pub label: &'static str,
}

impl Serialize for LogRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.entry)?;
        seq.serialize_element(&self.backtrace)?;
        seq.serialize_element(self.label)?;
        seq.end()
    }
}
