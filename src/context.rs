//! Variable context that directives are evaluated against
//!
//! A [`Context`] maps names to [`Value`]s. Nested maps are flattened before a
//! run so that `@echo site.title` and `@if site.debug` can reach nested leaves
//! through ordinary dotted-key lookups.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

/// Key holding the path of the file currently being processed
pub const CURRENT_FILE: &str = "currentFile";

/// Key holding the directory of the file currently being processed
pub const CURRENT_DIR: &str = "currentDir";

/// Errors that can occur when loading a context from a file
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Failed to read context file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse context JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to parse context TOML: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("context root must be a table/object, found {found}")]
    NotAMap { found: String },
    #[error("invalid definition '{definition}': expected KEY=VALUE")]
    InvalidDefinition { definition: String },
}

type NativeFn = dyn Fn(&Context, &[Value]) -> Value + Send + Sync;

/// A native function callable from `@exec` directives and test expressions
///
/// The context of the running document is passed as the receiver.
#[derive(Clone)]
pub struct Function(Arc<NativeFn>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context, &[Value]) -> Value + Send + Sync + 'static,
    {
        Function(Arc::new(f))
    }

    pub fn call(&self, receiver: &Context, args: &[Value]) -> Value {
        (self.0)(receiver, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function(..)")
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A context value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Function(Function),
}

impl Value {
    /// JavaScript-style truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) | Value::Function(_) => true,
        }
    }

    /// Numeric coercion used by arithmetic and relational operators
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::List(items) if items.is_empty() => 0.0,
            Value::List(items) if items.len() == 1 => items[0].to_number(),
            Value::List(_) | Value::Map(_) | Value::Function(_) => f64::NAN,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Name of the value's type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
        }
    }
}

/// Format a number the way a script host would print it
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => Ok(()),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|v| match v {
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect();
                f.write_str(&parts.join(","))
            }
            Value::Map(_) => f.write_str("[object Object]"),
            Value::Function(_) => f.write_str("[function]"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<Context> for Value {
    fn from(ctx: Context) -> Self {
        Value::Map(ctx.entries)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i as f64),
            toml::Value::Float(f) => Value::Number(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(d) => Value::String(d.to_string()),
            toml::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            toml::Value::Table(table) => {
                Value::Map(table.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Named values and functions visible to directives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    entries: IndexMap<String, Value>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding every environment variable of the process
    pub fn from_env() -> Self {
        std::env::vars().collect()
    }

    /// Load a context from a JSON string; the root must be an object
    pub fn from_json_str(content: &str) -> Result<Self, ContextError> {
        let json: serde_json::Value = serde_json::from_str(content)?;
        Self::from_root(Value::from(json))
    }

    /// Load a context from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ContextError> {
        let table: toml::Table = toml::from_str(content)?;
        Self::from_root(Value::from(toml::Value::Table(table)))
    }

    /// Load a context file, choosing TOML for `.toml` and JSON otherwise
    pub fn from_file(path: &Path) -> Result<Self, ContextError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    fn from_root(root: Value) -> Result<Self, ContextError> {
        match root {
            Value::Map(entries) => Ok(Context { entries }),
            other => Err(ContextError::NotAMap {
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Parse a `KEY=VALUE` definition as given on the command line
    pub fn parse_definition(definition: &str) -> Result<(String, Value), ContextError> {
        match definition.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), Value::from(value)))
            }
            _ => Err(ContextError::InvalidDefinition {
                definition: definition.to_string(),
            }),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Register a native function under `name`
    pub fn insert_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Context, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Value::Function(Function::new(f)));
    }

    /// Builder-style [`Context::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Merge `other` into this context, overriding existing keys
    pub fn extend(&mut self, other: Context) {
        self.entries.extend(other.entries);
    }

    /// Look up a possibly dotted name
    ///
    /// A flat entry wins; otherwise nested maps and lists are walked segment by
    /// segment.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.entries.get(path) {
            return Some(value);
        }
        let mut segments = path.split('.');
        let mut current = self.entries.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Map(map) => map.get(segment)?,
                Value::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Produce the flat namespace used during a run
    ///
    /// Every entry is kept as-is, and every leaf below a map or list is also
    /// exposed under its joined dotted key. A literal key that collides with a
    /// synthesized one is overwritten by whichever comes later.
    pub fn flatten(&self) -> Context {
        let mut flat = IndexMap::with_capacity(self.entries.len());
        flatten_into(&mut flat, None, &self.entries);
        Context { entries: flat }
    }

    /// Shallow copy for processing `file`, with `currentFile`/`currentDir` set
    pub fn for_file(&self, file: &Path) -> Context {
        let mut derived = self.clone();
        derived.set_current_file(file);
        derived
    }

    pub fn set_current_file(&mut self, file: &Path) {
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        self.insert(CURRENT_FILE, file.display().to_string());
        self.insert(CURRENT_DIR, dir.display().to_string());
    }

    /// Directory that relative include paths resolve against
    pub fn current_dir(&self) -> &str {
        match self.entries.get(CURRENT_DIR) {
            Some(Value::String(dir)) => dir,
            _ => "",
        }
    }
}

fn flatten_into(out: &mut IndexMap<String, Value>, prefix: Option<&str>, map: &IndexMap<String, Value>) {
    for (key, value) in map {
        let full = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };
        out.insert(full.clone(), value.clone());
        match value {
            Value::Map(inner) => flatten_into(out, Some(&full), inner),
            Value::List(items) => {
                let indexed: IndexMap<String, Value> = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.clone()))
                    .collect();
                flatten_into(out, Some(&full), &indexed);
            }
            _ => {}
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Context {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
