use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::scope::Scope;

/// Read access to the scoped admin configuration tree.
///
/// A missing value is reported as [`ErrorKind::NotFound`](crate::ErrorKind::NotFound).
pub trait ConfigGetter: Send + Sync {
    /// String at `path`.
    fn string(&self, scope: Scope, path: &str) -> Result<String>;

    /// Bool at `path`.
    fn bool(&self, scope: Scope, path: &str) -> Result<bool>;

    /// Duration at `path`.
    fn duration(&self, scope: Scope, path: &str) -> Result<Duration>;
}

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Bool(bool),
    Duration(Duration),
}

/// In-memory configuration tree.
///
/// Website lookups fall back to the default scope when the website has no
/// value of its own.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: RwLock<HashMap<(Scope, String), Value>>,
}

impl MemoryConfig {
    /// Empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, scope: Scope, path: &str, value: Value) {
        self.values.write().insert((scope, path.to_owned()), value);
    }

    /// Store a string.
    pub fn set_string(&self, scope: Scope, path: &str, value: impl Into<String>) {
        self.put(scope, path, Value::String(value.into()));
    }

    /// Store a bool.
    pub fn set_bool(&self, scope: Scope, path: &str, value: bool) {
        self.put(scope, path, Value::Bool(value));
    }

    /// Store a duration.
    pub fn set_duration(&self, scope: Scope, path: &str, value: Duration) {
        self.put(scope, path, Value::Duration(value));
    }

    fn lookup(&self, scope: Scope, path: &str) -> Result<Value> {
        let values = self.values.read();
        let mut at = scope;
        loop {
            if let Some(v) = values.get(&(at, path.to_owned())) {
                return Ok(v.clone());
            }
            at = match at {
                Scope::Website(_) => Scope::Default,
                _ => return Err(Error::not_found(format!("{path} in {scope}"))),
            };
        }
    }
}

fn mismatch(path: &str, want: &str) -> Error {
    Error::not_valid(format!("{path} (expected {want})"))
}

impl ConfigGetter for MemoryConfig {
    fn string(&self, scope: Scope, path: &str) -> Result<String> {
        match self.lookup(scope, path)? {
            Value::String(s) => Ok(s),
            _ => Err(mismatch(path, "string")),
        }
    }

    fn bool(&self, scope: Scope, path: &str) -> Result<bool> {
        match self.lookup(scope, path)? {
            Value::Bool(b) => Ok(b),
            _ => Err(mismatch(path, "bool")),
        }
    }

    fn duration(&self, scope: Scope, path: &str) -> Result<Duration> {
        match self.lookup(scope, path)? {
            Value::Duration(d) => Ok(d),
            _ => Err(mismatch(path, "duration")),
        }
    }
}
