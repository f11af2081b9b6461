//! Durable preference storage: the value type plus in-memory and TOML-backed stores

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::PersistentKv;
use crate::error::{HostError, Result};

/// A preference value. Browser preferences are only ever one of these three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl PrefValue {
    /// Name of the stored type, for mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::String(_) => "string",
        }
    }

    fn to_toml(&self) -> toml::Value {
        match self {
            Self::Bool(b) => toml::Value::Boolean(*b),
            Self::Int(i) => toml::Value::Integer(*i),
            Self::String(s) => toml::Value::String(s.clone()),
        }
    }

    fn from_toml(key: &str, value: &toml::Value) -> Result<Self> {
        match value {
            toml::Value::Boolean(b) => Ok(Self::Bool(*b)),
            toml::Value::Integer(i) => Ok(Self::Int(*i)),
            toml::Value::String(s) => Ok(Self::String(s.clone())),
            other => Err(HostError::storage(format!(
                "preference {key} has unsupported type {}",
                other.type_str()
            ))),
        }
    }
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PrefValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Process-local preference store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryKv {
    values: RwLock<HashMap<String, PrefValue>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently set.
    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistentKv for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<PrefValue>> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: PrefValue) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn reset(&self, key: &str) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Preference store persisted to a TOML file.
///
/// Every `set`/`reset` writes the whole file before returning, so a value is
/// durable as soon as the call succeeds.
#[derive(Debug)]
pub struct TomlKv {
    path: PathBuf,
    values: Mutex<BTreeMap<String, toml::Value>>,
}

impl TomlKv {
    /// Open the store at `path`, loading existing values. A missing file is
    /// an empty store; it is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values: BTreeMap<String, toml::Value> = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content).map_err(|e| HostError::storage(e.to_string()))?
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = values.len(), "Opened preference store");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &BTreeMap<String, toml::Value>) -> Result<()> {
        let content = toml::to_string_pretty(values)
            .map_err(|e| HostError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl PersistentKv for TomlKv {
    fn get(&self, key: &str) -> Result<Option<PrefValue>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values
            .get(key)
            .map(|v| PrefValue::from_toml(key, v))
            .transpose()
    }

    // Both writers save a copy first; memory only changes once the file has.
    fn set(&self, key: &str, value: PrefValue) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_toml());
        self.save(&next)?;
        *values = next;
        Ok(())
    }

    fn reset(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.save(&next)?;
        *values = next;
        Ok(())
    }
}
