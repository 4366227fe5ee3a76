//! In-memory settings store whose entries can back patched call sites.
//!
//! A [`SettingHandle`] is a [`ValueSource`]: once a patch binds it into a method, every invocation
//! of that method reads the setting's value at that moment.

use crate::{Error, Result};
use ilweave_core::{Value, ValueSource, ValueType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How a setting is presented to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMeta {
    pub label: String,
    pub category: String,
}

impl DisplayMeta {
    pub fn new(label: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            category: category.into(),
        }
    }
}

struct Setting {
    key: String,
    meta: DisplayMeta,
    default: Value,
    value: RwLock<Value>,
}

/// Shared handle to one registered setting.
#[derive(Clone)]
pub struct SettingHandle {
    inner: Arc<Setting>,
}

impl SettingHandle {
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn meta(&self) -> &DisplayMeta {
        &self.inner.meta
    }

    pub fn default_value(&self) -> Value {
        self.inner.default
    }

    pub fn value_type(&self) -> ValueType {
        self.inner.default.value_type()
    }

    pub fn current_value(&self) -> Value {
        *self.inner.value.read()
    }

    /// Stores `value` and returns the previous one.
    ///
    /// # Errors
    /// `SettingTypeMismatch` if `value` is not of the setting's declared type.
    pub fn set(&self, value: Value) -> Result<Value> {
        if value.value_type() != self.value_type() {
            return Err(Error::SettingTypeMismatch {
                key: self.inner.key.clone(),
                expected: self.value_type(),
                found: value.value_type(),
            });
        }
        let previous = std::mem::replace(&mut *self.inner.value.write(), value);
        tracing::debug!("Setting '{}' changed {} -> {}", self.inner.key, previous, value);
        Ok(previous)
    }

    pub fn reset(&self) -> Value {
        std::mem::replace(&mut *self.inner.value.write(), self.inner.default)
    }
}

impl ValueSource for SettingHandle {
    fn name(&self) -> &str {
        &self.inner.key
    }

    fn value_type(&self) -> ValueType {
        SettingHandle::value_type(self)
    }

    fn current_value(&self) -> Value {
        SettingHandle::current_value(self)
    }
}

impl fmt::Debug for SettingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingHandle")
            .field("key", &self.inner.key)
            .field("meta", &self.inner.meta)
            .field("value", &self.current_value())
            .finish()
    }
}

/// Listing entry for one setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingInfo {
    pub key: String,
    #[serde(flatten)]
    pub meta: DisplayMeta,
    pub default: Value,
    pub current: Value,
}

/// Current values keyed by setting key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub values: BTreeMap<String, Value>,
}

impl SettingsSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Default)]
pub struct SettingsStore {
    settings: RwLock<BTreeMap<String, SettingHandle>>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the setting under `key`, registering it with `default` and `meta` first if needed.
    ///
    /// # Errors
    /// `SettingTypeMismatch` if `key` is already registered with a different type.
    pub fn get_or_register(
        &self,
        key: impl Into<String>,
        default: Value,
        meta: DisplayMeta,
    ) -> Result<SettingHandle> {
        let key = key.into();
        let mut settings = self.settings.write();
        if let Some(existing) = settings.get(&key) {
            if existing.value_type() != default.value_type() {
                return Err(Error::SettingTypeMismatch {
                    key,
                    expected: existing.value_type(),
                    found: default.value_type(),
                });
            }
            return Ok(existing.clone());
        }

        tracing::info!(
            "Registered setting '{}' ({}: {}) with default {}",
            key,
            meta.category,
            meta.label,
            default
        );
        let handle = SettingHandle {
            inner: Arc::new(Setting {
                key: key.clone(),
                meta,
                default,
                value: RwLock::new(default),
            }),
        };
        settings.insert(key, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, key: &str) -> Option<SettingHandle> {
        self.settings.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.settings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.read().is_empty()
    }

    /// Every setting, ordered by key.
    pub fn describe(&self) -> Vec<SettingInfo> {
        self.settings
            .read()
            .values()
            .map(|handle| SettingInfo {
                key: handle.key().to_string(),
                meta: handle.meta().clone(),
                default: handle.default_value(),
                current: handle.current_value(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            values: self
                .settings
                .read()
                .iter()
                .map(|(key, handle)| (key.clone(), handle.current_value()))
                .collect(),
        }
    }

    /// Writes every value of `snapshot` whose key is registered and returns how many were
    /// applied. Unknown keys are skipped with a warning.
    ///
    /// # Errors
    /// `SettingTypeMismatch` on the first value of the wrong type. Every value is checked before
    /// any is written, so a rejected snapshot changes nothing.
    pub fn apply_snapshot(&self, snapshot: &SettingsSnapshot) -> Result<usize> {
        let mut staged = Vec::with_capacity(snapshot.values.len());
        for (key, value) in &snapshot.values {
            let Some(handle) = self.get(key) else {
                tracing::warn!("Ignoring value for unknown setting '{}'", key);
                continue;
            };
            if value.value_type() != handle.value_type() {
                return Err(Error::SettingTypeMismatch {
                    key: key.clone(),
                    expected: handle.value_type(),
                    found: value.value_type(),
                });
            }
            staged.push((handle, *value));
        }

        for (handle, value) in &staged {
            handle.set(*value)?;
        }
        Ok(staged.len())
    }
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.settings.read().iter()).finish()
    }
}
