//! # Settings Registry
//!
//! Live, string-addressable plugin settings. Each module (plugin) registers
//! its settings struct once; the registry keeps it as a JSON object so the
//! host can list and change individual values at runtime without knowing
//! the concrete Rust type.
//!
//! Module and setting names are matched case-insensitively. Every change bumps
//! a per-module revision so consumers can cache the deserialized struct and
//! only re-read it when something changed.
//!
//! ```rust
//! use stackcraft_events::SettingsRegistry;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize, PartialEq)]
//! struct Greeter { enabled: bool, radius: f64 }
//!
//! let registry = SettingsRegistry::new();
//! registry.register("Greeter", &Greeter { enabled: true, radius: 3.0 })?;
//! registry.set("greeter", "Radius", "4.5")?;
//! let current: Greeter = registry.get("Greeter")?;
//! assert_eq!(current.radius, 4.5);
//! # Ok::<(), stackcraft_events::SettingsError>(())
//! ```

use compact_str::CompactString;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct ModuleSettings {
    /// Name as first registered, for display
    display_name: String,
    values: Map<String, Value>,
    revision: u64,
}

/// Registry of per-module settings objects.
#[derive(Debug, Default)]
pub struct SettingsRegistry {
    modules: DashMap<CompactString, ModuleSettings>,
}

fn module_key(module: &str) -> CompactString {
    CompactString::new(module.to_ascii_lowercase())
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module with its default settings.
    ///
    /// Values already present for the module (for example seeded from the
    /// configuration file) win over the defaults; only missing keys are
    /// filled in.
    pub fn register<T: Serialize>(&self, module: &str, defaults: &T) -> Result<(), SettingsError> {
        let defaults = to_object(module, defaults)?;
        let mut entry = self
            .modules
            .entry(module_key(module))
            .or_insert_with(|| ModuleSettings {
                display_name: module.to_string(),
                values: Map::new(),
                revision: 0,
            });
        let mut added = 0;
        for (key, value) in defaults {
            if !entry.values.contains_key(&key) {
                entry.values.insert(key, value);
                added += 1;
            }
        }
        if added > 0 {
            entry.revision += 1;
        }
        info!("⚙️ Registered settings module '{}' ({} defaults applied)", module, added);
        Ok(())
    }

    /// Replaces stored values of a module with the given ones, creating the
    /// module if needed. Keys not present in `values` are kept.
    pub fn seed<T: Serialize>(&self, module: &str, values: &T) -> Result<(), SettingsError> {
        let values = to_object(module, values)?;
        let mut entry = self
            .modules
            .entry(module_key(module))
            .or_insert_with(|| ModuleSettings {
                display_name: module.to_string(),
                values: Map::new(),
                revision: 0,
            });
        entry.values.extend(values);
        entry.revision += 1;
        debug!("⚙️ Seeded settings module '{}'", module);
        Ok(())
    }

    /// Deserializes the current settings of a module.
    pub fn get<T: DeserializeOwned>(&self, module: &str) -> Result<T, SettingsError> {
        let entry = self
            .modules
            .get(&module_key(module))
            .ok_or_else(|| SettingsError::UnknownModule(module.to_string()))?;
        serde_json::from_value(Value::Object(entry.values.clone())).map_err(|source| SettingsError::Serde {
            module: module.to_string(),
            source,
        })
    }

    /// Returns the current settings, registering `default` first if the
    /// module is unknown.
    pub fn get_or_register<T>(&self, module: &str, default: &T) -> Result<T, SettingsError>
    where
        T: Serialize + DeserializeOwned,
    {
        if !self.modules.contains_key(&module_key(module)) {
            self.register(module, default)?;
        }
        self.get(module)
    }

    /// Changes one setting from its textual form.
    ///
    /// The raw string is cast to the type of the value currently stored:
    /// numbers keep their kind (unsigned, signed or float), booleans accept `true`/`1`
    /// (anything else is false), strings are taken as-is. A currently unset
    /// (`null`) value accepts `none`/`null` to stay unset, otherwise a number,
    /// a boolean or a string in that order.
    pub fn set(&self, module: &str, key: &str, raw: &str) -> Result<Value, SettingsError> {
        let mut entry = self
            .modules
            .get_mut(&module_key(module))
            .ok_or_else(|| SettingsError::UnknownModule(module.to_string()))?;

        let stored_key = entry
            .values
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned()
            .ok_or_else(|| SettingsError::UnknownSetting {
                module: module.to_string(),
                key: key.to_string(),
            })?;

        let current = entry.values.get(&stored_key).cloned().unwrap_or(Value::Null);
        let value = cast_value(&current, raw).ok_or_else(|| SettingsError::InvalidValue {
            key: stored_key.clone(),
            value: raw.to_string(),
        })?;

        entry.values.insert(stored_key.clone(), value.clone());
        entry.revision += 1;
        info!("⚙️ {}.{} = {}", entry.display_name, stored_key, value);
        Ok(value)
    }

    /// Current key/value pairs of a module, sorted by key.
    pub fn describe(&self, module: &str) -> Result<Vec<(String, Value)>, SettingsError> {
        let entry = self
            .modules
            .get(&module_key(module))
            .ok_or_else(|| SettingsError::UnknownModule(module.to_string()))?;
        let mut pairs: Vec<_> = entry.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    /// Display names of all registered modules, sorted.
    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<_> = self.modules.iter().map(|e| e.display_name.clone()).collect();
        names.sort();
        names
    }

    /// Revision counter of a module; 0 when the module is unknown.
    pub fn revision(&self, module: &str) -> u64 {
        self.modules
            .get(&module_key(module))
            .map(|e| e.revision)
            .unwrap_or(0)
    }
}

fn to_object<T: Serialize>(module: &str, value: &T) -> Result<Map<String, Value>, SettingsError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SettingsError::NotAnObject(module.to_string())),
        Err(source) => Err(SettingsError::Serde {
            module: module.to_string(),
            source,
        }),
    }
}

fn cast_value(current: &Value, raw: &str) -> Option<Value> {
    let raw = raw.trim();
    match current {
        Value::Bool(_) => Some(Value::Bool(raw.eq_ignore_ascii_case("true") || raw == "1")),
        Value::Number(n) if n.is_u64() => raw.parse::<u64>().ok().map(Value::from),
        Value::Number(n) if n.is_i64() => raw.parse::<i64>().ok().map(Value::from),
        Value::Number(_) => raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number),
        Value::String(_) => Some(Value::String(raw.to_string())),
        Value::Null => {
            if raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("null") {
                Some(Value::Null)
            } else if let Some(number) = parse_number(raw) {
                Some(number)
            } else if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
                Some(Value::Bool(raw.eq_ignore_ascii_case("true")))
            } else {
                Some(Value::String(raw.to_string()))
            }
        }
        Value::Array(_) | Value::Object(_) => serde_json::from_str(raw).ok(),
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

/// Errors raised by the settings registry.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Unknown settings module: {0}")]
    UnknownModule(String),
    #[error("Unknown setting '{key}' in module {module}")]
    UnknownSetting { module: String, key: String },
    #[error("Invalid value '{value}' for setting '{key}'")]
    InvalidValue { key: String, value: String },
    #[error("Settings of module {0} must serialize to an object")]
    NotAnObject(String),
    #[error("Settings of module {module} do not match their type: {source}")]
    Serde {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}
