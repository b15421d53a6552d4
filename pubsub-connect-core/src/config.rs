//! Configuration management for connectors.
//!
//! Two layers:
//! - [`RawConfig`]: the flat string-keyed property map a connector is started with, loaded
//!   from a TOML file and/or environment variables.
//! - [`ConfigDef`]: the declared schema (type, default, importance, validator per key) that
//!   turns a raw map into a typed [`ParsedConfig`], reporting every violation in one pass.

use crate::{ConfigViolation, ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Declared value type of a configuration key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    String,
    Int,
}

impl ConfigType {
    fn parse(&self, raw: &str) -> Result<ConfigValue, String> {
        let trimmed = raw.trim();
        match self {
            ConfigType::String => Ok(ConfigValue::String(trimmed.to_string())),
            ConfigType::Int => trimmed
                .parse::<i32>()
                .map(ConfigValue::Int)
                .map_err(|_| format!("expected a 32-bit integer, got '{}'", trimmed)),
        }
    }
}

/// Importance tier of a key, informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Importance::High => f.write_str("high"),
            Importance::Medium => f.write_str("medium"),
            Importance::Low => f.write_str("low"),
        }
    }
}

/// A typed configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    String(String),
    Int(i32),
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => f.write_str(s),
            ConfigValue::Int(i) => write!(f, "{}", i),
        }
    }
}

/// What happens when a key is absent from the raw map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDefault {
    /// Absent key is a violation
    Required,
    /// Absent key stays absent
    Unset,
    /// Absent key takes this value
    Value(ConfigValue),
}

/// Value constraint checked after type conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// Inclusive integer range
    Range { min: i64, max: i64 },
    /// Closed set of accepted strings
    OneOf(&'static [&'static str]),
    /// String must not be blank
    NonEmpty,
}

impl Validator {
    pub fn range(min: i64, max: i64) -> Self {
        Validator::Range { min, max }
    }

    fn ensure_valid(&self, value: &ConfigValue) -> Result<(), String> {
        match (self, value) {
            (Validator::Range { min, max }, ConfigValue::Int(v)) => {
                let v = i64::from(*v);
                if v < *min {
                    Err(format!("value {} must be at least {}", v, min))
                } else if v > *max {
                    Err(format!("value {} must be no more than {}", v, max))
                } else {
                    Ok(())
                }
            }
            (Validator::OneOf(allowed), ConfigValue::String(s)) => {
                if allowed.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(format!(
                        "invalid value '{}', valid values are [{}]",
                        s,
                        allowed.join(", ")
                    ))
                }
            }
            (Validator::NonEmpty, ConfigValue::String(s)) => {
                if s.is_empty() {
                    Err("must not be empty".to_string())
                } else {
                    Ok(())
                }
            }
            (validator, value) => Err(format!(
                "validator {:?} does not apply to value '{}'",
                validator, value
            )),
        }
    }
}

/// Declaration of one recognized configuration key
#[derive(Debug, Clone)]
pub struct ConfigKey {
    pub name: &'static str,
    pub config_type: ConfigType,
    pub default: KeyDefault,
    pub validator: Option<Validator>,
    pub importance: Importance,
    pub documentation: &'static str,
}

impl ConfigKey {
    /// Declare an optional string key
    pub fn string(name: &'static str, importance: Importance, documentation: &'static str) -> Self {
        Self::new(name, ConfigType::String, importance, documentation)
    }

    /// Declare an optional integer key
    pub fn int(name: &'static str, importance: Importance, documentation: &'static str) -> Self {
        Self::new(name, ConfigType::Int, importance, documentation)
    }

    fn new(
        name: &'static str,
        config_type: ConfigType,
        importance: Importance,
        documentation: &'static str,
    ) -> Self {
        Self {
            name,
            config_type,
            default: KeyDefault::Unset,
            validator: None,
            importance,
            documentation,
        }
    }

    /// Mark the key as required with no default value
    pub fn required(mut self) -> Self {
        self.default = KeyDefault::Required;
        self
    }

    /// Set the default value used when the key is absent
    pub fn with_default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = KeyDefault::Value(value.into());
        self
    }

    /// Attach a validator
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn resolve(&self, raw: Option<&String>) -> Result<Option<ConfigValue>, String> {
        let value = match (raw, &self.default) {
            (Some(text), _) => self.config_type.parse(text)?,
            (None, KeyDefault::Required) => {
                return Err("missing required configuration with no default value".to_string())
            }
            (None, KeyDefault::Unset) => return Ok(None),
            (None, KeyDefault::Value(default)) => default.clone(),
        };

        if let Some(validator) = &self.validator {
            validator.ensure_valid(&value)?;
        }
        Ok(Some(value))
    }
}

/// The schema of every configuration key a connector recognizes
#[derive(Debug, Clone, Default)]
pub struct ConfigDef {
    keys: Vec<ConfigKey>,
}

impl ConfigDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key declaration. Later declarations of the same name replace earlier ones.
    pub fn define(mut self, key: ConfigKey) -> Self {
        self.keys.retain(|k| k.name != key.name);
        self.keys.push(key);
        self
    }

    /// Declared keys, in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &ConfigKey> {
        self.keys.iter()
    }

    /// Look up a key declaration by name
    pub fn key(&self, name: &str) -> Option<&ConfigKey> {
        self.keys.iter().find(|k| k.name == name)
    }

    /// Convert and validate a raw property map.
    ///
    /// Every declared key is checked; all violations are returned together in declaration
    /// order. Undeclared keys are ignored.
    pub fn parse(&self, raw: &HashMap<String, String>) -> ConnectorResult<ParsedConfig> {
        let mut values = HashMap::new();
        let mut violations = Vec::new();

        for key in &self.keys {
            match key.resolve(raw.get(key.name)) {
                Ok(Some(value)) => {
                    values.insert(key.name, value);
                }
                Ok(None) => {}
                Err(reason) => violations.push(ConfigViolation::new(key.name, reason)),
            }
        }

        if violations.is_empty() {
            Ok(ParsedConfig { values })
        } else {
            Err(ConnectorError::invalid_config(violations))
        }
    }
}

/// Typed, validated values produced by [`ConfigDef::parse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    values: HashMap<&'static str, ConfigValue>,
}

impl ParsedConfig {
    /// String value of `name`, if present
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ConfigValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer value of `name`, if present
    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.values.get(name) {
            Some(ConfigValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// String value of a key that parsing guarantees to be present
    pub fn require_string(&self, name: &str) -> ConnectorResult<String> {
        self.get_string(name)
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::config(format!("{} has no string value", name)))
    }

    /// Integer value of a key that parsing guarantees to be present
    pub fn require_int(&self, name: &str) -> ConnectorResult<i32> {
        self.get_int(name)
            .ok_or_else(|| ConnectorError::config(format!("{} has no integer value", name)))
    }
}

/// Flat string-keyed properties a connector is started with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConfig {
    props: HashMap<String, String>,
}

impl RawConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.props.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.props.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(|s| s.as_str())
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.props
    }

    /// Load properties from a TOML file
    ///
    /// Nested tables are flattened with `.` so `kafka.topic = "events"` and a `[kafka]` table
    /// holding `topic = "events"` are equivalent.
    pub fn from_file(path: &str) -> ConnectorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConnectorError::Config(msg) => {
                ConnectorError::config(format!("Failed to parse config file {}: {}", path, msg))
            }
            other => other,
        })
    }

    /// Parse properties from TOML text
    pub fn from_toml_str(content: &str) -> ConnectorResult<Self> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConnectorError::config(e.to_string()))?;

        let mut config = Self::new();
        flatten_table(None, &table, &mut config)?;
        Ok(config)
    }

    /// Override every declared key found through `lookup`, typically `std::env::var`
    ///
    /// Key names map to upper snake case: `kafka.partition.count` is read from
    /// `KAFKA_PARTITION_COUNT`, `cps.maxBatchSize` from `CPS_MAXBATCHSIZE`.
    pub fn apply_overrides(&mut self, def: &ConfigDef, lookup: impl Fn(&str) -> Option<String>) {
        for key in def.keys() {
            if let Some(value) = lookup(&Self::env_var_name(key.name)) {
                self.insert(key.name, value);
            }
        }
    }

    /// Environment variable name for a configuration key
    pub fn env_var_name(key: &str) -> String {
        key.replace(['.', '-'], "_").to_uppercase()
    }
}

impl From<HashMap<String, String>> for RawConfig {
    fn from(props: HashMap<String, String>) -> Self {
        Self { props }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            props: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn flatten_table(
    prefix: Option<&str>,
    table: &toml::Table,
    out: &mut RawConfig,
) -> ConnectorResult<()> {
    for (name, value) in table {
        let key = match prefix {
            Some(p) => format!("{}.{}", p, name),
            None => name.clone(),
        };

        let text = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Datetime(d) => d.to_string(),
            toml::Value::Table(nested) => {
                flatten_table(Some(&key), nested, out)?;
                continue;
            }
            toml::Value::Array(_) => {
                return Err(ConnectorError::config(format!(
                    "{} must be a scalar value, arrays are not supported",
                    key
                )))
            }
        };
        out.insert(key, text);
    }
    Ok(())
}
