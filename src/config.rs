use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::oid::OidParseError;
use crate::schema::SchemaError;

/// Everything that can go wrong while reading configuration. Each error is
/// scoped to one declaration; only file-level failures abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("`{block}` declaration needs exactly one string name")]
    BadBlockName { block: String },
    #[error("`{key}` in {scope} `{name}` needs {expect}")]
    BadOption {
        key: String,
        scope: &'static str,
        name: String,
        expect: &'static str,
    },
    #[error("{scope} `{name}` is missing required option `{key}`")]
    MissingOption {
        scope: &'static str,
        name: String,
        key: &'static str,
    },
    #[error("invalid OID `{text}` in `{name}`: {source}")]
    InvalidOid {
        name: String,
        text: String,
        #[source]
        source: OidParseError,
    },
    #[error("invalid protocol version {value} for host `{name}` (must be 1 or 2)")]
    InvalidVersion { name: String, value: f64 },
    #[error("duplicate name `{0}`")]
    Duplicate(String),
    #[error("metric type `{metric_type}` has {expected} slots but `{name}` lists {actual} values")]
    SlotCountMismatch {
        name: String,
        metric_type: String,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// One typed scalar argument of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::String(_) => "string",
            ConfigValue::Number(_) => "number",
            ConfigValue::Boolean(_) => "boolean",
        }
    }
}

/// One declaration: a key, its arguments, and nested declarations.
///
/// This is the shape the binder consumes. The TOML lowering below fills it
/// without interpreting any key; validation lives entirely in the binder.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigItem {
    pub key: String,
    pub values: Vec<ConfigValue>,
    pub children: Vec<ConfigItem>,
}

impl ConfigItem {
    pub fn leaf(key: &str, values: Vec<ConfigValue>) -> ConfigItem {
        ConfigItem {
            key: key.to_string(),
            values,
            children: Vec::new(),
        }
    }

    pub fn block(key: &str, name: &str, children: Vec<ConfigItem>) -> ConfigItem {
        ConfigItem {
            key: key.to_string(),
            values: vec![ConfigValue::String(name.to_string())],
            children,
        }
    }

    /// Case-insensitive key match, the way declaration keys are looked up.
    pub fn key_is(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }
}

/// Loads a TOML config file and lowers it into declaration items.
pub fn load_file(path: &Path) -> Result<Vec<ConfigItem>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&text, &path.display().to_string())
}

/// Parses TOML text into declaration items.
pub fn parse_str(text: &str, origin: &str) -> Result<Vec<ConfigItem>, ConfigError> {
    let root: toml::Table = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: origin.to_string(),
        source,
    })?;
    Ok(lower_table(&root))
}

fn lower_table(table: &toml::Table) -> Vec<ConfigItem> {
    let mut items = Vec::new();
    for (key, value) in table {
        items.extend(lower_entry(key, value));
    }
    items
}

/// Shape-only lowering rules:
/// - `[section.name]` table-of-tables: one item per name, name as the
///   first argument
/// - `[section]` of anything else: one item with children
/// - `key = [[..], [..]]`: one item per inner list
/// - `key = [..]` / `key = scalar`: one item carrying the arguments
fn lower_entry(key: &str, value: &toml::Value) -> Vec<ConfigItem> {
    use toml::Value;

    match value {
        Value::Table(t) if !t.is_empty() && t.values().all(|v| v.is_table()) => t
            .iter()
            .filter_map(|(name, sub)| {
                sub.as_table().map(|sub| ConfigItem {
                    key: key.to_string(),
                    values: vec![ConfigValue::String(name.clone())],
                    children: lower_table(sub),
                })
            })
            .collect(),
        Value::Table(t) => vec![ConfigItem {
            key: key.to_string(),
            values: Vec::new(),
            children: lower_table(t),
        }],
        Value::Array(items) if !items.is_empty() && items.iter().all(|v| v.is_array()) => items
            .iter()
            .filter_map(|inner| inner.as_array())
            .map(|inner| ConfigItem {
                key: key.to_string(),
                values: lower_scalars(inner),
                children: Vec::new(),
            })
            .collect(),
        Value::Array(items) => vec![ConfigItem {
            key: key.to_string(),
            values: lower_scalars(items),
            children: Vec::new(),
        }],
        scalar => vec![ConfigItem {
            key: key.to_string(),
            values: lower_scalar(scalar).into_iter().collect(),
            children: Vec::new(),
        }],
    }
}

fn lower_scalars(values: &[toml::Value]) -> Vec<ConfigValue> {
    values.iter().filter_map(lower_scalar).collect()
}

fn lower_scalar(value: &toml::Value) -> Option<ConfigValue> {
    use toml::Value;

    match value {
        Value::String(s) => Some(ConfigValue::String(s.clone())),
        Value::Integer(i) => Some(ConfigValue::Number(*i as f64)),
        Value::Float(f) => Some(ConfigValue::Number(*f)),
        Value::Boolean(b) => Some(ConfigValue::Boolean(*b)),
        other => {
            warn!(
                "ignoring config value of unsupported type {}",
                other.type_str()
            );
            None
        }
    }
}
