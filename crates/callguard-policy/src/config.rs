//! Policy configuration.
//!
//! Configuration is a flat [`Properties`] map, usually shared with other
//! consumers, so only keys under [`CONFIG_PREFIX`] are inspected. Sources can
//! be layered: a `.properties` file, a JSON object, the process environment,
//! then explicit `key=value` overrides, each later source winning.
//!
//! # Usage
//!
//! ```
//! use callguard_policy::config::{PolicyConfig, Properties};
//! use callguard_types::{Operation, Principal};
//!
//! let mut props = Properties::new();
//! props.insert("callguard.system.exec.allow".into(), "module app.tools".into());
//! props.insert("java.home".into(), "/opt/jdk".into());
//!
//! let config = PolicyConfig::from_properties(&props).unwrap();
//! assert!(config.allowed(Operation::ProcessStart).contains(&Principal::module("app.tools")));
//! assert!(config.allowed(Operation::RuntimeExit).is_empty());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use callguard_types::well_known::{keys, CONFIG_PREFIX};
use callguard_types::{Operation, Principal};

use crate::errors::ConfigError;

/// Flat, ordered key/value configuration.
pub type Properties = BTreeMap<String, String>;

/// Environment variables with this prefix map onto configuration keys.
pub const ENV_PREFIX: &str = "CALLGUARD_";

/// Validated policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyConfig {
    /// Allow-list per operation. Every operation has an entry.
    pub allow: BTreeMap<Operation, BTreeSet<Principal>>,
    pub bootstrap_artifact: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow: Operation::ALL
                .into_iter()
                .map(|op| (op, BTreeSet::new()))
                .collect(),
            bootstrap_artifact: None,
        }
    }
}

impl PolicyConfig {
    /// Validate `props` and build the policy.
    ///
    /// Fails on the first unrecognized `callguard.` key or malformed principal.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let mut config = PolicyConfig::default();
        for (key, value) in props {
            if !key.starts_with(CONFIG_PREFIX) {
                continue;
            }
            if let Some(op) = Operation::from_config_key(key) {
                let principals = parse_allow_list(value)?;
                debug!(key = %key, count = principals.len(), "allow-list configured");
                config.allow.insert(op, principals);
            } else if key == keys::BOOTSTRAP_ARTIFACT {
                config.bootstrap_artifact = Some(PathBuf::from(value));
            } else {
                return Err(ConfigError::UnknownKey { key: key.clone() });
            }
        }
        Ok(config)
    }

    /// Principals allowed to perform `operation`.
    pub fn allowed(&self, operation: Operation) -> &BTreeSet<Principal> {
        static EMPTY: BTreeSet<Principal> = BTreeSet::new();
        self.allow.get(&operation).unwrap_or(&EMPTY)
    }

    /// Render back into properties, the inverse of [`PolicyConfig::from_properties`].
    pub fn to_properties(&self) -> Properties {
        let mut props: Properties = self
            .allow
            .iter()
            .map(|(op, principals)| {
                let value: Vec<String> = principals.iter().map(|p| p.to_string()).collect();
                (op.config_key().to_string(), value.join(","))
            })
            .collect();
        if let Some(path) = &self.bootstrap_artifact {
            props.insert(
                keys::BOOTSTRAP_ARTIFACT.to_string(),
                path.display().to_string(),
            );
        }
        props
    }
}

/// Parse a comma separated allow-list. The empty string is an empty list.
pub fn parse_allow_list(value: &str) -> Result<BTreeSet<Principal>, ConfigError> {
    if value.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    value
        .split(',')
        .map(str::trim)
        .map(|entry| {
            Principal::parse(entry).map_err(|_| ConfigError::MalformedPrincipal {
                value: entry.to_string(),
            })
        })
        .collect()
}

/// Parse `.properties` text.
///
/// One `key=value` or `key: value` entry per line; `#` and `!` start comment
/// lines. Keys and values are trimmed. A line with no separator is a key with
/// an empty value.
pub fn parse_properties(text: &str) -> Properties {
    let mut props = Properties::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = match line.find(['=', ':']) {
            Some(at) => (&line[..at], &line[at + 1..]),
            None => (line, ""),
        };
        props.insert(key.trim().to_string(), value.trim().to_string());
    }
    props
}

/// Read and parse a `.properties` file.
pub fn load_properties_file(path: &Path) -> Result<Properties, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_properties(&text))
}

/// Parse a JSON object whose values are all strings.
pub fn properties_from_json(text: &str) -> Result<Properties, ConfigError> {
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|e| ConfigError::Json {
            message: e.to_string(),
        })?;
    raw.into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => Ok((key, s)),
            _ => Err(ConfigError::NonStringValue { key }),
        })
        .collect()
}

/// Read a JSON configuration file.
pub fn load_json_file(path: &Path) -> Result<Properties, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    properties_from_json(&text)
}

/// Map `CALLGUARD_RUNTIME_EXIT_ALLOW` style variables to dotted keys.
///
/// Other variables are ignored.
pub fn properties_from_env<I>(vars: I) -> Properties
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| {
            let rest = name.strip_prefix(ENV_PREFIX)?;
            if rest.is_empty() {
                return None;
            }
            let key = format!(
                "{}{}",
                CONFIG_PREFIX,
                rest.to_ascii_lowercase().replace('_', ".")
            );
            Some((key, value))
        })
        .collect()
}

/// Apply `key=value` overrides on top of `props`.
pub fn apply_overrides(props: &mut Properties, overrides: &[String]) -> Result<(), ConfigError> {
    for arg in overrides {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidOverride { arg: arg.clone() })?;
        props.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(())
}
