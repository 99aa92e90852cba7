//! Principal identities.
//!
//! A principal names the compilation unit a stack frame belongs to. In
//! configuration a principal is written `module <name>`; `<name>` is a dotted
//! identifier such as `org.example.app`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyword that introduces a principal in configuration values.
pub const MODULE_KEYWORD: &str = "module";

/// Identity of the compilation unit that owns a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Principal {
    name: String,
}

impl Principal {
    /// Build a principal from a module name.
    ///
    /// The name is not validated; use [`Principal::parse`] for configuration input.
    pub fn module(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Parse the `module <name>` configuration form.
    pub fn parse(value: &str) -> Result<Self, PrincipalParseError> {
        let invalid = || PrincipalParseError {
            value: value.to_string(),
        };
        let (keyword, name) = value.split_once(' ').ok_or_else(invalid)?;
        if keyword != MODULE_KEYWORD || !is_module_name(name) {
            return Err(invalid());
        }
        Ok(Self::module(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// `module <name>`, the same form [`Principal::parse`] accepts.
impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", MODULE_KEYWORD, self.name)
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.to_string()
    }
}

impl TryFrom<String> for Principal {
    type Error = PrincipalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Principal::parse(&value)
    }
}

/// A configuration value that is not of the form `module <name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalParseError {
    /// The offending value, verbatim.
    pub value: String,
}

impl fmt::Display for PrincipalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Not a valid module name: {}", self.value)
    }
}

impl std::error::Error for PrincipalParseError {}

/// Dotted identifier: non-empty segments separated by `.`, each starting with
/// a letter, `_` or `$` and continuing with letters, digits, `_` or `$`.
fn is_module_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
