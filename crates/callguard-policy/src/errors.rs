//! Error types for policy construction and permission checks.
//!
//! Three families, one per way a caller reacts:
//!
//! - [`ConfigError`]: bad startup configuration. Fatal before any guarded call runs.
//! - [`Denial`]: the policy said no. An expected outcome for the guarded call.
//! - [`InternalError`]: the rewriter and the policy table disagree, or a
//!   caller broke a contract. Always fatal.

use std::fmt;
use std::io;
use std::path::PathBuf;

use callguard_types::well_known::keys;
use callguard_types::{Operation, Principal};

/// Invalid startup configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A `callguard.`-prefixed key that is not recognized.
    UnknownKey {
        /// The offending key, verbatim.
        key: String,
    },
    /// An allow-list entry that is not of the form `module <name>`.
    MalformedPrincipal {
        /// The offending entry, trimmed exactly as it was checked.
        value: String,
    },
    /// A `--set` style override without a `=`.
    InvalidOverride { arg: String },
    /// A configuration file could not be read.
    Io { path: PathBuf, source: io::Error },
    /// A JSON configuration document could not be parsed.
    Json { message: String },
    /// A JSON configuration entry whose value is not a string.
    NonStringValue { key: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownKey { key } => write!(
                f,
                "{} is not a valid key. Allowed keys are: {}",
                key,
                keys::ALL.join(", ")
            ),
            ConfigError::MalformedPrincipal { value } => {
                write!(f, "Not a valid module name: {}", value)
            }
            ConfigError::InvalidOverride { arg } => {
                write!(f, "invalid override '{}': expected key=value", arg)
            }
            ConfigError::Io { path, source } => {
                write!(f, "cannot read {}: {}", path.display(), source)
            }
            ConfigError::Json { message } => write!(f, "invalid JSON configuration: {}", message),
            ConfigError::NonStringValue { key } => {
                write!(f, "value of {} must be a string", key)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A guarded operation refused for its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub operation: Operation,
    /// `None` when the caller could not be attributed.
    pub principal: Option<Principal>,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.principal {
            Some(principal) => write!(
                f,
                "{} not allowed for Module: {}",
                self.operation.display_name(),
                principal.name()
            ),
            None => write!(
                f,
                "{} not allowed for unknown caller",
                self.operation.display_name()
            ),
        }
    }
}

impl std::error::Error for Denial {}

/// Broken contract between the rewriter, the guard and the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// The guard entry received a key no operation owns.
    UnknownOperation { key: String },
    /// A frame skip count below zero.
    NegativeSkip { value: i64 },
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalError::UnknownOperation { key } => write!(f, "Unknown method: {}", key),
            InternalError::NegativeSkip { value } => {
                write!(f, "framesToSkip must be >= 0, got {}", value)
            }
        }
    }
}

impl std::error::Error for InternalError {}

/// Outcome of a failed guard entry call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    Denied(Denial),
    Internal(InternalError),
}

impl GuardError {
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            GuardError::Denied(denial) => Some(denial),
            GuardError::Internal(_) => None,
        }
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Denied(denial) => denial.fmt(f),
            GuardError::Internal(e) => write!(f, "internal guard error: {}", e),
        }
    }
}

impl std::error::Error for GuardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardError::Denied(denial) => Some(denial),
            GuardError::Internal(e) => Some(e),
        }
    }
}

impl From<Denial> for GuardError {
    fn from(denial: Denial) -> Self {
        GuardError::Denied(denial)
    }
}

impl From<InternalError> for GuardError {
    fn from(e: InternalError) -> Self {
        GuardError::Internal(e)
    }
}

/// Failure of a guarded host operation: either the guard refused it, or the
/// operation itself failed after being allowed.
#[derive(Debug)]
pub enum GuardedError {
    Guard(GuardError),
    Io(io::Error),
}

impl GuardedError {
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            GuardedError::Guard(e) => e.denial(),
            GuardedError::Io(_) => None,
        }
    }
}

impl fmt::Display for GuardedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardedError::Guard(e) => e.fmt(f),
            GuardedError::Io(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for GuardedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GuardedError::Guard(e) => Some(e),
            GuardedError::Io(e) => Some(e),
        }
    }
}

impl From<GuardError> for GuardedError {
    fn from(e: GuardError) -> Self {
        GuardedError::Guard(e)
    }
}

impl From<io::Error> for GuardedError {
    fn from(e: io::Error) -> Self {
        GuardedError::Io(e)
    }
}
