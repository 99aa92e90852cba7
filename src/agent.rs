//! Agent glue between the host's class lifecycle and callguard.
//!
//! The host calls [`Agent::premain`] once at startup with its property set,
//! hands every defined or redefined class to [`Agent::on_class`], asks the
//! runtime to retransform [`Agent::retransform_targets`], and binds the guard
//! entry to [`Agent::guard`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use callguard_core::{RuleSet, TransformError, Transformer};
use callguard_policy::{ConfigError, Guard, PolicyConfig, PolicyEngine, Properties};
use callguard_types::well_known::keys;

/// Class lifecycle event reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassEvent {
    /// A class is being defined for the first time.
    Define,
    /// An already loaded class is being redefined or retransformed.
    Redefine,
}

impl fmt::Display for ClassEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassEvent::Define => f.write_str("define"),
            ClassEvent::Redefine => f.write_str("redefine"),
        }
    }
}

#[derive(Debug)]
pub enum AgentError {
    /// The bootstrap artifact key is absent.
    MissingBootstrapArtifact,
    /// The bootstrap artifact key names a path that does not exist.
    BootstrapArtifactNotFound { path: PathBuf },
    Config(ConfigError),
    Transform {
        class: String,
        source: TransformError,
    },
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::MissingBootstrapArtifact => {
                write!(f, "No {} specified", keys::BOOTSTRAP_ARTIFACT)
            }
            AgentError::BootstrapArtifactNotFound { path } => {
                write!(f, "bootstrap artifact {} does not exist", path.display())
            }
            AgentError::Config(e) => e.fmt(f),
            AgentError::Transform { class, source } => {
                write!(f, "failed to transform {}: {}", class, source)
            }
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Config(e) => Some(e),
            AgentError::Transform { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for AgentError {
    fn from(e: ConfigError) -> Self {
        AgentError::Config(e)
    }
}

/// One configured callguard instance.
#[derive(Debug)]
pub struct Agent {
    config: PolicyConfig,
    bootstrap_artifact: PathBuf,
    guard: Guard,
    transformer: Transformer,
}

impl Agent {
    /// Validate `props` and set up the guard and the transformer.
    ///
    /// Nothing is installed if any check fails.
    pub fn premain(props: &Properties) -> Result<Self, AgentError> {
        let bootstrap_artifact = props
            .get(keys::BOOTSTRAP_ARTIFACT)
            .map(PathBuf::from)
            .ok_or(AgentError::MissingBootstrapArtifact)?;
        if !bootstrap_artifact.exists() {
            return Err(AgentError::BootstrapArtifactNotFound {
                path: bootstrap_artifact,
            });
        }

        let config = PolicyConfig::from_properties(props)?;
        let engine = PolicyEngine::from_config(&config);
        info!(
            bootstrap = %bootstrap_artifact.display(),
            grants = engine.catalog().grant_count(),
            "callguard policy installed"
        );

        Ok(Self {
            config,
            bootstrap_artifact,
            guard: Guard::new(Arc::new(engine)),
            transformer: Transformer::new(RuleSet::standard()),
        })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn bootstrap_artifact(&self) -> &Path {
        &self.bootstrap_artifact
    }

    /// The handle the guard entry delegates to.
    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Transform one class for the host.
    ///
    /// `Ok(None)` tells the host to keep the bytes it passed in.
    pub fn on_class(
        &self,
        event: ClassEvent,
        class_name: &str,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>, AgentError> {
        let rewritten =
            self.transformer
                .transform(bytes)
                .map_err(|source| AgentError::Transform {
                    class: class_name.to_string(),
                    source,
                })?;
        match &rewritten {
            Some(out) => debug!(%event, class = class_name, size = out.len(), "class rewritten"),
            None => debug!(%event, class = class_name, "class unchanged"),
        }
        Ok(rewritten)
    }

    /// Already loaded runtime types that hold guarded call sites and must be
    /// retransformed once the agent is installed.
    pub fn retransform_targets(&self) -> Vec<&'static str> {
        self.transformer.rules().runtime_callers()
    }
}
