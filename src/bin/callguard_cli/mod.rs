//! Subcommands of the `callguard` binary and the options they share.

pub mod assemble;
pub mod check_config;
pub mod inspect;
pub mod simulate;
pub mod transform;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use callguard_core::{BinaryCodec, ClassCodec, JsonCodec};
use callguard_policy::config::{self, Properties};

/// Where the policy comes from. Later sources win.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicySource {
    /// Policy file: `.properties`, or JSON when the extension is `.json`
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore CALLGUARD_* environment variables
    #[arg(long)]
    pub no_env: bool,

    /// Set a configuration key, e.g. --set callguard.runtime.exit.allow="module app"
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

impl PolicySource {
    pub fn load(&self) -> Result<Properties> {
        let mut props = Properties::new();
        if let Some(path) = &self.config {
            let loaded = if has_extension(path, "json") {
                config::load_json_file(path)
            } else {
                config::load_properties_file(path)
            }
            .with_context(|| format!("loading policy from {}", path.display()))?;
            props.extend(loaded);
        }
        if !self.no_env {
            props.extend(config::properties_from_env(std::env::vars()));
        }
        config::apply_overrides(&mut props, &self.overrides)?;
        Ok(props)
    }
}

/// On-disk class artifact format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactFormat {
    /// Magic, version and bincode payload
    #[default]
    Binary,
    /// Pretty-printed JSON
    Json,
}

impl ArtifactFormat {
    pub fn codec(self) -> Box<dyn ClassCodec> {
        match self {
            ArtifactFormat::Binary => Box::new(BinaryCodec),
            ArtifactFormat::Json => Box::new(JsonCodec),
        }
    }

    /// File extension used when scanning directories.
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Binary => "cgc",
            ArtifactFormat::Json => "json",
        }
    }

    /// Guess from the file extension, falling back to binary.
    pub fn detect(path: &Path) -> Self {
        if has_extension(path, "json") {
            ArtifactFormat::Json
        } else {
            ArtifactFormat::Binary
        }
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
