//! assemble command - JSON class description to binary artifact

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use callguard_core::{BinaryCodec, ClassCodec, JsonCodec};

use super::print_json;

#[derive(Parser, Debug)]
pub struct AssembleCmd {
    /// JSON class description
    pub input: PathBuf,

    /// Binary artifact to write (default: input with a .cgc extension)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl AssembleCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let text =
            fs::read(&self.input).with_context(|| format!("reading {}", self.input.display()))?;
        let class = JsonCodec
            .decode(&text)
            .with_context(|| format!("parsing {}", self.input.display()))?;
        let bytes = BinaryCodec
            .encode(&class)
            .with_context(|| format!("encoding {}", class.name))?;

        let output = self
            .output
            .clone()
            .unwrap_or_else(|| self.input.with_extension("cgc"));
        fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;

        if json_output {
            print_json(&json!({
                "class": class.name,
                "output": output,
                "bytes": bytes.len(),
            }))
        } else {
            println!(
                "Assembled {} -> {} ({} bytes)",
                class.name,
                output.display(),
                bytes.len()
            );
            Ok(())
        }
    }
}
