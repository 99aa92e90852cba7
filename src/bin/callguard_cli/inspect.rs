//! inspect command - print a class artifact

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use callguard_core::matcher::find_guard;
use callguard_core::{ClassArtifact, ClassCodec, Instruction};
use callguard_types::Operation;

use super::{print_json, ArtifactFormat};

#[derive(Parser, Debug)]
pub struct InspectCmd {
    /// Artifact to inspect
    pub input: PathBuf,

    /// Artifact format (default: guessed from the extension)
    #[arg(long, value_enum)]
    pub format: Option<ArtifactFormat>,

    /// Verify every method body and fail if one is malformed
    #[arg(long)]
    pub verify: bool,
}

impl InspectCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let bytes =
            fs::read(&self.input).with_context(|| format!("reading {}", self.input.display()))?;
        let format = self
            .format
            .unwrap_or_else(|| ArtifactFormat::detect(&self.input));
        let class = format
            .codec()
            .decode(&bytes)
            .with_context(|| format!("decoding {}", self.input.display()))?;

        if self.verify {
            class.verify().map_err(|(method, e)| {
                anyhow::anyhow!("method {} failed verification: {}", method, e)
            })?;
        }

        if json_output {
            print_json(&class)
        } else {
            print!("{}", format_listing(&class));
            Ok(())
        }
    }
}

/// Human-readable listing, one instruction per line, with guarded
/// operations marked.
fn format_listing(class: &ClassArtifact) -> String {
    let mut out = String::new();
    out.push_str(&format!("class {}", class.name));
    if let Some(super_name) = &class.super_name {
        out.push_str(&format!(" extends {}", super_name));
    }
    out.push('\n');

    for method in &class.methods {
        let Some(body) = &method.body else {
            out.push_str(&format!("\n  {} (no body)\n", method.qualified_name()));
            continue;
        };
        out.push_str(&format!(
            "\n  {}  max_stack={} max_locals={}\n",
            method.qualified_name(),
            body.max_stack,
            body.max_locals
        ));
        let guarded: Vec<Operation> = Operation::ALL
            .into_iter()
            .filter(|op| find_guard(&body.instructions, *op).is_some())
            .collect();
        if !guarded.is_empty() {
            let names: Vec<&str> = guarded.iter().map(|op| op.key()).collect();
            out.push_str(&format!("    guards: {}\n", names.join(", ")));
        }
        for (idx, instruction) in body.instructions.iter().enumerate() {
            out.push_str(&format!("    {:>4}: {}", idx, instruction));
            if let Instruction::Invoke(inv) = instruction {
                if inv.is_guard_entry() {
                    out.push_str("    ; guard");
                } else if let Some(op) = Operation::ALL
                    .into_iter()
                    .find(|op| callguard_core::matches(instruction, &op.signature()))
                {
                    out.push_str(&format!("    ; {}", op.display_name()));
                }
            }
            out.push('\n');
        }
        for handler in &body.handlers {
            out.push_str(&format!(
                "    try {}..{} catch {} -> {}\n",
                handler.start,
                handler.end,
                handler.catch_type.as_deref().unwrap_or("*"),
                handler.handler
            ));
        }
    }
    out
}
