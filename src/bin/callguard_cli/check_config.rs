//! check-config command - validate a policy and show what it allows

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use callguard::Agent;
use callguard_policy::PolicyConfig;
use callguard_types::Operation;

use super::{print_json, PolicySource};

#[derive(Parser, Debug)]
pub struct CheckConfigCmd {
    #[command(flatten)]
    pub source: PolicySource,

    /// Also run the agent's startup checks (bootstrap artifact present on disk)
    #[arg(long)]
    pub agent: bool,
}

#[derive(Serialize)]
struct CheckConfigOutput<'a> {
    valid: bool,
    config: &'a PolicyConfig,
}

impl CheckConfigCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let props = self.source.load()?;
        let config = if self.agent {
            Agent::premain(&props)?.config().clone()
        } else {
            PolicyConfig::from_properties(&props)?
        };

        if json_output {
            return print_json(&CheckConfigOutput {
                valid: true,
                config: &config,
            });
        }

        println!("Policy OK");
        for op in Operation::ALL {
            let allowed: Vec<String> = config.allowed(op).iter().map(|p| p.to_string()).collect();
            let allowed = if allowed.is_empty() {
                "(denied to everyone)".to_string()
            } else {
                allowed.join(", ")
            };
            println!("  {:<26} {}", op.display_name(), allowed);
        }
        match &config.bootstrap_artifact {
            Some(path) => println!("  bootstrap artifact         {}", path.display()),
            None => println!("  bootstrap artifact         (not set)"),
        }
        Ok(())
    }
}
