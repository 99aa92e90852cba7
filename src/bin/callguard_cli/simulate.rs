//! simulate command - run a guarded operation as a given module
//!
//! The operation goes through the same guard and policy engine the agent
//! installs, attributed to `--principal`. A denial is reported on stderr and
//! the command exits with status 1 without performing the operation.

use std::io::Write;
use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use callguard_policy::stack::{Frame, StackWalker, ThreadStack};
use callguard_policy::{guarded, Guard, PolicyConfig, PolicyEngine};
use callguard_types::principal::MODULE_KEYWORD;
use callguard_types::Principal;

use super::{print_json, PolicySource};

#[derive(Parser, Debug)]
pub struct SimulateCmd {
    #[command(flatten)]
    pub source: PolicySource,

    /// Module the call originates from, e.g. `app.tools` (default: unnamed code)
    #[arg(long, short = 'p', value_name = "MODULE")]
    pub principal: Option<String>,

    #[command(subcommand)]
    pub operation: SimOperation,
}

#[derive(Subcommand, Debug)]
pub enum SimOperation {
    /// Terminate this process with the given status
    Exit {
        #[arg(default_value_t = 0)]
        code: i32,
    },
    /// Spawn a program and wait for it
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Open a TCP connection
    Connect {
        /// host:port
        addr: String,
        /// Bytes to send once connected
        #[arg(long)]
        payload: Option<String>,
    },
}

impl SimulateCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let props = self.source.load()?;
        let config = PolicyConfig::from_properties(&props)?;
        let guard = Guard::new(Arc::new(PolicyEngine::from_config(&config)));

        let frame = match &self.principal {
            Some(name) => {
                let principal = parse_principal(name)?;
                let symbol = format!("{}.Main.main", principal.name());
                Frame::new(principal, symbol)
            }
            None => Frame::unnamed("Main.main"),
        };
        let _caller = ThreadStack.enter(frame);

        match &self.operation {
            SimOperation::Exit { code } => {
                let never = guarded::exit(&guard, *code)?;
                match never {}
            }
            SimOperation::Exec { command } => {
                let (program, args) = command
                    .split_first()
                    .context("no program given")?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                let status = guarded::spawn(&guard, &mut cmd)?
                    .wait()
                    .with_context(|| format!("waiting for {}", program))?;
                if json_output {
                    print_json(&json!({
                        "allowed": true,
                        "program": program,
                        "status": status.code(),
                    }))?;
                } else {
                    println!("{} exited with {}", program, status);
                }
                if !status.success() {
                    bail!("{} did not exit successfully", program);
                }
                Ok(())
            }
            SimOperation::Connect { addr, payload } => {
                let mut stream = guarded::connect(&guard, addr.as_str())?;
                if let Some(payload) = payload {
                    stream
                        .write_all(payload.as_bytes())
                        .with_context(|| format!("sending payload to {}", addr))?;
                }
                let peer = stream.peer_addr()?;
                if json_output {
                    print_json(&json!({
                        "allowed": true,
                        "peer": peer.to_string(),
                        "sent": payload.as_ref().map_or(0, |p| p.len()),
                    }))
                } else {
                    println!("connected to {}", peer);
                    Ok(())
                }
            }
        }
    }
}

/// Accept either `app.tools` or `module app.tools`.
fn parse_principal(value: &str) -> Result<Principal> {
    let principal = if value.contains(' ') {
        Principal::parse(value)?
    } else {
        Principal::parse(&format!("{} {}", MODULE_KEYWORD, value))?
    };
    Ok(principal)
}
