//! transform command - inject guards into class artifacts on disk
//!
//! A single file or every matching file under a directory. Directories are
//! processed in parallel and each file is independent. In place, only files
//! that were actually modified are rewritten; with `--output`, unchanged files
//! are copied across so the output tree holds every artifact that decoded.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use callguard_core::{ClassCodec, Dispatch, GuardedSite, Placement, RuleSet, Transformer};

use super::{print_json, ArtifactFormat};

#[derive(Parser, Debug)]
pub struct TransformCmd {
    /// Artifact file or directory of artifacts
    pub input: PathBuf,

    /// Output file or directory (default: rewrite in place)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Artifact format (default: guessed from the extension)
    #[arg(long, value_enum)]
    pub format: Option<ArtifactFormat>,

    /// Which rules to run on each class
    #[arg(long, value_enum, default_value_t = DispatchArg::All)]
    pub dispatch: DispatchArg,

    /// Where each guard goes inside a method
    #[arg(long, value_enum, default_value_t = PlacementArg::BeforeCall)]
    pub placement: PlacementArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchArg {
    /// Every rule on every class
    All,
    /// Only rules whose owner type the class calls into
    Referenced,
}

impl From<DispatchArg> for Dispatch {
    fn from(arg: DispatchArg) -> Self {
        match arg {
            DispatchArg::All => Dispatch::AllRules,
            DispatchArg::Referenced => Dispatch::ReferencedOwners,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementArg {
    /// Before the first guarded call, or at entry when branches intervene
    BeforeCall,
    /// Always at method entry
    MethodEntry,
}

impl From<PlacementArg> for Placement {
    fn from(arg: PlacementArg) -> Self {
        match arg {
            PlacementArg::BeforeCall => Placement::BeforeCall,
            PlacementArg::MethodEntry => Placement::MethodEntry,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum FileStatus {
    Modified,
    Unchanged,
    Failed,
}

#[derive(Debug, Serialize)]
struct FileOutcome {
    path: PathBuf,
    status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    guarded: Vec<GuardedSite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    modified: usize,
    unchanged: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct TransformOutput {
    summary: Summary,
    files: Vec<FileOutcome>,
}

impl TransformCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let jobs = self.plan()?;
        let format = self
            .format
            .unwrap_or_else(|| ArtifactFormat::detect(&self.input));
        let transformer = Transformer::new(RuleSet::with_placement(self.placement.into()))
            .with_codec(format.codec())
            .with_dispatch(self.dispatch.into());

        let files: Vec<FileOutcome> = jobs
            .par_iter()
            .map(|(input, output)| transform_file(&transformer, input, output))
            .collect();

        let mut summary = Summary::default();
        for file in &files {
            match file.status {
                FileStatus::Modified => summary.modified += 1,
                FileStatus::Unchanged => summary.unchanged += 1,
                FileStatus::Failed => summary.failed += 1,
            }
        }
        let failed = summary.failed;

        if json_output {
            print_json(&TransformOutput { summary, files })?;
        } else {
            for file in &files {
                match file.status {
                    FileStatus::Modified => {
                        println!("modified   {}", file.path.display());
                        for site in &file.guarded {
                            println!("             {} <- {}", site.method, site.operation);
                        }
                    }
                    FileStatus::Unchanged => println!("unchanged  {}", file.path.display()),
                    FileStatus::Failed => println!(
                        "failed     {}: {}",
                        file.path.display(),
                        file.error.as_deref().unwrap_or("unknown error")
                    ),
                }
            }
            println!(
                "{} modified, {} unchanged, {} failed",
                summary.modified, summary.unchanged, summary.failed
            );
        }

        if failed > 0 {
            bail!("{} artifact(s) could not be transformed", failed);
        }
        Ok(())
    }

    /// Pair every input file with the path its output goes to.
    fn plan(&self) -> Result<Vec<(PathBuf, PathBuf)>> {
        if self.input.is_file() {
            let output = self.output.clone().unwrap_or_else(|| self.input.clone());
            return Ok(vec![(self.input.clone(), output)]);
        }
        if !self.input.is_dir() {
            bail!("{} does not exist", self.input.display());
        }

        let ext = self
            .format
            .map(ArtifactFormat::extension)
            .unwrap_or(ArtifactFormat::Binary.extension());
        let mut inputs = Vec::new();
        collect_files(&self.input, ext, &mut inputs)
            .with_context(|| format!("scanning {}", self.input.display()))?;
        inputs.sort();
        debug!(count = inputs.len(), dir = %self.input.display(), "artifacts found");

        let out_root = self.output.as_deref().unwrap_or(&self.input);
        inputs
            .into_iter()
            .map(|input| -> Result<(PathBuf, PathBuf)> {
                let relative = input.strip_prefix(&self.input)?.to_path_buf();
                Ok((input, out_root.join(relative)))
            })
            .collect()
    }
}

fn collect_files(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, ext, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(ext) {
            out.push(path);
        }
    }
    Ok(())
}

fn transform_file<C: ClassCodec>(
    transformer: &Transformer<C>,
    input: &Path,
    output: &Path,
) -> FileOutcome {
    let result = fs::read(input)
        .with_context(|| format!("reading {}", input.display()))
        .and_then(|bytes| Ok(transformer.transform_with_report(&bytes)?))
        .and_then(|(report, encoded)| {
            let modified = encoded.is_some();
            if modified || output != input {
                if let Some(parent) = output.parent() {
                    fs::create_dir_all(parent)?;
                }
            }
            match &encoded {
                Some(bytes) => fs::write(output, bytes)
                    .with_context(|| format!("writing {}", output.display()))?,
                // Unchanged artifacts are carried over so the output tree is complete.
                None if output != input => {
                    fs::copy(input, output)
                        .with_context(|| format!("copying to {}", output.display()))?;
                }
                None => {}
            }
            Ok((report, modified))
        });

    match result {
        Ok((report, modified)) => FileOutcome {
            path: input.to_path_buf(),
            status: if modified {
                FileStatus::Modified
            } else {
                FileStatus::Unchanged
            },
            class: Some(report.class),
            guarded: report.guarded,
            error: None,
        },
        Err(e) => {
            warn!(path = %input.display(), error = %e, "transform failed");
            FileOutcome {
                path: input.to_path_buf(),
                status: FileStatus::Failed,
                class: None,
                guarded: Vec::new(),
                error: Some(format!("{:#}", e)),
            }
        }
    }
}
