//! Text extraction and post-processing through operator-supplied commands.
//!
//! A stage maps every input file with one extension to an output file in
//! another directory by running a command template once per file. `{input}`
//! and `{output}` in the template are replaced with the two paths.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::PipelineError;

/// Placeholder for the input file path.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder for the output file path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// A parsed command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Splits `template` on whitespace. Placeholders are substituted per
    /// argument, so paths containing spaces stay single arguments.
    ///
    /// Returns `None` for a blank template.
    #[must_use]
    pub fn parse(template: &str) -> Option<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with placeholders replaced.
    #[must_use]
    pub fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

/// One external stage: inputs, outputs and the command between them.
#[derive(Debug, Clone)]
pub struct ExternalStage {
    pub name: &'static str,
    pub command: Option<CommandTemplate>,
    pub input_dir: PathBuf,
    pub input_extension: &'static str,
    pub output_dir: PathBuf,
    pub output_extension: &'static str,
}

/// Counts from one stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// False when no command was configured and the stage did nothing.
    pub configured: bool,
    pub processed: usize,
    /// Inputs whose output already existed.
    pub skipped: usize,
    pub failed: usize,
    /// Inputs left untouched because the stop flag was raised.
    pub interrupted: usize,
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn list_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PipelineError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    let mut inputs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extension))
        .collect();
    inputs.sort();
    Ok(inputs)
}

impl ExternalStage {
    /// Output path for `input`.
    #[must_use]
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map_or_else(|| "output".into(), |s| s.to_string_lossy().into_owned());
        self.output_dir
            .join(format!("{stem}.{}", self.output_extension))
    }

    /// Runs the command for every input without an existing output.
    ///
    /// Command failures are counted, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the input directory cannot be listed or
    /// the output directory cannot be created.
    #[instrument(skip(self, stop), fields(stage = self.name))]
    pub async fn run(&self, stop: &AtomicBool) -> Result<StageReport, PipelineError> {
        let Some(command) = &self.command else {
            warn!(stage = self.name, "no command configured, skipping stage");
            return Ok(StageReport::default());
        };

        let inputs = list_inputs(&self.input_dir, self.input_extension)?;
        std::fs::create_dir_all(&self.output_dir).map_err(|source| PipelineError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let mut report = StageReport {
            configured: true,
            ..StageReport::default()
        };
        for (index, input) in inputs.iter().enumerate() {
            if stop.load(Ordering::SeqCst) {
                report.interrupted = inputs.len() - index;
                break;
            }
            let output = self.output_path(input);
            if output.exists() {
                report.skipped += 1;
                continue;
            }

            let args = command.render_args(input, &output);
            debug!(program = command.program(), ?args, "running stage command");
            match Command::new(command.program()).args(&args).status().await {
                Ok(status) if status.success() && output.exists() => report.processed += 1,
                Ok(status) => {
                    warn!(input = %input.display(), %status, "stage command failed");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(input = %input.display(), error = %e, "stage command could not start");
                    report.failed += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "stage done"
        );
        Ok(report)
    }
}
