use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{RunnerError, RunnerResult};

/// One file found in the Demucs output folder for a track.
#[derive(Debug, PartialEq, Eq)]
pub struct SeparatedStem {
    pub filename: String,
    pub path: PathBuf,
}

/// Runs Demucs as a subprocess with a fixed argument set.
#[derive(Debug)]
pub struct DemucsRunner {
    program: String,
    leading_args: Vec<String>,
    model: String,
    two_stems: String,
    timeout: Duration,
}

impl DemucsRunner {
    pub fn new(
        program: impl Into<String>,
        leading_args: Vec<String>,
        model: impl Into<String>,
        two_stems: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        DemucsRunner {
            program: program.into(),
            leading_args,
            model: model.into(),
            two_stems: two_stems.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut parts = config.demucs_command.split_whitespace().map(String::from);
        let Some(program) = parts.next() else {
            bail!("demucs_command must name a program")
        };

        Ok(DemucsRunner::new(
            program,
            parts.collect(),
            config.model.clone(),
            config.two_stems.clone(),
            Duration::from_secs(config.tool_timeout_secs),
        ))
    }

    fn command(&self, input: &Path, output_root: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("-n")
            .arg(&self.model)
            .arg("--two-stems")
            .arg(&self.two_stems)
            .arg("-o")
            .arg(output_root)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Demucs writes stems to `<output_root>/<model>/<input file stem>/`.
    pub fn output_dir_for(&self, input: &Path, output_root: &Path) -> PathBuf {
        let track = input.file_stem().unwrap_or(input.as_os_str());
        output_root.join(&self.model).join(track)
    }

    /// Separates `input` into `output_root` and returns the folder holding the
    /// stems. The child is killed if the deadline passes or the returned
    /// future is dropped.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn separate(&self, input: &Path, output_root: &Path) -> RunnerResult<PathBuf> {
        let mut cmd = self.command(input, output_root);
        info!("Command: {:?}", cmd.as_std());

        let started = Instant::now();
        let child = cmd.spawn().map_err(|err| {
            RunnerError::ToolFailure(format!("Failed to start {}: {}", self.program, err))
        })?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.context("Failed to collect Demucs output")?,
            Err(_) => return Err(RunnerError::ToolTimeout(self.timeout)),
        };
        let elapsed = started.elapsed().as_secs_f64();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("STDOUT: {}", stdout);
        // Demucs reports progress and warnings on stderr
        info!("STDERR: {}", stderr);
        info!(
            histogram.demucs_run_seconds = elapsed,
            status = %output.status,
            "Demucs finished in {:.1}s",
            elapsed
        );

        if !output.status.success() {
            return Err(RunnerError::ToolFailure(format!("Demucs failed\n{stderr}")));
        }

        let separated_dir = self.output_dir_for(input, output_root);
        if !separated_dir.is_dir() {
            return Err(RunnerError::ToolFailure(
                "Output not found. Demucs path may be wrong.".into(),
            ));
        }
        Ok(separated_dir)
    }
}

/// Regular files directly inside `dir`, ordered by file name.
pub async fn collect_stems(dir: &Path) -> Result<Vec<SeparatedStem>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    let mut stems = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Ok(filename) = entry.file_name().into_string() else {
            bail!("Stem file name {:?} is not valid UTF-8", entry.file_name())
        };
        stems.push(SeparatedStem {
            filename,
            path: entry.path(),
        });
    }
    stems.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(stems)
}
