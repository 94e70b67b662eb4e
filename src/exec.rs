//! External command execution
//!
//! Every `git` and container runtime invocation goes through [`Exec`] so the
//! command line is traced under a single target (`depcache::exec`), which
//! `--trace` / `DEPCACHE_TRACE` turns on.

use crate::error::{DepcacheError, DepcacheResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Tracing target for external command lines
pub const TRACE_TARGET: &str = "depcache::exec";

/// Max number of output lines to include in error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Builder for one external command invocation
#[derive(Debug, Clone)]
pub struct Exec {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(String, OsString)>,
}

impl Exec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line, used for tracing and error context
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Build the tokio command with piped output
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }

    /// Run to completion and return raw output regardless of exit status
    pub async fn output(&self) -> DepcacheResult<Output> {
        debug!(target: TRACE_TARGET, "{}", self.display());

        self.command()
            .output()
            .await
            .map_err(|e| DepcacheError::command_failed(self.display(), e))
    }

    /// Run to completion, failing on non-zero exit, returning stdout bytes
    pub async fn checked(&self) -> DepcacheResult<Vec<u8>> {
        let output = self.output().await?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(self.failure(&output))
        }
    }

    /// Like [`Exec::checked`] but returns trimmed UTF-8 stdout
    pub async fn stdout_string(&self) -> DepcacheResult<String> {
        let stdout = self.checked().await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// Build the error for an unsuccessful invocation
    pub fn failure(&self, output: &Output) -> DepcacheError {
        DepcacheError::ExternalProcess {
            program: self.display(),
            code: output.status.code().unwrap_or(-1),
            output: error_output(
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
            ),
        }
    }
}

/// Extract the useful tail of command output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub fn error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    tail_lines(&lines)
}

/// Keep only the last `ERROR_TAIL_LINES` of `lines`
pub fn tail_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..]
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
pub async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let mut all_output = Vec::new();
    let (Some(stderr), Some(stdout)) = (child.stderr.take(), child.stdout.take()) else {
        return all_output;
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
