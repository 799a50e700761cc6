//! External process execution.
//!
//! [`CommandRunner`] is the only seam that touches the OS process API. It
//! blocks until the child exits and has no timeout: a hung supervisor hangs
//! the worker that called it. Callers run it off the state-owning task.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SyncError;

/// Captured result of one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs a program to completion and reports stdout plus exit code.
///
/// A non-zero exit is data, not an `Err`; only failing to start the process
/// is an error here.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[String]) -> Result<RunOutput, SyncError>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<RunOutput, SyncError> {
        let command = describe(program, args);
        debug!(command = %command, "running supervisor command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SyncError::SpawnFailed {
                command: command.clone(),
                source,
            })?;

        let exit_code = output.status.code();
        if !output.status.success() {
            debug!(
                command = %command,
                exit_code = ?exit_code,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "supervisor command failed"
            );
        }

        Ok(RunOutput {
            stdout: output.stdout,
            exit_code,
        })
    }
}

/// Human-readable command line used in logs and error messages.
pub fn describe(program: &Path, args: &[String]) -> String {
    let mut out = program.display().to_string();
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out
}

/// Shell-safe command string for the elevation boundary.
pub fn shell_command_line(program: &Path, args: &[String]) -> String {
    let program = program.display().to_string();
    std::iter::once(program.as_str())
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | '@' | '+' | ':')
        });
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Runs a shell command string with elevated rights.
///
/// The mechanism is host-provided (sudo, osascript, ...); brewbar only cares
/// whether it succeeded.
pub trait Elevation: Send + Sync {
    fn run_elevated(&self, command_line: &str) -> Result<RunOutput, SyncError>;
}

/// How the command line is escaped before it replaces `{command}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateEscape {
    /// Substitute verbatim.
    #[default]
    None,
    /// Backslash-escape `\` and `"` so the command survives inside an
    /// AppleScript string literal.
    #[serde(rename = "applescript")]
    AppleScript,
}

impl TemplateEscape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AppleScript => "applescript",
        }
    }

    fn apply(self, command_line: &str) -> String {
        match self {
            Self::None => command_line.to_string(),
            Self::AppleScript => command_line.replace('\\', "\\\\").replace('"', "\\\""),
        }
    }
}

/// [`Elevation`] that substitutes the command into a template and hands it
/// to a wrapper program, e.g. `sudo sh -c '{command}'`.
pub struct TemplateElevation {
    program: String,
    args: Vec<String>,
    template: String,
    escape: TemplateEscape,
    runner: Arc<dyn CommandRunner>,
}

impl TemplateElevation {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        template: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            template: template.into(),
            escape: TemplateEscape::None,
            runner,
        }
    }

    pub fn with_escape(mut self, escape: TemplateEscape) -> Self {
        self.escape = escape;
        self
    }

    fn wrapper_args(&self, command_line: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(self.template.replace("{command}", &self.escape.apply(command_line)));
        args
    }
}

impl Elevation for TemplateElevation {
    fn run_elevated(&self, command_line: &str) -> Result<RunOutput, SyncError> {
        info!(program = %self.program, command = %command_line, "running elevated command");
        self.runner
            .run(Path::new(&self.program), &self.wrapper_args(command_line))
    }
}
