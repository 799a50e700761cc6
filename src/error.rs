use std::path::PathBuf;

use thiserror::Error;

/// Failures while locating, invoking, or reading the supervisor.
///
/// All of these are recoverable: the coordinator turns them into a display
/// state or a one-shot notice and keeps running.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("supervisor executable not found (checked: {})", display_paths(.candidates))]
    ExecutableNotFound { candidates: Vec<PathBuf> },

    #[error("failed to start `{command}`")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", display_code(.code))]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("line {line} of supervisor output has no service name: {content:?}")]
    MalformedOutput { line: usize, content: String },
}

/// Reasons a toggle request is refused before any command runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToggleError {
    #[error("no service named '{0}' in the current list")]
    UnknownService(String),

    #[error("'{name}' is {status}; it cannot be toggled directly")]
    Indeterminate { name: String, status: String },

    #[error("'{name}' runs as {owner}; toggling it requires elevation")]
    ForeignOwner { name: String, owner: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(no candidates)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
