use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::runner::TemplateEscape;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = ".brewbar";

/// `executable` accepts a single path or an ordered list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExecutableSetting {
    One(String),
    Many(Vec<String>),
}

impl Default for ExecutableSetting {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl ExecutableSetting {
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            Self::One(path) if path.trim().is_empty() => Vec::new(),
            Self::One(path) => vec![PathBuf::from(path)],
            Self::Many(paths) => paths
                .iter()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SupervisorSettings {
    /// Candidate overrides, tried before the architecture defaults.
    #[serde(default)]
    pub executable: ExecutableSetting,
    /// Account name used for ownership checks; defaults to `$USER`.
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshSettings {
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
        }
    }
}

/// How elevated commands are run. `{command}` in `template` is replaced by
/// the shell-quoted supervisor command line.
#[derive(Debug, Deserialize, Serialize)]
pub struct ElevationSettings {
    #[serde(default = "default_elevation_program")]
    pub program: String,
    #[serde(default = "default_elevation_args")]
    pub args: Vec<String>,
    #[serde(default = "default_elevation_template")]
    pub template: String,
    /// Escaping applied to the command before substitution.
    #[serde(default = "default_elevation_escape")]
    pub escape: TemplateEscape,
}

impl Default for ElevationSettings {
    fn default() -> Self {
        Self {
            program: default_elevation_program(),
            args: default_elevation_args(),
            template: default_elevation_template(),
            escape: default_elevation_escape(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LogSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_elevation_program() -> String {
    if cfg!(target_os = "macos") {
        "osascript".to_string()
    } else {
        "sudo".to_string()
    }
}

fn default_elevation_args() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["-e".to_string()]
    } else {
        vec!["sh".to_string(), "-c".to_string()]
    }
}

fn default_elevation_template() -> String {
    if cfg!(target_os = "macos") {
        "do shell script \"{command}\" with administrator privileges".to_string()
    } else {
        "{command}".to_string()
    }
}

fn default_elevation_escape() -> TemplateEscape {
    if cfg!(target_os = "macos") {
        TemplateEscape::AppleScript
    } else {
        TemplateEscape::None
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub refresh: RefreshSettings,
    #[serde(default)]
    pub elevation: ElevationSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Config {
    /// Search upward from `start` for a `.brewbar/config.toml` file and load it.
    /// Returns the default config if no file is found.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        match Self::find_config_file(start) {
            Some(path) => Ok((Self::load_file(&path)?, Some(path))),
            None => Ok((Config::default(), None)),
        }
    }

    /// Load an explicitly named config file; it must exist.
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Account name for ownership checks: config override, then the
    /// environment, then empty (every owned service counts as foreign).
    pub fn current_user(&self) -> String {
        self.supervisor
            .user
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .or_else(|| std::env::var("LOGNAME").ok().filter(|u| !u.is_empty()))
            .unwrap_or_default()
    }

    fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }
}
