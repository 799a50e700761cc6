//! Service records as reported by `brew services list`.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Run state of a service as reported by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Started,
    Stopped,
    None,
    Error,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::None => "none",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Toggle control value shown for this status.
    pub fn tri_state(self) -> TriState {
        match self {
            Self::Started => TriState::On,
            Self::Stopped | Self::None => TriState::Off,
            Self::Error | Self::Unknown => TriState::Indeterminate,
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = std::convert::Infallible;

    /// Unrecognized tokens map to `Unknown`, never to an error.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let status = match token.to_ascii_lowercase().as_str() {
            "started" => Self::Started,
            "stopped" => Self::Stopped,
            "none" => Self::None,
            "error" => Self::Error,
            _ => Self::Unknown,
        };
        Ok(status)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On/off/indeterminate value of a service's toggle control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    On,
    Off,
    Indeterminate,
}

/// One row of supervisor output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub name: String,
    pub status: ServiceStatus,
    /// Account the service runs as; empty when unowned.
    pub owner: String,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>, status: ServiceStatus, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            owner: owner.into(),
        }
    }

    /// Whether the record belongs to someone other than `current_user`.
    pub fn owned_by_other(&self, current_user: &str) -> bool {
        !self.owner.is_empty() && self.owner != current_user
    }

    /// Whether the toggle control may act on this record without elevation.
    pub fn toggleable_by(&self, current_user: &str) -> bool {
        self.status.tri_state() != TriState::Indeterminate && !self.owned_by_other(current_user)
    }
}

/// Control verbs understood by `brew services`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a control command acts on: one service or every service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTarget {
    Service(String),
    All,
}

impl ServiceTarget {
    /// The argument passed to the supervisor.
    pub fn as_arg(&self) -> &str {
        match self {
            Self::Service(name) => name,
            Self::All => "--all",
        }
    }
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(name) => f.write_str(name),
            Self::All => f.write_str("all services"),
        }
    }
}
