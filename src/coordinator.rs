//! Refresh/control orchestration.
//!
//! The coordinator owns the [`DisplayList`] and the phase state machine and
//! is only ever touched from one task. Every blocking step (locating brew,
//! spawning it, reading its output, waiting for exit) runs on tokio's
//! blocking pool; results come back as a [`WorkerOutcome`] over a
//! single-consumer channel and are applied by [`SyncCoordinator::handle`].
//!
//! ```text
//! Idle|Refreshing --command--> Mutating --child exits--> Refreshing --applied--> Idle
//! ```
//!
//! A control command is always followed by a refresh issued after its
//! process has exited, whether it succeeded or not. Each refresh carries a
//! [`RefreshToken`]; only the latest issued token may update the list.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{SyncError, ToggleError};
use crate::locator::ExecutableLocator;
use crate::log::{ActivityLog, LogEvent};
use crate::model::{ServiceAction, ServiceTarget, TriState};
use crate::parser::{ParseReport, parse_report};
use crate::reconcile::{DisplayList, DisplayRow, Edit, EditSummary};
use crate::runner::{CommandRunner, Elevation, describe, shell_command_line};

/// Monotonically increasing refresh generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RefreshToken(u64);

impl fmt::Display for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a control command goes through the elevation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Unprivileged,
    Elevated,
}

/// What the coordinator is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Refreshing,
    Mutating {
        target: ServiceTarget,
        action: ServiceAction,
    },
}

/// What the list area should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ListState {
    /// No snapshot has completed yet.
    Loading,
    /// The rows are the latest successfully parsed snapshot (possibly empty).
    Ready,
    /// No supervisor executable was found.
    NotFound { candidates: Vec<PathBuf> },
    /// The supervisor could not be run or reported failure.
    SupervisorError { message: String },
}

/// Result of a worker, handed back to the owning task.
#[derive(Debug)]
pub enum WorkerOutcome {
    Snapshot {
        token: RefreshToken,
        result: Result<ParseReport, SyncError>,
    },
    Control {
        id: u64,
        target: ServiceTarget,
        action: ServiceAction,
        result: Result<(), SyncError>,
    },
}

/// Receiving end of the worker hand-off channel.
pub struct OutcomeReceiver {
    rx: mpsc::UnboundedReceiver<WorkerOutcome>,
}

impl OutcomeReceiver {
    /// Wait for the next worker result. Cancel-safe.
    pub async fn recv(&mut self) -> Option<WorkerOutcome> {
        self.rx.recv().await
    }
}

/// One-shot, non-fatal message about a failed control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub detail: String,
}

/// What applying a worker result changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    SnapshotApplied {
        token: RefreshToken,
        edits: Vec<Edit>,
        skipped_lines: usize,
    },
    RefreshFailed {
        token: RefreshToken,
    },
    RefreshDiscarded {
        token: RefreshToken,
        latest: RefreshToken,
    },
    ControlFinished {
        target: ServiceTarget,
        action: ServiceAction,
        notice: Option<Notice>,
        refresh: RefreshToken,
    },
}

/// Everything the presentation layer needs, at one instant.
#[derive(Debug, Serialize)]
pub struct View<'a> {
    #[serde(flatten)]
    pub phase: Phase,
    #[serde(flatten)]
    pub state: &'a ListState,
    pub services: &'a [DisplayRow],
}

pub struct CoordinatorSettings {
    pub locator: ExecutableLocator,
    pub current_user: String,
    pub activity_log: Option<ActivityLog>,
}

#[derive(Debug, Clone)]
struct Mutation {
    id: u64,
    target: ServiceTarget,
    action: ServiceAction,
}

pub struct SyncCoordinator {
    locator: ExecutableLocator,
    runner: Arc<dyn CommandRunner>,
    elevation: Arc<dyn Elevation>,
    activity_log: Option<ActivityLog>,
    display: DisplayList,
    state: ListState,
    latest_refresh: u64,
    awaiting: Option<RefreshToken>,
    mutations: Vec<Mutation>,
    next_mutation: u64,
    tx: mpsc::UnboundedSender<WorkerOutcome>,
}

impl SyncCoordinator {
    pub fn new(
        settings: CoordinatorSettings,
        runner: Arc<dyn CommandRunner>,
        elevation: Arc<dyn Elevation>,
    ) -> (Self, OutcomeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            locator: settings.locator,
            runner,
            elevation,
            activity_log: settings.activity_log,
            display: DisplayList::new(settings.current_user),
            state: ListState::Loading,
            latest_refresh: 0,
            awaiting: None,
            mutations: Vec::new(),
            next_mutation: 1,
            tx,
        };
        (coordinator, OutcomeReceiver { rx })
    }

    pub fn phase(&self) -> Phase {
        if let Some(m) = self.mutations.last() {
            Phase::Mutating {
                target: m.target.clone(),
                action: m.action,
            }
        } else if self.awaiting.is_some() {
            Phase::Refreshing
        } else {
            Phase::Idle
        }
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    /// Rows to display. Empty unless the last refresh succeeded, so an error
    /// never masquerades as the previous snapshot.
    pub fn rows(&self) -> &[DisplayRow] {
        match self.state {
            ListState::Ready => self.display.rows(),
            _ => &[],
        }
    }

    pub fn view(&self) -> View<'_> {
        View {
            phase: self.phase(),
            state: &self.state,
            services: self.rows(),
        }
    }

    /// Dispatch a snapshot query. Must be called inside a tokio runtime.
    pub fn request_refresh(&mut self) -> RefreshToken {
        self.latest_refresh += 1;
        let token = RefreshToken(self.latest_refresh);
        self.awaiting = Some(token);
        self.record(LogEvent::RefreshStarted { token: token.0 });
        debug!(%token, "refresh requested");

        let locator = self.locator.clone();
        let runner = Arc::clone(&self.runner);
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = fetch_snapshot(&locator, runner.as_ref());
            if tx.send(WorkerOutcome::Snapshot { token, result }).is_err() {
                debug!(%token, "coordinator gone; dropping snapshot");
            }
        });

        token
    }

    /// Dispatch `brew services <action> <target>`. A refresh follows once
    /// the command's process has exited.
    pub fn request_control(
        &mut self,
        target: ServiceTarget,
        action: ServiceAction,
        privilege: Privilege,
    ) {
        let id = self.next_mutation;
        self.next_mutation += 1;
        self.mutations.push(Mutation {
            id,
            target: target.clone(),
            action,
        });

        let elevated = privilege == Privilege::Elevated;
        self.record(LogEvent::ControlIssued {
            target: target.clone(),
            action,
            elevated,
        });
        info!(%target, %action, elevated, "control command requested");

        let locator = self.locator.clone();
        let runner = Arc::clone(&self.runner);
        let elevation = elevated.then(|| Arc::clone(&self.elevation));
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = run_control(
                &locator,
                runner.as_ref(),
                elevation.as_deref(),
                &target,
                action,
            );
            let outcome = WorkerOutcome::Control {
                id,
                target,
                action,
                result,
            };
            if tx.send(outcome).is_err() {
                debug!(id, "coordinator gone; dropping control result");
            }
        });
    }

    /// Flip a displayed service: stop it if on, start it if off.
    ///
    /// Services owned by another account are only toggled with
    /// [`Privilege::Elevated`].
    pub fn toggle(
        &mut self,
        name: &str,
        privilege: Privilege,
    ) -> Result<ServiceAction, ToggleError> {
        let row = self
            .rows()
            .iter()
            .find(|row| row.record.name == name)
            .ok_or_else(|| ToggleError::UnknownService(name.to_string()))?;

        let action = match row.state {
            TriState::On => ServiceAction::Stop,
            TriState::Off => ServiceAction::Start,
            TriState::Indeterminate => {
                return Err(ToggleError::Indeterminate {
                    name: name.to_string(),
                    status: row.record.status.to_string(),
                });
            }
        };

        if privilege == Privilege::Unprivileged
            && row.record.owned_by_other(self.display.current_user())
        {
            return Err(ToggleError::ForeignOwner {
                name: name.to_string(),
                owner: row.record.owner.clone(),
            });
        }

        self.request_control(ServiceTarget::Service(name.to_string()), action, privilege);
        Ok(action)
    }

    /// Apply one worker result. Only call from the owning task.
    pub fn handle(&mut self, outcome: WorkerOutcome) -> CoordinatorEvent {
        match outcome {
            WorkerOutcome::Snapshot { token, result } => self.handle_snapshot(token, result),
            WorkerOutcome::Control {
                id,
                target,
                action,
                result,
            } => self.handle_control(id, target, action, result),
        }
    }

    /// Receive and apply results until the phase is back to `Idle`.
    pub async fn settle(&mut self, outcomes: &mut OutcomeReceiver) -> Vec<CoordinatorEvent> {
        let mut events = Vec::new();
        while self.phase() != Phase::Idle {
            let Some(outcome) = outcomes.recv().await else {
                break;
            };
            events.push(self.handle(outcome));
        }
        events
    }

    fn handle_snapshot(
        &mut self,
        token: RefreshToken,
        result: Result<ParseReport, SyncError>,
    ) -> CoordinatorEvent {
        let latest = RefreshToken(self.latest_refresh);
        if token != latest {
            debug!(%token, %latest, "discarding superseded snapshot");
            self.record(LogEvent::RefreshDiscarded {
                token: token.0,
                latest: latest.0,
            });
            return CoordinatorEvent::RefreshDiscarded { token, latest };
        }
        self.awaiting = None;

        match result {
            Ok(report) => {
                let edits = self.display.sync(&report.records);
                let summary = EditSummary::of(&edits);
                self.state = ListState::Ready;
                debug!(
                    %token,
                    services = self.display.len(),
                    inserted = summary.inserted,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "snapshot applied"
                );
                self.record(LogEvent::SnapshotApplied {
                    token: token.0,
                    services: self.display.len(),
                    summary,
                });
                CoordinatorEvent::SnapshotApplied {
                    token,
                    edits,
                    skipped_lines: report.skipped.len(),
                }
            }
            Err(err) => {
                warn!(%token, "refresh failed: {err}");
                self.record(LogEvent::RefreshFailed {
                    token: token.0,
                    reason: err.to_string(),
                });
                self.state = match err {
                    SyncError::ExecutableNotFound { candidates } => {
                        ListState::NotFound { candidates }
                    }
                    other => ListState::SupervisorError {
                        message: other.to_string(),
                    },
                };
                CoordinatorEvent::RefreshFailed { token }
            }
        }
    }

    fn handle_control(
        &mut self,
        id: u64,
        target: ServiceTarget,
        action: ServiceAction,
        result: Result<(), SyncError>,
    ) -> CoordinatorEvent {
        self.mutations.retain(|m| m.id != id);

        let exit_code = match &result {
            Ok(()) => Some(0),
            Err(SyncError::NonZeroExit { code, .. }) => *code,
            Err(_) => None,
        };
        self.record(LogEvent::ControlFinished {
            target: target.clone(),
            action,
            success: result.is_ok(),
            exit_code,
        });

        let notice = match result {
            Ok(()) => {
                info!(%target, %action, "control command succeeded");
                None
            }
            Err(err) => {
                warn!(%target, %action, "control command failed: {err}");
                Some(Notice {
                    title: format!("Could not {action} {target}"),
                    detail: err.to_string(),
                })
            }
        };

        let refresh = self.request_refresh();
        CoordinatorEvent::ControlFinished {
            target,
            action,
            notice,
            refresh,
        }
    }

    fn record(&self, event: LogEvent) {
        let Some(log) = &self.activity_log else {
            return;
        };
        if let Err(err) = log.log(event) {
            warn!("failed to write activity log {}: {err:#}", log.path().display());
        }
    }
}

fn list_args() -> Vec<String> {
    vec!["services".to_string(), "list".to_string()]
}

fn control_args(target: &ServiceTarget, action: ServiceAction) -> Vec<String> {
    vec![
        "services".to_string(),
        action.as_str().to_string(),
        target.as_arg().to_string(),
    ]
}

fn fetch_snapshot(
    locator: &ExecutableLocator,
    runner: &dyn CommandRunner,
) -> Result<ParseReport, SyncError> {
    let executable = locator.locate()?;
    let args = list_args();
    let output = runner.run(&executable, &args)?;
    if !output.success() {
        return Err(SyncError::NonZeroExit {
            command: describe(&executable, &args),
            code: output.exit_code,
        });
    }
    Ok(parse_report(&output.stdout_lossy()))
}

fn run_control(
    locator: &ExecutableLocator,
    runner: &dyn CommandRunner,
    elevation: Option<&dyn Elevation>,
    target: &ServiceTarget,
    action: ServiceAction,
) -> Result<(), SyncError> {
    let executable = locator.locate()?;
    let args = control_args(target, action);
    let output = match elevation {
        Some(elevation) => elevation.run_elevated(&shell_command_line(&executable, &args))?,
        None => runner.run(&executable, &args)?,
    };
    if output.success() {
        Ok(())
    } else {
        Err(SyncError::NonZeroExit {
            command: describe(&executable, &args),
            code: output.exit_code,
        })
    }
}
