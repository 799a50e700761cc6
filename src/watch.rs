//! `brewbar watch`: a long-running session driven by stdin commands.
//!
//! The loop is the single owner of the coordinator. It multiplexes worker
//! results, input lines, and the polling timer; nothing else touches the
//! display list.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{Instant, Interval};
use tracing::debug;

use crate::coordinator::{CoordinatorEvent, OutcomeReceiver, Phase, Privilege, SyncCoordinator};
use crate::model::{ServiceAction, ServiceTarget};
use crate::render::{render_edits, render_notice, render_view_human};

const HELP: &str = "\
commands:
  refresh                      query brew services again
  list                         show the current list
  toggle <name>                stop if started, start if stopped
  start|stop|restart <name|all>
  sudo <command>               run a toggle/start/stop/restart elevated
  quit
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Refresh,
    List,
    Toggle {
        name: String,
        privilege: Privilege,
    },
    Control {
        target: ServiceTarget,
        action: ServiceAction,
        privilege: Privilege,
    },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchParseError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{0}' needs a service name")]
    MissingName(String),
    #[error("'sudo' only applies to toggle, start, stop and restart")]
    NotElevatable,
}

/// Parse one input line. Blank lines parse as `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<WatchCommand>, WatchParseError> {
    let mut words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }

    let privilege = if words[0] == "sudo" {
        words.remove(0);
        Privilege::Elevated
    } else {
        Privilege::Unprivileged
    };
    let Some((&verb, rest)) = words.split_first() else {
        return Err(WatchParseError::MissingName("sudo".to_string()));
    };
    let name = rest.first().map(|name| name.to_string());

    let action = match verb {
        "start" => Some(ServiceAction::Start),
        "stop" => Some(ServiceAction::Stop),
        "restart" => Some(ServiceAction::Restart),
        _ => None,
    };

    let command = match (verb, action) {
        (_, Some(action)) => {
            let name = name.ok_or_else(|| WatchParseError::MissingName(verb.to_string()))?;
            let target = match name.as_str() {
                "all" | "--all" => ServiceTarget::All,
                _ => ServiceTarget::Service(name),
            };
            WatchCommand::Control {
                target,
                action,
                privilege,
            }
        }
        ("toggle" | "t", None) => WatchCommand::Toggle {
            name: name.ok_or_else(|| WatchParseError::MissingName(verb.to_string()))?,
            privilege,
        },
        _ if privilege == Privilege::Elevated => return Err(WatchParseError::NotElevatable),
        ("refresh" | "r", None) => WatchCommand::Refresh,
        ("list" | "ls", None) => WatchCommand::List,
        ("help" | "?", None) => WatchCommand::Help,
        ("quit" | "q" | "exit", None) => WatchCommand::Quit,
        _ => return Err(WatchParseError::Unknown(verb.to_string())),
    };
    Ok(Some(command))
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Run the watch session until `quit`, or until input closes and all
/// outstanding work has settled.
pub async fn run<R, W>(
    coordinator: &mut SyncCoordinator,
    outcomes: &mut OutcomeReceiver,
    input: R,
    out: &mut W,
    interval: Option<Duration>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut ticker =
        interval.map(|period| tokio::time::interval_at(Instant::now() + period, period));
    let mut input_open = true;

    coordinator.request_refresh();
    write!(out, "{}", render_view_human(&coordinator.view()))?;

    loop {
        tokio::select! {
            Some(outcome) = outcomes.recv() => {
                let event = coordinator.handle(outcome);
                report(coordinator, &event, out)?;
            }
            line = lines.next_line(), if input_open => {
                match line? {
                    None => input_open = false,
                    Some(line) => match parse_command(&line) {
                        Ok(Some(WatchCommand::Quit)) => break,
                        Ok(Some(command)) => execute(coordinator, command, out)?,
                        Ok(None) => {}
                        Err(err) => writeln!(out, "{err}")?,
                    },
                }
            }
            _ = tick(&mut ticker) => {
                if coordinator.phase() == Phase::Idle {
                    coordinator.request_refresh();
                } else {
                    debug!("skipping scheduled refresh; work still in flight");
                }
            }
        }
        out.flush()?;

        if !input_open && coordinator.phase() == Phase::Idle {
            break;
        }
    }

    Ok(())
}

fn execute<W: Write>(
    coordinator: &mut SyncCoordinator,
    command: WatchCommand,
    out: &mut W,
) -> Result<()> {
    match command {
        WatchCommand::Refresh => {
            coordinator.request_refresh();
        }
        WatchCommand::List => write!(out, "{}", render_view_human(&coordinator.view()))?,
        WatchCommand::Toggle { name, privilege } => match coordinator.toggle(&name, privilege) {
            Ok(action) => writeln!(out, "{action} {name}...")?,
            Err(err) => writeln!(out, "{err}")?,
        },
        WatchCommand::Control {
            target,
            action,
            privilege,
        } => {
            writeln!(out, "{action} {target}...")?;
            coordinator.request_control(target, action, privilege);
        }
        WatchCommand::Help => write!(out, "{HELP}")?,
        WatchCommand::Quit => {}
    }
    Ok(())
}

fn report<W: Write>(
    coordinator: &SyncCoordinator,
    event: &CoordinatorEvent,
    out: &mut W,
) -> Result<()> {
    match event {
        CoordinatorEvent::SnapshotApplied {
            edits,
            skipped_lines,
            ..
        } => {
            write!(out, "{}", render_edits(edits))?;
            if *skipped_lines > 0 {
                writeln!(out, "({skipped_lines} unreadable line(s) skipped)")?;
            }
        }
        CoordinatorEvent::RefreshFailed { .. } | CoordinatorEvent::RefreshDiscarded { .. } => {}
        CoordinatorEvent::ControlFinished { notice, .. } => {
            if let Some(notice) = notice {
                write!(out, "{}", render_notice(notice))?;
            }
        }
    }

    if coordinator.phase() == Phase::Idle
        && !matches!(event, CoordinatorEvent::RefreshDiscarded { .. })
    {
        write!(out, "{}", render_view_human(&coordinator.view()))?;
    }
    Ok(())
}
