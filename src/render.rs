//! Text and JSON rendering of the coordinator's view for the CLI.

use anyhow::{Context, Result};

use crate::coordinator::{ListState, Notice, Phase, View};
use crate::model::TriState;
use crate::reconcile::Edit;

fn marker(state: TriState) -> &'static str {
    match state {
        TriState::On => "[on ]",
        TriState::Off => "[off]",
        TriState::Indeterminate => "[ ? ]",
    }
}

pub fn render_view_human(view: &View<'_>) -> String {
    let mut output = String::new();

    match view.state {
        ListState::Loading => output.push_str("Loading services...\n"),
        ListState::NotFound { candidates } => {
            output.push_str("Homebrew not found. Checked:\n");
            for candidate in candidates {
                output.push_str(&format!("  {}\n", candidate.display()));
            }
        }
        ListState::SupervisorError { message } => {
            output.push_str(&format!("Supervisor error: {message}\n"));
        }
        ListState::Ready if view.services.is_empty() => {
            output.push_str("No services available\n");
        }
        ListState::Ready => {
            let width = view
                .services
                .iter()
                .map(|row| row.record.name.len())
                .max()
                .unwrap_or(0);
            for row in view.services {
                let mut line = format!(
                    "  {} {:<width$}  {:<8}",
                    marker(row.state),
                    row.record.name,
                    row.record.status.as_str(),
                );
                if !row.record.owner.is_empty() {
                    line.push_str(&format!("  {}", row.record.owner));
                }
                if !row.toggleable {
                    line.push_str("  (locked)");
                }
                output.push_str(line.trim_end());
                output.push('\n');
            }
        }
    }

    match &view.phase {
        Phase::Idle => {}
        Phase::Refreshing => output.push_str("Refreshing...\n"),
        Phase::Mutating { target, action } => {
            output.push_str(&format!("Running {action} for {target}...\n"));
        }
    }

    output
}

pub fn render_view_json(view: &View<'_>) -> Result<String> {
    serde_json::to_string_pretty(view).context("failed to serialize view to JSON")
}

/// One line per edit, as applied by the watch loop.
pub fn render_edits(edits: &[Edit]) -> String {
    let mut output = String::new();
    for edit in edits {
        let line = match edit {
            Edit::Insert { at, record } => {
                format!("+ {at:>3} {} {}", record.name, record.status)
            }
            Edit::Update { at, record } => {
                format!("~ {at:>3} {} {}", record.name, record.status)
            }
            Edit::Delete { at } => format!("- {at:>3}"),
        };
        output.push_str(&line);
        output.push('\n');
    }
    output
}

pub fn render_notice(notice: &Notice) -> String {
    format!(
        "{}\n  {}\n  You will need to resolve the issue manually.\n",
        notice.title, notice.detail
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ServiceAction, ServiceRecord, ServiceStatus, ServiceTarget};
    use crate::reconcile::DisplayList;
    use std::path::PathBuf;

    fn rows() -> DisplayList {
        let mut list = DisplayList::new("andrew");
        list.sync(&[
            ServiceRecord::new("nginx", ServiceStatus::Started, "root"),
            ServiceRecord::new("redis", ServiceStatus::Started, "andrew"),
            ServiceRecord::new("unbound", ServiceStatus::None, ""),
        ]);
        list
    }

    #[test]
    fn ready_view_lists_rows_with_markers() {
        let list = rows();
        let view = View {
            phase: Phase::Idle,
            state: &ListState::Ready,
            services: list.rows(),
        };
        let rendered = render_view_human(&view);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "  [on ] nginx    started   root  (locked)");
        assert_eq!(lines[1], "  [on ] redis    started   andrew");
        assert_eq!(lines[2], "  [off] unbound  none");
    }

    #[test]
    fn empty_error_and_not_found_are_distinct() {
        let empty = render_view_human(&View {
            phase: Phase::Idle,
            state: &ListState::Ready,
            services: &[],
        });
        let error = render_view_human(&View {
            phase: Phase::Idle,
            state: &ListState::SupervisorError {
                message: "boom".into(),
            },
            services: &[],
        });
        let missing = render_view_human(&View {
            phase: Phase::Idle,
            state: &ListState::NotFound {
                candidates: vec![PathBuf::from("/usr/local/bin/brew")],
            },
            services: &[],
        });

        assert_eq!(empty, "No services available\n");
        assert_eq!(error, "Supervisor error: boom\n");
        assert!(missing.starts_with("Homebrew not found"));
        assert!(missing.contains("/usr/local/bin/brew"));
    }

    #[test]
    fn busy_phases_add_a_footer() {
        let refreshing = render_view_human(&View {
            phase: Phase::Refreshing,
            state: &ListState::Loading,
            services: &[],
        });
        assert!(refreshing.ends_with("Refreshing...\n"));

        let mutating = render_view_human(&View {
            phase: Phase::Mutating {
                target: ServiceTarget::All,
                action: ServiceAction::Restart,
            },
            state: &ListState::Ready,
            services: &[],
        });
        assert!(mutating.ends_with("Running restart for all services...\n"));
    }

    #[test]
    fn edits_render_one_line_each() {
        let edits = vec![
            Edit::Insert {
                at: 0,
                record: ServiceRecord::new("redis", ServiceStatus::Started, ""),
            },
            Edit::Delete { at: 1 },
        ];
        assert_eq!(render_edits(&edits), "+   0 redis started\n-   1\n");
    }
}
