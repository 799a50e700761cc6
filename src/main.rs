use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use brewbar::cli::{Cli, Command};
use brewbar::config::Config;
use brewbar::coordinator::{
    CoordinatorEvent, CoordinatorSettings, ListState, OutcomeReceiver, Privilege, SyncCoordinator,
};
use brewbar::locator::ExecutableLocator;
use brewbar::log::ActivityLog;
use brewbar::render::{render_notice, render_view_human, render_view_json};
use brewbar::runner::{CommandRunner, SystemRunner, TemplateElevation};
use brewbar::watch;

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no .brewbar/config.toml found)".to_string())
}

fn push_kv(output: &mut String, key: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("  {key:<20} {value}\n"));
}

fn render_config_human(
    config: &Config,
    locator: &ExecutableLocator,
    config_path: Option<&Path>,
) -> String {
    let mut output = String::new();

    output.push_str("Supervisor\n");
    for (idx, candidate) in locator.candidates().iter().enumerate() {
        let key = if idx == 0 { "candidates" } else { "" };
        push_kv(&mut output, key, candidate.display());
    }
    match locator.locate() {
        Ok(path) => push_kv(&mut output, "located", path.display()),
        Err(_) => push_kv(&mut output, "located", "(not found)"),
    }
    push_kv(&mut output, "user", config.current_user());
    output.push('\n');

    output.push_str("Refresh\n");
    push_kv(&mut output, "interval", format!("{}s", config.refresh.interval_secs));
    output.push('\n');

    output.push_str("Elevation\n");
    push_kv(&mut output, "program", &config.elevation.program);
    push_kv(&mut output, "args", config.elevation.args.join(", "));
    push_kv(&mut output, "template", &config.elevation.template);
    push_kv(&mut output, "escape", config.elevation.escape.as_str());
    output.push('\n');

    output.push_str("Activity Log\n");
    match &config.log.path {
        Some(path) => push_kv(&mut output, "path", path.display()),
        None => push_kv(&mut output, "path", "(disabled)"),
    }
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "path", config_source_label(config_path));

    output
}

fn render_config_json(
    config: &Config,
    locator: &ExecutableLocator,
    config_path: Option<&Path>,
) -> Result<String> {
    let payload = serde_json::json!({
        "supervisor": {
            "candidates": locator.candidates(),
            "located": locator.locate().ok(),
            "user": config.current_user(),
        },
        "refresh": &config.refresh,
        "elevation": &config.elevation,
        "log": &config.log,
        "source_path": config_source_label(config_path),
    });

    serde_json::to_string_pretty(&payload).context("failed to serialize config to JSON")
}

fn build_coordinator(
    config: &Config,
    locator: ExecutableLocator,
) -> Result<(SyncCoordinator, OutcomeReceiver)> {
    let activity_log = config
        .log
        .path
        .as_deref()
        .map(ActivityLog::new)
        .transpose()?;
    if let Some(log) = &activity_log {
        info!("writing activity log to {}", log.path().display());
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let elevation = TemplateElevation::new(
        config.elevation.program.clone(),
        config.elevation.args.clone(),
        config.elevation.template.clone(),
        Arc::clone(&runner),
    )
    .with_escape(config.elevation.escape);

    Ok(SyncCoordinator::new(
        CoordinatorSettings {
            locator,
            current_user: config.current_user(),
            activity_log,
        },
        runner,
        Arc::new(elevation),
    ))
}

/// Print notices from settled events; returns whether any command failed.
fn print_notices(events: &[CoordinatorEvent]) -> bool {
    let mut failed = false;
    for event in events {
        if let CoordinatorEvent::ControlFinished {
            notice: Some(notice),
            ..
        } = event
        {
            eprint!("{}", render_notice(notice));
            failed = true;
        }
    }
    failed
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let is_config_command = matches!(&cli.command, Command::Config { .. });

    let filter = match cli.verbose {
        0 if is_config_command => "brewbar=warn",
        0 => "brewbar=info",
        1 => "brewbar=debug",
        _ => "brewbar=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (config, config_path) = match &cli.config {
        Some(path) => (Config::load_file(path)?, Some(path.clone())),
        None => {
            let cwd = std::env::current_dir()
                .context("failed to get current directory (was it deleted?)")?;
            Config::load(&cwd)?
        }
    };

    if !is_config_command || cli.verbose > 0 {
        match config_path {
            Some(ref p) => info!("loaded config from {}", p.display()),
            None => info!("no .brewbar/config.toml found, using defaults"),
        }
    }

    let locator = ExecutableLocator::with_overrides(config.supervisor.executable.paths());

    if let Command::Config { json } = cli.command {
        if json {
            println!("{}", render_config_json(&config, &locator, config_path.as_deref())?);
        } else {
            print!("{}", render_config_human(&config, &locator, config_path.as_deref()));
        }
        return Ok(());
    }

    let (mut coordinator, mut outcomes) = build_coordinator(&config, locator)?;

    match &cli.command {
        Command::List { json } => {
            coordinator.request_refresh();
            coordinator.settle(&mut outcomes).await;
            if *json {
                println!("{}", render_view_json(&coordinator.view())?);
            } else {
                print!("{}", render_view_human(&coordinator.view()));
            }
            if !matches!(coordinator.state(), ListState::Ready) {
                std::process::exit(1);
            }
        }
        Command::Toggle { name, elevated } => {
            coordinator.request_refresh();
            coordinator.settle(&mut outcomes).await;

            let privilege = if *elevated {
                Privilege::Elevated
            } else {
                Privilege::Unprivileged
            };
            let action = coordinator.toggle(name, privilege)?;
            info!(service = %name, %action, "toggling");
            let events = coordinator.settle(&mut outcomes).await;
            let failed = print_notices(&events);
            print!("{}", render_view_human(&coordinator.view()));
            if failed {
                std::process::exit(1);
            }
        }
        Command::Watch => {
            let interval = match config.refresh.interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            let session = watch::run(&mut coordinator, &mut outcomes, stdin, &mut stdout, interval);
            tokio::select! {
                result = session => result?,
                _ = tokio::signal::ctrl_c() => {
                    // The pending stdin read would block runtime shutdown.
                    info!("interrupted; leaving watch");
                    std::process::exit(0);
                }
            }
        }
        command => {
            let Some((action, args)) = command.control() else {
                return Ok(());
            };
            let privilege = if args.elevated {
                Privilege::Elevated
            } else {
                Privilege::Unprivileged
            };
            coordinator.request_control(args.target(), action, privilege);
            let events = coordinator.settle(&mut outcomes).await;
            let failed = print_notices(&events);
            print!("{}", render_view_human(&coordinator.view()));
            if failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
