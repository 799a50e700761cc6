use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::model::{ServiceAction, ServiceTarget};

#[derive(Parser, Debug)]
#[command(
    name = "brewbar",
    about = "Keep Homebrew services in view and toggle them",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use this config file instead of searching for .brewbar/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Query `brew services list` and show the result
    List {
        /// Print the view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start a service (or every service with --all)
    Start(ControlArgs),

    /// Stop a service (or every service with --all)
    Stop(ControlArgs),

    /// Restart a service (or every service with --all)
    Restart(ControlArgs),

    /// Flip a service: stop it if started, start it if stopped
    Toggle {
        /// Service name as shown by `brewbar list`
        name: String,

        /// Run through the elevation wrapper (needed for root-owned services)
        #[arg(long)]
        elevated: bool,
    },

    /// Keep refreshing and accept commands on stdin
    Watch,

    /// Show effective configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ControlArgs {
    /// Service name
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub name: Option<String>,

    /// Act on every service
    #[arg(long)]
    pub all: bool,

    /// Run through the elevation wrapper
    #[arg(long)]
    pub elevated: bool,
}

impl ControlArgs {
    pub fn target(&self) -> ServiceTarget {
        match (&self.name, self.all) {
            (Some(name), false) => ServiceTarget::Service(name.clone()),
            _ => ServiceTarget::All,
        }
    }
}

impl Command {
    /// The control verb and arguments, for start/stop/restart.
    pub fn control(&self) -> Option<(ServiceAction, &ControlArgs)> {
        match self {
            Self::Start(args) => Some((ServiceAction::Start, args)),
            Self::Stop(args) => Some((ServiceAction::Stop, args)),
            Self::Restart(args) => Some((ServiceAction::Restart, args)),
            _ => None,
        }
    }
}
