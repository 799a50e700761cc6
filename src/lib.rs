//! Homebrew services state synchronization.
//!
//! `brew services list` is polled off the owning task, parsed into
//! [`model::ServiceRecord`]s, and merged into a [`reconcile::DisplayList`]
//! with a minimal edit script. Start/stop/restart commands are serialized
//! with those refreshes by [`coordinator::SyncCoordinator`].

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod locator;
pub mod log;
pub mod model;
pub mod parser;
pub mod reconcile;
pub mod render;
pub mod runner;
pub mod watch;
