// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! fitlog - An offline-first sync client for a fitness log.
//!
//! Writes that cannot reach the remote service are kept in a durable queue
//! and replayed in order once it is reachable again. Reads fall back to the
//! last value cached from a successful read or sync.
//!
//! # Main Components
//!
//! - [`OfflineClient`] - Write and read entry points
//! - [`SyncEngine`] - Replays the queue against the remote
//! - [`ConnectivityMonitor`] - Tracks whether the remote can be used
//! - [`Gateway`] - Remote service boundary, with [`HttpGateway`] for production
//! - [`Config`] - Settings loaded from `fitlog.toml` in the state directory
//!
//! # Usage
//!
//! ```rust,ignore
//! use fitlog::{ConnectivityMonitor, HttpGateway, OfflineClient};
//!
//! let client = OfflineClient::new(queue, cache, gateway, monitor, policy);
//! match client.create("training/2024-06-01", payload).await? {
//!     WriteReceipt::Applied(value) => println!("saved {value}"),
//!     WriteReceipt::Queued(id) => println!("will sync {id} later"),
//! }
//! ```

mod cli;
mod commands;

pub mod client;
pub mod config;
pub mod connectivity;
pub mod env;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod sync;

#[cfg(test)]
mod test_helpers;

pub use cli::{CacheCommand, Cli, Command, OutputFormat, QueueCommand, WriteCommand};
pub use client::{OfflineClient, ReadResult, ReadSource, WriteReceipt};
pub use config::{resolve_state_dir, Config, StatePaths};
pub use connectivity::{ConnectivityMonitor, Reachability};
pub use error::{Error, Result};
pub use gateway::{Gateway, HttpGateway, Outcome};
pub use sync::{BackoffPolicy, DrainReport, StopReason, SyncEngine, SyncEvent, SyncState};

use std::path::Path;

use fl_core::MutationDraft;

use commands::Context;

/// Execute a CLI command against a state directory. This is the main entry
/// point for library users and provides a testable way to run commands
/// without process execution.
pub fn run(command: Command, state_dir: &Path) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(format!("tokio: {}", e))))?;
    let ctx = Context::open(state_dir)?;
    runtime.block_on(dispatch(&ctx, command))
}

async fn dispatch(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Status { output } => commands::status::run(ctx, output).await,
        Command::Queue(cmd) => match cmd {
            QueueCommand::List { output } => commands::queue::list(ctx, output),
            QueueCommand::Clear => commands::queue::clear(ctx),
            QueueCommand::Retry { id } => commands::queue::retry(ctx, &id).await,
            QueueCommand::Quarantined { output } => commands::queue::quarantined(ctx, output),
        },
        Command::Cache(cmd) => match cmd {
            CacheCommand::List { output } => commands::cache::list(ctx, output),
            CacheCommand::Get { key } => commands::cache::get(ctx, &key),
            CacheCommand::Clear => commands::cache::clear(ctx),
        },
        Command::Write(cmd) => {
            let draft = match cmd {
                WriteCommand::Create { target, json } => {
                    MutationDraft::create(target, commands::write::parse_payload(&json)?)
                }
                WriteCommand::Update { target, json } => {
                    MutationDraft::update(target, commands::write::parse_payload(&json)?)
                }
                WriteCommand::Delete { target } => MutationDraft::delete(target),
            };
            commands::write::run(ctx, draft).await
        }
        Command::Read { key, output } => commands::read::run(ctx, &key, output).await,
        Command::Sync => commands::sync::run(ctx).await,
        Command::Watch => commands::watch::run(ctx).await,
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
