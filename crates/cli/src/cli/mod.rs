// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "fitlog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline-first sync client for the fitness log")]
#[command(
    long_about = "Offline-first sync client for the fitness log.\n\n\
    Writes that cannot reach the remote are queued on disk and replayed in order \
    once it is reachable again. Reads fall back to the last cached value."
)]
pub struct Cli {
    /// State directory holding the queue, cache, config and log
    #[arg(long = "state-dir", global = true, value_name = "path")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show reachability, pending operations and cache size
    Status {
        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Inspect and manage the pending mutation queue
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Inspect and clear the response cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Write to the remote, queueing the change if it cannot be applied now
    #[command(subcommand)]
    Write(WriteCommand),

    /// Read a value from the remote, falling back to the cache
    Read {
        /// Resource key, e.g. user/1
        #[arg(value_parser = non_empty_string)]
        key: String,

        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Replay queued mutations now
    Sync,

    /// Stay running, probing the remote and replaying whenever it is reachable
    Watch,
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// List pending operations, oldest first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Drop every pending operation
    Clear,

    /// Clear the failure mark on an operation and replay the queue
    Retry {
        /// Operation id, as shown by 'fitlog queue list'
        #[arg(value_parser = non_empty_string)]
        id: String,
    },

    /// List operations moved aside because they could not be encoded
    Quarantined {
        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// List cached keys, most recently refreshed first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Print the cached value for a key
    Get {
        #[arg(value_parser = non_empty_string)]
        key: String,
    },

    /// Drop every cached value
    Clear,
}

#[derive(Subcommand)]
pub enum WriteCommand {
    /// Create a resource
    Create {
        #[arg(value_parser = non_empty_string)]
        target: String,
        /// JSON payload
        json: String,
    },

    /// Update a resource
    Update {
        #[arg(value_parser = non_empty_string)]
        target: String,
        /// JSON payload
        json: String,
    },

    /// Delete a resource
    Delete {
        #[arg(value_parser = non_empty_string)]
        target: String,
    },
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
