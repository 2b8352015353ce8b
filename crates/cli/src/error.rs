// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the offline client.
//!
//! Every failure a caller can observe maps to one variant here. Storage
//! errors from the queue and cache arrive wrapped in [`Error::Store`].

use thiserror::Error;

/// Errors surfaced by the offline client, the sync engine and the CLI.
#[derive(Debug, Error)]
pub enum Error {
    #[error("remote is unreachable and nothing usable is cached")]
    Connectivity,

    #[error("remote rejected our credentials{}\n  hint: refresh the token in fitlog.toml, then run 'fitlog sync'", id.as_ref().map(|id| format!(" while applying {id}")).unwrap_or_default())]
    Auth { id: Option<String> },

    #[error("remote failed with status {code}")]
    Remote { code: u16 },

    #[error("operation {id} failed after {attempts} attempts\n  hint: run 'fitlog queue retry {id}' once the remote has recovered")]
    ExhaustedRetry { id: String, attempts: u32 },

    #[error("cannot encode mutation for '{subject}': {reason}")]
    Serialization { subject: String, reason: String },

    #[error("operation not found: {0}")]
    OpNotFound(String),

    #[error("nothing cached for '{0}'")]
    NotCached(String),

    #[error("invalid JSON payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Store(#[from] fl_core::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for failures the sync engine replays automatically.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connectivity | Error::Remote { .. })
    }
}

/// A specialized Result type for fitlog operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
