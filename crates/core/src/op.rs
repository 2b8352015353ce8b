// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Mutation operations queued for replay against the remote.
//!
//! A [`MutationOperation`] is created when a write cannot be confirmed
//! against the remote immediately, and destroyed when the sync engine
//! confirms the remote applied it. The persisted record is:
//!
//! ```text
//! {"id":"op-…","kind":"create","target":"training/2024-06-01","payload":{…},"enqueuedAt":1717200000000}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The kind of write being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }

    /// Returns true if operations of this kind must carry a payload.
    pub fn requires_payload(&self) -> bool {
        !matches!(self, MutationKind::Delete)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" => Ok(MutationKind::Create),
            "update" => Ok(MutationKind::Update),
            "delete" => Ok(MutationKind::Delete),
            _ => Err(Error::InvalidKind(s.to_string())),
        }
    }
}

/// Marks an operation that exhausted its retry budget.
///
/// A marked operation stays in the queue (it is never silently dropped)
/// and halts draining until the mark is cleared by a manual retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureMark {
    pub reason: String,
    pub attempts: u32,
    pub marked_at: u64,
}

/// A write waiting to be stamped and queued.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationDraft {
    pub kind: MutationKind,
    pub target: String,
    pub payload: Option<Value>,
}

impl MutationDraft {
    pub fn new(kind: MutationKind, target: impl Into<String>, payload: Option<Value>) -> Self {
        MutationDraft {
            kind,
            target: target.into(),
            payload,
        }
    }

    pub fn create(target: impl Into<String>, payload: Value) -> Self {
        Self::new(MutationKind::Create, target, Some(payload))
    }

    pub fn update(target: impl Into<String>, payload: Value) -> Self {
        Self::new(MutationKind::Update, target, Some(payload))
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(MutationKind::Delete, target, None)
    }

    /// Checks the shape rules shared by drafts and queued operations.
    pub fn validate(&self) -> Result<()> {
        validate_shape(self.kind, &self.target, self.payload.as_ref())
    }

    /// Stamps the draft into a queued operation.
    pub fn into_operation(self, id: String, enqueued_at: u64) -> MutationOperation {
        MutationOperation {
            id,
            kind: self.kind,
            target: self.target,
            payload: self.payload,
            enqueued_at,
            failure: None,
        }
    }
}

/// A queued write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOperation {
    /// Unique identifier, assigned at enqueue time.
    pub id: String,
    pub kind: MutationKind,
    /// Logical resource path the operation applies to.
    pub target: String,
    /// Request body; absent for deletes.
    pub payload: Option<Value>,
    /// Strictly increasing sequence stamp.
    pub enqueued_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureMark>,
}

impl MutationOperation {
    /// Returns true if the operation exhausted its retries.
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Checks that the operation can be sent to the remote.
    ///
    /// Creates and updates need a payload, deletes must not carry one, and
    /// the target must be a non-empty path.
    pub fn validate(&self) -> Result<()> {
        validate_shape(self.kind, &self.target, self.payload.as_ref())
    }

    /// Encodes the request body, if any.
    pub fn encode_body(&self) -> Result<Option<Vec<u8>>> {
        self.validate()?;
        match &self.payload {
            Some(value) => Ok(Some(serde_json::to_vec(value)?)),
            None => Ok(None),
        }
    }
}

fn validate_shape(kind: MutationKind, target: &str, payload: Option<&Value>) -> Result<()> {
    let target = target.trim();
    if target.is_empty() {
        return Err(Error::InvalidMutation("target must not be empty".to_string()));
    }
    if target.contains("..") || target.chars().any(char::is_whitespace) {
        return Err(Error::InvalidMutation(format!(
            "target '{target}' is not a resource path"
        )));
    }
    match (kind.requires_payload(), payload) {
        (true, None) | (true, Some(Value::Null)) => Err(Error::InvalidMutation(format!(
            "{kind} of '{target}' requires a payload"
        ))),
        (false, Some(value)) if !value.is_null() => Err(Error::InvalidMutation(format!(
            "{kind} of '{target}' must not carry a payload"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "op_tests.rs"]
mod tests;
