// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Operation ID generation.

use sha2::{Digest, Sha256};

/// Prefix carried by every operation ID.
pub const OP_ID_PREFIX: &str = "op";

/// Generate an operation ID from the client node, target and stamp.
/// Format: `op-{hash}` where hash is the first 16 hex chars of
/// SHA256(node, target, enqueued_at).
pub fn generate_id(node: &str, target: &str, enqueued_at: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(node.as_bytes());
    hasher.update([0u8]);
    hasher.update(target.as_bytes());
    hasher.update([0u8]);
    hasher.update(enqueued_at.to_be_bytes());
    let hash = hasher.finalize();
    format!("{}-{}", OP_ID_PREFIX, hex::encode(&hash[..8]))
}

/// Generate a unique ID, handling collisions by appending incrementing suffix.
pub fn generate_unique_id<F>(node: &str, target: &str, enqueued_at: u64, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    let base_id = generate_id(node, target, enqueued_at);

    if !exists(&base_id) {
        return base_id;
    }

    let mut suffix = 2;
    loop {
        let id = format!("{}-{}", base_id, suffix);
        if !exists(&id) {
            return id;
        }
        suffix += 1;
    }
}

/// Generate a node identifier for a client installation.
///
/// Mixes the installation path, the process ID and the current time so two
/// installations initialized at the same moment still differ.
pub fn generate_node_id(seed: &str, now_ms: u64) -> String {
    let input = format!("{}:{}:{}", seed, std::process::id(), now_ms);
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..6])
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
