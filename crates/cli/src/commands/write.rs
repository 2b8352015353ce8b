// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use fl_core::MutationDraft;
use serde_json::Value;

use super::Context;
use crate::client::WriteReceipt;
use crate::error::{Error, Result};

/// Parse a JSON payload given on the command line.
pub fn parse_payload(json: &str) -> Result<Value> {
    serde_json::from_str(json).map_err(|e| Error::InvalidPayload(e.to_string()))
}

pub async fn run(ctx: &Context, draft: MutationDraft) -> Result<()> {
    let client = ctx.connect().await?;
    match client.write(draft).await? {
        WriteReceipt::Applied(value) => {
            println!("Applied");
            if !value.is_null() {
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        WriteReceipt::Queued(id) => {
            println!("Queued {}", id);
            // A queued write is replayed now if the remote answered the probe.
            if client.monitor().is_reachable() {
                let report = client.engine().trigger().await?;
                super::report_drain(report, ctx.queue_len()?)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "write_tests.rs"]
mod tests;
