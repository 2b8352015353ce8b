// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Status overview.

use fl_core::MutationStore;
use serde_json::json;

use super::Context;
use crate::cli::OutputFormat;
use crate::error::Result;

pub async fn run(ctx: &Context, output: OutputFormat) -> Result<()> {
    let client = ctx.connect().await?;
    let reachability = client.monitor().state();
    let pending = ctx.queue.list()?;
    let failed: Vec<&str> = pending
        .iter()
        .filter(|op| op.is_failed())
        .map(|op| op.id.as_str())
        .collect();
    let quarantined = ctx.queue.quarantined()?.len();
    let cached = ctx.cache.len()?;

    match output {
        OutputFormat::Text => {
            println!("Remote: {} ({})", ctx.config.remote.url, reachability);
            println!("State dir: {}", ctx.paths.root.display());
            println!("Pending ops: {}", pending.len());
            if let Some(oldest) = pending.first() {
                println!("Oldest pending: {}", super::format_stamp(oldest.enqueued_at));
            }
            if !failed.is_empty() {
                println!("Failed ops: {} ({})", failed.len(), failed.join(", "));
            }
            if quarantined > 0 {
                println!("Quarantined ops: {}", quarantined);
            }
            println!("Cached entries: {}", cached);
        }
        OutputFormat::Json => {
            let status = json!({
                "remote": ctx.config.remote.url,
                "reachability": reachability.as_str(),
                "stateDir": ctx.paths.root,
                "pending": pending.len(),
                "failed": failed,
                "quarantined": quarantined,
                "cached": cached,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
