// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::{report_drain, Context};
use crate::error::Result;

/// Replay queued mutations now.
pub async fn run(ctx: &Context) -> Result<()> {
    let client = ctx.connect().await?;
    if !client.monitor().is_reachable() {
        println!(
            "Remote {} is unreachable; {} operation(s) pending",
            ctx.config.remote.url,
            ctx.queue_len()?
        );
        return Ok(());
    }
    let report = client.engine().trigger().await?;
    report_drain(report, ctx.queue_len()?)
}
