// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queue maintenance commands.

use fl_core::MutationStore;

use super::{format_stamp, report_drain, Context};
use crate::cli::OutputFormat;
use crate::error::{Error, Result};

/// List pending operations, oldest first.
pub fn list(ctx: &Context, output: OutputFormat) -> Result<()> {
    let ops = ctx.queue.list()?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ops)?),
        OutputFormat::Text => {
            if ops.is_empty() {
                println!("No pending operations");
                return Ok(());
            }
            for op in &ops {
                let mut line = format!(
                    "{}  {:<6}  {}  {}",
                    op.id,
                    op.kind,
                    op.target,
                    format_stamp(op.enqueued_at)
                );
                if let Some(mark) = &op.failure {
                    line.push_str(&format!(
                        "  [failed after {} attempts: {}]",
                        mark.attempts, mark.reason
                    ));
                }
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// Drop every pending operation.
pub fn clear(ctx: &Context) -> Result<()> {
    let count = ctx.queue.len()?;
    ctx.queue.clear()?;
    tracing::warn!(count, "cleared pending operations");
    println!("Cleared {} pending operation(s)", count);
    Ok(())
}

/// Clear the failure mark on an operation and replay the queue.
pub async fn retry(ctx: &Context, id: &str) -> Result<()> {
    if !ctx.queue.list()?.iter().any(|op| op.id == id) {
        return Err(Error::OpNotFound(id.to_string()));
    }
    let client = ctx.connect().await?;
    let report = client.engine().retry_failed(id).await?;
    report_drain(report, ctx.queue_len()?)
}

/// List quarantined records.
pub fn quarantined(ctx: &Context, output: OutputFormat) -> Result<()> {
    let records = ctx.queue.quarantined()?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No quarantined operations");
                return Ok(());
            }
            for record in &records {
                let subject = match (&record.op, &record.raw) {
                    (Some(op), _) => format!("{} {} {}", op.id, op.kind, op.target),
                    (None, Some(raw)) => format!("raw line: {}", raw),
                    (None, None) => "unknown record".to_string(),
                };
                println!(
                    "{}  {}  ({})",
                    format_stamp(record.quarantined_at),
                    subject,
                    record.reason
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
