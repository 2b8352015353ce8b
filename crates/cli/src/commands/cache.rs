// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::{format_stamp, Context};
use crate::cli::OutputFormat;
use crate::error::{Error, Result};

/// List cached entries, most recently refreshed first.
pub fn list(ctx: &Context, output: OutputFormat) -> Result<()> {
    let entries = ctx.cache.entries()?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("Cache is empty");
                return Ok(());
            }
            for entry in &entries {
                println!("{}  {}", format_stamp(entry.last_refreshed), entry.key);
            }
        }
    }
    Ok(())
}

/// Print the cached value for a key, without contacting the remote.
pub fn get(ctx: &Context, key: &str) -> Result<()> {
    let entry = ctx
        .cache
        .get(key)?
        .ok_or_else(|| Error::NotCached(key.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&entry.value)?);
    println!("Last refreshed: {}", format_stamp(entry.last_refreshed));
    Ok(())
}

/// Drop every cached value. Pending operations are kept.
pub fn clear(ctx: &Context) -> Result<()> {
    let count = ctx.cache.len()?;
    ctx.cache.clear()?;
    tracing::info!(count, "cache cleared");
    println!("Cleared {} cached entr{}", count, if count == 1 { "y" } else { "ies" });
    Ok(())
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
