// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{format_stamp, Context};
use crate::cli::OutputFormat;
use crate::client::ReadSource;
use crate::error::Result;

pub async fn run(ctx: &Context, key: &str, output: OutputFormat) -> Result<()> {
    let client = ctx.connect().await?;
    let result = client.read(key).await?;
    let source = match result.source {
        ReadSource::Remote => "remote",
        ReadSource::Cache => "cache",
    };

    match output {
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(&result.value)?);
            match result.last_refreshed {
                Some(ms) => println!("(from cache, refreshed {})", format_stamp(ms)),
                None => println!("(from {})", source),
            }
        }
        OutputFormat::Json => {
            let body = json!({
                "key": key,
                "source": source,
                "lastRefreshed": result.last_refreshed,
                "value": result.value,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}
