// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Line-delimited JSON files backing the mutation queue.
//!
//! Appends are fsynced before returning. Rewrites go through a temp file
//! that is renamed over the original.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// A line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number in the file.
    pub line: usize,
    pub raw: String,
    pub reason: String,
}

/// Appends one record as a line and fsyncs the file.
pub fn append<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let line = serde_json::to_string(record)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    file.sync_all()?;
    Ok(())
}

/// Non-blank lines of a JSONL file with their 1-based line numbers.
///
/// A missing file has no lines.
fn lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if !line.trim().is_empty() {
            out.push((index + 1, line));
        }
    }
    Ok(out)
}

/// Decodes every record, failing on the first line that does not parse.
pub fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    lines(path)?
        .iter()
        .map(|(_, line)| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

/// Decodes every record, setting aside lines that fail to decode.
///
/// I/O errors still fail the whole read.
pub fn read_partitioned<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, Vec<RejectedLine>)> {
    let mut records = Vec::new();
    let mut rejected = Vec::new();
    for (line, raw) in lines(path)? {
        match serde_json::from_str::<T>(&raw) {
            Ok(record) => records.push(record),
            Err(e) => rejected.push(RejectedLine {
                line,
                raw,
                reason: e.to_string(),
            }),
        }
    }
    Ok((records, rejected))
}

/// Writes all records to a JSONL file, replacing existing content.
///
/// The records are written to a sibling temp file, fsynced, and renamed
/// over the target, so readers see either the old or the new content.
pub fn write_all<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        for record in records {
            let json = serde_json::to_string(record)?;
            writeln!(file, "{json}")?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_parent(path);

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Best effort fsync of the parent directory so a rename survives a crash.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
