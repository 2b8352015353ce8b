// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// A remote nobody listens on.
pub const DEAD_REMOTE: &str = "http://127.0.0.1:9";

pub fn fitlog(state: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("fitlog");
    cmd.arg("--state-dir").arg(state.path());
    cmd.env_remove("FITLOG_STATE_DIR");
    cmd
}

/// Write `fitlog.toml` pointing at the given remote with fast retries.
pub fn write_config(dir: &Path, url: &str) {
    let config = format!(
        "[remote]\nurl = \"{}\"\nrequest_timeout_ms = 1000\n\n\
         [sync]\nbase_delay_ms = 1\nmax_delay_ms = 5\nmax_attempts = 2\n",
        url
    );
    std::fs::write(dir.join("fitlog.toml"), config).unwrap();
}

/// State directory configured against a remote that refuses connections.
pub fn offline_state() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), DEAD_REMOTE);
    temp
}

/// Minimal HTTP remote that answers every mutation or read with the given
/// status and an empty body, recording `METHOD /path` for each
/// request. The `/health` probe always answers 200.
pub struct FakeRemote {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeRemote {
    pub fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                let mut content_length = 0usize;
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).unwrap_or(0) == 0 {
                        break;
                    }
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap_or(0);
                        }
                    }
                }
                let mut body = vec![0u8; content_length];
                let _ = reader.read_exact(&mut body);

                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default();
                let path = parts.next().unwrap_or_default();
                seen.lock().unwrap().push(format!("{} {}", method, path));
                let status = if path == "/health" { 200 } else { status };

                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        FakeRemote { url, requests }
    }

    /// Requests seen so far, excluding reachability probes.
    pub fn mutations(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.ends_with("/health"))
            .cloned()
            .collect()
    }
}
