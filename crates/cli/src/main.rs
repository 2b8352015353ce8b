// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::Parser;
use fitlog::logging::setup_logging;
use fitlog::{resolve_state_dir, Cli, StatePaths};

fn main() {
    let cli = Cli::parse();
    let state_dir = resolve_state_dir(cli.state_dir.as_deref());
    setup_logging(&StatePaths::new(&state_dir).log);

    if let Err(e) = fitlog::run(cli.command, &state_dir) {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
