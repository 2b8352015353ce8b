// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::Context;
use crate::connectivity::{spawn_probe_loop, ConnectivityMonitor};
use crate::error::Result;
use crate::sync::{StopReason, SyncEvent};

/// Probe the remote and drain on every reachable transition until Ctrl-C.
pub async fn run(ctx: &Context) -> Result<()> {
    let gateway = ctx.gateway()?;
    let monitor = Arc::new(ConnectivityMonitor::new(true));
    let client = ctx.client(Arc::clone(&gateway), Arc::clone(&monitor));
    let engine = Arc::clone(client.engine());
    let mut events = engine.subscribe_events();
    let mut reachability = monitor.subscribe();

    let cancel = CancellationToken::new();
    let prober = spawn_probe_loop(
        Arc::clone(&monitor),
        gateway,
        ctx.config.sync.probe_interval(),
        cancel.clone(),
    );
    let runner = engine.spawn(cancel.clone());

    println!(
        "Watching {} ({} pending), press Ctrl-C to stop",
        ctx.config.remote.url,
        ctx.queue_len()?
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = reachability.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("Remote is {}", *reachability.borrow_and_update());
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    let _ = prober.await;
    let _ = runner.await;
    println!("Stopped");
    Ok(())
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::Applied { id, target } => println!("Applied {} ({})", id, target),
        SyncEvent::RetryScheduled { id, attempt, delay } => println!(
            "Retrying {} in {}ms (attempt {})",
            id,
            delay.as_millis(),
            attempt
        ),
        SyncEvent::Quarantined { id, reason } => println!("Quarantined {}: {}", id, reason),
        SyncEvent::Stopped(StopReason::AuthRejected { id }) => {
            println!("Remote rejected credentials while applying {}", id)
        }
        SyncEvent::Stopped(StopReason::Exhausted { id, attempts }) => println!(
            "{} failed after {} attempts; run 'fitlog queue retry {}'",
            id, attempts, id
        ),
        SyncEvent::Stopped(_) | SyncEvent::StateChanged(_) => {}
    }
}
