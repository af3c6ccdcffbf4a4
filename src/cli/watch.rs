use std::io;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::cli::OutputFormat;
use crate::controller::RoombaController;
use crate::error::CliConfigError;
use crate::status::StatusSnapshot;

use super::ui::{Painter, WatchLineView};

/// Arguments for the `watch` command.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many published statuses. If omitted, watch until Ctrl+C.
    #[arg(long)]
    limit: Option<usize>,
}

impl WatchArgs {
    /// Creates watch arguments with an optional status limit.
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit }
    }
}

/// Why a watch ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
enum WatchStopReason {
    #[display("interrupted")]
    Interrupted,
    #[display("reached limit of {_0}")]
    ReachedLimit(usize),
    #[display("status feed closed")]
    FeedClosed,
}

#[derive(Serialize)]
struct WatchLine<'a> {
    index: usize,
    status: &'a StatusSnapshot,
}

/// Executes the `watch` command.
#[instrument(skip_all, level = "debug", fields(limit = ?args.limit))]
pub(crate) async fn run<W>(
    controller: &RoombaController,
    args: &WatchArgs,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let mut updates = controller.subscribe();
    let poller = controller
        .spawn_poller()
        .ok_or(CliConfigError::PollingDisabled)?;

    let watched = watch_updates(&mut updates, args.limit, out, output_format, painter).await;
    poller.stop().await;
    let (printed, stop_reason) = watched?;
    debug!(printed, %stop_reason, "watch finished");

    if output_format == OutputFormat::Pretty {
        writeln!(
            out,
            "{}",
            painter.muted(format!("{printed} status update(s); {stop_reason}"))
        )?;
    }
    Ok(())
}

async fn watch_updates<W>(
    updates: &mut watch::Receiver<StatusSnapshot>,
    limit: Option<usize>,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<(usize, WatchStopReason)>
where
    W: io::Write,
{
    let mut printed = 0usize;
    let stop_reason = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break WatchStopReason::Interrupted;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break WatchStopReason::FeedClosed;
                }
                let status = updates.borrow_and_update().clone();
                printed += 1;
                match output_format {
                    OutputFormat::Pretty => {
                        writeln!(out, "{}", WatchLineView::new(printed, &status, painter))?;
                    }
                    OutputFormat::Json => {
                        serde_json::to_writer(&mut *out, &WatchLine { index: printed, status: &status })?;
                        writeln!(out)?;
                    }
                }
                if let Some(limit) = limit && printed >= limit {
                    break WatchStopReason::ReachedLimit(limit);
                }
            }
        }
    };
    Ok((printed, stop_reason))
}
