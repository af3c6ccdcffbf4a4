use std::io;

use anyhow::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::controller::{DockingState, PollOutcome, RoombaController, TurnOnOutcome};
use crate::status::StatusSnapshot;

use super::ui::{DockingReportView, Painter, StatusView, Table};

/// JSON result emitted by a one-shot command.
#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlResult<'a> {
    Status {
        device: &'a str,
        status: &'a StatusSnapshot,
    },
    On {
        outcome: TurnOnOutcome,
        status: &'a StatusSnapshot,
    },
    Off {
        transitions: &'a [DockingState],
        state_queries: u32,
        status: &'a StatusSnapshot,
    },
    Locate {
        device: &'a str,
    },
}

/// Executes the `status` command.
pub(crate) async fn status<W>(
    controller: &RoombaController,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let status = match controller.poll().await? {
        PollOutcome::Refreshed(status) => status,
        PollOutcome::Skipped | PollOutcome::Preempted => controller.status(),
    };
    let device = controller.config();

    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", StatusView::new(device, &status, painter))?,
        OutputFormat::Json => write_json(
            out,
            &ControlResult::Status {
                device: device.name(),
                status: &status,
            },
        )?,
    }
    Ok(())
}

/// Executes the `on` command.
pub(crate) async fn turn_on<W>(
    controller: &RoombaController,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let outcome = controller.turn_on().await?;
    let status = controller.status();

    match output_format {
        OutputFormat::Pretty => {
            let headline = match outcome {
                TurnOnOutcome::AlreadyRunning => painter.warning("Robot was already cleaning"),
                TurnOnOutcome::Resumed => painter.success("Resumed the paused mission"),
                TurnOnOutcome::Started => painter.success("Started a new mission"),
            };
            writeln!(out, "{headline}")?;
            writeln!(
                out,
                "{}",
                StatusView::new(controller.config(), &status, painter)
            )?;
        }
        OutputFormat::Json => write_json(
            out,
            &ControlResult::On {
                outcome,
                status: &status,
            },
        )?,
    }
    Ok(())
}

/// Executes the `off` command.
pub(crate) async fn turn_off<W>(
    controller: &RoombaController,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    // A one-shot run starts with an empty cache; refresh it so a cleaning robot is paused first.
    controller.poll().await?;
    let report = controller.turn_off().await?;
    let status = controller.status();

    match output_format {
        OutputFormat::Pretty => {
            writeln!(out, "{}", DockingReportView::new(&report, painter))?;
        }
        OutputFormat::Json => write_json(
            out,
            &ControlResult::Off {
                transitions: &report.transitions,
                state_queries: report.state_queries,
                status: &status,
            },
        )?,
    }
    Ok(())
}

/// Executes the `locate` command.
pub(crate) async fn locate<W>(
    controller: &RoombaController,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    controller.identify().await?;
    let device = controller.config();

    match output_format {
        OutputFormat::Pretty => {
            let table = Table::key_value(
                painter,
                vec![
                    ("device", painter.value(device.name())),
                    ("address", painter.value(device.address())),
                ],
            );
            writeln!(out, "{}", painter.success("Locate sound requested"))?;
            writeln!(out, "{table}")?;
        }
        OutputFormat::Json => write_json(
            out,
            &ControlResult::Locate {
                device: device.name(),
            },
        )?,
    }
    Ok(())
}

pub(crate) fn write_json(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
