use std::fmt::{self, Display, Formatter};

use crate::config::DeviceConfig;
use crate::controller::DockingReport;
use crate::status::StatusSnapshot;

use super::painter::Painter;
use super::table::Table;

/// Renders a robot's status as a key-value table under a device heading.
pub(crate) struct StatusView<'a> {
    device: &'a DeviceConfig,
    status: &'a StatusSnapshot,
    painter: &'a Painter,
}

impl<'a> StatusView<'a> {
    pub(crate) fn new(
        device: &'a DeviceConfig,
        status: &'a StatusSnapshot,
        painter: &'a Painter,
    ) -> Self {
        Self {
            device,
            status,
            painter,
        }
    }
}

impl Display for StatusView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let phase = match self.status.phase() {
            Some(phase) => self.painter.value(phase.to_string()),
            None => self.painter.warning("<unknown>"),
        };
        let bin = if self.status.bin_full() {
            self.painter.warning("full")
        } else {
            self.painter.muted("ok")
        };
        let table = Table::key_value(
            self.painter,
            vec![
                ("battery", self.painter.battery(self.status.battery_level())),
                ("bin", bin),
                ("phase", phase),
                ("running", self.painter.flag(self.status.is_running())),
                ("charging", self.painter.flag(self.status.is_charging())),
                ("docking", self.painter.flag(self.status.is_docking())),
            ],
        );

        let heading = format!("{} ({})", self.device.name(), self.device.model());
        write!(f, "{}", self.painter.heading(heading))?;
        write!(f, "\n{table}")
    }
}

/// Renders the steps a power-off sequence went through.
pub(crate) struct DockingReportView<'a> {
    report: &'a DockingReport,
    painter: &'a Painter,
}

impl<'a> DockingReportView<'a> {
    pub(crate) fn new(report: &'a DockingReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }
}

impl Display for DockingReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let steps = self
            .report
            .transitions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        let table = Table::key_value(
            self.painter,
            vec![
                ("steps", self.painter.value(steps)),
                (
                    "state_checks",
                    self.painter.value(self.report.state_queries.to_string()),
                ),
            ],
        );
        write!(f, "{}", self.painter.success("Robot sent home"))?;
        write!(f, "\n{table}")
    }
}

/// Renders one published status as a single line.
pub(crate) struct WatchLineView<'a> {
    index: usize,
    status: &'a StatusSnapshot,
    painter: &'a Painter,
}

impl<'a> WatchLineView<'a> {
    pub(crate) fn new(index: usize, status: &'a StatusSnapshot, painter: &'a Painter) -> Self {
        Self {
            index,
            status,
            painter,
        }
    }
}

impl Display for WatchLineView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index_label = self.painter.muted(format!("[{:04}]", self.index));
        let phase = self
            .status
            .phase()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
        let bin = if self.status.bin_full() {
            self.painter.warning("bin full")
        } else {
            self.painter.muted("bin ok")
        };
        write!(
            f,
            "{index_label} {} {} {bin}",
            self.painter.value(phase),
            self.painter.battery(self.status.battery_level()),
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::controller::DockingState;
    use crate::status::{MissionTelemetry, Telemetry};

    fn snapshot(phase: &str, battery: i64) -> StatusSnapshot {
        StatusSnapshot::default().observe(&Telemetry {
            bat_pct: Some(battery),
            clean_mission_status: Some(MissionTelemetry {
                phase: Some(phase.to_string()),
            }),
            ..Telemetry::default()
        })
    }

    #[test]
    fn status_view_lists_every_field() {
        let device = DeviceConfig::builder()
            .name("Kitchen")
            .model("i7")
            .blid("blid")
            .password("secret")
            .address("10.0.0.2")
            .build();
        let status = snapshot("run", 77);
        let painter = Painter::new(false);

        let rendered = StatusView::new(&device, &status, &painter).to_string();

        assert!(rendered.starts_with("Kitchen (i7)\n"));
        for expected in ["battery", "77%", "bin", "ok", "phase", "run", "running", "yes"] {
            assert!(rendered.contains(expected), "missing `{expected}` in\n{rendered}");
        }
    }

    #[test]
    fn docking_report_view_joins_steps() {
        let report = DockingReport {
            transitions: vec![DockingState::Docking, DockingState::Done],
            state_queries: 0,
        };
        let painter = Painter::new(false);

        let rendered = DockingReportView::new(&report, &painter).to_string();

        assert!(rendered.contains("docking -> done"));
    }

    #[test]
    fn watch_line_is_compact() {
        let status = snapshot("charge", 100);
        let painter = Painter::new(false);

        assert_eq!(
            "[0003] charge 100% bin ok",
            WatchLineView::new(3, &status, &painter).to_string()
        );
    }
}
