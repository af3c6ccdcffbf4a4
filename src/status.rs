//! Robot telemetry and the cached status derived from it.

use serde::{Deserialize, Serialize};
use serde_with::SerializeDisplay;

/// Mission phase reported in `cleanMissionStatus.phase`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, derive_more::Display, SerializeDisplay)]
pub enum Phase {
    #[display("charge")]
    Charge,
    #[display("run")]
    Run,
    #[display("stop")]
    Stop,
    #[display("pause")]
    Pause,
    /// Returning to the dock on user request.
    #[display("hmUsrDock")]
    UserDock,
    /// Returning to the dock to recharge mid-mission.
    #[display("hmMidMsn")]
    MidMissionDock,
    /// Returning to the dock after the mission finished.
    #[display("hmPostMsn")]
    PostMissionDock,
    #[display("stuck")]
    Stuck,
    #[display("evac")]
    Evacuating,
    #[display("new")]
    New,
    /// A phase this crate does not know about.
    #[display("{_0}")]
    Other(String),
}

impl From<&str> for Phase {
    fn from(value: &str) -> Self {
        match value {
            "charge" => Self::Charge,
            "run" => Self::Run,
            "stop" => Self::Stop,
            "pause" => Self::Pause,
            "hmUsrDock" => Self::UserDock,
            "hmMidMsn" => Self::MidMissionDock,
            "hmPostMsn" => Self::PostMissionDock,
            "stuck" => Self::Stuck,
            "evac" => Self::Evacuating,
            "new" => Self::New,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Phase {
    /// Returns `true` for phases where a cleaning mission is suspended and can resume.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Stop | Self::Pause)
    }
}

/// One reported-state document, as found under `state.reported` in a shadow update.
///
/// Every field is optional: the robot pushes deltas.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    #[serde(default)]
    pub bat_pct: Option<i64>,
    #[serde(default)]
    pub bin: Option<BinTelemetry>,
    #[serde(default)]
    pub clean_mission_status: Option<MissionTelemetry>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
pub struct BinTelemetry {
    #[serde(default)]
    pub full: Option<bool>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
pub struct MissionTelemetry {
    #[serde(default)]
    pub phase: Option<String>,
}

impl Telemetry {
    /// Returns the reported mission phase, if this document carries one.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.clean_mission_status
            .as_ref()
            .and_then(|mission| mission.phase.as_deref())
            .map(Phase::from)
    }

    fn bin_full(&self) -> Option<bool> {
        self.bin.as_ref().and_then(|bin| bin.full)
    }

    /// Folds a newer delta into this document; fields present in `newer` win.
    pub fn merge(&mut self, newer: &Telemetry) {
        if newer.bat_pct.is_some() {
            self.bat_pct = newer.bat_pct;
        }
        if let Some(full) = newer.bin_full() {
            self.bin = Some(BinTelemetry { full: Some(full) });
        }
        if let Some(phase) = newer
            .clean_mission_status
            .as_ref()
            .and_then(|mission| mission.phase.clone())
        {
            self.clean_mission_status = Some(MissionTelemetry { phase: Some(phase) });
        }
    }
}

/// Envelope of an MQTT shadow update.
#[derive(Debug, Deserialize)]
pub(crate) struct ShadowDocument {
    state: ShadowState,
}

#[derive(Debug, Deserialize)]
struct ShadowState {
    #[serde(default)]
    reported: Telemetry,
}

impl ShadowDocument {
    pub(crate) fn decode(payload: &[u8]) -> Result<Telemetry, serde_json::Error> {
        let document: Self = serde_json::from_slice(payload)?;
        Ok(document.state.reported)
    }
}

/// Last-known robot status.
///
/// `running`, `charging` and `docking` are all derived from a single phase, so
/// at most one of them is ever set.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    battery_level: u8,
    bin_full: bool,
    running: bool,
    charging: bool,
    docking: bool,
    phase: Option<Phase>,
}

impl StatusSnapshot {
    /// Derives the next snapshot from this one and a telemetry delta.
    ///
    /// Fields missing from `telemetry` keep their current values.
    #[must_use]
    pub fn observe(&self, telemetry: &Telemetry) -> Self {
        let battery_level = telemetry
            .bat_pct
            .map_or(self.battery_level, clamp_battery);
        let bin_full = telemetry.bin_full().unwrap_or(self.bin_full);
        let phase = telemetry.phase().or_else(|| self.phase.clone());

        let (running, charging, docking) = match phase {
            Some(Phase::Run) => (true, false, false),
            Some(Phase::Charge) => (false, true, false),
            Some(Phase::UserDock) => (false, false, true),
            _ => (false, false, false),
        };

        Self {
            battery_level,
            bin_full,
            running,
            charging,
            docking,
            phase,
        }
    }

    #[must_use]
    pub fn battery_level(&self) -> u8 {
        self.battery_level
    }

    #[must_use]
    pub fn bin_full(&self) -> bool {
        self.bin_full
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn is_charging(&self) -> bool {
        self.charging
    }

    #[must_use]
    pub fn is_docking(&self) -> bool {
        self.docking
    }

    /// Phase the snapshot was derived from; `None` before the first report.
    #[must_use]
    pub fn phase(&self) -> Option<&Phase> {
        self.phase.as_ref()
    }
}

/// Translates one telemetry document into a snapshot, starting from defaults.
#[must_use]
pub fn parse_phase(telemetry: &Telemetry) -> StatusSnapshot {
    StatusSnapshot::default().observe(telemetry)
}

fn clamp_battery(raw: i64) -> u8 {
    u8::try_from(raw.clamp(0, 100)).unwrap_or(100)
}
