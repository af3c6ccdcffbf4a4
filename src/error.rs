use std::time::Duration;

use derive_more::From;
use thiserror::Error;

use crate::controller::UserCommand;
use crate::hw::DeviceCommand;

/// Failures raised by a device transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MQTT client request failed")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("failed to encode the command payload")]
    Encode(#[from] serde_json::Error),
    #[error("robot rejected the request: {reason}")]
    Rejected { reason: String },
    #[error("the link to the robot is already closed")]
    Closed,
}

/// Failures while opening a session with the robot.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("transport failed while connecting")]
    Transport(#[from] TransportError),
    #[error("robot refused the connection: {reason}")]
    Refused { reason: String },
    #[error("no connect acknowledgment within {}", humantime::format_duration(*timeout))]
    TimedOut { timeout: Duration },
    #[error("event stream closed before the connect acknowledgment")]
    Closed,
    #[error("connection attempt abandoned")]
    Abandoned,
}

/// Failures while waiting for the robot to report its state.
#[derive(Debug, Error)]
pub enum StateQueryError {
    #[error("state query could not be issued")]
    Transport(#[from] TransportError),
    #[error("robot sent a malformed state document")]
    Malformed(#[from] serde_json::Error),
    #[error("robot did not report a mission phase within {}", humantime::format_duration(*timeout))]
    NoResponse { timeout: Duration },
    #[error("link to the robot was lost: {reason}")]
    LinkLost { reason: String },
}

/// Outcome kinds surfaced by the controller's high-level operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("could not open a session with the robot")]
    Connection(#[from] ConnectionError),
    #[error("robot state query failed")]
    StateQuery(#[from] StateQueryError),
    #[error("robot did not accept the `{command}` command")]
    Command {
        command: DeviceCommand,
        #[source]
        source: TransportError,
    },
    #[error("robot was still running after {attempts} state checks; left paused and undocked")]
    DockTimeout { attempts: u32 },
    #[error("cannot {requested}: `{in_flight}` is still in flight")]
    Busy {
        requested: UserCommand,
        in_flight: UserCommand,
    },
}

/// Errors returned when loading bridge configuration.
#[derive(Debug, Error, From)]
pub enum ConfigError {
    #[error("failed to load configuration")]
    #[from(figment::Error, Box<figment::Error>)]
    Load(#[source] Box<figment::Error>),
    #[error("no configuration directory could be resolved for this platform")]
    #[from(ignore)]
    NoConfigDirectory,
}

/// Errors returned when parsing fake robot fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("battery level `{value}` is outside 0..=100")]
    BatteryOutOfRange { value: u8 },
    #[error("phase fixture cannot be empty")]
    EmptyPhase,
}

/// Errors returned by the remote schedule fetch.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("no `[schedule]` table is configured")]
    NotConfigured,
    #[error("schedule request failed")]
    Http(#[from] reqwest::Error),
}

/// Errors returned when a command cannot run with the loaded settings.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("background polling is disabled (`poll_interval_minutes = 0`)")]
    PollingDisabled,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
