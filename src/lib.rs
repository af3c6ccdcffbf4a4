mod app;
mod cli;
mod config;
mod controller;
mod error;
mod hw;
mod schedule;
mod status;
mod telemetry;
mod terminal;

pub use app::{Bridge, run, run_with_clients, run_with_log_level};
pub use cli::{Args, Command, FakeArgs, LogLevel, OutputFormat, WatchArgs};
pub use config::{
    BridgeConfig, CleanBehaviour, DeviceConfig, ScheduleConfig, StopBehaviour,
    default_config_path,
};
pub use controller::{
    DOCK_MAX_ATTEMPTS, DOCK_SETTLE_INTERVAL, DockingPolicy, DockingReport, DockingState,
    PollOutcome, PollerHandle, RoombaController, TurnOnOutcome, UserCommand,
};
pub use error::{
    ConfigError, ConnectionError, ControllerError, FixtureError, ScheduleError, StateQueryError,
    TransportError,
};
pub use hw::{
    ConnectBehaviour, DeviceCommand, DeviceConnector, DeviceLink, EventSink, FakeCall, FakeRobot,
    FakeRobotConfig, LinkEvent, StateReply, fake_connector, mqtt_connector,
};
pub use schedule::ScheduleClient;
pub use status::{BinTelemetry, MissionTelemetry, Phase, StatusSnapshot, Telemetry, parse_phase};
pub use terminal::TerminalClient;
