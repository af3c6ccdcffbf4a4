use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::cli::watch::WatchArgs;
use crate::error::FixtureError;
use crate::hw::FakeRobotConfig;
use crate::status::Phase;

/// Command-line options for the Roomba bridge.
#[derive(Debug, Parser)]
#[command(name = "roomba", about = "Control a Roomba over its local network protocol.")]
pub struct Args {
    /// Configuration file; defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level; overrides `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Talks to an in-memory fake robot instead of the network.
    #[arg(long, global = true)]
    fake: bool,
    /// Mission phase the fake robot starts in (e.g. `charge`, `run`, `stop`).
    #[arg(long, global = true, requires = "fake")]
    fake_phase: Option<String>,
    /// Battery percentage reported by the fake robot.
    #[arg(long, global = true, requires = "fake")]
    fake_battery: Option<u8>,
    /// Reports a full bin from the fake robot.
    #[arg(long, global = true, requires = "fake")]
    fake_bin_full: bool,
    /// Artificial delay of every fake robot query and command (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_command_delay: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use roomba_bridge::{Args, Command};
    ///
    /// let args = Args::new(Command::Status);
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            config: None,
            log_level: None,
            output: None,
            fake: false,
            fake_phase: None,
            fake_battery: None,
            fake_bin_full: false,
            fake_command_delay: None,
            command,
        }
    }

    /// Enables fake robot mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            phase,
            battery,
            bin_full,
            command_delay,
        } = fake;

        self.fake = true;
        self.fake_phase = phase.map(|phase| phase.to_string());
        self.fake_battery = battery;
        self.fake_bin_full = bin_full;
        self.fake_command_delay = Some(command_delay);
        self
    }

    #[must_use]
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed CLI arguments into command and optional fake-robot settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a fake fixture value is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_phase,
            fake_battery,
            fake_bin_full,
            fake_command_delay,
            command,
            ..
        } = self;

        let fake_args = if fake {
            Some(FakeArgs {
                phase: fake_phase.as_deref().map(parse_phase_fixture).transpose()?,
                battery: fake_battery.map(check_battery_fixture).transpose()?,
                bin_full: fake_bin_full,
                command_delay: fake_command_delay.unwrap_or(Duration::ZERO),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Fake robot arguments for programmatic runs.
///
/// ```
/// # fn demo() -> Result<(), roomba_bridge::FixtureError> {
/// let fake = roomba_bridge::FakeArgs::builder()
///     .phase("run")?
///     .battery(64)?
///     .build();
/// let _ = fake;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { parse_phase_fixture(value) })]
    phase: Option<Phase>,
    #[builder(with = |value: u8| -> std::result::Result<_, FixtureError> { check_battery_fixture(value) })]
    battery: Option<u8>,
    #[builder(default)]
    bin_full: bool,
    #[builder(default)]
    command_delay: Duration,
}

impl FakeArgs {
    pub(crate) fn into_robot_config(self) -> FakeRobotConfig {
        let Self {
            phase,
            battery,
            bin_full,
            command_delay,
        } = self;

        FakeRobotConfig::builder()
            .maybe_phase(phase)
            .maybe_battery(battery)
            .bin_full(bin_full)
            .latency(command_delay)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect once, query the robot and print its status.
    Status,
    /// Start cleaning, or resume a paused mission.
    On,
    /// Send the robot home, pausing it first when it is cleaning.
    Off,
    /// Make the robot play its locate sound.
    Locate,
    /// Poll in the background and print every published status.
    Watch(WatchArgs),
    /// Fetch the remote cleaning schedule.
    Schedule,
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::On => "on",
            Self::Off => "off",
            Self::Locate => "locate",
            Self::Watch(_args) => "watch",
            Self::Schedule => "schedule",
        }
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output format accepted by `--output`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured tables for people.
    Pretty,
    /// JSON documents for scripts.
    Json,
}

fn parse_phase_fixture(value: &str) -> Result<Phase, FixtureError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FixtureError::EmptyPhase);
    }
    Ok(Phase::from(value))
}

fn check_battery_fixture(value: u8) -> Result<u8, FixtureError> {
    if value > 100 {
        return Err(FixtureError::BatteryOutOfRange { value });
    }
    Ok(value)
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
