use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::instrument;

use crate::cli::ui::Painter;
use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat};
use crate::config::{BridgeConfig, DeviceConfig, ScheduleConfig, default_config_path};
use crate::controller::RoombaController;
use crate::error::{ConfigError, ScheduleError};
use crate::hw::{FakeRobot, fake_connector, mqtt_connector};
use crate::schedule::ScheduleClient;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

const FAKE_DEVICE_NAME: &str = "Fake Roomba";

/// The robot controller and optional schedule endpoint a command runs against.
pub struct Bridge {
    controller: RoombaController,
    schedule: Option<ScheduleConfig>,
}

impl Bridge {
    #[must_use]
    pub fn new(controller: RoombaController) -> Self {
        Self {
            controller,
            schedule: None,
        }
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Creates a bridge that talks to the configured robot over the network.
    #[must_use]
    pub fn from_config(config: BridgeConfig) -> Self {
        let (device, schedule) = config.into_parts();
        Self {
            controller: RoombaController::new(device, mqtt_connector()),
            schedule,
        }
    }

    /// Loads configuration from `path`, or from the platform default location.
    ///
    /// # Errors
    ///
    /// Returns an error if no configuration directory exists for this
    /// platform or the configuration cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::load(&default_config_path()?)?,
        };
        Ok(Self::from_config(config))
    }

    /// Creates a bridge backed by an in-memory fake robot.
    ///
    /// ```
    /// let bridge = roomba_bridge::Bridge::fake(roomba_bridge::FakeArgs::builder().build());
    /// assert_eq!("Fake Roomba", bridge.controller().config().name());
    /// ```
    #[must_use]
    pub fn fake(fake_args: FakeArgs) -> Self {
        let robot = FakeRobot::new(fake_args.into_robot_config());
        let device = DeviceConfig::builder()
            .name(FAKE_DEVICE_NAME)
            .blid("fake-blid")
            .password("fake-password")
            .address("127.0.0.1")
            .build();
        Self::new(RoombaController::new(device, fake_connector(robot)))
    }

    #[must_use]
    pub fn controller(&self) -> &RoombaController {
        &self.controller
    }
}

/// Runs the CLI command against `bridge`.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = roomba_bridge::Args::try_parse_from(["roomba", "--fake", "status"])?;
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let bridge = match maybe_fake_args {
///     Some(fake_args) => roomba_bridge::Bridge::fake(fake_args),
///     None => roomba_bridge::Bridge::load(None)?,
/// };
/// let mut out = Vec::new();
/// roomba_bridge::run(command, &mut out, bridge).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the robot operation
/// fails, or output writing fails.
pub async fn run<W>(command: Command, out: &mut W, bridge: Bridge) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, bridge, None, None).await
}

/// Runs the CLI command with explicit log-level and output overrides.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the robot operation
/// fails, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    bridge: Bridge,
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(
        command,
        out,
        &SystemTerminalClient,
        bridge,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with an injected terminal client and explicit output settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// struct FakeTerminal;
/// impl roomba_bridge::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let bridge = roomba_bridge::Bridge::fake(roomba_bridge::FakeArgs::builder().build());
/// let mut out = Vec::new();
/// roomba_bridge::run_with_clients(
///     roomba_bridge::Command::Locate,
///     &mut out,
///     &FakeTerminal,
///     bridge,
///     Some(roomba_bridge::LogLevel::Debug),
///     None,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the robot operation
/// fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, bridge),
    level = "debug",
    fields(command = command.name(), ?log_level, ?output_format)
)]
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    bridge: Bridge,
    log_level: Option<LogLevel>,
    output_format: Option<OutputFormat>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "roomba-bridge",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let stdout_is_terminal = terminal_client.stdout_is_terminal();
    let output_format = output_format.unwrap_or(if stdout_is_terminal {
        OutputFormat::Pretty
    } else {
        OutputFormat::Json
    });
    let painter = Painter::new(stdout_is_terminal && output_format == OutputFormat::Pretty);
    let Bridge {
        controller,
        schedule,
    } = bridge;

    match command {
        Command::Status => {
            crate::cli::control::status(&controller, out, output_format, &painter).await
        }
        Command::On => {
            crate::cli::control::turn_on(&controller, out, output_format, &painter).await
        }
        Command::Off => {
            crate::cli::control::turn_off(&controller, out, output_format, &painter).await
        }
        Command::Locate => {
            crate::cli::control::locate(&controller, out, output_format, &painter).await
        }
        Command::Watch(args) => {
            crate::cli::watch::run(&controller, &args, out, output_format, &painter).await
        }
        Command::Schedule => {
            fetch_schedule(schedule.as_ref(), out, output_format, &painter).await
        }
    }
}

async fn fetch_schedule<W>(
    schedule: Option<&ScheduleConfig>,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let config = schedule.ok_or(ScheduleError::NotConfigured)?;
    let schedule = ScheduleClient::new(config)?.fetch().await?;

    if output_format == OutputFormat::Pretty {
        writeln!(
            out,
            "{} {}",
            painter.heading("Schedule from"),
            painter.muted(config.endpoint().as_str())
        )?;
    }
    crate::cli::control::write_json(out, &schedule)
}
