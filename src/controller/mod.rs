//! High-level robot operations, serialised over short-lived sessions.

mod cache;
mod docking;
mod poller;
mod serializer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

pub(crate) use self::cache::StatusCache;
pub use self::docking::{
    DOCK_MAX_ATTEMPTS, DOCK_SETTLE_INTERVAL, DockingPolicy, DockingReport, DockingState,
};
pub use self::poller::PollerHandle;
pub use self::serializer::UserCommand;

use self::docking::{DockingOps, DockingWait};
use self::serializer::CommandSerializer;
use crate::config::DeviceConfig;
use crate::error::{ConnectionError, ControllerError};
use crate::hw::{DeviceConnector, Session};
use crate::status::StatusSnapshot;

/// What `turn_on` did.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum TurnOnOutcome {
    /// The robot was already cleaning; nothing was sent.
    #[display("already running")]
    AlreadyRunning,
    /// A paused mission was resumed.
    #[display("resumed")]
    Resumed,
    /// A new mission was started.
    #[display("started")]
    Started,
}

/// What a status poll did.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PollOutcome {
    /// The robot reported its state and the cache was refreshed.
    Refreshed(StatusSnapshot),
    /// Another operation held the session slot; nothing was done.
    Skipped,
    /// A user command arrived while the poll was waiting for the robot.
    Preempted,
}

struct ControllerInner {
    config: DeviceConfig,
    connector: Arc<dyn DeviceConnector>,
    cache: StatusCache,
    serializer: Arc<CommandSerializer>,
    docking: DockingPolicy,
}

/// Controller for one robot.
///
/// Clones share the same cached status and session slot. At most one session
/// to the robot is open at a time.
///
/// ```
/// # async fn demo() -> Result<(), roomba_bridge::ControllerError> {
/// use roomba_bridge::{DeviceConfig, FakeRobot, FakeRobotConfig, RoombaController, fake_connector};
///
/// let config = DeviceConfig::builder()
///     .name("Kitchen")
///     .blid("3115850251687850")
///     .password("secret")
///     .address("192.168.1.20")
///     .build();
/// let robot = FakeRobot::new(FakeRobotConfig::default());
/// let controller = RoombaController::new(config, fake_connector(robot));
///
/// controller.turn_on().await?;
/// assert!(controller.status().is_running());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RoombaController {
    inner: Arc<ControllerInner>,
}

impl RoombaController {
    #[must_use]
    pub fn new(config: DeviceConfig, connector: Arc<dyn DeviceConnector>) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                connector,
                cache: StatusCache::default(),
                serializer: Arc::new(CommandSerializer::default()),
                docking: DockingPolicy::default(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Last published status.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.inner.cache.current()
    }

    /// Receiver notified on every published status.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.inner.cache.subscribe()
    }

    /// Replaces the cached status without talking to the robot.
    pub fn seed_status(&self, snapshot: StatusSnapshot) {
        self.inner.cache.seed(snapshot);
    }

    /// Starts cleaning, resuming a paused mission when there is one.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while another user command is in flight, or the
    /// connection, state query or command failure that stopped it.
    #[instrument(skip(self), level = "info", fields(device = self.inner.config.name()))]
    pub async fn turn_on(&self) -> Result<TurnOnOutcome, ControllerError> {
        let _permit = self.inner.serializer.admit_user(UserCommand::TurnOn).await?;
        let mut session = self.open_session().await?;
        let outcome = start_or_resume(&mut session).await;
        session.close().await;

        let outcome = outcome?;
        info!(%outcome, "turn on finished");
        Ok(outcome)
    }

    /// Sends the robot home, pausing and waiting for it first when it is cleaning.
    ///
    /// The starting point is taken from the cached status.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while another user command is in flight, `DockTimeout`
    /// when the robot keeps running after every state check, or the
    /// connection, state query or command failure that stopped it.
    #[instrument(skip(self), level = "info", fields(device = self.inner.config.name()))]
    pub async fn turn_off(&self) -> Result<DockingReport, ControllerError> {
        let _permit = self.inner.serializer.admit_user(UserCommand::TurnOff).await?;
        let cached = self.inner.cache.current();
        let mut session = self.open_session().await?;
        let report = DockingWait::for_snapshot(&cached, self.inner.docking)
            .run(&mut session)
            .await;
        session.close().await;
        report
    }

    /// Makes the robot play its locate sound.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while another user command is in flight, or the
    /// connection or command failure that stopped it.
    #[instrument(skip(self), level = "info", fields(device = self.inner.config.name()))]
    pub async fn identify(&self) -> Result<(), ControllerError> {
        let _permit = self
            .inner
            .serializer
            .admit_user(UserCommand::Identify)
            .await?;
        let mut session = self.open_session().await?;
        let result = session.locate().await;
        session.close().await;
        result
    }

    /// Refreshes the cached status when nothing else is talking to the robot.
    ///
    /// # Errors
    ///
    /// Returns the connection or state query failure that stopped the poll.
    #[instrument(skip(self), level = "debug", fields(device = self.inner.config.name()))]
    pub async fn poll(&self) -> Result<PollOutcome, ControllerError> {
        let Some(permit) = self.inner.serializer.admit_poll() else {
            debug!(
                in_flight = ?self.inner.serializer.user_in_flight(),
                "session slot taken; skipping poll"
            );
            return Ok(PollOutcome::Skipped);
        };
        let cancellation = permit.cancellation().clone();

        let opened = Session::open_until(
            self.inner.connector.as_ref(),
            &self.inner.config,
            self.inner.cache.clone(),
            &cancellation,
        )
        .await;
        let mut session = match opened {
            Ok(session) => session,
            Err(ConnectionError::Abandoned) => {
                debug!("poll pre-empted while connecting");
                return Ok(PollOutcome::Preempted);
            }
            Err(error) => return Err(error.into()),
        };
        let refreshed = tokio::select! {
            biased;
            () = cancellation.cancelled() => None,
            result = session.request_state() => Some(result),
        };
        session.close().await;
        drop(permit);

        match refreshed {
            Some(result) => Ok(PollOutcome::Refreshed(result?)),
            None => {
                debug!("poll pre-empted by a user command");
                Ok(PollOutcome::Preempted)
            }
        }
    }

    /// Starts the background poller at the configured interval.
    ///
    /// Returns `None` when polling is disabled.
    #[must_use]
    pub fn spawn_poller(&self) -> Option<PollerHandle> {
        let interval = self.inner.config.poll_interval()?;
        Some(PollerHandle::spawn(self.clone(), interval))
    }

    async fn open_session(&self) -> Result<Session, ControllerError> {
        let session = Session::open(
            self.inner.connector.as_ref(),
            &self.inner.config,
            self.inner.cache.clone(),
        )
        .await?;
        Ok(session)
    }
}

async fn start_or_resume(session: &mut Session) -> Result<TurnOnOutcome, ControllerError> {
    let snapshot = session.request_state().await?;
    if snapshot.is_running() {
        return Ok(TurnOnOutcome::AlreadyRunning);
    }
    if snapshot.phase().is_some_and(|phase| phase.is_paused()) {
        session.resume().await?;
        return Ok(TurnOnOutcome::Resumed);
    }
    session.clean().await?;
    Ok(TurnOnOutcome::Started)
}

#[async_trait]
impl DockingOps for Session {
    async fn pause(&mut self) -> Result<(), ControllerError> {
        Session::pause(self).await
    }

    async fn request_state(&mut self) -> Result<StatusSnapshot, ControllerError> {
        Ok(Session::request_state(self).await?)
    }

    async fn dock(&mut self) -> Result<(), ControllerError> {
        Session::dock(self).await
    }

    async fn settle(&mut self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}
