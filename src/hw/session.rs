use std::time::Duration;

use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::link::{DeviceCommand, DeviceConnector, DeviceLink, EventSink, LinkEvent};
use crate::config::DeviceConfig;
use crate::controller::StatusCache;
use crate::error::{ConnectionError, ControllerError, StateQueryError, TransportError};
use crate::status::{ShadowDocument, StatusSnapshot, Telemetry};

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const STATE_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// One connect, operate, disconnect cycle against the robot.
///
/// Every telemetry document observed while the session is open is published
/// to the status cache. [`Session::close`] must be awaited on every path; a
/// session dropped without it releases its link from a background task.
pub(crate) struct Session {
    link: Option<Box<dyn DeviceLink>>,
    listener: Option<Receiver<LinkEvent>>,
    reported: Telemetry,
    cache: StatusCache,
}

impl Session {
    /// Connects and waits for the robot's acknowledgment.
    pub(crate) async fn open(
        connector: &dyn DeviceConnector,
        config: &DeviceConfig,
        cache: StatusCache,
    ) -> Result<Self, ConnectionError> {
        Self::open_until(connector, config, cache, &CancellationToken::new()).await
    }

    /// Like [`Session::open`], but gives up with [`ConnectionError::Abandoned`]
    /// once `cancellation` fires. A link that was already opened is closed
    /// before this returns.
    #[instrument(skip_all, level = "debug", fields(device = config.name()))]
    pub(crate) async fn open_until(
        connector: &dyn DeviceConnector,
        config: &DeviceConfig,
        cache: StatusCache,
        cancellation: &CancellationToken,
    ) -> Result<Self, ConnectionError> {
        let (sink, listener) = EventSink::channel();
        let link = tokio::select! {
            biased;
            () = cancellation.cancelled() => return Err(ConnectionError::Abandoned),
            link = connector.connect(config, sink) => link?,
        };
        let mut session = Self {
            link: Some(link),
            listener: Some(listener),
            reported: Telemetry::default(),
            cache,
        };

        let acknowledged = tokio::select! {
            biased;
            () = cancellation.cancelled() => Err(ConnectionError::Abandoned),
            result = timeout(CONNECT_TIMEOUT, session.await_acknowledgment()) => {
                result.unwrap_or_else(|_elapsed| {
                    Err(ConnectionError::TimedOut {
                        timeout: CONNECT_TIMEOUT,
                    })
                })
            }
        };

        match acknowledged {
            Ok(()) => {
                debug!("session open");
                Ok(session)
            }
            Err(error) => {
                session.close().await;
                Err(error)
            }
        }
    }

    async fn await_acknowledgment(&mut self) -> Result<(), ConnectionError> {
        loop {
            match self.next_event().await {
                Ok(LinkEvent::Connected) => return Ok(()),
                Ok(LinkEvent::Failed { reason }) => return Err(ConnectionError::Refused { reason }),
                Ok(LinkEvent::Telemetry(payload)) => self.observe_push(&payload),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "link events dropped"),
                Err(RecvError::Closed) => return Err(ConnectionError::Closed),
            }
        }
    }

    /// Asks for the robot's state and waits until a mission phase is known.
    ///
    /// On links that do not answer queries, a phase already pushed during
    /// this session is the answer; otherwise the next reported phase is.
    #[instrument(skip(self), level = "debug")]
    pub(crate) async fn request_state(&mut self) -> Result<StatusSnapshot, StateQueryError> {
        let link = self.link()?;
        let answers_queries = link.answers_queries();
        link.query_state().await?;

        if !answers_queries {
            self.drain_pending();
            if self.reported.phase().is_some() {
                let snapshot = self.cache.current();
                debug!(phase = ?snapshot.phase(), "state already pushed");
                return Ok(snapshot);
            }
        }

        let deadline = Instant::now() + STATE_QUERY_TIMEOUT;
        loop {
            let Ok(event) = timeout_at(deadline, self.next_event()).await else {
                return Err(StateQueryError::NoResponse {
                    timeout: STATE_QUERY_TIMEOUT,
                });
            };

            match event {
                Ok(LinkEvent::Telemetry(payload)) => {
                    let telemetry = ShadowDocument::decode(&payload)?;
                    let snapshot = self.observe(&telemetry);
                    if self.reported.phase().is_some() {
                        debug!(
                            phase = ?snapshot.phase(),
                            battery = snapshot.battery_level(),
                            "state reported"
                        );
                        return Ok(snapshot);
                    }
                }
                Ok(LinkEvent::Connected) => {}
                Ok(LinkEvent::Failed { reason }) => {
                    return Err(StateQueryError::LinkLost { reason });
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "link events dropped"),
                Err(RecvError::Closed) => {
                    return Err(StateQueryError::LinkLost {
                        reason: "event stream closed".to_string(),
                    });
                }
            }
        }
    }

    pub(crate) async fn clean(&mut self) -> Result<(), ControllerError> {
        self.send(DeviceCommand::Clean).await
    }

    pub(crate) async fn resume(&mut self) -> Result<(), ControllerError> {
        self.send(DeviceCommand::Resume).await
    }

    pub(crate) async fn pause(&mut self) -> Result<(), ControllerError> {
        self.send(DeviceCommand::Pause).await
    }

    pub(crate) async fn dock(&mut self) -> Result<(), ControllerError> {
        self.send(DeviceCommand::Dock).await
    }

    pub(crate) async fn locate(&mut self) -> Result<(), ControllerError> {
        self.send(DeviceCommand::Locate).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn send(&mut self, command: DeviceCommand) -> Result<(), ControllerError> {
        let link = self.link().map_err(|source| ControllerError::Command { command, source })?;
        link.send(command)
            .await
            .map_err(|source| ControllerError::Command { command, source })?;
        self.drain_pending();
        Ok(())
    }

    /// Detaches the listener, then releases the transport.
    #[instrument(skip(self), level = "debug")]
    pub(crate) async fn close(mut self) {
        self.drain_pending();
        drop(self.listener.take());
        if let Some(link) = self.link.take()
            && let Err(error) = link.disconnect().await
        {
            warn!(%error, "robot link did not close cleanly");
        }
        debug!("session closed");
    }

    fn link(&self) -> Result<&dyn DeviceLink, TransportError> {
        self.link.as_deref().ok_or(TransportError::Closed)
    }

    async fn next_event(&mut self) -> Result<LinkEvent, RecvError> {
        match self.listener.as_mut() {
            Some(listener) => listener.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    /// Folds telemetry that arrived without being asked for.
    fn drain_pending(&mut self) {
        loop {
            let Some(listener) = self.listener.as_mut() else {
                return;
            };
            match listener.try_recv() {
                Ok(LinkEvent::Telemetry(payload)) => self.observe_push(&payload),
                Ok(LinkEvent::Connected | LinkEvent::Failed { .. }) => {}
                Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "link events dropped"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return,
            }
        }
    }

    fn observe_push(&mut self, payload: &[u8]) {
        match ShadowDocument::decode(payload) {
            Ok(telemetry) => {
                self.observe(&telemetry);
            }
            Err(error) => warn!(%error, "ignoring malformed shadow update"),
        }
    }

    fn observe(&mut self, telemetry: &Telemetry) -> StatusSnapshot {
        self.reported.merge(telemetry);
        self.cache.publish_observation(telemetry)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        drop(self.listener.take());
        let Some(link) = self.link.take() else {
            return;
        };
        warn!("session dropped without close; releasing link in the background");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(error) = link.disconnect().await {
                    warn!(%error, "robot link did not close cleanly");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::{ConnectBehaviour, FakeCall, FakeRobot, FakeRobotConfig, StateReply};
    use crate::status::Phase;

    fn config() -> DeviceConfig {
        DeviceConfig::builder()
            .name("Test")
            .blid("blid")
            .password("secret")
            .address("127.0.0.1")
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn open_publishes_pushed_state_and_close_detaches_listener() {
        let robot = FakeRobot::new(
            FakeRobotConfig::builder()
                .phase(Phase::Run)
                .battery(61)
                .build(),
        );
        let cache = StatusCache::default();

        let session = Session::open(&robot, &config(), cache.clone())
            .await
            .expect("fake robot should acknowledge");
        session.close().await;

        assert_eq!(61, cache.current().battery_level());
        assert_eq!(true, cache.current().is_running());
        assert_eq!(
            vec![FakeCall::Connect, FakeCall::Disconnect { listeners: 0 }],
            robot.calls()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connection_is_a_connection_error_and_still_released() {
        let robot = FakeRobot::new(
            FakeRobotConfig::builder()
                .connect(ConnectBehaviour::Refuse)
                .build(),
        );

        let result = Session::open(&robot, &config(), StatusCache::default()).await;

        assert_matches!(result.err(), Some(ConnectionError::Refused { .. }));
        assert_eq!(0, robot.open_links());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_robot_times_out() {
        let robot = FakeRobot::new(
            FakeRobotConfig::builder()
                .connect(ConnectBehaviour::Silent)
                .build(),
        );

        let result = Session::open(&robot, &config(), StatusCache::default()).await;

        assert_matches!(
            result.err(),
            Some(ConnectionError::TimedOut { timeout }) if timeout == CONNECT_TIMEOUT
        );
        assert_eq!(0, robot.open_links());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_open_releases_the_half_open_link() {
        let robot = FakeRobot::new(
            FakeRobotConfig::builder()
                .connect(ConnectBehaviour::Silent)
                .build(),
        );
        let cancellation = CancellationToken::new();
        let cancel_later = {
            let cancellation = cancellation.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                cancellation.cancel();
            }
        };

        let config = config();
        let (result, ()) = tokio::join!(
            Session::open_until(&robot, &config, StatusCache::default(), &cancellation),
            cancel_later,
        );

        assert_matches!(result.err(), Some(ConnectionError::Abandoned));
        assert_eq!(
            vec![FakeCall::Connect, FakeCall::Disconnect { listeners: 0 }],
            robot.calls()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_state_reply_fails_the_query() {
        let robot = FakeRobot::new(
            FakeRobotConfig::builder()
                .state_reply(StateReply::Malformed)
                .build(),
        );
        let mut session = Session::open(&robot, &config(), StatusCache::default())
            .await
            .expect("fake robot should acknowledge");
        // The connect push already carries a phase; drop it so the reply is what gets read.
        session.drain_pending();

        let result = session.request_state().await;
        session.close().await;

        assert_matches!(result, Err(StateQueryError::Malformed(_)));
    }
}
