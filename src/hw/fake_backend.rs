use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info};

use super::link::{DeviceCommand, DeviceConnector, DeviceLink, EventSink, LinkEvent};
use crate::config::DeviceConfig;
use crate::error::TransportError;
use crate::status::Phase;

/// How the fake robot answers a connection attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ConnectBehaviour {
    /// Acknowledge, then push the full shadow state.
    #[default]
    Acknowledge,
    /// Report a transport failure before acknowledging.
    Refuse,
    /// Never answer.
    Silent,
    /// Acknowledge and push the full shadow state once the delay has passed.
    AcknowledgeAfter(Duration),
}

/// How the fake robot answers a state query.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum StateReply {
    /// Push the current phase and battery level.
    #[default]
    Report,
    /// Push a payload that is not valid JSON.
    Malformed,
    /// Push nothing.
    Silent,
    /// Push nothing and report that queries go unanswered, like the MQTT
    /// robot, so the session reads what was already pushed.
    PushOnly,
}

/// One interaction observed by the fake robot, in arrival order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FakeCall {
    Connect,
    QueryState,
    Send(DeviceCommand),
    /// A link was released; `listeners` is how many were still attached.
    Disconnect { listeners: usize },
}

/// Scenario for a fake robot.
#[derive(Debug, Clone, Builder)]
pub struct FakeRobotConfig {
    #[builder(default = Phase::Charge)]
    phase: Phase,
    #[builder(default = 100)]
    battery: u8,
    #[builder(default)]
    bin_full: bool,
    #[builder(default)]
    connect: ConnectBehaviour,
    #[builder(default)]
    state_reply: StateReply,
    /// Simulated latency of every query and command.
    #[builder(default)]
    latency: Duration,
    /// When set, `pause` leaves the robot running.
    #[builder(default)]
    ignores_pause: bool,
    /// Command the robot rejects.
    failing_command: Option<DeviceCommand>,
}

impl Default for FakeRobotConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug)]
struct RobotState {
    phase: Phase,
    battery: u8,
    bin_full: bool,
}

#[derive(Debug)]
struct FakeRobotInner {
    config: FakeRobotConfig,
    state: Mutex<RobotState>,
    calls: Mutex<Vec<FakeCall>>,
    open_links: AtomicUsize,
    peak_open_links: AtomicUsize,
}

/// In-memory robot used by tests and `--fake` runs.
///
/// Commands move the simulated phase the way the real robot does: `clean`
/// and `resume` start running, `pause` stops, `dock` heads home.
#[derive(Debug, Clone)]
pub struct FakeRobot {
    inner: Arc<FakeRobotInner>,
}

impl FakeRobot {
    #[must_use]
    pub fn new(config: FakeRobotConfig) -> Self {
        let state = RobotState {
            phase: config.phase.clone(),
            battery: config.battery,
            bin_full: config.bin_full,
        };
        Self {
            inner: Arc::new(FakeRobotInner {
                config,
                state: Mutex::new(state),
                calls: Mutex::new(Vec::new()),
                open_links: AtomicUsize::new(0),
                peak_open_links: AtomicUsize::new(0),
            }),
        }
    }

    /// Every interaction so far.
    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.inner.calls.lock().clone()
    }

    /// Commands received so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.inner
            .calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                FakeCall::Send(command) => Some(*command),
                _ => None,
            })
            .collect()
    }

    /// Current simulated phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase.clone()
    }

    /// Moves the robot to `phase` without a command, as a physical button press would.
    pub fn set_phase(&self, phase: Phase) {
        self.inner.state.lock().phase = phase;
    }

    /// Links currently open.
    #[must_use]
    pub fn open_links(&self) -> usize {
        self.inner.open_links.load(Ordering::SeqCst)
    }

    /// Highest number of links that were ever open at the same time.
    #[must_use]
    pub fn peak_open_links(&self) -> usize {
        self.inner.peak_open_links.load(Ordering::SeqCst)
    }

    fn record(&self, call: FakeCall) {
        self.inner.calls.lock().push(call);
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.config.latency;
        if !latency.is_zero() {
            sleep(latency).await;
        }
    }

    fn full_shadow(&self) -> Vec<u8> {
        let state = self.inner.state.lock();
        json!({
            "state": {
                "reported": {
                    "batPct": state.battery,
                    "bin": { "full": state.bin_full },
                    "cleanMissionStatus": { "phase": state.phase.to_string() },
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn acknowledge(&self, events: &EventSink) {
        events.emit(LinkEvent::Connected);
        events.emit(LinkEvent::Telemetry(self.full_shadow()));
    }

    fn phase_delta(&self) -> Vec<u8> {
        let phase = self.phase();
        json!({ "state": { "reported": { "cleanMissionStatus": { "phase": phase.to_string() } } } })
            .to_string()
            .into_bytes()
    }

    fn apply(&self, command: DeviceCommand) {
        let mut state = self.inner.state.lock();
        let next = match command {
            DeviceCommand::Clean | DeviceCommand::Resume => Some(Phase::Run),
            DeviceCommand::Pause if self.inner.config.ignores_pause => None,
            DeviceCommand::Pause => Some(Phase::Stop),
            DeviceCommand::Dock => Some(Phase::UserDock),
            DeviceCommand::Locate => None,
        };
        if let Some(phase) = next {
            debug!(from = %state.phase, to = %phase, "fake robot changed phase");
            state.phase = phase;
        }
    }
}

#[async_trait]
impl DeviceConnector for FakeRobot {
    async fn connect(
        &self,
        _config: &DeviceConfig,
        events: EventSink,
    ) -> Result<Box<dyn DeviceLink>, TransportError> {
        self.record(FakeCall::Connect);
        let open = self.inner.open_links.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_open_links.fetch_max(open, Ordering::SeqCst);
        info!(open_links = open, "fake robot accepted a link");

        match self.inner.config.connect {
            ConnectBehaviour::Acknowledge => self.acknowledge(&events),
            ConnectBehaviour::AcknowledgeAfter(delay) => {
                let robot = self.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    sleep(delay).await;
                    robot.acknowledge(&events);
                });
            }
            ConnectBehaviour::Refuse => events.emit(LinkEvent::Failed {
                reason: "connection refused: bad user name or password".to_string(),
            }),
            ConnectBehaviour::Silent => {}
        }

        Ok(Box::new(FakeLink {
            robot: self.clone(),
            events,
        }))
    }
}

#[derive(Debug)]
struct FakeLink {
    robot: FakeRobot,
    events: EventSink,
}

#[async_trait]
impl DeviceLink for FakeLink {
    async fn query_state(&self) -> Result<(), TransportError> {
        self.robot.record(FakeCall::QueryState);
        self.robot.simulate_latency().await;

        match self.robot.inner.config.state_reply {
            StateReply::Report => self
                .events
                .emit(LinkEvent::Telemetry(self.robot.full_shadow())),
            StateReply::Malformed => self
                .events
                .emit(LinkEvent::Telemetry(b"{\"state\":".to_vec())),
            StateReply::Silent | StateReply::PushOnly => {}
        }
        Ok(())
    }

    fn answers_queries(&self) -> bool {
        self.robot.inner.config.state_reply != StateReply::PushOnly
    }

    async fn send(&self, command: DeviceCommand) -> Result<(), TransportError> {
        self.robot.record(FakeCall::Send(command));
        self.robot.simulate_latency().await;

        if self.robot.inner.config.failing_command == Some(command) {
            return Err(TransportError::Rejected {
                reason: format!("fake robot rejects `{command}`"),
            });
        }

        self.robot.apply(command);
        self.events
            .emit(LinkEvent::Telemetry(self.robot.phase_delta()));
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransportError> {
        let Self { robot, events } = *self;
        robot.record(FakeCall::Disconnect {
            listeners: events.listener_count(),
        });
        robot.inner.open_links.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Phase::Charge, DeviceCommand::Clean, Phase::Run)]
    #[case(Phase::Stop, DeviceCommand::Resume, Phase::Run)]
    #[case(Phase::Run, DeviceCommand::Pause, Phase::Stop)]
    #[case(Phase::Stop, DeviceCommand::Dock, Phase::UserDock)]
    #[case(Phase::Charge, DeviceCommand::Locate, Phase::Charge)]
    fn commands_move_the_simulated_phase(
        #[case] start: Phase,
        #[case] command: DeviceCommand,
        #[case] expected: Phase,
    ) {
        let robot = FakeRobot::new(FakeRobotConfig::builder().phase(start).build());
        robot.apply(command);
        assert_eq!(expected, robot.phase());
    }

    #[test]
    fn ignoring_pause_keeps_running() {
        let robot = FakeRobot::new(
            FakeRobotConfig::builder()
                .phase(Phase::Run)
                .ignores_pause(true)
                .build(),
        );
        robot.apply(DeviceCommand::Pause);
        assert_eq!(Phase::Run, robot.phase());
    }

    #[test]
    fn full_shadow_carries_every_reported_field() {
        let robot = FakeRobot::new(
            FakeRobotConfig::builder()
                .battery(42)
                .bin_full(true)
                .build(),
        );
        let value: serde_json::Value =
            serde_json::from_slice(&robot.full_shadow()).expect("shadow should be JSON");

        assert_eq!(
            json!({ "batPct": 42, "bin": { "full": true }, "cleanMissionStatus": { "phase": "charge" } }),
            value["state"]["reported"]
        );
    }
}
