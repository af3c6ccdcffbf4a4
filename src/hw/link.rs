use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use super::fake_backend::FakeRobot;
use super::mqtt_backend::MqttConnector;
use crate::config::DeviceConfig;
use crate::error::TransportError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Commands understood by the robot's local protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, derive_more::Display)]
pub enum DeviceCommand {
    #[display("clean")]
    Clean,
    #[display("resume")]
    Resume,
    #[display("pause")]
    Pause,
    #[display("dock")]
    Dock,
    #[display("locate")]
    Locate,
}

impl DeviceCommand {
    /// Command name as published on the `cmd` topic.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Clean => "start",
            Self::Resume => "resume",
            Self::Pause => "pause",
            Self::Dock => "dock",
            Self::Locate => "find",
        }
    }
}

/// Event emitted by an open link.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LinkEvent {
    /// The robot acknowledged the connection.
    Connected,
    /// Raw shadow-update payload pushed by the robot.
    Telemetry(Vec<u8>),
    /// The transport failed; no further events follow.
    Failed { reason: String },
}

/// Sending half of a session's event subscription, handed to the transport.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: broadcast::Sender<LinkEvent>,
}

impl EventSink {
    /// Creates a sink together with the listener that receives its events.
    pub(crate) fn channel() -> (Self, broadcast::Receiver<LinkEvent>) {
        let (sender, receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        (Self { sender }, receiver)
    }

    /// Emits an event; events with no attached listener are dropped.
    pub fn emit(&self, event: LinkEvent) {
        if self.sender.send(event).is_err() {
            trace!("dropping link event with no listener attached");
        }
    }

    /// Number of listeners still attached to this sink.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Opens links to a robot.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Starts connecting to the robot described by `config`.
    ///
    /// The returned link reports the connect acknowledgment, telemetry and
    /// failures through `events`.
    async fn connect(
        &self,
        config: &DeviceConfig,
        events: EventSink,
    ) -> Result<Box<dyn DeviceLink>, TransportError>;
}

/// One open transport connection to the robot.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Asks the robot to report its state.
    async fn query_state(&self) -> Result<(), TransportError>;

    /// Whether `query_state` makes the robot push a fresh report. Links that
    /// only relay unprompted pushes answer from what was already received.
    fn answers_queries(&self) -> bool {
        true
    }

    /// Issues one command.
    async fn send(&self, command: DeviceCommand) -> Result<(), TransportError>;

    /// Releases the transport.
    async fn disconnect(self: Box<Self>) -> Result<(), TransportError>;
}

/// Creates a connector backed by the robot's MQTT-over-TLS protocol.
#[must_use]
pub fn mqtt_connector() -> Arc<dyn DeviceConnector> {
    Arc::new(MqttConnector)
}

/// Creates a connector backed by an in-memory fake robot.
#[must_use]
pub fn fake_connector(robot: FakeRobot) -> Arc<dyn DeviceConnector> {
    Arc::new(robot)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DeviceCommand::Clean, "start")]
    #[case(DeviceCommand::Locate, "find")]
    #[case(DeviceCommand::Dock, "dock")]
    fn wire_names_follow_robot_vocabulary(#[case] command: DeviceCommand, #[case] expected: &str) {
        assert_eq!(expected, command.wire_name());
    }

    #[test]
    fn dropping_the_listener_detaches_it() {
        let (sink, listener) = EventSink::channel();
        assert_eq!(1, sink.listener_count());

        drop(listener);

        assert_eq!(0, sink.listener_count());
        sink.emit(LinkEvent::Connected);
    }
}
