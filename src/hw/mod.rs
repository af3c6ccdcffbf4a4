mod fake_backend;
mod link;
mod mqtt_backend;
mod session;

pub use self::fake_backend::{
    ConnectBehaviour, FakeCall, FakeRobot, FakeRobotConfig, StateReply,
};
pub use self::link::{
    DeviceCommand, DeviceConnector, DeviceLink, EventSink, LinkEvent, fake_connector,
    mqtt_connector,
};
pub(crate) use self::session::Session;
