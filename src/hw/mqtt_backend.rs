use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration,
    Transport,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{
    WebPkiSupportedAlgorithms, ring, verify_tls12_signature, verify_tls13_signature,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::link::{DeviceCommand, DeviceConnector, DeviceLink, EventSink, LinkEvent};
use crate::config::DeviceConfig;
use crate::error::TransportError;

const ROBOT_MQTT_PORT: u16 = 8883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CHANNEL_CAPACITY: usize = 10;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);
const COMMAND_TOPIC: &str = "cmd";
const SHADOW_TOPIC_PREFIX: &str = "$aws/things/";
const COMMAND_INITIATOR: &str = "localApp";

/// Payload published on the `cmd` topic.
#[derive(Debug, Serialize)]
struct CommandPayload<'a> {
    command: &'a str,
    time: i64,
    initiator: &'a str,
}

/// Connector for the robot's local MQTT broker.
#[derive(Debug, Default)]
pub(crate) struct MqttConnector;

#[async_trait]
impl DeviceConnector for MqttConnector {
    #[instrument(skip_all, level = "debug", fields(address = config.address()))]
    async fn connect(
        &self,
        config: &DeviceConfig,
        events: EventSink,
    ) -> Result<Box<dyn DeviceLink>, TransportError> {
        let blid = config.blid();
        if blid.is_empty() || blid.starts_with(char::is_whitespace) {
            return Err(TransportError::Rejected {
                reason: "robot BLID is empty or starts with whitespace".to_string(),
            });
        }

        let mut options = MqttOptions::new(blid, config.address(), ROBOT_MQTT_PORT);
        options.set_credentials(blid, config.password());
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        options.set_transport(Transport::tls_with_config(robot_tls()));

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(pump_events(event_loop, events, shutdown.clone()));
        debug!("mqtt event loop started");

        Ok(Box::new(MqttLink {
            client,
            shutdown,
            pump,
        }))
    }
}

fn robot_tls() -> TlsConfiguration {
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(RobotCertificate::new()))
        .with_no_client_auth();
    TlsConfiguration::Rustls(Arc::new(config))
}

/// The robot presents a self-signed certificate for its own BLID, so the
/// chain and name are accepted as-is. Handshake signatures are still checked.
#[derive(Debug)]
struct RobotCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl RobotCertificate {
    fn new() -> Self {
        Self {
            algorithms: ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for RobotCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

async fn pump_events(mut event_loop: EventLoop, events: EventSink, shutdown: CancellationToken) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    events.emit(LinkEvent::Connected);
                } else {
                    events.emit(LinkEvent::Failed {
                        reason: format!("connection refused: {:?}", ack.code),
                    });
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish)))
                if publish.topic.starts_with(SHADOW_TOPIC_PREFIX) =>
            {
                trace!(topic = %publish.topic, bytes = publish.payload.len(), "shadow update");
                events.emit(LinkEvent::Telemetry(publish.payload.to_vec()));
            }
            Ok(other) => trace!(?other, "ignoring mqtt event"),
            Err(error) => {
                events.emit(LinkEvent::Failed {
                    reason: error.to_string(),
                });
                break;
            }
        }
    }
    debug!("mqtt event loop stopped");
}

#[derive(Debug)]
struct MqttLink {
    client: AsyncClient,
    shutdown: CancellationToken,
    pump: JoinHandle<()>,
}

#[async_trait]
impl DeviceLink for MqttLink {
    async fn query_state(&self) -> Result<(), TransportError> {
        // The robot pushes shadow deltas on its own; there is no request packet.
        trace!("waiting for the robot to push its shadow state");
        Ok(())
    }

    fn answers_queries(&self) -> bool {
        false
    }

    #[instrument(skip(self), level = "debug", fields(wire_name = command.wire_name()))]
    async fn send(&self, command: DeviceCommand) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(&CommandPayload {
            command: command.wire_name(),
            time: OffsetDateTime::now_utc().unix_timestamp(),
            initiator: COMMAND_INITIATOR,
        })?;
        self.client
            .publish(COMMAND_TOPIC, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransportError> {
        let Self {
            client,
            shutdown,
            mut pump,
        } = *self;

        let requested = client.disconnect().await;
        if timeout(DISCONNECT_GRACE, &mut pump).await.is_err() {
            shutdown.cancel();
            if let Err(error) = pump.await {
                warn!(%error, "mqtt event loop task failed");
            }
        }
        requested.map_err(TransportError::from)
    }
}
