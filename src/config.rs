use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use strum_macros::{Display, EnumIter, EnumString};
use url::Url;

use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_PREFIX: &str = "ROOMBA_";

/// Preferred cleaning behaviour, passed through to the accessory host.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Default, Display, EnumIter, EnumString, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CleanBehaviour {
    #[default]
    Everywhere,
    Rooms,
}

/// Preferred stop behaviour, passed through to the accessory host.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Default, Display, EnumIter, EnumString, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StopBehaviour {
    #[default]
    Home,
    Pause,
}

/// Static robot identity, credentials and preferences.
#[derive(Debug, Builder, Deserialize)]
pub struct DeviceConfig {
    #[builder(into)]
    name: String,
    #[builder(into, default = String::from("Roomba"))]
    #[serde(default = "default_model")]
    model: String,
    #[builder(into, default = String::from("unknown"))]
    #[serde(default = "default_serial")]
    serial: String,
    /// Robot BLID; doubles as MQTT client id and username.
    #[builder(into)]
    blid: String,
    #[builder(with = |secret: &str| SecretString::from(secret.to_owned()))]
    password: SecretString,
    /// Robot host name or IP address on the local network.
    #[builder(into)]
    address: String,
    #[builder(default)]
    #[serde(default)]
    clean_behaviour: CleanBehaviour,
    #[builder(default)]
    #[serde(default)]
    stop_behaviour: StopBehaviour,
    /// Background refresh interval in minutes; `0` disables polling.
    #[builder(default = 1)]
    #[serde(default = "default_poll_interval")]
    poll_interval_minutes: u64,
}

impl DeviceConfig {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    #[must_use]
    pub fn blid(&self) -> &str {
        &self.blid
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn clean_behaviour(&self) -> CleanBehaviour {
        self.clean_behaviour
    }

    #[must_use]
    pub fn stop_behaviour(&self) -> StopBehaviour {
        self.stop_behaviour
    }

    /// Poll interval, or `None` when background polling is disabled.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_minutes > 0)
            .then(|| Duration::from_secs(self.poll_interval_minutes.saturating_mul(60)))
    }
}

/// Remote schedule endpoint settings.
#[derive(Debug, Deserialize)]
pub struct ScheduleConfig {
    endpoint: Url,
    token: SecretString,
}

impl ScheduleConfig {
    #[must_use]
    pub fn new(endpoint: Url, token: impl Into<String>) -> Self {
        Self {
            endpoint,
            token: SecretString::from(token.into()),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub(crate) fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// Everything read from the configuration file and environment.
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    device: DeviceConfig,
    #[serde(default)]
    schedule: Option<ScheduleConfig>,
}

impl BridgeConfig {
    #[must_use]
    pub fn new(device: DeviceConfig) -> Self {
        Self {
            device,
            schedule: None,
        }
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Loads a TOML file merged with `ROOMBA_`-prefixed environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `ROOMBA_DEVICE__ADDRESS`.
    ///
    /// # Errors
    ///
    /// Returns an error when the merged configuration is missing required
    /// fields or cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    #[must_use]
    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    #[must_use]
    pub fn schedule(&self) -> Option<&ScheduleConfig> {
        self.schedule.as_ref()
    }

    pub(crate) fn into_parts(self) -> (DeviceConfig, Option<ScheduleConfig>) {
        (self.device, self.schedule)
    }
}

/// Default location of the configuration file for this platform.
///
/// # Errors
///
/// Returns an error when the platform exposes no configuration directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("", "", "roomba-bridge")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDirectory)
}

fn default_model() -> String {
    String::from("Roomba")
}

fn default_serial() -> String {
    String::from("unknown")
}

fn default_poll_interval() -> u64 {
    1
}
