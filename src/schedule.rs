//! One-shot fetch of the remote cleaning schedule.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, instrument};
use url::Url;

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated client for the schedule endpoint.
#[derive(Debug)]
pub struct ScheduleClient {
    http: reqwest::Client,
    endpoint: Url,
    token: SecretString,
}

impl ScheduleClient {
    /// Builds a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ScheduleConfig) -> Result<Self, ScheduleError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("roomba-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint().clone(),
            token: SecretString::from(config.token().to_owned()),
        })
    }

    /// Issues one GET and returns the parsed JSON body. Nothing is retried or cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server answers with a
    /// non-success status, or the body is not JSON.
    #[instrument(skip(self), level = "info", fields(endpoint = %self.endpoint))]
    pub async fn fetch(&self) -> Result<Value, ScheduleError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?
            .error_for_status()?;
        let schedule: Value = response.json().await?;
        info!(%schedule, "fetched cleaning schedule");
        Ok(schedule)
    }
}
