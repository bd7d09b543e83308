use anyhow::{Context, Result};
use log::info;

use crate::models::CoverageObservation;

/// Delivers observations to the downstream HTTP endpoint as JSON.
///
/// Delivery is fire-and-forget per cycle: a failure is reported to the
/// caller for logging and the next attempt is simply the next cycle.
pub struct PushClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PushClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub async fn push(&self, observation: &CoverageObservation) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(observation)
            .send()
            .await
            .with_context(|| format!("push to {} failed to send", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("push endpoint returned {status}: {body}");
        }

        info!(
            "Pushed observation for {} at {} ({status})",
            observation.city,
            observation.timestamp_str()
        );
        Ok(())
    }
}
