//! Thin client for the outbound report-forwarding gateway.

use attend_core::config::MessagingConfig;
use attend_core::{Error, Result};
use serde_json::Value;

pub struct MessagingGateway {
    client: reqwest::Client,
    config: MessagingConfig,
}

impl MessagingGateway {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Forwards a report body verbatim. Gateway failures surface as 502.
    pub async fn send_report(&self, body: &Value) -> Result<Value> {
        if !self.config.enabled || self.config.gateway_url.is_empty() {
            return Err(Error::upstream("Messaging gateway is not configured"));
        }

        let response = self
            .client
            .post(&self.config.gateway_url)
            .header("authkey", &self.config.auth_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::upstream("Messaging gateway rejected the report")
                .with_details(format!("gateway returned {}", response.status())));
        }

        let parsed = response
            .json::<Value>()
            .await
            .unwrap_or_else(|_| Value::Null);
        Ok(parsed)
    }
}
