use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::HasuraConfig;

const EVENT_TIMEOUT_SECS: u64 = 10;

/// Downstream event fan-out.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn trigger(&self, event_type: &str, data: Value) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
struct EventBody<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    data: Value,
}

/// Posts `{type, data}` to the Hasura metadata endpoint.
#[derive(Clone)]
pub struct HasuraEvents {
    http: reqwest::Client,
    url: String,
    admin_secret: String,
}

impl HasuraEvents {
    pub fn new(cfg: &HasuraConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(EVENT_TIMEOUT_SECS))
            .build()
            .context("build event http client")?;
        Ok(Self {
            http,
            url: format!("{}/v1/metadata", cfg.endpoint.trim_end_matches('/')),
            admin_secret: cfg.admin_secret.clone(),
        })
    }
}

#[async_trait]
impl EventSink for HasuraEvents {
    async fn trigger(&self, event_type: &str, data: Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .header("X-Hasura-Admin-Secret", &self.admin_secret)
            .json(&EventBody { event_type, data })
            .send()
            .await
            .with_context(|| format!("send {event_type} event"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("failed to trigger event {event_type}: {status}");
        }
        debug!(event_type, "event triggered");
        Ok(())
    }
}
