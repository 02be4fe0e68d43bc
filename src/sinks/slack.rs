use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use crate::compose::DigestPayload;
use crate::sinks::Sink;
use crate::types::{DigestError, Result, RunContext};

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Chat sink posting the Block Kit payload to an incoming-webhook URL.
pub struct SlackSink {
    client: Client,
    webhook_url: String,
}

impl SlackSink {
    pub fn new(webhook_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }
}

#[async_trait]
impl Sink for SlackSink {
    fn name(&self) -> &str {
        "slack"
    }

    async fn deliver(&self, payload: &DigestPayload, _ctx: &RunContext) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload.slack)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DigestError::Timeout
                } else {
                    DigestError::Http(e)
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            // The dispatcher's retry policy owns the backoff wait.
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unset");
            warn!("slack rate limited (Retry-After: {})", retry_after);
            return Err(DigestError::RateLimited);
        }
        if !status.is_success() {
            return Err(DigestError::Delivery {
                sink: "slack".to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        Ok(())
    }
}

/// Best-effort error notice sent when a run fails fatally. Never escalates
/// its own failure.
pub async fn send_error_notification(webhook_url: &str, message: &str) -> bool {
    let client = match Client::builder()
        .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };

    let payload = json!({
        "text": "⚠️ news-digest run failed",
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": "⚠️ Run failed", "emoji": true }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("```{}```", message) }
            },
            {
                "type": "context",
                "elements": [{
                    "type": "mrkdwn",
                    "text": format!("At {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"))
                }]
            }
        ]
    });

    match client.post(webhook_url).json(&payload).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            warn!("error notification failed: {}", e);
            false
        }
    }
}
