use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use crate::compose::{sheet_header, DigestPayload};
use crate::sinks::Sink;
use crate::types::{DigestError, Result, RunContext};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_TIMEOUT_SECS: u64 = 20;

/// Archive sink appending one tab per run to a Google spreadsheet. The
/// credential is an opaque bearer token for a service account.
pub struct SheetsSink {
    client: Client,
    spreadsheet_id: String,
    access_token: String,
}

impl SheetsSink {
    pub fn new(spreadsheet_id: String, access_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SHEETS_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            spreadsheet_id,
            access_token,
        })
    }

    /// Tab name for one run. Kept URL-path safe (no spaces or colons) so the
    /// values range needs no escaping.
    fn tab_title(ctx: &RunContext) -> String {
        format!(
            "{}-{}",
            ctx.started_at.format("%Y%m%d-%H%M"),
            ctx.news_type
        )
    }

    /// Create the tab for this run. A tab left behind by an earlier attempt
    /// of the same run is reused, so a retried deliver converges on the
    /// append instead of failing on the duplicate title.
    async fn add_tab(&self, title: &str, rows: usize) -> Result<()> {
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows + 10, "columnCount": 16 }
                    }
                }
            }]
        });
        let url = format!("{}/{}:batchUpdate", SHEETS_API, self.spreadsheet_id);
        match self.post(&url, body).await {
            Err(DigestError::Delivery { ref reason, .. }) if is_duplicate_tab(reason) => {
                debug!("sheet tab '{}' already exists, reusing it", title);
                Ok(())
            }
            other => other,
        }
    }

    async fn append_rows(&self, title: &str, values: Vec<Vec<String>>) -> Result<()> {
        let url = format!(
            "{}/{}/values/{}!A1:append?valueInputOption=USER_ENTERED",
            SHEETS_API, self.spreadsheet_id, title
        );
        self.post(&url, json!({ "values": values })).await
    }

    async fn post(&self, url: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
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
            return Err(DigestError::RateLimited);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DigestError::Delivery {
                sink: "sheets".to_string(),
                reason: format!("HTTP {}: {}", status, detail),
            });
        }
        Ok(())
    }
}

/// The batchUpdate response for a duplicate addSheet title.
fn is_duplicate_tab(reason: &str) -> bool {
    reason.contains("already exists")
}

#[async_trait]
impl Sink for SheetsSink {
    fn name(&self) -> &str {
        "sheets"
    }

    async fn deliver(&self, payload: &DigestPayload, ctx: &RunContext) -> Result<()> {
        let title = Self::tab_title(ctx);
        self.add_tab(&title, payload.rows.len()).await?;

        let mut values = Vec::with_capacity(payload.rows.len() + 1);
        values.push(sheet_header());
        values.extend(payload.rows.iter().cloned());
        self.append_rows(&title, values).await?;

        info!(
            "appended {} rows to sheet tab '{}'",
            payload.rows.len(),
            title
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_title_is_url_path_safe() {
        let ctx = RunContext::new("tw_stock", false);
        let title = SheetsSink::tab_title(&ctx);
        assert!(title.ends_with("tw_stock"));
        assert!(!title.contains(' '));
        assert!(!title.contains(':'));
    }

    #[test]
    fn duplicate_tab_response_is_not_a_failure() {
        assert!(is_duplicate_tab(
            r#"HTTP 400 Bad Request: {"error":{"code":400,"message":"Invalid requests[0].addSheet: A sheet with the name \"20260829-0900-ai\" already exists. Please enter another name.","status":"INVALID_ARGUMENT"}}"#
        ));
        assert!(!is_duplicate_tab("HTTP 403 Forbidden: permission denied"));
    }
}
