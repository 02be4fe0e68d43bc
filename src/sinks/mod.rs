pub mod sheets;
pub mod slack;

use async_trait::async_trait;
use tracing::{error, info};

use crate::compose::DigestPayload;
use crate::retry::RetryPolicy;
use crate::types::{Result, RunContext, RunStatus};

pub use sheets::SheetsSink;
pub use slack::SlackSink;

/// A delivery destination. Sinks are independent: one sink's failure must not
/// block or roll back another's delivery.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, payload: &DigestPayload, ctx: &RunContext) -> Result<()>;
}

/// Per-sink outcome of one dispatch pass.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
    pub dry_run: bool,
}

impl DeliveryReport {
    pub fn status(&self) -> RunStatus {
        if self.dry_run || self.failed.is_empty() {
            RunStatus::Success
        } else if self.delivered.is_empty() {
            RunStatus::Degraded
        } else {
            RunStatus::Partial
        }
    }
}

/// Send the composed payload to each sink in turn, retrying per sink and
/// recording failures without aborting the rest. In dry-run mode the rendered
/// payload is logged and no sink is called at all.
pub async fn dispatch(
    sinks: &[Box<dyn Sink>],
    payload: &DigestPayload,
    ctx: &RunContext,
    policy: &RetryPolicy,
) -> DeliveryReport {
    let mut report = DeliveryReport {
        dry_run: ctx.dry_run,
        ..DeliveryReport::default()
    };

    if ctx.dry_run {
        info!(
            "dry run: composed {} archive rows; chat payload:\n{}",
            payload.rows.len(),
            serde_json::to_string_pretty(&payload.slack)
                .unwrap_or_else(|_| "<unrenderable>".to_string())
        );
        return report;
    }

    for sink in sinks {
        let name = sink.name().to_string();
        match policy
            .run(&format!("delivery to {}", name), || {
                sink.deliver(payload, ctx)
            })
            .await
        {
            Ok(()) => {
                info!("delivered digest to {}", name);
                report.delivered.push(name);
            }
            Err(e) => {
                error!("delivery to {} failed after retries: {}", name, e);
                report.failed.push(name);
            }
        }
    }

    report
}
