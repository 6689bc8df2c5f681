//! Report delivery targets

use crate::config::DeliverySettings;
use crate::error::TrackerError;
use crate::metrics::MetricsCollector;
use crate::report::RenderedReport;
use crate::types::ChannelId;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on one chat message body
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Where finished reports go
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Label used in logs and metrics
    fn name(&self) -> &'static str;

    async fn deliver(&self, channel_id: ChannelId, report: &RenderedReport) -> crate::error::Result<()>;
}

/// Deliver through `sink`, counting the outcome
pub async fn deliver_with_metrics(
    sink: &dyn ReportSink,
    metrics: Option<&MetricsCollector>,
    channel_id: ChannelId,
    report: &RenderedReport,
) -> crate::error::Result<()> {
    let result = sink.deliver(channel_id, report).await;
    if let Some(metrics) = metrics {
        metrics.record_delivery(sink.name(), result.is_ok());
    }
    result
}

/// Writes reports to the log
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, channel_id: ChannelId, report: &RenderedReport) -> crate::error::Result<()> {
        info!("Report for channel {}: {}", channel_id, report.title);
        for line in report.body.lines() {
            info!("  {}", line);
        }
        if let Some(attachment) = &report.attachment {
            info!(
                "  attachment {} ({} bytes)",
                attachment.filename,
                attachment.content.len()
            );
        }
        Ok(())
    }
}

/// Posts reports to chat webhooks, one URL per channel
pub struct WebhookSink {
    client: reqwest::Client,
    delivery: DeliverySettings,
}

impl WebhookSink {
    pub fn new(delivery: DeliverySettings, timeout: Duration) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, delivery })
    }

    /// Message bodies for a report: the title and body, then the
    /// attachment as a JSON block, each split to fit one message
    pub fn messages(report: &RenderedReport) -> Vec<String> {
        let mut messages = Vec::new();
        let header = format!("**{}**\n", report.title);
        let mut body_chunks = code_blocks("", &report.body, MAX_MESSAGE_LEN.saturating_sub(header.chars().count()));
        if let Some(first) = body_chunks.first_mut() {
            first.insert_str(0, &header);
        }
        messages.extend(body_chunks);

        if let Some(attachment) = &report.attachment {
            let header = format!("`{}`\n", attachment.filename);
            let mut chunks = code_blocks("json", &attachment.content, MAX_MESSAGE_LEN.saturating_sub(header.chars().count()));
            if let Some(first) = chunks.first_mut() {
                first.insert_str(0, &header);
            }
            messages.extend(chunks);
        }
        messages
    }
}

#[async_trait]
impl ReportSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, channel_id: ChannelId, report: &RenderedReport) -> crate::error::Result<()> {
        let url = self
            .delivery
            .webhook_for(channel_id)
            .ok_or_else(|| TrackerError::ConfigurationError {
                message: format!("No webhook configured for channel {}", channel_id),
            })?;

        for content in Self::messages(report) {
            let response = self
                .client
                .post(url)
                .json(&json!({ "content": content }))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                warn!("Webhook for channel {} returned {}", channel_id, status);
                return Err(TrackerError::InternalError {
                    message: format!("webhook delivery failed with status {}", status),
                }
                .into());
            }
        }

        debug!("Delivered '{}' to channel {}", report.title, channel_id);
        Ok(())
    }
}

/// Wrap `text` in fenced blocks of at most `limit` characters each,
/// splitting on line boundaries
fn code_blocks(lang: &str, text: &str, limit: usize) -> Vec<String> {
    let fence_len = "```".len() * 2 + lang.len() + 2;
    let room = limit.saturating_sub(fence_len).max(1);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.lines() {
        let line: String = line.chars().take(room).collect();
        let line_len = line.chars().count();
        if current_len > 0 && current_len + line_len + 1 > room {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&line);
        current_len += line_len;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .map(|chunk| format!("```{}\n{}\n```", lang, chunk))
        .collect()
}

/// Sink shared between the scheduler and the CLI
pub type SharedSink = Arc<dyn ReportSink>;
