//! Notifier (C7): structured failure events to chat/ticket sinks (§4.1 "C7"
//! in the component table, §7 "Notifier events are best-effort and never
//! block the engine").
//!
//! Resolves the source's swapped `jira=`/`teams=` keyword-argument open
//! question (§9) by dropping positional/boolean routing entirely: a sink
//! fires whenever its target URL is configured for the firing family,
//! determined by key (`ms-teams` / `jira`) rather than call-site order.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::settings::NotificationTargets;

#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub client: String,
    pub operation: String,
    pub status: String,
    pub message: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> anyhow::Result<()>;
    fn name(&self) -> &'static str;
}

/// Webhook sink shared by both the MS Teams and Jira targets — both are
/// JSON-POST webhook endpoints in practice (Jira via an email-to-webhook or
/// Automation-rule relay); ticket/email delivery proper is the out-of-scope
/// notification transport (§1).
pub struct WebhookSink {
    name: &'static str,
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(name: &'static str, url: String) -> Self {
        WebhookSink {
            name,
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

pub struct Notifier {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl Notifier {
    pub fn from_targets(targets: &NotificationTargets) -> Self {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
        if let Some(url) = &targets.ms_teams {
            sinks.push(Box::new(WebhookSink::new("ms-teams", url.clone())));
        }
        if let Some(url) = &targets.jira {
            sinks.push(Box::new(WebhookSink::new("jira", url.clone())));
        }
        Notifier { sinks }
    }

    pub fn disabled() -> Self {
        Notifier { sinks: Vec::new() }
    }

    /// Fires `event` at every configured sink. Best-effort: a sink failure
    /// is logged and does not propagate, so a broken webhook can never
    /// stall an engine (§7).
    pub async fn notify(&self, event: NotificationEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(&event).await {
                tracing::warn!(sink = sink.name(), error = %e, "notification delivery failed");
            }
        }
    }
}
