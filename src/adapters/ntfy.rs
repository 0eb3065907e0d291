//! Push notifications via an ntfy-style topic endpoint.
//!
//! Notifications are fire-and-forget: the executor logs a failed publish
//! and moves on, so a flaky notification channel can never mask a build
//! outcome.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::Notifier;

/// Notification priority, mapped to the `Priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Low,
    #[default]
    Default,
    High,
}

impl Priority {
    fn header_value(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Default => "default",
            Self::High => "high",
        }
    }
}

/// One notification to publish.
///
/// The topic rides along on the notice because `NTFY_TOPIC` is runtime
/// configurable; the publisher itself is built once at startup.
#[derive(Debug, Clone, Default)]
pub struct Notice {
    pub topic: Option<String>,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub tags: Vec<String>,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn topic(mut self, topic: Option<String>) -> Self {
        self.topic = topic;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// ntfy publisher for one server.
pub struct NtfyNotifier {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl NtfyNotifier {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn target_url(&self, topic: &str) -> String {
        format!("{}/{}", self.url, topic)
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn publish(&self, notice: &Notice) -> Result<()> {
        let Some(topic) = notice.topic.as_deref().filter(|t| !t.is_empty()) else {
            debug!(title = %notice.title, "No notification topic configured, skipping");
            return Ok(());
        };

        let mut request = self
            .client
            .post(self.target_url(topic))
            .timeout(Duration::from_secs(10))
            .header("Priority", notice.priority.header_value())
            .body(notice.message.clone());

        // Header values must be Latin-1; replace anything that is not.
        if !notice.title.is_empty() {
            let title: String = notice
                .title
                .chars()
                .map(|c| if c.is_ascii() { c } else { '?' })
                .collect();
            request = request.header("Title", title);
        }
        if !notice.tags.is_empty() {
            request = request.header("Tags", notice.tags.join(","));
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .context("Failed to publish notification")?
            .error_for_status()
            .context("Notification rejected")?;

        Ok(())
    }
}

/// Notifier stand-in when push notifications are not configured.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn publish(&self, _notice: &Notice) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_url_joins_topic() {
        let notifier = NtfyNotifier::new("https://ntfy.example.org/", None);
        assert_eq!(
            notifier.target_url("builds"),
            "https://ntfy.example.org/builds"
        );
    }

    #[test]
    fn test_notice_builder() {
        let notice = Notice::new("Build Complete", "done")
            .topic(Some("builds".to_string()))
            .priority(Priority::High)
            .tags(&["trophy"]);
        assert_eq!(notice.priority.header_value(), "high");
        assert_eq!(notice.tags, vec!["trophy"]);
        assert_eq!(notice.topic.as_deref(), Some("builds"));
    }

    #[tokio::test]
    async fn test_publish_without_topic_is_a_noop() {
        let notifier = NtfyNotifier::new("https://ntfy.example.org", None);
        let notice = Notice::new("t", "m");
        assert!(notifier.publish(&notice).await.is_ok());
    }
}
