//! Slack notifications.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::collaborators::Notifier;
use crate::config::SlackConfig;
use crate::error::{BenchError, Result};

/// Longest report excerpt posted inline.
const MAX_EXCERPT: usize = 3000;

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts finished reports to a Slack channel with `chat.postMessage`.
#[derive(Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channel: String,
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("api_url", &self.api_url)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl SlackNotifier {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        let channel = channel.into();
        let channel = if channel.starts_with('#') {
            channel
        } else {
            format!("#{channel}")
        };
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channel,
        }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(&config.api_url, &config.token, &config.channel)
    }

    fn delivery_error(message: impl Into<String>) -> BenchError {
        BenchError::Delivery {
            target: "slack".to_string(),
            message: message.into(),
        }
    }
}

fn message_text(report_path: &Path, contents: &str, url: Option<&str>) -> String {
    let name = report_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| report_path.display().to_string());

    let mut text = format!("Benchmark report `{name}`");
    if let Some(url) = url {
        text.push_str(&format!(" (<{url}|archive>)"));
    }

    let mut excerpt = contents.trim();
    if excerpt.len() > MAX_EXCERPT {
        let mut end = MAX_EXCERPT;
        while !excerpt.is_char_boundary(end) {
            end -= 1;
        }
        excerpt = &excerpt[..end];
    }
    text.push_str("\n```\n");
    text.push_str(excerpt);
    text.push_str("\n```");
    text
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, report_path: &Path, url: Option<&str>) -> Result<()> {
        let contents = tokio::fs::read_to_string(report_path)
            .await
            .map_err(|e| BenchError::io(report_path, e))?;

        let body = serde_json::json!({
            "channel": self.channel,
            "text": message_text(report_path, &contents, url),
        });

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::delivery_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::delivery_error(format!("{status}: {error_text}")));
        }

        let parsed: SlackResponse = response
            .json()
            .await
            .map_err(|e| Self::delivery_error(e.to_string()))?;
        if !parsed.ok {
            return Err(Self::delivery_error(
                parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        tracing::info!(channel = %self.channel, report = %report_path.display(), "Report posted to Slack");
        Ok(())
    }
}
