use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LineConfig;
use crate::platform::OutgoingMessage;

/// A user profile as the Messaging API reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    pub picture_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<OutgoingMessage>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<OutgoingMessage>,
}

/// Thin client for the LINE Messaging API. Every call shares one reqwest
/// client with a fixed per-request timeout; callers decide whether a failure
/// is fatal (it never is, per the failure-isolation rules).
pub struct LineClient {
    client: reqwest::Client,
    config: LineConfig,
}

impl LineClient {
    pub fn new(config: LineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    /// Fetch a user's display name and avatar. Fails on network or
    /// permission errors; callers fall back to a placeholder.
    pub async fn get_profile(&self, user_id: &str) -> Result<Profile> {
        let url = format!("{}/v2/bot/profile/{}", self.config.api_base_url, user_id);
        debug!("Fetching profile for {}", user_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.channel_access_token)
            .send()
            .await
            .context("Failed to send profile request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Profile request failed ({}): {}", status, error_body);
        }

        response
            .json()
            .await
            .context("Failed to parse profile response")
    }

    /// Reply to an event using its one-shot reply token.
    pub async fn reply(&self, reply_token: &str, message: OutgoingMessage) -> Result<()> {
        let url = format!("{}/v2/bot/message/reply", self.config.api_base_url);
        let request = ReplyRequest {
            reply_token,
            messages: vec![message],
        };
        self.send(&url, &request).await.context("Reply failed")
    }

    /// Push a message to an identity outside any reply window.
    pub async fn push(&self, to: &str, message: OutgoingMessage) -> Result<()> {
        let url = format!("{}/v2/bot/message/push", self.config.api_base_url);
        let request = PushRequest {
            to,
            messages: vec![message],
        };
        self.send(&url, &request).await.context("Push failed")
    }

    async fn send<T: Serialize>(&self, url: &str, request: &T) -> Result<()> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.channel_access_token)
            .json(request)
            .send()
            .await
            .context("Failed to send request to Messaging API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Messaging API error ({}): {}", status, error_body);
        }
        Ok(())
    }
}
