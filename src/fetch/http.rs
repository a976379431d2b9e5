//! `reqwest`-backed [`HttpSource`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::HttpSource;
use crate::types::FetchError;

pub const DEFAULT_USER_AGENT: &str = "RISKPULSE/0.1.0";

pub struct ReqwestSource {
    http: Client,
}

impl ReqwestSource {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpSource for ReqwestSource {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url, status = %status, "Non-success response");
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Transport(format!("failed to read body: {e}")))
    }
}
