//! # Message Moderation
//!
//! The relay asks a [`MessageModerator`] whether a message is spam or abuse.
//! Classification itself happens in an external service reached by
//! [`HttpModerator`]; [`NoopModerator`] is used when none is configured.

use async_trait::async_trait;
use lib_core::{AppError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub flagged: bool,
}

#[async_trait]
pub trait MessageModerator: Send + Sync {
    async fn evaluate(&self, text: &str) -> Result<Verdict>;
}

/// Lets everything through.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopModerator;

#[async_trait]
impl MessageModerator for NoopModerator {
    async fn evaluate(&self, _text: &str) -> Result<Verdict> {
        Ok(Verdict::default())
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

/// POSTs `{"text": ...}` and expects `{"flagged": bool}` back.
#[derive(Debug, Clone)]
pub struct HttpModerator {
    http: Client,
    url: String,
}

impl HttpModerator {
    /// `timeout` bounds the whole HTTP exchange; the relay applies its own
    /// deadline on top.
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build moderator HTTP client: {}", e))?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MessageModerator for HttpModerator {
    async fn evaluate(&self, text: &str) -> Result<Verdict> {
        let response = self
            .http
            .post(&self.url)
            .json(&ClassifyRequest { text })
            .send()
            .await
            .map_err(|e| AppError::Moderator(format!("request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Moderator(format!("bad status: {}", e)))?;

        let verdict = response
            .json::<Verdict>()
            .await
            .map_err(|e| AppError::Moderator(format!("unreadable verdict: {}", e)))?;

        debug!(flagged = verdict.flagged, "[RELAY] Moderator verdict");
        Ok(verdict)
    }
}
