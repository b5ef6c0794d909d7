use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{Result, WeatherError};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Status line and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Body text exactly as received.
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a GET and hands back the raw response.
///
/// Only transport failures are errors here; non-2xx replies come back as-is,
/// since OpenWeather reports failures through `cod` / `message` in the body.
#[async_trait]
pub trait HttpFetcher: Send + Sync + Debug {
    async fn fetch(&self, url: &str, params: &[(&'static str, String)]) -> Result<RawResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    http: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| WeatherError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, params: &[(&'static str, String)]) -> Result<RawResponse> {
        let res = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| WeatherError::Transport(format!("GET {url}: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| WeatherError::Transport(format!("Failed to read response body: {e}")))?;

        Ok(RawResponse::new(status.as_u16(), body))
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
