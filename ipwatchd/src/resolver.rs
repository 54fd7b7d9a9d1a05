use std::future::Future;
use std::time::Duration;
use anyhow::{Context, Result};
use serde::Deserialize;
use shared::protocol::SENTINEL_IP;

/// Looks up the caller's public address.
///
/// `resolve` never fails: any lookup failure is reported as [`SENTINEL_IP`],
/// which the poller records like any other address.
pub trait Resolver: Send + Sync + 'static {
    fn resolve(&self) -> impl Future<Output = String> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("lookup service answered {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed lookup response: {0}")]
    Malformed(reqwest::Error),

    #[error("lookup service returned an empty address")]
    EmptyAddress,
}

#[derive(Deserialize)]
struct LookupResponse {
    ip: String,
}

/// Resolver backed by an HTTP lookup service answering `{"ip": "..."}`
pub struct HttpResolver {
    client: reqwest::Client,
    url: String,
}

impl HttpResolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for address lookup")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub async fn lookup(&self) -> Result<String, ResolveError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status));
        }

        let body: LookupResponse = response.json().await.map_err(ResolveError::Malformed)?;
        let ip = body.ip.trim();
        if ip.is_empty() {
            return Err(ResolveError::EmptyAddress);
        }

        Ok(ip.to_string())
    }
}

impl Resolver for HttpResolver {
    async fn resolve(&self) -> String {
        match self.lookup().await {
            Ok(ip) => ip,
            Err(e) => {
                tracing::warn!(url = %self.url, "Failed to get IP address: {}", e);
                SENTINEL_IP.to_string()
            }
        }
    }
}
