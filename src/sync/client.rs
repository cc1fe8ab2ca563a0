//! Transport to the authoritative sync server.
//!
//! The reconciler only talks to the [`Transport`] trait; the production
//! implementation speaks the server's HTTP API with a shared-key bearer
//! token.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use crate::models::{Item, Kind};

#[derive(Debug)]
pub enum TransportError {
    /// Network-level failure, including timeouts.
    Request(reqwest::Error),
    /// The server answered with an unexpected status.
    Status(u16, String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Request(e) => write!(f, "request failed: {}", e),
            TransportError::Status(code, body) => {
                write!(f, "server returned status {}: {}", code, body)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Request(e) => Some(e),
            TransportError::Status(..) => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e)
    }
}

/// Push/pull channel to the authoritative store.
pub trait Transport {
    /// Idempotent upsert of a batch; the server stamps every item's
    /// `updated` on receipt.
    async fn update(&self, items: &[Item]) -> Result<(), TransportError>;

    /// Every item of the requested kinds whose server timestamp is at or
    /// after `since` (`None` means everything), tombstones included.
    async fn updated(
        &self,
        kinds: &[Kind],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Item>, TransportError>;
}

/// HTTP transport against a `dayplan-server` instance.
pub struct HttpTransport {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }
}

impl Transport for HttpTransport {
    async fn update(&self, items: &[Item]) -> Result<(), TransportError> {
        let response = self
            .client
            .post(format!("{}/sync", self.base_url))
            .bearer_auth(&self.api_key)
            .json(items)
            .send()
            .await?;

        if response.status() != StatusCode::NO_CONTENT {
            let code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status(code, body));
        }

        Ok(())
    }

    async fn updated(
        &self,
        kinds: &[Kind],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Item>, TransportError> {
        let ks = kinds
            .iter()
            .map(Kind::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let mut request = self
            .client
            .get(format!("{}/sync", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("ks", ks.as_str())]);
        if let Some(ts) = since {
            request = request.query(&[("ts", ts.to_rfc3339())]);
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            let code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status(code, body));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_strips_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:8092/", "key").unwrap();
        assert_eq!(transport.base_url, "http://localhost:8092");
    }
}
