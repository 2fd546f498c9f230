//! The BaaS client handle.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;

use crate::config::{ClientConfig, ConfigError};
use crate::error::{ClientError, Result};
use crate::realtime::RealtimeClient;

/// Explicitly constructed BaaS client.
///
/// Cheap to clone; every clone shares one HTTP connection pool and one
/// realtime connection.
#[derive(Debug, Clone)]
pub struct BaasClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    realtime: RealtimeClient,
}

impl BaasClient {
    /// Create a client for the BaaS at `config.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        base_url(&config.base_url)?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        let realtime = RealtimeClient::new(http.clone(), config.clone());

        tracing::debug!(base_url = %config.base_url, "BaaS client created");

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                realtime,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The realtime subscriber sharing this client's connection.
    pub fn realtime(&self) -> &RealtimeClient {
        &self.inner.realtime
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }
}

/// Parse the configured base URL.
pub(crate) fn base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidBaseUrl(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl(raw.to_string()).into());
    }
    Ok(url)
}

/// Build `{base}/seg/seg/...`, percent-encoding each segment.
pub(crate) fn endpoint(config: &ClientConfig, segments: &[&str]) -> Result<Url> {
    let mut url = base_url(&config.base_url)?;
    url.path_segments_mut()
        .map_err(|_| ConfigError::InvalidBaseUrl(config.base_url.clone()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Attach the bearer token, if any.
pub(crate) fn authorize(builder: RequestBuilder, config: &ClientConfig) -> RequestBuilder {
    match &config.auth_token {
        Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
        None => builder,
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Turn a non-success response into [`ClientError::Api`].
pub(crate) async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_and_encodes_segments() {
        let config = ClientConfig::new("http://localhost:8090/base/");
        let url = endpoint(&config, &["api", "collections", "my messages", "records"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8090/base/api/collections/my%20messages/records"
        );

        let config = ClientConfig::new("http://localhost:8090");
        let url = endpoint(&config, &["api", "realtime"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8090/api/realtime");
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = BaasClient::new(ClientConfig::new("not a url")).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Config(ConfigError::InvalidBaseUrl(_))
        ));

        assert!(base_url("mailto:agent@roost.example").is_err());
    }
}
