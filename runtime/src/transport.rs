//! HTTP transport on `reqwest`.
//!
//! [`ReqwestTransport`] behaves like a validating HTTP client: a response
//! outside `200..300` is reported as [`TransportError::Status`] with the
//! parsed response attached. Bodies are parsed as JSON and fall back to a
//! string when they are not JSON.

use async_trait::async_trait;
use composable_api_core::action::Params;
use composable_api_core::transport::Headers;
use composable_api_core::{
    Method, RequestBody, RequestConfig, Response, Transport, TransportError, Value,
};
use std::time::Duration;

/// Default client timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Transport`] backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Create a transport with [`DEFAULT_TIMEOUT`]
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the client cannot be built.
    pub fn with_default_timeout() -> Result<Self, TransportError> {
        Self::new(DEFAULT_TIMEOUT)
    }

    /// Wrap an existing client
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

const fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Delete => reqwest::Method::DELETE,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
    }
}

fn query_pairs(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, config: RequestConfig) -> Result<Response, TransportError> {
        let mut request = self
            .client
            .request(http_method(config.method), &config.url);

        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        request = match &config.body {
            RequestBody::Query(params) => request.query(&query_pairs(params)),
            RequestBody::Data(params) => request.json(params),
        };

        let response = request.send().await.map_err(|e| TransportError::Network {
            message: format!("HTTP request failed: {e}"),
        })?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or("<invalid>").to_string(),
                )
            })
            .collect();

        let text = response.text().await.map_err(|e| TransportError::Network {
            message: format!("Failed to read response: {e}"),
        })?;

        let response = Response {
            status,
            data: parse_body(text),
            headers,
        };

        if (200..300).contains(&status) {
            Ok(response)
        } else {
            Err(TransportError::Status {
                response: Box::new(response),
            })
        }
    }
}

/// Issue a request, racing it against the call's cancellation token
///
/// A fired token wins over an in-flight request and yields
/// [`TransportError::Cancelled`]; a token fired before issuance skips the
/// request entirely.
pub(crate) async fn send(
    transport: &dyn Transport,
    config: RequestConfig,
) -> Result<Response, TransportError> {
    let token = config.cancel.clone();
    if let Some(reason) = token.reason() {
        return Err(TransportError::Cancelled { reason });
    }

    tokio::select! {
        biased;
        reason = token.cancelled() => Err(TransportError::Cancelled { reason }),
        result = transport.request(config) => result,
    }
}
