//! The HTTP seam.
//!
//! The middleware never talks to an HTTP client directly. It builds a
//! [`RequestConfig`] and hands it to a [`Transport`] implementation, which
//! resolves to a [`Response`] or rejects with a [`TransportError`].
//!
//! Transports behave like a validating HTTP client: any status outside
//! `200..300` is reported as [`TransportError::Status`] with the response
//! attached, so a `304 Not Modified` surfaces as a transport error that the
//! runtime re-classifies.

use crate::action::Params;
use crate::cancel::CancelToken;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Header map used on requests and responses
pub type Headers = BTreeMap<String, String>;

/// HTTP methods recognized by the middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// `get`; parameters travel as query params
    Get,
    /// `delete`
    Delete,
    /// `post`
    Post,
    /// `put`
    Put,
    /// `patch`
    Patch,
}

impl Method {
    /// Recognized method names, in the order they are reported in errors
    pub const NAMES: [&'static str; 5] = ["get", "delete", "post", "put", "patch"];

    /// Lower-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Delete => "delete",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
        }
    }

    /// Whether parameters are sent as a request body
    #[must_use]
    pub const fn has_body(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ApiError;

    /// Parse a method name. Matching is case-sensitive: callers must pass one
    /// of [`Method::NAMES`] verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Self::Get),
            "delete" => Ok(Self::Delete),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "patch" => Ok(Self::Patch),
            other => Err(ApiError::InvalidMethod {
                method: other.to_string(),
                allowed: Self::NAMES.to_vec(),
            }),
        }
    }
}

/// Where request parameters travel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestBody {
    /// Query string parameters
    Query(Params),
    /// JSON body payload
    Data(Params),
}

impl RequestBody {
    /// The parameters, wherever they travel
    #[must_use]
    pub const fn params(&self) -> &Params {
        match self {
            Self::Query(params) | Self::Data(params) => params,
        }
    }
}

/// A fully resolved request handed to the transport
///
/// The same configuration is reused verbatim for every polling tick.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Absolute URL (base + path)
    pub url: String,
    /// HTTP method
    pub method: Method,
    /// Request headers
    pub headers: Headers,
    /// Query params or body payload
    pub body: RequestBody,
    /// Cancellation token tied to the registry entry of this call
    pub cancel: CancelToken,
}

/// A completed HTTP response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Transport-level status code
    pub status: u16,
    /// Parsed body (JSON, or a string when the body was not JSON)
    pub data: Value,
    /// Response headers as received
    #[serde(default)]
    pub headers: Headers,
}

impl Response {
    /// Create a response with no headers
    #[must_use]
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            headers: Headers::new(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Errors reported by a [`Transport`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The server answered with a status outside `200..300`
    #[error("Request failed with status code {}", .response.status)]
    Status {
        /// The response, kept for re-classification
        response: Box<Response>,
    },

    /// The request never produced a response
    #[error("Network error: {message}")]
    Network {
        /// Underlying error description
        message: String,
    },

    /// The call was cancelled through its [`CancelToken`]
    #[error("{reason}")]
    Cancelled {
        /// Reason passed to `cancel`
        reason: String,
    },
}

impl TransportError {
    /// The response attached to this error, if any
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Status { response } => Some(response),
            _ => None,
        }
    }

    /// Whether this error is a cancellation
    #[must_use]
    pub const fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// HTTP transport abstraction
///
/// Implementations only need to execute the request; cancellation is raced
/// by the runtime against [`RequestConfig::cancel`], although transports may
/// observe the token themselves to abort early.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Status`] for non-2xx responses and
    /// [`TransportError::Network`] when no response was received.
    async fn request(&self, config: RequestConfig) -> Result<Response, TransportError>;
}
