//! Error taxonomy for API calls.
//!
//! Every failure the middleware can observe is a distinct variant of
//! [`ApiError`]. The variants fall in four groups:
//!
//! - **Configuration**: invalid method, malformed custom headers, forbidden
//!   state values. Fatal for the triggering action and never dispatched.
//! - **Transport**: anything the HTTP layer rejected, including cancellation.
//! - **Control flow**: [`ApiError::NotModified`], routed to the entity-tag
//!   callback instead of the failure handler.
//! - **Business**: bad status codes, error fields in the body, rejected polls.
//!   Always dispatched through the failure handler and re-raised.

use crate::action::RepeatValue;
use crate::transport::{Response, TransportError};
use serde_json::Value;
use thiserror::Error;

/// Message used when a response body is neither an object nor a string.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong with the API call.";

/// Error raised by a resumable success handler or one of its yielded steps.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a new handler error with the given message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors produced while executing an API action
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The transport rejected the request
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered 304 for a conditional request
    #[error("Response not modified: {message}")]
    NotModified {
        /// Description of where the condition was detected
        message: String,
        /// The response, when one was available
        response: Option<Box<Response>>,
    },

    /// The effective status code is neither 2xx nor allow-listed
    #[error("Response returned with bad status code: {status:?}")]
    BadStatusCode {
        /// Effective status (body status or transport status)
        status: Option<u16>,
        /// The offending response
        response: Box<Response>,
    },

    /// The body carried a single `error` string
    #[error("Response has an error: {0}")]
    SingleError(String),

    /// The body carried a non-empty `errors` array
    #[error("Response has {} errors", .0.len())]
    MultipleErrors(Vec<Value>),

    /// The body was not an object; the string is the server-supplied reason
    #[error("{0}")]
    ErrorMessage(String),

    /// The repeat predicate rejected the poll
    #[error("Repeat was rejected")]
    RepeatRejected(RepeatValue),

    /// The poll hit its configured tick cap
    #[error("Repeat gave up after {ticks} ticks")]
    RepeatExhausted {
        /// Number of polling calls made
        ticks: u32,
    },

    /// The custom status classifier did not produce a decision
    #[error("`handle_status_responses` is expected to return a boolean decision")]
    InvalidClassifierReturn,

    /// The HTTP method is not one of the recognized methods
    #[error("Expected method to be any of the following methods: {}, got instead {method}", .allowed.join(","))]
    InvalidMethod {
        /// The offending method
        method: String,
        /// Recognized methods
        allowed: Vec<&'static str>,
    },

    /// The custom entity-tag header builder returned something other than
    /// an object of strings
    #[error("`matching_etag_headers` is expected to return an object of strings, got instead {0}")]
    InvalidETagHeaders(Value),

    /// A state selector marked as forbidden matched a value
    #[error("`{path}` was found in the state tree when it shouldn't have been")]
    ForbiddenStateValue {
        /// Dotted path of the selector
        path: String,
    },

    /// A user handler failed with an error outside the taxonomy
    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),
}

impl ApiError {
    /// Whether this is the not-modified control-flow condition
    #[must_use]
    pub const fn is_not_modified(&self) -> bool {
        matches!(self, Self::NotModified { .. })
    }

    /// Whether this error originated from the transport layer
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether this error represents a deliberate cancellation
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Cancelled { .. }))
    }

    /// Whether this error is routed to the action's failure handler
    ///
    /// Transport errors (cancellation included) and business failures are
    /// dispatched; configuration errors, not-modified and handler errors are
    /// not.
    #[must_use]
    pub const fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::BadStatusCode { .. }
                | Self::SingleError(_)
                | Self::MultipleErrors(_)
                | Self::ErrorMessage(_)
                | Self::RepeatRejected(_)
                | Self::RepeatExhausted { .. }
        )
    }

    /// Whether this error is a fatal configuration problem
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidMethod { .. }
                | Self::InvalidETagHeaders(_)
                | Self::ForbiddenStateValue { .. }
        )
    }

    /// The response attached to this error, if any
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Transport(error) => error.response(),
            Self::NotModified { response, .. } => response.as_deref(),
            Self::BadStatusCode { response, .. } => Some(response),
            Self::RepeatRejected(RepeatValue::Response(response)) => Some(response),
            _ => None,
        }
    }
}
