//! Scripted HTTP transport for deterministic tests
//!
//! [`MockTransport`] answers requests from a queue of [`Reply`]s and records
//! every request it receives. Like a validating HTTP client, a scripted
//! response outside `200..300` is reported as
//! [`TransportError::Status`].

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Mutex poisoning only follows a failed test

use async_trait::async_trait;
use composable_api_core::{RequestConfig, Response, Transport, TransportError, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A scripted answer
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with this response
    Respond(Response),
    /// Reject with this error
    Fail(TransportError),
    /// Answer after a delay
    Delayed(Duration, Box<Reply>),
    /// Never answer; only cancellation ends the call
    Pending,
}

/// Transport answering from a script
///
/// Cloning shares the script and the recorded requests.
///
/// # Example
///
/// ```
/// use composable_api_testing::MockTransport;
/// use serde_json::json;
///
/// let transport = MockTransport::new()
///     .respond(200, json!({"user": {"name": "Alejandro"}}))
///     .respond(500, json!({}));
/// assert_eq!(transport.remaining(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<RequestConfig>>>,
}

impl MockTransport {
    /// Create a transport with an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply
    #[must_use]
    pub fn reply(self, reply: Reply) -> Self {
        self.push(reply);
        self
    }

    /// Queue a response
    #[must_use]
    pub fn respond(self, status: u16, data: Value) -> Self {
        self.reply(Reply::Respond(Response::new(status, data)))
    }

    /// Queue a full response, headers included
    #[must_use]
    pub fn respond_with(self, response: Response) -> Self {
        self.reply(Reply::Respond(response))
    }

    /// Queue a response delivered after `delay`
    #[must_use]
    pub fn respond_after(self, delay: Duration, status: u16, data: Value) -> Self {
        self.reply(Reply::Delayed(
            delay,
            Box::new(Reply::Respond(Response::new(status, data))),
        ))
    }

    /// Queue a network failure
    #[must_use]
    pub fn fail_network(self, message: &str) -> Self {
        self.reply(Reply::Fail(TransportError::Network {
            message: message.to_string(),
        }))
    }

    /// Queue a call that never answers
    #[must_use]
    pub fn hang(self) -> Self {
        self.reply(Reply::Pending)
    }

    /// Queue a reply on a shared handle
    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Every request received, in order
    #[must_use]
    pub fn requests(&self) -> Vec<RequestConfig> {
        self.requests.lock().unwrap().clone()
    }

    /// The most recent request
    #[must_use]
    pub fn last_request(&self) -> Option<RequestConfig> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Number of requests received
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of replies not yet consumed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

async fn deliver(reply: Reply) -> Result<Response, TransportError> {
    let mut reply = reply;
    loop {
        match reply {
            Reply::Respond(response) if (200..300).contains(&response.status) => {
                return Ok(response);
            }
            Reply::Respond(response) => {
                return Err(TransportError::Status {
                    response: Box::new(response),
                });
            }
            Reply::Fail(error) => return Err(error),
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            Reply::Pending => std::future::pending::<()>().await,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, config: RequestConfig) -> Result<Response, TransportError> {
        self.requests.lock().unwrap().push(config);
        let reply = self.replies.lock().unwrap().pop_front();

        match reply {
            Some(reply) => deliver(reply).await,
            None => Err(TransportError::Network {
                message: "no scripted reply left".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composable_api_core::transport::Headers;
    use composable_api_core::{CancelToken, Method, Params, RequestBody};
    use serde_json::json;

    fn request() -> RequestConfig {
        RequestConfig {
            url: "http://localhost/users".to_string(),
            method: Method::Get,
            headers: Headers::new(),
            body: RequestBody::Query(Params::new()),
            cancel: CancelToken::never(),
        }
    }

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let transport = MockTransport::new()
            .respond(200, json!({"n": 1}))
            .respond(404, json!({"n": 2}));

        let first = transport.request(request()).await.unwrap();
        assert_eq!(first.data, json!({"n": 1}));

        let second = transport.request(request()).await.unwrap_err();
        assert_eq!(second.response().map(|r| r.status), Some(404));

        let exhausted = transport.request(request()).await.unwrap_err();
        assert!(matches!(exhausted, TransportError::Network { .. }));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_delayed_reply() {
        let transport =
            MockTransport::new().respond_after(Duration::from_millis(5), 200, json!({}));
        assert!(transport.request(request()).await.is_ok());
    }
}
