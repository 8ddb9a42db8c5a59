//! Cancellation tokens for in-flight calls.
//!
//! A [`CancelSource`] is created per dispatched API action. Its token travels
//! with the [`RequestConfig`](crate::transport::RequestConfig); the source is
//! stored in the call registry so a newer call sharing the same request type
//! can cancel it.

use std::sync::Arc;
use tokio::sync::watch;

/// Owning side of a cancellation pair
///
/// Cloning shares the same underlying signal.
#[derive(Debug, Clone)]
pub struct CancelSource {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl CancelSource {
    /// Create a fresh, uncancelled source
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Token observing this source
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }

    /// Cancel with a reason
    ///
    /// Only the first call has an effect; later reasons are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    /// Whether `cancel` has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.sender.borrow().is_some()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observing side of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<Option<String>>,
}

impl CancelToken {
    /// A token that is never cancelled
    #[must_use]
    pub fn never() -> Self {
        CancelSource::new().token()
    }

    /// Whether the source has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    /// The cancellation reason, if cancelled
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.receiver.borrow().clone()
    }

    /// Wait until cancelled and return the reason
    ///
    /// Never resolves if the source is dropped without cancelling.
    pub async fn cancelled(&self) -> String {
        let mut receiver = self.receiver.clone();
        loop {
            let current = receiver.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let source = CancelSource::new();
        let token = source.token();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        source.cancel("FETCH_USER call was canceled.");

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(reason, Ok(Ok(ref r)) if r == "FETCH_USER call was canceled."));
    }

    #[test]
    fn test_first_reason_wins() {
        let source = CancelSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());

        source.cancel("first");
        source.cancel("second");

        assert!(source.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("first"));
    }

    #[test]
    fn test_cancelled_pends_until_cancel() {
        let source = CancelSource::new();
        let token = source.token();
        let mut waiter = tokio_test::task::spawn(token.cancelled());

        tokio_test::assert_pending!(waiter.poll());
        source.cancel("stop");
        assert!(waiter.is_woken());
        tokio_test::assert_ready_eq!(waiter.poll(), "stop".to_string());
    }

    #[tokio::test]
    async fn test_never_token_stays_pending() {
        let token = CancelToken::never();
        let result = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(result.is_err());
    }
}
