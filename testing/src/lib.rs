//! # Composable API Testing
//!
//! Testing utilities for the Composable API middleware.
//!
//! This crate provides:
//! - [`MockTransport`]: a scripted transport recording every request
//! - [`RecordingStore`]: a store recording every dispatched action
//! - [`RecordingNext`]: a `next` recording every forwarded envelope
//! - [`TestAction`]: an action type covering middleware events and outcomes
//!
//! ## Example
//!
//! ```ignore
//! use composable_api_testing::{MockTransport, RecordingNext, RecordingStore, TestAction};
//!
//! #[tokio::test]
//! async fn test_fetch_user() {
//!     let transport = MockTransport::new().respond(200, json!({"user": {"name": "Alejandro"}}));
//!     let store = RecordingStore::new(json!({}));
//!     let next = RecordingNext::new();
//!
//!     middleware.handle(&store.access(), &next.handle(), fetch_user().into()).await?;
//!
//!     assert_eq!(store.actions().len(), 1);
//! }
//! ```

/// Store and chain recorders
pub mod store_mocks;

/// Scripted transport
pub mod transport_mocks;

pub use store_mocks::{RecordingNext, RecordingStore, TestAction};
pub use transport_mocks::{MockTransport, Reply};

/// Install a test subscriber honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
