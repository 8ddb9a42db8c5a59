//! # Composable API Runtime
//!
//! Request lifecycle runtime for the Composable API middleware.
//!
//! This crate executes [`ApiAction`](composable_api_core::ApiAction)s: it
//! builds the request, enforces single-flight per REQUEST type, issues the
//! call through a [`Transport`](composable_api_core::Transport), classifies the
//! response, and dispatches the outcome back into the store.
//!
//! ## Core Components
//!
//! - **Call Registry**: in-flight calls keyed by REQUEST type
//! - **Entity-Tag Cache**: conditional requests per path
//! - **Status Classifier**: success or typed failure
//! - **Finalizer / Coroutine Driver / Repeat Controller**: success handling
//! - **Failure Routing**: not-modified callbacks and failure actions
//! - **Middleware**: the per-action entry point tying it together
//!
//! ## Example
//!
//! ```ignore
//! use composable_api_runtime::{config::MiddlewareOptions, ApiMiddleware, ReqwestTransport};
//!
//! let config = MiddlewareOptions::new()
//!     .base("https://api.example.com")
//!     .use_etags(true)
//!     .build()?;
//! let middleware = ApiMiddleware::new(config, Arc::new(ReqwestTransport::with_default_timeout()?));
//!
//! match middleware.handle(&store, &next, dispatched).await {
//!     Ok(settled) => tracing::debug!(?settled, "Call settled"),
//!     Err(error) => tracing::warn!(%error, "Call failed"),
//! }
//! ```

/// Request credential enrichment
pub mod auth;

/// Per-call state shared by the lifecycle stages
pub mod call;

/// Middleware options and validation
pub mod config;

/// Resumable success handler driver
pub mod coroutine;

/// Entity-tag memoization and conditional headers
pub mod etag;

/// Failure routing
pub mod failure;

/// Success handling of classified responses
pub mod finalize;

/// The per-action entry point
pub mod middleware;

/// In-flight call registry
pub mod registry;

/// Polling controller
pub mod repeat;

/// Request body shaping
pub mod shaper;

/// Response status classification
pub mod status;

/// `reqwest` transport
pub mod transport;

pub use call::Next;
pub use config::{ConfigError, MiddlewareConfig, MiddlewareOptions};
pub use etag::ETagCache;
pub use middleware::{forward_to_store, ApiMiddleware, MiddlewareError, Settled};
pub use registry::CallRegistry;
pub use transport::ReqwestTransport;

/// Shared tables of a middleware instance
///
/// Cloning shares the registry and the entity-tag cache, so several
/// middleware instances can single-flight and revalidate together.
#[derive(Debug, Clone, Default)]
pub struct RequestRuntime {
    /// In-flight calls
    pub registry: CallRegistry,
    /// Entity tags per path
    pub etags: ETagCache,
}

impl RequestRuntime {
    /// Create empty tables
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
