//! # Composable API Core
//!
//! Core types and traits for the Composable API request middleware.
//!
//! The middleware sits between an application's action-dispatch layer and an
//! HTTP transport. Applications dispatch an [`ApiAction`](action::ApiAction)
//! describing a call; the runtime executes it and feeds the outcome back into
//! the store as success or failure actions.
//!
//! ## Core Concepts
//!
//! - **Dispatched**: The envelope flowing through the middleware chain
//!   (ordinary application actions or API call descriptors)
//! - **ApiAction / Payload**: What to call and how to react to the outcome
//! - **Store**: The `{dispatch, get_state}` pair the middleware talks to
//! - **Transport**: The HTTP seam, injected as a trait object
//! - **Resumable**: Success handlers that perform sequential follow-up steps
//!
//! ## Example
//!
//! ```ignore
//! use composable_api_core::action::{ApiAction, Payload};
//!
//! let action = ApiAction::new("API", ["FETCH_USER", "FETCH_USER_SUCCESS", "FETCH_USER_FAILED"])
//!     .with_payload(|_ctx| {
//!         Payload::new("/users/fetch").on_success(|ctx| AppAction::UserLoaded(ctx.data.body().clone()))
//!     });
//!
//! middleware.handle(&store, &next, action.into()).await?;
//! ```

pub mod action;
pub mod cancel;
pub mod error;
pub mod resumable;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use action::{
    ApiAction, CallTypes, Dispatched, ETagCallback, Meta, MiddlewareEvent, NotModifiedContext,
    Params, Payload, PayloadContext, RepeatDecision, RepeatValue, SuccessContext, SuccessData,
    SuccessHandler, TapContext, TransportOverrides,
};
pub use cancel::{CancelSource, CancelToken};
pub use error::{ApiError, HandlerError};
pub use resumable::{Resume, Resumable, Step, Yielded};
pub use store::{Dispatcher, StoreAccess};
pub use transport::{Method, RequestBody, RequestConfig, Response, Transport, TransportError};
pub use serde_json::Value;
