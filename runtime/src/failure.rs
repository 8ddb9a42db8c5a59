//! Failure routing.
//!
//! Every error raised after a call was registered ends up here. A transport
//! rejection carrying a `304` is first re-classified as not-modified, which is
//! routed to the action's not-modified callback and settles the call
//! normally. Any other error is dispatched through the action's failure
//! handler when it belongs to the dispatchable taxonomy, logged, and returned
//! to the caller.

use crate::call::CallContext;
use crate::middleware::{MiddlewareError, Settled};
use composable_api_core::{ApiError, ETagCallback, NotModifiedContext, TransportError};

/// Re-classify a transport `304` as not-modified
#[must_use]
pub fn normalize(error: ApiError) -> ApiError {
    match error {
        ApiError::Transport(TransportError::Status { response }) if response.status == 304 => {
            ApiError::NotModified {
                message: format!("Request failed with status code {}", response.status),
                response: Some(response),
            }
        }
        other => other,
    }
}

/// Route a failed call
///
/// # Errors
///
/// Returns [`MiddlewareError::RequestFailed`] for everything but
/// not-modified.
pub(crate) fn handle_error<A, S>(
    error: ApiError,
    ctx: &CallContext<A, S>,
) -> Result<Settled<A>, MiddlewareError>
where
    A: Clone,
{
    let error = normalize(error);
    ctx.release();

    if error.is_not_modified() {
        metrics::counter!("api.request.not_modified").increment(1);
        tracing::debug!(request_type = %ctx.types.request, path = %ctx.path, "Response not modified");

        match &ctx.etag_callback {
            ETagCallback::None => {}
            ETagCallback::Action(action) => ctx.store.dispatch(action.clone()),
            ETagCallback::Handler(callback) => callback(NotModifiedContext {
                kind: ctx.types.request.clone(),
                path: ctx.path.clone(),
                etag: ctx.runtime.etags.get(&ctx.path),
                store: ctx.store.clone(),
            }),
        }
        return Ok(Settled::NotModified);
    }

    if error.is_dispatchable() {
        ctx.store.dispatch(ctx.failure_action(&error));
    }

    if error.is_cancellation() {
        metrics::counter!("api.request.cancelled").increment(1);
    } else {
        metrics::counter!("api.request.failed").increment(1);
    }

    if error.is_cancellation() && ctx.config.warn_on_cancellation() {
        tracing::warn!(request_type = %ctx.types.request, reason = %error, "Call cancelled");
    } else {
        tracing::error!(request_type = %ctx.types.request, %error, "Call failed");
    }

    Err(MiddlewareError::RequestFailed {
        request_type: ctx.types.request.clone(),
        source: error,
    })
}
