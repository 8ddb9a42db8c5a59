//! Success handling of a classified response.

use crate::call::CallContext;
use crate::coroutine;
use composable_api_core::error::GENERIC_FAILURE_MESSAGE;
use composable_api_core::{ApiError, MiddlewareEvent, Response, SuccessHandler, Value};

/// How a successful response was handled
#[derive(Debug)]
pub enum Finalized<A> {
    /// The plain success handler ran (or there was none)
    Dispatched(Response),
    /// A resumable handler ran; `None` when it failed
    Coroutine(Option<A>),
    /// A repeat predicate is present; polling continues
    Repeat(Response),
}

/// Reject bodies that are not structured data
///
/// A string body is taken as the server's failure reason.
///
/// # Errors
///
/// Returns [`ApiError::ErrorMessage`] for anything but an object or array.
pub fn validate_body(response: &Response) -> Result<(), ApiError> {
    match &response.data {
        Value::Object(_) | Value::Array(_) => Ok(()),
        Value::String(reason) => Err(ApiError::ErrorMessage(reason.clone())),
        _ => Err(ApiError::ErrorMessage(GENERIC_FAILURE_MESSAGE.to_string())),
    }
}

/// Run the success side of a call
///
/// Resumable handlers take precedence over polling. A poll leaves the
/// registry before its first tick, so a later call sharing its key starts
/// alongside it instead of cancelling it.
///
/// # Errors
///
/// Returns the error of [`validate_body`].
pub(crate) async fn finalize<A, S>(
    response: Response,
    ctx: &CallContext<A, S>,
) -> Result<Finalized<A>, ApiError>
where
    A: Clone + From<MiddlewareEvent>,
{
    validate_body(&response)?;

    if let SuccessHandler::Coroutine(start) = &ctx.success {
        return Ok(Finalized::Coroutine(
            coroutine::drive(start, response, ctx).await,
        ));
    }

    ctx.release();
    if ctx.repeat.is_some() {
        return Ok(Finalized::Repeat(response));
    }

    ctx.dispatch_success(ctx.success_data(response.clone()));
    Ok(Finalized::Dispatched(response))
}
