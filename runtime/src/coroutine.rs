//! Resumable success handler driver.
//!
//! Drives a [`Resumable`] handler step by step: futures are awaited, thunks
//! are invoked, plain values are passed straight back. A failed step is fed
//! back through [`Resumable::resume_with_error`] so the handler can recover.
//!
//! Once the handler completes, the call's registry entry is cleared and the
//! completion action (or a void marker when there is none) is forwarded down
//! the middleware chain. A handler failure is logged, never dispatched.

use crate::call::CallContext;
use composable_api_core::action::CoroutineFn;
use composable_api_core::{
    Dispatched, HandlerError, MiddlewareEvent, Response, Resumable, Step, SuccessData, Value,
    Yielded,
};

/// Run a handler until it completes
///
/// The first resume receives [`Value::Null`].
///
/// # Errors
///
/// Returns the error the handler aborted with.
pub async fn run_to_completion<A>(
    mut handler: Box<dyn Resumable<A>>,
) -> Result<Option<A>, HandlerError> {
    let mut step = handler.resume(Value::Null)?;

    loop {
        let yielded = match step {
            Step::Complete(action) => return Ok(action),
            Step::Yield(yielded) => yielded,
        };

        let settled = match yielded {
            Yielded::Future(future) => future.await,
            Yielded::Thunk(thunk) => thunk(),
            Yielded::Value(value) => Ok(value),
        };

        step = match settled {
            Ok(value) => handler.resume(value)?,
            Err(error) => handler.resume_with_error(error)?,
        };
    }
}

/// Start the handler on the response body and drive it
///
/// Returns the action forwarded down the chain, or `None` if the handler
/// failed.
pub(crate) async fn drive<A, S>(
    start: &CoroutineFn<A, S>,
    response: Response,
    ctx: &CallContext<A, S>,
) -> Option<A>
where
    A: Clone + From<MiddlewareEvent>,
{
    let handler = start(ctx.success_context(SuccessData::Body(response.data)));
    let outcome = run_to_completion(handler).await;
    ctx.release();

    match outcome {
        Ok(action) => {
            let action = action.unwrap_or_else(|| {
                A::from(MiddlewareEvent::Void {
                    kind: ctx.config.constants().api_void.clone(),
                    last_action: ctx.types.request.clone(),
                })
            });
            (ctx.next)(Dispatched::Action(action.clone()));
            Some(action)
        }
        Err(error) => {
            metrics::counter!("api.coroutine.failed").increment(1);
            tracing::error!(
                request_type = %ctx.types.request,
                %error,
                "Resumable success handler had an error"
            );
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use composable_api_core::resumable::{self, Resume};
    use serde_json::json;

    #[tokio::test]
    async fn test_settles_every_kind_of_step() {
        let mut stage = 0;
        let handler = resumable::from_fn(move |input: Resume| {
            stage += 1;
            match (stage, input) {
                (1, Resume::Value(v)) => {
                    assert_eq!(v, Value::Null);
                    Ok(Step::Yield(Yielded::future(async { Ok(json!(1)) })))
                }
                (2, Resume::Value(v)) => {
                    Ok(Step::Yield(Yielded::thunk(move || Ok(json!(v.as_i64().unwrap() + 1)))))
                }
                (3, Resume::Value(v)) => Ok(Step::Yield(Yielded::Value(json!(v.as_i64().unwrap() * 10)))),
                (_, Resume::Value(v)) => Ok(Step::Complete(Some(v))),
                (_, Resume::Error(e)) => Err(e),
            }
        });

        let action = run_to_completion(handler).await.unwrap();
        assert_eq!(action, Some(json!(20)));
    }

    #[tokio::test]
    async fn test_failed_step_can_be_recovered() {
        let mut started = false;
        let handler = resumable::from_fn(move |input: Resume| {
            if !started {
                started = true;
                return Ok(Step::Yield(Yielded::future(async {
                    Err(HandlerError::new("lookup failed"))
                })));
            }
            match input {
                Resume::Error(e) => Ok(Step::Complete(Some(format!("recovered: {e}")))),
                Resume::Value(_) => Ok(Step::Complete(None)),
            }
        });

        let action = run_to_completion(handler).await.unwrap();
        assert_eq!(action.as_deref(), Some("recovered: lookup failed"));
    }

    #[tokio::test]
    async fn test_unhandled_step_error_aborts() {
        let handler: Box<dyn Resumable<()>> = resumable::from_fn(|input: Resume| match input {
            Resume::Value(_) => Ok(Step::Yield(Yielded::thunk(|| Err(HandlerError::new("boom"))))),
            Resume::Error(e) => Err(e),
        });

        let error = run_to_completion(handler).await.unwrap_err();
        assert_eq!(error.message(), "boom");
    }

    #[tokio::test]
    async fn test_complete_without_action() {
        let handler = resumable::ready::<()>(None);
        assert_eq!(run_to_completion(handler).await.unwrap(), None);
    }
}
