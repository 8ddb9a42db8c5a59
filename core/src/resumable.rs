//! Resumable success handlers.
//!
//! A resumable handler is a step machine: each call to [`Resumable::resume`]
//! either yields an intermediate value for the driver to settle, or completes
//! with an optional final action. Yielded futures are awaited and their output
//! is fed back as the next resume value; a failing step is fed back through
//! [`Resumable::resume_with_error`], giving the handler a chance to recover.
//!
//! # Example
//!
//! ```
//! use composable_api_core::resumable::{self, Resume, Step, Yielded};
//! use serde_json::json;
//!
//! let mut stage = 0;
//! let handler = resumable::from_fn(move |input: Resume| {
//!     stage += 1;
//!     match (stage, input) {
//!         (1, _) => Ok(Step::Yield(Yielded::Value(json!(41)))),
//!         (_, Resume::Value(v)) => Ok(Step::Complete(Some(v.as_i64().unwrap_or(0) + 1))),
//!         (_, Resume::Error(e)) => Err(e),
//!     }
//! });
//! # let _ = handler;
//! ```

use crate::error::HandlerError;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed asynchronous step
pub type StepFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// Boxed synchronous step
pub type StepThunk = Box<dyn FnOnce() -> Result<Value, HandlerError> + Send>;

/// Intermediate value yielded by a handler
pub enum Yielded {
    /// Awaited; its output becomes the next resume value
    Future(StepFuture),
    /// Invoked; its result becomes the next resume value
    Thunk(StepThunk),
    /// Passed straight back
    Value(Value),
}

impl Yielded {
    /// Yield a future
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self::Future(Box::pin(future))
    }

    /// Yield a deferred computation
    pub fn thunk<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<Value, HandlerError> + Send + 'static,
    {
        Self::Thunk(Box::new(f))
    }
}

impl fmt::Debug for Yielded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Future(_) => write!(f, "Yielded::Future(<future>)"),
            Self::Thunk(_) => write!(f, "Yielded::Thunk(<fn>)"),
            Self::Value(value) => f.debug_tuple("Yielded::Value").field(value).finish(),
        }
    }
}

/// Outcome of a single resume
#[derive(Debug)]
pub enum Step<A> {
    /// An intermediate value to settle
    Yield(Yielded),
    /// Finished, with an optional action to dispatch
    Complete(Option<A>),
}

/// Input to a resume
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// The settled value of the previous step
    Value(Value),
    /// The error the previous step failed with
    Error(HandlerError),
}

/// A step machine producing an optional action
pub trait Resumable<A>: Send {
    /// Advance with the settled value of the previous step
    ///
    /// The first call receives [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns the error that aborts the handler.
    fn resume(&mut self, value: Value) -> Result<Step<A>, HandlerError>;

    /// Advance after the previous step failed
    ///
    /// By default the error aborts the handler.
    ///
    /// # Errors
    ///
    /// Returns the error that aborts the handler.
    fn resume_with_error(&mut self, error: HandlerError) -> Result<Step<A>, HandlerError> {
        Err(error)
    }
}

struct FnResumable<F> {
    f: F,
}

impl<A, F> Resumable<A> for FnResumable<F>
where
    F: FnMut(Resume) -> Result<Step<A>, HandlerError> + Send,
{
    fn resume(&mut self, value: Value) -> Result<Step<A>, HandlerError> {
        (self.f)(Resume::Value(value))
    }

    fn resume_with_error(&mut self, error: HandlerError) -> Result<Step<A>, HandlerError> {
        (self.f)(Resume::Error(error))
    }
}

/// Build a handler from a closure receiving every resume input
pub fn from_fn<A, F>(f: F) -> Box<dyn Resumable<A>>
where
    F: FnMut(Resume) -> Result<Step<A>, HandlerError> + Send + 'static,
    A: 'static,
{
    Box::new(FnResumable { f })
}

/// Build a handler that completes immediately
pub fn ready<A: Send + 'static>(action: Option<A>) -> Box<dyn Resumable<A>> {
    let mut action = Some(action);
    from_fn(move |_| Ok(Step::Complete(action.take().flatten())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_fn_routes_errors() {
        let mut handler = from_fn(|input| match input {
            Resume::Value(v) => Ok(Step::Complete(Some(v))),
            Resume::Error(e) => Ok(Step::Complete(Some(json!(e.message())))),
        });

        let step = handler.resume(json!(1)).unwrap();
        assert!(matches!(step, Step::Complete(Some(ref v)) if v == &json!(1)));

        let step = handler.resume_with_error(HandlerError::new("boom")).unwrap();
        assert!(matches!(step, Step::Complete(Some(ref v)) if v == &json!("boom")));
    }

    #[test]
    fn test_ready_completes_once() {
        let mut handler = ready(Some("DONE"));
        assert!(matches!(handler.resume(Value::Null), Ok(Step::Complete(Some("DONE")))));
        assert!(matches!(handler.resume(Value::Null), Ok(Step::Complete(None))));
    }

    struct Plain;

    impl Resumable<()> for Plain {
        fn resume(&mut self, _value: Value) -> Result<Step<()>, HandlerError> {
            Ok(Step::Complete(None))
        }
    }

    #[test]
    fn test_default_error_resume_aborts() {
        let result = Plain.resume_with_error(HandlerError::new("nope"));
        assert_eq!(result.err(), Some(HandlerError::new("nope")));
    }
}
