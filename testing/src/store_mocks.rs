//! Recording store and chain for middleware tests
//!
//! - [`RecordingStore`]: a [`Dispatcher`] keeping every dispatched action
//! - [`RecordingNext`]: a `next` keeping every forwarded envelope
//! - [`TestAction`]: an action type covering middleware events, success and
//!   failure outcomes

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Mutex poisoning only follows a failed test

use composable_api_core::{
    ApiError, Dispatched, Dispatcher, MiddlewareEvent, Params, StoreAccess, SuccessContext,
    SuccessData, Value,
};
use std::sync::{Arc, Mutex};

/// Action type used across the middleware tests
#[derive(Debug, Clone, PartialEq)]
pub enum TestAction {
    /// Emitted by the middleware itself
    Event(MiddlewareEvent),
    /// Built by a success handler
    Success {
        /// SUCCESS type
        kind: String,
        /// Body or value handed to the handler
        data: Value,
        /// Status of the full response, when it was requested
        status: Option<u16>,
        /// Meta fields
        meta: Params,
        /// Merged request parameters
        meta_params: Option<Params>,
        /// Whether the handler received store access
        has_store: bool,
    },
    /// Built by a failure handler
    Failure {
        /// FAILURE type
        kind: String,
        /// The error
        error: ApiError,
    },
    /// Anything else a test dispatches
    Custom(String),
}

impl TestAction {
    /// Success action recording everything the handler received
    #[must_use]
    pub fn from_success(ctx: SuccessContext<Self, Value>) -> Self {
        let status = match &ctx.data {
            SuccessData::Response(response) => Some(response.status),
            SuccessData::Body(_) => None,
        };
        Self::Success {
            data: ctx.data.body().clone(),
            kind: ctx.kind,
            status,
            meta: ctx.meta.fields.clone(),
            meta_params: ctx.meta.params.clone(),
            has_store: ctx.store.is_some(),
        }
    }

    /// Failure action
    #[must_use]
    pub fn from_failure(kind: &str, error: &ApiError) -> Self {
        Self::Failure {
            kind: kind.to_string(),
            error: error.clone(),
        }
    }

    /// Custom action
    #[must_use]
    pub fn custom(name: &str) -> Self {
        Self::Custom(name.to_string())
    }
}

impl From<MiddlewareEvent> for TestAction {
    fn from(event: MiddlewareEvent) -> Self {
        Self::Event(event)
    }
}

/// Store recording every dispatched action
///
/// Cloning shares the recorded actions and the state.
#[derive(Debug)]
pub struct RecordingStore<A, S> {
    actions: Arc<Mutex<Vec<A>>>,
    state: Arc<Mutex<S>>,
}

impl<A, S> RecordingStore<A, S> {
    /// Create a store holding `state`
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            actions: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Replace the state
    pub fn set_state(&self, state: S) {
        *self.state.lock().unwrap() = state;
    }

    /// Every dispatched action, in order
    #[must_use]
    pub fn actions(&self) -> Vec<A>
    where
        A: Clone,
    {
        self.actions.lock().unwrap().clone()
    }

    /// Forget recorded actions
    pub fn clear(&self) {
        self.actions.lock().unwrap().clear();
    }

    /// Store access backed by this store
    #[must_use]
    pub fn access(&self) -> StoreAccess<A, S>
    where
        A: Send + 'static,
        S: Clone + Send + 'static,
    {
        StoreAccess::new(self.clone())
    }
}

impl<A, S> Clone for RecordingStore<A, S> {
    fn clone(&self) -> Self {
        Self {
            actions: Arc::clone(&self.actions),
            state: Arc::clone(&self.state),
        }
    }
}

impl<A: Send, S: Clone + Send> Dispatcher<A, S> for RecordingStore<A, S> {
    fn dispatch(&self, action: A) {
        self.actions.lock().unwrap().push(action);
    }

    fn get_state(&self) -> S {
        self.state.lock().unwrap().clone()
    }
}

/// `next` recording every forwarded envelope
#[derive(Debug)]
pub struct RecordingNext<A, S> {
    forwarded: Arc<Mutex<Vec<Dispatched<A, S>>>>,
}

impl<A, S> RecordingNext<A, S> {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self {
            forwarded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A `next` function feeding this recorder
    #[must_use]
    pub fn handle(&self) -> Arc<dyn Fn(Dispatched<A, S>) + Send + Sync>
    where
        A: Send + 'static,
        S: 'static,
    {
        let forwarded = Arc::clone(&self.forwarded);
        Arc::new(move |dispatched| forwarded.lock().unwrap().push(dispatched))
    }

    /// Plain actions forwarded, in order
    #[must_use]
    pub fn actions(&self) -> Vec<A>
    where
        A: Clone,
    {
        self.forwarded
            .lock()
            .unwrap()
            .iter()
            .filter_map(|dispatched| dispatched.as_action().cloned())
            .collect()
    }

    /// Number of API descriptors forwarded
    #[must_use]
    pub fn api_count(&self) -> usize {
        self.forwarded
            .lock()
            .unwrap()
            .iter()
            .filter(|dispatched| dispatched.is_api())
            .count()
    }

    /// Number of envelopes forwarded
    #[must_use]
    pub fn len(&self) -> usize {
        self.forwarded.lock().unwrap().len()
    }

    /// Whether nothing was forwarded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A, S> Default for RecordingNext<A, S> {
    fn default() -> Self {
        Self::new()
    }
}
