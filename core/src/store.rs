//! The dispatch-layer seam.
//!
//! The middleware consumes a `{dispatch, get_state}` pair. `dispatch` is
//! fire-and-forget from the middleware's perspective; `get_state` must be
//! synchronous and side-effect free.

use std::fmt;
use std::sync::Arc;

/// Access to the application store
///
/// # Example
///
/// ```ignore
/// struct AppStore { ... }
///
/// impl Dispatcher<AppAction, AppState> for AppStore {
///     fn dispatch(&self, action: AppAction) {
///         self.actions.send(action).ok();
///     }
///
///     fn get_state(&self) -> AppState {
///         self.state.read().clone()
///     }
/// }
/// ```
pub trait Dispatcher<A, S>: Send + Sync {
    /// Dispatch an action into the store
    fn dispatch(&self, action: A);

    /// Snapshot of the current state
    fn get_state(&self) -> S;
}

/// Cloneable handle to a [`Dispatcher`]
///
/// This is the store triple handed to payload builders, hooks, and success
/// handlers.
pub struct StoreAccess<A, S> {
    inner: Arc<dyn Dispatcher<A, S>>,
}

impl<A, S> StoreAccess<A, S> {
    /// Wrap a dispatcher
    #[must_use]
    pub fn new(dispatcher: impl Dispatcher<A, S> + 'static) -> Self {
        Self {
            inner: Arc::new(dispatcher),
        }
    }

    /// Wrap an already shared dispatcher
    #[must_use]
    pub fn from_arc(dispatcher: Arc<dyn Dispatcher<A, S>>) -> Self {
        Self { inner: dispatcher }
    }

    /// Build store access from a pair of closures
    #[must_use]
    pub fn from_fns<D, G>(dispatch: D, get_state: G) -> Self
    where
        D: Fn(A) + Send + Sync + 'static,
        G: Fn() -> S + Send + Sync + 'static,
        A: 'static,
        S: 'static,
    {
        Self::new(FnDispatcher {
            dispatch,
            get_state,
        })
    }

    /// Dispatch an action
    pub fn dispatch(&self, action: A) {
        self.inner.dispatch(action);
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn get_state(&self) -> S {
        self.inner.get_state()
    }

    /// Whether two handles point at the same dispatcher
    #[must_use]
    pub fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<A, S> Clone for StoreAccess<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, S> fmt::Debug for StoreAccess<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreAccess(<dispatcher>)")
    }
}

struct FnDispatcher<D, G> {
    dispatch: D,
    get_state: G,
}

impl<A, S, D, G> Dispatcher<A, S> for FnDispatcher<D, G>
where
    D: Fn(A) + Send + Sync,
    G: Fn() -> S + Send + Sync,
{
    fn dispatch(&self, action: A) {
        (self.dispatch)(action);
    }

    fn get_state(&self) -> S {
        (self.get_state)()
    }
}
