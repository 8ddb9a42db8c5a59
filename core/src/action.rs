//! API action descriptors and the values handed to their handlers.
//!
//! An [`ApiAction`] is dispatched like any other action. Its `payload`
//! function is invoked once per dispatch with access to the store and returns
//! a [`Payload`] describing the call: the path, parameters, and the handlers
//! deciding which actions to dispatch when the call settles.
//!
//! Actions produced by the middleware itself (request emission, entity-tag
//! creation, coroutine completion, default failures) are [`MiddlewareEvent`]s;
//! the application action type converts from them with `From`.

use crate::cancel::CancelSource;
use crate::error::ApiError;
use crate::resumable::Resumable;
use crate::store::StoreAccess;
use crate::transport::{Headers, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Key-value parameter bag
pub type Params = serde_json::Map<String, Value>;

/// Default polling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

/// Builds a [`Payload`] from store access
pub type PayloadFn<A, S> = Arc<dyn Fn(&PayloadContext<A, S>) -> Payload<A, S> + Send + Sync>;

/// Builds the success action of a plain handler
pub type SuccessFn<A, S> = Arc<dyn Fn(SuccessContext<A, S>) -> A + Send + Sync>;

/// Starts a resumable success handler
pub type CoroutineFn<A, S> =
    Arc<dyn Fn(SuccessContext<A, S>) -> Box<dyn Resumable<A>> + Send + Sync>;

/// Builds the failure action from the FAILURE type and the error
pub type FailureFn<A> = Arc<dyn Fn(&str, &ApiError) -> A + Send + Sync>;

/// Polling predicate
pub type RepeatFn = Arc<dyn Fn(&Response) -> RepeatDecision + Send + Sync>;

/// Side-effect hook fired around request issuance
pub type TapFn<A, S> = Arc<dyn Fn(&TapContext<A, S>) + Send + Sync>;

/// Invoked when a conditional request comes back not modified
pub type NotModifiedFn<A, S> = Arc<dyn Fn(NotModifiedContext<A, S>) + Send + Sync>;

/// Envelope flowing through the middleware chain
pub enum Dispatched<A, S> {
    /// An ordinary application action, forwarded untouched
    Action(A),
    /// An API call descriptor
    Api(ApiAction<A, S>),
}

impl<A, S> Dispatched<A, S> {
    /// The application action, if this is one
    #[must_use]
    pub const fn as_action(&self) -> Option<&A> {
        match self {
            Self::Action(action) => Some(action),
            Self::Api(_) => None,
        }
    }

    /// Whether this envelope carries an API descriptor
    #[must_use]
    pub const fn is_api(&self) -> bool {
        matches!(self, Self::Api(_))
    }
}

impl<A, S> From<ApiAction<A, S>> for Dispatched<A, S> {
    fn from(action: ApiAction<A, S>) -> Self {
        Self::Api(action)
    }
}

impl<A: Clone, S> Clone for Dispatched<A, S> {
    fn clone(&self) -> Self {
        match self {
            Self::Action(action) => Self::Action(action.clone()),
            Self::Api(action) => Self::Api(action.clone()),
        }
    }
}

impl<A: fmt::Debug, S> fmt::Debug for Dispatched<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => f.debug_tuple("Dispatched::Action").field(action).finish(),
            Self::Api(action) => f.debug_tuple("Dispatched::Api").field(action).finish(),
        }
    }
}

/// The (REQUEST, SUCCESS, FAILURE) triple of a validated action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallTypes {
    /// Neutral type; also the call registry key
    pub request: String,
    /// Type handed to the success handler
    pub success: String,
    /// Type handed to the failure handler
    pub failure: String,
}

impl CallTypes {
    /// Build a triple from three identifiers
    #[must_use]
    pub fn new(
        request: impl Into<String>,
        success: impl Into<String>,
        failure: impl Into<String>,
    ) -> Self {
        Self {
            request: request.into(),
            success: success.into(),
            failure: failure.into(),
        }
    }

    /// Build a triple from a slice, if it holds exactly three identifiers
    #[must_use]
    pub fn from_slice(types: &[String]) -> Option<Self> {
        match types {
            [request, success, failure] => Some(Self::new(
                request.clone(),
                success.clone(),
                failure.clone(),
            )),
            _ => None,
        }
    }
}

/// Per-action transport configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOverrides {
    /// Base URL taking precedence over the configured one
    #[serde(default)]
    pub base_url: Option<String>,
    /// Extra request headers
    #[serde(default)]
    pub headers: Headers,
}

/// An API call descriptor
///
/// Fields are loosely typed on purpose: the middleware validates them and
/// forwards malformed descriptors down the chain instead of dropping them.
pub struct ApiAction<A, S> {
    /// Discriminator; must equal the configured API sentinel
    pub kind: String,
    /// Expected to hold (REQUEST, SUCCESS, FAILURE)
    pub types: Vec<String>,
    /// Builds the call description
    pub payload: Option<PayloadFn<A, S>>,
    /// HTTP method name, `"get"` when absent
    pub method: Option<String>,
    /// Context forwarded to the success handler
    pub meta: Option<Meta<A, S>>,
    /// Per-action transport configuration
    pub transport: Option<TransportOverrides>,
}

impl<A, S> ApiAction<A, S> {
    /// Create a descriptor with the given sentinel and type triple
    #[must_use]
    pub fn new<T: Into<String>>(kind: impl Into<String>, types: [T; 3]) -> Self {
        Self {
            kind: kind.into(),
            types: types.into_iter().map(Into::into).collect(),
            payload: None,
            method: None,
            meta: None,
            transport: None,
        }
    }

    /// Set the payload builder
    #[must_use]
    pub fn with_payload<F>(mut self, payload: F) -> Self
    where
        F: Fn(&PayloadContext<A, S>) -> Payload<A, S> + Send + Sync + 'static,
    {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Set the HTTP method
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set the meta object
    #[must_use]
    pub fn with_meta(mut self, meta: Meta<A, S>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Set per-action transport configuration
    #[must_use]
    pub fn with_transport(mut self, transport: TransportOverrides) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The REQUEST type, when present
    #[must_use]
    pub fn request_type(&self) -> Option<&str> {
        self.types.first().map(String::as_str)
    }
}

impl<A: Clone, S> Clone for ApiAction<A, S> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            types: self.types.clone(),
            payload: self.payload.clone(),
            method: self.method.clone(),
            meta: self.meta.clone(),
            transport: self.transport.clone(),
        }
    }
}

impl<A, S> fmt::Debug for ApiAction<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAction")
            .field("kind", &self.kind)
            .field("types", &self.types)
            .field("payload", &self.payload.as_ref().map(|_| "<fn>"))
            .field("method", &self.method)
            .field("meta", &self.meta)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Handed to the payload builder
pub struct PayloadContext<A, S> {
    /// Store access
    pub store: StoreAccess<A, S>,
    /// State snapshot taken when the action was dispatched
    pub state: S,
    cancel: CancelSource,
}

impl<A, S> PayloadContext<A, S> {
    /// Create a context
    #[must_use]
    pub const fn new(store: StoreAccess<A, S>, state: S, cancel: CancelSource) -> Self {
        Self {
            store,
            state,
            cancel,
        }
    }

    /// Cancel the call being built
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    /// Handle that cancels the call later, e.g. from a UI event
    #[must_use]
    pub fn cancel_handle(&self) -> CancelSource {
        self.cancel.clone()
    }
}

/// How the call's success should be reported
pub enum SuccessHandler<A, S> {
    /// Dispatch nothing
    Ignore,
    /// Dispatch the action built by the function
    Action(SuccessFn<A, S>),
    /// Drive a resumable computation to completion
    Coroutine(CoroutineFn<A, S>),
}

impl<A, S> SuccessHandler<A, S> {
    /// Whether this handler is a resumable computation
    #[must_use]
    pub const fn is_coroutine(&self) -> bool {
        matches!(self, Self::Coroutine(_))
    }
}

impl<A, S> Clone for SuccessHandler<A, S> {
    fn clone(&self) -> Self {
        match self {
            Self::Ignore => Self::Ignore,
            Self::Action(f) => Self::Action(Arc::clone(f)),
            Self::Coroutine(f) => Self::Coroutine(Arc::clone(f)),
        }
    }
}

impl<A, S> fmt::Debug for SuccessHandler<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "SuccessHandler::Ignore"),
            Self::Action(_) => write!(f, "SuccessHandler::Action(<fn>)"),
            Self::Coroutine(_) => write!(f, "SuccessHandler::Coroutine(<fn>)"),
        }
    }
}

/// What to do when a conditional request comes back not modified
pub enum ETagCallback<A, S> {
    /// Nothing
    None,
    /// Dispatch this action
    Action(A),
    /// Invoke this function
    Handler(NotModifiedFn<A, S>),
}

impl<A: Clone, S> Clone for ETagCallback<A, S> {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Action(action) => Self::Action(action.clone()),
            Self::Handler(f) => Self::Handler(Arc::clone(f)),
        }
    }
}

/// Handed to [`ETagCallback::Handler`]
pub struct NotModifiedContext<A, S> {
    /// REQUEST type of the call
    pub kind: String,
    /// Request path (without base URL)
    pub path: String,
    /// Cached tag for the path
    pub etag: Option<String>,
    /// Store access
    pub store: StoreAccess<A, S>,
}

/// Handed to `tap_before_call` / `tap_after_call`
pub struct TapContext<A, S> {
    /// Request parameters after auth enrichment
    pub params: Params,
    /// Store access
    pub store: StoreAccess<A, S>,
    /// State snapshot
    pub state: S,
}

/// Response representation handed to success handlers
#[derive(Debug, Clone, PartialEq)]
pub enum SuccessData {
    /// Body only (or a value chosen by a repeat predicate)
    Body(Value),
    /// Full response envelope
    Response(Box<Response>),
}

impl SuccessData {
    /// The body, whichever representation was chosen
    #[must_use]
    pub fn body(&self) -> &Value {
        match self {
            Self::Body(body) => body,
            Self::Response(response) => &response.data,
        }
    }

    /// The full response, if it was requested
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Body(_) => None,
            Self::Response(response) => Some(response),
        }
    }
}

/// Handed to success handlers
///
/// `store` is `None` whenever the action's meta carries its own store handle,
/// which includes the generated meta substituted when an action has none. In
/// practice handlers of actions without meta reach the store through
/// `meta.store()`.
pub struct SuccessContext<A, S> {
    /// SUCCESS type
    pub kind: String,
    /// Body or full response
    pub data: SuccessData,
    /// The action's meta
    pub meta: Meta<A, S>,
    /// Store access, unless suppressed by the meta
    pub store: Option<StoreAccess<A, S>>,
}

/// Context object forwarded to success handlers
pub struct Meta<A, S> {
    /// Free-form fields
    pub fields: Params,
    /// Copy the request parameters into [`Meta::params`]
    pub merge_params: bool,
    /// Request parameters, filled in when `merge_params` is set
    pub params: Option<Params>,
    store: Option<StoreAccess<A, S>>,
}

impl<A, S> Meta<A, S> {
    /// Empty meta without store access
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: Params::new(),
            merge_params: false,
            params: None,
            store: None,
        }
    }

    /// Meta carrying store access
    #[must_use]
    pub fn with_store(store: StoreAccess<A, S>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Add a field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Request the parameter merge
    #[must_use]
    pub const fn merging_params(mut self) -> Self {
        self.merge_params = true;
        self
    }

    /// Store access carried by this meta
    #[must_use]
    pub const fn store(&self) -> Option<&StoreAccess<A, S>> {
        self.store.as_ref()
    }

    /// Whether this meta carries store access
    #[must_use]
    pub const fn has_store(&self) -> bool {
        self.store.is_some()
    }
}

impl<A, S> Default for Meta<A, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S> Clone for Meta<A, S> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            merge_params: self.merge_params,
            params: self.params.clone(),
            store: self.store.clone(),
        }
    }
}

impl<A, S> fmt::Debug for Meta<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meta")
            .field("fields", &self.fields)
            .field("merge_params", &self.merge_params)
            .field("params", &self.params)
            .field("store", &self.store.is_some())
            .finish()
    }
}

/// Decision returned by a repeat predicate
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatDecision {
    /// Done; dispatch success with the tick's response and resolve with it
    Accept,
    /// Done; reject with the tick's response
    Reject,
    /// Done; dispatch success with this value and resolve with it
    Resolve(Value),
    /// Done; reject with this value
    Fail(Value),
    /// Done; resolve with this value without dispatching
    Settle(Value),
    /// Poll again after the interval
    Continue,
}

impl From<bool> for RepeatDecision {
    fn from(done: bool) -> Self {
        if done { Self::Accept } else { Self::Reject }
    }
}

impl From<Option<bool>> for RepeatDecision {
    fn from(decision: Option<bool>) -> Self {
        decision.map_or(Self::Continue, Self::from)
    }
}

/// Value a poll settled with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatValue {
    /// The response of the deciding tick
    Response(Box<Response>),
    /// A value chosen by the predicate
    Value(Value),
}

/// Actions emitted by the middleware itself
#[derive(Debug, Clone, PartialEq)]
pub enum MiddlewareEvent {
    /// Emitted before issuance when request emission is enabled
    Request {
        /// REQUEST type
        kind: String,
    },
    /// A new entity tag was stored
    ETagCreated {
        /// Configured creation type
        kind: String,
        /// The tag
        etag: String,
        /// Request path the tag belongs to
        key: String,
    },
    /// A resumable success handler completed without producing an action
    Void {
        /// Configured void sentinel
        kind: String,
        /// REQUEST type of the call
        last_action: String,
    },
    /// Default failure action
    ApiError {
        /// Configured generic failure sentinel
        kind: String,
        /// `"<FAILURE> failed."`
        message: String,
        /// The error
        error: ApiError,
    },
}

impl MiddlewareEvent {
    /// The event's action type
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Request { kind }
            | Self::ETagCreated { kind, .. }
            | Self::Void { kind, .. }
            | Self::ApiError { kind, .. } => kind,
        }
    }
}

/// Description of a call, returned by the payload builder
pub struct Payload<A, S> {
    /// Target path, appended to the base URL
    pub url: String,
    /// Parameters
    pub params: Params,
    /// Request credential enrichment
    pub auth: bool,
    /// Success handling
    pub success: SuccessHandler<A, S>,
    /// Failure action builder; a generic one is generated when absent
    pub failure: Option<FailureFn<A>>,
    /// Polling predicate
    pub repeat: Option<RepeatFn>,
    /// Delay between polling ticks
    pub interval: Duration,
    /// Maximum number of polling ticks; unbounded when absent
    pub max_ticks: Option<u32>,
    /// Not-modified handling
    pub etag_callback: ETagCallback<A, S>,
    /// Fired right before the request is issued
    pub tap_before_call: Option<TapFn<A, S>>,
    /// Fired right after the request is issued
    pub tap_after_call: Option<TapFn<A, S>>,
    /// Hand the full response to success handlers
    pub use_full_response_object: bool,
}

impl<A, S> Payload<A, S> {
    /// Describe a call to `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Params::new(),
            auth: false,
            success: SuccessHandler::Ignore,
            failure: None,
            repeat: None,
            interval: DEFAULT_INTERVAL,
            max_ticks: None,
            etag_callback: ETagCallback::None,
            tap_before_call: None,
            tap_after_call: None,
            use_full_response_object: false,
        }
    }

    /// Set parameters
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Add one parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Request credential enrichment
    #[must_use]
    pub const fn with_auth(mut self, auth: bool) -> Self {
        self.auth = auth;
        self
    }

    /// Dispatch the action built by `f` on success
    #[must_use]
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(SuccessContext<A, S>) -> A + Send + Sync + 'static,
    {
        self.success = SuccessHandler::Action(Arc::new(f));
        self
    }

    /// Drive the resumable computation started by `f` on success
    #[must_use]
    pub fn on_success_coroutine<F>(mut self, f: F) -> Self
    where
        F: Fn(SuccessContext<A, S>) -> Box<dyn Resumable<A>> + Send + Sync + 'static,
    {
        self.success = SuccessHandler::Coroutine(Arc::new(f));
        self
    }

    /// Build the failure action with `f`
    #[must_use]
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &ApiError) -> A + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(f));
        self
    }

    /// Poll until `predicate` decides
    #[must_use]
    pub fn repeat<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response) -> RepeatDecision + Send + Sync + 'static,
    {
        self.repeat = Some(Arc::new(predicate));
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Cap the number of polling ticks
    #[must_use]
    pub const fn with_max_ticks(mut self, max_ticks: u32) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Dispatch `action` when the response is not modified
    #[must_use]
    pub fn on_not_modified_dispatch(mut self, action: A) -> Self {
        self.etag_callback = ETagCallback::Action(action);
        self
    }

    /// Invoke `f` when the response is not modified
    #[must_use]
    pub fn on_not_modified<F>(mut self, f: F) -> Self
    where
        F: Fn(NotModifiedContext<A, S>) + Send + Sync + 'static,
    {
        self.etag_callback = ETagCallback::Handler(Arc::new(f));
        self
    }

    /// Hook fired right before issuance
    #[must_use]
    pub fn tap_before_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&TapContext<A, S>) + Send + Sync + 'static,
    {
        self.tap_before_call = Some(Arc::new(f));
        self
    }

    /// Hook fired right after issuance
    #[must_use]
    pub fn tap_after_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&TapContext<A, S>) + Send + Sync + 'static,
    {
        self.tap_after_call = Some(Arc::new(f));
        self
    }

    /// Hand the full response to success handlers
    #[must_use]
    pub const fn full_response(mut self, enabled: bool) -> Self {
        self.use_full_response_object = enabled;
        self
    }
}

impl<A, S> fmt::Debug for Payload<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("url", &self.url)
            .field("params", &self.params)
            .field("auth", &self.auth)
            .field("success", &self.success)
            .field("repeat", &self.repeat.is_some())
            .field("interval", &self.interval)
            .field("max_ticks", &self.max_ticks)
            .field("use_full_response_object", &self.use_full_response_object)
            .finish_non_exhaustive()
    }
}
