//! The per-action entry point.
//!
//! [`ApiMiddleware::handle`] is invoked for every dispatched envelope. Plain
//! actions and descriptors of another kind are forwarded down the chain
//! untouched; malformed descriptors are logged and forwarded too. A valid
//! descriptor goes through the call lifecycle:
//!
//! ```text
//! build request -> single-flight -> transport -> classify -> entity tag
//!     -> finalize -> [coroutine | poll] -> settled
//!                \-> any error -> failure routing
//! ```
//!
//! # Example
//!
//! ```ignore
//! let middleware = ApiMiddleware::new(config, Arc::new(ReqwestTransport::with_default_timeout()?));
//! let next = forward_to_store(store.clone());
//!
//! let action = ApiAction::new("API", ["FETCH_USER", "FETCH_USER_SUCCESS", "FETCH_USER_FAILED"])
//!     .with_payload(|_| Payload::new("/users/fetch").on_success(AppAction::user_loaded));
//!
//! middleware.handle(&store, &next, action.into()).await?;
//! ```

use crate::auth;
use crate::call::{CallContext, Next};
use crate::config::{AuthConfig, MiddlewareConfig};
use crate::etag;
use crate::failure;
use crate::finalize::{self, Finalized};
use crate::repeat::{self, RepeatPolicy};
use crate::shaper;
use crate::status;
use crate::RequestRuntime;
use composable_api_core::action::{FailureFn, TapFn};
use composable_api_core::transport::Headers;
use composable_api_core::{
    ApiAction, ApiError, CallTypes, CancelSource, Dispatched, Meta, MiddlewareEvent, Params,
    Payload, PayloadContext, RepeatValue, RequestConfig, Response, StoreAccess, TapContext, Transport,
    TransportError,
};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::task::Poll;
use thiserror::Error;

/// How a dispatched envelope settled
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<A> {
    /// Not handled here; passed down the chain
    Forwarded,
    /// The plain success handler ran
    Completed(Response),
    /// A resumable handler ran; `None` when it failed
    Coroutine(Option<A>),
    /// Polling settled with this value
    Repeated(RepeatValue),
    /// The server answered not modified; the callback ran
    NotModified,
}

/// Errors returned by [`ApiMiddleware::handle`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MiddlewareError {
    /// The action could not be turned into a request; nothing was issued
    #[error("Invalid API action: {0}")]
    Config(#[source] ApiError),

    /// The call failed after it was issued
    #[error("{request_type} failed: {source}")]
    RequestFailed {
        /// REQUEST type of the call
        request_type: String,
        /// What went wrong
        source: ApiError,
    },
}

impl MiddlewareError {
    /// The underlying error
    #[must_use]
    pub const fn api_error(&self) -> &ApiError {
        match self {
            Self::Config(error) | Self::RequestFailed { source: error, .. } => error,
        }
    }
}

/// A `next` that dispatches plain actions into `store`
///
/// API descriptors reaching the end of the chain are dropped.
#[must_use]
pub fn forward_to_store<A, S>(store: StoreAccess<A, S>) -> Next<A, S>
where
    A: 'static,
    S: 'static,
{
    Arc::new(move |dispatched| match dispatched {
        Dispatched::Action(action) => store.dispatch(action),
        Dispatched::Api(action) => {
            tracing::debug!(kind = %action.kind, "Dropping API descriptor at the end of the chain");
        }
    })
}

/// Problems that make a descriptor unusable
fn malformed<A, S>(action: &ApiAction<A, S>) -> Vec<String> {
    let mut problems = Vec::new();

    if action.types.len() != 3 {
        problems.push("action.types should contain a Neutral, Success and Failure types".to_string());
    } else if action.types.iter().any(String::is_empty) {
        problems.push("action.types must not contain empty types".to_string());
    }

    if action.payload.is_none() {
        problems.push("action.payload is expected to be a function".to_string());
    }

    problems
}

/// The request middleware
pub struct ApiMiddleware<A, S> {
    config: Arc<MiddlewareConfig<A, S>>,
    runtime: RequestRuntime,
    transport: Arc<dyn Transport>,
}

impl<A, S> ApiMiddleware<A, S> {
    /// Create a middleware with its own registry and entity-tag cache
    #[must_use]
    pub fn new(config: MiddlewareConfig<A, S>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            runtime: RequestRuntime::new(),
            transport,
        }
    }

    /// Share a registry and entity-tag cache with other middleware instances
    #[must_use]
    pub fn with_runtime(mut self, runtime: RequestRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    /// The validated configuration
    #[must_use]
    pub fn config(&self) -> &MiddlewareConfig<A, S> {
        &self.config
    }

    /// Registry and entity-tag cache
    #[must_use]
    pub const fn runtime(&self) -> &RequestRuntime {
        &self.runtime
    }
}

impl<A, S> Clone for ApiMiddleware<A, S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            runtime: self.runtime.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<A, S> fmt::Debug for ApiMiddleware<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiMiddleware")
            .field("config", &self.config)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl<A, S> ApiMiddleware<A, S>
where
    A: Clone + Send + Sync + 'static + From<MiddlewareEvent>,
    S: Serialize + Send + Sync + 'static,
{
    /// Handle one dispatched envelope
    ///
    /// # Errors
    ///
    /// - [`MiddlewareError::Config`] when the request cannot be built (invalid
    ///   method, malformed custom entity-tag headers, forbidden state value);
    ///   nothing is issued or dispatched
    /// - [`MiddlewareError::RequestFailed`] when the issued call failed; the
    ///   failure action has been dispatched when the error is dispatchable
    #[tracing::instrument(skip(self, store, next, dispatched), name = "api_middleware_handle")]
    pub async fn handle(
        &self,
        store: &StoreAccess<A, S>,
        next: &Next<A, S>,
        dispatched: Dispatched<A, S>,
    ) -> Result<Settled<A>, MiddlewareError> {
        let action = match dispatched {
            Dispatched::Api(action) if action.kind == self.config.constants().api => action,
            other => {
                next(other);
                return Ok(Settled::Forwarded);
            }
        };

        let problems = malformed(&action);
        if !problems.is_empty() {
            tracing::warn!(
                kind = %action.kind,
                types = ?action.types,
                ?problems,
                "Malformed API action, forwarding"
            );
            next(Dispatched::Api(action));
            return Ok(Settled::Forwarded);
        }

        let (ctx, taps) = self
            .prepare(store, next, action)
            .map_err(MiddlewareError::Config)?;

        tracing::debug!(
            request_type = %ctx.types.request,
            method = %ctx.request.method,
            url = %ctx.request.url,
            "Issuing call"
        );

        if let Some(tap) = &taps.before {
            tap(&taps.context(store));
        }

        let outcome = {
            let mut call = std::pin::pin!(ctx.issue());
            let early = futures::poll!(call.as_mut());
            if let Some(tap) = &taps.after {
                tap(&taps.context(store));
            }
            match early {
                Poll::Ready(result) => result,
                Poll::Pending => call.await,
            }
        };

        match Self::settle(outcome, &ctx).await {
            Ok(settled) => Ok(settled),
            Err(error) => failure::handle_error(error, &ctx),
        }
    }

    /// Build the request and register the call
    fn prepare(
        &self,
        store: &StoreAccess<A, S>,
        next: &Next<A, S>,
        action: ApiAction<A, S>,
    ) -> Result<(CallContext<A, S>, Taps<A, S>), ApiError> {
        let ApiAction {
            types,
            payload,
            method,
            meta,
            transport,
            ..
        } = action;

        let (Some(types), Some(payload)) = (CallTypes::from_slice(&types), payload) else {
            return Err(ApiError::Handler("API action failed validation".into()));
        };

        let source = CancelSource::new();
        let Payload {
            url: path,
            mut params,
            auth: wants_auth,
            success,
            failure,
            repeat,
            interval,
            max_ticks,
            etag_callback,
            tap_before_call,
            tap_after_call,
            use_full_response_object,
        } = payload(&PayloadContext::new(store.clone(), store.get_state(), source.clone()));

        let mut auth_headers = Headers::new();
        if wants_auth {
            match self.config.auth() {
                Some(AuthConfig::Headers(templates)) => {
                    let tree = auth::state_tree(&store.get_state());
                    auth_headers = auth::interpolate_headers(templates, &tree);
                }
                Some(AuthConfig::Selectors(selectors)) => {
                    let tree = auth::state_tree(&store.get_state());
                    params.extend(auth::select(selectors, &tree)?);
                }
                None => {}
            }
        }

        let mut meta = meta.unwrap_or_else(|| Meta::with_store(store.clone()));
        if meta.merge_params {
            meta.params = Some(params.clone());
        }

        let (method, body) = shaper::shape(method.as_deref().unwrap_or("get"), params.clone())?;

        let overrides = transport.unwrap_or_default();
        let base = overrides
            .base_url
            .as_deref()
            .filter(|base| !base.is_empty())
            .unwrap_or_else(|| self.config.base());
        let url = format!("{base}{path}");

        let mut headers = overrides.headers;
        headers.extend(etag::conditional_headers(
            &self.config,
            &self.runtime.etags,
            &path,
            store,
        )?);
        headers.extend(auth_headers);

        let reason = format!("{} call was canceled.", types.request);
        self.runtime.registry.cancel_existing(&types.request, &reason);
        self.runtime.registry.add(types.request.clone(), source.clone());

        if self.config.emit_request_type() {
            store.dispatch(A::from(MiddlewareEvent::Request {
                kind: types.request.clone(),
            }));
        }

        let failure = failure.unwrap_or_else(|| self.default_failure());
        let ctx = CallContext {
            types,
            path,
            store: store.clone(),
            next: Arc::clone(next),
            meta,
            success,
            failure,
            repeat: repeat.map(|predicate| RepeatPolicy {
                predicate,
                interval,
                max_ticks,
            }),
            etag_callback,
            use_full_response_object: self.config.use_full_response_object()
                || use_full_response_object,
            request: RequestConfig {
                url,
                method,
                headers,
                body,
                cancel: source.token(),
            },
            config: Arc::clone(&self.config),
            runtime: self.runtime.clone(),
            transport: Arc::clone(&self.transport),
            released: AtomicBool::new(false),
        };

        let taps = Taps {
            before: tap_before_call,
            after: tap_after_call,
            params,
        };

        Ok((ctx, taps))
    }

    fn default_failure(&self) -> FailureFn<A> {
        let kind = self.config.constants().api_error.clone();
        Arc::new(move |failure_type: &str, error: &ApiError| {
            A::from(MiddlewareEvent::ApiError {
                kind: kind.clone(),
                message: format!("{failure_type} failed."),
                error: error.clone(),
            })
        })
    }

    /// Everything after the transport answered
    async fn settle(
        outcome: Result<Response, TransportError>,
        ctx: &CallContext<A, S>,
    ) -> Result<Settled<A>, ApiError> {
        let response = status::classify(outcome?, &ctx.config, &ctx.store)?;
        let response = etag::record(
            response,
            &ctx.path,
            &ctx.config,
            &ctx.runtime.etags,
            &ctx.store,
        );

        match finalize::finalize(response, ctx).await? {
            Finalized::Dispatched(response) => {
                metrics::counter!("api.request.succeeded").increment(1);
                Ok(Settled::Completed(response))
            }
            Finalized::Coroutine(action) => {
                if action.is_some() {
                    metrics::counter!("api.request.succeeded").increment(1);
                }
                Ok(Settled::Coroutine(action))
            }
            Finalized::Repeat(response) => {
                let Some(policy) = &ctx.repeat else {
                    return Ok(Settled::Completed(response));
                };
                let value = repeat::poll(ctx, policy).await?;
                metrics::counter!("api.request.succeeded").increment(1);
                Ok(Settled::Repeated(value))
            }
        }
    }
}

/// Issuance hooks and the parameters they observe
struct Taps<A, S> {
    before: Option<TapFn<A, S>>,
    after: Option<TapFn<A, S>>,
    params: Params,
}

impl<A, S> Taps<A, S> {
    fn context(&self, store: &StoreAccess<A, S>) -> TapContext<A, S> {
        TapContext {
            params: self.params.clone(),
            store: store.clone(),
            state: store.get_state(),
        }
    }
}
