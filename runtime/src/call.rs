//! Per-call state shared by the lifecycle stages.

use crate::config::MiddlewareConfig;
use crate::repeat::RepeatPolicy;
use crate::RequestRuntime;
use composable_api_core::action::FailureFn;
use composable_api_core::{
    ApiError, CallTypes, Dispatched, ETagCallback, Meta, RequestConfig, Response, StoreAccess,
    SuccessContext, SuccessData, SuccessHandler, Transport, TransportError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The rest of the middleware chain
pub type Next<A, S> = Arc<dyn Fn(Dispatched<A, S>) + Send + Sync>;

/// Everything the stages after issuance need to know about one call
pub(crate) struct CallContext<A, S> {
    pub(crate) types: CallTypes,
    pub(crate) path: String,
    pub(crate) store: StoreAccess<A, S>,
    pub(crate) next: Next<A, S>,
    pub(crate) meta: Meta<A, S>,
    pub(crate) success: SuccessHandler<A, S>,
    pub(crate) failure: FailureFn<A>,
    pub(crate) repeat: Option<RepeatPolicy>,
    pub(crate) etag_callback: ETagCallback<A, S>,
    pub(crate) use_full_response_object: bool,
    pub(crate) request: RequestConfig,
    pub(crate) config: Arc<MiddlewareConfig<A, S>>,
    pub(crate) runtime: RequestRuntime,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) released: AtomicBool,
}

impl<A, S> CallContext<A, S> {
    /// Drop this call's registry entry
    ///
    /// Only the first release removes anything; a call that already left the
    /// registry must not take the entry of a newer call sharing its key.
    pub(crate) fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.runtime.registry.remove(&self.types.request);
        }
    }

    /// Store handed to success handlers
    ///
    /// Suppressed whenever the meta carries its own store access.
    pub(crate) fn handler_store(&self) -> Option<StoreAccess<A, S>> {
        if self.meta.has_store() {
            None
        } else {
            Some(self.store.clone())
        }
    }

    /// Body or full response, depending on the call's settings
    pub(crate) fn success_data(&self, response: Response) -> SuccessData {
        if self.use_full_response_object {
            SuccessData::Response(Box::new(response))
        } else {
            SuccessData::Body(response.data)
        }
    }

    pub(crate) fn success_context(&self, data: SuccessData) -> SuccessContext<A, S> {
        SuccessContext {
            kind: self.types.success.clone(),
            data,
            meta: self.meta.clone(),
            store: self.handler_store(),
        }
    }

    /// Dispatch the action built by a plain success handler
    pub(crate) fn dispatch_success(&self, data: SuccessData) {
        if let SuccessHandler::Action(build) = &self.success {
            self.store.dispatch(build(self.success_context(data)));
        }
    }

    /// Build the failure action for `error`
    pub(crate) fn failure_action(&self, error: &ApiError) -> A {
        (self.failure)(&self.types.failure, error)
    }

    /// Issue the resolved request once more
    pub(crate) async fn issue(&self) -> Result<Response, TransportError> {
        metrics::counter!("api.request.issued").increment(1);
        crate::transport::send(self.transport.as_ref(), self.request.clone()).await
    }
}
