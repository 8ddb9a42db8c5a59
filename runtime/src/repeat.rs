//! Polling controller.
//!
//! When an action carries a repeat predicate, the initial response only starts
//! the poll. The same request is re-issued (same headers, same cancellation
//! token) and every tick's response is classified and handed to the
//! predicate, until it decides.
//!
//! The first tick is issued right after the initial response; later ticks wait
//! the policy's interval. The call has already left the registry by then, so
//! a later call sharing its REQUEST type does not end the poll.

use crate::call::CallContext;
use crate::{finalize, status};
use composable_api_core::action::RepeatFn;
use composable_api_core::{ApiError, RepeatDecision, RepeatValue, SuccessData};
use std::fmt;
use std::time::Duration;

/// How a call is polled
#[derive(Clone)]
pub struct RepeatPolicy {
    /// Decides after every tick
    pub predicate: RepeatFn,
    /// Delay between undecided ticks
    pub interval: Duration,
    /// Give up after this many ticks
    pub max_ticks: Option<u32>,
}

impl fmt::Debug for RepeatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatPolicy")
            .field("interval", &self.interval)
            .field("max_ticks", &self.max_ticks)
            .finish_non_exhaustive()
    }
}

/// Poll until the predicate decides
///
/// # Errors
///
/// - [`ApiError::RepeatRejected`] when the predicate rejects
/// - [`ApiError::RepeatExhausted`] when `max_ticks` undecided ticks ran
/// - any transport, status or body error of a tick
pub(crate) async fn poll<A, S>(
    ctx: &CallContext<A, S>,
    policy: &RepeatPolicy,
) -> Result<RepeatValue, ApiError> {
    let mut ticks: u32 = 0;

    loop {
        ticks = ticks.saturating_add(1);
        metrics::counter!("api.repeat.tick").increment(1);

        let response = ctx.issue().await?;
        let response = status::classify(response, &ctx.config, &ctx.store)?;
        finalize::validate_body(&response)?;

        match (policy.predicate)(&response) {
            RepeatDecision::Accept => {
                ctx.dispatch_success(SuccessData::Response(Box::new(response.clone())));
                return Ok(RepeatValue::Response(Box::new(response)));
            }
            RepeatDecision::Reject => {
                return Err(ApiError::RepeatRejected(RepeatValue::Response(Box::new(
                    response,
                ))));
            }
            RepeatDecision::Resolve(value) => {
                ctx.dispatch_success(SuccessData::Body(value.clone()));
                return Ok(RepeatValue::Value(value));
            }
            RepeatDecision::Fail(value) => {
                return Err(ApiError::RepeatRejected(RepeatValue::Value(value)));
            }
            RepeatDecision::Settle(value) => return Ok(RepeatValue::Value(value)),
            RepeatDecision::Continue => {}
        }

        if policy.max_ticks.is_some_and(|max| ticks >= max) {
            tracing::warn!(request_type = %ctx.types.request, ticks, "Polling gave up");
            return Err(ApiError::RepeatExhausted { ticks });
        }

        tracing::debug!(
            request_type = %ctx.types.request,
            ticks,
            interval_ms = u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
            "Polling again"
        );

        tokio::time::sleep(policy.interval).await;
    }
}
