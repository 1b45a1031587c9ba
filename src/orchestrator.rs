use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{
    BoxError, DefaultRetryPolicy, DeferredFetchError, DelayQueue, FetchOptionsResolver,
    ProductResponse, ProductTransport, Result, RetryDecision, RetryPolicy, RetryState,
    TrustedRoute,
};

/// Receives the final response of a request chain together with the
/// caller's `app_context`.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ResponseHandler: Send + Sync {
    async fn handle(
        &self,
        response: ProductResponse,
        app_context: String,
    ) -> std::result::Result<(), BoxError>;
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl<F, Fut> ResponseHandler for F
where
    F: Fn(ProductResponse, String) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send,
{
    async fn handle(
        &self,
        response: ProductResponse,
        app_context: String,
    ) -> std::result::Result<(), BoxError> {
        (self)(response, app_context).await
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl<F, Fut> ResponseHandler for F
where
    F: Fn(ProductResponse, String) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), BoxError>>,
{
    async fn handle(
        &self,
        response: ProductResponse,
        app_context: String,
    ) -> std::result::Result<(), BoxError> {
        (self)(response, app_context).await
    }
}

/// What a single [`RetryOrchestrator::attempt`] did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttemptOutcome {
    /// The response was final and the handler has run.
    Handled { status: StatusCode },
    /// A retry was pushed to the delay queue; the handler did not run.
    Scheduled {
        remaining_retries: u32,
        retry_delay_millis: u64,
        delay_in_seconds: u64,
    },
}

/// Performs fetch attempts and defers rate-limited retries to a
/// [`DelayQueue`] instead of sleeping.
pub struct RetryOrchestrator {
    resolver: FetchOptionsResolver,
    queue: Arc<dyn DelayQueue>,
    handler: Arc<dyn ResponseHandler>,
    policy: Arc<dyn RetryPolicy>,
}

impl fmt::Debug for RetryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOrchestrator").finish_non_exhaustive()
    }
}

impl RetryOrchestrator {
    /// Creates an orchestrator using [`DefaultRetryPolicy`].
    pub fn new<H>(
        transport: Arc<dyn ProductTransport>,
        queue: Arc<dyn DelayQueue>,
        handler: H,
    ) -> Self
    where
        H: ResponseHandler + 'static,
    {
        Self {
            resolver: FetchOptionsResolver::new(transport),
            queue,
            handler: Arc::new(handler),
            policy: Arc::new(DefaultRetryPolicy),
        }
    }

    pub fn with_retry_policy<P: RetryPolicy + 'static>(mut self, policy: P) -> Self {
        self.set_retry_policy(policy);
        self
    }

    /// Replaces the retry policy for subsequent attempts.
    pub fn set_retry_policy<P: RetryPolicy + 'static>(&mut self, policy: P) {
        self.policy = Arc::new(policy);
    }

    /// Performs exactly one fetch for `state`.
    ///
    /// A final response is passed to the handler. A response the policy
    /// wants retried is not: instead the next [`RetryState`] is pushed to
    /// the queue, delayed by the policy's delay rounded to whole seconds.
    /// Transport errors are returned as-is and never retried.
    pub async fn attempt(&self, state: RetryState) -> Result<AttemptOutcome> {
        let request = self.resolver.resolve(&state.fetch_options)?;
        let route = TrustedRoute::parse(&state.route)?;
        let init = state.request_init.clone().unwrap_or_default();

        let response = request.send(&route, &init).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            status = response.status.as_u16(),
            remaining_retries = state.remaining_retries,
            app_context = %state.app_context,
            "fetch attempt completed"
        );

        let decision = self.policy.evaluate(
            state.remaining_retries,
            state.retry_delay_millis,
            &state.policy_options,
            &response,
        );

        match decision {
            Some(decision) => self.schedule_retry(&state, decision).await,
            None => {
                let status = response.status;
                self.handler
                    .handle(response, state.app_context)
                    .await
                    .map_err(DeferredFetchError::Handler)?;
                Ok(AttemptOutcome::Handled { status })
            }
        }
    }

    async fn schedule_retry(
        &self,
        state: &RetryState,
        decision: RetryDecision,
    ) -> Result<AttemptOutcome> {
        #[cfg(feature = "tracing")]
        if decision.remaining_retries > state.remaining_retries {
            tracing::warn!(
                current = state.remaining_retries,
                proposed = decision.remaining_retries,
                "retry policy tried to grow the retry budget, keeping current budget"
            );
        }

        let next = state.next_hop(decision);
        let delay_in_seconds = delay_in_seconds(next.retry_delay_millis);
        self.queue.push(next.to_payload()?, delay_in_seconds).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            remaining_retries = next.remaining_retries,
            delay_in_seconds,
            route = %next.route,
            "request scheduled for retry"
        );

        Ok(AttemptOutcome::Scheduled {
            remaining_retries: next.remaining_retries,
            retry_delay_millis: next.retry_delay_millis,
            delay_in_seconds,
        })
    }
}

/// Converts a retry delay to the queue's whole-second granularity, rounding
/// half up. Sub-second precision is lost on every hop.
pub fn delay_in_seconds(retry_delay_millis: u64) -> u64 {
    retry_delay_millis / 1_000 + u64::from(retry_delay_millis % 1_000 >= 500)
}

#[cfg(test)]
mod tests {
    use super::delay_in_seconds;

    #[test]
    fn delay_rounds_half_up_to_whole_seconds() {
        assert_eq!(delay_in_seconds(0), 0);
        assert_eq!(delay_in_seconds(499), 0);
        assert_eq!(delay_in_seconds(500), 1);
        assert_eq!(delay_in_seconds(1_499), 1);
        assert_eq!(delay_in_seconds(2_500), 3);
        assert_eq!(delay_in_seconds(60_000), 60);
        assert_eq!(delay_in_seconds(u64::MAX), u64::MAX / 1_000 + 1);
    }
}
