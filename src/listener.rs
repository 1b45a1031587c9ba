use std::sync::Arc;

use crate::{AttemptOutcome, Result, RetryOrchestrator, RetryState};

/// Redelivery entry point: turns a queued payload back into a fetch attempt.
#[derive(Clone, Debug)]
pub struct QueueListener {
    key: String,
    orchestrator: Arc<RetryOrchestrator>,
}

impl QueueListener {
    /// `key` is the name this listener is registered under with the
    /// platform's event dispatcher.
    pub fn new(key: impl Into<String>, orchestrator: Arc<RetryOrchestrator>) -> Self {
        Self {
            key: key.into(),
            orchestrator,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resumes the chain carried by `raw_payload`.
    ///
    /// Malformed payloads fail before anything is fetched, handled or
    /// enqueued. Delivering the same payload twice fetches twice.
    pub async fn on_message(&self, raw_payload: &str) -> Result<AttemptOutcome> {
        let state = match RetryState::from_payload(raw_payload) {
            Ok(state) => state,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    listener = %self.key,
                    error = %err,
                    "dropping malformed retry payload"
                );
                return Err(err);
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            listener = %self.key,
            remaining_retries = state.remaining_retries,
            "received retry event"
        );

        self.orchestrator.attempt(state).await
    }

    /// Feeds every delivery from a [`LocalDelayQueue`](crate::LocalDelayQueue)
    /// to [`on_message`](Self::on_message). Returns once the delivery channel
    /// closes; a listener whose orchestrator pushes to the same queue keeps it
    /// open, so this is normally spawned as a background task.
    ///
    /// A failed message is logged and skipped.
    #[cfg(not(target_arch = "wasm32"))]
    pub async fn run(&self, mut deliveries: crate::Deliveries) {
        while let Some(payload) = deliveries.recv().await {
            if let Err(_err) = self.on_message(&payload).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(listener = %self.key, error = %_err, "retry event failed");
            }
        }
    }
}
