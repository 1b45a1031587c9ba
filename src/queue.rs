use async_trait::async_trait;

use crate::Result;

/// A delayed, at-least-once message queue.
///
/// Payloads pushed here are later handed, unchanged, to the registered
/// [`QueueListener`](crate::QueueListener). Redelivery and dead-lettering are
/// owned by the implementation.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait DelayQueue: Send + Sync {
    async fn push(&self, payload: String, delay_in_seconds: u64) -> Result<()>;
}

#[cfg(not(target_arch = "wasm32"))]
pub use local::{Deliveries, LocalDelayQueue};

#[cfg(not(target_arch = "wasm32"))]
mod local {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::DelayQueue;
    use crate::{DeferredFetchError, Result};

    /// In-process [`DelayQueue`] driven by tokio timers, for running outside
    /// the hosted platform.
    ///
    /// Each push spawns a timer task; pending deliveries are lost if the
    /// runtime shuts down.
    #[derive(Clone, Debug)]
    pub struct LocalDelayQueue {
        sender: mpsc::UnboundedSender<String>,
    }

    /// Receiving half of a [`LocalDelayQueue`].
    #[derive(Debug)]
    pub struct Deliveries {
        receiver: mpsc::UnboundedReceiver<String>,
    }

    impl LocalDelayQueue {
        pub fn new() -> (Self, Deliveries) {
            let (sender, receiver) = mpsc::unbounded_channel();
            (Self { sender }, Deliveries { receiver })
        }
    }

    impl Deliveries {
        /// Waits for the next due payload. `None` once every queue handle is
        /// dropped and all pending timers have fired.
        pub async fn recv(&mut self) -> Option<String> {
            self.receiver.recv().await
        }
    }

    #[async_trait]
    impl DelayQueue for LocalDelayQueue {
        async fn push(&self, payload: String, delay_in_seconds: u64) -> Result<()> {
            if self.sender.is_closed() {
                return Err(DeferredFetchError::Queue("delivery receiver dropped".into()));
            }

            let sender = self.sender.clone();
            tokio::spawn(async move {
                if delay_in_seconds > 0 {
                    tokio::time::sleep(Duration::from_secs(delay_in_seconds)).await;
                }
                if sender.send(payload).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("delivery receiver dropped before retry became due");
                }
            });
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::LocalDelayQueue;
        use crate::{DeferredFetchError, DelayQueue};

        #[tokio::test]
        async fn delivers_pushed_payload() {
            let (queue, mut deliveries) = LocalDelayQueue::new();
            queue.push("{\"a\":1}".to_owned(), 0).await.unwrap();
            assert_eq!(deliveries.recv().await.as_deref(), Some("{\"a\":1}"));
        }

        #[tokio::test]
        async fn push_fails_once_receiver_is_gone() {
            let (queue, deliveries) = LocalDelayQueue::new();
            drop(deliveries);
            let err = queue.push("x".to_owned(), 0).await.unwrap_err();
            assert!(matches!(err, DeferredFetchError::Queue(_)));
        }

        #[tokio::test(start_paused = true)]
        async fn holds_payload_until_delay_elapses() {
            let (queue, mut deliveries) = LocalDelayQueue::new();
            queue.push("late".to_owned(), 30).await.unwrap();

            let early =
                tokio::time::timeout(std::time::Duration::from_secs(29), deliveries.recv()).await;
            assert!(early.is_err());
            assert_eq!(deliveries.recv().await.as_deref(), Some("late"));
        }
    }
}
