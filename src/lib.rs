//! `deferred-fetch` issues product API requests whose rate-limit retries are
//! deferred through a delay queue instead of sleeping in-process.
//!
//! Hosted runtimes cap how long one invocation may run, so a retry that
//! needs a backoff is serialized as a [`RetryState`], pushed to a
//! [`DelayQueue`] and resumed later by a [`QueueListener`]:
//! - [`RetryOrchestrator::attempt`] performs one fetch and either hands the
//!   response to the [`ResponseHandler`] or schedules the next hop
//! - [`RetryPolicy`] decides whether a response warrants a retry
//! - [`FetchOptionsResolver`] binds a request to a product API and identity

mod error;
mod listener;
mod options;
mod orchestrator;
mod policy;
mod queue;
mod resolver;
mod response;
mod route;
mod state;
mod transport;

pub use error::{BoxError, DeferredFetchError};
pub use listener::QueueListener;
pub use options::{FetchOptions, FetchOptionsBuilder, Identity, ProductApi, TransportOptions};
pub use orchestrator::{delay_in_seconds, AttemptOutcome, ResponseHandler, RetryOrchestrator};
pub use policy::{
    DefaultRetryPolicy, ForcedRetryPolicy, RateLimitOptions, RetryDecision, RetryPolicy,
};
pub use queue::DelayQueue;
#[cfg(not(target_arch = "wasm32"))]
pub use queue::{Deliveries, LocalDelayQueue};
pub use resolver::{BoundRequest, FetchOptionsResolver};
pub use response::ProductResponse;
pub use route::TrustedRoute;
pub use state::{RequestInit, RetryState};
pub use transport::{ProductEndpoints, ProductTransport, ReqwestTransport};

pub type Result<T> = std::result::Result<T, DeferredFetchError>;
