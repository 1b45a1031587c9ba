use crate::{Identity, ProductApi};

/// Boxed error produced by an external collaborator (transport, queue, handler).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum DeferredFetchError {
    /// A product API or identity name that this crate does not know.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
    /// A [`FetchOptionsBuilder`](crate::FetchOptionsBuilder) field was never set.
    #[error("fetch options builder: no {0} has been set")]
    MissingField(&'static str),
    /// The transport cannot issue requests for this product/identity pair.
    #[error("no request capability for {api} as {identity}")]
    MissingCapability { api: ProductApi, identity: Identity },
    /// Route failed trusted-route validation.
    #[error("untrusted route '{route}': {reason}")]
    UntrustedRoute { route: String, reason: &'static str },
    /// Request parameters (method or headers) could not be applied.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Network or request execution error. Never retried by this crate.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// The delay queue rejected a retry payload.
    #[error("delay queue error: {0}")]
    Queue(#[source] BoxError),
    /// The caller's response handler failed.
    #[error("response handler error: {0}")]
    Handler(#[source] BoxError),
    /// Retry state could not be encoded.
    #[error("failed to serialize retry state: {0}")]
    Serialize(#[source] serde_json::Error),
    /// A redelivered payload is not a valid retry state.
    #[error("malformed retry payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
}

impl DeferredFetchError {
    /// Returns true for errors raised before any request was sent
    /// (configuration and validation failures).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedConfiguration(_)
                | Self::MissingField(_)
                | Self::MissingCapability { .. }
                | Self::UntrustedRoute { .. }
                | Self::InvalidRequest(_)
        )
    }
}
