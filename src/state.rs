use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{DeferredFetchError, FetchOptions, Result, RetryDecision};

/// Request parameters other than the route.
///
/// Keys other than `method`, `headers` and `body` are kept in `extra` and
/// travel through the queue untouched, for transports that understand them.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestInit {
    /// HTTP method; `GET` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl RequestInit {
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON body together with its content type.
    pub fn json<T: Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_string(value).map_err(DeferredFetchError::Serialize)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }
}

/// Everything needed to resume a fetch in a later invocation.
///
/// Only `remaining_retries` and `retry_delay_millis` change between hops of
/// one request chain; the rest is carried through unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    pub remaining_retries: u32,
    pub retry_delay_millis: u64,
    pub fetch_options: FetchOptions,
    /// Read only by the retry policy; carried verbatim otherwise.
    pub policy_options: JsonValue,
    pub route: String,
    pub request_init: Option<RequestInit>,
    pub app_context: String,
}

impl RetryState {
    /// Starts a chain with a zero retry budget and empty policy options.
    pub fn new(
        fetch_options: FetchOptions,
        route: impl Into<String>,
        app_context: impl Into<String>,
    ) -> Self {
        Self {
            remaining_retries: 0,
            retry_delay_millis: 0,
            fetch_options,
            policy_options: JsonValue::Object(Map::new()),
            route: route.into(),
            request_init: None,
            app_context: app_context.into(),
        }
    }

    pub fn with_remaining_retries(mut self, remaining_retries: u32) -> Self {
        self.remaining_retries = remaining_retries;
        self
    }

    pub fn with_retry_delay_millis(mut self, retry_delay_millis: u64) -> Self {
        self.retry_delay_millis = retry_delay_millis;
        self
    }

    pub fn with_policy_options(mut self, policy_options: impl Into<JsonValue>) -> Self {
        self.policy_options = policy_options.into();
        self
    }

    pub fn with_request_init(mut self, request_init: RequestInit) -> Self {
        self.request_init = Some(request_init);
        self
    }

    /// Copy of this state for the next hop. The retry budget never grows.
    pub(crate) fn next_hop(&self, decision: RetryDecision) -> Self {
        Self {
            remaining_retries: decision.remaining_retries.min(self.remaining_retries),
            retry_delay_millis: decision.retry_delay_millis,
            ..self.clone()
        }
    }

    pub fn to_payload(&self) -> Result<String> {
        serde_json::to_string(self).map_err(DeferredFetchError::Serialize)
    }

    pub fn from_payload(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(DeferredFetchError::MalformedPayload)
    }
}
