use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::{DeferredFetchError, Result};

/// A fully read product API response.
///
/// The body is buffered so the response can be inspected by the retry
/// policy and then handed to the response handler.
#[derive(Clone, Debug)]
pub struct ProductResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ProductResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header, ignoring names or values that are not valid HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value when present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|err| {
            DeferredFetchError::Decode(format!("invalid response JSON: {err}; body: {}", self.body))
        })
    }
}
