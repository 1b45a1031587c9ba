use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;

use crate::{
    DeferredFetchError, Identity, ProductApi, ProductResponse, RequestInit, Result,
    TransportOptions, TrustedRoute,
};

/// The platform's request primitive: signs and sends a request to a product
/// API as a given identity.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ProductTransport: Send + Sync {
    /// Whether requests can be issued against `api` as `identity`.
    ///
    /// Queried on every resolution, so availability may change at runtime.
    fn supports(&self, api: ProductApi, identity: Identity) -> bool;

    /// Sends one request and buffers the response.
    async fn request(
        &self,
        api: ProductApi,
        identity: Identity,
        route: &TrustedRoute,
        init: &RequestInit,
    ) -> Result<ProductResponse>;
}

/// Base URL per product API. Unset products are reported as unsupported.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProductEndpoints {
    pub jira: Option<String>,
    pub confluence: Option<String>,
    pub bitbucket: Option<String>,
}

impl ProductEndpoints {
    pub fn get(&self, api: ProductApi) -> Option<&str> {
        match api {
            ProductApi::Jira => self.jira.as_deref(),
            ProductApi::Confluence => self.confluence.as_deref(),
            ProductApi::Bitbucket => self.bitbucket.as_deref(),
        }
    }

    pub fn set(&mut self, api: ProductApi, base_url: impl Into<String>) {
        let slot = match api {
            ProductApi::Jira => &mut self.jira,
            ProductApi::Confluence => &mut self.confluence,
            ProductApi::Bitbucket => &mut self.bitbucket,
        };
        *slot = Some(base_url.into());
    }
}

#[derive(Clone)]
/// [`ProductTransport`] over `reqwest`, authenticating with a fixed
/// authorization header value per identity.
pub struct ReqwestTransport {
    http: reqwest::Client,
    endpoints: ProductEndpoints,
    app_authorization: Option<String>,
    user_authorization: Option<String>,
    options: TransportOptions,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("ReqwestTransport")
            .field("endpoints", &self.endpoints)
            .field("app_authorization", &redact(&self.app_authorization))
            .field("user_authorization", &redact(&self.user_authorization))
            .field("options", &self.options)
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new(endpoints: ProductEndpoints) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
            app_authorization: None,
            user_authorization: None,
            options: TransportOptions::default(),
        }
    }

    /// Sets the raw authorization header value used for `identity`.
    ///
    /// Example: `"Bearer <token>"` or any custom scheme.
    pub fn with_authorization(
        mut self,
        identity: Identity,
        authorization: impl Into<String>,
    ) -> Self {
        let value = Some(authorization.into());
        match identity {
            Identity::App => self.app_authorization = value,
            Identity::User => self.user_authorization = value,
        }
        self
    }

    /// Sets a bearer token for `identity`, adding the `Bearer ` prefix if missing.
    pub fn with_bearer(self, identity: Identity, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        self.with_authorization(identity, authorization)
    }

    pub fn with_options(mut self, opts: TransportOptions) -> Self {
        self.options = opts;
        self
    }

    /// Creates a transport from environment variables.
    ///
    /// Reads:
    /// - `DEFERRED_FETCH_JIRA_URL`, `DEFERRED_FETCH_CONFLUENCE_URL`,
    ///   `DEFERRED_FETCH_BITBUCKET_URL` — product base URLs (each optional)
    /// - `DEFERRED_FETCH_APP_TOKEN` — app identity token (required)
    /// - `DEFERRED_FETCH_USER_TOKEN` — user identity token (optional)
    ///
    /// Returns an error if no product URL is set or the app token is missing.
    ///
    /// **Not available on `wasm32` targets.**
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> std::result::Result<Self, String> {
        let mut endpoints = ProductEndpoints::default();
        for (api, var) in [
            (ProductApi::Jira, "DEFERRED_FETCH_JIRA_URL"),
            (ProductApi::Confluence, "DEFERRED_FETCH_CONFLUENCE_URL"),
            (ProductApi::Bitbucket, "DEFERRED_FETCH_BITBUCKET_URL"),
        ] {
            if let Some(url) = non_empty_env(var) {
                endpoints.set(api, url);
            }
        }
        if endpoints == ProductEndpoints::default() {
            return Err("no DEFERRED_FETCH_*_URL environment variable is set".to_owned());
        }

        let app_token = non_empty_env("DEFERRED_FETCH_APP_TOKEN")
            .ok_or_else(|| "missing DEFERRED_FETCH_APP_TOKEN environment variable".to_owned())?;

        let mut transport = Self::new(endpoints).with_bearer(Identity::App, app_token);
        if let Some(user_token) = non_empty_env("DEFERRED_FETCH_USER_TOKEN") {
            transport = transport.with_bearer(Identity::User, user_token);
        }
        Ok(transport)
    }

    fn authorization(&self, identity: Identity) -> Option<&str> {
        match identity {
            Identity::App => self.app_authorization.as_deref(),
            Identity::User => self.user_authorization.as_deref(),
        }
    }

    fn build_request(
        &self,
        api: ProductApi,
        identity: Identity,
        route: &TrustedRoute,
        init: &RequestInit,
    ) -> Result<reqwest::RequestBuilder> {
        let (Some(base_url), Some(authorization)) =
            (self.endpoints.get(api), self.authorization(identity))
        else {
            return Err(DeferredFetchError::MissingCapability { api, identity });
        };

        let method = match init.method.as_deref() {
            Some(method) => Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| DeferredFetchError::InvalidRequest(format!("bad method '{method}'")))?,
            None => Method::GET,
        };

        let url = format!("{}{}", base_url.trim_end_matches('/'), route);
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, authorization)
            .timeout(Duration::from_millis(self.options.timeout_ms));

        for (name, value) in &init.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                DeferredFetchError::InvalidRequest(format!("bad header name '{name}'"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                DeferredFetchError::InvalidRequest(format!("bad value for header '{name}'"))
            })?;
            request = request.header(name, value);
        }
        if let Some(body) = &init.body {
            request = request.body(body.clone());
        }

        #[cfg(feature = "tracing")]
        if !init.extra.is_empty() {
            let keys: Vec<&str> = init.extra.keys().map(String::as_str).collect();
            tracing::debug!(?keys, "request init keys not applied by reqwest transport");
        }
        Ok(request)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ProductTransport for ReqwestTransport {
    fn supports(&self, api: ProductApi, identity: Identity) -> bool {
        self.endpoints.get(api).is_some() && self.authorization(identity).is_some()
    }

    async fn request(
        &self,
        api: ProductApi,
        identity: Identity,
        route: &TrustedRoute,
        init: &RequestInit,
    ) -> Result<ProductResponse> {
        let request = self.build_request(api, identity, route, init)?;
        let response = request
            .send()
            .await
            .map_err(|err| DeferredFetchError::Transport(Box::new(err)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|err| DeferredFetchError::Transport(Box::new(err)))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%api, %identity, %route, status = status.as_u16(), "product response");

        Ok(ProductResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|value| !value.trim().is_empty())
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
