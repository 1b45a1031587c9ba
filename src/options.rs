use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DeferredFetchError, Result};

/// Product API a request is issued against.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductApi {
    Jira,
    Confluence,
    Bitbucket,
}

impl ProductApi {
    pub const ALL: [ProductApi; 3] = [Self::Jira, Self::Confluence, Self::Bitbucket];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jira => "jira",
            Self::Confluence => "confluence",
            Self::Bitbucket => "bitbucket",
        }
    }
}

impl fmt::Display for ProductApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductApi {
    type Err = DeferredFetchError;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|api| api.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                DeferredFetchError::UnsupportedConfiguration(format!("unexpected api '{value}'"))
            })
    }
}

/// Security principal used to sign the outgoing request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    App,
    /// Recognised by the resolver, but the builder does not offer it: delayed
    /// retries cannot carry a user context.
    User,
}

impl Identity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Identity {
    type Err = DeferredFetchError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            v if v.eq_ignore_ascii_case("app") => Ok(Self::App),
            v if v.eq_ignore_ascii_case("user") => Ok(Self::User),
            other => Err(DeferredFetchError::UnsupportedConfiguration(format!(
                "unexpected identity '{other}'"
            ))),
        }
    }
}

/// Which product API to call and which identity to call it as.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    pub target_api: ProductApi,
    pub identity: Identity,
}

impl FetchOptions {
    pub fn new(target_api: ProductApi, identity: Identity) -> Self {
        Self {
            target_api,
            identity,
        }
    }

    /// Shorthand for app-identity requests, the only identity delayed
    /// retries support.
    pub fn app(target_api: ProductApi) -> Self {
        Self::new(target_api, Identity::App)
    }

    pub fn builder() -> FetchOptionsBuilder {
        FetchOptionsBuilder::default()
    }
}

/// Validating builder for [`FetchOptions`].
///
/// Both the identity and the product API must be chosen before
/// [`build`](FetchOptionsBuilder::build) succeeds.
#[derive(Clone, Debug, Default)]
pub struct FetchOptionsBuilder {
    identity: Option<Identity>,
    api: Option<ProductApi>,
}

impl FetchOptionsBuilder {
    pub fn as_app(mut self) -> Self {
        self.identity = Some(Identity::App);
        self
    }

    pub fn against(mut self, api: ProductApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn against_jira(self) -> Self {
        self.against(ProductApi::Jira)
    }

    pub fn against_confluence(self) -> Self {
        self.against(ProductApi::Confluence)
    }

    pub fn against_bitbucket(self) -> Self {
        self.against(ProductApi::Bitbucket)
    }

    pub fn build(self) -> Result<FetchOptions> {
        let identity = self
            .identity
            .ok_or(DeferredFetchError::MissingField("impersonation"))?;
        let api = self.api.ok_or(DeferredFetchError::MissingField("api"))?;
        Ok(FetchOptions::new(api, identity))
    }
}

/// Configures the HTTP transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchOptions, Identity, ProductApi};
    use crate::DeferredFetchError;

    #[test]
    fn builder_requires_identity_then_api() {
        let err = FetchOptions::builder().against_jira().build().unwrap_err();
        assert!(matches!(err, DeferredFetchError::MissingField("impersonation")));

        let err = FetchOptions::builder().as_app().build().unwrap_err();
        assert!(matches!(err, DeferredFetchError::MissingField("api")));
    }

    #[test]
    fn builder_last_product_wins() {
        let options = FetchOptions::builder()
            .against_jira()
            .as_app()
            .against_bitbucket()
            .build()
            .expect("both fields set");
        assert_eq!(options, FetchOptions::new(ProductApi::Bitbucket, Identity::App));
    }

    #[test]
    fn parse_rejects_unknown_api() {
        assert_eq!("Confluence".parse::<ProductApi>().unwrap(), ProductApi::Confluence);
        let err = "trello".parse::<ProductApi>().unwrap_err();
        assert!(matches!(err, DeferredFetchError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn serializes_with_camel_case_lowercase_values() {
        let json = serde_json::to_value(FetchOptions::app(ProductApi::Jira)).unwrap();
        assert_eq!(json, serde_json::json!({"targetApi": "jira", "identity": "app"}));
    }
}
