use std::sync::Arc;

use crate::{
    DeferredFetchError, FetchOptions, Identity, ProductApi, ProductResponse, ProductTransport,
    RequestInit, Result, TrustedRoute,
};

/// Maps [`FetchOptions`] to a request function bound to one product API and
/// identity.
#[derive(Clone)]
pub struct FetchOptionsResolver {
    transport: Arc<dyn ProductTransport>,
}

impl FetchOptionsResolver {
    pub fn new(transport: Arc<dyn ProductTransport>) -> Self {
        Self { transport }
    }

    /// Binds a request function for `options`.
    ///
    /// The transport is queried on every call rather than once up front, and
    /// only a pair it does not support is an error.
    pub fn resolve(&self, options: &FetchOptions) -> Result<BoundRequest> {
        let FetchOptions {
            target_api: api,
            identity,
        } = *options;

        if !self.transport.supports(api, identity) {
            return Err(DeferredFetchError::MissingCapability { api, identity });
        }

        Ok(BoundRequest {
            transport: Arc::clone(&self.transport),
            api,
            identity,
        })
    }
}

/// A request function bound to a product API and identity.
#[derive(Clone)]
pub struct BoundRequest {
    transport: Arc<dyn ProductTransport>,
    api: ProductApi,
    identity: Identity,
}

impl BoundRequest {
    pub fn api(&self) -> ProductApi {
        self.api
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub async fn send(&self, route: &TrustedRoute, init: &RequestInit) -> Result<ProductResponse> {
        self.transport
            .request(self.api, self.identity, route, init)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::FetchOptionsResolver;
    use crate::{
        DeferredFetchError, FetchOptions, Identity, ProductApi, ProductResponse, ProductTransport,
        RequestInit, Result, TrustedRoute,
    };

    /// Supports everything except Bitbucket, like older platform runtimes.
    struct NoBitbucket;

    #[async_trait]
    impl ProductTransport for NoBitbucket {
        fn supports(&self, api: ProductApi, _identity: Identity) -> bool {
            api != ProductApi::Bitbucket
        }

        async fn request(
            &self,
            api: ProductApi,
            identity: Identity,
            route: &TrustedRoute,
            _init: &RequestInit,
        ) -> Result<ProductResponse> {
            Ok(ProductResponse::new(StatusCode::OK, format!("{api} {identity} {route}")))
        }
    }

    #[test]
    fn resolves_every_supported_pair() {
        let resolver = FetchOptionsResolver::new(Arc::new(NoBitbucket));
        for api in [ProductApi::Jira, ProductApi::Confluence] {
            for identity in [Identity::App, Identity::User] {
                let bound = resolver
                    .resolve(&FetchOptions::new(api, identity))
                    .expect("supported pair must resolve");
                assert_eq!((bound.api(), bound.identity()), (api, identity));
            }
        }
    }

    #[test]
    fn missing_capability_is_a_configuration_error() {
        let resolver = FetchOptionsResolver::new(Arc::new(NoBitbucket));
        let err = resolver
            .resolve(&FetchOptions::app(ProductApi::Bitbucket))
            .err()
            .expect("bitbucket is unsupported");
        assert!(matches!(
            err,
            DeferredFetchError::MissingCapability {
                api: ProductApi::Bitbucket,
                identity: Identity::App
            }
        ));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn bound_request_targets_resolved_pair() {
        let resolver = FetchOptionsResolver::new(Arc::new(NoBitbucket));
        let bound = resolver.resolve(&FetchOptions::app(ProductApi::Confluence)).unwrap();
        let route = TrustedRoute::parse("/wiki/rest/api/space").unwrap();
        let response = bound.send(&route, &RequestInit::default()).await.unwrap();
        assert_eq!(response.text(), "confluence app /wiki/rest/api/space");
    }
}
