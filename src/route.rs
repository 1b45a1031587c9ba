use std::fmt;

use crate::{DeferredFetchError, Result};

/// A request path that may only address the configured product host.
///
/// Built with [`TrustedRoute::parse`]; the transport joins it onto the
/// product base URL, so anything that could redirect the request elsewhere
/// is refused.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrustedRoute(String);

impl TrustedRoute {
    pub fn parse(route: &str) -> Result<Self> {
        let reject = |reason| DeferredFetchError::UntrustedRoute {
            route: route.to_owned(),
            reason,
        };

        if route.is_empty() {
            return Err(reject("route is empty"));
        }
        if !route.starts_with('/') {
            return Err(reject("route must start with '/'"));
        }
        if route.starts_with("//") {
            return Err(reject("protocol-relative routes are not allowed"));
        }
        if route.contains("://") {
            return Err(reject("absolute urls are not allowed"));
        }
        if route.contains('\\') {
            return Err(reject("backslashes are not allowed"));
        }
        if route.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(reject("whitespace and control characters are not allowed"));
        }

        let path = route.split(['?', '#']).next().unwrap_or_default();
        if path.split('/').any(|segment| segment == "..") {
            return Err(reject("parent path segments are not allowed"));
        }

        Ok(Self(route.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrustedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::TrustedRoute;
    use crate::DeferredFetchError;

    #[test]
    fn accepts_product_paths_with_query() {
        let route = TrustedRoute::parse("/rest/api/3/search?jql=project%20%3D%20ABC&maxResults=50")
            .expect("route must be trusted");
        assert!(route.as_str().starts_with("/rest/api/3/search"));
    }

    #[test]
    fn rejects_routes_that_leave_the_product_host() {
        for route in [
            "",
            "rest/api/3/myself",
            "https://evil.example.com/steal",
            "//evil.example.com/steal",
            "/redirect?to=http://evil.example.com",
            "/rest\\api",
            "/rest/api/../../admin",
            "/rest/api/3/issue/ABC-1 HTTP/1.1",
        ] {
            let err = TrustedRoute::parse(route).expect_err(route);
            assert!(
                matches!(err, DeferredFetchError::UntrustedRoute { .. }),
                "{route}"
            );
        }
    }

    #[test]
    fn dotdot_in_query_is_fine() {
        assert!(TrustedRoute::parse("/wiki/rest/api/search?cql=title~\"a..b\"").is_ok());
    }
}
