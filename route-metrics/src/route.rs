//! Route template resolution.

use axum::extract::MatchedPath;
use http::Request;

/// Looks up the route template a request was matched against.
///
/// Returning `None` means the route is unknown; the request is then recorded
/// under the unmatched placeholder instead of its concrete path.
pub trait RouteResolver<B> {
    fn route_template(&self, request: &Request<B>) -> Option<String>;
}

/// Reads the [`MatchedPath`] extension set by axum's router.
///
/// The extension is only present once routing has happened, so layers using
/// this resolver belong on [`axum::Router::route_layer`] (or on a handler).
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchedPathResolver;

impl<B> RouteResolver<B> for MatchedPathResolver {
    fn route_template(&self, request: &Request<B>) -> Option<String> {
        request
            .extensions()
            .get::<MatchedPath>()
            .map(|path| path.as_str().to_owned())
    }
}

impl<B, F> RouteResolver<B> for F
where
    F: Fn(&Request<B>) -> Option<String>,
{
    fn route_template(&self, request: &Request<B>) -> Option<String> {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_extension_is_unresolved() {
        let request = Request::builder().uri("/users/42").body(()).unwrap();
        assert_eq!(MatchedPathResolver.route_template(&request), None);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |request: &Request<()>| {
            request
                .uri()
                .path()
                .starts_with("/users/")
                .then(|| "/users/{id}".to_string())
        };

        let matched = Request::builder().uri("/users/42").body(()).unwrap();
        let other = Request::builder().uri("/teams/7").body(()).unwrap();
        assert_eq!(resolver.route_template(&matched).as_deref(), Some("/users/{id}"));
        assert_eq!(resolver.route_template(&other), None);
    }
}
