//! Tower middleware recording request count and latency per route.
//!
//! [`HttpMetricsLayer`] wraps any `Service<Request<_>, Response = Response<_>>`
//! without changing its error type or what the client receives. For every
//! request that produces a response it records exactly one counter increment
//! and one histogram observation, labeled by status code, lower-cased method
//! and route template. The observation is taken when the response body
//! finishes, or when it is dropped early (e.g. the client went away).
//!
//! Requests whose inner service fails or panics are not recorded. A handler
//! that never completes is never recorded either.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use http::{Method, Request, Response};
use pin_project::pin_project;
use tower::{Layer, Service};
use tracing::debug;

use crate::metrics::{HttpMetrics, MetricLabelSet};
use crate::observer::{Completion, ObservedOutcome, ResponseObserver};
use crate::route::{MatchedPathResolver, RouteResolver};

/// Response body produced by [`HttpMetricsService`].
pub type InstrumentedBody<B> = ResponseObserver<B, PendingRecord>;

/// Tower layer applying [`HttpMetricsService`].
#[derive(Clone)]
pub struct HttpMetricsLayer<R = MatchedPathResolver> {
    metrics: Arc<HttpMetrics>,
    resolver: R,
}

impl HttpMetricsLayer {
    pub fn new(metrics: HttpMetrics) -> Self {
        Self {
            metrics: Arc::new(metrics),
            resolver: MatchedPathResolver,
        }
    }
}

impl<R> HttpMetricsLayer<R> {
    /// Use a different route resolver.
    pub fn with_resolver<T>(self, resolver: T) -> HttpMetricsLayer<T> {
        HttpMetricsLayer {
            metrics: self.metrics,
            resolver,
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &HttpMetrics {
        &self.metrics
    }
}

impl<S, R: Clone> Layer<S> for HttpMetricsLayer<R> {
    type Service = HttpMetricsService<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpMetricsService {
            inner,
            metrics: self.metrics.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

/// Service recording one metric observation per served request.
#[derive(Clone)]
pub struct HttpMetricsService<S, R = MatchedPathResolver> {
    inner: S,
    metrics: Arc<HttpMetrics>,
    resolver: R,
}

impl<S, R, ReqBody, ResBody> Service<Request<ReqBody>> for HttpMetricsService<S, R>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    R: RouteResolver<ReqBody>,
{
    type Response = Response<InstrumentedBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let pending = PendingRecord {
            metrics: self.metrics.clone(),
            start: Instant::now(),
            method: req.method().clone(),
            route: self.resolver.route_template(&req),
        };

        ResponseFuture {
            inner: self.inner.call(req),
            pending: Some(pending),
        }
    }
}

/// Response future for [`HttpMetricsService`].
#[pin_project]
pub struct ResponseFuture<F> {
    #[pin]
    inner: F,
    pending: Option<PendingRecord>,
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<InstrumentedBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));
        let pending = this
            .pending
            .take()
            .expect("ResponseFuture polled after completion");

        match result {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                let mut body = ResponseObserver::new(body, pending);
                body.set_status(parts.status);
                Poll::Ready(Ok(Response::from_parts(parts, body)))
            }
            Err(err) => {
                debug!(
                    method = %pending.method,
                    route = pending.route.as_deref().unwrap_or_default(),
                    "inner service failed, request not recorded"
                );
                Poll::Ready(Err(err))
            }
        }
    }
}

/// A request waiting for its response to finish before being recorded.
pub struct PendingRecord {
    metrics: Arc<HttpMetrics>,
    start: Instant,
    method: Method,
    route: Option<String>,
}

impl Completion for PendingRecord {
    fn complete(self, outcome: ObservedOutcome) {
        let labels = MetricLabelSet::new(outcome.status(), &self.method, self.route);
        self.metrics.record(&labels, self.start.elapsed());
    }
}
