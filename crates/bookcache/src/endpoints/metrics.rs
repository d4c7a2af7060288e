use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::http::{Request, Response, StatusCode};
use bookcache_service::metric;
use tower_layer::Layer;
use tower_service::Service as TowerService;

/// Records the duration and status code of every request.
#[derive(Clone, Debug)]
pub struct MetricsLayer;

#[derive(Clone, Debug)]
pub struct MetricsService<S> {
    service: S,
}

#[derive(Debug)]
pub struct MetricsFuture<F> {
    start: Instant,
    route: &'static str,
    future: F,
}

impl<F, B, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let start = self.start;
        let route = self.route;
        // https://doc.rust-lang.org/std/pin/index.html#pinning-is-structural-for-field
        let future = unsafe { self.map_unchecked_mut(|s| &mut s.future) };
        let poll = future.poll(cx);
        if let Poll::Ready(ref res) = poll {
            metric!(timer("requests.duration") = start.elapsed(), "route" => route);
            let status = res
                .as_ref()
                .map(|r| r.status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            metric!(
                counter("responses.status_code") += 1,
                "route" => route,
                "status" => status.as_str(),
            );
        }
        poll
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, service: S) -> Self::Service {
        Self::Service { service }
    }
}

/// Buckets request paths so that metric tags stay bounded.
fn route_tag(path: &str) -> &'static str {
    match path {
        "/api/books" => "books",
        "/api/upstream-count" => "upstream_count",
        "/api/circuit-breaker" => "circuit_breaker",
        _ => "other",
    }
}

impl<S, B, ResBody> TowerService<Request<B>> for MetricsService<S>
where
    S: TowerService<Request<B>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = MetricsFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        Self::Future {
            start: Instant::now(),
            route: route_tag(request.uri().path()),
            future: self.service.call(request),
        }
    }
}
