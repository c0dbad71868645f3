//! Request filters and their axum adapter.
//!
//! A filter decides per path whether it applies (`should_skip`) and, when it
//! does, handles the request and may pass it on through `next`. Filters are
//! composed as axum layers in a fixed order when the router is built.

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

#[async_trait]
pub trait RequestFilter: Send + Sync + 'static {
    /// Stable name, used for the once-per-request guard.
    fn name(&self) -> &'static str;

    fn should_skip(&self, path: &str) -> bool;

    async fn handle(&self, request: Request, next: Next) -> Response;
}

/// Names of the filters that already ran for a request.
#[derive(Debug, Clone, Default)]
struct AppliedFilters(HashSet<&'static str>);

/// Middleware entry point: `from_fn_with_state(filter, run_filter::<F>)`.
pub async fn run_filter<F: RequestFilter>(
    State(filter): State<Arc<F>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if filter.should_skip(&path) {
        return next.run(request).await;
    }

    let mut applied = request
        .extensions_mut()
        .remove::<AppliedFilters>()
        .unwrap_or_default();
    let first_run = applied.0.insert(filter.name());
    request.extensions_mut().insert(applied);
    if !first_run {
        trace!(filter = filter.name(), path = %path, "filter already applied");
        return next.run(request).await;
    }

    filter.handle(request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestFilter for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn should_skip(&self, path: &str) -> bool {
            path == "/open"
        }

        async fn handle(&self, request: Request, next: Next) -> Response {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("x-filtered", HeaderValue::from_static("yes"));
            response
        }
    }

    fn app(filter: Arc<Counting>) -> Router {
        Router::new()
            .route("/open", get(|| async { "open" }))
            .route("/closed", get(|| async { "closed" }))
            // Same filter layered twice still runs once per request.
            .layer(from_fn_with_state(filter.clone(), run_filter::<Counting>))
            .layer(from_fn_with_state(filter, run_filter::<Counting>))
    }

    #[tokio::test]
    async fn test_filter_runs_once_per_request() {
        let filter = Arc::new(Counting::default());
        let response = app(filter.clone())
            .oneshot(Request::builder().uri("/closed").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-filtered").unwrap(), "yes");
        assert_eq!(filter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skipped_paths_bypass_filter() {
        let filter = Arc::new(Counting::default());
        let response = app(filter.clone())
            .oneshot(Request::builder().uri("/open").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-filtered").is_none());
        assert_eq!(filter.calls.load(Ordering::SeqCst), 0);
    }
}
