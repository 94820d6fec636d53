//! Per-request trace IDs.
//!
//! Every request runs inside an `http_request` span carrying a trace ID,
//! taken from the `x-trace-id` header when it holds a UUID and generated
//! otherwise. The ID is echoed on the response. Bodies are never buffered:
//! `/ws` responses are upgrades and static files may be large.

use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderValue;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

pub async fn trace_middleware(mut req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");

        // A hyphenated UUID is always a valid header value.
        let header = HeaderValue::from_str(&trace_id.to_string()).ok();
        if let Some(value) = &header {
            req.headers_mut().insert(X_TRACE_ID, value.clone());
        }

        let mut response = next.run(req).await;

        if let Some(value) = header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );

        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod test {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::middleware;
    use axum::routing::get;
    use tower::ServiceExt;
    use tracing_test::traced_test;

    use super::*;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|req: Request<Body>| async move {
                    req.headers()
                        .get(X_TRACE_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_owned()
                }),
            )
            .layer(middleware::from_fn(trace_middleware))
    }

    #[tokio::test]
    #[traced_test]
    async fn generates_and_echoes_trace_id() {
        let response = app()
            .oneshot(Request::get("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers().get(X_TRACE_ID).unwrap().to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert!(logs_contain("response finished"));
    }

    #[tokio::test]
    async fn keeps_a_valid_incoming_trace_id() {
        let id = Uuid::new_v4().to_string();
        let response = app()
            .oneshot(
                Request::get("/echo")
                    .header(X_TRACE_ID, &id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get(X_TRACE_ID).unwrap(), id.as_str());
    }

    #[tokio::test]
    async fn replaces_an_invalid_incoming_trace_id() {
        let response = app()
            .oneshot(
                Request::get("/echo")
                    .header(X_TRACE_ID, "not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let id = response.headers().get(X_TRACE_ID).unwrap().to_str().unwrap();
        assert_ne!(id, "not-a-uuid");
        assert!(Uuid::parse_str(id).is_ok());
    }
}
