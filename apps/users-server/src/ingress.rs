//! Router-wide middleware: request ids, tracing, timeouts and body limits.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, Response},
    middleware, Router,
};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};
use tracing::{field::Empty, Span};

/// Time allowed for reading a request (headers are bounded by the connection).
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Time allowed to produce a response.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

#[derive(Clone, Default)]
pub struct MakeReqId;

impl MakeRequestId for MakeReqId {
    fn make_request_id<B>(&mut self, _req: &Request<B>) -> Option<RequestId> {
        let id = nanoid::nanoid!();
        Some(RequestId::new(id.parse().ok()?))
    }
}

fn make_span(req: &Request<Body>) -> Span {
    let rid = req
        .headers()
        .get(request_id_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("n/a");
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        uri = %req.uri().path(),
        version = ?req.version(),
        request_id = %rid,
        status = Empty,
        latency_ms = Empty
    )
}

fn on_response(res: &Response<Body>, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", status.as_u16());
    span.record("latency_ms", latency.as_millis() as u64);
    if status.is_server_error() {
        tracing::error!("request failed");
    } else if status.is_client_error() {
        tracing::warn!("request rejected");
    } else {
        tracing::info!("request completed");
    }
}

/// Give error responses produced by middleware (timeouts, body limit) the
/// same `{"error": ...}` JSON shape the handlers use.
async fn json_error_body(res: Response<Body>) -> Response<Body> {
    let status = res.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return res;
    }
    let is_json = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
        return res;
    }

    let message = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_ascii_lowercase();
    let body = serde_json::json!({ "error": message }).to_string();

    let (mut parts, _) = res.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(body))
}

/// Wrap the application router with the server's middleware stack.
///
/// Outermost to innermost: JSON error bodies, body limit, set x-request-id,
/// propagate x-request-id, trace, body read timeout, handler timeout.
pub fn build_app(router: Router) -> Router {
    let x_request_id = request_id_header();

    router
        .layer(TimeoutLayer::new(WRITE_TIMEOUT))
        .layer(RequestBodyTimeoutLayer::new(READ_TIMEOUT))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_span)
                .on_response(on_response),
        )
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeReqId))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::map_response(json_error_body))
}
