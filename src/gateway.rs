//! HTTP front door for the handlers.
//!
//! Each route converts the incoming request into an [`ApiEvent`], invokes its
//! handler and converts the [`ApiResponse`] envelope back into an HTTP
//! response. `OPTIONS` requests get a CORS preflight answer without reaching
//! the handler, and methods a handler does not list get a 405.
//!
//! # Endpoints
//!
//! - `GET /probe` - Caller IP and geolocation
//! - `GET /telemetry` - Same as `/probe`, plus an access log record
//! - `POST /sos` - Broadcast an SOS alert
//! - `POST /face-compare` - Face similarity with an AI description
//! - `GET /health` - Health check

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{MethodFilter, get, on},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::handlers::Handler;
use crate::model::{ApiEvent, ApiResponse, HttpContext, RequestContext};

/// Build the router serving all four handlers.
pub fn app<G, T, A, C>(geo: G, telemetry: T, alert: A, compare: C) -> Router
where
    G: Handler,
    T: Handler,
    A: Handler,
    C: Handler,
{
    Router::new()
        .merge(handler_route("/probe", geo))
        .merge(handler_route("/telemetry", telemetry))
        .merge(handler_route("/sos", alert))
        .merge(handler_route("/face-compare", compare))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
}

/// Mount a single handler at `path` for its allowed methods plus `OPTIONS`.
pub fn handler_route<H: Handler>(path: &str, handler: H) -> Router {
    Router::new()
        .route(path, on(method_filter(H::ALLOWED_METHODS), dispatch::<H>))
        .with_state(Arc::new(handler))
}

/// Filter matching a comma-separated method list. `OPTIONS` is always
/// included so preflight requests reach [`dispatch`].
pub fn method_filter(allowed_methods: &str) -> MethodFilter {
    allowed_methods
        .split(',')
        .filter_map(|name| Method::from_bytes(name.trim().as_bytes()).ok())
        .filter_map(|method| MethodFilter::try_from(method).ok())
        .fold(MethodFilter::OPTIONS, MethodFilter::or)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn dispatch<H: Handler>(
    State(handler): State<Arc<H>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    if method == Method::OPTIONS {
        return ApiResponse::preflight(H::ALLOWED_METHODS);
    }

    let event = build_event(&method, &headers, peer.map(|ConnectInfo(addr)| addr), &body);
    handler.handle(event).await
}

/// Translate an HTTP request into the event shape the handlers consume.
pub fn build_event(
    method: &Method,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    body: &[u8],
) -> ApiEvent {
    let header_map: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let request_id = header_text(headers, "x-request-id")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Only the right-most entry was added by the proxy in front of us; anything
    // to its left is whatever the client chose to send.
    let source_ip = header_text(headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.rsplit(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()));

    let user_agent = header_text(headers, "user-agent").map(str::to_string);

    let (body, is_base64_encoded) = if body.is_empty() {
        (None, false)
    } else {
        match std::str::from_utf8(body) {
            Ok(text) => (Some(text.to_string()), false),
            Err(_) => (Some(STANDARD.encode(body)), true),
        }
    };

    ApiEvent {
        request_context: RequestContext {
            request_id,
            http: Some(HttpContext {
                method: method.as_str().to_string(),
                source_ip,
                user_agent,
            }),
        },
        headers: header_map,
        body,
        is_base64_encoded,
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Dropping invalid response header"),
            }
        }

        (status, headers, self.body).into_response()
    }
}
