use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header::HOST},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    application::{context::RequestContext, error::ErrorReport},
    presentation::views::{ErrorPageView, LayoutChrome, render_error_response},
};

use super::HttpState;

#[derive(Clone)]
pub struct RequestId(pub String);

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4().to_string());
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(request_id);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());
        let username = response
            .extensions()
            .get::<RequestContext>()
            .and_then(|ctx| ctx.username().map(str::to_string))
            .unwrap_or_default();

        if status.is_server_error() {
            error!(
                target: "quill::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user = username,
                "request failed",
            );
        } else {
            warn!(
                target: "quill::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user = username,
                "client request error",
            );
        }
    }

    response
}

/// Reject requests whose `Host` is not configured.
pub async fn allowed_hosts(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|authority| authority.to_string()))
        .unwrap_or_default();

    if host_allowed(strip_port(&host), &state.settings.allowed_hosts) {
        return next.run(request).await;
    }

    render_error_response(
        LayoutChrome::default(),
        ErrorPageView::bad_request(),
        StatusCode::BAD_REQUEST,
        "infra::http::middleware::allowed_hosts",
        format!("Invalid HTTP_HOST header: '{host}'."),
    )
}

/// `*` allows anything; a leading dot allows the domain and its subdomains.
pub fn host_allowed(host: &str, allowed: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }

    allowed.iter().any(|pattern| {
        if pattern == "*" {
            return true;
        }
        match pattern.strip_prefix('.') {
            Some(domain) => host == domain || host.ends_with(pattern.as_str()),
            None => host == *pattern,
        }
    })
}

pub(super) fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map(|(ip, _)| ip).unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|ch| ch.is_ascii_digit()) => name,
        _ => host,
    }
}
