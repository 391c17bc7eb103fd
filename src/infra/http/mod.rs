//! HTTP surface: router, shared state and error mapping.

mod auth;
mod csrf;
mod middleware;
mod posts;

use std::{path::PathBuf, sync::Arc};

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    application::{
        auth::AuthService,
        context::RequestContext,
        error::{ErrorReport, HttpError},
        repos::{HealthCheck, PostStore, RepoError},
    },
    config::Settings,
    infra::assets,
    presentation::views::render_not_found_response,
};

pub use auth::{SESSION_COOKIE, safe_next};
pub use csrf::{CSRF_COOKIE, CSRF_FIELD, CSRF_HEADER, CsrfRejection, CsrfToken};
pub use middleware::{RequestId, host_allowed};

/// Request-facing subset of [`Settings`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub allowed_hosts: Vec<String>,
    pub login_url: String,
    pub login_redirect_url: String,
    pub secure_cookies: bool,
    pub request_body_limit: usize,
    pub static_root: PathBuf,
    pub media_root: PathBuf,
}

impl HttpSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            allowed_hosts: settings.server.allowed_hosts.clone(),
            login_url: settings.auth.login_url.clone(),
            login_redirect_url: settings.auth.login_redirect_url.clone(),
            secure_cookies: settings.auth.secure_cookies,
            request_body_limit: settings.server.request_body_limit.get(),
            static_root: settings.assets.static_root.clone(),
            media_root: settings.assets.media_root.clone(),
        }
    }
}

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn PostStore>,
    pub auth: Arc<AuthService>,
    pub health: Arc<dyn HealthCheck>,
    pub settings: Arc<HttpSettings>,
}

pub fn build_router(state: HttpState) -> Router {
    let body_limit = state.settings.request_body_limit;

    Router::new()
        .route("/", get(posts::home))
        .route("/post/new", get(posts::create_form).post(posts::create_submit))
        .route("/post/{id}", get(posts::detail))
        .route(
            "/post/{id}/update",
            get(posts::update_form).post(posts::update_submit),
        )
        .route(
            "/post/{id}/delete",
            get(posts::delete_confirm).post(posts::delete_submit),
        )
        .route("/login", get(auth::login_form).post(auth::login_submit))
        .route("/logout", post(auth::logout))
        .route("/_health/db", get(db_health))
        .route("/static/{*path}", get(assets::serve_static))
        .route("/media/{*path}", get(assets::serve_media))
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), csrf::protect))
        .layer(from_fn_with_state(state.clone(), auth::authenticate))
        .layer(from_fn_with_state(state.clone(), middleware::allowed_hosts))
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn db_health(State(state): State<HttpState>) -> Response {
    match state.health.health_check().await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn not_found(ctx: RequestContext, token: CsrfToken) -> Response {
    render_not_found_response(posts::chrome(&ctx, &token))
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::Duplicate { constraint } => {
            HttpError::new(source, StatusCode::CONFLICT, "Duplicate record", constraint)
        }
        RepoError::NotFound => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "resource not found",
        ),
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Integrity { message } => HttpError::new(
            source,
            StatusCode::CONFLICT,
            "Integrity constraint violated",
            message,
        ),
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}
