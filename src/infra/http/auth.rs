use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, RawQuery, State},
    http::{Request, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{info, warn};

use crate::{
    application::{
        auth::AuthError,
        context::RequestContext,
        error::HttpError,
    },
    presentation::views::{
        LayoutContext, LoginTemplate, LoginView, render_template_response,
    },
};

use super::{
    CsrfToken, HttpState,
    posts::{chrome, last_value},
};

pub const SESSION_COOKIE: &str = "sessionid";

const INVALID_LOGIN_MESSAGE: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

/// Resolve the session cookie into a [`RequestContext`] for downstream handlers.
pub async fn authenticate(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = match jar.get(SESSION_COOKIE) {
        Some(cookie) => match state.auth.resolve(cookie.value()).await {
            Ok(Some(user)) => RequestContext::authenticated(user),
            Ok(None) => RequestContext::anonymous(),
            Err(err) => {
                warn!(
                    target: "quill::http::auth",
                    error = %err,
                    "session lookup failed; continuing anonymously"
                );
                RequestContext::anonymous()
            }
        },
        None => RequestContext::anonymous(),
    };

    request.extensions_mut().insert(ctx.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

pub(super) async fn login_form(
    ctx: RequestContext,
    token: CsrfToken,
    RawQuery(raw): RawQuery,
) -> Response {
    let next = raw.and_then(|raw| last_value(raw.as_bytes(), "next"));
    let view = LoginView {
        next: next.as_deref().and_then(safe_next).unwrap_or_default(),
        ..LoginView::default()
    };
    render_login(&ctx, &token, view)
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let username = last_value(&body, "username").unwrap_or_default();
    let password = last_value(&body, "password").unwrap_or_default();
    let next = last_value(&body, "next").as_deref().and_then(safe_next);

    match state.auth.login(&username, &password).await {
        Ok(session) => {
            info!(
                target: "quill::http::auth",
                user = %session.user.username,
                "user logged in"
            );
            let cookie = Cookie::build((SESSION_COOKIE, session.token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(state.settings.secure_cookies)
                .max_age(state.auth.session_ttl());
            let location = next.unwrap_or_else(|| state.settings.login_redirect_url.clone());
            (jar.add(cookie), Redirect::to(&location)).into_response()
        }
        Err(AuthError::InvalidCredentials) => {
            let view = LoginView {
                username,
                next: next.unwrap_or_default(),
                errors: vec![INVALID_LOGIN_MESSAGE.to_string()],
            };
            render_login(&ctx, &token, view)
        }
        Err(err) => HttpError::from_error(
            "infra::http::auth::login_submit",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Login failed",
            &err,
        )
        .into_response(),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && let Err(err) = state.auth.logout(cookie.value()).await
    {
        warn!(
            target: "quill::http::auth",
            error = %err,
            "failed to delete session on logout"
        );
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to(&state.settings.login_url)).into_response()
}

fn render_login(ctx: &RequestContext, token: &CsrfToken, view: LoginView) -> Response {
    let view = LayoutContext::new(chrome(ctx, token), "Log In", view);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

/// Accept only same-site paths as a post-login destination.
pub fn safe_next(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    let is_local = candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.contains('\\')
        && !candidate.chars().any(char::is_control);
    is_local.then(|| candidate.to_string())
}
