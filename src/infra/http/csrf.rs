//! Double-submit cookie protection for unsafe methods.
//!
//! A rejected request never reaches its handler; it is handed to the recovery
//! dispatcher instead, which either re-runs the post operation or redirects home.

use std::convert::Infallible;

use axum::{
    body::{Body, to_bytes},
    extract::{FromRequestParts, State},
    http::{HeaderMap, Method, Request, StatusCode, header::ORIGIN, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;
use url::{Url, form_urlencoded};

use crate::{
    application::{
        auth::generate_token,
        context::RequestContext,
        csrf::{CsrfFailure, recover},
        error::ErrorReport,
        posts::Submission,
    },
    domain::posts::PostInput,
};

use super::{HttpSettings, HttpState, middleware::host_allowed, posts::render_outcome};

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";
pub const CSRF_HEADER: &str = "x-csrftoken";

const TOKEN_LEN: usize = 64;

/// The token the current response's forms must carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl CsrfToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsrfRejection {
    #[error("Origin checking failed - {0} does not match any trusted origins.")]
    BadOrigin(String),
    #[error("CSRF cookie not set.")]
    CookieNotSet,
    #[error("CSRF token missing.")]
    TokenMissing,
    #[error("CSRF token incorrect.")]
    TokenIncorrect,
}

pub async fn protect(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let existing = jar
        .get(CSRF_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| is_well_formed(value));

    if is_safe(request.method()) {
        let (token, issued) = match existing {
            Some(token) => (token, false),
            None => (generate_token(), true),
        };
        request.extensions_mut().insert(CsrfToken(token.clone()));
        let response = next.run(request).await;
        return if issued {
            (jar.add(token_cookie(token, &state.settings)), response).into_response()
        } else {
            response
        };
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.settings.request_body_limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = StatusCode::PAYLOAD_TOO_LARGE.into_response();
            ErrorReport::from_error(
                "infra::http::csrf::protect",
                StatusCode::PAYLOAD_TOO_LARGE,
                &err,
            )
            .attach(&mut response);
            return response;
        }
    };
    let form = FormFields::parse(&bytes);

    match check(
        &parts.headers,
        existing.as_deref(),
        &form,
        &state.settings.allowed_hosts,
    ) {
        Ok(token) => {
            let mut request = Request::from_parts(parts, Body::from(bytes));
            request.extensions_mut().insert(CsrfToken(token));
            next.run(request).await
        }
        Err(rejection) => reject(&state, jar, &parts, existing, form, rejection).await,
    }
}

async fn reject(
    state: &HttpState,
    jar: CookieJar,
    parts: &Parts,
    existing: Option<String>,
    form: FormFields,
    rejection: CsrfRejection,
) -> Response {
    let path = parts.uri.path().to_string();
    warn!(
        target: "quill::http::csrf",
        method = %parts.method,
        path = %path,
        reason = %rejection,
        "forbidden: CSRF verification failed"
    );

    let ctx = parts
        .extensions
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();
    let failure = CsrfFailure {
        path,
        submission: Submission::Submit(PostInput::new(form.title, form.content)),
        reason: rejection.to_string(),
    };
    let outcome = recover(failure, &ctx, state.store.as_ref()).await;

    let (token, issued) = match existing {
        Some(token) => (token, false),
        None => (generate_token(), true),
    };
    let response = render_outcome(outcome, &ctx, &CsrfToken(token.clone()));
    if issued {
        (jar.add(token_cookie(token, &state.settings)), response).into_response()
    } else {
        response
    }
}

/// Django's check order: origin, then cookie, then submitted token.
fn check(
    headers: &HeaderMap,
    cookie: Option<&str>,
    form: &FormFields,
    allowed_hosts: &[String],
) -> Result<String, CsrfRejection> {
    if let Some(origin) = headers.get(ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !origin_allowed(origin, allowed_hosts) {
            return Err(CsrfRejection::BadOrigin(origin.to_string()));
        }
    }

    let cookie = cookie.ok_or(CsrfRejection::CookieNotSet)?;

    let submitted = form
        .token
        .clone()
        .or_else(|| {
            headers
                .get(CSRF_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .filter(|value| !value.is_empty())
        .ok_or(CsrfRejection::TokenMissing)?;

    if tokens_match(cookie, &submitted) {
        Ok(cookie.to_string())
    } else {
        Err(CsrfRejection::TokenIncorrect)
    }
}

fn origin_allowed(origin: &str, allowed_hosts: &[String]) -> bool {
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .is_some_and(|host| host_allowed(host.trim_matches(['[', ']']), allowed_hosts))
}

pub(super) fn tokens_match(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn token_cookie(token: String, settings: &HttpSettings) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookies)
        .max_age(time::Duration::days(365))
        .build()
}

/// Fields the middleware reads from an url-encoded body.
#[derive(Debug, Default)]
struct FormFields {
    token: Option<String>,
    title: String,
    content: String,
}

impl FormFields {
    fn parse(bytes: &[u8]) -> Self {
        let mut fields = FormFields::default();
        for (key, value) in form_urlencoded::parse(bytes) {
            match key.as_ref() {
                CSRF_FIELD => fields.token = Some(value.into_owned()),
                "title" => fields.title = value.into_owned(),
                "content" => fields.content = value.into_owned(),
                _ => {}
            }
        }
        fields
    }
}
