use axum::{
    extract::{Path, RawQuery, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use tracing::debug;
use url::form_urlencoded;
use uuid::Uuid;

use crate::{
    application::{
        context::RequestContext,
        posts::{
            self, DeleteStep, FormTarget, ListQuery, Outcome, PostError, PostForm, PostOperation,
            Submission,
        },
    },
    domain::posts::PostInput,
    presentation::views::{
        ErrorPageView, ErrorTemplate, HomeTemplate, HomeView, LayoutChrome, LayoutContext,
        PostCreateTemplate, PostDeleteTemplate, PostDeleteView, PostDetailTemplate,
        PostDetailView, PostFormView, PostUpdateTemplate, render_not_found_response,
        render_template_response,
    },
};

use super::{CsrfToken, HttpState, repo_error_to_http};

const SOURCE: &str = "infra::http::posts";

/// Value of `key` in an url-encoded string. A repeated key yields its last value.
pub(super) fn last_value(encoded: &[u8], key: &str) -> Option<String> {
    form_urlencoded::parse(encoded)
        .filter(|(name, _)| name == key)
        .last()
        .map(|(_, value)| value.into_owned())
}

fn post_input(body: &[u8]) -> PostInput {
    PostInput::new(
        last_value(body, "title").unwrap_or_default(),
        last_value(body, "content").unwrap_or_default(),
    )
}

pub(super) async fn home(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    uri: Uri,
    RawQuery(raw): RawQuery,
) -> Response {
    let raw = raw.unwrap_or_default();
    let query = ListQuery {
        search: last_value(raw.as_bytes(), "search").unwrap_or_default(),
        page: last_value(raw.as_bytes(), "page"),
    };
    dispatch(&state, &ctx, &token, &uri, PostOperation::List(query)).await
}

pub(super) async fn detail(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    uri: Uri,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome(&ctx, &token));
    };
    dispatch(&state, &ctx, &token, &uri, PostOperation::Detail(id)).await
}

pub(super) async fn create_form(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    uri: Uri,
) -> Response {
    let operation = PostOperation::Create(Submission::Show);
    dispatch(&state, &ctx, &token, &uri, operation).await
}

pub(super) async fn create_submit(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    uri: Uri,
    body: Bytes,
) -> Response {
    let operation = PostOperation::Create(Submission::Submit(post_input(&body)));
    dispatch(&state, &ctx, &token, &uri, operation).await
}

pub(super) async fn update_form(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    uri: Uri,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome(&ctx, &token));
    };
    let operation = PostOperation::Update {
        id,
        submission: Submission::Show,
    };
    dispatch(&state, &ctx, &token, &uri, operation).await
}

pub(super) async fn update_submit(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    uri: Uri,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome(&ctx, &token));
    };
    let operation = PostOperation::Update {
        id,
        submission: Submission::Submit(post_input(&body)),
    };
    dispatch(&state, &ctx, &token, &uri, operation).await
}

pub(super) async fn delete_confirm(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    uri: Uri,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome(&ctx, &token));
    };
    let operation = PostOperation::Delete {
        id,
        step: DeleteStep::Confirm,
    };
    dispatch(&state, &ctx, &token, &uri, operation).await
}

pub(super) async fn delete_submit(
    State(state): State<HttpState>,
    ctx: RequestContext,
    token: CsrfToken,
    uri: Uri,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome(&ctx, &token));
    };
    let operation = PostOperation::Delete {
        id,
        step: DeleteStep::Confirmed,
    };
    dispatch(&state, &ctx, &token, &uri, operation).await
}

/// Unparseable ids are indistinguishable from unknown ones.
fn parse_post_id(raw_id: &str) -> Option<Uuid> {
    Uuid::parse_str(raw_id).ok()
}

async fn dispatch(
    state: &HttpState,
    ctx: &RequestContext,
    token: &CsrfToken,
    uri: &Uri,
    operation: PostOperation,
) -> Response {
    let name = operation.name();
    match posts::execute(operation, ctx, state.store.as_ref()).await {
        Ok(outcome) => render_outcome(outcome, ctx, token),
        Err(err) => {
            debug!(
                target: "quill::http::posts",
                operation = name,
                error = %err,
                "operation failed"
            );
            error_response(err, state, ctx, token, uri)
        }
    }
}

pub(super) fn chrome(ctx: &RequestContext, token: &CsrfToken) -> LayoutChrome {
    LayoutChrome::new(ctx.username().map(str::to_string), token.as_str())
}

pub(super) fn render_outcome(
    outcome: Outcome,
    ctx: &RequestContext,
    token: &CsrfToken,
) -> Response {
    let chrome = chrome(ctx, token);
    match outcome {
        Outcome::Listing { page, search } => {
            let view = LayoutContext::new(chrome, "Home", HomeView::new(page, search));
            render_template_response(HomeTemplate { view }, StatusCode::OK)
        }
        Outcome::Post(record) => {
            let title = record.title.clone();
            let content = PostDetailView::new(record, ctx.username());
            let view = LayoutContext::new(chrome, title, content);
            render_template_response(PostDetailTemplate { view }, StatusCode::OK)
        }
        Outcome::Form(form) => render_form(form, chrome),
        Outcome::ConfirmDelete(record) => {
            let view = LayoutContext::new(chrome, "Delete Post", PostDeleteView::from(record));
            render_template_response(PostDeleteTemplate { view }, StatusCode::OK)
        }
        Outcome::Redirect(location) => Redirect::to(&location).into_response(),
    }
}

fn render_form(form: PostForm, chrome: LayoutChrome) -> Response {
    match form.target {
        FormTarget::Create => {
            let view = LayoutContext::new(chrome, "New Post", PostFormView::from(form));
            render_template_response(PostCreateTemplate { view }, StatusCode::OK)
        }
        FormTarget::Update(_) => {
            let view = LayoutContext::new(chrome, "Update Post", PostFormView::from(form));
            render_template_response(PostUpdateTemplate { view }, StatusCode::OK)
        }
    }
}

fn error_response(
    err: PostError,
    state: &HttpState,
    ctx: &RequestContext,
    token: &CsrfToken,
    uri: &Uri,
) -> Response {
    match err {
        PostError::Unauthorized(_) => {
            let next = uri
                .path_and_query()
                .map(|value| value.as_str())
                .unwrap_or("/");
            Redirect::to(&login_redirect(&state.settings.login_url, next)).into_response()
        }
        PostError::NotFound | PostError::InvalidPage(_) => {
            render_not_found_response(chrome(ctx, token))
        }
        PostError::Validation(form) => render_form(form, chrome(ctx, token)),
        PostError::Store(err) => {
            let http = repo_error_to_http(SOURCE, err);
            let status = http.status();
            let view = LayoutContext::new(
                chrome(ctx, token),
                "Server Error",
                ErrorPageView::server_error(),
            );
            let mut response = render_template_response(ErrorTemplate { view }, status);
            http.into_report().attach(&mut response);
            response
        }
    }
}

/// `{login_url}?next={path}`, appending to any query the login url already has.
pub(super) fn login_redirect(login_url: &str, next: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!("{login_url}{separator}{query}")
}
