use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Paginated;
use crate::application::posts::{FormTarget, PostForm};
use crate::domain::entities::PostRecord;
use crate::domain::posts::HUMAN_DATE_FORMAT;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::OffsetDateTime;
use url::form_urlencoded;
use uuid::Uuid;

/// Pages linked on either side of the current one in the list pager.
const PAGE_WINDOW: u32 = 3;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    render_error_response(
        chrome,
        ErrorPageView::not_found(),
        StatusCode::NOT_FOUND,
        "presentation::views::render_not_found_response",
        "Resource not found",
    )
}

/// Render the error page and attach `detail` for the response logger.
pub fn render_error_response(
    chrome: LayoutChrome,
    content: ErrorPageView,
    status: StatusCode,
    source: &'static str,
    detail: impl Into<String>,
) -> Response {
    let view = LayoutContext::new(chrome, content.title.clone(), content);
    let mut response = render_template_response(ErrorTemplate { view }, status);
    ErrorReport::from_message(source, status, detail).attach(&mut response);
    response
}

/// Per-request values every page needs: who is signed in and the form token.
#[derive(Debug, Clone, Default)]
pub struct LayoutChrome {
    pub username: Option<String>,
    pub csrf_token: String,
}

impl LayoutChrome {
    pub fn new(username: Option<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            username,
            csrf_token: csrf_token.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutContext<T> {
    pub title: String,
    pub username: Option<String>,
    pub csrf_token: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, title: impl Into<String>, content: T) -> Self {
        Self {
            title: title.into(),
            username: chrome.username,
            csrf_token: chrome.csrf_token,
            content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostCardView {
    pub title: String,
    pub content: String,
    pub author: String,
    pub date_posted: String,
    pub iso_date: String,
    pub href: String,
}

impl From<PostRecord> for PostCardView {
    fn from(record: PostRecord) -> Self {
        Self {
            href: post_href(record.id),
            date_posted: human_date(record.date_posted),
            iso_date: iso_date(record.date_posted),
            title: record.title,
            content: record.content,
            author: record.author_username,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLinkView {
    pub number: u32,
    pub href: String,
    pub is_current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationView {
    pub is_paginated: bool,
    pub number: u32,
    pub num_pages: u32,
    pub first_href: Option<String>,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
    pub last_href: Option<String>,
    pub pages: Vec<PageLinkView>,
}

impl PaginationView {
    pub fn build<T>(page: &Paginated<T>, search: &str) -> Self {
        let number = page.number;
        let num_pages = page.num_pages();

        let pages = (1..=num_pages)
            .filter(|candidate| candidate.abs_diff(number) <= PAGE_WINDOW)
            .map(|candidate| PageLinkView {
                number: candidate,
                href: list_href(candidate, search),
                is_current: candidate == number,
            })
            .collect();

        Self {
            is_paginated: page.is_paginated(),
            number,
            num_pages,
            first_href: page.has_previous().then(|| list_href(1, search)),
            previous_href: page
                .has_previous()
                .then(|| list_href(number - 1, search)),
            next_href: page.has_next().then(|| list_href(number + 1, search)),
            last_href: page.has_next().then(|| list_href(num_pages, search)),
            pages,
        }
    }
}

/// `/?page=N`, carrying the active search along.
pub fn list_href(number: u32, search: &str) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("page", &number.to_string());
    if !search.is_empty() {
        query.append_pair("search", search);
    }
    format!("/?{}", query.finish())
}

pub struct HomeView {
    pub posts: Vec<PostCardView>,
    pub search: String,
    pub has_results: bool,
    pub pagination: PaginationView,
}

impl HomeView {
    pub fn new(page: Paginated<PostRecord>, search: String) -> Self {
        let pagination = PaginationView::build(&page, &search);
        let posts: Vec<PostCardView> = page.items.into_iter().map(PostCardView::from).collect();
        Self {
            has_results: !posts.is_empty(),
            posts,
            search,
            pagination,
        }
    }
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub view: LayoutContext<HomeView>,
}

pub struct PostDetailView {
    pub title: String,
    pub content: String,
    pub author: String,
    pub date_posted: String,
    pub iso_date: String,
    pub is_author: bool,
    pub update_href: String,
    pub delete_href: String,
}

impl PostDetailView {
    pub fn new(record: PostRecord, viewer: Option<&str>) -> Self {
        Self {
            is_author: viewer == Some(record.author_username.as_str()),
            update_href: format!("/post/{}/update", record.id),
            delete_href: format!("/post/{}/delete", record.id),
            date_posted: human_date(record.date_posted),
            iso_date: iso_date(record.date_posted),
            title: record.title,
            content: record.content,
            author: record.author_username,
        }
    }
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailView>,
}

pub struct PostFormView {
    pub action: String,
    pub cancel_href: String,
    pub title: String,
    pub content: String,
    pub title_errors: Vec<String>,
    pub content_errors: Vec<String>,
}

impl From<PostForm> for PostFormView {
    fn from(form: PostForm) -> Self {
        let (action, cancel_href) = match form.target {
            FormTarget::Create => ("/post/new".to_string(), "/".to_string()),
            FormTarget::Update(id) => (format!("/post/{id}/update"), post_href(id)),
        };
        Self {
            action,
            cancel_href,
            title_errors: form.errors.get("title").to_vec(),
            content_errors: form.errors.get("content").to_vec(),
            title: form.input.title,
            content: form.input.content,
        }
    }
}

#[derive(Template)]
#[template(path = "post_create.html")]
pub struct PostCreateTemplate {
    pub view: LayoutContext<PostFormView>,
}

#[derive(Template)]
#[template(path = "post_update.html")]
pub struct PostUpdateTemplate {
    pub view: LayoutContext<PostFormView>,
}

pub struct PostDeleteView {
    pub title: String,
    pub action: String,
    pub cancel_href: String,
}

impl From<PostRecord> for PostDeleteView {
    fn from(record: PostRecord) -> Self {
        Self {
            action: format!("/post/{}/delete", record.id),
            cancel_href: post_href(record.id),
            title: record.title,
        }
    }
}

#[derive(Template)]
#[template(path = "post_delete.html")]
pub struct PostDeleteTemplate {
    pub view: LayoutContext<PostDeleteView>,
}

#[derive(Default)]
pub struct LoginView {
    pub username: String,
    pub next: String,
    pub errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginView>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }

    pub fn bad_request() -> Self {
        Self {
            title: "Bad Request".to_string(),
            message: "The request could not be understood by the server.".to_string(),
        }
    }

    pub fn server_error() -> Self {
        Self {
            title: "Server Error".to_string(),
            message: "Something went wrong on our side. Please try again shortly.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub fn post_href(id: Uuid) -> String {
    format!("/post/{id}")
}

fn human_date(value: OffsetDateTime) -> String {
    value.format(HUMAN_DATE_FORMAT).unwrap_or_default()
}

fn iso_date(value: OffsetDateTime) -> String {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
