//! Static and media file serving from configured directories.

use std::{
    io::ErrorKind,
    path::{Component, Path as FsPath, PathBuf},
};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use mime_guess::Mime;
use tracing::error;

use crate::application::error::ErrorReport;

use super::http::HttpState;

pub async fn serve_static(State(state): State<HttpState>, path: Option<Path<String>>) -> Response {
    let captured = path.map(|Path(value)| value).unwrap_or_default();
    serve_file(
        &state.settings.static_root,
        &captured,
        "infra::assets::serve_static",
    )
    .await
}

pub async fn serve_media(State(state): State<HttpState>, path: Option<Path<String>>) -> Response {
    let captured = path.map(|Path(value)| value).unwrap_or_default();
    serve_file(
        &state.settings.media_root,
        &captured,
        "infra::assets::serve_media",
    )
    .await
}

async fn serve_file(root: &FsPath, requested: &str, source: &'static str) -> Response {
    let Some(relative) = sanitize(requested) else {
        return not_found_response(source);
    };

    let full_path = root.join(&relative);
    match tokio::fs::read(&full_path).await {
        Ok(bytes) => build_response(
            Bytes::from(bytes),
            mime_guess::from_path(&relative).first_or_octet_stream(),
        ),
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
            not_found_response(source)
        }
        Err(err) => {
            error!(
                target: "quill::assets",
                path = %full_path.display(),
                error = %err,
                "failed to read asset"
            );
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_error(source, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
    }
}

/// Relative path made only of normal components; anything else is refused.
fn sanitize(requested: &str) -> Option<PathBuf> {
    let trimmed = requested.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in FsPath::new(trimmed).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return None,
        }
    }
    Some(relative)
}

fn not_found_response(source: &'static str) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(source, StatusCode::NOT_FOUND, "Asset not found")
        .attach(&mut response);
    response
}

fn build_response(bytes: Bytes, mime: Mime) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );

    response
}
