use thiserror::Error;
use uuid::Uuid;

use crate::application::context::Unauthorized;
use crate::application::pagination::{Paginated, PaginationError};
use crate::application::repos::RepoError;
use crate::domain::entities::PostRecord;
use crate::domain::posts::{FieldErrors, PostInput};

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),
    #[error("post not found")]
    NotFound,
    #[error(transparent)]
    InvalidPage(#[from] PaginationError),
    #[error("submitted post failed validation")]
    Validation(PostForm),
    #[error(transparent)]
    Store(RepoError),
}

impl From<RepoError> for PostError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => PostError::NotFound,
            other => PostError::Store(other),
        }
    }
}

/// Query parameters accepted by the list operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: String,
    pub page: Option<String>,
}

impl ListQuery {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: term.into(),
            page: None,
        }
    }
}

/// Whether a form-backed request only shows the form or submits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Show,
    Submit(PostInput),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStep {
    Confirm,
    Confirmed,
}

/// Where a post form submits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormTarget {
    Create,
    Update(Uuid),
}

/// A post form ready to render: current values plus any field errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostForm {
    pub target: FormTarget,
    pub input: PostInput,
    pub errors: FieldErrors,
}

impl PostForm {
    pub fn blank(target: FormTarget) -> Self {
        Self::filled(target, PostInput::default())
    }

    pub fn filled(target: FormTarget, input: PostInput) -> Self {
        Self {
            target,
            input,
            errors: FieldErrors::default(),
        }
    }

    pub fn with_errors(target: FormTarget, input: PostInput, errors: FieldErrors) -> Self {
        Self {
            target,
            input,
            errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Successful result of a post operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Listing {
        page: Paginated<PostRecord>,
        search: String,
    },
    Post(PostRecord),
    Form(PostForm),
    ConfirmDelete(PostRecord),
    Redirect(String),
}

impl Outcome {
    pub fn redirect_root() -> Self {
        Outcome::Redirect("/".to_string())
    }

    pub fn redirect_to_post(id: Uuid) -> Self {
        Outcome::Redirect(format!("/post/{id}"))
    }

    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            Outcome::Redirect(location) => Some(location),
            _ => None,
        }
    }
}
