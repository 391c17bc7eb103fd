//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageRequest;
use crate::domain::entities::{PostRecord, SessionRecord, UserRecord};
use crate::domain::users::UserId;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// How a text filter compares against stored content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMatch {
    CaseSensitive,
    #[default]
    CaseInsensitive,
}

#[derive(Debug, Clone, Default)]
pub struct PostQueryFilter {
    /// Substring the post content must contain. `None` or empty matches everything.
    pub search: Option<String>,
    pub matching: TextMatch,
}

impl PostQueryFilter {
    pub fn content_contains(search: impl Into<String>, matching: TextMatch) -> Self {
        Self {
            search: Some(search.into()),
            matching,
        }
    }

    /// The effective search term, if any.
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref().filter(|term| !term.is_empty())
    }

    /// In-process evaluation of the filter, shared by non-SQL adapters.
    pub fn matches(&self, content: &str) -> bool {
        match (self.term(), self.matching) {
            (None, _) => true,
            (Some(term), TextMatch::CaseSensitive) => content.contains(term),
            (Some(term), TextMatch::CaseInsensitive) => {
                content.to_lowercase().contains(&term.to_lowercase())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    pub date_posted: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub token_hash: Vec<u8>,
    pub user_id: UserId,
    pub expires_at: OffsetDateTime,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Posts matching `filter`, newest `date_posted` first.
    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn count_posts(&self, filter: &PostQueryFilter) -> Result<u64, RepoError>;

    async fn find_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    /// Fails with [`RepoError::NotFound`] when the post does not exist.
    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    /// Fails with [`RepoError::NotFound`] when the post does not exist.
    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError>;
}

/// Read and write access to posts through a single handle.
pub trait PostStore: PostsRepo + PostsWriteRepo {}

impl<T> PostStore for T where T: PostsRepo + PostsWriteRepo {}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn create_session(&self, params: CreateSessionParams)
    -> Result<SessionRecord, RepoError>;

    async fn find_session(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>, RepoError>;

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), RepoError>;

    /// Returns the number of sessions removed.
    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;
}
