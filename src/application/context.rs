//! Per-request identity passed explicitly into every operation.

use thiserror::Error;

use crate::domain::users::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user: Option<CurrentUser>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn authenticated(user: CurrentUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.username.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("authentication required")]
pub struct Unauthorized;

/// Shared guard run before any operation touches the store.
pub fn require_user(ctx: &RequestContext) -> Result<&CurrentUser, Unauthorized> {
    ctx.user.as_ref().ok_or(Unauthorized)
}
