//! Password login and cookie sessions feeding [`RequestContext`].
//!
//! [`RequestContext`]: crate::application::context::RequestContext

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error};
use uuid::Uuid;

use crate::application::context::CurrentUser;
use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::users::{validate_password, validate_username};

const MIN_TOKEN_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A freshly created session. `token` goes into the cookie and is never stored.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user: CurrentUser,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<UserRecord, AuthError> {
        let username = username.trim();
        validate_username(username)?;
        validate_password(password)?;

        if self.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }

        let password_hash = hash_password(password)?;
        self.users
            .create_user(CreateUserParams {
                username: username.to_string(),
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AuthError::UsernameTaken(username.to_string()),
                other => AuthError::Repo(other),
            })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let user = self
            .users
            .find_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let now = OffsetDateTime::now_utc();
        let purged = self.sessions.delete_expired_sessions(now).await?;
        if purged > 0 {
            debug!(target: "quill::auth", purged, "removed expired sessions");
        }

        let token = generate_token();
        let session = self
            .sessions
            .create_session(CreateSessionParams {
                token_hash: hash_token(&token),
                user_id: user.id,
                expires_at: now + self.session_ttl,
            })
            .await?;

        Ok(IssuedSession {
            token,
            user: CurrentUser {
                id: user.id,
                username: user.username,
            },
            expires_at: session.expires_at,
        })
    }

    /// Resolve a session cookie. Unknown, malformed and expired tokens yield `None`.
    pub async fn resolve(&self, token: &str) -> Result<Option<CurrentUser>, AuthError> {
        if token.len() < MIN_TOKEN_LEN {
            return Ok(None);
        }

        let hashed = hash_token(token);
        let Some(session) = self.sessions.find_session(&hashed).await? else {
            return Ok(None);
        };

        if session.token_hash.as_slice().ct_eq(hashed.as_slice()).unwrap_u8() == 0 {
            return Ok(None);
        }
        if session.expires_at <= OffsetDateTime::now_utc() {
            return Ok(None);
        }

        Ok(Some(CurrentUser {
            id: session.user_id,
            username: session.username,
        }))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.delete_session(&hash_token(token)).await?;
        Ok(())
    }
}

pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            error!(target: "quill::auth", error = %err, "argon2 hash_password error");
            AuthError::Hashing(err.to_string())
        })
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|err| {
        error!(target: "quill::auth", error = %err, "argon2 parse hash error");
        AuthError::Hashing(err.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// 64 random hex characters.
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
