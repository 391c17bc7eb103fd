#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, header},
};
use http_body_util::BodyExt;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use quill::application::auth::{AuthService, generate_token, hash_token};
use quill::application::context::{CurrentUser, RequestContext};
use quill::application::pagination::PageRequest;
use quill::application::repos::{
    CreatePostParams, CreateSessionParams, CreateUserParams, HealthCheck, PostQueryFilter,
    PostsRepo, PostsWriteRepo, RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
};
use quill::domain::entities::{PostRecord, SessionRecord, UserRecord};
use quill::domain::users::UserId;
use quill::infra::http::{CSRF_COOKIE, HttpSettings, HttpState, SESSION_COOKIE, build_router};

pub const HOST: &str = "localhost";

/// In-memory stand-in for every repository the application talks to.
#[derive(Default)]
pub struct MemoryStore {
    posts: Mutex<Vec<PostRecord>>,
    users: Mutex<Vec<UserRecord>>,
    sessions: Mutex<Vec<SessionRecord>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every post query fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of post repository calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn add_user(&self, username: &str) -> CurrentUser {
        let record = UserRecord {
            id: UserId::generate(),
            username: username.to_string(),
            password_hash: String::new(),
            date_joined: OffsetDateTime::now_utc(),
        };
        let user = CurrentUser {
            id: record.id,
            username: record.username.clone(),
        };
        self.users.lock().await.push(record);
        user
    }

    /// Open a session for `user` and return the cookie token.
    pub async fn open_session(&self, user: &CurrentUser) -> String {
        self.open_session_until(user, OffsetDateTime::now_utc() + Duration::hours(1))
            .await
    }

    pub async fn open_session_until(
        &self,
        user: &CurrentUser,
        expires_at: OffsetDateTime,
    ) -> String {
        let token = generate_token();
        self.sessions.lock().await.push(SessionRecord {
            id: Uuid::new_v4(),
            token_hash: hash_token(&token),
            user_id: user.id,
            username: user.username.clone(),
            expires_at,
        });
        token
    }

    pub async fn seed_post(
        &self,
        author: &CurrentUser,
        title: &str,
        content: &str,
        date_posted: OffsetDateTime,
    ) -> PostRecord {
        let record = PostRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: content.to_string(),
            author_id: author.id,
            author_username: author.username.clone(),
            date_posted,
        };
        self.posts.lock().await.push(record.clone());
        record
    }

    pub async fn posts(&self) -> Vec<PostRecord> {
        self.posts.lock().await.clone()
    }

    pub async fn post(&self, id: Uuid) -> Option<PostRecord> {
        self.posts.lock().await.iter().find(|post| post.id == id).cloned()
    }

    fn enter(&self) -> Result<(), RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(())
    }

    async fn username_of(&self, id: UserId) -> Result<String, RepoError> {
        self.users
            .lock()
            .await
            .iter()
            .find(|user| user.id == id)
            .map(|user| user.username.clone())
            .ok_or_else(|| RepoError::Integrity {
                message: format!("unknown author {id}"),
            })
    }

    async fn filtered(&self, filter: &PostQueryFilter) -> Vec<PostRecord> {
        let mut posts: Vec<PostRecord> = self
            .posts
            .lock()
            .await
            .iter()
            .filter(|post| filter.matches(&post.content))
            .cloned()
            .collect();
        posts.sort_by(|a, b| {
            b.date_posted
                .cmp(&a.date_posted)
                .then_with(|| b.id.cmp(&a.id))
        });
        posts
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        self.enter()?;
        Ok(self
            .filtered(filter)
            .await
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn count_posts(&self, filter: &PostQueryFilter) -> Result<u64, RepoError> {
        self.enter()?;
        Ok(self.filtered(filter).await.len() as u64)
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        self.enter()?;
        Ok(self.post(id).await)
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.enter()?;
        let record = PostRecord {
            id: Uuid::new_v4(),
            title: params.title,
            content: params.content,
            author_username: self.username_of(params.author_id).await?,
            author_id: params.author_id,
            date_posted: params.date_posted,
        };
        self.posts.lock().await.push(record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        self.enter()?;
        let author_username = self.username_of(params.author_id).await?;
        let mut posts = self.posts.lock().await;
        let post = posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.title = params.title;
        post.content = params.content;
        post.author_id = params.author_id;
        post.author_username = author_username;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        self.enter()?;
        let mut posts = self.posts.lock().await;
        let before = posts.len();
        posts.retain(|post| post.id != id);
        if posts.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().await;
        if users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let record = UserRecord {
            id: UserId::generate(),
            username: params.username,
            password_hash: params.password_hash,
            date_joined: OffsetDateTime::now_utc(),
        };
        users.push(record.clone());
        Ok(record)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let username = self.username_of(params.user_id).await?;
        let record = SessionRecord {
            id: Uuid::new_v4(),
            token_hash: params.token_hash,
            user_id: params.user_id,
            username,
            expires_at: params.expires_at,
        };
        self.sessions.lock().await.push(record.clone());
        Ok(record)
    }

    async fn find_session(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self
            .sessions
            .lock()
            .await
            .iter()
            .find(|session| session.token_hash == token_hash)
            .cloned())
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), RepoError> {
        self.sessions
            .lock()
            .await
            .retain(|session| session.token_hash != token_hash);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|session| session.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(())
    }
}

pub fn authenticated(user: &CurrentUser) -> RequestContext {
    RequestContext::authenticated(user.clone())
}

pub fn http_settings() -> HttpSettings {
    HttpSettings {
        allowed_hosts: vec![
            "localhost".to_string(),
            "127.0.0.1".to_string(),
            "0.0.0.0".to_string(),
        ],
        login_url: "/login".to_string(),
        login_redirect_url: "/".to_string(),
        secure_cookies: false,
        request_body_limit: 1024 * 1024,
        static_root: std::env::temp_dir().join("quill-static-missing"),
        media_root: std::env::temp_dir().join("quill-media-missing"),
    }
}

pub fn auth_service(store: &Arc<MemoryStore>) -> Arc<AuthService> {
    Arc::new(AuthService::new(
        store.clone(),
        store.clone(),
        Duration::hours(1),
    ))
}

pub fn app_with_settings(store: &Arc<MemoryStore>, settings: HttpSettings) -> Router {
    build_router(HttpState {
        store: store.clone(),
        auth: auth_service(store),
        health: store.clone(),
        settings: Arc::new(settings),
    })
}

pub fn app(store: &Arc<MemoryStore>) -> Router {
    app_with_settings(store, http_settings())
}

/// Builder for requests carrying a host and optional session/CSRF cookies.
pub struct TestRequest {
    method: Method,
    uri: String,
    session: Option<String>,
    csrf_cookie: Option<String>,
    form: Vec<(String, String)>,
}

impl TestRequest {
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            session: None,
            csrf_cookie: None,
            form: Vec::new(),
        }
    }

    pub fn session(mut self, token: &str) -> Self {
        self.session = Some(token.to_string());
        self
    }

    pub fn csrf_cookie(mut self, token: &str) -> Self {
        self.csrf_cookie = Some(token.to_string());
        self
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.form.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the CSRF cookie and echo it in the form, as a browser would.
    pub fn with_csrf(self) -> Self {
        let token = generate_token();
        self.csrf_cookie(&token).field("csrfmiddlewaretoken", &token)
    }

    pub fn build(self) -> Request<Body> {
        let mut cookies = Vec::new();
        if let Some(token) = self.session {
            cookies.push(format!("{SESSION_COOKIE}={token}"));
        }
        if let Some(token) = self.csrf_cookie {
            cookies.push(format!("{CSRF_COOKIE}={token}"));
        }

        let mut builder = Request::builder()
            .method(self.method)
            .uri(self.uri)
            .header(header::HOST, HOST);
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies.join("; "));
        }

        if self.form.is_empty() {
            return builder.body(Body::empty()).expect("request should build");
        }

        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.form.iter())
            .finish();
        builder
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request should build")
    }
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.expect("collect body").to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

pub fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}
