mod support;

use axum::http::{StatusCode, header};
use insta::assert_snapshot;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

use quill::infra::http::HttpSettings;

use support::{
    MemoryStore, TestRequest, app, app_with_settings, auth_service, body_to_string,
    http_settings, location, set_cookies,
};

#[tokio::test]
async fn anonymous_home_redirects_to_login() {
    let store = MemoryStore::new();

    let response = app(&store)
        .oneshot(TestRequest::get("/?search=rust").build())
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_snapshot!(location(&response), @"/login?next=%2F%3Fsearch%3Drust");
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn safe_requests_receive_a_csrf_cookie() {
    let store = MemoryStore::new();

    let response = app(&store)
        .oneshot(TestRequest::get("/login").build())
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(
        cookies.iter().any(|cookie| cookie.starts_with("csrftoken=")),
        "{cookies:?}"
    );
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("name=\"csrfmiddlewaretoken\""));
}

#[tokio::test]
async fn create_then_search_finds_the_post() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    let router = app(&store);

    let response = router
        .clone()
        .oneshot(
            TestRequest::post("/post/new")
                .session(&session)
                .with_csrf()
                .field("title", "Hello")
                .field("content", "World")
                .build(),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let stored = store.posts().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].author_id, alice.id);

    let response = router
        .oneshot(TestRequest::get("/?search=WORLD").session(&session).build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("Hello"));
    assert!(body.contains(&format!("/post/{}", stored[0].id)));
}

#[tokio::test]
async fn invalid_submission_re_renders_the_form() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;

    let response = app(&store)
        .oneshot(
            TestRequest::post("/post/new")
                .session(&session)
                .with_csrf()
                .field("title", "")
                .field("content", "Kept content")
                .build(),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("This field is required."));
    assert!(body.contains("Kept content"));
    assert!(store.posts().await.is_empty());
}

#[tokio::test]
async fn null_characters_are_a_validation_error() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;

    let response = app(&store)
        .oneshot(
            TestRequest::post("/post/new")
                .session(&session)
                .with_csrf()
                .field("title", "Hel\0lo")
                .field("content", "Wor\0ld")
                .build(),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("Null characters are not allowed."));
    assert!(store.posts().await.is_empty());
}

#[tokio::test]
async fn repeated_query_parameters_use_the_last_value() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    let base = OffsetDateTime::now_utc();
    for index in 0..21 {
        store
            .seed_post(
                &alice,
                &format!("Entry {index}"),
                "rust notes",
                base - Duration::minutes(index),
            )
            .await;
    }
    let router = app(&store);

    let response = router
        .clone()
        .oneshot(TestRequest::get("/?page=1&page=2").session(&session).build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("Entry 20"));
    assert!(!body.contains("Entry 0<"));

    let response = router
        .oneshot(TestRequest::get("/?search=missing&search=RUST").session(&session).build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("Entry 0"));
    assert!(!body.contains("No posts found."));
}

#[tokio::test]
async fn anonymous_repeated_parameters_still_redirect_to_login() {
    let store = MemoryStore::new();
    let router = app(&store);

    let response = router
        .clone()
        .oneshot(TestRequest::get("/?search=a&search=b").build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login?next="));

    let response = router
        .oneshot(TestRequest::get("/?page=1&page=1").build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login?next="));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn repeated_form_fields_use_the_last_value() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;

    let response = app(&store)
        .oneshot(
            TestRequest::post("/post/new")
                .session(&session)
                .with_csrf()
                .field("title", "Draft")
                .field("title", "Final")
                .field("content", "Body")
                .build(),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let stored = store.posts().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "Final");
}

#[tokio::test]
async fn detail_shows_edit_links_to_the_author() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    let post = store
        .seed_post(&alice, "Mine", "words", OffsetDateTime::now_utc())
        .await;

    let response = app(&store)
        .oneshot(
            TestRequest::get(&format!("/post/{}", post.id))
                .session(&session)
                .build(),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("Mine"));
    assert!(body.contains(&format!("/post/{}/update", post.id)));
    assert!(body.contains(&format!("/post/{}/delete", post.id)));
}

#[tokio::test]
async fn update_redirects_to_the_post() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    let post = store
        .seed_post(&alice, "Old", "text", OffsetDateTime::now_utc())
        .await;

    let response = app(&store)
        .oneshot(
            TestRequest::post(&format!("/post/{}/update", post.id))
                .session(&session)
                .with_csrf()
                .field("title", "New")
                .field("content", "text")
                .build(),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/post/{}", post.id));
    assert_eq!(store.post(post.id).await.expect("post").title, "New");
}

#[tokio::test]
async fn delete_confirm_then_delete() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    let post = store
        .seed_post(&alice, "Doomed", "bye", OffsetDateTime::now_utc())
        .await;
    let router = app(&store);
    let path = format!("/post/{}/delete", post.id);

    let response = router
        .clone()
        .oneshot(TestRequest::get(&path).session(&session).build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("Are you sure you want to delete the post"));

    let response = router
        .clone()
        .oneshot(TestRequest::post(&path).session(&session).with_csrf().build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = router
        .oneshot(
            TestRequest::get(&format!("/post/{}", post.id))
                .session(&session)
                .build(),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_ids_and_pages_are_not_found() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    let router = app(&store);

    let uris = [
        "/post/not-a-uuid",
        "/post/123/update",
        "/?page=2",
        "/?page=zero",
        "/nowhere",
    ];
    for uri in uris {
        let response = router
            .clone()
            .oneshot(TestRequest::get(uri).session(&session).build())
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn pager_links_keep_the_search_term() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    let now = OffsetDateTime::now_utc();
    for index in 0..25 {
        store
            .seed_post(
                &alice,
                &format!("Post {index}"),
                "match",
                now - Duration::minutes(index),
            )
            .await;
    }

    let response = app(&store)
        .oneshot(TestRequest::get("/?search=MATCH").session(&session).build())
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("page=2&amp;search=MATCH"), "{body}");
    assert!(!body.contains("Post 20"));
}

#[tokio::test]
async fn expired_sessions_are_anonymous() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let auth = auth_service(&store);
    let expired = store
        .open_session_until(&alice, OffsetDateTime::now_utc() - Duration::minutes(1))
        .await;
    assert!(auth.resolve(&expired).await.expect("lookup").is_none());

    let response = app(&store)
        .oneshot(TestRequest::get("/").session(&expired).build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login"));
}

#[tokio::test]
async fn login_sets_a_session_and_follows_next() {
    let store = MemoryStore::new();
    auth_service(&store)
        .register("alice", "correct-horse")
        .await
        .expect("register user");

    let response = app(&store)
        .oneshot(
            TestRequest::post("/login")
                .with_csrf()
                .field("username", "alice")
                .field("password", "correct-horse")
                .field("next", "/post/new")
                .build(),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/post/new");
    let cookies = set_cookies(&response);
    let session = cookies
        .iter()
        .find(|cookie| cookie.starts_with("sessionid="))
        .expect("session cookie");
    assert!(session.contains("HttpOnly"));
    assert!(session.contains("SameSite=Lax"));
}

#[tokio::test]
async fn login_ignores_offsite_next() {
    let store = MemoryStore::new();
    auth_service(&store)
        .register("alice", "correct-horse")
        .await
        .expect("register user");

    let response = app(&store)
        .oneshot(
            TestRequest::post("/login")
                .with_csrf()
                .field("username", "alice")
                .field("password", "correct-horse")
                .field("next", "https://evil.example/")
                .build(),
        )
        .await
        .expect("router responds");

    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn bad_credentials_re_render_the_login_form() {
    let store = MemoryStore::new();

    let response = app(&store)
        .oneshot(
            TestRequest::post("/login")
                .with_csrf()
                .field("username", "nobody")
                .field("password", "nothing-here")
                .build(),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !set_cookies(&response)
            .iter()
            .any(|cookie| cookie.starts_with("sessionid="))
    );
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("Please enter a correct username and password."));
}

#[tokio::test]
async fn logout_clears_the_session() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    let router = app(&store);

    let response = router
        .clone()
        .oneshot(
            TestRequest::post("/logout")
                .session(&session)
                .with_csrf()
                .build(),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = router
        .oneshot(TestRequest::get("/").session(&session).build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn unknown_hosts_are_rejected() {
    let store = MemoryStore::new();
    let mut request = TestRequest::get("/login").build();
    request
        .headers_mut()
        .insert(header::HOST, "evil.example".parse().expect("header value"));

    let response = app(&store).oneshot(request).await.expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wildcard_host_allows_anything() {
    let store = MemoryStore::new();
    let settings = HttpSettings {
        allowed_hosts: vec!["*".to_string()],
        ..http_settings()
    };
    let mut request = TestRequest::get("/login").build();
    request
        .headers_mut()
        .insert(header::HOST, "blog.example:8080".parse().expect("header value"));

    let response = app_with_settings(&store, settings)
        .oneshot(request)
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_reflects_the_store() {
    let store = MemoryStore::new();
    let router = app(&store);

    let response = router
        .clone()
        .oneshot(TestRequest::get("/_health/db").build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);

    store.set_unavailable(true);
    let response = router
        .oneshot(TestRequest::get("/_health/db").build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn store_outage_renders_an_error_page() {
    let store = MemoryStore::new();
    let alice = store.add_user("alice").await;
    let session = store.open_session(&alice).await;
    store.set_unavailable(true);

    let response = app(&store)
        .oneshot(TestRequest::get("/").session(&session).build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn serves_static_files_without_traversal() {
    let root = std::env::temp_dir().join(format!("quill-static-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(root.join("css")).expect("create static dir");
    std::fs::write(root.join("css").join("site.css"), "body {}").expect("write asset");

    let store = MemoryStore::new();
    let settings = HttpSettings {
        static_root: root.clone(),
        ..http_settings()
    };
    let router = app_with_settings(&store, settings);

    let response = router
        .clone()
        .oneshot(TestRequest::get("/static/css/site.css").build())
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("text/css")
    );

    for uri in ["/static/css/../../etc/passwd", "/static/missing.css", "/static/css/"] {
        let response = router
            .clone()
            .oneshot(TestRequest::get(uri).build())
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    std::fs::remove_dir_all(root).ok();
}
