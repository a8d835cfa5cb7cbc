mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use modelstack::policy::store::{load_rules, policy_file};
use modelstack::{common_routes, model_routes, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(dir: &tempfile::TempDir) -> Router {
    let state = AppState::new(common::runtime(dir));
    common_routes().merge(model_routes(state))
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let body = match body {
        Some(b) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn signup_and_login(app: &Router, email: &str) -> (String, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/accounts",
        None,
        Some(json!({ "email": email, "password": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("password").is_none());

    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/accounts/login",
        None,
        Some(json!({ "email": email, "password": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        body["id"].as_str().unwrap().to_string(),
        body["userId"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_and_unknown_plural() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = call(&app, Method::GET, "/api/v1/widgets", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    // not public: no CRUD surface
    let (status, _) = call(&app, Method::GET, "/api/v1/role-mappings", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_and_me() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let (token, user_id) = signup_and_login(&app, "ada@example.com").await;

    let (status, body) = call(&app, Method::GET, "/api/v1/accounts/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["_id"], json!(user_id));
    assert!(body.get("password").is_none());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/accounts/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "LOGIN_FAILED");

    let (status, _) = call(&app, Method::GET, "/api/v1/accounts/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn raw_login(app: &Router, content_type: &str, body: &'static str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/accounts/login")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn unreadable_login_bodies_fail_like_bad_credentials() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let (_, expected) = call(
        &app,
        Method::POST,
        "/api/v1/accounts/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "x" })),
    )
    .await;

    for (content_type, body) in [
        ("application/json", "{not json"),
        ("application/json", "[1, 2]"),
        ("text/plain", "email=a&password=b"),
    ] {
        let (status, got) = raw_login(&app, content_type, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", body);
        assert_eq!(got, expected);
    }
}

#[tokio::test]
async fn duplicate_signup_is_a_conflict() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    signup_and_login(&app, "ada@example.com").await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/accounts",
        None,
        Some(json!({ "email": "Ada@Example.com", "password": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "EMAIL_UNIQUENESS");
    assert_eq!(body["error"]["details"]["codes"]["email"][0], "uniqueness");
}

#[tokio::test]
async fn notes_follow_declared_policies() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(&tmp);
    let (ada, ada_id) = signup_and_login(&app, "ada@example.com").await;
    let (bob, _) = signup_and_login(&app, "bob@example.com").await;

    let (status, _) = call(&app, Method::GET, "/api/v1/notes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, note) = call(
        &app,
        Method::POST,
        "/api/v1/notes",
        Some(&ada),
        Some(json!({ "title": "mine", "userId": ada_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = note["_id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/notes/{}", id);

    // {"include":[{"relation":"owner"}]}
    let include = "%7B%22include%22%3A%5B%7B%22relation%22%3A%22owner%22%7D%5D%7D";
    let (status, body) = call(&app, Method::GET, &format!("{}?filter={}", uri, include), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner"]["_id"], json!(ada_id));

    let (status, _) = call(&app, Method::PATCH, &uri, Some(&bob), Some(json!({ "title": "stolen" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, Method::PATCH, &uri, Some(&ada), Some(json!({ "title": "edited" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "edited");

    let (status, body) = call(&app, Method::GET, "/api/v1/notes/count", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = call(&app, Method::DELETE, &uri, Some(&ada), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
    let (status, _) = call(&app, Method::GET, &uri, Some(&ada), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn policy_files_are_written_per_model() {
    let tmp = tempfile::tempdir().unwrap();
    let _app = app(&tmp);
    let rows = |model: &str| load_rules(&policy_file(tmp.path(), model)).unwrap().len();
    assert_eq!(rows("Account"), 6);
    assert_eq!(rows("Role"), 2);
    assert_eq!(rows("Note"), 3);
    assert_eq!(rows("RoleMapping"), 1);
}
