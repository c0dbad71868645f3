use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose, Engine};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use token_gate::comms::http_api::{create_router, AppState};
use token_gate::config::{Config, JwtConfig, MemberSeed, RefreshRecordTtl, StoreConfig};
use token_gate::security::session_store::MemorySessionStore;
use tower::ServiceExt;

// Helper to create test config
fn test_config() -> Arc<Config> {
    Arc::new(Config {
        jwt: JwtConfig {
            secret: general_purpose::STANDARD.encode([11u8; 64]),
            access_token_validity_secs: 600,
            refresh_token_validity_secs: 3600,
            refresh_record_ttl: RefreshRecordTtl::RefreshToken,
        },
        store: StoreConfig::default(),
        members: vec![MemberSeed {
            username: "username".to_string(),
            password: "password".to_string(),
            nickname: None,
            roles: vec!["admin".to_string()],
        }],
    })
}

fn test_router() -> Router {
    let state = AppState::new(test_config(), Arc::new(MemorySessionStore::new())).unwrap();
    create_router(Arc::new(state))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_router();
    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_open_paths_need_no_token() {
    let app = test_router();
    assert_eq!(get(&app, "/").await.status(), StatusCode::OK);
    assert_eq!(get(&app, "/favicon.ico").await.status(), StatusCode::NO_CONTENT);
    assert_eq!(get(&app, "/error").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let app = test_router();
    let response = get(&app, "/nowhere").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = test_router();
    for uri in ["/members", "/api1", "/api2"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert!(json_body(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn test_sign_in_get_not_allowed() {
    let app = test_router();
    let response = get(&app, "/members/sign-in").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_sign_in_rejects_unreadable_body() {
    let app = test_router();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/members/sign-in")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert!(response.headers().get("authorization").is_none());
}

#[tokio::test]
async fn test_join_registers_member() {
    let app = test_router();
    let body = json!({"username": "newbie", "password": "pw", "nickname": "nb"});
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/members/join")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let member = json_body(response).await;
    assert_eq!(member["username"], "newbie");
    assert_eq!(member["roles"], json!(["user"]));
    assert!(member.get("password").is_none());

    // Same username again
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/members/join")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reissue_without_refresh_header() {
    let app = test_router();
    let response = get(&app, "/members/reissue").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
