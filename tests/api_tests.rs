use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use helpdesk::config::Config;
use helpdesk::db::{TicketPatch, UpdateOutcome};
use helpdesk::entities::tickets::TicketStatus;
use helpdesk::services::ticket_service::transition_allowed;
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

/// Admin account seeded by the initial migration.
const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "admin";

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;
    config.security.auth_throttle.enabled = false;
    // Cheap hashing parameters so the suite stays fast.
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.storage.upload_path = std::env::temp_dir()
        .join(format!("helpdesk-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    config
}

async fn spawn_app() -> Router {
    let (app, _) = spawn_app_with_state(test_config()).await;
    app
}

async fn spawn_app_with_state(config: Config) -> (Router, Arc<helpdesk::api::AppState>) {
    let state = helpdesk::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    (helpdesk::api::router(state.clone()), state)
}

fn json_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("Cookie", cookie);
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("Cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(uri: &str, cookie: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Cookie", cookie)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Missing set-cookie header")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            &json!({"username": username, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

/// Register a fresh account and log in. Returns the session cookie and user id.
async fn register_and_login(app: &Router, username: &str, password: &str) -> (String, i64) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            &json!({"username": username, "password": password}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let id = body["data"]["id"].as_i64().unwrap();

    (login(app, username, password).await, id)
}

async fn create_ticket(app: &Router, cookie: &str, title: &str) -> i64 {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tickets",
            Some(cookie),
            &json!({"title": title, "description": "Something is broken"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "open");
    body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;

    let response = app
        .oneshot(get_request("/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_auth_required() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(get_request("/api/tickets", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(get_request("/uploads/somefile.png", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_logout_flow() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(get_request("/api/me", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"]["user"].is_null());

    let (cookie, _) = register_and_login(&app, "alice", "password123").await;

    let response = app
        .clone()
        .oneshot(get_request("/api/me", Some(&cookie)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert_eq!(body["data"]["user"]["role"], "user");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/logout", Some(&cookie), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/api/me", Some(&cookie)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["data"]["user"].is_null());
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let app = spawn_app().await;
    register_and_login(&app, "alice", "password123").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            &json!({"username": "alice", "password": "wrong-password"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_duplicate_username_conflicts() {
    let app = spawn_app().await;
    register_and_login(&app, "alice", "password123").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            &json!({"username": "alice", "password": "password456"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_validation() {
    let app = spawn_app().await;

    // Username below the minimum length
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            &json!({"username": "ab", "password": "password123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Password too short
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            &json!({"username": "bob", "password": "short"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Malformed email
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/register",
            None,
            &json!({"username": "bob", "email": "not-an-email", "password": "password123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ticket_lifecycle_with_triage() {
    let app = spawn_app().await;

    let (alice, _) = register_and_login(&app, "alice", "password123").await;
    let (bob, bob_id) = register_and_login(&app, "bob", "password123").await;
    let admin = login(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let ticket_id = create_ticket(&app, &alice, "Printer on fire").await;

    // Another plain user cannot see the ticket
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/tickets/{ticket_id}"), Some(&bob)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin promotes bob to tech; takes effect on his next request
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{bob_id}/role"),
            Some(&admin),
            &json!({"role": "tech"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/tickets/{ticket_id}"), Some(&bob)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Tech assigns the ticket to himself and works it
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/assign"),
            Some(&bob),
            &json!({"user_id": bob_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["assigned_to"], bob_id);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&bob),
            &json!({"status": "in_progress"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "in_progress");

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/close"),
            Some(&bob),
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "closed");

    // The owner still sees her own ticket
    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/tickets/{ticket_id}"), Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Every mutation left an audit trail entry
    let response = app
        .oneshot(get_request("/api/audit?entity=ticket", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let actions: Vec<&str> = body["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert!(actions.contains(&"create"));
    assert!(actions.contains(&"assign"));
    assert!(actions.contains(&"close"));
}

#[tokio::test]
async fn test_owner_cannot_change_status() {
    let app = spawn_app().await;
    let (alice, _) = register_and_login(&app, "alice", "password123").await;

    let ticket_id = create_ticket(&app, &alice, "Broken keyboard").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&alice),
            &json!({"status": "closed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Editing her own text fields is fine
    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&alice),
            &json!({"title": "Broken keyboard (left shift)"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["title"], "Broken keyboard (left shift)");
}

#[tokio::test]
async fn test_closed_ticket_can_only_reopen() {
    let app = spawn_app().await;
    let admin = login(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let ticket_id = create_ticket(&app, &admin, "Flaky VPN").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/close"),
            Some(&admin),
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // closed -> in_progress is not a legal transition
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&admin),
            &json!({"status": "in_progress"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // closed -> open is
    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}"),
            Some(&admin),
            &json!({"status": "open"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "open");
}

#[tokio::test]
async fn test_ticket_validation() {
    let app = spawn_app().await;
    let (alice, _) = register_and_login(&app, "alice", "password123").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tickets",
            Some(&alice),
            &json!({"title": "", "description": "Missing title"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tickets",
            Some(&alice),
            &json!({"title": "x".repeat(161), "description": "Too long"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/tickets",
            Some(&alice),
            &json!({"title": "Ok", "description": "Ok", "priority": "urgent"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ticket_delete() {
    let app = spawn_app().await;
    let (alice, _) = register_and_login(&app, "alice", "password123").await;
    let (mallory, _) = register_and_login(&app, "mallory", "password123").await;

    let ticket_id = create_ticket(&app, &alice, "Please delete me").await;

    // A stranger cannot delete it
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/tickets/{ticket_id}"))
                .header("Cookie", &mallory)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner can
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/tickets/{ticket_id}"))
                .header("Cookie", &alice)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!("/api/tickets/{ticket_id}"), Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_scoped_to_owner_for_plain_users() {
    let app = spawn_app().await;
    let (alice, _) = register_and_login(&app, "alice", "password123").await;
    let (bob, _) = register_and_login(&app, "bob", "password123").await;
    let admin = login(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    create_ticket(&app, &alice, "Alice's problem").await;
    create_ticket(&app, &bob, "Bob's problem").await;

    let response = app
        .clone()
        .oneshot(get_request("/api/tickets", Some(&alice)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["tickets"][0]["title"], "Alice's problem");

    // Privileged roles see everything
    let response = app
        .oneshot(get_request("/api/tickets", Some(&admin)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn test_pagination_clamps() {
    let app = spawn_app().await;
    let (alice, _) = register_and_login(&app, "alice", "password123").await;
    create_ticket(&app, &alice, "One ticket").await;

    let response = app
        .oneshot(get_request("/api/tickets?page=0&size=1000", Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["size"], 100);
}

#[tokio::test]
async fn test_attachment_upload_rules() {
    let app = spawn_app().await;
    let (alice, _) = register_and_login(&app, "alice", "password123").await;
    let (mallory, _) = register_and_login(&app, "mallory", "password123").await;

    let ticket_id = create_ticket(&app, &alice, "Screenshot attached").await;
    let uri = format!("/api/tickets/{ticket_id}/attachments");

    // Disallowed extension
    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &alice, "malware.exe", b"MZ"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Traversal-shaped name with no usable extension
    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &alice, "../../etc/passwd", b"root"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Empty payload
    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &alice, "empty.png", b""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A stranger cannot attach to someone else's ticket
    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &mallory, "note.txt", b"hi"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Happy path
    let png_bytes = b"\x89PNG\r\n\x1a\nfake image data";
    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &alice, "report.png", png_bytes))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["filename"], "report.png");
    assert_eq!(body["data"]["mime"], "image/png");
    let url = body["data"]["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/"));

    let response = app
        .clone()
        .oneshot(get_request(&uri, Some(&alice)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // The stored file is served back, session-gated
    let response = app
        .clone()
        .oneshot(get_request(&url, Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    let served = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(served.as_ref(), png_bytes);

    let response = app
        .oneshot(get_request("/uploads/does-not-exist.png", Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audit_requires_privilege() {
    let app = spawn_app().await;
    let (alice, _) = register_and_login(&app, "alice", "password123").await;
    let admin = login(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(get_request("/api/audit", Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get_request("/api/audit", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"]["entries"].is_array());
}

#[tokio::test]
async fn test_user_management_is_admin_only() {
    let app = spawn_app().await;
    let (alice, alice_id) = register_and_login(&app, "alice", "password123").await;
    let admin = login(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(get_request("/api/users", Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{alice_id}/role"),
            Some(&alice),
            &json!({"role": "admin"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(get_request("/api/users", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"]["total"].as_u64().unwrap() >= 2);

    // Unknown role value
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{alice_id}/role"),
            Some(&admin),
            &json!({"role": "boss"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown user
    let response = app
        .oneshot(json_request(
            "PUT",
            "/api/users/99999/role",
            Some(&admin),
            &json!({"role": "tech"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let config = test_config();
    let (app, state) = spawn_app_with_state(config).await;

    let (_, alice_id) = register_and_login(&app, "alice", "password123").await;

    // Requesting a reset for an unknown account reveals nothing
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/request",
            None,
            &json!({"username": "nobody"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A bogus token is rejected
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/reset",
            None,
            &json!({"token": "deadbeef", "new_password": "newpassword1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Mint a token directly and redeem it
    let token = state
        .store()
        .create_reset_token(i32::try_from(alice_id).unwrap())
        .await
        .expect("Failed to create reset token")
        .token;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/reset",
            None,
            &json!({"token": token, "new_password": "newpassword1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Old password no longer works, the new one does
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            &json!({"username": "alice", "password": "password123"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login(&app, "alice", "newpassword1").await;

    // Tokens are single-use
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/password/reset",
            None,
            &json!({"token": token, "new_password": "anotherpass1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_token_survives_rejected_password() {
    let (app, state) = spawn_app_with_state(test_config()).await;
    let (_, alice_id) = register_and_login(&app, "alice", "password123").await;
    let alice_id = i32::try_from(alice_id).unwrap();

    let token = state
        .store()
        .create_reset_token(alice_id)
        .await
        .expect("Failed to create reset token")
        .token;

    // A rejected new password must leave the token redeemable
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/password/reset",
            None,
            &json!({"token": token, "new_password": "short"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The used flip and the rotation commit together; the winner gets the id
    let redeemed = state
        .store()
        .redeem_reset_token(&token, "newpassword1")
        .await
        .expect("Redemption failed");
    assert_eq!(redeemed, Some(alice_id));

    // The loser of the compare-and-swap gets nothing and rotates nothing
    let second = state
        .store()
        .redeem_reset_token(&token, "anotherpass1")
        .await
        .expect("Second redemption errored");
    assert!(second.is_none());

    login(&app, "alice", "newpassword1").await;
}

#[tokio::test]
async fn test_stale_status_check_cannot_commit() {
    let (app, state) = spawn_app_with_state(test_config()).await;
    let admin = login(&app, ADMIN_USERNAME, ADMIN_PASSWORD).await;

    let ticket_id = create_ticket(&app, &admin, "Races with triage").await;
    let ticket_id = i32::try_from(ticket_id).unwrap();

    // A caller that read the ticket while it was open would approve the move
    // to in_progress. Before its write lands, the ticket gets closed.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tickets/{ticket_id}/close"),
            Some(&admin),
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The transition check runs against the row inside the transaction, so
    // the stale approval cannot commit closed -> in_progress.
    let patch = TicketPatch {
        status: Some(TicketStatus::InProgress),
        ..Default::default()
    };
    let outcome = state
        .store()
        .update_ticket(ticket_id, patch, |current| {
            if transition_allowed(current.status, TicketStatus::InProgress) {
                Ok(())
            } else {
                Err("illegal transition")
            }
        })
        .await
        .expect("Update errored");
    assert!(matches!(outcome, UpdateOutcome::Rejected(_)));

    let response = app
        .oneshot(get_request(&format!("/api/tickets/{ticket_id}"), Some(&admin)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "closed");
}

#[tokio::test]
async fn test_ticket_delete_removes_stored_blobs() {
    let app = spawn_app().await;
    let (alice, _) = register_and_login(&app, "alice", "password123").await;

    let ticket_id = create_ticket(&app, &alice, "Attachment cleanup").await;
    let uri = format!("/api/tickets/{ticket_id}/attachments");

    let response = app
        .clone()
        .oneshot(multipart_request(&uri, &alice, "notes.txt", b"check the logs"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let url = body["data"]["url"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get_request(&url, Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/tickets/{ticket_id}"))
                .header("Cookie", &alice)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The bytes went with the rows
    let response = app
        .oneshot(get_request(&url, Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_throttle_locks_out() {
    let mut config = test_config();
    config.security.auth_throttle.enabled = true;
    config.security.auth_throttle.max_attempts = 3;
    let (app, _) = spawn_app_with_state(config).await;

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/login",
                None,
                &json!({"username": "admin", "password": "wrong"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/login",
            None,
            &json!({"username": "admin", "password": "wrong"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
