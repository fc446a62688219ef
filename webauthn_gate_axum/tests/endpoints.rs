use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use webauthn_authenticator_rs::WebauthnAuthenticator;
use webauthn_authenticator_rs::softpasskey::SoftPasskey;

use webauthn_gate::SESSION_COOKIE_NAME;
use webauthn_gate_axum::{
    AuthUser, GateConfig, WebauthnGate, mount, require_authentication, webauthn_router_no_trace,
};

async fn test_gate() -> WebauthnGate {
    let config = GateConfig::new("http://localhost:3000")
        .unwrap()
        .with_rp_name("OWASP Org.")
        .with_username_field("username")
        .with_user_fields([("username", "username"), ("displayName", "displayName")]);
    WebauthnGate::with_memory_store(config).await.unwrap()
}

fn app(gate: &WebauthnGate) -> Router {
    mount(Router::new(), "/", webauthn_router_no_trace(gate.clone()))
}

fn post_json(uri: &str, body: Value, session_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = session_id {
        builder = builder.header(header::COOKIE, format!("{}={}", *SESSION_COOKIE_NAME, id));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_with_session(uri: &str, session_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(id) = session_id {
        builder = builder.header(header::COOKIE, format!("{}={}", *SESSION_COOKIE_NAME, id));
    }
    builder.body(Body::empty()).unwrap()
}

fn session_from_response(response: &Response) -> Option<String> {
    let prefix = format!("{}=", *SESSION_COOKIE_NAME);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix(&prefix))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn fake_attestation() -> Value {
    json!({
        "id": "AAAA",
        "rawId": "AAAA",
        "type": "public-key",
        "response": {"attestationObject": "AAAA", "clientDataJSON": "AAAA"}
    })
}

fn fake_assertion() -> Value {
    json!({
        "id": "AAAA",
        "rawId": "AAAA",
        "type": "public-key",
        "response": {
            "authenticatorData": "AAAA",
            "clientDataJSON": "AAAA",
            "signature": "AAAA",
            "userHandle": null
        }
    })
}

/// Put the session behind `session_id` in the logged in state for a registered user.
async fn log_in(gate: &WebauthnGate, session_id: &str, username: &str) {
    let mut user = gate.store().get(username).await.unwrap().unwrap();
    user.registered = true;
    gate.store().put(user).await.unwrap();
    gate.sessions()
        .update(session_id, |state| state.logged_in = Some(username.to_string()))
        .await
        .unwrap();
}

async fn register(gate: &WebauthnGate, username: &str) -> String {
    let response = app(gate)
        .oneshot(post_json("/register", json!({"username": username}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    session_from_response(&response).unwrap()
}

#[tokio::test]
async fn test_register_returns_creation_options_and_cookie() {
    // Given a fresh gate
    let gate = test_gate().await;

    // When a browser without a session asks to register
    let response = app(&gate)
        .oneshot(post_json(
            "/register",
            json!({"username": "alice", "displayName": "Alice"}),
            None,
        ))
        .await
        .unwrap();

    // Then it receives creation options and a session cookie
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = session_from_response(&response).unwrap();
    assert!(gate.sessions().contains(&session_id).await);

    let body = json_body(response).await;
    assert_eq!(body["publicKey"]["rp"]["name"], "OWASP Org.");
    assert_eq!(body["publicKey"]["rp"]["id"], "localhost");
    assert_eq!(body["publicKey"]["user"]["name"], "alice");
    assert_eq!(body["publicKey"]["user"]["displayName"], "Alice");
    assert!(body["publicKey"]["challenge"].is_string());
}

#[tokio::test]
async fn test_register_reuses_existing_session() {
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;

    let response = app(&gate)
        .oneshot(post_json(
            "/register",
            json!({"username": "bob"}),
            Some(&session_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_from_response(&response).is_none());
}

#[tokio::test]
async fn test_register_without_username() {
    let gate = test_gate().await;

    let response = app(&gate)
        .oneshot(post_json("/register", json!({"displayName": "Anon"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn test_register_existing_user_is_forbidden() {
    // Given a registered user
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;
    log_in(&gate, &session_id, "alice").await;

    // When someone tries to register the same name
    let response = app(&gate)
        .oneshot(post_json("/register", json!({"username": "alice"}), None))
        .await
        .unwrap();

    // Then the request is refused
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["message"], "User already exists: alice");
}

#[tokio::test]
async fn test_login_unknown_user_is_forbidden() {
    let gate = test_gate().await;

    let response = app(&gate)
        .oneshot(post_json("/login", json!({"username": "ghost"}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["status"], "failed");
}

#[tokio::test]
async fn test_login_user_without_credentials() {
    // Given a user marked registered but holding no passkey
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;
    log_in(&gate, &session_id, "alice").await;

    // When asking to log in
    let response = app(&gate)
        .oneshot(post_json("/login", json!({"username": "alice"}), None))
        .await
        .unwrap();

    // Then the user is treated as unknown
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_response_without_session() {
    let gate = test_gate().await;

    let response = app(&gate)
        .oneshot(post_json("/response", fake_attestation(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status"], "failed");
}

#[tokio::test]
async fn test_response_of_wrong_kind() {
    // Given a pending registration
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;

    // When an assertion is posted instead of an attestation
    let response = app(&gate)
        .oneshot(post_json("/response", fake_assertion(), Some(&session_id)))
        .await
        .unwrap();

    // Then it is rejected
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_response_with_forged_attestation() {
    // Given a pending registration
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;

    // When a garbage attestation is posted
    let response = app(&gate)
        .oneshot(post_json("/response", fake_attestation(), Some(&session_id)))
        .await
        .unwrap();

    // Then verification fails and the user stays unregistered
    assert!(response.status().is_client_error());
    let user = gate.store().get("alice").await.unwrap().unwrap();
    assert!(!user.registered);
}

#[tokio::test]
async fn test_response_unclassifiable_body() {
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;

    let response = app(&gate)
        .oneshot(post_json(
            "/response",
            json!({"id": "AAAA", "response": {}}),
            Some(&session_id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_clears_session() {
    // Given a logged in session
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;
    log_in(&gate, &session_id, "alice").await;

    // When logging out
    let response = app(&gate)
        .oneshot(post_json("/logout", json!({}), Some(&session_id)))
        .await
        .unwrap();

    // Then the cookie is expired and the session is gone
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.contains("Max-Age=-86400"));
    assert!(!gate.sessions().contains(&session_id).await);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_logout_without_session() {
    let gate = test_gate().await;

    let response = app(&gate)
        .oneshot(Request::builder().method("POST").uri("/logout").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

async fn profile(user: AuthUser) -> String {
    format!("Hello, {}!", user.username)
}

async fn greeting(user: Option<AuthUser>) -> String {
    match user {
        Some(user) => format!("Welcome back, {}", user.username),
        None => "Welcome, guest".to_string(),
    }
}

fn protected_app(gate: &WebauthnGate) -> Router {
    let pages = Router::new()
        .route("/profile", get(profile))
        .route("/", get(greeting))
        .route(
            "/admin",
            get(|| async { "admin" })
                .route_layer(from_fn_with_state(gate.clone(), require_authentication)),
        )
        .with_state(gate.clone());
    mount(pages, "/auth", webauthn_router_no_trace(gate.clone()))
}

#[tokio::test]
async fn test_auth_user_extractor() {
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;

    // Anonymous session is rejected
    let response = protected_app(&gate)
        .oneshot(get_with_session("/profile", Some(&session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["message"], "Unauthorized");

    // Logged in session is accepted
    log_in(&gate, &session_id, "alice").await;
    let response = protected_app(&gate)
        .oneshot(get_with_session("/profile", Some(&session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Hello, alice!");
}

#[tokio::test]
async fn test_optional_auth_user_extractor() {
    let gate = test_gate().await;

    let response = protected_app(&gate)
        .oneshot(get_with_session("/", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Welcome, guest");
}

#[tokio::test]
async fn test_require_authentication_middleware() {
    let gate = test_gate().await;

    let response = protected_app(&gate)
        .oneshot(get_with_session("/admin", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let session_id = register(&gate, "alice").await;
    log_in(&gate, &session_id, "alice").await;
    let response = protected_app(&gate)
        .oneshot(get_with_session("/admin", Some(&session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_mount_under_prefix() {
    let gate = test_gate().await;

    // Endpoints live under the prefix
    let response = protected_app(&gate)
        .oneshot(post_json("/auth/register", json!({"username": "alice"}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // And not at the root
    let response = protected_app(&gate)
        .oneshot(post_json("/register", json!({"username": "bob"}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_endpoints_accept_post_only() {
    let gate = test_gate().await;

    let response = app(&gate)
        .oneshot(get_with_session("/register", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_failed_start_keeps_no_session() {
    // Given cookieless requests that the gate refuses
    let gate = test_gate().await;
    for _ in 0..5 {
        let response = app(&gate)
            .oneshot(post_json("/register", json!({}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(session_from_response(&response).is_none());

        let response = app(&gate)
            .oneshot(post_json("/login", json!({"username": "ghost"}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(session_from_response(&response).is_none());
    }

    // Then no session is held for them
    assert_eq!(gate.sessions().len().await, 0);
}

#[tokio::test]
async fn test_failed_start_keeps_existing_session() {
    // Given a browser that already holds a session
    let gate = test_gate().await;
    let session_id = register(&gate, "alice").await;

    // When its next request is refused
    let response = app(&gate)
        .oneshot(post_json("/login", json!({"username": "ghost"}), Some(&session_id)))
        .await
        .unwrap();

    // Then its session survives
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(gate.sessions().contains(&session_id).await);
}

#[tokio::test]
async fn test_passkey_ceremonies_over_http() {
    let gate = test_gate().await;
    let origin = gate.config().origin().clone();
    let mut authenticator = WebauthnAuthenticator::new(SoftPasskey::new(true));

    // Given registration options for alice
    let response = app(&gate)
        .oneshot(post_json("/register", json!({"username": "alice"}), None))
        .await
        .unwrap();
    let first_session = session_from_response(&response).unwrap();
    let options = serde_json::from_value(json_body(response).await).unwrap();
    let credential = authenticator.do_registration(origin.clone(), options).unwrap();

    // When the attestation is posted
    let response = app(&gate)
        .oneshot(post_json(
            "/response",
            serde_json::to_value(&credential).unwrap(),
            Some(&first_session),
        ))
        .await
        .unwrap();

    // Then alice is registered and the session cookie is replaced
    assert_eq!(response.status(), StatusCode::OK);
    let second_session = session_from_response(&response).unwrap();
    assert_ne!(second_session, first_session);
    let body = json_body(response).await;
    assert_eq!(body, json!({"status": "ok", "username": "alice", "kind": "attestation"}));

    // And the old cookie no longer authenticates while the new one does
    let response = protected_app(&gate)
        .oneshot(get_with_session("/profile", Some(&first_session)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = protected_app(&gate)
        .oneshot(get_with_session("/profile", Some(&second_session)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // When logging in with the passkey
    let response = app(&gate)
        .oneshot(post_json(
            "/login",
            json!({"username": "alice"}),
            Some(&second_session),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let options = serde_json::from_value(json_body(response).await).unwrap();
    let assertion = authenticator.do_authentication(origin, options).unwrap();
    let assertion = serde_json::to_value(&assertion).unwrap();
    let response = app(&gate)
        .oneshot(post_json("/response", assertion.clone(), Some(&second_session)))
        .await
        .unwrap();

    // Then the assertion is accepted on yet another session id
    assert_eq!(response.status(), StatusCode::OK);
    let third_session = session_from_response(&response).unwrap();
    assert_ne!(third_session, second_session);
    assert_eq!(json_body(response).await["kind"], "assertion");

    // And a replayed assertion is refused
    let response = app(&gate)
        .oneshot(post_json("/response", assertion, Some(&third_session)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
