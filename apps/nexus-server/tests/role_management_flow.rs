use axum::{body::Body, http::Request, http::StatusCode};
use nexus_core::UserId;
use nexus_server::{build_router, build_router_with_state, AppConfig, AppState};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;

const ACTOR_HEADER: &str = "x-nexus-user-id";

async fn parse_json_body<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");
    serde_json::from_slice(&body).expect("response body should be valid json")
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    actor: Option<UserId>,
    body: Option<Value>,
) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");
    app.clone()
        .oneshot(request)
        .await
        .expect("request should execute")
}

async fn expect_error(response: axum::response::Response, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let body: Value = parse_json_body(response).await;
    assert_eq!(body["error"], code);
}

async fn create_server(app: &axum::Router, owner: UserId) -> String {
    let response = send(
        app,
        "POST",
        "/servers",
        Some(owner),
        Some(json!({"name":"Role Flow","username":"owner_user"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_body(response).await;
    body["id"].as_str().expect("server id").to_owned()
}

async fn join(app: &axum::Router, server_id: &str, username: &str) -> UserId {
    let user = UserId::new();
    let response = send(
        app,
        "POST",
        &format!("/servers/{server_id}/members"),
        Some(user),
        Some(json!({ "username": username })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    user
}

async fn create_channel(app: &axum::Router, server_id: &str, owner: UserId, name: &str) -> String {
    let response = send(
        app,
        "POST",
        &format!("/servers/{server_id}/channels"),
        Some(owner),
        Some(json!({ "name": name, "kind": "text" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_body(response).await;
    body["channel_id"].as_str().expect("channel id").to_owned()
}

#[tokio::test]
async fn role_hierarchy_and_channel_overrides_shape_permissions() {
    let app = build_router(&AppConfig::default()).expect("router should build");
    let owner = UserId::new();
    let server_id = create_server(&app, owner).await;
    let moderator = join(&app, &server_id, "moderator").await;
    let member = join(&app, &server_id, "member_one").await;

    let mods = send(
        &app,
        "POST",
        &format!("/servers/{server_id}/roles"),
        Some(owner),
        Some(json!({
            "name": "mods",
            "position": 10,
            "permissions": {"manageRoles": true, "kickMembers": true}
        })),
    )
    .await;
    assert_eq!(mods.status(), StatusCode::OK);
    let mods: Value = parse_json_body(mods).await;
    let mods_id = mods["role_id"].as_str().expect("role id").to_owned();

    let assigned = send(
        &app,
        "PUT",
        &format!("/servers/{server_id}/members/{moderator}/roles/{mods_id}"),
        Some(owner),
        None,
    )
    .await;
    assert_eq!(assigned.status(), StatusCode::OK);

    expect_error(
        send(
            &app,
            "POST",
            &format!("/servers/{server_id}/roles"),
            Some(moderator),
            Some(json!({"name": "peers", "position": 10})),
        )
        .await,
        StatusCode::FORBIDDEN,
        "role_hierarchy",
    )
    .await;

    let helpers = send(
        &app,
        "POST",
        &format!("/servers/{server_id}/roles"),
        Some(moderator),
        Some(json!({"name": "helpers", "position": 5})),
    )
    .await;
    assert_eq!(helpers.status(), StatusCode::OK);
    let helpers: Value = parse_json_body(helpers).await;
    let helpers_id = helpers["role_id"].as_str().expect("role id").to_owned();

    expect_error(
        send(
            &app,
            "PATCH",
            &format!("/servers/{server_id}/roles/{mods_id}"),
            Some(moderator),
            Some(json!({"name": "renamed"})),
        )
        .await,
        StatusCode::FORBIDDEN,
        "role_hierarchy",
    )
    .await;

    expect_error(
        send(
            &app,
            "DELETE",
            &format!("/servers/{server_id}/roles/everyone"),
            Some(owner),
            None,
        )
        .await,
        StatusCode::FORBIDDEN,
        "everyone_role_protected",
    )
    .await;

    let assigned = send(
        &app,
        "PUT",
        &format!("/servers/{server_id}/members/{member}/roles/{helpers_id}"),
        Some(moderator),
        None,
    )
    .await;
    assert_eq!(assigned.status(), StatusCode::OK);
    let server: Value = parse_json_body(assigned).await;
    assert_eq!(
        server["members"][member.to_string()]["role_ids"],
        json!([helpers_id])
    );

    expect_error(
        send(
            &app,
            "DELETE",
            &format!("/servers/{server_id}/members/{owner}"),
            Some(moderator),
            None,
        )
        .await,
        StatusCode::FORBIDDEN,
        "target_is_owner",
    )
    .await;

    let channel_id = create_channel(&app, &server_id, owner, "announcements").await;
    let overridden = send(
        &app,
        "PATCH",
        &format!("/servers/{server_id}/channels/{channel_id}/overrides/everyone"),
        Some(owner),
        Some(json!({"sendMessages": false})),
    )
    .await;
    assert_eq!(overridden.status(), StatusCode::OK);

    let server_wide = send(
        &app,
        "GET",
        &format!("/servers/{server_id}/permissions"),
        Some(member),
        None,
    )
    .await;
    assert_eq!(server_wide.status(), StatusCode::OK);
    let server_wide: Value = parse_json_body(server_wide).await;
    assert_eq!(server_wide["permissions"]["sendMessages"], true);
    assert_eq!(server_wide["rank"], "5");

    let in_channel = send(
        &app,
        "GET",
        &format!("/servers/{server_id}/permissions?channel_id={channel_id}"),
        Some(member),
        None,
    )
    .await;
    let in_channel: Value = parse_json_body(in_channel).await;
    assert_eq!(in_channel["permissions"]["sendMessages"], false);
    assert_eq!(in_channel["permissions"]["viewChannel"], true);

    expect_error(
        send(
            &app,
            "POST",
            &format!("/servers/{server_id}/channels/{channel_id}/messages"),
            Some(member),
            Some(json!({"content": "hello"})),
        )
        .await,
        StatusCode::FORBIDDEN,
        "missing_capability",
    )
    .await;

    let kicked = send(
        &app,
        "DELETE",
        &format!("/servers/{server_id}/members/{member}"),
        Some(moderator),
        None,
    )
    .await;
    assert_eq!(kicked.status(), StatusCode::OK);
    let server: Value = parse_json_body(kicked).await;
    assert!(server["members"].get(member.to_string()).is_none());

    let metrics = send(&app, "GET", "/metrics", None, None).await;
    assert_eq!(metrics.status(), StatusCode::OK);
    let metrics = axum::body::to_bytes(metrics.into_body(), usize::MAX)
        .await
        .expect("metrics body should be readable");
    let metrics = String::from_utf8(metrics.to_vec()).expect("metrics should be utf8");
    assert!(metrics.contains(
        "nexus_authorization_denials_total{action=\"role_create\",reason=\"role_hierarchy\"}"
    ));
}

#[tokio::test]
async fn requests_without_an_actor_are_unauthorized() {
    let app = build_router(&AppConfig::default()).expect("router should build");
    expect_error(
        send(
            &app,
            "POST",
            "/servers",
            None,
            Some(json!({"name":"Nobody","username":"nobody"})),
        )
        .await,
        StatusCode::UNAUTHORIZED,
        "unauthorized",
    )
    .await;

    expect_error(
        send(
            &app,
            "POST",
            "/servers/missing/members",
            Some(UserId::new()),
            Some(json!({"username":"someone"})),
        )
        .await,
        StatusCode::NOT_FOUND,
        "not_found",
    )
    .await;
}

#[tokio::test]
async fn messages_report_references_and_suppress_unprivileged_everyone() {
    let app = build_router(&AppConfig::default()).expect("router should build");
    let owner = UserId::new();
    let server_id = create_server(&app, owner).await;
    let member = join(&app, &server_id, "member_one").await;
    let channel_id = create_channel(&app, &server_id, owner, "general").await;

    let response = send(
        &app,
        "POST",
        &format!("/servers/{server_id}/channels/{channel_id}/messages"),
        Some(member),
        Some(json!({"content": "@everyone see #general and ping @owner_user"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let message: Value = parse_json_body(response).await;
    assert_eq!(message["mentions"]["everyone"], true);
    assert_eq!(message["notifications"]["mass"], false);
    assert_eq!(message["notifications"]["everyone_suppressed"], true);
    assert_eq!(message["notifications"]["users"], json!([owner.to_string()]));
    assert_eq!(
        message["channel_links"]["channels"][0]["channel_id"],
        channel_id.as_str()
    );

    expect_error(
        send(
            &app,
            "POST",
            &format!("/servers/{server_id}/channels/{channel_id}/messages"),
            Some(member),
            Some(json!({"content": "   "})),
        )
        .await,
        StatusCode::BAD_REQUEST,
        "invalid_request",
    )
    .await;
}

#[tokio::test]
async fn webhooks_refuse_private_network_targets() {
    let app = build_router(&AppConfig::default()).expect("router should build");
    let owner = UserId::new();
    let server_id = create_server(&app, owner).await;
    let channel_id = create_channel(&app, &server_id, owner, "alerts").await;
    let uri = format!("/servers/{server_id}/channels/{channel_id}/webhooks");

    for url in [
        "http://127.0.0.1:8080/hook",
        "http://169.254.169.254/latest/meta-data/",
        "http://[::1]/hook",
        "http://printer.local/hook",
        "ftp://example.com/hook",
    ] {
        expect_error(
            send(&app, "POST", &uri, Some(owner), Some(json!({ "url": url }))).await,
            StatusCode::BAD_REQUEST,
            "unsafe_url",
        )
        .await;
    }

    let created = send(
        &app,
        "POST",
        &uri,
        Some(owner),
        Some(json!({"url": "https://hooks.example.com/nexus"})),
    )
    .await;
    assert_eq!(created.status(), StatusCode::OK);
    let created: Value = parse_json_body(created).await;
    assert_eq!(created["channel_id"], channel_id.as_str());
}

#[tokio::test]
async fn subscribers_of_a_shared_state_see_router_mutations() {
    let config = AppConfig::default();
    let state = AppState::new(&config).expect("state should build");
    let app = build_router_with_state(&config, state.clone()).expect("router should build");
    let owner = UserId::new();
    let server_id = create_server(&app, owner).await;

    let mut subscription = state
        .subscribe(&server_id, owner)
        .await
        .expect("owner may subscribe");
    let _member = join(&app, &server_id, "member_one").await;

    let payload = subscription
        .receiver
        .recv()
        .await
        .expect("join should be broadcast");
    let envelope: Value = serde_json::from_str(&payload).expect("payload should be json");
    assert_eq!(envelope["v"], 1);
    assert_eq!(envelope["t"], "member_join");
    assert_eq!(envelope["d"]["id"], server_id.as_str());

    let outsider = state.subscribe(&server_id, UserId::new()).await;
    assert!(outsider.is_err());
}

#[test]
fn invalid_limits_are_rejected_at_startup() {
    let config = AppConfig {
        broadcast_queue: 0,
        ..AppConfig::default()
    };
    assert!(build_router(&config).is_err());
}
