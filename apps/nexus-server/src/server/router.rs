use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, StatusCode},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{
    core::{AppConfig, AppState},
    handlers::{
        channels::{create_category, create_channel, set_channel_override},
        messages::{create_message, create_webhook},
        roles::{
            assign_member_role, create_role, delete_role, unassign_member_role, update_role,
        },
        servers::{create_server, delete_server, get_permissions, join_server, remove_member},
    },
    types::{health, metrics},
};

/// Build the axum router with global middleware and a fresh [`AppState`].
///
/// # Errors
/// Returns an error if configured limits are invalid.
pub fn build_router(config: &AppConfig) -> anyhow::Result<Router> {
    let state = AppState::new(config)?;
    build_router_with_state(config, state)
}

/// Build the router around an existing [`AppState`], so the caller can also
/// hand out broadcast subscriptions through [`AppState::subscribe`].
///
/// # Errors
/// Returns an error if configured limits are invalid.
pub fn build_router_with_state(config: &AppConfig, state: AppState) -> anyhow::Result<Router> {
    config.validate()?;
    let request_id_header = HeaderName::from_static("x-request-id");

    Ok(Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/servers", post(create_server))
        .route("/servers/{server_id}", delete(delete_server))
        .route("/servers/{server_id}/members", post(join_server))
        .route(
            "/servers/{server_id}/members/{user_id}",
            delete(remove_member),
        )
        .route(
            "/servers/{server_id}/members/{user_id}/roles/{role_id}",
            put(assign_member_role).delete(unassign_member_role),
        )
        .route("/servers/{server_id}/roles", post(create_role))
        .route(
            "/servers/{server_id}/roles/{role_id}",
            patch(update_role).delete(delete_role),
        )
        .route("/servers/{server_id}/categories", post(create_category))
        .route("/servers/{server_id}/channels", post(create_channel))
        .route(
            "/servers/{server_id}/channels/{channel_id}/overrides/{role_id}",
            patch(set_channel_override),
        )
        .route(
            "/servers/{server_id}/channels/{channel_id}/messages",
            post(create_message),
        )
        .route(
            "/servers/{server_id}/channels/{channel_id}/webhooks",
            post(create_webhook),
        )
        .route("/servers/{server_id}/permissions", get(get_permissions))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
                .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                )),
        ))
}
