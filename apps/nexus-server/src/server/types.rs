use axum::{
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Json,
};
use nexus_core::{
    CapabilitySet, ChannelKind, ChannelLinks, Mentions, NotificationTargets, Server, UserId,
};
use serde::{Deserialize, Serialize};

use super::{core::METRICS_TEXT_CONTENT_TYPE, metrics::render_metrics};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub(crate) async fn metrics() -> Response {
    (
        [(CONTENT_TYPE, METRICS_TEXT_CONTENT_TYPE)],
        render_metrics(),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateServerRequest {
    pub(crate) name: String,
    pub(crate) username: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct JoinServerRequest {
    pub(crate) username: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateRoleRequest {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) color: u32,
    pub(crate) position: i32,
    #[serde(default)]
    pub(crate) permissions: CapabilitySet,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateCategoryRequest {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateChannelRequest {
    pub(crate) name: String,
    #[serde(default = "default_channel_kind")]
    pub(crate) kind: ChannelKind,
    #[serde(default)]
    pub(crate) category_id: Option<String>,
}

fn default_channel_kind() -> ChannelKind {
    ChannelKind::Text
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PermissionsQuery {
    pub(crate) channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateMessageRequest {
    pub(crate) content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateWebhookRequest {
    pub(crate) url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RoleCreatedResponse {
    pub(crate) role_id: String,
    pub(crate) server: Server,
}

#[derive(Debug, Serialize)]
pub(crate) struct CategoryCreatedResponse {
    pub(crate) category_id: String,
    pub(crate) server: Server,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelCreatedResponse {
    pub(crate) channel_id: String,
    pub(crate) server: Server,
}

#[derive(Debug, Serialize)]
pub(crate) struct PermissionsResponse {
    pub(crate) server_id: String,
    pub(crate) channel_id: Option<String>,
    pub(crate) user_id: UserId,
    pub(crate) rank: String,
    pub(crate) permissions: CapabilitySet,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MessageResponse {
    pub(crate) message_id: String,
    pub(crate) server_id: String,
    pub(crate) channel_id: String,
    pub(crate) author_id: UserId,
    pub(crate) content: String,
    pub(crate) mentions: Mentions,
    pub(crate) channel_links: ChannelLinks,
    pub(crate) notifications: NotificationTargets,
    pub(crate) webhooks_queued: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct WebhookResponse {
    pub(crate) webhook_id: String,
    pub(crate) channel_id: String,
    pub(crate) url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ServerDeletedEvent {
    pub(crate) server_id: String,
}
