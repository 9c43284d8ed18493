use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use super::{actor_from_headers, channels::ChannelPath};
use crate::server::{
    core::AppState,
    domain,
    errors::ActionFailure,
    types::{CreateMessageRequest, CreateWebhookRequest, MessageResponse, WebhookResponse},
};

pub(crate) async fn create_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ChannelPath>,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<Json<MessageResponse>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::post_message(
        &state,
        actor_id,
        &path.server_id,
        &path.channel_id,
        payload.content,
    )
    .await
    .map(Json)
}

pub(crate) async fn create_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ChannelPath>,
    Json(payload): Json<CreateWebhookRequest>,
) -> Result<Json<WebhookResponse>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::create_webhook(
        &state,
        actor_id,
        &path.server_id,
        &path.channel_id,
        payload.url,
    )
    .await
    .map(Json)
}
