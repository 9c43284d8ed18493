use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use nexus_core::{Capability, Server};
use serde::Deserialize;

use super::{actor_from_headers, servers::ServerPath};
use crate::server::{
    core::AppState,
    domain,
    errors::ActionFailure,
    types::{
        CategoryCreatedResponse, ChannelCreatedResponse, CreateCategoryRequest,
        CreateChannelRequest,
    },
};

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelPath {
    pub(crate) server_id: String,
    pub(crate) channel_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelRolePath {
    server_id: String,
    channel_id: String,
    role_id: String,
}

pub(crate) async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ServerPath>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<Json<CategoryCreatedResponse>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::create_category(&state, actor_id, &path.server_id, &payload.name)
        .await
        .map(Json)
}

pub(crate) async fn create_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ServerPath>,
    Json(payload): Json<CreateChannelRequest>,
) -> Result<Json<ChannelCreatedResponse>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::create_channel(&state, actor_id, &path.server_id, payload)
        .await
        .map(Json)
}

/// Body maps capability keys to `true`, `false` or `null` (inherit).
pub(crate) async fn set_channel_override(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ChannelRolePath>,
    Json(payload): Json<BTreeMap<Capability, Option<bool>>>,
) -> Result<Json<Server>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::set_channel_override(
        &state,
        actor_id,
        &path.server_id,
        &path.channel_id,
        &path.role_id,
        &payload,
    )
    .await
    .map(Json)
}
