use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use nexus_core::Server;
use serde::Deserialize;

use super::{actor_from_headers, parse_user_id};
use crate::server::{
    core::AppState,
    domain,
    errors::ActionFailure,
    types::{CreateServerRequest, JoinServerRequest, PermissionsQuery, PermissionsResponse},
};

#[derive(Debug, Deserialize)]
pub(crate) struct ServerPath {
    pub(crate) server_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberPath {
    server_id: String,
    user_id: String,
}

pub(crate) async fn create_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateServerRequest>,
) -> Result<Json<Server>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::create_server(&state, actor_id, payload.name, payload.username)
        .await
        .map(Json)
}

pub(crate) async fn delete_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ServerPath>,
) -> Result<StatusCode, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::delete_server(&state, actor_id, &path.server_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn join_server(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ServerPath>,
    Json(payload): Json<JoinServerRequest>,
) -> Result<Json<Server>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::join_server(&state, actor_id, &path.server_id, payload.username)
        .await
        .map(Json)
}

pub(crate) async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<MemberPath>,
) -> Result<Json<Server>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    let target_id = parse_user_id(path.user_id)?;
    domain::remove_member(&state, actor_id, &path.server_id, target_id)
        .await
        .map(Json)
}

pub(crate) async fn get_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ServerPath>,
    Query(query): Query<PermissionsQuery>,
) -> Result<Json<PermissionsResponse>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::effective_permissions(&state, actor_id, &path.server_id, query.channel_id)
        .await
        .map(Json)
}
