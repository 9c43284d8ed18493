use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use nexus_core::{RoleUpdate, Server};
use serde::Deserialize;

use super::{actor_from_headers, parse_user_id, servers::ServerPath};
use crate::server::{
    core::AppState,
    domain,
    errors::ActionFailure,
    types::{CreateRoleRequest, RoleCreatedResponse},
};

#[derive(Debug, Deserialize)]
pub(crate) struct RolePath {
    server_id: String,
    role_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberRolePath {
    server_id: String,
    user_id: String,
    role_id: String,
}

pub(crate) async fn create_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<ServerPath>,
    Json(payload): Json<CreateRoleRequest>,
) -> Result<Json<RoleCreatedResponse>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::create_role(&state, actor_id, &path.server_id, payload)
        .await
        .map(Json)
}

pub(crate) async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<RolePath>,
    Json(payload): Json<RoleUpdate>,
) -> Result<Json<Server>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::update_role(&state, actor_id, &path.server_id, &path.role_id, payload)
        .await
        .map(Json)
}

pub(crate) async fn delete_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<RolePath>,
) -> Result<Json<Server>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    domain::delete_role(&state, actor_id, &path.server_id, &path.role_id)
        .await
        .map(Json)
}

pub(crate) async fn assign_member_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<MemberRolePath>,
) -> Result<Json<Server>, ActionFailure> {
    set_member_role(state, headers, path, true).await
}

pub(crate) async fn unassign_member_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(path): Path<MemberRolePath>,
) -> Result<Json<Server>, ActionFailure> {
    set_member_role(state, headers, path, false).await
}

async fn set_member_role(
    state: AppState,
    headers: HeaderMap,
    path: MemberRolePath,
    assign: bool,
) -> Result<Json<Server>, ActionFailure> {
    let actor_id = actor_from_headers(&headers)?;
    let target_id = parse_user_id(path.user_id)?;
    domain::set_member_role(
        &state,
        actor_id,
        &path.server_id,
        target_id,
        &path.role_id,
        assign,
    )
    .await
    .map(Json)
}
