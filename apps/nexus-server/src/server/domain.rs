//! Privileged actions. Each one locks a single server aggregate and runs
//! authorize → mutate → broadcast to completion before releasing it.

use std::collections::BTreeMap;

use nexus_core::{
    authorize_channel_override, authorize_member_moderation, authorize_owner_only,
    authorize_role_assignment, authorize_role_create, authorize_role_delete,
    authorize_role_update, highest_position, notification_targets, parse_channel_links,
    parse_mentions, require_capability, resolve, Capability, ChannelName, Denial, RoleUpdate,
    Server, ServerName, UserId, Username,
};
use nexus_protocol::BroadcastEvent;
use tokio::sync::OwnedMutexGuard;
use ulid::Ulid;

use super::{
    core::{AppState, WebhookRecord, MAX_MESSAGE_CHARS},
    errors::ActionFailure,
    metrics::record_authorization_denial,
    realtime::{
        broadcast_channel_event, broadcast_server_event, broadcast_server_snapshot,
        drop_server_subscriptions, encode_snapshot,
    },
    types::{
        CategoryCreatedResponse, ChannelCreatedResponse, CreateChannelRequest, CreateRoleRequest,
        MessageResponse, PermissionsResponse, RoleCreatedResponse, ServerDeletedEvent,
        WebhookResponse,
    },
    webhooks::{
        channel_webhooks, drop_server_webhooks, register_webhook, spawn_webhook_deliveries,
        WebhookMessagePayload,
    },
};

type ServerGuard = OwnedMutexGuard<Option<Server>>;

async fn lock_server(state: &AppState, server_id: &str) -> Result<ServerGuard, ActionFailure> {
    let slot = state
        .store
        .get(server_id)
        .await
        .ok_or(ActionFailure::NotFound)?;
    let guard = slot.lock_owned().await;
    if guard.is_none() {
        return Err(ActionFailure::NotFound);
    }
    Ok(guard)
}

fn loaded(guard: &mut ServerGuard) -> Result<&mut Server, ActionFailure> {
    guard.as_mut().ok_or(ActionFailure::NotFound)
}

fn denied(action: &'static str, actor_id: UserId, server: &Server, denial: Denial) -> ActionFailure {
    record_authorization_denial(action, denial.code());
    tracing::warn!(
        event = "authz.denied",
        action,
        server_id = server.id(),
        actor_id = %actor_id,
        reason = denial.code(),
        detail = %denial
    );
    ActionFailure::Denied(denial)
}

/// Encodes the post-mutation snapshot. When it cannot be broadcast the
/// aggregate is restored to `previous` and the action fails.
fn snapshot_or_rollback(
    state: &AppState,
    server: &mut Server,
    previous: Server,
    event: BroadcastEvent,
) -> Result<String, ActionFailure> {
    encode_snapshot(state, server, event).inspect_err(|failure| {
        *server = previous;
        tracing::warn!(
            event = "servers.mutation.rolled_back",
            server_id = server.id(),
            event_type = event.as_str(),
            reason = failure.code()
        );
    })
}

pub(crate) async fn create_server(
    state: &AppState,
    actor_id: UserId,
    name: String,
    username: String,
) -> Result<Server, ActionFailure> {
    let name = ServerName::try_from(name)?;
    let username = Username::try_from(username)?;
    let server = Server::new(Ulid::new().to_string(), name, actor_id, username);
    let payload = encode_snapshot(state, &server, BroadcastEvent::ServerCreate)?;
    let slot = state
        .store
        .insert(server, state.runtime.max_servers)
        .await
        .ok_or(ActionFailure::LimitReached)?;

    let mut guard = slot.lock_owned().await;
    let server = loaded(&mut guard)?;
    broadcast_server_snapshot(state, server, BroadcastEvent::ServerCreate, &payload).await;
    tracing::info!(
        event = "servers.created",
        server_id = server.id(),
        owner_id = %actor_id
    );
    Ok(server.clone())
}

pub(crate) async fn delete_server(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
) -> Result<(), ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    authorize_owner_only(actor_id, server)
        .map_err(|denial| denied("server_delete", actor_id, server, denial))?;

    broadcast_server_event(
        state,
        server_id,
        BroadcastEvent::ServerDelete,
        &ServerDeletedEvent {
            server_id: server_id.to_owned(),
        },
    )
    .await;
    guard.take();
    state.store.remove(server_id).await;
    drop_server_subscriptions(state, server_id).await;
    drop_server_webhooks(state, server_id).await;
    drop(guard);

    tracing::info!(event = "servers.deleted", server_id, actor_id = %actor_id);
    Ok(())
}

/// Invite redemption happens upstream; joining is idempotent.
pub(crate) async fn join_server(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    username: String,
) -> Result<Server, ActionFailure> {
    let username = Username::try_from(username)?;
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    let previous = server.clone();
    if server.add_member(actor_id, username) {
        let payload = snapshot_or_rollback(state, server, previous, BroadcastEvent::MemberJoin)?;
        broadcast_server_snapshot(state, server, BroadcastEvent::MemberJoin, &payload).await;
        tracing::info!(event = "members.joined", server_id, user_id = %actor_id);
    }
    Ok(server.clone())
}

/// Leaving (target is the actor) or kicking another member.
pub(crate) async fn remove_member(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    target_id: UserId,
) -> Result<Server, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    if target_id != actor_id {
        authorize_member_moderation(actor_id, server, target_id, Capability::KickMembers)
            .map_err(|denial| denied("member_kick", actor_id, server, denial))?;
    }
    let previous = server.clone();
    server.remove_member(target_id)?;
    let payload = snapshot_or_rollback(state, server, previous, BroadcastEvent::MemberLeave)?;
    broadcast_server_snapshot(state, server, BroadcastEvent::MemberLeave, &payload).await;
    tracing::info!(
        event = "members.removed",
        server_id,
        user_id = %target_id,
        actor_id = %actor_id,
        kicked = target_id != actor_id
    );
    Ok(server.clone())
}

pub(crate) async fn create_role(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    request: CreateRoleRequest,
) -> Result<RoleCreatedResponse, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    authorize_role_create(actor_id, server, request.position)
        .map_err(|denial| denied("role_create", actor_id, server, denial))?;
    let previous = server.clone();
    let role_id = server.create_role(
        &request.name,
        request.color,
        request.position,
        request.permissions,
    )?;
    let payload = snapshot_or_rollback(state, server, previous, BroadcastEvent::RoleCreate)?;
    broadcast_server_snapshot(state, server, BroadcastEvent::RoleCreate, &payload).await;
    tracing::info!(event = "roles.created", server_id, role_id = %role_id, actor_id = %actor_id);
    Ok(RoleCreatedResponse {
        role_id,
        server: server.clone(),
    })
}

pub(crate) async fn update_role(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    role_id: &str,
    update: RoleUpdate,
) -> Result<Server, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    authorize_role_update(actor_id, server, role_id)
        .map_err(|denial| denied("role_update", actor_id, server, denial))?;
    let previous = server.clone();
    server.update_role(role_id, update)?;
    let payload = snapshot_or_rollback(state, server, previous, BroadcastEvent::RoleUpdate)?;
    broadcast_server_snapshot(state, server, BroadcastEvent::RoleUpdate, &payload).await;
    tracing::info!(event = "roles.updated", server_id, role_id, actor_id = %actor_id);
    Ok(server.clone())
}

pub(crate) async fn delete_role(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    role_id: &str,
) -> Result<Server, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    authorize_role_delete(actor_id, server, role_id)
        .map_err(|denial| denied("role_delete", actor_id, server, denial))?;
    let previous = server.clone();
    server.delete_role(role_id)?;
    let payload = snapshot_or_rollback(state, server, previous, BroadcastEvent::RoleDelete)?;
    broadcast_server_snapshot(state, server, BroadcastEvent::RoleDelete, &payload).await;
    tracing::info!(event = "roles.deleted", server_id, role_id, actor_id = %actor_id);
    Ok(server.clone())
}

pub(crate) async fn set_member_role(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    target_id: UserId,
    role_id: &str,
    assign: bool,
) -> Result<Server, ActionFailure> {
    let action = if assign { "role_assign" } else { "role_unassign" };
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    authorize_role_assignment(actor_id, server, target_id, role_id)
        .map_err(|denial| denied(action, actor_id, server, denial))?;
    let previous = server.clone();
    let changed = if assign {
        server.assign_role(target_id, role_id)?
    } else {
        server.unassign_role(target_id, role_id)?
    };
    if changed {
        let payload =
            snapshot_or_rollback(state, server, previous, BroadcastEvent::MemberRolesUpdate)?;
        broadcast_server_snapshot(state, server, BroadcastEvent::MemberRolesUpdate, &payload)
            .await;
        tracing::info!(
            event = "members.roles_updated",
            server_id,
            user_id = %target_id,
            role_id,
            assigned = assign,
            actor_id = %actor_id
        );
    }
    Ok(server.clone())
}

pub(crate) async fn create_category(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    name: &str,
) -> Result<CategoryCreatedResponse, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    require_capability(actor_id, server, None, Capability::ManageChannels)
        .map_err(|denial| denied("category_create", actor_id, server, denial))?;
    let previous = server.clone();
    let category_id = server.create_category(name)?;
    let payload = snapshot_or_rollback(state, server, previous, BroadcastEvent::ServerUpdate)?;
    broadcast_server_snapshot(state, server, BroadcastEvent::ServerUpdate, &payload).await;
    Ok(CategoryCreatedResponse {
        category_id,
        server: server.clone(),
    })
}

pub(crate) async fn create_channel(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    request: CreateChannelRequest,
) -> Result<ChannelCreatedResponse, ActionFailure> {
    let name = ChannelName::try_from(request.name)?;
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    require_capability(actor_id, server, None, Capability::ManageChannels)
        .map_err(|denial| denied("channel_create", actor_id, server, denial))?;
    let previous = server.clone();
    let channel_id = server.create_channel(name, request.kind, request.category_id)?;
    let payload = snapshot_or_rollback(state, server, previous, BroadcastEvent::ChannelCreate)?;
    broadcast_server_snapshot(state, server, BroadcastEvent::ChannelCreate, &payload).await;
    tracing::info!(
        event = "channels.created",
        server_id,
        channel_id = %channel_id,
        actor_id = %actor_id
    );
    Ok(ChannelCreatedResponse {
        channel_id,
        server: server.clone(),
    })
}

pub(crate) async fn set_channel_override(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    channel_id: &str,
    role_id: &str,
    patch: &BTreeMap<Capability, Option<bool>>,
) -> Result<Server, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    authorize_channel_override(actor_id, server, channel_id, role_id)
        .map_err(|denial| denied("channel_override", actor_id, server, denial))?;
    let previous = server.clone();
    server.set_channel_override(channel_id, role_id, patch)?;
    let event = BroadcastEvent::ChannelOverridesUpdate;
    let payload = snapshot_or_rollback(state, server, previous, event)?;
    broadcast_server_snapshot(state, server, event, &payload).await;
    tracing::info!(
        event = "channels.overrides_updated",
        server_id,
        channel_id,
        role_id,
        actor_id = %actor_id
    );
    Ok(server.clone())
}

/// Capability mask for UI rendering. Read-only, so any caller may ask; the
/// resolver degrades outsiders to the `everyone` permissions.
pub(crate) async fn effective_permissions(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    channel_id: Option<String>,
) -> Result<PermissionsResponse, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    let permissions = resolve(actor_id, Some(server), channel_id.as_deref());
    Ok(PermissionsResponse {
        server_id: server_id.to_owned(),
        channel_id,
        user_id: actor_id,
        rank: highest_position(actor_id, server).to_string(),
        permissions,
    })
}

pub(crate) async fn post_message(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    channel_id: &str,
    content: String,
) -> Result<MessageResponse, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    require_capability(actor_id, server, Some(channel_id), Capability::SendMessages)
        .map_err(|denial| denied("message_create", actor_id, server, denial))?;
    if content.trim().is_empty() || content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ActionFailure::InvalidRequest);
    }

    let mentions = parse_mentions(&content, Some(server));
    let channel_links = parse_channel_links(&content, Some(server), server_id);
    let notifications = notification_targets(&mentions, actor_id, server, Some(channel_id));
    if notifications.everyone_suppressed {
        tracing::info!(
            event = "messages.everyone_suppressed",
            server_id,
            channel_id,
            author_id = %actor_id
        );
    }

    let hooks = channel_webhooks(state, server_id, channel_id).await;
    let message = MessageResponse {
        message_id: Ulid::new().to_string(),
        server_id: server_id.to_owned(),
        channel_id: channel_id.to_owned(),
        author_id: actor_id,
        content,
        mentions,
        channel_links,
        notifications,
        webhooks_queued: hooks.len(),
    };
    broadcast_channel_event(
        state,
        server,
        channel_id,
        BroadcastEvent::MessageCreate,
        &message,
    )
    .await;
    drop(guard);

    spawn_webhook_deliveries(
        state,
        hooks,
        WebhookMessagePayload {
            server_id: message.server_id.clone(),
            channel_id: message.channel_id.clone(),
            message_id: message.message_id.clone(),
            author_id: actor_id,
            content: message.content.clone(),
        },
    );
    Ok(message)
}

pub(crate) async fn create_webhook(
    state: &AppState,
    actor_id: UserId,
    server_id: &str,
    channel_id: &str,
    url: String,
) -> Result<WebhookResponse, ActionFailure> {
    let mut guard = lock_server(state, server_id).await?;
    let server = loaded(&mut guard)?;
    require_capability(actor_id, server, Some(channel_id), Capability::ManageWebhooks)
        .map_err(|denial| denied("webhook_create", actor_id, server, denial))?;

    let record = WebhookRecord {
        id: Ulid::new().to_string(),
        channel_id: channel_id.to_owned(),
        url,
        created_by: actor_id,
    };
    let response = WebhookResponse {
        webhook_id: record.id.clone(),
        channel_id: record.channel_id.clone(),
        url: record.url.clone(),
    };
    register_webhook(state, server_id, record).await?;
    drop(guard);
    Ok(response)
}
