use nexus_core::{has_capability, Capability, Server, UserId};
use nexus_protocol::{encode_envelope, BroadcastEvent, EventScope, ProtocolError};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    core::{AppState, Subscriber},
    errors::ActionFailure,
    metrics::{
        record_broadcast_delivered, record_broadcast_dropped, BROADCAST_DROP_REASON_CLOSED,
        BROADCAST_DROP_REASON_FULL_QUEUE, BROADCAST_DROP_REASON_OVERSIZED,
        BROADCAST_DROP_REASON_SERIALIZE_ERROR,
    },
};

pub(crate) async fn add_subscription(
    state: &AppState,
    server_id: &str,
    user_id: UserId,
) -> (Uuid, mpsc::Receiver<String>) {
    let (sender, receiver) = mpsc::channel(state.runtime.broadcast_queue);
    let connection_id = Uuid::new_v4();
    state
        .subscriptions
        .write()
        .await
        .entry(server_id.to_owned())
        .or_default()
        .insert(connection_id, Subscriber { user_id, sender });
    (connection_id, receiver)
}

pub(crate) async fn remove_subscription(state: &AppState, server_id: &str, connection_id: Uuid) {
    let mut subscriptions = state.subscriptions.write().await;
    if let Some(listeners) = subscriptions.get_mut(server_id) {
        listeners.remove(&connection_id);
        if listeners.is_empty() {
            subscriptions.remove(server_id);
        }
    }
}

/// Drops every subscriber of a deleted server. Receivers observe a closed
/// channel once their queue drains.
pub(crate) async fn drop_server_subscriptions(state: &AppState, server_id: &str) {
    state.subscriptions.write().await.remove(server_id);
}

/// Closes subscriptions held by users who are no longer members.
pub(crate) async fn prune_non_member_subscriptions(state: &AppState, server: &Server) {
    let mut subscriptions = state.subscriptions.write().await;
    let Some(listeners) = subscriptions.get_mut(server.id()) else {
        return;
    };
    let before = listeners.len();
    listeners.retain(|_, subscriber| server.is_member(subscriber.user_id));
    let closed = before - listeners.len();
    if listeners.is_empty() {
        subscriptions.remove(server.id());
    }
    drop(subscriptions);

    if closed > 0 {
        tracing::info!(
            event = "broadcast.subscriptions.closed",
            server_id = server.id(),
            closed
        );
    }
}

/// Encodes the full aggregate for `event`.
///
/// # Errors
/// [`ActionFailure::LimitReached`] when the snapshot exceeds the broadcast
/// limit, [`ActionFailure::Internal`] when it cannot be serialized. Callers
/// roll the mutation back so no committed state goes unbroadcast.
pub(crate) fn encode_snapshot(
    state: &AppState,
    server: &Server,
    event: BroadcastEvent,
) -> Result<String, ActionFailure> {
    encode(state, event, server).map_err(|error| match error {
        ProtocolError::OversizedPayload { .. } => ActionFailure::LimitReached,
        ProtocolError::Serialize => ActionFailure::Internal,
    })
}

/// Pushes an encoded snapshot to every subscriber of the server, then closes
/// subscriptions of users the mutation removed.
pub(crate) async fn broadcast_server_snapshot(
    state: &AppState,
    server: &Server,
    event: BroadcastEvent,
    payload: &str,
) -> usize {
    let delivered =
        dispatch_server_payload(state, server.id(), Some(server), None, event, payload).await;
    prune_non_member_subscriptions(state, server).await;
    delivered
}

/// Pushes a channel event to subscribers who can currently view `channel_id`.
pub(crate) async fn broadcast_channel_event<T: Serialize>(
    state: &AppState,
    server: &Server,
    channel_id: &str,
    event: BroadcastEvent,
    data: &T,
) -> usize {
    let Ok(payload) = encode(state, event, data) else {
        return 0;
    };
    dispatch_server_payload(
        state,
        server.id(),
        Some(server),
        Some(channel_id),
        event,
        &payload,
    )
    .await
}

pub(crate) async fn broadcast_server_event<T: Serialize>(
    state: &AppState,
    server_id: &str,
    event: BroadcastEvent,
    data: &T,
) -> usize {
    let Ok(payload) = encode(state, event, data) else {
        return 0;
    };
    dispatch_server_payload(state, server_id, None, None, event, &payload).await
}

fn encode<T: Serialize>(
    state: &AppState,
    event: BroadcastEvent,
    data: &T,
) -> Result<String, ProtocolError> {
    encode_envelope(event, data, state.runtime.max_broadcast_bytes).inspect_err(|error| {
        match error {
            ProtocolError::OversizedPayload { max, actual } => {
                record_broadcast_dropped(BROADCAST_DROP_REASON_OVERSIZED);
                tracing::warn!(
                    event = "broadcast.event.oversized",
                    event_type = event.as_str(),
                    max,
                    actual
                );
            }
            ProtocolError::Serialize => {
                record_broadcast_dropped(BROADCAST_DROP_REASON_SERIALIZE_ERROR);
                tracing::error!(
                    event = "broadcast.event.serialize_failed",
                    event_type = event.as_str(),
                    %error
                );
            }
        }
    })
}

/// Whether `user_id` belongs to the audience of `event`. Channel-scoped
/// events need `viewChannel` there and fail closed without a channel.
fn admits(
    event: BroadcastEvent,
    server: Option<&Server>,
    channel_id: Option<&str>,
    user_id: UserId,
) -> bool {
    match event.scope() {
        EventScope::Server => true,
        EventScope::Channel => {
            channel_id.is_some()
                && has_capability(user_id, server, channel_id, Capability::ViewChannel)
        }
    }
}

/// Non-blocking fan-out. Closed receivers are removed; subscribers whose
/// queue is full are disconnected rather than awaited.
pub(crate) async fn dispatch_server_payload(
    state: &AppState,
    server_id: &str,
    server: Option<&Server>,
    channel_id: Option<&str>,
    event: BroadcastEvent,
    payload: &str,
) -> usize {
    let mut delivered = 0usize;
    let mut subscriptions = state.subscriptions.write().await;
    let Some(listeners) = subscriptions.get_mut(server_id) else {
        return 0;
    };

    let mut stale_connections = Vec::new();
    for (connection_id, subscriber) in listeners.iter() {
        if !admits(event, server, channel_id, subscriber.user_id) {
            continue;
        }
        match subscriber.sender.try_send(payload.to_owned()) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                record_broadcast_dropped(BROADCAST_DROP_REASON_CLOSED);
                stale_connections.push(*connection_id);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                record_broadcast_dropped(BROADCAST_DROP_REASON_FULL_QUEUE);
                tracing::warn!(
                    event = "broadcast.server_fanout.full_queue",
                    server_id,
                    connection_id = %connection_id,
                    user_id = %subscriber.user_id,
                    event_type = event.as_str()
                );
                stale_connections.push(*connection_id);
            }
        }
    }
    for connection_id in stale_connections {
        listeners.remove(&connection_id);
    }
    if listeners.is_empty() {
        subscriptions.remove(server_id);
    }
    drop(subscriptions);

    record_broadcast_delivered(event.as_str(), delivered);
    tracing::debug!(
        event = "broadcast.event.emit",
        server_id,
        event_type = event.as_str(),
        delivered
    );
    delivered
}
