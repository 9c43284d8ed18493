use nexus_core::{is_private_url, UserId};
use serde::Serialize;
use url::Url;

use super::{
    core::{AppState, WebhookRecord, MAX_WEBHOOKS_PER_CHANNEL, MAX_WEBHOOK_URL_CHARS},
    errors::ActionFailure,
    metrics::{record_outbound_url_blocked, record_webhook_delivery},
};

pub(crate) const SURFACE_WEBHOOK_REGISTER: &str = "webhook_register";
pub(crate) const SURFACE_WEBHOOK_DELIVERY: &str = "webhook_delivery";

/// Body posted to every outgoing webhook of a channel.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct WebhookMessagePayload {
    pub(crate) server_id: String,
    pub(crate) channel_id: String,
    pub(crate) message_id: String,
    pub(crate) author_id: UserId,
    pub(crate) content: String,
}

/// Rejects URLs that must never be contacted by the server.
pub(crate) fn ensure_public_url(url: &str, surface: &'static str) -> Result<(), ActionFailure> {
    if url.is_empty() || url.len() > MAX_WEBHOOK_URL_CHARS {
        return Err(ActionFailure::InvalidRequest);
    }
    if is_private_url(url) {
        record_outbound_url_blocked(surface);
        tracing::warn!(
            event = "outbound.url_blocked",
            surface,
            host = %loggable_host(url)
        );
        return Err(ActionFailure::UnsafeUrl);
    }
    Ok(())
}

/// Host of `url` for log fields. Path, query and userinfo are never logged.
fn loggable_host(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .unwrap_or_else(|| String::from("<unparsed>"))
}

pub(crate) async fn register_webhook(
    state: &AppState,
    server_id: &str,
    record: WebhookRecord,
) -> Result<(), ActionFailure> {
    ensure_public_url(&record.url, SURFACE_WEBHOOK_REGISTER)?;
    let mut webhooks = state.webhooks.write().await;
    let hooks = webhooks.entry(server_id.to_owned()).or_default();
    let in_channel = hooks
        .iter()
        .filter(|hook| hook.channel_id == record.channel_id)
        .count();
    if in_channel >= MAX_WEBHOOKS_PER_CHANNEL {
        return Err(ActionFailure::LimitReached);
    }
    tracing::info!(
        event = "webhooks.registered",
        server_id,
        channel_id = %record.channel_id,
        webhook_id = %record.id,
        created_by = %record.created_by
    );
    hooks.push(record);
    Ok(())
}

pub(crate) async fn channel_webhooks(
    state: &AppState,
    server_id: &str,
    channel_id: &str,
) -> Vec<WebhookRecord> {
    state
        .webhooks
        .read()
        .await
        .get(server_id)
        .map(|hooks| {
            hooks
                .iter()
                .filter(|hook| hook.channel_id == channel_id)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) async fn drop_server_webhooks(state: &AppState, server_id: &str) {
    state.webhooks.write().await.remove(server_id);
}

/// Spawns one delivery per webhook. Each URL is checked again before the
/// request is made; redirects are never followed.
pub(crate) fn spawn_webhook_deliveries(
    state: &AppState,
    hooks: Vec<WebhookRecord>,
    payload: WebhookMessagePayload,
) {
    for hook in hooks {
        let client = state.http.clone();
        let payload = payload.clone();
        tokio::spawn(async move {
            deliver_webhook(&client, &hook, &payload).await;
        });
    }
}

async fn deliver_webhook(
    client: &reqwest::Client,
    hook: &WebhookRecord,
    payload: &WebhookMessagePayload,
) {
    if ensure_public_url(&hook.url, SURFACE_WEBHOOK_DELIVERY).is_err() {
        record_webhook_delivery("blocked");
        return;
    }

    match client.post(&hook.url).json(payload).send().await {
        Ok(response) if response.status().is_success() => {
            record_webhook_delivery("delivered");
            tracing::debug!(
                event = "webhooks.delivery.succeeded",
                webhook_id = %hook.id,
                status = response.status().as_u16()
            );
        }
        Ok(response) => {
            record_webhook_delivery("rejected");
            tracing::warn!(
                event = "webhooks.delivery.rejected",
                webhook_id = %hook.id,
                status = response.status().as_u16()
            );
        }
        Err(error) => {
            record_webhook_delivery("failed");
            tracing::warn!(
                event = "webhooks.delivery.failed",
                webhook_id = %hook.id,
                timeout = error.is_timeout(),
                %error
            );
        }
    }
}
