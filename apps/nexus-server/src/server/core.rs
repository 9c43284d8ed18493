use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use anyhow::anyhow;
use nexus_core::{ChannelId, ServerId, UserId};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::{
    errors::ActionFailure,
    realtime::{add_subscription, remove_subscription},
    store::ServerStore,
};

pub const DEFAULT_JSON_BODY_LIMIT_BYTES: usize = 1_048_576;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BROADCAST_QUEUE: usize = 256;
pub const DEFAULT_MAX_BROADCAST_BYTES: usize = nexus_protocol::MAX_EVENT_BYTES;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_SERVERS: usize = 10_000;
pub(crate) const MAX_WEBHOOKS_PER_CHANNEL: usize = 10;
pub(crate) const MAX_WEBHOOK_URL_CHARS: usize = 2048;
pub(crate) const MAX_MESSAGE_CHARS: usize = 2000;
pub(crate) const METRICS_TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub(crate) static METRICS_STATE: OnceLock<MetricsState> = OnceLock::new();

#[derive(Default)]
pub(crate) struct MetricsState {
    pub(crate) authorization_denials: Mutex<HashMap<(&'static str, &'static str), u64>>,
    pub(crate) broadcast_events: Mutex<HashMap<&'static str, u64>>,
    pub(crate) broadcast_dropped: Mutex<HashMap<&'static str, u64>>,
    pub(crate) outbound_url_blocked: Mutex<HashMap<&'static str, u64>>,
    pub(crate) webhook_deliveries: Mutex<HashMap<&'static str, u64>>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub broadcast_queue: usize,
    pub max_broadcast_bytes: usize,
    pub webhook_timeout: Duration,
    pub max_servers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_JSON_BODY_LIMIT_BYTES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            broadcast_queue: DEFAULT_BROADCAST_QUEUE,
            max_broadcast_bytes: DEFAULT_MAX_BROADCAST_BYTES,
            webhook_timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            max_servers: DEFAULT_MAX_SERVERS,
        }
    }
}

impl AppConfig {
    /// # Errors
    /// Returns an error when a limit is zero or exceeds the protocol maximum.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_broadcast_bytes == 0
            || self.max_broadcast_bytes > nexus_protocol::MAX_EVENT_BYTES
        {
            return Err(anyhow!(
                "broadcast event limit must be between 1 and {} bytes",
                nexus_protocol::MAX_EVENT_BYTES
            ));
        }
        if self.broadcast_queue == 0 {
            return Err(anyhow!("broadcast queue must hold at least 1 event"));
        }
        if self.max_servers == 0 {
            return Err(anyhow!("max servers must be at least 1 server"));
        }
        if self.webhook_timeout.is_zero() {
            return Err(anyhow!("webhook timeout must be non-zero"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) broadcast_queue: usize,
    pub(crate) max_broadcast_bytes: usize,
    pub(crate) max_servers: usize,
}

/// A live broadcast subscriber: one connected client of one member.
#[derive(Debug, Clone)]
pub(crate) struct Subscriber {
    pub(crate) user_id: UserId,
    pub(crate) sender: mpsc::Sender<String>,
}

pub(crate) type ServerSubscriptions = HashMap<Uuid, Subscriber>;

#[derive(Debug, Clone)]
pub(crate) struct WebhookRecord {
    pub(crate) id: String,
    pub(crate) channel_id: ChannelId,
    pub(crate) url: String,
    pub(crate) created_by: UserId,
}

/// Receiving half handed to the connection gateway.
#[derive(Debug)]
pub struct Subscription {
    pub connection_id: Uuid,
    pub receiver: mpsc::Receiver<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub(crate) store: ServerStore,
    pub(crate) subscriptions: Arc<RwLock<HashMap<ServerId, ServerSubscriptions>>>,
    pub(crate) webhooks: Arc<RwLock<HashMap<ServerId, Vec<WebhookRecord>>>>,
    pub(crate) http: reqwest::Client,
    pub(crate) runtime: Arc<RuntimeConfig>,
}

impl AppState {
    /// # Errors
    /// Returns an error if the configuration is invalid or the outbound HTTP
    /// client cannot be built.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.webhook_timeout)
            .build()
            .map_err(|e| anyhow!("webhook http client init failed: {e}"))?;

        Ok(Self {
            store: ServerStore::default(),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            webhooks: Arc::new(RwLock::new(HashMap::new())),
            http,
            runtime: Arc::new(RuntimeConfig {
                broadcast_queue: config.broadcast_queue,
                max_broadcast_bytes: config.max_broadcast_bytes,
                max_servers: config.max_servers,
            }),
        })
    }

    /// Registers a broadcast receiver for `user_id` on `server_id`.
    ///
    /// # Errors
    /// [`ActionFailure::NotFound`] for unknown servers and
    /// [`ActionFailure::Forbidden`] when `user_id` is not a member.
    pub async fn subscribe(
        &self,
        server_id: &str,
        user_id: UserId,
    ) -> Result<Subscription, ActionFailure> {
        let entry = self.store.get(server_id).await.ok_or(ActionFailure::NotFound)?;
        // Checked under the server lock; removal prunes subscriptions under it too.
        let guard = entry.lock().await;
        let server = guard.as_ref().ok_or(ActionFailure::NotFound)?;
        if !server.is_member(user_id) {
            return Err(ActionFailure::Forbidden);
        }
        let (connection_id, receiver) = add_subscription(self, server_id, user_id).await;
        drop(guard);
        Ok(Subscription {
            connection_id,
            receiver,
        })
    }

    pub async fn unsubscribe(&self, server_id: &str, connection_id: Uuid) {
        remove_subscription(self, server_id, connection_id).await;
    }
}
