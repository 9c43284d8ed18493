use std::{collections::HashMap, sync::Arc};

use nexus_core::{Server, ServerId};
use tokio::sync::{Mutex, RwLock};

/// One server aggregate behind its own lock. `None` once the server is
/// deleted, so holders of a stale handle observe the deletion.
pub(crate) type ServerSlot = Arc<Mutex<Option<Server>>>;

/// Canonical in-memory server aggregates.
///
/// The outer lock only guards the id → slot map. Every check → mutate →
/// broadcast sequence runs while holding exactly one slot lock, which
/// serializes mutations per server while other servers proceed in parallel.
#[derive(Clone, Default)]
pub(crate) struct ServerStore {
    servers: Arc<RwLock<HashMap<ServerId, ServerSlot>>>,
}

impl ServerStore {
    pub(crate) async fn get(&self, server_id: &str) -> Option<ServerSlot> {
        self.servers.read().await.get(server_id).cloned()
    }

    /// Inserts a new aggregate unless `max_servers` is reached.
    pub(crate) async fn insert(&self, server: Server, max_servers: usize) -> Option<ServerSlot> {
        let mut servers = self.servers.write().await;
        if servers.len() >= max_servers {
            return None;
        }
        let server_id = server.id().to_owned();
        let slot = Arc::new(Mutex::new(Some(server)));
        servers.insert(server_id, Arc::clone(&slot));
        Some(slot)
    }

    pub(crate) async fn remove(&self, server_id: &str) -> Option<ServerSlot> {
        self.servers.write().await.remove(server_id)
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.servers.read().await.len()
    }
}
