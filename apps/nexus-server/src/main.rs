#![forbid(unsafe_code)]

use std::{net::SocketAddr, str::FromStr, time::Duration};

use nexus_server::{build_router, init_tracing, AppConfig};
use tokio::net::TcpListener;

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name).map_or_else(
        |_| Ok(default),
        |value| {
            value
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {name} value {value:?}: {e}"))
        },
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let defaults = AppConfig::default();
    let app_config = AppConfig {
        max_body_bytes: env_or("NEXUS_MAX_BODY_BYTES", defaults.max_body_bytes)?,
        request_timeout: Duration::from_secs(env_or(
            "NEXUS_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?),
        broadcast_queue: env_or("NEXUS_BROADCAST_QUEUE", defaults.broadcast_queue)?,
        max_broadcast_bytes: env_or("NEXUS_MAX_BROADCAST_BYTES", defaults.max_broadcast_bytes)?,
        webhook_timeout: Duration::from_secs(env_or(
            "NEXUS_WEBHOOK_TIMEOUT_SECS",
            defaults.webhook_timeout.as_secs(),
        )?),
        max_servers: env_or("NEXUS_MAX_SERVERS", defaults.max_servers)?,
    };
    let app = build_router(&app_config)?;
    let addr = std::env::var("NEXUS_BIND_ADDR")
        .unwrap_or_else(|_| String::from("0.0.0.0:3000"))
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid NEXUS_BIND_ADDR: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "nexus-server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
