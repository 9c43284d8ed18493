#![forbid(unsafe_code)]

mod server;

pub use server::{
    build_router, build_router_with_state, init_tracing, ActionFailure, AppConfig, AppState,
    Subscription, DEFAULT_BROADCAST_QUEUE, DEFAULT_JSON_BODY_LIMIT_BYTES,
    DEFAULT_MAX_BROADCAST_BYTES, DEFAULT_MAX_SERVERS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_WEBHOOK_TIMEOUT_SECS,
};
