pub(crate) mod core;
pub(crate) mod domain;
pub(crate) mod errors;
pub(crate) mod handlers;
pub(crate) mod metrics;
pub(crate) mod realtime;
pub(crate) mod router;
pub(crate) mod store;
pub(crate) mod types;
pub(crate) mod webhooks;

pub use self::core::{
    AppConfig, AppState, Subscription, DEFAULT_BROADCAST_QUEUE, DEFAULT_JSON_BODY_LIMIT_BYTES,
    DEFAULT_MAX_BROADCAST_BYTES, DEFAULT_MAX_SERVERS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_WEBHOOK_TIMEOUT_SECS,
};
pub use errors::{init_tracing, ActionFailure};
pub use router::{build_router, build_router_with_state};
