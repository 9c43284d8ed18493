pub(crate) mod channels;
pub(crate) mod messages;
pub(crate) mod roles;
pub(crate) mod servers;

use axum::http::HeaderMap;
use nexus_core::UserId;

use super::errors::ActionFailure;

/// Set by the upstream session proxy once the caller is authenticated.
pub(crate) const ACTOR_HEADER: &str = "x-nexus-user-id";

pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<UserId, ActionFailure> {
    let value = headers
        .get(ACTOR_HEADER)
        .ok_or(ActionFailure::Unauthorized)?
        .to_str()
        .map_err(|_| ActionFailure::Unauthorized)?;
    UserId::try_from(value.to_owned()).map_err(|_| ActionFailure::Unauthorized)
}

pub(crate) fn parse_user_id(value: String) -> Result<UserId, ActionFailure> {
    UserId::try_from(value).map_err(|_| ActionFailure::InvalidRequest)
}
