use axum::{http::StatusCode, response::IntoResponse, Json};
use nexus_core::{Denial, DomainError};

use super::types::ErrorResponse;

/// Failure of an HTTP action, rendered as `{"error": "<code>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionFailure {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    Denied(Denial),
    EveryoneRoleProtected,
    OwnerCannotLeave,
    NotFound,
    UnsafeUrl,
    LimitReached,
    Internal,
}

impl ActionFailure {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden | Self::Denied(Denial::NotMember) => "forbidden",
            Self::Denied(denial) => denial.code(),
            Self::EveryoneRoleProtected => "everyone_role_protected",
            Self::OwnerCannotLeave => "owner_cannot_leave",
            Self::NotFound => "not_found",
            Self::UnsafeUrl => "unsafe_url",
            Self::LimitReached => "limit_reached",
            Self::Internal => "internal_error",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            Self::InvalidRequest | Self::UnsafeUrl => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Denied(
                Denial::UnknownRole | Denial::UnknownMember | Denial::UnknownChannel,
            )
            | Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden | Self::Denied(_) | Self::EveryoneRoleProtected => {
                StatusCode::FORBIDDEN
            }
            Self::OwnerCannotLeave | Self::LimitReached => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl From<DomainError> for ActionFailure {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::UnknownRole
            | DomainError::UnknownMember
            | DomainError::UnknownChannel
            | DomainError::UnknownCategory => Self::NotFound,
            DomainError::EveryoneRoleProtected => Self::EveryoneRoleProtected,
            DomainError::OwnerCannotLeave => Self::OwnerCannotLeave,
            DomainError::RoleLimitReached | DomainError::RoleAssignmentLimitReached => {
                Self::LimitReached
            }
            DomainError::InvalidName
            | DomainError::InvalidChannelKind
            | DomainError::InvalidUsername
            | DomainError::InvalidUserId
            | DomainError::InvalidColor
            | DomainError::InvalidPosition
            | DomainError::ReservedRoleName
            | DomainError::NotChannelScoped(_)
            | DomainError::InvalidOverrideTarget => Self::InvalidRequest,
        }
    }
}

impl IntoResponse for ActionFailure {
    fn into_response(self) -> axum::response::Response {
        (
            self.status(),
            Json(ErrorResponse {
                error: self.code(),
            }),
        )
            .into_response()
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .init();
}
