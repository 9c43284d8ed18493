#![forbid(unsafe_code)]

pub mod authorizer;
pub mod capability;
pub mod references;
pub mod resolver;
pub mod role;
pub mod server;
pub mod url_guard;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub use authorizer::{
    authorize_channel_override, authorize_member_moderation, authorize_owner_only,
    authorize_role_assignment, authorize_role_create, authorize_role_delete,
    authorize_role_update, can_manage, require_capability, Denial,
};
pub use capability::{
    all_capabilities, is_channel_scoped, Capability, CapabilityScope, CapabilitySet,
    ALL_CAPABILITIES, CHANNEL_CAPABILITIES,
};
pub use references::{
    notification_targets, parse_channel_links, parse_mentions, ChannelLink, ChannelLinks,
    MentionedRole, MentionedUser, Mentions, NotificationTargets,
};
pub use resolver::{has_capability, resolve};
pub use role::{highest_position, HierarchyRank, Role, RoleUpdate};
pub use server::{Category, Channel, ChannelOverride, Member, OverrideTarget, Server};
pub use url_guard::{is_private_ip, is_private_url};

pub type ServerId = String;
pub type RoleId = String;
pub type ChannelId = String;
pub type CategoryId = String;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("name is invalid")]
    InvalidName,
    #[error("channel kind is invalid")]
    InvalidChannelKind,
    #[error("username is invalid")]
    InvalidUsername,
    #[error("user id is invalid")]
    InvalidUserId,
    #[error("role color is invalid")]
    InvalidColor,
    #[error("role position must be above the everyone role")]
    InvalidPosition,
    #[error("role name is reserved")]
    ReservedRoleName,
    #[error("server role limit reached")]
    RoleLimitReached,
    #[error("member role assignment limit reached")]
    RoleAssignmentLimitReached,
    #[error("role not found")]
    UnknownRole,
    #[error("member not found")]
    UnknownMember,
    #[error("channel not found")]
    UnknownChannel,
    #[error("category not found")]
    UnknownCategory,
    #[error("the everyone role cannot be deleted, renamed or assigned")]
    EveryoneRoleProtected,
    #[error("the server owner cannot leave the server")]
    OwnerCannotLeave,
    #[error("capability {0:?} cannot be overridden per channel")]
    NotChannelScoped(Capability),
    #[error("override target is invalid")]
    InvalidOverrideTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(Ulid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for UserId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let parsed = Ulid::from_string(&value).map_err(|_| DomainError::InvalidUserId)?;
        Ok(Self(parsed))
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.to_string()
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_username(&value)?;
        Ok(Self(value))
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerName(String);

impl ServerName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value, 1, 64)?;
        Ok(Self(value))
    }
}

impl From<ServerName> for String {
    fn from(value: ServerName) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value, 1, 64)?;
        Ok(Self(value))
    }
}

impl From<ChannelName> for String {
    fn from(value: ChannelName) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Voice,
}

impl ChannelKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

impl TryFrom<String> for ChannelKind {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            _ => Err(DomainError::InvalidChannelKind),
        }
    }
}

pub(crate) fn validate_username(value: &str) -> Result<(), DomainError> {
    if !(3..=32).contains(&value.len()) {
        return Err(DomainError::InvalidUsername);
    }

    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Ok(());
    }

    Err(DomainError::InvalidUsername)
}

pub(crate) fn validate_name(value: &str, min: usize, max: usize) -> Result<(), DomainError> {
    if !(min..=max).contains(&value.len()) {
        return Err(DomainError::InvalidName);
    }

    if value.trim() != value {
        return Err(DomainError::InvalidName);
    }

    if value.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Ok(());
    }

    Err(DomainError::InvalidName)
}
