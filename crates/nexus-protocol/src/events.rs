use serde::{Deserialize, Serialize};

/// Audience of a broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    /// Every subscribed member of the server.
    Server,
    /// Subscribed members who can view the channel the event belongs to.
    Channel,
}

/// Events pushed to connected members after a mutation commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastEvent {
    ServerCreate,
    ServerUpdate,
    ServerDelete,
    MemberJoin,
    MemberLeave,
    MemberRolesUpdate,
    RoleCreate,
    RoleUpdate,
    RoleDelete,
    ChannelCreate,
    ChannelOverridesUpdate,
    MessageCreate,
}

impl BroadcastEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerCreate => "server_create",
            Self::ServerUpdate => "server_update",
            Self::ServerDelete => "server_delete",
            Self::MemberJoin => "member_join",
            Self::MemberLeave => "member_leave",
            Self::MemberRolesUpdate => "member_roles_update",
            Self::RoleCreate => "role_create",
            Self::RoleUpdate => "role_update",
            Self::RoleDelete => "role_delete",
            Self::ChannelCreate => "channel_create",
            Self::ChannelOverridesUpdate => "channel_overrides_update",
            Self::MessageCreate => "message_create",
        }
    }

    #[must_use]
    pub const fn scope(self) -> EventScope {
        match self {
            Self::MessageCreate => EventScope::Channel,
            _ => EventScope::Server,
        }
    }
}

impl std::fmt::Display for BroadcastEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
