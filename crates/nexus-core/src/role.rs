use serde::{Deserialize, Serialize};

use crate::{capability::CapabilitySet, server::Server, RoleId, UserId};

pub const EVERYONE_ROLE_ID: &str = "everyone";
pub const EVERYONE_ROLE_NAME: &str = "everyone";
pub const EVERYONE_POSITION: i32 = 0;

pub const MAX_SERVER_ROLES: usize = 64;
pub const MAX_MEMBER_ROLE_ASSIGNMENTS: usize = 16;
pub const MAX_ROLE_NAME_CHARS: usize = 32;
pub const MAX_ROLE_COLOR: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub color: u32,
    /// Hierarchy rank. Fixed at creation.
    pub position: i32,
    pub permissions: CapabilitySet,
}

impl Role {
    #[must_use]
    pub fn is_everyone(&self) -> bool {
        self.id == EVERYONE_ROLE_ID
    }
}

/// Mutable part of a role. Position is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub color: Option<u32>,
    pub permissions: Option<CapabilitySet>,
}

/// Seniority of a user inside one server.
///
/// Ordering: `NonMember` (-1) < `Position(n)` < `Owner` (+infinity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HierarchyRank {
    NonMember,
    Position(i32),
    Owner,
}

impl HierarchyRank {
    /// Strictly-greater seniority check against a role position.
    #[must_use]
    pub fn outranks(self, position: i32) -> bool {
        self > Self::Position(position)
    }
}

impl core::fmt::Display for HierarchyRank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NonMember => write!(f, "-1"),
            Self::Position(position) => write!(f, "{position}"),
            Self::Owner => write!(f, "+inf"),
        }
    }
}

#[must_use]
pub fn highest_position(user_id: UserId, server: &Server) -> HierarchyRank {
    if server.owner_id() == user_id {
        return HierarchyRank::Owner;
    }
    let Some(member) = server.member(user_id) else {
        return HierarchyRank::NonMember;
    };
    let position = member
        .role_ids
        .iter()
        .filter_map(|role_id| server.role(role_id))
        .map(|role| role.position)
        .fold(EVERYONE_POSITION, i32::max);
    HierarchyRank::Position(position)
}

pub(crate) fn validate_role_name(value: &str) -> Result<(), crate::DomainError> {
    crate::validate_name(value, 1, MAX_ROLE_NAME_CHARS)?;
    if value.eq_ignore_ascii_case(EVERYONE_ROLE_NAME) || value.eq_ignore_ascii_case("@everyone") {
        return Err(crate::DomainError::ReservedRoleName);
    }
    Ok(())
}

pub(crate) fn validate_role_color(color: u32) -> Result<(), crate::DomainError> {
    if color > MAX_ROLE_COLOR {
        return Err(crate::DomainError::InvalidColor);
    }
    Ok(())
}
