//! Authorization gates for privileged mutations.
//!
//! Every gate returns `Ok(())` or a [`Denial`] naming the reason, so callers
//! can surface a specific error instead of a generic failure.

use crate::{
    capability::Capability,
    resolver::resolve,
    role::{highest_position, HierarchyRank, Role, EVERYONE_ROLE_ID},
    server::Server,
    UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("actor is not a member of the server")]
    NotMember,
    #[error("missing capability {0:?}")]
    MissingCapability(Capability),
    #[error("role position {role_position} is not below actor rank {actor_rank}")]
    RoleHierarchy {
        role_position: i32,
        actor_rank: HierarchyRank,
    },
    #[error("target member outranks or equals the actor")]
    MemberHierarchy,
    #[error("the everyone role cannot be deleted")]
    EveryoneUndeletable,
    #[error("the everyone role is implied and cannot be assigned")]
    EveryoneUnassignable,
    #[error("only the server owner may do this")]
    OwnerOnly,
    #[error("the server owner cannot be targeted")]
    TargetIsOwner,
    #[error("role not found")]
    UnknownRole,
    #[error("member not found")]
    UnknownMember,
    #[error("channel not found")]
    UnknownChannel,
}

impl Denial {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotMember => "not_member",
            Self::MissingCapability(_) => "missing_capability",
            Self::RoleHierarchy { .. } | Self::MemberHierarchy => "role_hierarchy",
            Self::EveryoneUndeletable | Self::EveryoneUnassignable => "everyone_role_protected",
            Self::OwnerOnly => "owner_only",
            Self::TargetIsOwner => "target_is_owner",
            Self::UnknownRole | Self::UnknownMember | Self::UnknownChannel => "not_found",
        }
    }
}

/// Position-only management check.
///
/// The owner manages every role. Anyone else manages a role only when its
/// position is strictly below their highest position; `everyone` is never
/// manageable through this check.
#[must_use]
pub fn can_manage(actor_id: UserId, target_role: &Role, server: &Server) -> bool {
    let rank = highest_position(actor_id, server);
    if rank == HierarchyRank::Owner {
        return true;
    }
    if target_role.is_everyone() {
        return false;
    }
    rank.outranks(target_role.position)
}

/// # Errors
/// [`Denial::NotMember`] for outsiders, [`Denial::MissingCapability`] otherwise.
pub fn require_capability(
    actor_id: UserId,
    server: &Server,
    channel_id: Option<&str>,
    capability: Capability,
) -> Result<(), Denial> {
    if !server.is_member(actor_id) {
        return Err(Denial::NotMember);
    }
    if let Some(channel_id) = channel_id {
        if server.channel(channel_id).is_none() {
            return Err(Denial::UnknownChannel);
        }
    }
    if resolve(actor_id, Some(server), channel_id).contains(capability) {
        Ok(())
    } else {
        Err(Denial::MissingCapability(capability))
    }
}

/// # Errors
/// [`Denial::OwnerOnly`] unless the actor owns the server.
pub fn authorize_owner_only(actor_id: UserId, server: &Server) -> Result<(), Denial> {
    if server.owner_id() == actor_id {
        Ok(())
    } else {
        Err(Denial::OwnerOnly)
    }
}

/// A new role must sit strictly below the creator's own rank.
///
/// # Errors
/// Missing `manageRoles` or a position at/above the actor.
pub fn authorize_role_create(actor_id: UserId, server: &Server, position: i32) -> Result<(), Denial> {
    require_capability(actor_id, server, None, Capability::ManageRoles)?;
    let rank = highest_position(actor_id, server);
    if rank.outranks(position) {
        Ok(())
    } else {
        Err(Denial::RoleHierarchy {
            role_position: position,
            actor_rank: rank,
        })
    }
}

/// Editing `everyone` needs only `manageRoles`; other roles also need
/// [`can_manage`].
///
/// Only positions are checked, not the permissions being written. A
/// `manageRoles` holder may grant any capability, `admin` included, to a
/// role below them or to `everyone`, and so to themselves.
///
/// # Errors
/// Unknown role, missing capability or insufficient seniority.
pub fn authorize_role_update(actor_id: UserId, server: &Server, role_id: &str) -> Result<(), Denial> {
    let role = server.role(role_id).ok_or(Denial::UnknownRole)?;
    require_capability(actor_id, server, None, Capability::ManageRoles)?;
    if role.is_everyone() {
        return Ok(());
    }
    ensure_manageable(actor_id, server, role)
}

/// # Errors
/// Always [`Denial::EveryoneUndeletable`] for `everyone`, owner included.
pub fn authorize_role_delete(actor_id: UserId, server: &Server, role_id: &str) -> Result<(), Denial> {
    if role_id == EVERYONE_ROLE_ID {
        return Err(Denial::EveryoneUndeletable);
    }
    let role = server.role(role_id).ok_or(Denial::UnknownRole)?;
    require_capability(actor_id, server, None, Capability::ManageRoles)?;
    ensure_manageable(actor_id, server, role)
}

/// Adding or removing `role_id` on `target_id`.
///
/// # Errors
/// Missing `manageRoles`, unknown target, `everyone`, or insufficient seniority.
pub fn authorize_role_assignment(
    actor_id: UserId,
    server: &Server,
    target_id: UserId,
    role_id: &str,
) -> Result<(), Denial> {
    if role_id == EVERYONE_ROLE_ID {
        return Err(Denial::EveryoneUnassignable);
    }
    require_capability(actor_id, server, None, Capability::ManageRoles)?;
    if !server.is_member(target_id) {
        return Err(Denial::UnknownMember);
    }
    let role = server.role(role_id).ok_or(Denial::UnknownRole)?;
    ensure_manageable(actor_id, server, role)
}

/// Editing a channel override for `role_id`: `manageChannels` plus authority
/// over the role, except for `everyone`.
///
/// # Errors
/// Unknown channel/role, missing capability or insufficient seniority.
pub fn authorize_channel_override(
    actor_id: UserId,
    server: &Server,
    channel_id: &str,
    role_id: &str,
) -> Result<(), Denial> {
    let role = server.role(role_id).ok_or(Denial::UnknownRole)?;
    require_capability(actor_id, server, Some(channel_id), Capability::ManageChannels)?;
    if role.is_everyone() {
        return Ok(());
    }
    ensure_manageable(actor_id, server, role)
}

/// Kick/ban style actions against another member.
///
/// # Errors
/// Targeting the owner, missing `capability`, or a target at/above the actor.
pub fn authorize_member_moderation(
    actor_id: UserId,
    server: &Server,
    target_id: UserId,
    capability: Capability,
) -> Result<(), Denial> {
    if server.owner_id() == target_id {
        return Err(Denial::TargetIsOwner);
    }
    if !server.is_member(target_id) {
        return Err(Denial::UnknownMember);
    }
    require_capability(actor_id, server, None, capability)?;
    if highest_position(actor_id, server) > highest_position(target_id, server) {
        Ok(())
    } else {
        Err(Denial::MemberHierarchy)
    }
}

fn ensure_manageable(actor_id: UserId, server: &Server, role: &Role) -> Result<(), Denial> {
    if can_manage(actor_id, role, server) {
        Ok(())
    } else {
        Err(Denial::RoleHierarchy {
            role_position: role.position,
            actor_rank: highest_position(actor_id, server),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        authorize_channel_override, authorize_member_moderation, authorize_owner_only,
        authorize_role_assignment, authorize_role_create, authorize_role_delete,
        authorize_role_update, can_manage, require_capability, Denial,
    };
    use crate::{
        server::tests::{sample_server, text_channel, username},
        resolve, Capability, CapabilitySet, HierarchyRank, RoleUpdate, Server, UserId,
    };

    struct Fixture {
        server: Server,
        owner: UserId,
        manager: UserId,
        plain: UserId,
        manager_role: String,
        junior_role: String,
        peer_role: String,
    }

    fn fixture() -> Fixture {
        let (mut server, owner) = sample_server();
        let manager = UserId::new();
        let plain = UserId::new();
        server.add_member(manager, username("manager"));
        server.add_member(plain, username("plain"));
        let manager_role = server
            .create_role(
                "managers",
                0,
                10,
                [Capability::ManageRoles, Capability::KickMembers]
                    .into_iter()
                    .collect(),
            )
            .unwrap();
        let junior_role = server
            .create_role("juniors", 0, 4, CapabilitySet::empty())
            .unwrap();
        let peer_role = server
            .create_role("peers", 0, 10, CapabilitySet::empty())
            .unwrap();
        server.assign_role(manager, &manager_role).unwrap();
        Fixture {
            server,
            owner,
            manager,
            plain,
            manager_role,
            junior_role,
            peer_role,
        }
    }

    #[test]
    fn can_manage_requires_strictly_lower_position() {
        let f = fixture();
        let junior = f.server.role(&f.junior_role).unwrap();
        let peer = f.server.role(&f.peer_role).unwrap();
        let own = f.server.role(&f.manager_role).unwrap();
        let everyone = f.server.everyone();

        assert!(can_manage(f.manager, junior, &f.server));
        assert!(!can_manage(f.manager, peer, &f.server));
        assert!(!can_manage(f.manager, own, &f.server));
        assert!(!can_manage(f.manager, everyone, &f.server));
        assert!(!can_manage(f.plain, junior, &f.server));
        assert!(!can_manage(UserId::new(), junior, &f.server));

        assert!(can_manage(f.owner, peer, &f.server));
        assert!(can_manage(f.owner, everyone, &f.server));
    }

    #[test]
    fn role_create_must_sit_below_actor() {
        let f = fixture();
        assert_eq!(authorize_role_create(f.manager, &f.server, 9), Ok(()));
        assert_eq!(
            authorize_role_create(f.manager, &f.server, 10),
            Err(Denial::RoleHierarchy {
                role_position: 10,
                actor_rank: HierarchyRank::Position(10),
            })
        );
        assert_eq!(
            authorize_role_create(f.plain, &f.server, 1),
            Err(Denial::MissingCapability(Capability::ManageRoles))
        );
        assert_eq!(authorize_role_create(f.owner, &f.server, 5_000), Ok(()));
    }

    #[test]
    fn everyone_payload_is_editable_with_manage_roles() {
        let f = fixture();
        assert_eq!(authorize_role_update(f.manager, &f.server, "everyone"), Ok(()));
        assert_eq!(
            authorize_role_update(f.plain, &f.server, "everyone"),
            Err(Denial::MissingCapability(Capability::ManageRoles))
        );
        assert_eq!(
            authorize_role_update(f.manager, &f.server, &f.peer_role),
            Err(Denial::RoleHierarchy {
                role_position: 10,
                actor_rank: HierarchyRank::Position(10),
            })
        );
        assert_eq!(
            authorize_role_update(f.manager, &f.server, "nope"),
            Err(Denial::UnknownRole)
        );
    }

    #[test]
    fn role_update_is_positional_so_admin_can_reach_the_manager() {
        let mut f = fixture();
        assert_eq!(authorize_role_update(f.manager, &f.server, &f.junior_role), Ok(()));
        let grant = RoleUpdate {
            permissions: Some([Capability::Admin].into_iter().collect()),
            ..RoleUpdate::default()
        };
        f.server.update_role("everyone", grant).unwrap();

        assert!(resolve(f.manager, Some(&f.server), None).is_all());
    }

    #[test]
    fn everyone_can_never_be_deleted() {
        let f = fixture();
        assert_eq!(
            authorize_role_delete(f.owner, &f.server, "everyone"),
            Err(Denial::EveryoneUndeletable)
        );
        assert_eq!(
            authorize_role_delete(f.manager, &f.server, "everyone"),
            Err(Denial::EveryoneUndeletable)
        );
        assert_eq!(authorize_role_delete(f.manager, &f.server, &f.junior_role), Ok(()));
        assert_eq!(authorize_role_delete(f.owner, &f.server, &f.manager_role), Ok(()));
    }

    #[test]
    fn assignment_requires_manage_roles_and_seniority() {
        let f = fixture();
        assert_eq!(
            authorize_role_assignment(f.manager, &f.server, f.plain, &f.junior_role),
            Ok(())
        );
        assert_eq!(
            authorize_role_assignment(f.manager, &f.server, f.plain, &f.manager_role),
            Err(Denial::RoleHierarchy {
                role_position: 10,
                actor_rank: HierarchyRank::Position(10),
            })
        );
        assert_eq!(
            authorize_role_assignment(f.plain, &f.server, f.plain, &f.junior_role),
            Err(Denial::MissingCapability(Capability::ManageRoles))
        );
        assert_eq!(
            authorize_role_assignment(f.manager, &f.server, f.plain, "everyone"),
            Err(Denial::EveryoneUnassignable)
        );
        assert_eq!(
            authorize_role_assignment(f.manager, &f.server, UserId::new(), &f.junior_role),
            Err(Denial::UnknownMember)
        );
        assert_eq!(
            authorize_role_assignment(UserId::new(), &f.server, f.plain, &f.junior_role),
            Err(Denial::NotMember)
        );
    }

    #[test]
    fn moderation_respects_owner_and_hierarchy() {
        let f = fixture();
        assert_eq!(
            authorize_member_moderation(f.manager, &f.server, f.plain, Capability::KickMembers),
            Ok(())
        );
        assert_eq!(
            authorize_member_moderation(f.plain, &f.server, f.manager, Capability::KickMembers),
            Err(Denial::MissingCapability(Capability::KickMembers))
        );
        assert_eq!(
            authorize_member_moderation(f.manager, &f.server, f.owner, Capability::KickMembers),
            Err(Denial::TargetIsOwner)
        );
        assert_eq!(
            authorize_member_moderation(f.manager, &f.server, f.plain, Capability::BanMembers),
            Err(Denial::MissingCapability(Capability::BanMembers))
        );
        assert_eq!(
            authorize_member_moderation(f.owner, &f.server, f.manager, Capability::BanMembers),
            Ok(())
        );
    }

    #[test]
    fn moderation_rejects_equal_rank_targets() {
        let mut f = fixture();
        let peer = UserId::new();
        f.server.add_member(peer, username("peer_user"));
        f.server.assign_role(peer, &f.peer_role).unwrap();
        assert_eq!(
            authorize_member_moderation(f.manager, &f.server, peer, Capability::KickMembers),
            Err(Denial::MemberHierarchy)
        );
    }

    #[test]
    fn override_edits_need_manage_channels_and_authority() {
        let mut f = fixture();
        let channel_id = text_channel(&mut f.server, "general");
        let channel_admin = f
            .server
            .create_role("channels", 0, 8, [Capability::ManageChannels].into_iter().collect())
            .unwrap();
        f.server.assign_role(f.plain, &channel_admin).unwrap();

        assert_eq!(
            authorize_channel_override(f.plain, &f.server, &channel_id, "everyone"),
            Ok(())
        );
        assert_eq!(
            authorize_channel_override(f.plain, &f.server, &channel_id, &f.junior_role),
            Ok(())
        );
        assert_eq!(
            authorize_channel_override(f.plain, &f.server, &channel_id, &f.manager_role),
            Err(Denial::RoleHierarchy {
                role_position: 10,
                actor_rank: HierarchyRank::Position(8),
            })
        );
        assert_eq!(
            authorize_channel_override(f.manager, &f.server, &channel_id, &f.junior_role),
            Err(Denial::MissingCapability(Capability::ManageChannels))
        );
        assert_eq!(
            authorize_channel_override(f.plain, &f.server, "missing", "everyone"),
            Err(Denial::UnknownChannel)
        );
    }

    #[test]
    fn owner_only_and_capability_gates() {
        let f = fixture();
        assert_eq!(authorize_owner_only(f.owner, &f.server), Ok(()));
        assert_eq!(
            authorize_owner_only(f.manager, &f.server),
            Err(Denial::OwnerOnly)
        );
        assert_eq!(
            require_capability(f.plain, &f.server, None, Capability::SendMessages),
            Ok(())
        );
        assert_eq!(Denial::EveryoneUndeletable.code(), "everyone_role_protected");
    }
}
