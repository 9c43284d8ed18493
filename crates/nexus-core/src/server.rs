//! The server aggregate: roles, channels, members and their invariants.
//!
//! All mutation goes through methods on [`Server`] so that the `everyone`
//! role, immutable role positions and override scoping cannot be broken by
//! callers. Authorization is not checked here; see [`crate::authorizer`].

use std::collections::{BTreeMap, HashMap};

use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::{
    capability::{is_channel_scoped, Capability, CapabilitySet},
    role::{
        validate_role_color, validate_role_name, Role, RoleUpdate, EVERYONE_POSITION,
        EVERYONE_ROLE_ID, EVERYONE_ROLE_NAME, MAX_MEMBER_ROLE_ASSIGNMENTS, MAX_SERVER_ROLES,
    },
    CategoryId, ChannelId, ChannelKind, ChannelName, DomainError, RoleId, ServerId, ServerName,
    UserId, Username,
};

#[must_use]
pub fn default_everyone_permissions() -> CapabilitySet {
    [
        Capability::CreateInvite,
        Capability::ChangeNickname,
        Capability::ViewChannel,
        Capability::SendMessages,
        Capability::AttachFiles,
        Capability::JoinVoice,
        Capability::ReadHistory,
        Capability::AddReactions,
    ]
    .into_iter()
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub user_id: UserId,
    pub username: Username,
    /// Assigned roles in assignment order. Never contains `everyone`.
    pub role_ids: Vec<RoleId>,
}

impl Member {
    #[must_use]
    pub fn has_role(&self, role_id: &str) -> bool {
        self.role_ids.iter().any(|assigned| assigned == role_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Key of an override entry, rendered as `role:<roleId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OverrideTarget {
    role_id: RoleId,
}

impl OverrideTarget {
    const PREFIX: &'static str = "role:";

    #[must_use]
    pub fn role(role_id: impl Into<RoleId>) -> Self {
        Self {
            role_id: role_id.into(),
        }
    }

    #[must_use]
    pub fn role_id(&self) -> &str {
        &self.role_id
    }
}

impl core::fmt::Display for OverrideTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.role_id)
    }
}

impl TryFrom<String> for OverrideTarget {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.strip_prefix(Self::PREFIX) {
            Some(role_id) if !role_id.is_empty() => Ok(Self::role(role_id)),
            _ => Err(DomainError::InvalidOverrideTarget),
        }
    }
}

impl From<OverrideTarget> for String {
    fn from(value: OverrideTarget) -> Self {
        value.to_string()
    }
}

/// Partial mapping `Capability -> true | false | inherit` for one target.
///
/// Only channel-scoped capabilities can be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelOverride {
    allow: CapabilitySet,
    deny: CapabilitySet,
}

impl ChannelOverride {
    #[must_use]
    pub fn get(&self, capability: Capability) -> Option<bool> {
        if self.allow.contains(capability) {
            Some(true)
        } else if self.deny.contains(capability) {
            Some(false)
        } else {
            None
        }
    }

    /// Sets an explicit value, or clears it with `None`.
    ///
    /// # Errors
    /// Returns [`DomainError::NotChannelScoped`] for server-scoped capabilities.
    pub fn set(&mut self, capability: Capability, value: Option<bool>) -> Result<(), DomainError> {
        if !is_channel_scoped(capability) {
            return Err(DomainError::NotChannelScoped(capability));
        }
        self.allow.remove(capability);
        self.deny.remove(capability);
        match value {
            Some(true) => self.allow.insert(capability),
            Some(false) => self.deny.insert(capability),
            None => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn allow(&self) -> CapabilitySet {
        self.allow
    }

    #[must_use]
    pub fn deny(&self) -> CapabilitySet {
        self.deny
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

impl Serialize for ChannelOverride {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<(Capability, bool)> = self
            .allow
            .iter()
            .map(|capability| (capability, true))
            .chain(self.deny.iter().map(|capability| (capability, false)))
            .collect();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (capability, value) in entries {
            map.serialize_entry(&capability, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChannelOverride {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<Capability, Option<bool>>::deserialize(deserializer)?;
        let mut entry = Self::default();
        for (capability, value) in raw {
            entry.set(capability, value).map_err(serde::de::Error::custom)?;
        }
        Ok(entry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: ChannelName,
    pub kind: ChannelKind,
    pub category_id: Option<CategoryId>,
    pub permission_overrides: BTreeMap<OverrideTarget, ChannelOverride>,
}

impl Channel {
    #[must_use]
    pub fn override_for(&self, role_id: &str) -> Option<&ChannelOverride> {
        self.permission_overrides.get(&OverrideTarget::role(role_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Server {
    id: ServerId,
    name: ServerName,
    owner_id: UserId,
    categories: Vec<Category>,
    roles: HashMap<RoleId, Role>,
    channels: HashMap<ChannelId, Channel>,
    members: HashMap<UserId, Member>,
}

impl Server {
    /// Creates a server owned by `owner_id`, seeding the `everyone` role and
    /// the owner's membership.
    #[must_use]
    pub fn new(id: ServerId, name: ServerName, owner_id: UserId, owner_username: Username) -> Self {
        let everyone = Role {
            id: EVERYONE_ROLE_ID.to_owned(),
            name: EVERYONE_ROLE_NAME.to_owned(),
            color: 0,
            position: EVERYONE_POSITION,
            permissions: default_everyone_permissions(),
        };
        let mut server = Self {
            id,
            name,
            owner_id,
            categories: Vec::new(),
            roles: HashMap::from([(everyone.id.clone(), everyone)]),
            channels: HashMap::new(),
            members: HashMap::new(),
        };
        server.add_member(owner_id, owner_username);
        server
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &ServerName {
        &self.name
    }

    #[must_use]
    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[must_use]
    pub fn roles(&self) -> &HashMap<RoleId, Role> {
        &self.roles
    }

    #[must_use]
    pub fn role(&self, role_id: &str) -> Option<&Role> {
        self.roles.get(role_id)
    }

    /// The synthetic `everyone` role. Always present.
    #[must_use]
    pub fn everyone(&self) -> &Role {
        &self.roles[EVERYONE_ROLE_ID]
    }

    #[must_use]
    pub fn channels(&self) -> &HashMap<ChannelId, Channel> {
        &self.channels
    }

    #[must_use]
    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.get(channel_id)
    }

    #[must_use]
    pub fn members(&self) -> &HashMap<UserId, Member> {
        &self.members
    }

    #[must_use]
    pub fn member(&self, user_id: UserId) -> Option<&Member> {
        self.members.get(&user_id)
    }

    #[must_use]
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.contains_key(&user_id)
    }

    /// Adds a membership. Returns `false` when the user was already a member.
    pub fn add_member(&mut self, user_id: UserId, username: Username) -> bool {
        if self.members.contains_key(&user_id) {
            return false;
        }
        self.members.insert(
            user_id,
            Member {
                user_id,
                username,
                role_ids: Vec::new(),
            },
        );
        true
    }

    /// # Errors
    /// Fails for the owner and for non-members.
    pub fn remove_member(&mut self, user_id: UserId) -> Result<Member, DomainError> {
        if user_id == self.owner_id {
            return Err(DomainError::OwnerCannotLeave);
        }
        self.members
            .remove(&user_id)
            .ok_or(DomainError::UnknownMember)
    }

    /// Creates a role above the `everyone` role.
    ///
    /// # Errors
    /// Fails on invalid name/color, a position at or below `everyone`, or when
    /// the server already holds the maximum number of roles.
    pub fn create_role(
        &mut self,
        name: &str,
        color: u32,
        position: i32,
        permissions: CapabilitySet,
    ) -> Result<RoleId, DomainError> {
        validate_role_name(name)?;
        validate_role_color(color)?;
        if position <= EVERYONE_POSITION {
            return Err(DomainError::InvalidPosition);
        }
        if self.roles.len() >= MAX_SERVER_ROLES {
            return Err(DomainError::RoleLimitReached);
        }
        let role_id = Ulid::new().to_string();
        self.roles.insert(
            role_id.clone(),
            Role {
                id: role_id.clone(),
                name: name.to_owned(),
                color,
                position,
                permissions,
            },
        );
        Ok(role_id)
    }

    /// Applies a name/color/permission change. Position never changes.
    ///
    /// # Errors
    /// Fails for unknown roles, invalid values, or renaming `everyone`.
    pub fn update_role(&mut self, role_id: &str, update: RoleUpdate) -> Result<&Role, DomainError> {
        let role = self.roles.get_mut(role_id).ok_or(DomainError::UnknownRole)?;
        if let Some(name) = &update.name {
            if role.is_everyone() {
                return Err(DomainError::EveryoneRoleProtected);
            }
            validate_role_name(name)?;
        }
        if let Some(color) = update.color {
            validate_role_color(color)?;
        }

        if let Some(name) = update.name {
            role.name = name;
        }
        if let Some(color) = update.color {
            role.color = color;
        }
        if let Some(permissions) = update.permissions {
            role.permissions = permissions;
        }
        Ok(&*role)
    }

    /// Deletes a role, detaching it from members and channel overrides.
    ///
    /// # Errors
    /// Fails for unknown roles and always for `everyone`.
    pub fn delete_role(&mut self, role_id: &str) -> Result<Role, DomainError> {
        if role_id == EVERYONE_ROLE_ID {
            return Err(DomainError::EveryoneRoleProtected);
        }
        let role = self.roles.remove(role_id).ok_or(DomainError::UnknownRole)?;
        for member in self.members.values_mut() {
            member.role_ids.retain(|assigned| assigned != role_id);
        }
        let target = OverrideTarget::role(role_id);
        for channel in self.channels.values_mut() {
            channel.permission_overrides.remove(&target);
        }
        Ok(role)
    }

    /// Returns `false` when the member already held the role.
    ///
    /// # Errors
    /// Fails for unknown members/roles, `everyone`, or too many assignments.
    pub fn assign_role(&mut self, user_id: UserId, role_id: &str) -> Result<bool, DomainError> {
        if role_id == EVERYONE_ROLE_ID {
            return Err(DomainError::EveryoneRoleProtected);
        }
        if !self.roles.contains_key(role_id) {
            return Err(DomainError::UnknownRole);
        }
        let member = self
            .members
            .get_mut(&user_id)
            .ok_or(DomainError::UnknownMember)?;
        if member.has_role(role_id) {
            return Ok(false);
        }
        if member.role_ids.len() >= MAX_MEMBER_ROLE_ASSIGNMENTS {
            return Err(DomainError::RoleAssignmentLimitReached);
        }
        member.role_ids.push(role_id.to_owned());
        Ok(true)
    }

    /// Returns `false` when the member did not hold the role.
    ///
    /// # Errors
    /// Fails for unknown members/roles and for `everyone`.
    pub fn unassign_role(&mut self, user_id: UserId, role_id: &str) -> Result<bool, DomainError> {
        if role_id == EVERYONE_ROLE_ID {
            return Err(DomainError::EveryoneRoleProtected);
        }
        if !self.roles.contains_key(role_id) {
            return Err(DomainError::UnknownRole);
        }
        let member = self
            .members
            .get_mut(&user_id)
            .ok_or(DomainError::UnknownMember)?;
        let before = member.role_ids.len();
        member.role_ids.retain(|assigned| assigned != role_id);
        Ok(member.role_ids.len() != before)
    }

    /// # Errors
    /// Fails on an invalid name.
    pub fn create_category(&mut self, name: &str) -> Result<CategoryId, DomainError> {
        crate::validate_name(name, 1, 64)?;
        let category_id = Ulid::new().to_string();
        self.categories.push(Category {
            id: category_id.clone(),
            name: name.to_owned(),
        });
        Ok(category_id)
    }

    /// # Errors
    /// Fails when `category_id` does not name an existing category.
    pub fn create_channel(
        &mut self,
        name: ChannelName,
        kind: ChannelKind,
        category_id: Option<CategoryId>,
    ) -> Result<ChannelId, DomainError> {
        if let Some(category_id) = &category_id {
            if !self.categories.iter().any(|category| &category.id == category_id) {
                return Err(DomainError::UnknownCategory);
            }
        }
        let channel_id = Ulid::new().to_string();
        self.channels.insert(
            channel_id.clone(),
            Channel {
                id: channel_id.clone(),
                name,
                kind,
                category_id,
                permission_overrides: BTreeMap::new(),
            },
        );
        Ok(channel_id)
    }

    /// Merges explicit override values for one role into a channel.
    /// `None` clears an entry back to inherit; an emptied entry is removed.
    ///
    /// # Errors
    /// Fails for unknown channels/roles or server-scoped capabilities. On
    /// error the channel is left untouched.
    pub fn set_channel_override(
        &mut self,
        channel_id: &str,
        role_id: &str,
        patch: &BTreeMap<Capability, Option<bool>>,
    ) -> Result<Option<ChannelOverride>, DomainError> {
        if !self.roles.contains_key(role_id) {
            return Err(DomainError::UnknownRole);
        }
        let channel = self
            .channels
            .get_mut(channel_id)
            .ok_or(DomainError::UnknownChannel)?;
        let target = OverrideTarget::role(role_id);
        let mut entry = channel
            .permission_overrides
            .get(&target)
            .copied()
            .unwrap_or_default();
        for (capability, value) in patch {
            entry.set(*capability, *value)?;
        }
        if entry.is_empty() {
            channel.permission_overrides.remove(&target);
            return Ok(None);
        }
        channel.permission_overrides.insert(target, entry);
        Ok(Some(entry))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::{ChannelOverride, OverrideTarget, Server};
    use crate::{
        Capability, CapabilitySet, ChannelKind, ChannelName, DomainError, RoleUpdate, ServerName,
        UserId, Username,
    };

    pub(crate) fn username(value: &str) -> Username {
        Username::try_from(value.to_owned()).unwrap()
    }

    pub(crate) fn sample_server() -> (Server, UserId) {
        let owner = UserId::new();
        let server = Server::new(
            String::from("srv-1"),
            ServerName::try_from(String::from("Test Server")).unwrap(),
            owner,
            username("owner"),
        );
        (server, owner)
    }

    pub(crate) fn text_channel(server: &mut Server, name: &str) -> String {
        server
            .create_channel(
                ChannelName::try_from(name.to_owned()).unwrap(),
                ChannelKind::Text,
                None,
            )
            .unwrap()
    }

    #[test]
    fn new_server_seeds_everyone_and_owner_membership() {
        let (server, owner) = sample_server();
        assert_eq!(server.everyone().position, 0);
        assert!(server.everyone().is_everyone());
        assert!(server.is_member(owner));
        assert!(server.member(owner).unwrap().role_ids.is_empty());
    }

    #[test]
    fn roles_cannot_be_created_at_or_below_everyone() {
        let (mut server, _) = sample_server();
        assert_eq!(
            server
                .create_role("mods", 0, 0, CapabilitySet::empty())
                .unwrap_err(),
            DomainError::InvalidPosition
        );
        assert_eq!(
            server
                .create_role("mods", 0, -4, CapabilitySet::empty())
                .unwrap_err(),
            DomainError::InvalidPosition
        );
        assert_eq!(
            server
                .create_role("Everyone", 0, 3, CapabilitySet::empty())
                .unwrap_err(),
            DomainError::ReservedRoleName
        );
        assert_eq!(
            server
                .create_role("mods", 0x0100_0000, 3, CapabilitySet::empty())
                .unwrap_err(),
            DomainError::InvalidColor
        );
    }

    #[test]
    fn everyone_role_cannot_be_deleted_renamed_or_assigned() {
        let (mut server, owner) = sample_server();
        assert_eq!(
            server.delete_role("everyone").unwrap_err(),
            DomainError::EveryoneRoleProtected
        );
        assert_eq!(
            server
                .update_role(
                    "everyone",
                    RoleUpdate {
                        name: Some(String::from("all")),
                        ..RoleUpdate::default()
                    }
                )
                .unwrap_err(),
            DomainError::EveryoneRoleProtected
        );
        assert_eq!(
            server.assign_role(owner, "everyone").unwrap_err(),
            DomainError::EveryoneRoleProtected
        );

        let updated = server
            .update_role(
                "everyone",
                RoleUpdate {
                    permissions: Some(CapabilitySet::empty()),
                    ..RoleUpdate::default()
                },
            )
            .unwrap();
        assert!(updated.permissions.is_empty());
    }

    #[test]
    fn deleting_a_role_detaches_members_and_overrides() {
        let (mut server, _) = sample_server();
        let member = UserId::new();
        server.add_member(member, username("member1"));
        let role_id = server
            .create_role("helpers", 0xFF00FF, 5, CapabilitySet::empty())
            .unwrap();
        server.assign_role(member, &role_id).unwrap();
        let channel_id = text_channel(&mut server, "general");
        server
            .set_channel_override(
                &channel_id,
                &role_id,
                &BTreeMap::from([(Capability::SendMessages, Some(false))]),
            )
            .unwrap();

        let removed = server.delete_role(&role_id).unwrap();
        assert_eq!(removed.name, "helpers");
        assert!(server.member(member).unwrap().role_ids.is_empty());
        assert!(server
            .channel(&channel_id)
            .unwrap()
            .permission_overrides
            .is_empty());
    }

    #[test]
    fn assignments_are_idempotent_and_bounded() {
        let (mut server, _) = sample_server();
        let member = UserId::new();
        server.add_member(member, username("member1"));
        let role_id = server
            .create_role("r", 0, 1, CapabilitySet::empty())
            .unwrap();
        assert!(server.assign_role(member, &role_id).unwrap());
        assert!(!server.assign_role(member, &role_id).unwrap());
        assert!(server.unassign_role(member, &role_id).unwrap());
        assert!(!server.unassign_role(member, &role_id).unwrap());
        assert_eq!(
            server.assign_role(UserId::new(), &role_id).unwrap_err(),
            DomainError::UnknownMember
        );
        assert_eq!(
            server.assign_role(member, "missing").unwrap_err(),
            DomainError::UnknownRole
        );
    }

    #[test]
    fn owner_cannot_leave() {
        let (mut server, owner) = sample_server();
        assert_eq!(
            server.remove_member(owner).unwrap_err(),
            DomainError::OwnerCannotLeave
        );
    }

    #[test]
    fn channel_overrides_reject_server_scoped_capabilities() {
        let (mut server, _) = sample_server();
        let channel_id = text_channel(&mut server, "general");
        let error = server
            .set_channel_override(
                &channel_id,
                "everyone",
                &BTreeMap::from([
                    (Capability::SendMessages, Some(false)),
                    (Capability::Admin, Some(true)),
                ]),
            )
            .unwrap_err();
        assert_eq!(error, DomainError::NotChannelScoped(Capability::Admin));
        assert!(server
            .channel(&channel_id)
            .unwrap()
            .permission_overrides
            .is_empty());
    }

    #[test]
    fn null_override_value_clears_entry() {
        let (mut server, _) = sample_server();
        let channel_id = text_channel(&mut server, "general");
        let set = server
            .set_channel_override(
                &channel_id,
                "everyone",
                &BTreeMap::from([
                    (Capability::SendMessages, Some(false)),
                    (Capability::AddReactions, Some(true)),
                ]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(set.get(Capability::SendMessages), Some(false));
        assert_eq!(set.get(Capability::AddReactions), Some(true));

        let cleared = server
            .set_channel_override(
                &channel_id,
                "everyone",
                &BTreeMap::from([
                    (Capability::SendMessages, None),
                    (Capability::AddReactions, None),
                ]),
            )
            .unwrap();
        assert!(cleared.is_none());
        assert!(server
            .channel(&channel_id)
            .unwrap()
            .override_for("everyone")
            .is_none());
    }

    #[test]
    fn override_wire_format_uses_role_target_keys() {
        assert_eq!(OverrideTarget::role("abc").to_string(), "role:abc");
        assert_eq!(
            OverrideTarget::try_from(String::from("member:abc")).unwrap_err(),
            DomainError::InvalidOverrideTarget
        );

        let parsed: BTreeMap<OverrideTarget, ChannelOverride> = serde_json::from_str(
            r#"{"role:r1":{"sendMessages":false,"viewChannel":null,"addReactions":true}}"#,
        )
        .unwrap();
        let entry = parsed[&OverrideTarget::role("r1")];
        assert_eq!(entry.get(Capability::SendMessages), Some(false));
        assert_eq!(entry.get(Capability::ViewChannel), None);
        assert_eq!(entry.get(Capability::AddReactions), Some(true));

        assert!(serde_json::from_str::<ChannelOverride>(r#"{"admin":true}"#).is_err());
    }
}
