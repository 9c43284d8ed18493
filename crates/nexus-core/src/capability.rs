//! Fixed registry of capability flags and the bitset used to carry them.
//!
//! Every capability is either server-scoped or channel-scoped. Only
//! channel-scoped capabilities may appear in channel overrides.

use std::collections::BTreeMap;

use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Admin,
    ManageServer,
    ManageRoles,
    ManageChannels,
    KickMembers,
    BanMembers,
    CreateInvite,
    ChangeNickname,
    ManageNicknames,
    ManageEmojis,
    ManageSoundboard,
    ManageWebhooks,
    ViewAuditLog,
    MuteMembers,
    DeafenMembers,
    MoveMembers,
    ViewChannel,
    SendMessages,
    AttachFiles,
    JoinVoice,
    ReadHistory,
    AddReactions,
    MentionEveryone,
    ManageMessages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityScope {
    Server,
    Channel,
}

pub const ALL_CAPABILITIES: [Capability; 24] = [
    Capability::Admin,
    Capability::ManageServer,
    Capability::ManageRoles,
    Capability::ManageChannels,
    Capability::KickMembers,
    Capability::BanMembers,
    Capability::CreateInvite,
    Capability::ChangeNickname,
    Capability::ManageNicknames,
    Capability::ManageEmojis,
    Capability::ManageSoundboard,
    Capability::ManageWebhooks,
    Capability::ViewAuditLog,
    Capability::MuteMembers,
    Capability::DeafenMembers,
    Capability::MoveMembers,
    Capability::ViewChannel,
    Capability::SendMessages,
    Capability::AttachFiles,
    Capability::JoinVoice,
    Capability::ReadHistory,
    Capability::AddReactions,
    Capability::MentionEveryone,
    Capability::ManageMessages,
];

pub const CHANNEL_CAPABILITIES: [Capability; 8] = [
    Capability::ViewChannel,
    Capability::SendMessages,
    Capability::AttachFiles,
    Capability::JoinVoice,
    Capability::ReadHistory,
    Capability::AddReactions,
    Capability::MentionEveryone,
    Capability::ManageMessages,
];

impl Capability {
    #[must_use]
    pub const fn scope(self) -> CapabilityScope {
        match self {
            Self::ViewChannel
            | Self::SendMessages
            | Self::AttachFiles
            | Self::JoinVoice
            | Self::ReadHistory
            | Self::AddReactions
            | Self::MentionEveryone
            | Self::ManageMessages => CapabilityScope::Channel,
            _ => CapabilityScope::Server,
        }
    }

    const fn mask(self) -> u64 {
        1 << (self as u32)
    }
}

#[must_use]
pub const fn is_channel_scoped(capability: Capability) -> bool {
    matches!(capability.scope(), CapabilityScope::Channel)
}

#[must_use]
pub fn all_capabilities() -> CapabilitySet {
    ALL_CAPABILITIES.into_iter().collect()
}

/// Total mapping `Capability -> bool`. Absent capabilities are `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct CapabilitySet(u64);

impl CapabilitySet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from raw bits, dropping bits outside the registry.
    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits & known_mask())
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.mask() != 0
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.mask();
    }

    pub fn remove(&mut self, capability: Capability) {
        self.0 &= !capability.mask();
    }

    pub fn set(&mut self, capability: Capability, value: bool) {
        if value {
            self.insert(capability);
        } else {
            self.remove(capability);
        }
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn is_all(self) -> bool {
        self.0 == known_mask()
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        ALL_CAPABILITIES
            .into_iter()
            .filter(move |capability| self.contains(*capability))
    }

    /// Expands the set into an explicit map covering every capability.
    #[must_use]
    pub fn to_map(self) -> BTreeMap<Capability, bool> {
        ALL_CAPABILITIES
            .into_iter()
            .map(|capability| (capability, self.contains(capability)))
            .collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::empty();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl core::ops::BitOr for CapabilitySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for CapabilitySet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ALL_CAPABILITIES.len()))?;
        for capability in ALL_CAPABILITIES {
            map.serialize_entry(&capability, &self.contains(capability))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<Capability, bool>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(capability, granted)| granted.then_some(capability))
            .collect())
    }
}

fn known_mask() -> u64 {
    ALL_CAPABILITIES
        .into_iter()
        .fold(0_u64, |bits, capability| bits | capability.mask())
}
