//! Effective capability resolution for a user in a server or channel context.
//!
//! Resolution order:
//! 1. The owner holds everything.
//! 2. Non-members get the raw `everyone` permissions.
//! 3. Members start from `everyone` and union every assigned role.
//! 4. `admin` expands to everything and skips channel overrides.
//! 5. Channel overrides for the member's roles (and `everyone`) replace
//!    individual channel-scoped values; the most senior explicit entry wins.

use crate::{
    all_capabilities,
    capability::{Capability, CapabilitySet, CHANNEL_CAPABILITIES},
    role::EVERYONE_ROLE_ID,
    server::{Channel, Member, Server},
    UserId,
};

/// Computes the capability map of `user_id`.
///
/// A missing server resolves to the empty set. A member asking about an
/// unknown channel also resolves to the empty set.
#[must_use]
pub fn resolve(user_id: UserId, server: Option<&Server>, channel_id: Option<&str>) -> CapabilitySet {
    let Some(server) = server else {
        return CapabilitySet::empty();
    };

    if server.owner_id() == user_id {
        return all_capabilities();
    }

    let everyone = server.everyone().permissions;
    let Some(member) = server.member(user_id) else {
        return everyone;
    };

    let mut effective = member
        .role_ids
        .iter()
        .filter_map(|role_id| server.role(role_id))
        .fold(everyone, |merged, role| merged | role.permissions);

    if effective.contains(Capability::Admin) {
        return all_capabilities();
    }

    if let Some(channel_id) = channel_id {
        let Some(channel) = server.channel(channel_id) else {
            return CapabilitySet::empty();
        };
        apply_channel_overrides(&mut effective, server, member, channel);
    }

    effective
}

#[must_use]
pub fn has_capability(
    user_id: UserId,
    server: Option<&Server>,
    channel_id: Option<&str>,
    capability: Capability,
) -> bool {
    resolve(user_id, server, channel_id).contains(capability)
}

/// Winning explicit override for one capability while scanning roles.
#[derive(Clone, Copy)]
struct Candidate {
    position: i32,
    value: bool,
    contested: bool,
}

fn apply_channel_overrides(
    effective: &mut CapabilitySet,
    server: &Server,
    member: &Member,
    channel: &Channel,
) {
    let layers: Vec<_> = core::iter::once(EVERYONE_ROLE_ID)
        .chain(member.role_ids.iter().map(String::as_str))
        .filter_map(|role_id| {
            let role = server.role(role_id)?;
            let entry = channel.override_for(role_id)?;
            Some((role.position, entry))
        })
        .collect();

    if layers.is_empty() {
        return;
    }

    for capability in CHANNEL_CAPABILITIES {
        let mut best: Option<Candidate> = None;
        for (position, entry) in &layers {
            let Some(value) = entry.get(capability) else {
                continue;
            };
            best = match best {
                Some(current) if current.position > *position => Some(current),
                Some(current) if current.position == *position => Some(Candidate {
                    contested: current.contested || current.value != value,
                    ..current
                }),
                _ => Some(Candidate {
                    position: *position,
                    value,
                    contested: false,
                }),
            };
        }
        if let Some(winner) = best.filter(|candidate| !candidate.contested) {
            effective.set(capability, winner.value);
        }
    }
}
