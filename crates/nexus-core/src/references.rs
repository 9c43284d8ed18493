//! `@user`, `@role`, `@everyone` and `#channel` references in message text.
//!
//! Scans are pure and case-insensitive. At every sigil the longest matching
//! name wins, so `@mods` is not read as `@mod` followed by `s`. A reference
//! must start at the beginning of the text or after a non-word character and
//! end before a word character.

use std::collections::HashSet;

use serde::Serialize;

use crate::{
    capability::Capability,
    resolver::resolve,
    role::EVERYONE_ROLE_NAME,
    server::Server,
    ChannelId, RoleId, ServerId, UserId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionedUser {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionedRole {
    pub role_id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mentions {
    pub users: Vec<MentionedUser>,
    pub roles: Vec<MentionedRole>,
    pub everyone: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelLink {
    pub channel_id: ChannelId,
    pub name: String,
    pub server_id: ServerId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelLinks {
    pub channels: Vec<ChannelLink>,
}

/// Who a message should notify once permissions are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationTargets {
    /// Members notified individually, in mention order.
    pub users: Vec<UserId>,
    /// `@everyone` was written and the author may use it.
    pub mass: bool,
    /// `@everyone` was written but the author lacks `mentionEveryone`.
    pub everyone_suppressed: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Target<'a> {
    User(UserId),
    Role(&'a str),
    Everyone,
    Channel(&'a str),
}

#[must_use]
pub fn parse_mentions(text: &str, server: Option<&Server>) -> Mentions {
    let Some(server) = server else {
        return Mentions::default();
    };
    if text.is_empty() {
        return Mentions::default();
    }

    let mut candidates: Vec<(String, Target<'_>)> = Vec::new();
    candidates.push((EVERYONE_ROLE_NAME.to_owned(), Target::Everyone));
    for member in server.members().values() {
        candidates.push((
            member.username.as_str().to_lowercase(),
            Target::User(member.user_id),
        ));
    }
    for role in server.roles().values().filter(|role| !role.is_everyone()) {
        candidates.push((role.name.to_lowercase(), Target::Role(&role.id)));
    }

    let mut mentions = Mentions::default();
    for target in scan(&text.to_lowercase(), '@', &candidates) {
        match target {
            Target::Everyone => mentions.everyone = true,
            Target::User(user_id) => {
                if let Some(member) = server.member(user_id) {
                    mentions.users.push(MentionedUser {
                        user_id,
                        username: member.username.as_str().to_owned(),
                    });
                }
            }
            Target::Role(role_id) => {
                if let Some(role) = server.role(role_id) {
                    mentions.roles.push(MentionedRole {
                        role_id: role.id.clone(),
                        name: role.name.clone(),
                    });
                }
            }
            Target::Channel(_) => {}
        }
    }
    mentions
}

#[must_use]
pub fn parse_channel_links(text: &str, server: Option<&Server>, server_id: &str) -> ChannelLinks {
    let Some(server) = server else {
        return ChannelLinks::default();
    };
    if text.is_empty() {
        return ChannelLinks::default();
    }

    let candidates: Vec<(String, Target<'_>)> = server
        .channels()
        .values()
        .map(|channel| {
            (
                channel.name.as_str().to_lowercase(),
                Target::Channel(&channel.id),
            )
        })
        .collect();

    let channels = scan(&text.to_lowercase(), '#', &candidates)
        .into_iter()
        .filter_map(|target| match target {
            Target::Channel(channel_id) => server.channel(channel_id),
            _ => None,
        })
        .map(|channel| ChannelLink {
            channel_id: channel.id.clone(),
            name: channel.name.as_str().to_owned(),
            server_id: server_id.to_owned(),
        })
        .collect();
    ChannelLinks { channels }
}

/// Applies permissions to parsed mentions.
///
/// `@everyone` becomes a mass notification only when the author holds
/// `mentionEveryone` in the channel. Individually notified members must be
/// able to view the channel; the author is never notified.
#[must_use]
pub fn notification_targets(
    mentions: &Mentions,
    author_id: UserId,
    server: &Server,
    channel_id: Option<&str>,
) -> NotificationTargets {
    let author = resolve(author_id, Some(server), channel_id);
    let mass = mentions.everyone && author.contains(Capability::MentionEveryone);

    let mut seen = HashSet::new();
    let mut users = Vec::new();
    let direct = mentions.users.iter().map(|user| user.user_id);
    let via_roles = mentions.roles.iter().flat_map(|role| {
        let mut holders: Vec<_> = server
            .members()
            .values()
            .filter(|member| member.has_role(&role.role_id))
            .map(|member| member.user_id)
            .collect();
        holders.sort();
        holders
    });
    for user_id in direct.chain(via_roles) {
        if user_id == author_id || !seen.insert(user_id) {
            continue;
        }
        if resolve(user_id, Some(server), channel_id).contains(Capability::ViewChannel) {
            users.push(user_id);
        }
    }

    NotificationTargets {
        users,
        mass,
        everyone_suppressed: mentions.everyone && !mass,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Returns matched targets in order of first appearance, deduplicated.
fn scan<'a>(lowered: &str, sigil: char, candidates: &[(String, Target<'a>)]) -> Vec<Target<'a>> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut previous: Option<char> = None;

    for (index, c) in lowered.char_indices() {
        let at_boundary = previous.map_or(true, |p| !is_word_char(p) && p != sigil);
        previous = Some(c);
        if c != sigil || !at_boundary {
            continue;
        }

        let rest = &lowered[index + c.len_utf8()..];
        let matching: Vec<&(String, Target<'a>)> = candidates
            .iter()
            .filter(|(needle, _)| {
                !needle.is_empty()
                    && rest.starts_with(needle.as_str())
                    && !rest[needle.len()..].chars().next().is_some_and(is_word_char)
            })
            .collect();
        let Some(longest) = matching.iter().map(|(needle, _)| needle.len()).max() else {
            continue;
        };
        for (needle, target) in matching {
            if needle.len() == longest && seen.insert(*target) {
                found.push(*target);
            }
        }
    }

    found
}
