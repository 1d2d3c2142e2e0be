//! Flood exemption checker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatMember, ChatMemberKind, UserId};
use tracing::{debug, warn};

/// Longest time a cached exemption answer may be served.
pub const MAX_EXEMPT_CACHE_TTL: Duration = Duration::from_secs(10);

/// Privileges an administrator may hold that make them exempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdminPrivileges {
    pub can_delete_messages: bool,
    pub can_manage_chat: bool,
    pub can_restrict_members: bool,
    pub can_promote_members: bool,
}

impl AdminPrivileges {
    fn any(&self) -> bool {
        self.can_delete_messages
            || self.can_manage_chat
            || self.can_restrict_members
            || self.can_promote_members
    }
}

/// Membership status of a user in a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

/// What the membership lookup knows about a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberInfo {
    pub status: MemberStatus,
    pub privileges: Option<AdminPrivileges>,
}

impl MemberInfo {
    /// Owners, administrators and members holding moderation privileges.
    pub fn is_exempt(&self) -> bool {
        matches!(self.status, MemberStatus::Owner | MemberStatus::Administrator)
            || self.privileges.is_some_and(|p| p.any())
    }

    fn from_chat_member(member: &ChatMember) -> Self {
        match &member.kind {
            ChatMemberKind::Owner(_) => Self {
                status: MemberStatus::Owner,
                privileges: None,
            },
            ChatMemberKind::Administrator(admin) => Self {
                status: MemberStatus::Administrator,
                privileges: Some(AdminPrivileges {
                    can_delete_messages: admin.can_delete_messages,
                    can_manage_chat: admin.can_manage_chat,
                    can_restrict_members: admin.can_restrict_members,
                    can_promote_members: admin.can_promote_members,
                }),
            },
            kind => {
                let status = if kind.is_banned() {
                    MemberStatus::Banned
                } else if kind.is_left() {
                    MemberStatus::Left
                } else if kind.is_restricted() {
                    MemberStatus::Restricted
                } else {
                    MemberStatus::Member
                };
                Self {
                    status,
                    privileges: None,
                }
            }
        }
    }
}

/// Chat membership lookup.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn member_info(&self, chat_id: ChatId, user_id: UserId) -> anyhow::Result<MemberInfo>;
}

#[async_trait]
impl MembershipSource for Bot {
    async fn member_info(&self, chat_id: ChatId, user_id: UserId) -> anyhow::Result<MemberInfo> {
        let member = self.get_chat_member(chat_id, user_id).await?;
        Ok(MemberInfo::from_chat_member(&member))
    }
}

/// Answers whether a user is exempt from flood protection in a chat.
///
/// Bot owners (from OWNER_IDS env) are exempt everywhere. Lookup errors count
/// as "not exempt" so a broken lookup never disables protection.
#[derive(Clone)]
pub struct Permissions {
    source: Arc<dyn MembershipSource>,
    cache: Option<Cache<(i64, u64), bool>>,
    owner_ids: Arc<[u64]>,
}

impl Permissions {
    /// Create a checker. `cache_ttl` is capped at [`MAX_EXEMPT_CACHE_TTL`];
    /// zero disables caching.
    pub fn new(source: Arc<dyn MembershipSource>, owner_ids: Vec<u64>, cache_ttl: Duration) -> Self {
        let ttl = cache_ttl.min(MAX_EXEMPT_CACHE_TTL);
        let cache = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build()
        });

        Self {
            source,
            cache,
            owner_ids: owner_ids.into(),
        }
    }

    /// Check if a user is a bot owner.
    #[inline]
    pub fn is_bot_owner(&self, user_id: UserId) -> bool {
        self.owner_ids.contains(&user_id.0)
    }

    /// Whether the user is exempt from flood protection (and may configure it).
    pub async fn is_exempt(&self, chat_id: ChatId, user_id: UserId) -> bool {
        if self.is_bot_owner(user_id) {
            return true;
        }

        let key = (chat_id.0, user_id.0);
        if let Some(cache) = &self.cache
            && let Some(exempt) = cache.get(&key)
        {
            debug!("Exemption cache hit for user {} in chat {}", user_id, chat_id);
            return exempt;
        }

        match self.source.member_info(chat_id, user_id).await {
            Ok(info) => {
                let exempt = info.is_exempt();
                if let Some(cache) = &self.cache {
                    cache.insert(key, exempt);
                }
                exempt
            }
            Err(e) => {
                warn!(
                    "Membership lookup failed for user {} in chat {}: {}",
                    user_id, chat_id, e
                );
                false
            }
        }
    }
}
