//! Permission system for flood exemptions.
//!
//! Decides whether a chat member is privileged enough to bypass flood
//! protection. The same check gates the antiflood configuration commands.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let perms = Permissions::new(Arc::new(bot.clone()), owner_ids, Duration::from_secs(3));
//!
//! if perms.is_exempt(chat_id, user_id).await {
//!     // skip flood tracking
//! }
//! ```

mod checker;

pub use checker::Permissions;

#[cfg(test)]
pub(crate) use checker::fake::FakeMembership;
#[cfg(test)]
pub(crate) use checker::MemberStatus;
