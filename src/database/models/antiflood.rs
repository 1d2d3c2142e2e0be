//! Antiflood configuration models.

use std::fmt;
use std::str::FromStr;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Penalty applied when a user floods a chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FloodAction {
    /// Ban permanently
    Ban,
    /// Take away the right to send messages
    #[default]
    Mute,
    /// Ban and unban right away (user can rejoin)
    Kick,
    /// Ban until the configured duration runs out
    Tban,
    /// Mute until the configured duration runs out
    Tmute,
}

impl FloodAction {
    /// Whether this action needs a `duration` to be enforceable.
    pub fn is_timed(self) -> bool {
        matches!(self, Self::Tban | Self::Tmute)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Mute => "mute",
            Self::Kick => "kick",
            Self::Tban => "tban",
            Self::Tmute => "tmute",
        }
    }
}

impl fmt::Display for FloodAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FloodAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ban" => Ok(Self::Ban),
            "mute" => Ok(Self::Mute),
            "kick" => Ok(Self::Kick),
            "tban" => Ok(Self::Tban),
            "tmute" => Ok(Self::Tmute),
            _ => Err(()),
        }
    }
}

/// Windowed counting: `messages` within `seconds` of the first message.
///
/// Both fields read as 0 when missing from storage or not a usable
/// non-negative integer; a zero field makes the tracker fall back to the flat
/// limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FloodTimer {
    #[serde(default, deserialize_with = "lenient_count")]
    pub messages: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub seconds: u64,
}

impl FloodTimer {
    /// Timer with both fields usable.
    pub fn valid(self) -> Option<(u32, u64)> {
        (self.messages > 0 && self.seconds > 0).then_some((self.messages, self.seconds))
    }
}

/// Stored number in whatever shape it was written.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCount {
    Int(i64),
    Float(f64),
    Other(IgnoredAny),
}

/// Read a count, turning negative, fractional, null or mistyped values into 0.
fn lenient_count<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64> + Default,
{
    let value = match RawCount::deserialize(deserializer)? {
        RawCount::Int(n) => Some(n),
        RawCount::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        RawCount::Float(_) | RawCount::Other(_) => None,
    };

    Ok(value.and_then(|n| T::try_from(n).ok()).unwrap_or_default())
}

/// Read a timer, treating anything that is not a timer document as unset.
fn lenient_timer<'de, D>(deserializer: D) -> Result<Option<FloodTimer>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimer {
        Timer(FloodTimer),
        Other(IgnoredAny),
    }

    Ok(match RawTimer::deserialize(deserializer)? {
        RawTimer::Timer(timer) => Some(timer),
        RawTimer::Other(_) => None,
    })
}

/// Antiflood configuration for one chat.
///
/// Missing documents and missing fields read as [`ChatFloodConfig::DEFAULT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatFloodConfig {
    pub chat_id: i64,

    /// Messages per episode before acting; 0 disables antiflood.
    pub limit: u32,

    pub action: FloodAction,

    /// Raw duration for tban/tmute, parsed when enforcing.
    pub duration: Option<String>,

    /// When set, counting only triggers inside the time window.
    #[serde(deserialize_with = "lenient_timer")]
    pub timer: Option<FloodTimer>,

    /// Delete the triggering message before acting.
    #[serde(rename = "clear")]
    pub clear_on_violation: bool,
}

impl ChatFloodConfig {
    /// Settings of a chat that never configured antiflood.
    pub const DEFAULT: Self = Self {
        chat_id: 0,
        limit: 7,
        action: FloodAction::Mute,
        duration: None,
        timer: None,
        clear_on_violation: false,
    };

    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            ..Self::DEFAULT
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Merge the fields present in `update`.
    #[cfg(test)]
    pub fn apply(&mut self, update: &FloodSettingsUpdate) {
        if let Some(limit) = update.limit {
            self.limit = limit;
        }
        if let Some(action) = update.action {
            self.action = action;
        }
        if let Some(duration) = &update.duration {
            self.duration = duration.clone();
        }
        if let Some(timer) = update.timer {
            self.timer = timer;
        }
        if let Some(clear) = update.clear_on_violation {
            self.clear_on_violation = clear;
        }
    }
}

impl Default for ChatFloodConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Partial update of a [`ChatFloodConfig`].
///
/// `None` leaves a field untouched. For the optional fields `Some(None)`
/// clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FloodSettingsUpdate {
    pub limit: Option<u32>,
    pub action: Option<FloodAction>,
    pub duration: Option<Option<String>>,
    pub timer: Option<Option<FloodTimer>>,
    pub clear_on_violation: Option<bool>,
}

impl FloodSettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Whether the update changes how messages are counted.
    pub fn touches_counting(&self) -> bool {
        self.limit.is_some() || self.timer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ChatFloodConfig::new(-100);
        assert_eq!(cfg.chat_id, -100);
        assert_eq!(cfg.limit, 7);
        assert_eq!(cfg.action, FloodAction::Mute);
        assert!(cfg.timer.is_none());
        assert!(cfg.duration.is_none());
        assert!(!cfg.clear_on_violation);
        assert!(cfg.is_enabled());
    }

    #[test]
    fn test_apply_merges_only_present_fields() {
        let mut cfg = ChatFloodConfig::new(1);
        cfg.apply(&FloodSettingsUpdate {
            action: Some(FloodAction::Tban),
            duration: Some(Some("1h".into())),
            ..Default::default()
        });
        assert_eq!(cfg.action, FloodAction::Tban);
        assert_eq!(cfg.duration.as_deref(), Some("1h"));
        assert_eq!(cfg.limit, 7);

        cfg.apply(&FloodSettingsUpdate {
            duration: Some(None),
            timer: Some(Some(FloodTimer { messages: 5, seconds: 10 })),
            ..Default::default()
        });
        assert!(cfg.duration.is_none());
        assert_eq!(cfg.timer, Some(FloodTimer { messages: 5, seconds: 10 }));
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("TMUTE".parse::<FloodAction>(), Ok(FloodAction::Tmute));
        assert_eq!("kick".parse::<FloodAction>(), Ok(FloodAction::Kick));
        assert!("warn".parse::<FloodAction>().is_err());
        assert!(FloodAction::Tban.is_timed());
        assert!(!FloodAction::Ban.is_timed());
    }

    #[test]
    fn test_timer_validity() {
        assert_eq!(FloodTimer { messages: 3, seconds: 5 }.valid(), Some((3, 5)));
        assert_eq!(FloodTimer { messages: 0, seconds: 5 }.valid(), None);
        assert_eq!(FloodTimer { messages: 3, seconds: 0 }.valid(), None);
    }

    fn decode(doc: mongodb::bson::Document) -> ChatFloodConfig {
        mongodb::bson::from_document(doc).unwrap()
    }

    #[test]
    fn test_bad_timer_fields_read_as_zero() {
        use mongodb::bson::{doc, Bson};

        let cfg = decode(doc! { "chat_id": 1_i64, "limit": 5_i32, "timer": { "messages": -3, "seconds": 10 } });
        assert_eq!(cfg.limit, 5);
        assert_eq!(cfg.timer, Some(FloodTimer { messages: 0, seconds: 10 }));
        assert_eq!(cfg.timer.and_then(FloodTimer::valid), None);

        let cfg = decode(doc! { "chat_id": 1_i64, "timer": { "messages": Bson::Null, "seconds": "ten" } });
        assert_eq!(cfg.timer, Some(FloodTimer { messages: 0, seconds: 0 }));

        let cfg = decode(doc! { "chat_id": 1_i64, "timer": { "messages": 4.0, "seconds": 2.5 } });
        assert_eq!(cfg.timer, Some(FloodTimer { messages: 4, seconds: 0 }));

        let cfg = decode(doc! { "chat_id": 1_i64, "timer": { "messages": (4_i64 << 40), "seconds": 10_i64 } });
        assert_eq!(cfg.timer, Some(FloodTimer { messages: 0, seconds: 10 }));
    }

    #[test]
    fn test_mistyped_timer_reads_as_unset() {
        use mongodb::bson::{doc, Bson};

        let cfg = decode(doc! { "chat_id": 1_i64, "limit": 3_i32, "timer": "5/10" });
        assert_eq!(cfg.limit, 3);
        assert!(cfg.timer.is_none());

        assert!(decode(doc! { "chat_id": 1_i64, "timer": Bson::Null }).timer.is_none());
        assert!(decode(doc! { "chat_id": 1_i64 }).timer.is_none());

        let cfg = decode(doc! { "chat_id": 1_i64, "timer": { "messages": 3_i32, "seconds": 5_i64 } });
        assert_eq!(cfg.timer.and_then(FloodTimer::valid), Some((3, 5)));
    }

    #[test]
    fn test_update_flags() {
        assert!(FloodSettingsUpdate::default().is_empty());
        let update = FloodSettingsUpdate {
            clear_on_violation: Some(true),
            ..Default::default()
        };
        assert!(!update.is_empty());
        assert!(!update.touches_counting());
        let update = FloodSettingsUpdate {
            timer: Some(None),
            ..Default::default()
        };
        assert!(update.touches_counting());
    }
}
