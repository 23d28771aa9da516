use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Wait in milliseconds after which a waiter stops filtering on location.
pub const WIDEN_LOCATION_AFTER_MS: i64 = 5_000;
/// Wait after which a waiter also stops filtering on gender (DIAMOND excepted).
pub const WIDEN_GENDER_AFTER_MS: i64 = 10_000;
/// Wait after which the client is told to fall back to a bot partner.
pub const BOT_MODE_AFTER_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn opposite(&self) -> Gender {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Free,
    Gold,
    Diamond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Random,
    Video,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Random => "random",
            MatchMode::Video => "video",
        }
    }
}

/// Soft filters a waiter applies to candidates. Stored only after tier
/// filtering: FREE keeps neither field, GOLD keeps gender, DIAMOND keeps both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Preferences {
    pub fn filtered_for_tier(self, tier: Tier) -> Preferences {
        match tier {
            Tier::Free => Preferences::default(),
            Tier::Gold => Preferences {
                gender: self.gender,
                location: None,
            },
            Tier::Diamond => self,
        }
    }
}

/// A user currently waiting to be matched. One record per uid across both
/// queue partitions; the widen stage is derived from wait time, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueUser {
    pub uid: String,
    pub socket_id: String,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub tier: Tier,
    pub mode: MatchMode,
    #[serde(default)]
    pub preferences: Preferences,
    /// Epoch milliseconds; doubles as the partition score.
    pub joined_at: i64,
    #[serde(default)]
    pub bot_mode_active: bool,
}

impl QueueUser {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uid: &str,
        socket_id: &str,
        gender: Gender,
        location: Option<String>,
        tier: Tier,
        mode: MatchMode,
        preferences: Preferences,
    ) -> Self {
        QueueUser {
            uid: uid.to_string(),
            socket_id: socket_id.to_string(),
            gender,
            location,
            tier,
            mode,
            preferences: preferences.filtered_for_tier(tier),
            joined_at: Utc::now().timestamp_millis(),
            bot_mode_active: false,
        }
    }

    pub fn is_guest(&self) -> bool {
        super::is_guest(&self.uid)
    }

    pub fn wait_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.joined_at
    }

    /// 0 = strict, 1 = ignore location, 2 = also ignore gender. DIAMOND users
    /// never reach stage 2 implicitly.
    pub fn widen_stage(&self, now_ms: i64) -> u8 {
        let wait = self.wait_ms(now_ms);
        if wait > WIDEN_GENDER_AFTER_MS && self.tier != Tier::Diamond {
            2
        } else if wait > WIDEN_LOCATION_AFTER_MS {
            1
        } else {
            0
        }
    }

    /// The one-shot bot-fallback notice is due once the wait passes 30 s.
    pub fn bot_mode_due(&self, now_ms: i64) -> bool {
        !self.bot_mode_active && self.wait_ms(now_ms) > BOT_MODE_AFTER_MS
    }

    /// The gender this user is currently looking for; `None` means any.
    /// Explicit preference wins, otherwise the opposite gender until the
    /// waiter has widened past gender filtering.
    pub fn target_gender(&self, stage: u8) -> Option<Gender> {
        if let Some(preferred) = self.preferences.gender {
            Some(preferred)
        } else if stage < 2 {
            Some(self.gender.opposite())
        } else {
            None
        }
    }

    pub fn accepts_gender(&self, stage: u8, candidate: Gender) -> bool {
        match self.target_gender(stage) {
            Some(wanted) => wanted == candidate,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(tier: Tier, preferences: Preferences) -> QueueUser {
        QueueUser::new(
            "user1",
            "socket1",
            Gender::Female,
            Some("IN".to_string()),
            tier,
            MatchMode::Random,
            preferences,
        )
    }

    #[test]
    fn test_free_tier_strips_all_preferences() {
        let u = user(
            Tier::Free,
            Preferences {
                gender: Some(Gender::Male),
                location: Some("IN".to_string()),
            },
        );
        assert_eq!(u.preferences, Preferences::default());
    }

    #[test]
    fn test_gold_tier_keeps_gender_only() {
        let u = user(
            Tier::Gold,
            Preferences {
                gender: Some(Gender::Male),
                location: Some("IN".to_string()),
            },
        );
        assert_eq!(u.preferences.gender, Some(Gender::Male));
        assert_eq!(u.preferences.location, None);
    }

    #[test]
    fn test_diamond_tier_keeps_both_preferences() {
        let u = user(
            Tier::Diamond,
            Preferences {
                gender: Some(Gender::Male),
                location: Some("IN".to_string()),
            },
        );
        assert_eq!(u.preferences.gender, Some(Gender::Male));
        assert_eq!(u.preferences.location, Some("IN".to_string()));
    }

    #[test]
    fn test_widen_stage_boundaries() {
        let u = user(Tier::Free, Preferences::default());
        assert_eq!(u.widen_stage(u.joined_at + 5_000), 0);
        assert_eq!(u.widen_stage(u.joined_at + 5_001), 1);
        assert_eq!(u.widen_stage(u.joined_at + 10_000), 1);
        assert_eq!(u.widen_stage(u.joined_at + 10_001), 2);
    }

    #[test]
    fn test_diamond_never_widens_gender() {
        let u = user(Tier::Diamond, Preferences::default());
        assert_eq!(u.widen_stage(u.joined_at + 10_001), 1);
        assert_eq!(u.widen_stage(u.joined_at + 60_000), 1);
    }

    #[test]
    fn test_bot_mode_due_boundary() {
        let mut u = user(Tier::Free, Preferences::default());
        assert!(!u.bot_mode_due(u.joined_at + 30_000));
        assert!(u.bot_mode_due(u.joined_at + 30_001));
        u.bot_mode_active = true;
        assert!(!u.bot_mode_due(u.joined_at + 30_001));
    }

    #[test]
    fn test_target_gender_defaults_to_opposite() {
        let u = user(Tier::Free, Preferences::default());
        assert_eq!(u.target_gender(0), Some(Gender::Male));
        assert_eq!(u.target_gender(1), Some(Gender::Male));
        assert_eq!(u.target_gender(2), None);
    }

    #[test]
    fn test_explicit_gender_preference_survives_widening() {
        let u = user(
            Tier::Gold,
            Preferences {
                gender: Some(Gender::Female),
                location: None,
            },
        );
        assert_eq!(u.target_gender(2), Some(Gender::Female));
        assert!(u.accepts_gender(2, Gender::Female));
        assert!(!u.accepts_gender(2, Gender::Male));
    }

    #[test]
    fn test_guest_prefix_detection() {
        let mut u = user(Tier::Free, Preferences::default());
        assert!(!u.is_guest());
        u.uid = "guest_abc123".to_string();
        assert!(u.is_guest());
    }
}
