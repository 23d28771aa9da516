use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A time-bounded (or indefinite) entry in the deny list.
/// `expires_at == 0` means the ban never expires on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanEntry {
    pub uid: String,
    pub reason: String,
    pub banned_at: i64,
    pub expires_at: i64,
}

impl BanEntry {
    pub fn new(uid: &str, reason: &str, duration_minutes: i64) -> Self {
        let banned_at = Utc::now().timestamp_millis();
        let expires_at = if duration_minutes > 0 {
            banned_at + duration_minutes * 60_000
        } else {
            0
        };
        BanEntry {
            uid: uid.to_string(),
            reason: reason.to_string(),
            banned_at,
            expires_at,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.expires_at == 0
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        !self.is_permanent() && now_ms >= self.expires_at
    }

    /// Milliseconds left on the ban: `-1` for permanent, otherwise the
    /// remaining time (callers treat expired entries as absent before asking).
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        if self.is_permanent() {
            -1
        } else {
            (self.expires_at - now_ms).max(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_is_permanent() {
        let entry = BanEntry::new("user1", "abuse", 0);
        assert!(entry.is_permanent());
        assert!(!entry.is_expired(entry.banned_at + 1_000_000_000));
        assert_eq!(entry.remaining_ms(entry.banned_at), -1);
    }

    #[test]
    fn test_timed_ban_expires() {
        let entry = BanEntry::new("user1", "spam", 10);
        assert!(!entry.is_expired(entry.banned_at + 10 * 60_000 - 1));
        assert!(entry.is_expired(entry.banned_at + 10 * 60_000));
        assert_eq!(entry.remaining_ms(entry.banned_at), 10 * 60_000);
    }
}
