//! Advisory lock guarding the state against concurrent runs

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime of a lock nobody released, in seconds
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 900;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    /// Command that took the lock, e.g. `apply`
    pub operation: String,
    /// `user@host` of the holder
    pub who: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(operation: impl Into<String>) -> Self {
        Self::with_timeout(operation, TimeDelta::seconds(DEFAULT_LOCK_TIMEOUT_SECS))
    }

    pub fn with_timeout(operation: impl Into<String>, lifetime: TimeDelta) -> Self {
        let created = Utc::now();
        LockInfo {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: holder_name(),
            created,
            expires: created + lifetime,
        }
    }

    /// An expired lock may be taken over by the next run
    pub fn is_expired(&self) -> bool {
        self.expires < Utc::now()
    }

    pub fn time_remaining(&self) -> TimeDelta {
        self.expires.signed_duration_since(Utc::now())
    }
}

fn holder_name() -> String {
    let user = ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .unwrap_or_else(|| "unknown".to_string());
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{user}@{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lock_is_held() {
        let lock = LockInfo::new("refresh");
        assert_eq!(lock.operation, "refresh");
        assert!(lock.who.contains('@'));
        assert!(!lock.is_expired());
        assert_eq!(
            (lock.expires - lock.created).num_seconds(),
            DEFAULT_LOCK_TIMEOUT_SECS
        );
    }

    #[test]
    fn remaining_time_counts_down() {
        let lock = LockInfo::with_timeout("import", TimeDelta::seconds(120));
        let left = lock.time_remaining().num_seconds();
        assert!((115..=120).contains(&left));
    }

    #[test]
    fn past_expiry_is_expired() {
        let lock = LockInfo::with_timeout("plan", TimeDelta::seconds(-1));
        assert!(lock.is_expired());
        assert!(lock.time_remaining() < TimeDelta::zero());
    }

    #[test]
    fn survives_json() {
        let lock = LockInfo::new("destroy");
        let json = serde_json::to_string(&lock).unwrap();
        assert_eq!(serde_json::from_str::<LockInfo>(&json).unwrap(), lock);
    }
}
