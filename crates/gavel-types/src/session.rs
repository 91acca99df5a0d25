//! Session entity and its read model.
//!
//! A session is implicitly invalid once `now > last_activity + timeout`,
//! whether or not a sweep has removed it yet.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Origin captured when the session was created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    /// Device / transport-level session id supplied by the caller.
    pub device_id: String,
    pub ip_address: String,
    pub user_agent: String,
}

impl Fingerprint {
    #[must_use]
    pub fn new(
        device_id: impl Into<String>,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Compare the hijack-relevant parts: `(ip matches, user agent matches)`.
    #[must_use]
    pub fn compare(&self, ip_address: &str, user_agent: &str) -> (bool, bool) {
        (self.ip_address == ip_address, self.user_agent == user_agent)
    }
}

/// One authenticated user context.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub fingerprint: Fingerprint,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub timeout: TimeDelta,
}

impl Session {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
        timeout: TimeDelta,
    ) -> Self {
        Self {
            username: username.into(),
            fingerprint,
            login_time: now,
            last_activity: now,
            timeout,
        }
    }

    /// `now > last_activity + timeout`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Registered sessions are live until they expire; logout removes them.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.last_activity
            .checked_add_signed(self.timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Record activity. Never moves `last_activity` backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    #[must_use]
    pub fn info(&self, token_prefix: &str, now: DateTime<Utc>) -> SessionInfo {
        SessionInfo {
            token_prefix: token_prefix.to_string(),
            username: self.username.clone(),
            fingerprint: self.fingerprint.clone(),
            login_time: self.login_time,
            last_activity: self.last_activity,
            session_duration_secs: (now - self.login_time).num_seconds().max(0),
            inactive_secs: (now - self.last_activity).num_seconds().max(0),
        }
    }
}

/// Snapshot of a live session for admin views. Never contains the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// First characters of the token, enough to tell sessions apart in logs.
    pub token_prefix: String,
    pub username: String,
    pub fingerprint: Fingerprint,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub session_duration_secs: i64,
    pub inactive_secs: i64,
}
