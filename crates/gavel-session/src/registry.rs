//! The session registry.
//!
//! Two indices:
//!
//! - `sessions`: digest -> session, sharded (`DashMap`). Touches and reads
//!   only take the one shard lock for their token.
//! - `by_user`: username -> digests, behind a single mutex.
//!
//! Anything that adds or removes a session (create, logout, lazy expiry,
//! sweep) holds `by_user` for the whole change, so the two indices never
//! disagree and no empty per-user set is left behind. Lock order is always
//! `by_user` then a shard; no path holds a shard guard while waiting on
//! `by_user`.
//!
//! Once a session's inactivity window has passed it is dead for good:
//! `touch` will not revive it, and every read treats it as absent.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, mapref::entry::Entry as MapEntry};
use gavel_types::{Fingerprint, GavelError, Result, Session, SessionConfig, SessionInfo};
use parking_lot::Mutex;

use crate::token::{SessionToken, TokenDigest, prefix_of};

struct Entry {
    session: Session,
    /// Loggable head of the token; the token itself is not kept.
    prefix: String,
}

/// Why a session left the registry.
#[derive(Debug, Clone, Copy)]
enum Removal {
    Logout,
    Invalidated,
    Expired,
}

pub struct SessionRegistry {
    sessions: DashMap<TokenDigest, Entry>,
    by_user: Mutex<HashMap<String, HashSet<TokenDigest>>>,
    timeout: TimeDelta,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: Mutex::new(HashMap::new()),
            timeout: config.timeout_delta(),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> TimeDelta {
        self.timeout
    }

    // =================================================================
    // Lifecycle
    // =================================================================

    /// Open a session for `username` and return its token.
    ///
    /// A user may hold any number of sessions at once.
    ///
    /// # Errors
    /// [`GavelError::InvalidSession`] for a blank username.
    pub fn create_session(
        &self,
        username: &str,
        device_id: &str,
        ip_address: &str,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionToken> {
        let username = username.trim();
        if username.is_empty() {
            return Err(GavelError::InvalidSession {
                reason: "username must not be blank".into(),
            });
        }
        let fingerprint = Fingerprint::new(device_id, ip_address, user_agent);

        let mut by_user = self.by_user.lock();
        let token = loop {
            let token = SessionToken::generate();
            if let MapEntry::Vacant(slot) = self.sessions.entry(token.digest()) {
                slot.insert(Entry {
                    session: Session::new(username, fingerprint, now, self.timeout),
                    prefix: token.prefix().to_string(),
                });
                break token;
            }
        };
        by_user
            .entry(username.to_string())
            .or_default()
            .insert(token.digest());
        drop(by_user);

        tracing::info!(
            user = username,
            token = token.prefix(),
            ip = ip_address,
            "Session created"
        );
        Ok(token)
    }

    /// End a session. Returns `false` if the token was not registered.
    pub fn logout(&self, token: &str) -> bool {
        self.remove(TokenDigest::of(token), Removal::Logout, None)
    }

    /// Drop a session after a failed security check.
    pub fn invalidate(&self, token: &str) -> bool {
        self.remove(TokenDigest::of(token), Removal::Invalidated, None)
    }

    /// End every session of `username`.
    ///
    /// # Errors
    /// [`GavelError::UserNotFound`] if the user holds no sessions.
    pub fn logout_all_for_user(&self, username: &str) -> Result<usize> {
        let mut by_user = self.by_user.lock();
        let digests = by_user
            .remove(username)
            .ok_or_else(|| GavelError::UserNotFound(username.to_string()))?;
        let removed = digests
            .iter()
            .filter(|digest| self.sessions.remove(digest).is_some())
            .count();
        drop(by_user);

        tracing::info!(user = username, sessions = removed, "Logged out all sessions");
        Ok(removed)
    }

    /// Remove every session whose inactivity window has elapsed.
    ///
    /// Returns how many were removed; running it again at the same `now`
    /// returns 0.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        // Scan without the user index; each removal rechecks and locks alone.
        let expired: Vec<TokenDigest> = self
            .sessions
            .iter()
            .filter(|e| !e.session.is_live(now))
            .map(|e| *e.key())
            .collect();

        let mut removed = 0;
        for digest in expired {
            let mut by_user = self.by_user.lock();
            if let Some((_, entry)) = self
                .sessions
                .remove_if(&digest, |_, e| !e.session.is_live(now))
            {
                unlink(&mut by_user, &entry.session.username, &digest);
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Swept expired sessions");
        }
        removed
    }

    /// Shared removal path. With `stale_at` set, only removes the session if
    /// it is still dead at that instant.
    fn remove(
        &self,
        digest: TokenDigest,
        cause: Removal,
        stale_at: Option<DateTime<Utc>>,
    ) -> bool {
        let mut by_user = self.by_user.lock();
        let removed = match stale_at {
            Some(now) => self
                .sessions
                .remove_if(&digest, |_, e| !e.session.is_live(now)),
            None => self.sessions.remove(&digest),
        };
        let Some((_, entry)) = removed else {
            return false;
        };
        unlink(&mut by_user, &entry.session.username, &digest);
        drop(by_user);

        match cause {
            Removal::Logout => tracing::info!(
                user = %entry.session.username,
                token = %entry.prefix,
                "Session logged out"
            ),
            Removal::Invalidated => tracing::warn!(
                user = %entry.session.username,
                token = %entry.prefix,
                "Session invalidated"
            ),
            Removal::Expired => tracing::debug!(
                user = %entry.session.username,
                token = %entry.prefix,
                "Session expired"
            ),
        }
        true
    }

    // =================================================================
    // Checks
    // =================================================================

    /// `true` iff the token is registered, active, and inside its
    /// inactivity window. An expired session found here is removed.
    pub fn is_valid(&self, token: &str, now: DateTime<Utc>) -> bool {
        let digest = TokenDigest::of(token);
        let live = self.sessions.get(&digest).map(|e| e.session.is_live(now));
        match live {
            Some(true) => true,
            Some(false) => {
                self.remove(digest, Removal::Expired, Some(now));
                false
            }
            None => false,
        }
    }

    /// The user behind a live token.
    ///
    /// # Errors
    /// [`GavelError::SessionNotFound`] if the token is unknown or expired.
    pub fn resolve(&self, token: &str, now: DateTime<Utc>) -> Result<String> {
        let digest = TokenDigest::of(token);
        let lookup = self
            .sessions
            .get(&digest)
            .map(|e| (e.session.is_live(now), e.session.username.clone()));
        match lookup {
            Some((true, username)) => Ok(username),
            Some((false, _)) => {
                self.remove(digest, Removal::Expired, Some(now));
                Err(GavelError::SessionNotFound)
            }
            None => Err(GavelError::SessionNotFound),
        }
    }

    /// Compare the request origin with the one captured at login.
    ///
    /// `false` for an unknown token or when either the IP address or the
    /// user agent differs. The session is left in place; see
    /// [`Self::verify_fingerprint`] for the variant that also invalidates.
    pub fn validate_fingerprint(&self, token: &str, ip_address: &str, user_agent: &str) -> bool {
        let Some(entry) = self.sessions.get(&TokenDigest::of(token)) else {
            return false;
        };
        let (ip_match, user_agent_match) =
            entry.session.fingerprint.compare(ip_address, user_agent);
        if !(ip_match && user_agent_match) {
            tracing::warn!(
                user = %entry.session.username,
                token = %entry.prefix,
                ip_match,
                user_agent_match,
                "Session fingerprint mismatch"
            );
        }
        ip_match && user_agent_match
    }

    /// Fingerprint check that invalidates the session on mismatch.
    ///
    /// # Errors
    /// - [`GavelError::SessionNotFound`] for an unknown or expired token
    /// - [`GavelError::FingerprintMismatch`] after invalidating the session
    pub fn verify_fingerprint(
        &self,
        token: &str,
        ip_address: &str,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let digest = TokenDigest::of(token);
        let (live, (ip_match, user_agent_match)) = self
            .sessions
            .get(&digest)
            .map(|e| {
                (
                    e.session.is_live(now),
                    e.session.fingerprint.compare(ip_address, user_agent),
                )
            })
            .ok_or(GavelError::SessionNotFound)?;
        if !live {
            self.remove(digest, Removal::Expired, Some(now));
            return Err(GavelError::SessionNotFound);
        }
        if ip_match && user_agent_match {
            return Ok(());
        }
        self.remove(digest, Removal::Invalidated, None);
        Err(GavelError::FingerprintMismatch {
            ip_match,
            user_agent_match,
        })
    }

    /// Record activity. Unknown and already-expired tokens are ignored.
    pub fn touch(&self, token: &str, now: DateTime<Utc>) {
        if let Some(mut entry) = self.sessions.get_mut(&TokenDigest::of(token)) {
            if entry.session.is_live(now) {
                entry.session.touch(now);
            }
        }
    }

    // =================================================================
    // Read models
    // =================================================================

    /// Live sessions at `now`.
    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.sessions
            .iter()
            .filter(|e| e.session.is_live(now))
            .count()
    }

    /// Live sessions per user at `now`. Users with none are absent.
    pub fn per_user_active_counts(&self, now: DateTime<Utc>) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.sessions {
            if entry.session.is_live(now) {
                *counts.entry(entry.session.username.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn session_info(&self, token: &str, now: DateTime<Utc>) -> Option<SessionInfo> {
        self.sessions
            .get(&TokenDigest::of(token))
            .filter(|e| e.session.is_live(now))
            .map(|e| e.session.info(prefix_of(token), now))
    }

    /// Live sessions of one user, oldest login first.
    pub fn active_sessions_for_user(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Vec<SessionInfo> {
        let digests: Vec<TokenDigest> = self
            .by_user
            .lock()
            .get(username)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let mut infos: Vec<SessionInfo> = digests
            .iter()
            .filter_map(|digest| {
                self.sessions
                    .get(digest)
                    .filter(|e| e.session.is_live(now))
                    .map(|e| e.session.info(&e.prefix, now))
            })
            .collect();
        infos.sort_by_key(|info| info.login_time);
        infos
    }

    /// Every live session, oldest login first.
    pub fn all_active_sessions(&self, now: DateTime<Utc>) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .iter()
            .filter(|e| e.session.is_live(now))
            .map(|e| e.session.info(&e.prefix, now))
            .collect();
        infos.sort_by(|a, b| {
            a.login_time
                .cmp(&b.login_time)
                .then_with(|| a.username.cmp(&b.username))
        });
        infos
    }

    pub fn is_user_logged_in(&self, username: &str, now: DateTime<Utc>) -> bool {
        !self.active_sessions_for_user(username, now).is_empty()
    }

    /// Stored sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Users with at least one stored session.
    pub fn tracked_users(&self) -> usize {
        self.by_user.lock().len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

/// Remove one digest from a user's set, dropping the set when it empties.
fn unlink(
    by_user: &mut HashMap<String, HashSet<TokenDigest>>,
    username: &str,
    digest: &TokenDigest,
) {
    if let Some(set) = by_user.get_mut(username) {
        set.remove(digest);
        if set.is_empty() {
            by_user.remove(username);
        }
    }
}
