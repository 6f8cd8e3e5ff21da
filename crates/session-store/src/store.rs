//! Session store
//!
//! A single tokio Mutex guards both maps, so every operation on a username
//! or a state value is serialized. Concurrent logins for the same user
//! resolve deterministically: the first wins, the second sees
//! `AlreadyLoggedIn`. Reads clone the entry out so callers never hold the
//! lock across a network call.

use std::collections::HashMap;
use std::time::Duration;

use azure_auth::AccessToken;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// How long an issued `state` stays redeemable.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Outstanding authorizations kept per user; older ones are evicted.
pub const MAX_PENDING_PER_USER: usize = 5;

/// Login state for one username.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSession {
    pub username: String,
    pub logged_in: bool,
    pub azure: Option<AzureState>,
}

/// Result of the most recent callback for a session.
///
/// Exactly one of `access_token` / `error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct AzureState {
    /// Opaque handle of the credential that produced the token.
    pub credential: String,
    pub access_token: Option<AccessToken>,
    pub error: Option<String>,
}

/// Outstanding authorize redirect, keyed by its `state` value.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub username: String,
    pub code_verifier: String,
    pub created_at: Instant,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, UserSession>,
    pending: HashMap<String, PendingAuthorization>,
}

impl Inner {
    fn require_logged_in(&mut self, username: &str) -> Result<&mut UserSession> {
        self.sessions
            .get_mut(username)
            .filter(|s| s.logged_in)
            .ok_or_else(|| SessionError::NotLoggedIn(username.to_string()))
    }
}

pub struct SessionStore {
    inner: Mutex<Inner>,
    state_ttl: Duration,
}

impl SessionStore {
    pub fn new(state_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            state_ttl,
        }
    }

    /// Create a logged-in session. Rejected if the user is already logged in.
    pub async fn login(&self, username: &str) -> Result<UserSession> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.get(username).is_some_and(|s| s.logged_in) {
            return Err(SessionError::AlreadyLoggedIn(username.to_string()));
        }
        let session = UserSession {
            username: username.to_string(),
            logged_in: true,
            azure: None,
        };
        inner.sessions.insert(username.to_string(), session.clone());
        info!(username, "session created");
        Ok(session)
    }

    /// Remove the session and any authorizations it still has in flight.
    ///
    /// Returns the removed session with `logged_in` flipped to false.
    pub async fn logout(&self, username: &str) -> Result<UserSession> {
        let mut inner = self.inner.lock().await;
        let mut session = inner
            .sessions
            .remove(username)
            .filter(|s| s.logged_in)
            .ok_or_else(|| SessionError::NotLoggedIn(username.to_string()))?;
        inner.pending.retain(|_, p| p.username != username);
        session.logged_in = false;
        info!(username, "session removed");
        Ok(session)
    }

    pub async fn get(&self, username: &str) -> Option<UserSession> {
        let inner = self.inner.lock().await;
        inner.sessions.get(username).cloned()
    }

    pub async fn is_logged_in(&self, username: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.sessions.get(username).is_some_and(|s| s.logged_in)
    }

    /// Record an issued `state` for a logged-in user. Expired entries are
    /// pruned on the way in.
    pub async fn begin_authorization(
        &self,
        username: &str,
        state: String,
        code_verifier: String,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.require_logged_in(username)?;

        let ttl = self.state_ttl;
        let before = inner.pending.len();
        inner.pending.retain(|_, p| p.created_at.elapsed() < ttl);
        let pruned = before - inner.pending.len();
        if pruned > 0 {
            debug!(pruned, "dropped expired authorizations");
        }

        let mut own: Vec<(Instant, String)> = inner
            .pending
            .iter()
            .filter(|(_, p)| p.username == username)
            .map(|(k, p)| (p.created_at, k.clone()))
            .collect();
        if own.len() >= MAX_PENDING_PER_USER {
            own.sort();
            let excess = own.len() + 1 - MAX_PENDING_PER_USER;
            for (_, key) in own.into_iter().take(excess) {
                inner.pending.remove(&key);
            }
            debug!(username, evicted = excess, "evicted oldest authorizations");
        }

        inner.pending.insert(
            state,
            PendingAuthorization {
                username: username.to_string(),
                code_verifier,
                created_at: Instant::now(),
            },
        );
        debug!(username, "authorization started");
        Ok(())
    }

    /// Redeem a callback `state` for the session identified by `username`.
    ///
    /// The entry is consumed on success and on expiry. A state issued to a
    /// different user is left in place so a forged callback cannot burn it.
    pub async fn complete_authorization(
        &self,
        state: &str,
        username: &str,
    ) -> Result<PendingAuthorization> {
        let mut inner = self.inner.lock().await;
        let pending = inner
            .pending
            .get(state)
            .ok_or(SessionError::UnknownState)?;

        if pending.created_at.elapsed() >= self.state_ttl {
            inner.pending.remove(state);
            return Err(SessionError::StateExpired);
        }
        if pending.username != username {
            return Err(SessionError::StateMismatch);
        }
        inner.require_logged_in(username)?;

        inner.pending.remove(state).ok_or(SessionError::UnknownState)
    }

    /// Attach a freshly issued token, clearing any earlier error.
    pub async fn store_token(
        &self,
        username: &str,
        credential: String,
        token: AccessToken,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let session = inner.require_logged_in(username)?;
        session.azure = Some(AzureState {
            credential,
            access_token: Some(token),
            error: None,
        });
        Ok(())
    }

    /// Record a failed exchange. Any earlier token is discarded.
    pub async fn store_error(
        &self,
        username: &str,
        credential: String,
        error: String,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let session = inner.require_logged_in(username)?;
        session.azure = Some(AzureState {
            credential,
            access_token: None,
            error: Some(error),
        });
        Ok(())
    }

    /// Token usable for a resource call right now.
    pub async fn access_token(&self, username: &str) -> Result<AccessToken> {
        let mut inner = self.inner.lock().await;
        let session = inner.require_logged_in(username)?;
        let azure = session.azure.as_ref().ok_or(SessionError::NoToken)?;
        if let Some(error) = &azure.error {
            return Err(SessionError::ExchangeFailed(error.clone()));
        }
        let token = azure.access_token.as_ref().ok_or(SessionError::NoToken)?;
        if token.is_expired() {
            return Err(SessionError::TokenExpired);
        }
        Ok(token.clone())
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_auth::unix_millis;
    use std::sync::Arc;

    fn live_token() -> AccessToken {
        AccessToken::new("at_live", unix_millis() + 3_600_000)
    }

    async fn logged_in(username: &str) -> SessionStore {
        let store = SessionStore::default();
        store.login(username).await.unwrap();
        store
    }

    #[tokio::test]
    async fn login_sets_logged_in() {
        let store = SessionStore::default();
        let session = store.login("testuser").await.unwrap();
        assert!(session.logged_in);
        assert!(store.is_logged_in("testuser").await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn second_login_without_logout_is_rejected() {
        let store = logged_in("testuser").await;
        assert_eq!(
            store.login("testuser").await,
            Err(SessionError::AlreadyLoggedIn("testuser".into()))
        );
    }

    #[tokio::test]
    async fn login_again_after_logout() {
        let store = logged_in("testuser").await;
        let removed = store.logout("testuser").await.unwrap();
        assert!(!removed.logged_in);
        assert!(store.get("testuser").await.is_none());
        assert!(store.login("testuser").await.is_ok());
    }

    #[tokio::test]
    async fn logout_unknown_user_errors() {
        let store = SessionStore::default();
        assert_eq!(
            store.logout("ghost").await,
            Err(SessionError::NotLoggedIn("ghost".into()))
        );
    }

    #[tokio::test]
    async fn concurrent_logins_admit_exactly_one() {
        let store = Arc::new(SessionStore::default());
        let mut handles = vec![];
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.login("racer").await.is_ok() }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn begin_authorization_requires_login() {
        let store = SessionStore::default();
        let err = store
            .begin_authorization("nobody", "s".into(), "v".into())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotLoggedIn("nobody".into()));
        assert_eq!(store.pending_len().await, 0);
    }

    #[tokio::test]
    async fn state_is_consumed_once() {
        let store = logged_in("alice").await;
        store
            .begin_authorization("alice", "state-1".into(), "verifier-1".into())
            .await
            .unwrap();

        let pending = store.complete_authorization("state-1", "alice").await.unwrap();
        assert_eq!(pending.username, "alice");
        assert_eq!(pending.code_verifier, "verifier-1");

        assert_eq!(
            store.complete_authorization("state-1", "alice").await.unwrap_err(),
            SessionError::UnknownState
        );
    }

    #[tokio::test]
    async fn state_from_other_user_is_rejected_and_kept() {
        let store = logged_in("alice").await;
        store.login("mallory").await.unwrap();
        store
            .begin_authorization("alice", "alice-state".into(), "v".into())
            .await
            .unwrap();

        assert_eq!(
            store
                .complete_authorization("alice-state", "mallory")
                .await
                .unwrap_err(),
            SessionError::StateMismatch
        );
        assert!(store.complete_authorization("alice-state", "alice").await.is_ok());
    }

    #[tokio::test]
    async fn state_of_logged_out_user_is_dropped() {
        let store = logged_in("alice").await;
        store
            .begin_authorization("alice", "s".into(), "v".into())
            .await
            .unwrap();
        store.logout("alice").await.unwrap();

        assert_eq!(store.pending_len().await, 0);
        assert_eq!(
            store.complete_authorization("s", "alice").await.unwrap_err(),
            SessionError::UnknownState
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_state_is_rejected() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.login("alice").await.unwrap();
        store
            .begin_authorization("alice", "old".into(), "v".into())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(
            store.complete_authorization("old", "alice").await.unwrap_err(),
            SessionError::StateExpired
        );
        assert_eq!(store.pending_len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_states_pruned_on_new_authorization() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.login("alice").await.unwrap();
        store
            .begin_authorization("alice", "old".into(), "v".into())
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;
        store
            .begin_authorization("alice", "new".into(), "v".into())
            .await
            .unwrap();
        assert_eq!(store.pending_len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_authorizations_are_capped_per_user() {
        let store = logged_in("alice").await;
        store.login("bob").await.unwrap();
        store
            .begin_authorization("bob", "bob-state".into(), "v".into())
            .await
            .unwrap();

        for i in 0..MAX_PENDING_PER_USER + 3 {
            store
                .begin_authorization("alice", format!("alice-{i}"), "v".into())
                .await
                .unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(store.pending_len().await, MAX_PENDING_PER_USER + 1);

        // The oldest go first; the newest and other users' states survive
        assert_eq!(
            store.complete_authorization("alice-0", "alice").await.unwrap_err(),
            SessionError::UnknownState
        );
        let newest = format!("alice-{}", MAX_PENDING_PER_USER + 2);
        assert!(store.complete_authorization(&newest, "alice").await.is_ok());
        assert!(store.complete_authorization("bob-state", "bob").await.is_ok());
    }

    #[tokio::test]
    async fn token_readable_only_while_logged_in() {
        let store = logged_in("alice").await;
        store
            .store_token("alice", "tenant/client".into(), live_token())
            .await
            .unwrap();
        assert_eq!(
            store.access_token("alice").await.unwrap().token.expose(),
            "at_live"
        );

        store.logout("alice").await.unwrap();
        assert_eq!(
            store.access_token("alice").await.unwrap_err(),
            SessionError::NotLoggedIn("alice".into())
        );

        store.login("alice").await.unwrap();
        assert_eq!(
            store.access_token("alice").await.unwrap_err(),
            SessionError::NoToken
        );
    }

    #[tokio::test]
    async fn expired_token_is_not_handed_out() {
        let store = logged_in("alice").await;
        store
            .store_token("alice", "c".into(), AccessToken::new("at_old", 1))
            .await
            .unwrap();
        assert_eq!(
            store.access_token("alice").await.unwrap_err(),
            SessionError::TokenExpired
        );
    }

    #[tokio::test]
    async fn stored_error_replaces_token() {
        let store = logged_in("alice").await;
        store
            .store_token("alice", "c".into(), live_token())
            .await
            .unwrap();
        store
            .store_error("alice", "c".into(), "invalid_grant".into())
            .await
            .unwrap();

        let session = store.get("alice").await.unwrap();
        let azure = session.azure.unwrap();
        assert!(azure.access_token.is_none());
        assert_eq!(azure.error.as_deref(), Some("invalid_grant"));
        assert_eq!(
            store.access_token("alice").await.unwrap_err(),
            SessionError::ExchangeFailed("invalid_grant".into())
        );
    }

    #[tokio::test]
    async fn store_token_requires_login() {
        let store = SessionStore::default();
        assert!(store.store_token("ghost", "c".into(), live_token()).await.is_err());
        assert!(store.is_empty().await);
    }
}
