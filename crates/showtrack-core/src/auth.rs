//! Session lifecycle over the auth endpoints and the persisted credential
//! store.

use chrono::Duration;
use showtrack_backend::{AuthApi, BackendError, SignUpOutcome};
use showtrack_config::CredentialStore;
use showtrack_models::{Session, User};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sessions this close to expiry are refreshed on restore
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Failed to persist session: {0}")]
    Storage(#[from] anyhow::Error),
}

/// The signed-in user, if any, and the tokens that go with it.
pub struct AuthSession {
    api: Arc<dyn AuthApi>,
    store: CredentialStore,
    session: Option<Session>,
    persisted: bool,
}

impl AuthSession {
    pub fn new(api: Arc<dyn AuthApi>, store: CredentialStore) -> Self {
        Self {
            api,
            store,
            session: None,
            persisted: false,
        }
    }

    /// Load a persisted session, refreshing it when it is about to expire.
    ///
    /// A session that cannot be refreshed is discarded; the caller ends up
    /// signed out rather than with an error.
    pub async fn restore(&mut self) -> Result<Option<&User>, AuthError> {
        self.store.load()?;
        let Some(stored) = self.store.get_session() else {
            debug!("No persisted session");
            return Ok(None);
        };

        if !stored.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) {
            self.session = Some(stored);
            self.persisted = true;
            return Ok(self.user());
        }

        match self.api.refresh_session(&stored.refresh_token).await {
            Ok(session) => {
                info!(user_id = %session.user.id, "Refreshed persisted session");
                self.store.set_session(&session);
                self.store.save()?;
                self.session = Some(session);
                self.persisted = true;
            }
            Err(e) => {
                warn!(error = %e, "Persisted session could not be refreshed; signing out");
                self.store.clear_session();
                self.store.save()?;
                self.session = None;
                self.persisted = false;
            }
        }
        Ok(self.user())
    }

    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let outcome = self.api.sign_up(email, password).await?;
        if let Some(session) = &outcome.session {
            self.adopt(session.clone(), true)?;
        }
        Ok(outcome)
    }

    /// Sign in with email and password. A non-persisted session lives only as
    /// long as this value.
    pub async fn sign_in(&mut self, email: &str, password: &str, persist_session: bool) -> Result<&User, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let session = self.api.sign_in_with_password(email, password).await?;
        self.adopt(session, persist_session)?;
        self.user().ok_or(AuthError::NotSignedIn)
    }

    fn adopt(&mut self, session: Session, persist: bool) -> Result<(), AuthError> {
        if persist {
            self.store.set_session(&session);
            self.store.save()?;
        } else {
            // A saved session from an earlier sign-in must not outlive this one
            self.store.load()?;
            if self.store.has_session() {
                self.store.clear_session();
                self.store.save()?;
            }
        }
        self.persisted = persist;
        self.session = Some(session);
        Ok(())
    }

    /// End the session remotely and locally. The local session is cleared even
    /// when the remote call fails; that failure is only logged.
    pub async fn sign_out(&mut self) -> Result<(), AuthError> {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.api.sign_out(&session.access_token).await {
                warn!(error = %e, "Remote sign-out failed; clearing local session anyway");
            } else {
                info!(user_id = %session.user.id, "Signed out");
            }
        }

        self.persisted = false;
        self.store.clear_session();
        self.store.save()?;
        Ok(())
    }

    /// Re-read the user from the auth server
    pub async fn current_user(&self) -> Result<User, AuthError> {
        let session = self.session.as_ref().ok_or(AuthError::NotSignedIn)?;
        Ok(self.api.get_user(&session.access_token).await?)
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.access_token.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use showtrack_backend::Result as BackendResult;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeAuth {
        fail_sign_out: bool,
        fail_refresh: bool,
        calls: Mutex<Vec<String>>,
    }

    fn session(email: &str, expires_in_minutes: i64) -> Session {
        Session {
            access_token: format!("access-{}", email),
            refresh_token: format!("refresh-{}", email),
            expires_at: Utc::now() + Duration::minutes(expires_in_minutes),
            user: User {
                id: format!("id-{}", email),
                email: Some(email.to_string()),
                created_at: None,
            },
        }
    }

    impl FakeAuth {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn sign_up(&self, email: &str, _password: &str) -> BackendResult<SignUpOutcome> {
            self.record("sign_up");
            Ok(SignUpOutcome {
                user: session(email, 60).user,
                session: None,
            })
        }

        async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
            self.record("sign_in");
            if password == "wrong" {
                return Err(BackendError::with_status(400, "Invalid login credentials"));
            }
            Ok(session(email, 60))
        }

        async fn refresh_session(&self, _refresh_token: &str) -> BackendResult<Session> {
            self.record("refresh");
            if self.fail_refresh {
                return Err(BackendError::with_status(400, "Invalid Refresh Token"));
            }
            Ok(session("refreshed@example.com", 60))
        }

        async fn sign_out(&self, _access_token: &str) -> BackendResult<()> {
            self.record("sign_out");
            if self.fail_sign_out {
                return Err(BackendError::new("network unreachable"));
            }
            Ok(())
        }

        async fn get_user(&self, access_token: &str) -> BackendResult<User> {
            self.record("get_user");
            Ok(User {
                id: access_token.to_string(),
                email: None,
                created_at: None,
            })
        }
    }

    fn store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("credentials.toml"))
    }

    #[tokio::test]
    async fn test_sign_in_persists_when_asked() {
        let dir = TempDir::new().unwrap();
        let mut auth = AuthSession::new(Arc::new(FakeAuth::default()), store(&dir));

        let user = auth.sign_in("viewer@example.com", "secret", true).await.unwrap();
        assert_eq!(user.email.as_deref(), Some("viewer@example.com"));
        assert!(auth.is_persisted());

        let mut reloaded = store(&dir);
        reloaded.load().unwrap();
        assert_eq!(reloaded.get_session().unwrap().user.id, "id-viewer@example.com");
    }

    #[tokio::test]
    async fn test_sign_in_without_persistence_leaves_store_empty() {
        let dir = TempDir::new().unwrap();
        let mut auth = AuthSession::new(Arc::new(FakeAuth::default()), store(&dir));

        auth.sign_in("viewer@example.com", "secret", false).await.unwrap();
        assert!(auth.is_signed_in());
        assert!(!auth.is_persisted());
        assert!(!dir.path().join("credentials.toml").exists());
    }

    #[tokio::test]
    async fn test_non_persisted_sign_in_replaces_saved_session() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(FakeAuth::default());

        let mut first = AuthSession::new(api.clone(), store(&dir));
        first.sign_in("alice@example.com", "secret", true).await.unwrap();

        let mut second = AuthSession::new(api.clone(), store(&dir));
        let restored = second.restore().await.unwrap().cloned();
        assert_eq!(restored.unwrap().email.as_deref(), Some("alice@example.com"));
        second.sign_in("bob@example.com", "secret", false).await.unwrap();
        assert_eq!(second.user().unwrap().email.as_deref(), Some("bob@example.com"));

        let mut third = AuthSession::new(api, store(&dir));
        assert!(third.restore().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_errors() {
        let dir = TempDir::new().unwrap();
        let mut auth = AuthSession::new(Arc::new(FakeAuth::default()), store(&dir));

        assert!(matches!(auth.sign_in("", "secret", true).await, Err(AuthError::MissingCredentials)));
        let err = auth.sign_in("viewer@example.com", "wrong", true).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(!auth.is_signed_in());
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation_does_not_sign_in() {
        let dir = TempDir::new().unwrap();
        let mut auth = AuthSession::new(Arc::new(FakeAuth::default()), store(&dir));
        let outcome = auth.sign_up("new@example.com", "secret").await.unwrap();
        assert!(outcome.needs_confirmation());
        assert!(!auth.is_signed_in());
    }

    #[tokio::test]
    async fn test_restore_valid_and_expiring_sessions() {
        let dir = TempDir::new().unwrap();
        let mut seeded = store(&dir);
        seeded.set_session(&session("viewer@example.com", 30));
        seeded.save().unwrap();

        let api = Arc::new(FakeAuth::default());
        let mut auth = AuthSession::new(api.clone(), store(&dir));
        let user = auth.restore().await.unwrap().cloned();
        assert_eq!(user.unwrap().email.as_deref(), Some("viewer@example.com"));
        assert!(api.calls().is_empty());

        let mut seeded = store(&dir);
        seeded.set_session(&session("viewer@example.com", -5));
        seeded.save().unwrap();

        let mut auth = AuthSession::new(api.clone(), store(&dir));
        let user = auth.restore().await.unwrap().cloned();
        assert_eq!(user.unwrap().email.as_deref(), Some("refreshed@example.com"));
        assert_eq!(api.calls(), vec!["refresh"]);
    }

    #[tokio::test]
    async fn test_restore_drops_unrefreshable_session() {
        let dir = TempDir::new().unwrap();
        let mut seeded = store(&dir);
        seeded.set_session(&session("viewer@example.com", -5));
        seeded.save().unwrap();

        let api = Arc::new(FakeAuth {
            fail_refresh: true,
            ..Default::default()
        });
        let mut auth = AuthSession::new(api, store(&dir));
        assert!(auth.restore().await.unwrap().is_none());

        let mut reloaded = store(&dir);
        reloaded.load().unwrap();
        assert!(!reloaded.has_session());
    }

    #[tokio::test]
    async fn test_sign_out_clears_local_session_even_when_remote_fails() {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(FakeAuth {
            fail_sign_out: true,
            ..Default::default()
        });
        let mut auth = AuthSession::new(api.clone(), store(&dir));
        auth.sign_in("viewer@example.com", "secret", true).await.unwrap();

        auth.sign_out().await.unwrap();

        assert!(!auth.is_signed_in());
        assert_eq!(api.calls(), vec!["sign_in", "sign_out"]);
        let mut reloaded = store(&dir);
        reloaded.load().unwrap();
        assert!(!reloaded.has_session());
    }

    #[tokio::test]
    async fn test_current_user_requires_session() {
        let dir = TempDir::new().unwrap();
        let mut auth = AuthSession::new(Arc::new(FakeAuth::default()), store(&dir));
        assert!(matches!(auth.current_user().await, Err(AuthError::NotSignedIn)));

        auth.sign_in("viewer@example.com", "secret", false).await.unwrap();
        assert_eq!(auth.current_user().await.unwrap().id, "access-viewer@example.com");
    }
}
