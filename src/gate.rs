//! Session gate: authentication and authorization state derived from the
//! stored credential.
//!
//! The credential is the only source of truth. Cached role fields are written
//! back from its claims on every revalidation and are never trusted on their
//! own, since another process may have replaced or removed the credential.

use crate::store::{
    SessionStore, KEY_AUTH_TOKEN, KEY_IS_AUTHENTICATED, KEY_USERNAME, KEY_USER_ID, KEY_USER_ROLE,
    KEY_USER_ROLE_NAME, SESSION_KEYS,
};
use crate::token::{self, Claims, RoleId};
use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Result of inspecting the stored credential without touching storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No credential stored
    Anonymous,
    /// Credential present but undecodable, without expiry, or past expiry
    Expired,
    Valid(Claims),
}

/// Authorization state handed to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    AuthenticatedUser,
    AuthenticatedAdmin,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, AuthState::Anonymous)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AuthState::AuthenticatedAdmin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Anonymous => "anonymous",
            AuthState::AuthenticatedUser => "user",
            AuthState::AuthenticatedAdmin => "admin",
        }
    }
}

/// Cached session fields, for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub username: Option<String>,
    pub role_id: Option<String>,
    pub role_name: Option<String>,
    pub user_id: Option<String>,
    pub expiry: Option<i64>,
    pub issued_at: Option<i64>,
}

pub struct SessionGate {
    store: Box<dyn SessionStore>,
    clock: fn() -> i64,
}

fn wall_clock() -> i64 {
    Utc::now().timestamp()
}

impl SessionGate {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self {
            store,
            clock: wall_clock,
        }
    }

    /// Replace the clock used for expiry checks
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn credential(&self) -> Option<String> {
        self.store.get(KEY_AUTH_TOKEN).filter(|t| !t.is_empty())
    }

    /// Inspect the stored credential. Pure: storage is not modified.
    pub fn check(&self) -> SessionStatus {
        let Some(credential) = self.credential() else {
            return SessionStatus::Anonymous;
        };

        match token::decode(&credential) {
            Some(claims) if !claims.is_expired_at((self.clock)()) => SessionStatus::Valid(claims),
            _ => SessionStatus::Expired,
        }
    }

    /// Remove every session key.
    pub fn invalidate(&mut self) {
        for key in SESSION_KEYS {
            if let Err(e) = self.store.remove(key) {
                warn!("failed to clear session key {}: {}", key, e);
            }
        }
        info!("session cleared");
    }

    /// Re-derive the cached role and username from the credential's claims.
    ///
    /// Returns false and clears the session when there is no usable credential.
    pub fn revalidate(&mut self) -> bool {
        let claims = match self.check() {
            SessionStatus::Valid(claims) => claims,
            SessionStatus::Expired => {
                info!("stored credential expired or unreadable");
                self.invalidate();
                return false;
            }
            SessionStatus::Anonymous => {
                if self.has_stored_state() {
                    self.invalidate();
                }
                return false;
            }
        };

        self.write_role(&claims);
        if let Some(username) = claims.username() {
            self.put(KEY_USERNAME, username);
        }
        true
    }

    /// True when a credential is stored, the authenticated flag is set and the
    /// credential has not expired.
    ///
    /// This is not a pure query: finding an expired credential clears the
    /// whole session as a side effect.
    pub fn is_authenticated(&mut self) -> bool {
        let flagged = self.store.get(KEY_IS_AUTHENTICATED).as_deref() == Some("true");
        if self.credential().is_none() || !flagged {
            return false;
        }

        match self.check() {
            SessionStatus::Valid(_) => true,
            _ => {
                self.invalidate();
                false
            }
        }
    }

    /// Read the cached role id. Callers revalidate first.
    pub fn is_admin(&self) -> bool {
        self.store
            .get(KEY_USER_ROLE)
            .map(|id| RoleId::from_stored(&id).is_admin())
            .unwrap_or(false)
    }

    /// Revalidate and classify the session. Evaluated once per navigation.
    pub fn auth_state(&mut self) -> AuthState {
        if !self.revalidate() || !self.is_authenticated() {
            return AuthState::Anonymous;
        }
        if self.is_admin() {
            AuthState::AuthenticatedAdmin
        } else {
            AuthState::AuthenticatedUser
        }
    }

    /// Store a freshly issued credential. `typed_username` is used when the
    /// credential has no subject claim.
    pub fn login(&mut self, credential: &str, typed_username: &str) -> Result<AuthState> {
        let claims = token::decode(credential).unwrap_or_default();
        let username = claims.username().unwrap_or(typed_username).to_string();

        // the account id belongs to whoever was signed in before
        self.store.remove(KEY_USER_ID)?;
        self.store.set(KEY_IS_AUTHENTICATED, "true")?;
        self.store.set(KEY_USERNAME, &username)?;
        self.store.set(KEY_AUTH_TOKEN, credential)?;
        self.write_role(&claims);

        let state = self.auth_state();
        info!(username = %username, state = state.as_str(), "logged in");
        Ok(state)
    }

    pub fn logout(&mut self) {
        if let Some(username) = self.username() {
            info!(username = %username, "logging out");
        }
        self.invalidate();
    }

    /// `Authorization` header value for API requests
    pub fn bearer(&self) -> Option<String> {
        self.credential().map(|t| format!("Bearer {}", t))
    }

    pub fn username(&self) -> Option<String> {
        self.store.get(KEY_USERNAME)
    }

    pub fn role_name(&self) -> Option<String> {
        self.store.get(KEY_USER_ROLE_NAME)
    }

    pub fn user_id(&self) -> Option<String> {
        self.store.get(KEY_USER_ID)
    }

    pub fn set_user_id(&mut self, id: &str) -> Result<()> {
        self.store.set(KEY_USER_ID, id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let claims = self.credential().and_then(|t| token::decode(&t));
        SessionSnapshot {
            username: self.username(),
            role_id: self.store.get(KEY_USER_ROLE),
            role_name: self.role_name(),
            user_id: self.user_id(),
            expiry: claims.as_ref().and_then(|c| c.expiry),
            issued_at: claims.as_ref().and_then(|c| c.issued_at),
        }
    }

    fn has_stored_state(&self) -> bool {
        SESSION_KEYS.iter().any(|key| self.store.get(key).is_some())
    }

    fn write_role(&mut self, claims: &Claims) {
        let (role_id, role_name) = match claims.role_name() {
            Some(name) => (RoleId::from_role_name(name), name),
            None => (RoleId::User, RoleId::User.default_name()),
        };
        debug!(role = role_name, role_id = role_id.as_str(), "deriving role from claims");
        self.put(KEY_USER_ROLE, role_id.as_str());
        self.put(KEY_USER_ROLE_NAME, role_name);
    }

    fn put(&mut self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!("failed to persist session key {}: {}", key, e);
        }
    }
}
