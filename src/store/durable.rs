//! Durable session store for legacy backends without cookie refresh.

use std::sync::Arc;

use log::{debug, warn};

use super::{SessionStore, StorageStrategy};
use crate::host::KeyValueStore;
use crate::models::{Session, UserInfo};

const TOKEN_KEY: &str = "orbit.session.token";
const USER_KEY: &str = "orbit.session.user";
const EXPIRES_KEY: &str = "orbit.session.expires_at";

/// Session store persisting through an injected key-value backend.
///
/// The token is available synchronously on every load, so
/// `should_attempt_recovery` is always false. A corrupt user record
/// self-heals: the store clears itself and reports "no session" instead of
/// surfacing a decode error. Never touches the auth flag cookie.
pub struct DurableSessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl DurableSessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn read_token(&self) -> Option<String> {
        match self.kv.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                debug!("[STORE] Durable token read failed: {}", e);
                None
            }
        }
    }

    fn read_user(&self) -> Option<UserInfo> {
        let raw = match self.kv.get(USER_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!("[STORE] Durable user read failed: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("[STORE] Corrupt durable user record, clearing store: {}", e);
                self.clear();
                None
            }
        }
    }
}

impl SessionStore for DurableSessionStore {
    fn save(&self, session: &Session) {
        let user_json = match serde_json::to_string(&session.user) {
            Ok(json) => json,
            Err(e) => {
                warn!("[STORE] Failed to encode user record: {}", e);
                return;
            }
        };
        if let Err(e) = self.kv.set(TOKEN_KEY, &session.access_token) {
            warn!("[STORE] Failed to persist token: {}", e);
            return;
        }
        if let Err(e) = self.kv.set(USER_KEY, &user_json) {
            warn!("[STORE] Failed to persist user: {}", e);
        }
        match &session.expires_at {
            Some(expires) => {
                let _ = self.kv.set(EXPIRES_KEY, expires);
            }
            None => {
                let _ = self.kv.remove(EXPIRES_KEY);
            }
        }
    }

    fn get(&self) -> Option<Session> {
        let token = self.read_token()?;
        let user = match self.read_user() {
            Some(user) => user,
            None => {
                // Token without a readable identity is treated as corrupt
                warn!("[STORE] Durable token present without user record, clearing store");
                self.clear();
                return None;
            }
        };
        let expires_at = self.kv.get(EXPIRES_KEY).ok().flatten();
        Some(Session {
            access_token: token,
            user,
            expires_at,
        })
    }

    fn access_token(&self) -> Option<String> {
        self.read_token()
    }

    fn set_access_token(&self, token: &str) {
        if let Err(e) = self.kv.set(TOKEN_KEY, token) {
            warn!("[STORE] Failed to persist token update: {}", e);
        }
    }

    fn user(&self) -> Option<UserInfo> {
        self.read_user()
    }

    fn set_user(&self, user: &UserInfo) {
        match serde_json::to_string(user) {
            Ok(json) => {
                if let Err(e) = self.kv.set(USER_KEY, &json) {
                    warn!("[STORE] Failed to persist user update: {}", e);
                }
            }
            Err(e) => warn!("[STORE] Failed to encode user update: {}", e),
        }
    }

    fn clear(&self) {
        for key in [TOKEN_KEY, USER_KEY, EXPIRES_KEY] {
            if let Err(e) = self.kv.remove(key) {
                debug!("[STORE] Failed to remove {}: {}", key, e);
            }
        }
    }

    fn should_attempt_recovery(&self) -> bool {
        // The token is already available synchronously; nothing to recover.
        false
    }

    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::Durable
    }
}
