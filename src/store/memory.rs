//! Memory-only session store for cookie-refresh backends.

use std::sync::{Arc, Mutex};

use log::debug;

use super::{SessionStore, StorageStrategy, AUTH_FLAG_COOKIE};
use crate::host::CookieStore;
use crate::models::{Session, UserInfo};

/// Session store whose state lives purely in process memory.
///
/// Survives no reload; recovery relies on the httpOnly refresh cookie held
/// by the backend. Saving a session sets the non-sensitive auth flag
/// marker so a later startup knows a refresh attempt is worthwhile;
/// clearing removes it.
pub struct MemorySessionStore {
    state: Mutex<Option<Session>>,
    cookies: Arc<dyn CookieStore>,
}

impl MemorySessionStore {
    pub fn new(cookies: Arc<dyn CookieStore>) -> Self {
        Self {
            state: Mutex::new(None),
            cookies,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &Session) {
        *self.state.lock().unwrap() = Some(session.clone());
        self.cookies.set(AUTH_FLAG_COOKIE, "true");
    }

    fn get(&self) -> Option<Session> {
        self.state.lock().unwrap().clone()
    }

    fn access_token(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    fn set_access_token(&self, token: &str) {
        let mut state = self.state.lock().unwrap();
        match state.as_mut() {
            Some(session) => session.access_token = token.to_string(),
            None => debug!("[STORE] Ignoring token update: no session held in memory"),
        }
    }

    fn user(&self) -> Option<UserInfo> {
        self.state.lock().unwrap().as_ref().map(|s| s.user.clone())
    }

    fn set_user(&self, user: &UserInfo) {
        let mut state = self.state.lock().unwrap();
        match state.as_mut() {
            Some(session) => session.user = user.clone(),
            None => debug!("[STORE] Ignoring user update: no session held in memory"),
        }
    }

    fn clear(&self) {
        *self.state.lock().unwrap() = None;
        self.cookies.remove(AUTH_FLAG_COOKIE);
    }

    fn should_attempt_recovery(&self) -> bool {
        if self.state.lock().unwrap().is_some() {
            return false;
        }
        self.cookies
            .get(AUTH_FLAG_COOKIE)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::Memory
    }
}
