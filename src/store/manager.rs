//! Token manager: owns the active session store, migrates data on
//! strategy switches, and tracks a write generation for stale-refresh
//! detection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use super::{
    DurableSessionStore, MemorySessionStore, SessionStore, StorageStrategy, CSRF_COOKIE,
};
use crate::host::{CookieStore, KeyValueStore};
use crate::models::{Session, UserInfo};

/// Owns the active [`SessionStore`] variant and every write to it.
///
/// Exactly one strategy is active at a time. Switching strategies copies
/// any held session into the new store before discarding the old one, so a
/// transition never loses a session. Every session write bumps a monotonic
/// generation counter; the refresh orchestrator snapshots it before its
/// network call and drops results that complete after a newer write.
pub struct TokenManager {
    store: Mutex<Arc<dyn SessionStore>>,
    cookies: Arc<dyn CookieStore>,
    kv: Arc<dyn KeyValueStore>,
    generation: AtomicU64,
}

impl TokenManager {
    pub fn new(
        strategy: StorageStrategy,
        cookies: Arc<dyn CookieStore>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            store: Mutex::new(Self::make_store(strategy, &cookies, &kv)),
            cookies,
            kv,
            generation: AtomicU64::new(0),
        }
    }

    fn make_store(
        strategy: StorageStrategy,
        cookies: &Arc<dyn CookieStore>,
        kv: &Arc<dyn KeyValueStore>,
    ) -> Arc<dyn SessionStore> {
        match strategy {
            StorageStrategy::Memory => Arc::new(MemorySessionStore::new(cookies.clone())),
            StorageStrategy::Durable => Arc::new(DurableSessionStore::new(kv.clone())),
        }
    }

    fn active(&self) -> Arc<dyn SessionStore> {
        self.store.lock().unwrap().clone()
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Monotonic counter incremented on every session write or clear.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The currently active storage strategy.
    pub fn strategy(&self) -> StorageStrategy {
        self.active().strategy()
    }

    /// Switch to a different storage strategy, migrating any held session.
    ///
    /// No-op when the requested strategy is already active.
    pub fn set_strategy(&self, strategy: StorageStrategy) {
        let mut guard = self.store.lock().unwrap();
        if guard.strategy() == strategy {
            return;
        }
        debug!(
            "[STORE] Switching strategy {} -> {}",
            guard.strategy(),
            strategy
        );
        let held = guard.get();
        let new_store = Self::make_store(strategy, &self.cookies, &self.kv);
        if let Some(session) = held {
            new_store.save(&session);
        }
        guard.clear();
        *guard = new_store;
        drop(guard);
        self.bump_generation();
    }

    /// Forced downgrade after the cookie-based refresh credential was
    /// rejected: the cookie session is presumed invalid, so the CSRF
    /// marker is dropped along with the switch to durable storage.
    pub fn downgrade_to_durable(&self) {
        if self.strategy() == StorageStrategy::Durable {
            return;
        }
        warn!("[STORE] Cookie session rejected, downgrading to durable storage");
        self.cookies.remove(CSRF_COOKIE);
        self.set_strategy(StorageStrategy::Durable);
    }

    /// Store a session, overwriting any existing one.
    pub fn save_session(&self, session: &Session) {
        self.active().save(session);
        self.bump_generation();
    }

    /// Current session, or `None`.
    pub fn session(&self) -> Option<Session> {
        self.active().get()
    }

    /// Current access token, or `None`.
    pub fn access_token(&self) -> Option<String> {
        self.active().access_token()
    }

    /// Replace the token only, preserving identity.
    pub fn set_access_token(&self, token: &str) {
        self.active().set_access_token(token);
        self.bump_generation();
    }

    /// Stored user identity, or `None`.
    pub fn user(&self) -> Option<UserInfo> {
        self.active().user()
    }

    /// Replace the stored identity.
    pub fn set_user(&self, user: &UserInfo) {
        self.active().set_user(user);
    }

    /// Remove all session state.
    pub fn clear(&self) {
        self.active().clear();
        self.bump_generation();
    }

    /// Whether a startup recovery attempt (cookie refresh) is worthwhile.
    pub fn should_attempt_recovery(&self) -> bool {
        self.active().should_attempt_recovery()
    }

    /// Stored anti-forgery token, if one was issued.
    pub fn csrf_token(&self) -> Option<String> {
        self.cookies.get(CSRF_COOKIE)
    }

    /// Persist the anti-forgery token issued alongside a session.
    pub fn set_csrf_token(&self, value: &str) {
        self.cookies.set(CSRF_COOKIE, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryCookieJar, MemoryKeyValueStore};
    use crate::store::AUTH_FLAG_COOKIE;

    fn manager(strategy: StorageStrategy) -> (TokenManager, Arc<MemoryCookieJar>, Arc<MemoryKeyValueStore>) {
        let cookies = Arc::new(MemoryCookieJar::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        (
            TokenManager::new(strategy, cookies.clone(), kv.clone()),
            cookies,
            kv,
        )
    }

    fn sample_session() -> Session {
        Session::new("tok123", UserInfo::placeholder("u1", "a@b.com"))
    }

    #[test]
    fn test_migration_durable_to_memory_preserves_session() {
        let (manager, _, _) = manager(StorageStrategy::Durable);
        manager.save_session(&sample_session());

        manager.set_strategy(StorageStrategy::Memory);

        assert_eq!(manager.strategy(), StorageStrategy::Memory);
        let session = manager.session().unwrap();
        assert_eq!(session.access_token, "tok123");
        assert_eq!(session.user.id, "u1");
    }

    #[test]
    fn test_migration_memory_to_durable_preserves_session() {
        let (manager, _, kv) = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());

        manager.set_strategy(StorageStrategy::Durable);

        assert_eq!(manager.strategy(), StorageStrategy::Durable);
        assert_eq!(manager.session().unwrap().access_token, "tok123");
        // Actually landed in the durable backend
        assert!(kv.get("orbit.session.token").unwrap().is_some());
    }

    #[test]
    fn test_set_same_strategy_is_noop() {
        let (manager, _, _) = manager(StorageStrategy::Durable);
        manager.save_session(&sample_session());
        let generation = manager.generation();
        manager.set_strategy(StorageStrategy::Durable);
        assert_eq!(manager.generation(), generation);
        assert!(manager.session().is_some());
    }

    #[test]
    fn test_downgrade_clears_cookie_flags() {
        let (manager, cookies, _) = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        manager.set_csrf_token("csrf456");
        assert_eq!(cookies.get(AUTH_FLAG_COOKIE), Some("true".to_string()));

        manager.downgrade_to_durable();

        assert_eq!(manager.strategy(), StorageStrategy::Durable);
        assert_eq!(cookies.get(CSRF_COOKIE), None);
        // Migration drained the memory store, which drops the auth flag
        assert_eq!(cookies.get(AUTH_FLAG_COOKIE), None);
    }

    #[test]
    fn test_downgrade_when_already_durable_is_noop() {
        let (manager, cookies, _) = manager(StorageStrategy::Durable);
        cookies.set(CSRF_COOKIE, "csrf456");
        manager.downgrade_to_durable();
        // Already durable: flags untouched
        assert_eq!(cookies.get(CSRF_COOKIE), Some("csrf456".to_string()));
    }

    #[test]
    fn test_generation_bumps_on_writes() {
        let (manager, _, _) = manager(StorageStrategy::Durable);
        let g0 = manager.generation();
        manager.save_session(&sample_session());
        let g1 = manager.generation();
        assert!(g1 > g0);
        manager.set_access_token("tok456");
        let g2 = manager.generation();
        assert!(g2 > g1);
        manager.clear();
        assert!(manager.generation() > g2);
    }

    #[test]
    fn test_csrf_token_roundtrip() {
        let (manager, _, _) = manager(StorageStrategy::Memory);
        assert_eq!(manager.csrf_token(), None);
        manager.set_csrf_token("csrf456");
        assert_eq!(manager.csrf_token(), Some("csrf456".to_string()));
    }
}
