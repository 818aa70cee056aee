//! Session persistence: interchangeable store variants and the manager
//! that selects, migrates, and guards them.
//!
//! Two store variants implement the same contract: [`MemorySessionStore`]
//! for cookie-refresh backends (token lives in process memory only) and
//! [`DurableSessionStore`] for legacy backends (token persisted through an
//! injected [`KeyValueStore`](crate::host::KeyValueStore)). The
//! [`TokenManager`] owns whichever variant is active and migrates session
//! data when the strategy changes.

mod durable;
mod manager;
mod memory;

pub use durable::DurableSessionStore;
pub use manager::TokenManager;
pub use memory::MemorySessionStore;

use crate::models::{BackendCapabilities, Session, UserInfo};

/// Cookie name for the non-sensitive "a refreshable session probably
/// exists" marker. Never carries the token value.
pub const AUTH_FLAG_COOKIE: &str = "orbit_is_authenticated";

/// Cookie name for the anti-forgery token replayed on refresh calls.
pub const CSRF_COOKIE: &str = "orbit_csrf_token";

/// Identifier for the active session persistence strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStrategy {
    /// Token in process memory only; refresh credential lives in an
    /// httpOnly cookie held by the backend.
    Memory,
    /// Token and user persisted through the injected key-value store.
    Durable,
}

impl std::fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Durable => write!(f, "durable"),
        }
    }
}

/// Pick the storage strategy for the discovered backend capabilities.
///
/// Memory-only (cookie-backed) storage requires both the secure-cookie
/// session model and the refresh endpoint; anything less falls back to
/// durable storage.
pub fn select_strategy(capabilities: &BackendCapabilities) -> StorageStrategy {
    if capabilities.has_cookie_refresh() {
        StorageStrategy::Memory
    } else {
        StorageStrategy::Durable
    }
}

/// Contract implemented identically by both session store variants.
///
/// Storage failures never surface to callers: a corrupt durable record is
/// treated as "absent" and the store self-heals by clearing itself.
pub trait SessionStore: Send + Sync {
    /// Store access token and user, overwriting any existing session.
    fn save(&self, session: &Session);

    /// Current session, or `None` when absent or unreadable.
    fn get(&self) -> Option<Session>;

    /// Current access token, if a session is held.
    fn access_token(&self) -> Option<String>;

    /// Replace the token only, preserving the stored identity.
    fn set_access_token(&self, token: &str);

    /// Stored user identity, if a session is held.
    fn user(&self) -> Option<UserInfo>;

    /// Replace the stored identity, preserving the token.
    fn set_user(&self, user: &UserInfo);

    /// Remove all session state.
    fn clear(&self);

    /// `true` only when no token is held AND an external signal suggests a
    /// session might be recoverable via the refresh endpoint.
    fn should_attempt_recovery(&self) -> bool;

    /// Which variant this store implements.
    fn strategy(&self) -> StorageStrategy;
}
