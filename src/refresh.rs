//! Single-flight access token refresh.
//!
//! Any number of concurrent callers may notice an expired token at the
//! same time; exactly one network refresh runs, and every caller receives
//! the same outcome. The orchestrator also owns the failure policy:
//! auth rejections clear the session, a missing endpoint downgrades to
//! durable storage, and transient network errors leave state untouched.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::oneshot;

use crate::error::{OrbitLinkError, Result};
use crate::models::{AuthResponse, Session, UserInfo};
use crate::store::{StorageStrategy, TokenManager};

/// Backend seam for the refresh network call.
#[async_trait]
pub trait RefreshBackend: Send + Sync {
    /// Exchange the refresh credential (httpOnly cookie sent by the HTTP
    /// layer) for a new access token.
    async fn refresh(&self, csrf_token: Option<String>) -> Result<AuthResponse>;
}

/// Production backend: `POST {base}/v1/api/auth/refresh`.
///
/// Holds its own client handle so the orchestrator has no dependency on
/// the request layer it serves.
pub struct HttpRefreshBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRefreshBackend {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl RefreshBackend for HttpRefreshBackend {
    async fn refresh(&self, csrf_token: Option<String>) -> Result<AuthResponse> {
        let url = format!("{}/v1/api/auth/refresh", self.base_url);
        debug!("[REFRESH] POST {}", url);
        let mut request = self.http.post(&url);
        if let Some(csrf) = csrf_token {
            request = request.header("X-CSRF-Token", csrf);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(crate::transport::error_from_response(response).await);
        }
        Ok(response.json::<AuthResponse>().await?)
    }
}

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<Result<String>>>,
    },
}

/// Coalesces concurrent refresh attempts into one network call.
///
/// The first caller to arrive while idle spawns a detached driver task
/// that performs the refresh; every caller, first included, parks on a
/// oneshot and receives a clone of the shared outcome, in arrival order.
/// Running the network call on its own task means an abandoned caller
/// (timeout, `select!`) never kills the in-flight refresh or strands the
/// other waiters.
pub struct RefreshOrchestrator {
    state: Arc<Mutex<RefreshState>>,
    backend: Arc<dyn RefreshBackend>,
    manager: Arc<TokenManager>,
}

impl RefreshOrchestrator {
    pub fn new(backend: Arc<dyn RefreshBackend>, manager: Arc<TokenManager>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RefreshState::Idle)),
            backend,
            manager,
        }
    }

    /// Obtain a fresh access token, joining an in-flight refresh if one
    /// is already running.
    pub async fn refresh_access_token(&self) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        // Start-or-join decision is atomic; the lock is never held across
        // an await.
        let start_driver = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
                RefreshState::Refreshing { waiters } => {
                    debug!("[REFRESH] Joining in-flight refresh");
                    waiters.push(tx);
                    false
                }
            }
        };

        if start_driver {
            let backend = self.backend.clone();
            let manager = self.manager.clone();
            let state = self.state.clone();
            tokio::spawn(async move {
                let outcome = run_refresh(&backend, &manager).await;
                let waiters = {
                    let mut state = state.lock().unwrap();
                    match std::mem::replace(&mut *state, RefreshState::Idle) {
                        RefreshState::Refreshing { waiters } => waiters,
                        RefreshState::Idle => Vec::new(),
                    }
                };
                debug!("[REFRESH] Fanning out result to {} waiter(s)", waiters.len());
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
            });
        }

        rx.await.map_err(|_| {
            OrbitLinkError::InternalError("Refresh task dropped without resolving".into())
        })?
    }
}

async fn run_refresh(
    backend: &Arc<dyn RefreshBackend>,
    manager: &Arc<TokenManager>,
) -> Result<String> {
    let generation = manager.generation();
    let csrf = manager.csrf_token();

    match backend.refresh(csrf).await {
        Ok(response) => apply_refresh(manager, response, generation),
        Err(e) if e.is_not_found() => {
            // Endpoint absent: backend predates the refresh API.
            warn!("[REFRESH] Refresh endpoint not found, falling back to durable storage");
            manager.set_strategy(StorageStrategy::Durable);
            match manager.access_token() {
                Some(token) => Ok(token),
                None => Err(e),
            }
        }
        Err(e) if e.is_auth_error() => {
            warn!("[REFRESH] Refresh credential rejected, clearing session");
            manager.clear();
            manager.downgrade_to_durable();
            Err(e)
        }
        Err(e) => {
            // Transient failure: the session may still be valid, keep it.
            debug!("[REFRESH] Refresh failed transiently: {}", e);
            Err(e)
        }
    }
}

fn apply_refresh(manager: &TokenManager, response: AuthResponse, snapshot: u64) -> Result<String> {
    let token = response
        .access_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            OrbitLinkError::AuthenticationError(
                "Refresh response contained no access token".to_string(),
            )
        })?;

    if manager.generation() != snapshot {
        // Something wrote the session while we were in flight (e.g. an
        // explicit sign-in or sign-out). That write wins; discard ours.
        debug!("[REFRESH] Session changed during refresh, discarding stale result");
        return manager
            .access_token()
            .ok_or_else(|| OrbitLinkError::AuthenticationError("Not authenticated".into()));
    }

    if let Some(csrf) = &response.csrf_token {
        manager.set_csrf_token(csrf);
    }

    match (response.user, manager.session()) {
        (Some(user), _) => {
            manager.save_session(&Session::new(&token, user));
        }
        (None, Some(_)) => {
            manager.set_access_token(&token);
        }
        (None, None) => {
            // Startup recovery: no identity yet; store the token under a
            // placeholder and let the caller hydrate the user afterwards.
            manager.save_session(&Session::new(&token, UserInfo::placeholder("", "")));
        }
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryCookieJar, MemoryKeyValueStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    fn manager(strategy: StorageStrategy) -> Arc<TokenManager> {
        Arc::new(TokenManager::new(
            strategy,
            Arc::new(MemoryCookieJar::new()),
            Arc::new(MemoryKeyValueStore::new()),
        ))
    }

    fn sample_session() -> Session {
        Session::new("tok123", UserInfo::placeholder("u1", "a@b.com"))
    }

    fn token_response(token: &str) -> AuthResponse {
        AuthResponse {
            access_token: Some(token.to_string()),
            user: None,
            csrf_token: None,
            code: None,
            expires_at: None,
        }
    }

    /// Blocks every refresh call on a semaphore so tests control exactly
    /// when the leader's network call resolves.
    struct GatedRefreshBackend {
        gate: Semaphore,
        calls: AtomicUsize,
        outcome: Box<dyn Fn() -> Result<AuthResponse> + Send + Sync>,
    }

    impl GatedRefreshBackend {
        fn new(outcome: impl Fn() -> Result<AuthResponse> + Send + Sync + 'static) -> Self {
            Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
                outcome: Box::new(outcome),
            }
        }

        fn open(outcome: impl Fn() -> Result<AuthResponse> + Send + Sync + 'static) -> Self {
            let backend = Self::new(outcome);
            backend.gate.add_permits(usize::MAX >> 4);
            backend
        }
    }

    #[async_trait]
    impl RefreshBackend for GatedRefreshBackend {
        async fn refresh(&self, _csrf: Option<String>) -> Result<AuthResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.map_err(|_| {
                OrbitLinkError::InternalError("gate closed".into())
            })?;
            (self.outcome)()
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::new(|| Ok(token_response("tok456"))));
        let orchestrator = Arc::new(RefreshOrchestrator::new(backend.clone(), manager.clone()));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let orchestrator = orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.refresh_access_token().await
            }));
        }

        // Let every task reach the leader-or-wait decision, then release
        // the single in-flight network call.
        while backend.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        backend.gate.add_permits(1);

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "tok456");
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.access_token(), Some("tok456".to_string()));
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_strand_later_callers() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::new(|| Ok(token_response("tok456"))));
        let orchestrator = Arc::new(RefreshOrchestrator::new(backend.clone(), manager.clone()));

        // First caller starts the refresh, then gets dropped mid-flight,
        // as a timeout or select! would do.
        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.refresh_access_token().await })
        };
        while backend.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        first.abort();
        let _ = first.await;

        // A later caller joins the still-running shared call and resolves
        // once it completes; no second network call is made.
        let second = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.refresh_access_token().await })
        };
        tokio::task::yield_now().await;
        backend.gate.add_permits(1);

        let token = tokio::time::timeout(std::time::Duration::from_secs(2), second)
            .await
            .expect("refresh must resolve after the in-flight call completes")
            .unwrap()
            .unwrap();
        assert_eq!(token, "tok456");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.access_token(), Some("tok456".to_string()));
    }

    #[tokio::test]
    async fn test_sequential_refreshes_each_hit_backend() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::open(|| Ok(token_response("tok456"))));
        let orchestrator = RefreshOrchestrator::new(backend.clone(), manager);

        orchestrator.refresh_access_token().await.unwrap();
        orchestrator.refresh_access_token().await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_clears_session_and_downgrades() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::open(|| {
            Err(OrbitLinkError::ServerError {
                status_code: 401,
                error_code: Some("INVALID_REFRESH".into()),
                message: "Refresh token expired".into(),
                extra: Default::default(),
            })
        }));
        let orchestrator = RefreshOrchestrator::new(backend, manager.clone());

        let err = orchestrator.refresh_access_token().await.unwrap_err();
        assert!(err.is_auth_error());
        assert!(manager.session().is_none());
        assert_eq!(manager.strategy(), StorageStrategy::Durable);
    }

    #[tokio::test]
    async fn test_network_failure_keeps_session() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::open(|| {
            Err(OrbitLinkError::NetworkError("connection refused".into()))
        }));
        let orchestrator = RefreshOrchestrator::new(backend, manager.clone());

        let err = orchestrator.refresh_access_token().await.unwrap_err();
        assert!(err.is_network_error());
        // Token untouched: the outage may be local
        assert_eq!(manager.access_token(), Some("tok123".to_string()));
        assert_eq!(manager.strategy(), StorageStrategy::Memory);
    }

    #[tokio::test]
    async fn test_missing_endpoint_falls_back_to_durable_token() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::open(|| {
            Err(OrbitLinkError::ServerError {
                status_code: 404,
                error_code: None,
                message: "Not found".into(),
                extra: Default::default(),
            })
        }));
        let orchestrator = RefreshOrchestrator::new(backend, manager.clone());

        // The held session migrates into the durable store and its token is
        // returned as the refresh result.
        let token = orchestrator.refresh_access_token().await.unwrap();
        assert_eq!(token, "tok123");
        assert_eq!(manager.strategy(), StorageStrategy::Durable);
    }

    #[tokio::test]
    async fn test_missing_endpoint_without_session_errors() {
        let manager = manager(StorageStrategy::Memory);
        let backend = Arc::new(GatedRefreshBackend::open(|| {
            Err(OrbitLinkError::ServerError {
                status_code: 404,
                error_code: None,
                message: "Not found".into(),
                extra: Default::default(),
            })
        }));
        let orchestrator = RefreshOrchestrator::new(backend, manager.clone());

        assert!(orchestrator.refresh_access_token().await.is_err());
        assert_eq!(manager.strategy(), StorageStrategy::Durable);
    }

    #[tokio::test]
    async fn test_stale_result_discarded_after_concurrent_write() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::new(|| Ok(token_response("tokSTALE"))));
        let orchestrator = Arc::new(RefreshOrchestrator::new(backend.clone(), manager.clone()));

        let task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.refresh_access_token().await })
        };
        while backend.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // A fresh sign-in lands while the refresh is in flight.
        manager.save_session(&Session::new("tokNEW", UserInfo::placeholder("u2", "c@d.com")));
        backend.gate.add_permits(1);

        // The stale refresh yields the newer store token, not its own.
        assert_eq!(task.await.unwrap().unwrap(), "tokNEW");
        assert_eq!(manager.access_token(), Some("tokNEW".to_string()));
        assert_eq!(manager.user().unwrap().id, "u2");
    }

    #[tokio::test]
    async fn test_refresh_without_session_stores_placeholder() {
        // Startup recovery path: auth flag set, no session in memory.
        let manager = manager(StorageStrategy::Memory);
        let backend = Arc::new(GatedRefreshBackend::open(|| Ok(token_response("tok456"))));
        let orchestrator = RefreshOrchestrator::new(backend, manager.clone());

        let token = orchestrator.refresh_access_token().await.unwrap();
        assert_eq!(token, "tok456");
        let session = manager.session().unwrap();
        assert!(session.user.is_placeholder());
    }

    #[tokio::test]
    async fn test_refresh_response_user_replaces_identity() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::open(|| {
            Ok(AuthResponse {
                access_token: Some("tok456".into()),
                user: Some(UserInfo::placeholder("u1", "a@b.com")),
                csrf_token: Some("csrf789".into()),
                code: None,
                expires_at: None,
            })
        }));
        let orchestrator = RefreshOrchestrator::new(backend, manager.clone());

        orchestrator.refresh_access_token().await.unwrap();
        assert_eq!(manager.access_token(), Some("tok456".to_string()));
        assert_eq!(manager.csrf_token(), Some("csrf789".to_string()));
    }

    #[tokio::test]
    async fn test_empty_token_in_response_is_auth_error() {
        let manager = manager(StorageStrategy::Memory);
        manager.save_session(&sample_session());
        let backend = Arc::new(GatedRefreshBackend::open(|| Ok(token_response(""))));
        let orchestrator = RefreshOrchestrator::new(backend, manager.clone());

        let err = orchestrator.refresh_access_token().await.unwrap_err();
        assert!(matches!(err, OrbitLinkError::AuthenticationError(_)));
        // Malformed success is not a credential rejection: session kept
        assert_eq!(manager.access_token(), Some("tok123".to_string()));
    }
}
