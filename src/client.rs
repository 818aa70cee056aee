//! Client façade: construction, wiring, and the public auth operations.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Method;
use serde_json::json;
use url::Url;

use async_trait::async_trait;

use crate::callback::{AuthCallbackHandler, CodeExchanger};
use crate::discovery::CapabilityProbe;
use crate::error::{OrbitLinkError, Result};
use crate::host::{
    CookieStore, HostEnvironment, KeyValueStore, MemoryCookieJar, MemoryHost, MemoryKeyValueStore,
};
use crate::models::{AuthResponse, AuthorizeUrlResponse, Session, UserInfo};
use crate::pkce;
use crate::refresh::{HttpRefreshBackend, RefreshOrchestrator};
use crate::store::{select_strategy, StorageStrategy, TokenManager};
use crate::timeouts::OrbitLinkTimeouts;
use crate::transport::{HttpTransport, RequestBody};

/// Options for starting an OAuth sign-in.
#[derive(Debug, Clone)]
pub struct OAuthSignInOptions {
    /// Where the provider should send the user back. Defaults to the
    /// host's current URL.
    pub redirect_uri: Option<String>,
    /// Attach a PKCE challenge to the authorization request.
    pub use_pkce: bool,
    /// Return the authorize URL without navigating the host to it.
    pub skip_redirect: bool,
}

impl Default for OAuthSignInOptions {
    fn default() -> Self {
        Self {
            redirect_uri: None,
            use_pkce: true,
            skip_redirect: false,
        }
    }
}

/// Builder for [`OrbitLinkClient`].
pub struct OrbitLinkClientBuilder {
    base_url: String,
    anon_key: Option<String>,
    timeouts: OrbitLinkTimeouts,
    kv: Option<Arc<dyn KeyValueStore>>,
    cookies: Option<Arc<dyn CookieStore>>,
    host: Option<Arc<dyn HostEnvironment>>,
}

impl OrbitLinkClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: None,
            timeouts: OrbitLinkTimeouts::default(),
            kv: None,
            cookies: None,
            host: None,
        }
    }

    /// Publishable key sent as the bearer token before any sign-in.
    pub fn anon_key(mut self, key: impl Into<String>) -> Self {
        self.anon_key = Some(key.into());
        self
    }

    pub fn timeouts(mut self, timeouts: OrbitLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Durable storage backend. Defaults to an in-memory store.
    pub fn kv_store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Client-visible cookie backend. Defaults to an in-memory jar.
    pub fn cookie_store(mut self, cookies: Arc<dyn CookieStore>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Host location access. Defaults to a host with no location, which
    /// disables the redirect-callback path.
    pub fn host(mut self, host: Arc<dyn HostEnvironment>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn build(self) -> Result<OrbitLinkClient> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| OrbitLinkError::ConfigurationError(format!("Invalid base URL: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(self.timeouts.receive_timeout)
            .connect_timeout(self.timeouts.connection_timeout)
            .cookie_store(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                OrbitLinkError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;

        let kv = self
            .kv
            .unwrap_or_else(|| Arc::new(MemoryKeyValueStore::new()));
        let cookies = self
            .cookies
            .unwrap_or_else(|| Arc::new(MemoryCookieJar::new()));
        let host = self.host.unwrap_or_else(|| Arc::new(MemoryHost::new()));

        // Storage starts durable; discovery upgrades it when the backend
        // supports cookie refresh.
        let manager = Arc::new(TokenManager::new(
            StorageStrategy::Durable,
            cookies,
            kv.clone(),
        ));

        let transport = Arc::new(HttpTransport::new(
            http.clone(),
            base_url.clone(),
            self.anon_key,
            manager.clone(),
        ));
        let refresher = Arc::new(RefreshOrchestrator::new(
            Arc::new(HttpRefreshBackend::new(http.clone(), base_url.clone())),
            manager.clone(),
        ));
        transport.set_refresh_hook(refresher.clone());

        let probe = CapabilityProbe::new(http, base_url);
        let callback = AuthCallbackHandler::new(
            host.clone(),
            kv.clone(),
            manager.clone(),
            Arc::new(TransportCodeExchanger {
                transport: transport.clone(),
            }),
        );

        Ok(OrbitLinkClient {
            transport,
            manager,
            refresher,
            probe,
            callback,
            host,
            kv,
        })
    }
}

/// Exchanges authorization codes through the shared transport.
struct TransportCodeExchanger {
    transport: Arc<HttpTransport>,
}

#[async_trait]
impl CodeExchanger for TransportCodeExchanger {
    async fn exchange_code(&self, code: &str, verifier: Option<&str>) -> Result<AuthResponse> {
        let mut payload = json!({ "code": code });
        if let Some(verifier) = verifier {
            payload["code_verifier"] = json!(verifier);
        }
        self.transport
            .request_json(
                Method::POST,
                "/v1/api/auth/exchange",
                RequestBody::Json(payload),
            )
            .await
    }
}

/// Authenticated client for an Orbit backend.
///
/// Construct with [`OrbitLinkClient::builder`], then call
/// [`initialize`](Self::initialize) once at startup to run capability
/// discovery and complete any pending OAuth redirect.
pub struct OrbitLinkClient {
    transport: Arc<HttpTransport>,
    manager: Arc<TokenManager>,
    refresher: Arc<RefreshOrchestrator>,
    probe: CapabilityProbe,
    callback: AuthCallbackHandler,
    host: Arc<dyn HostEnvironment>,
    kv: Arc<dyn KeyValueStore>,
}

impl OrbitLinkClient {
    pub fn builder(base_url: impl Into<String>) -> OrbitLinkClientBuilder {
        OrbitLinkClientBuilder::new(base_url)
    }

    /// Startup sequence: discover backend capabilities, pick the session
    /// storage strategy, and complete any pending redirect callback.
    ///
    /// Discovery failures are absorbed (the client stays on durable
    /// storage); a failed code exchange in the callback surfaces.
    pub async fn initialize(&self) -> Result<()> {
        let capabilities = self.probe.discover().await;
        let strategy = select_strategy(&capabilities);
        info!("[CLIENT] Initialized with {} session storage", strategy);
        self.manager.set_strategy(strategy);
        self.callback.handle_startup_redirect().await?;
        Ok(())
    }

    /// Register a new account. Establishes a session when the backend
    /// signs the user in directly on sign-up.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<Session> {
        let mut payload = json!({ "email": email, "password": password });
        if let Some(name) = name {
            payload["name"] = json!(name);
        }
        let response: AuthResponse = self
            .transport
            .request_json(
                Method::POST,
                "/v1/api/auth/users",
                RequestBody::Json(payload),
            )
            .await?;
        self.complete_auth(response).await
    }

    /// Authenticate with email and password.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let response: AuthResponse = self
            .transport
            .request_json(
                Method::POST,
                "/v1/api/auth/sessions",
                RequestBody::Json(json!({ "email": email, "password": password })),
            )
            .await?;
        self.complete_auth(response).await
    }

    /// Resolve an auth response into a stored session, exchanging an
    /// authorization code first when the backend runs in PKCE mode.
    async fn complete_auth(&self, response: AuthResponse) -> Result<Session> {
        let response = match &response.code {
            Some(code) if response.access_token.is_none() => {
                debug!("[CLIENT] Auth returned a code, exchanging for session");
                let code = code.clone();
                let verifier = pkce::take_verifier(&self.kv);
                let mut payload = json!({ "code": code });
                if let Some(verifier) = verifier {
                    payload["code_verifier"] = json!(verifier);
                }
                self.transport
                    .request_json(
                        Method::POST,
                        "/v1/api/auth/exchange",
                        RequestBody::Json(payload),
                    )
                    .await?
            }
            _ => response,
        };

        if let Some(csrf) = &response.csrf_token {
            self.manager.set_csrf_token(csrf);
            self.manager.set_strategy(StorageStrategy::Memory);
        }
        let session = response.into_session()?;
        self.manager.save_session(&session);
        Ok(session)
    }

    /// Begin an OAuth sign-in against the named provider.
    ///
    /// Returns the provider authorize URL. Unless
    /// [`skip_redirect`](OAuthSignInOptions::skip_redirect) is set, the
    /// host is also navigated there.
    pub async fn sign_in_with_oauth(
        &self,
        provider: &str,
        options: OAuthSignInOptions,
    ) -> Result<String> {
        let redirect_uri = options
            .redirect_uri
            .or_else(|| self.host.current_url())
            .ok_or_else(|| {
                OrbitLinkError::ConfigurationError(
                    "OAuth sign-in requires a redirect URI on hosts without a location".into(),
                )
            })?;

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("redirect_uri", &redirect_uri);
        if options.use_pkce {
            let pair = pkce::generate_pkce_pair();
            pkce::store_verifier(&self.kv, &pair.verifier);
            query.append_pair("code_challenge", &pair.challenge);
            query.append_pair("code_challenge_method", "S256");
        }

        let path = format!(
            "/v1/api/auth/oauth/{}?{}",
            provider,
            query.finish()
        );
        let response: AuthorizeUrlResponse = self
            .transport
            .request_json(Method::GET, &path, RequestBody::Empty)
            .await?;

        if !options.skip_redirect {
            self.host.replace_url(&response.auth_url);
        }
        Ok(response.auth_url)
    }

    /// Complete an OAuth flow manually with a code obtained out of band.
    pub async fn exchange_code_for_session(&self, code: &str) -> Result<Session> {
        let verifier = pkce::take_verifier(&self.kv);
        let exchanger = TransportCodeExchanger {
            transport: self.transport.clone(),
        };
        let response = exchanger.exchange_code(code, verifier.as_deref()).await?;
        if let Some(csrf) = &response.csrf_token {
            self.manager.set_csrf_token(csrf);
            self.manager.set_strategy(StorageStrategy::Memory);
        }
        let session = response.into_session()?;
        self.manager.save_session(&session);
        Ok(session)
    }

    /// Sign out: best-effort server-side logout, then unconditionally drop
    /// all local session state.
    pub async fn sign_out(&self) -> Result<()> {
        // The logout call itself must never recurse into a token refresh.
        let result = self
            .transport
            .request_without_refresh(Method::POST, "/v1/api/auth/logout", RequestBody::Empty)
            .await;
        if let Err(e) = result {
            debug!("[CLIENT] Server-side logout failed (ignored): {}", e);
        }
        self.manager.clear();
        Ok(())
    }

    /// Recover a session at startup.
    ///
    /// Returns the held session if one exists; otherwise, when the auth
    /// flag indicates a refreshable cookie session, attempts a refresh and
    /// hydrates the user identity. `Ok(None)` means "not signed in".
    pub async fn restore_session(&self) -> Result<Option<Session>> {
        if let Some(session) = self.manager.session() {
            if session.is_valid() {
                return Ok(Some(session));
            }
        }
        if !self.manager.should_attempt_recovery() {
            return Ok(None);
        }

        debug!("[CLIENT] Attempting session recovery via refresh cookie");
        match self.refresher.refresh_access_token().await {
            Ok(_) => {}
            Err(e) if e.is_network_error() => return Err(e),
            Err(e) => {
                debug!("[CLIENT] Session recovery failed: {}", e);
                return Ok(None);
            }
        }

        if let Some(user) = self.manager.user() {
            if user.is_placeholder() {
                if let Err(e) = self.current_user().await {
                    warn!("[CLIENT] Failed to hydrate user after recovery: {}", e);
                }
            }
        }
        Ok(self.manager.session())
    }

    /// The authenticated user's profile.
    ///
    /// Served from the stored session when the identity is already
    /// hydrated; otherwise fetched from the backend and cached.
    pub async fn current_user(&self) -> Result<UserInfo> {
        if let Some(user) = self.manager.user() {
            if !user.is_placeholder() {
                return Ok(user);
            }
        }

        let result: Result<UserInfo> = self
            .transport
            .request_json(
                Method::GET,
                "/v1/api/auth/sessions/current",
                RequestBody::Empty,
            )
            .await;
        match result {
            Ok(user) => {
                self.manager.set_user(&user);
                Ok(user)
            }
            Err(e) if e.is_auth_error() => {
                self.manager.clear();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Update profile fields on the current session's user.
    pub async fn update_profile(&self, name: Option<&str>) -> Result<UserInfo> {
        let mut payload = json!({});
        if let Some(name) = name {
            payload["name"] = json!(name);
        }
        let user: UserInfo = self
            .transport
            .request_json(
                Method::PATCH,
                "/v1/api/auth/sessions/current",
                RequestBody::Json(payload),
            )
            .await?;
        self.manager.set_user(&user);
        Ok(user)
    }

    /// Current session, if any. Synchronous; never touches the network.
    pub fn session(&self) -> Option<Session> {
        self.manager.session()
    }

    /// Current access token, if any. Synchronous.
    pub fn access_token(&self) -> Option<String> {
        self.manager.access_token()
    }

    /// Active session storage strategy.
    pub fn storage_strategy(&self) -> StorageStrategy {
        self.manager.strategy()
    }

    /// Arbitrary authenticated request against the backend, with the same
    /// transparent 401 recovery as the built-in operations.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<serde_json::Value> {
        self.transport.request(method, path, body).await
    }
}
