//! OAuth redirect callback handling.
//!
//! After the provider round-trip the host lands back on the app with
//! credential material in the URL query. This module detects which shape
//! arrived (modern authorization code or legacy direct token), turns it
//! into a stored session, and scrubs the credential parameters from the
//! visible URL.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use url::Url;

use crate::error::Result;
use crate::host::{HostEnvironment, KeyValueStore};
use crate::models::{AuthResponse, Session, UserInfo};
use crate::pkce;
use crate::store::{StorageStrategy, TokenManager};

/// Seam for the code-for-session exchange call.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange_code(&self, code: &str, verifier: Option<&str>) -> Result<AuthResponse>;
}

/// Credential material found in a callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackParams {
    /// Modern flow: short-lived authorization code to exchange.
    AuthorizationCode { code: String },
    /// Legacy flow: the token itself arrived in the URL.
    LegacyToken {
        access_token: String,
        user_id: String,
        email: String,
        name: Option<String>,
        csrf_token: Option<String>,
    },
    /// Not an auth callback.
    None,
}

/// Classify a URL's query parameters.
///
/// An authorization code wins over legacy token parameters when both are
/// somehow present. Empty values count as absent.
pub fn detect_callback_params(url: &Url) -> CallbackParams {
    let param = |name: &str| -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    };

    if let Some(code) = param("code") {
        return CallbackParams::AuthorizationCode { code };
    }

    if let (Some(access_token), Some(user_id), Some(email)) =
        (param("access_token"), param("user_id"), param("email"))
    {
        return CallbackParams::LegacyToken {
            access_token,
            user_id,
            email,
            name: param("name"),
            csrf_token: param("csrf_token"),
        };
    }

    CallbackParams::None
}

/// Drives the startup redirect callback: detect, exchange, store, scrub.
pub struct AuthCallbackHandler {
    host: Arc<dyn HostEnvironment>,
    kv: Arc<dyn KeyValueStore>,
    manager: Arc<TokenManager>,
    exchanger: Arc<dyn CodeExchanger>,
}

impl AuthCallbackHandler {
    pub fn new(
        host: Arc<dyn HostEnvironment>,
        kv: Arc<dyn KeyValueStore>,
        manager: Arc<TokenManager>,
        exchanger: Arc<dyn CodeExchanger>,
    ) -> Self {
        Self {
            host,
            kv,
            manager,
            exchanger,
        }
    }

    /// Inspect the host's current URL and complete any pending auth
    /// callback found there.
    ///
    /// Returns the established session, or `None` when the URL carried no
    /// callback parameters. A malformed URL is not an error; it reads as
    /// "no callback".
    pub async fn handle_startup_redirect(&self) -> Result<Option<Session>> {
        let Some(raw_url) = self.host.current_url() else {
            return Ok(None);
        };
        let url = match Url::parse(&raw_url) {
            Ok(url) => url,
            Err(e) => {
                debug!("[CALLBACK] Host URL not parseable, skipping: {}", e);
                return Ok(None);
            }
        };

        match detect_callback_params(&url) {
            CallbackParams::AuthorizationCode { code } => {
                self.complete_code_flow(&url, &code).await.map(Some)
            }
            CallbackParams::LegacyToken {
                access_token,
                user_id,
                email,
                name,
                csrf_token,
            } => {
                debug!("[CALLBACK] Legacy token callback for user {}", user_id);
                let mut user = UserInfo::placeholder(&user_id, &email);
                user.name = name;
                let session = Session::new(&access_token, user);
                if let Some(csrf) = csrf_token {
                    // A CSRF token implies the backend established a
                    // refresh cookie alongside the redirect.
                    self.manager.set_csrf_token(&csrf);
                    self.manager.set_strategy(StorageStrategy::Memory);
                }
                self.manager.save_session(&session);
                self.scrub_url(
                    &url,
                    &["access_token", "user_id", "email", "name", "csrf_token", "state"],
                );
                Ok(Some(session))
            }
            CallbackParams::None => Ok(None),
        }
    }

    async fn complete_code_flow(&self, url: &Url, code: &str) -> Result<Session> {
        // Consume the verifier up front: whatever the exchange outcome, it
        // must never be replayable.
        let verifier = pkce::take_verifier(&self.kv);
        debug!(
            "[CALLBACK] Exchanging authorization code (pkce verifier: {})",
            if verifier.is_some() { "present" } else { "absent" }
        );

        let outcome = self
            .exchanger
            .exchange_code(code, verifier.as_deref())
            .await;
        // The code in the URL is spent either way.
        self.scrub_url(url, &["code", "state"]);

        let response = outcome.inspect_err(|e| {
            warn!("[CALLBACK] Code exchange failed: {}", e);
        })?;

        if let Some(csrf) = &response.csrf_token {
            self.manager.set_csrf_token(csrf);
            self.manager.set_strategy(StorageStrategy::Memory);
        }
        let session = response.into_session()?;
        self.manager.save_session(&session);
        Ok(session)
    }

    fn scrub_url(&self, url: &Url, remove: &[&str]) {
        let mut clean = url.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !remove.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            clean.set_query(None);
        } else {
            clean.query_pairs_mut().clear().extend_pairs(kept);
        }
        self.host.replace_url(clean.as_str());
    }
}
