//! Authenticated HTTP transport.
//!
//! Every request goes through one pipeline: attach bearer auth, send,
//! parse. A 401 triggers exactly one transparent refresh-and-retry; if the
//! retry also fails the second error surfaces unchanged. The refresh hook
//! is injected after construction so the transport carries no compile-time
//! dependency on the orchestrator it feeds.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{OrbitLinkError, Result};
use crate::models::ApiErrorBody;
use crate::refresh::RefreshOrchestrator;
use crate::store::TokenManager;

/// Request payload variants accepted by the transport.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Raw {
        data: Vec<u8>,
        content_type: Option<String>,
    },
}

/// HTTP pipeline shared by every client operation.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    anon_key: Option<String>,
    manager: Arc<TokenManager>,
    refresher: Mutex<Option<Arc<RefreshOrchestrator>>>,
}

impl HttpTransport {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        anon_key: Option<String>,
        manager: Arc<TokenManager>,
    ) -> Self {
        Self {
            http,
            base_url,
            anon_key,
            manager,
            refresher: Mutex::new(None),
        }
    }

    /// Wire in the refresh orchestrator. Until this is called, a 401
    /// surfaces immediately with no retry.
    pub fn set_refresh_hook(&self, refresher: Arc<RefreshOrchestrator>) {
        *self.refresher.lock().unwrap() = Some(refresher);
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request and parse the response body as `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<T> {
        let value = self.request(method, path, body).await?;
        serde_json::from_value(value).map_err(OrbitLinkError::from)
    }

    /// Execute a request with transparent 401 recovery.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<Value> {
        self.execute(method, path, body, true).await
    }

    /// Execute a request that must never trigger a refresh, such as the
    /// logout call itself.
    pub(crate) async fn request_without_refresh(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<Value> {
        self.execute(method, path, body, false).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        allow_refresh: bool,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut is_retry = false;

        loop {
            debug!(
                "[TRANSPORT] {} {}{}",
                method,
                url,
                if is_retry { " (retry)" } else { "" }
            );
            let mut request = self.http.request(method.clone(), &url);

            let bearer = self
                .manager
                .access_token()
                .or_else(|| self.anon_key.clone());
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            request = match &body {
                RequestBody::Empty => request,
                RequestBody::Json(value) => request.json(value),
                RequestBody::Raw { data, content_type } => {
                    let request = request.body(data.clone());
                    match content_type {
                        Some(ct) => request.header(CONTENT_TYPE, ct),
                        None => request,
                    }
                }
            };

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && allow_refresh && !is_retry {
                let refresher = self.refresher.lock().unwrap().clone();
                if let Some(refresher) = refresher {
                    let original = error_from_response(response).await;
                    debug!("[TRANSPORT] 401 on {} {}, attempting token refresh", method, url);
                    match refresher.refresh_access_token().await {
                        Ok(_) => {
                            is_retry = true;
                            continue;
                        }
                        Err(refresh_err) => {
                            warn!(
                                "[TRANSPORT] Token refresh failed: {}, surfacing original 401",
                                refresh_err
                            );
                            return Err(original);
                        }
                    }
                }
            }

            if !status.is_success() {
                return Err(error_from_response(response).await);
            }
            return parse_success(response).await;
        }
    }
}

async fn parse_success(response: Response) -> Result<Value> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    if is_json {
        Ok(response.json::<Value>().await?)
    } else {
        Ok(Value::String(response.text().await?))
    }
}

/// Build a structured error from a non-success response, preserving every
/// field the backend sent (known or not).
pub(crate) async fn error_from_response(response: Response) -> OrbitLinkError {
    let status = response.status().as_u16();
    let raw = response.text().await.unwrap_or_default();
    let parsed: ApiErrorBody = serde_json::from_str(&raw).unwrap_or_default();

    OrbitLinkError::ServerError {
        status_code: status,
        error_code: parsed.error_code,
        message: parsed
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status)),
        extra: parsed.extra,
    }
}
