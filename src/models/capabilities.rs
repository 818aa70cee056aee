use serde::{Deserialize, Serialize};

/// Session-model capabilities reported by the backend.
///
/// Discovered once per client lifetime from the health endpoint. The
/// `Default` value is the most conservative assumption (legacy backend,
/// no cookie refresh), used whenever discovery fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCapabilities {
    /// Backend issues the refresh credential in an httpOnly cookie.
    #[serde(default)]
    pub supports_secure_cookie_refresh: bool,
    /// Backend exposes the token refresh endpoint.
    #[serde(default)]
    pub supports_refresh_endpoint: bool,
}

impl BackendCapabilities {
    /// Capabilities of a modern backend with cookie-based refresh.
    pub fn secure_cookie() -> Self {
        Self {
            supports_secure_cookie_refresh: true,
            supports_refresh_endpoint: true,
        }
    }

    /// `true` when the full cookie-refresh session model is available.
    pub fn has_cookie_refresh(&self) -> bool {
        self.supports_secure_cookie_refresh && self.supports_refresh_endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_conservative() {
        let caps = BackendCapabilities::default();
        assert!(!caps.supports_secure_cookie_refresh);
        assert!(!caps.supports_refresh_endpoint);
        assert!(!caps.has_cookie_refresh());
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let json = r#"{"supportsSecureCookieRefresh": true, "supportsRefreshEndpoint": true}"#;
        let caps: BackendCapabilities = serde_json::from_str(json).unwrap();
        assert!(caps.has_cookie_refresh());
    }

    #[test]
    fn test_partial_capabilities_object() {
        let json = r#"{"supportsRefreshEndpoint": true}"#;
        let caps: BackendCapabilities = serde_json::from_str(json).unwrap();
        assert!(caps.supports_refresh_endpoint);
        assert!(!caps.supports_secure_cookie_refresh);
        assert!(!caps.has_cookie_refresh());
    }
}
