use serde::{Deserialize, Serialize};

use super::session::Session;
use super::user_info::UserInfo;
use crate::error::{OrbitLinkError, Result};

/// Response from the auth endpoints (sign-up, password sign-in, code
/// exchange, token refresh).
///
/// Two shapes share this model: a direct session (`access_token` + `user`,
/// optionally `csrf_token`) or, when the backend runs in PKCE mode, an
/// authorization `code` to be exchanged for a session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthResponse {
    /// Bearer access token for subsequent API calls
    #[serde(default)]
    pub access_token: Option<String>,
    /// Authenticated user information
    #[serde(default)]
    pub user: Option<UserInfo>,
    /// Anti-forgery token to replay on refresh calls
    #[serde(default)]
    pub csrf_token: Option<String>,
    /// Authorization code (PKCE mode only)
    #[serde(default)]
    pub code: Option<String>,
    /// Token expiration time in RFC3339 format
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl AuthResponse {
    /// Convert the direct-session shape into a [`Session`].
    ///
    /// Fails when the response carried no token or no user, which means
    /// this was a PKCE `{code}` response or a malformed body.
    pub fn into_session(self) -> Result<Session> {
        match (self.access_token, self.user) {
            (Some(token), Some(user)) if !token.is_empty() => Ok(Session {
                access_token: token,
                user,
                expires_at: self.expires_at,
            }),
            _ => Err(OrbitLinkError::AuthenticationError(
                "Auth response did not contain a session".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_session_response() {
        let json = r#"{
            "access_token": "tok123",
            "user": {"id": "u1", "email": "a@b.com"},
            "csrf_token": "csrf456"
        }"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.csrf_token.as_deref(), Some("csrf456"));
        let session = resp.into_session().unwrap();
        assert_eq!(session.access_token, "tok123");
        assert_eq!(session.user.id, "u1");
    }

    #[test]
    fn test_pkce_code_response() {
        let json = r#"{"code": "authcode789"}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.code.as_deref(), Some("authcode789"));
        assert!(resp.into_session().is_err());
    }

    #[test]
    fn test_empty_token_is_not_a_session() {
        let json = r#"{"access_token": "", "user": {"id": "u1", "email": "a@b.com"}}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert!(resp.into_session().is_err());
    }
}
