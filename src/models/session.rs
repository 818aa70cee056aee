use serde::{Deserialize, Serialize};

use super::user_info::UserInfo;

/// An authenticated session: the bearer access token plus the user identity.
///
/// A session is valid only while its access token is non-empty. The token is
/// replaced in place by refresh; sign-out or an unrecoverable authorization
/// failure destroys the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Opaque bearer access token
    pub access_token: String,
    /// Authenticated user identity (may be a placeholder until hydrated)
    pub user: UserInfo,
    /// Token expiration time in RFC3339 format, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl Session {
    /// Create a session without an expiry.
    pub fn new(access_token: impl Into<String>, user: UserInfo) -> Self {
        Self {
            access_token: access_token.into(),
            user,
            expires_at: None,
        }
    }

    /// A session is valid only if it holds a non-empty access token.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
    }
}
