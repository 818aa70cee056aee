use serde::{Deserialize, Serialize};

/// User identity record returned alongside a session.
///
/// Sessions created from URL callback parameters carry only a partial
/// identity; use [`UserInfo::placeholder`] for those and hydrate the
/// remaining fields with a follow-up identity fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserInfo {
    /// User ID
    pub id: String,
    /// User email
    pub email: String,
    /// Display name (optional)
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the email address has been verified
    #[serde(default)]
    pub email_verified: Option<bool>,
    /// Account creation time in RFC3339 format
    #[serde(default)]
    pub created_at: Option<String>,
    /// Account update time in RFC3339 format
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl UserInfo {
    /// Minimal identity built from redirect parameters.
    ///
    /// Verification state and timestamps are unknown at this point and are
    /// filled in by the next authenticated identity fetch.
    pub fn placeholder(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
            email_verified: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// `true` when this identity still needs hydration from the backend.
    pub fn is_placeholder(&self) -> bool {
        self.created_at.is_none() && self.email_verified.is_none()
    }
}
