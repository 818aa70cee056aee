use serde::{Deserialize, Serialize};

/// Response from the OAuth authorize-URL endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeUrlResponse {
    /// Provider authorization URL to redirect the user to
    #[serde(rename = "authUrl")]
    pub auth_url: String,
}
