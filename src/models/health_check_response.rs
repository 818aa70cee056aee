use serde::{Deserialize, Serialize};

use super::capabilities::BackendCapabilities;

/// Health check response from the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Health status (e.g., "healthy")
    pub status: String,

    /// Server version
    #[serde(default)]
    pub version: String,

    /// Session-model capabilities; older backends omit this object
    #[serde(default)]
    pub capabilities: Option<BackendCapabilities>,
}
