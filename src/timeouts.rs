//! Timeout configuration for Orbit client operations.

use std::time::Duration;

/// Timeout configuration for HTTP operations.
///
/// # Examples
///
/// ```rust
/// use orbit_link::OrbitLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = OrbitLinkTimeouts::default();
///
/// // Aggressive timeouts for local development
/// let timeouts = OrbitLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct OrbitLinkTimeouts {
    /// Timeout for establishing connections (TCP + TLS handshake).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for receiving a response after a request is sent.
    /// Default: 30 seconds
    pub receive_timeout: Duration,
}

impl Default for OrbitLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(30),
        }
    }
}

impl OrbitLinkTimeouts {
    /// Aggressive timeouts for local development and tests.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            receive_timeout: Duration::from_secs(5),
        }
    }
}
